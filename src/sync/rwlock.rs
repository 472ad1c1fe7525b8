//! Read-write lock built from two mutexes.
//!
//! Any number of readers or a single writer may be inside at a time.
//!
//! # Fairness
//!
//! Every caller passes through the write gate in FIFO order:
//!
//! | Scenario                  | Behavior                                         |
//! |---------------------------|--------------------------------------------------|
//! | No writer announced       | Readers enter immediately, concurrently          |
//! | Writer waiting or active  | Later readers queue behind it on the write gate  |
//! | Active readers + writer   | Writer holds the write gate until readers drain  |
//! | Multiple writers          | Writers enter in arrival order                   |
//!
//! A reader holds the write gate only for the synchronous step that
//! registers it, so readers never block each other. A writer holds the write
//! gate for its whole critical section, so neither readers nor writers can
//! starve.
//!
//! The read gate serializes reader registration against the writer's entry.

use std::cell::{Cell, RefCell};
use std::future::Future;

use crate::sync::mutex::Mutex;
use crate::sync::notify::Notify;
use crate::sync::uncancelled;

/// A FIFO-fair async read-write lock owning its value.
#[derive(Debug, Default)]
pub struct RwLock<T> {
    write_gate: Mutex,
    read_gate: Mutex,
    /// Readers currently inside `rlock`.
    readers: Cell<usize>,
    /// Signalled when `readers` drops to zero.
    drained: Notify,
    value: RefCell<T>,
}

impl<T> RwLock<T> {
    /// Creates a new read-write lock around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            write_gate: Mutex::new(),
            read_gate: Mutex::new(),
            readers: Cell::new(0),
            drained: Notify::new(),
            value: RefCell::new(value),
        }
    }

    /// Returns the number of readers currently inside [`rlock`](Self::rlock).
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.get()
    }

    /// Returns true if a writer is inside, or waiting for readers to drain.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.write_gate.locked()
    }

    /// Runs `f` with exclusive access to the value.
    ///
    /// The caller takes its place at the write gate when this method is
    /// called.
    pub fn lock<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce(&mut T) -> R,
    {
        let write = self.write_gate.acquire();
        async move {
            let _write = uncancelled(write.await);
            while self.readers.get() > 0 {
                tracing::trace!(readers = self.readers.get(), "writer waiting for readers");
                uncancelled(self.drained.notified().await);
            }
            let _read = uncancelled(self.read_gate.acquire().await);
            let mut value = self.value.borrow_mut();
            f(&mut value).await
        }
    }

    /// Runs `f` with shared access to the value.
    ///
    /// Other readers may run at the same time; writers may not. The caller
    /// takes its place at the write gate when this method is called.
    pub fn rlock<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce(&T) -> R,
    {
        let write = self.write_gate.acquire();
        async move {
            let _reader = {
                let _write = uncancelled(write.await);
                let _read = uncancelled(self.read_gate.acquire().await);
                self.enter_read()
            };
            let value = self.value.borrow();
            f(&value).await
        }
    }

    fn enter_read(&self) -> ReaderGuard<'_, T> {
        let readers = self.readers.get() + 1;
        self.readers.set(readers);
        tracing::trace!(readers, "reader entered");
        ReaderGuard { lock: self }
    }
}

/// Reader registration, removed on drop.
struct ReaderGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Drop for ReaderGuard<'_, T> {
    fn drop(&mut self) {
        let readers = self.lock.readers.get() - 1;
        self.lock.readers.set(readers);
        if readers == 0 {
            self.lock.drained.notify_all();
        }
    }
}
