//! Condition variable paired with an async mutex.
//!
//! A [`Condition`] lets tasks holding a mutex give it up while they wait for
//! some predicate to become true, and re-take it before they continue.
//! Several conditions may share one mutex through [`Condition::with_lock`].
//!
//! `wait`, `notify` and `notify_all` require the mutex to be held and report
//! [`SyncError::NotLocked`] otherwise. Since a [`Mutex`] has no owner, "held"
//! means held by anyone; callers are expected to pair the raw
//! [`acquire`](Condition::acquire)/[`release`](Condition::release) calls
//! themselves or use [`with`](Condition::with).
//!
//! # Cancel Safety
//!
//! Dropping a pending `wait()` leaves the caller without the mutex: it was
//! given up when the wait began and is re-taken only when the wait resolves.
//!
//! # Example
//!
//! ```
//! use coopsync::Condition;
//! use coopsync::lab::{LabConfig, LabRuntime};
//! use std::cell::Cell;
//!
//! let cond = Condition::new();
//! let ready = Cell::new(false);
//! let mut lab = LabRuntime::new(LabConfig::default());
//! let waiter = lab.spawn(cond.with(async || {
//!     cond.wait_for(|| ready.get()).await.unwrap();
//! }));
//! lab.spawn(cond.with(async || {
//!     ready.set(true);
//!     cond.notify(1).unwrap();
//! }));
//! lab.run_until_quiescent();
//! assert!(waiter.is_finished());
//! ```

use std::future::Future;
use std::rc::Rc;

use crate::error::{Result, SyncError};
use crate::sync::mutex::Mutex;
use crate::sync::notify::Notify;
use crate::sync::uncancelled;

/// A condition variable for async tasks.
#[derive(Debug, Default)]
pub struct Condition {
    lock: Rc<Mutex>,
    /// Tasks suspended in `wait`.
    waiters: Notify,
}

impl Condition {
    /// Creates a condition with its own mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock(Rc::new(Mutex::new()))
    }

    /// Creates a condition over an existing, possibly shared, mutex.
    #[must_use]
    pub fn with_lock(lock: Rc<Mutex>) -> Self {
        Self {
            lock,
            waiters: Notify::new(),
        }
    }

    /// Returns the mutex this condition is paired with.
    #[must_use]
    pub fn mutex(&self) -> &Rc<Mutex> {
        &self.lock
    }

    /// Acquires the underlying mutex.
    ///
    /// The mutex stays held until [`release`](Self::release) is called.
    pub fn acquire(&self) -> impl Future<Output = ()> + '_ {
        let pending = self.lock.acquire();
        async move { uncancelled(pending.await).forget() }
    }

    /// Releases the underlying mutex.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held.
    pub fn release(&self) -> Result<()> {
        self.lock.release()
    }

    /// Returns true if the underlying mutex is held.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.lock.locked()
    }

    /// Returns the number of tasks suspended in [`wait`](Self::wait).
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.waiter_count()
    }

    fn ensure_locked(&self) -> Result<()> {
        if self.locked() {
            Ok(())
        } else {
            Err(SyncError::NotLocked {
                primitive: "condition",
            })
        }
    }

    /// Wakes up to `n` waiting tasks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held, and
    /// [`SyncError::InvalidArgument`] if `n` is zero.
    pub fn notify(&self, n: usize) -> Result<()> {
        self.ensure_locked()?;
        self.waiters.notify(n)
    }

    /// Wakes every waiting task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held.
    pub fn notify_all(&self) -> Result<()> {
        self.ensure_locked()?;
        self.waiters.notify_all();
        Ok(())
    }

    /// Releases the mutex, waits to be notified, then re-acquires the mutex.
    ///
    /// The caller is registered and the mutex released when this method is
    /// called. Registration comes first, so a notification sent by the next
    /// holder cannot be missed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held.
    pub fn wait(&self) -> impl Future<Output = Result<()>> + '_ {
        let registered = self.ensure_locked().and_then(|()| {
            let woken = self.waiters.notified();
            self.lock.release().map(|()| woken)
        });
        if registered.is_ok() {
            tracing::trace!("condition wait");
        }
        async move {
            uncancelled(registered?.await);
            uncancelled(self.lock.acquire().await).forget();
            Ok(())
        }
    }

    /// Waits until `predicate` returns true.
    ///
    /// The predicate is checked when this method is called and after every
    /// wakeup, so spurious or shared wakeups are tolerated. If the first
    /// check fails the caller is registered right away, as with
    /// [`wait`](Self::wait).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held.
    pub fn wait_for<P>(&self, mut predicate: P) -> impl Future<Output = Result<()>>
    where
        P: FnMut() -> bool,
    {
        let first = self
            .ensure_locked()
            .map(|()| (!predicate()).then(|| self.wait()));
        async move {
            if let Some(first) = first? {
                first.await?;
                while !predicate() {
                    self.wait().await?;
                }
            }
            Ok(())
        }
    }

    /// Acquires the mutex, runs `f`, and releases the mutex afterwards.
    ///
    /// The caller queues for the mutex when this method is called.
    pub fn with<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce() -> R,
    {
        let acquire = self.acquire();
        async move {
            acquire.await;
            let _release = ReleaseOnDrop { condition: self };
            f().await
        }
    }
}

struct ReleaseOnDrop<'a> {
    condition: &'a Condition,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        // Not held if `f` was dropped mid-wait.
        if let Err(err) = self.condition.release() {
            tracing::debug!(%err, "condition scope ended without the mutex");
        }
    }
}
