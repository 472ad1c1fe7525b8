//! FIFO queue whose `get` waits for an item.
//!
//! A queue is unbounded by default. A bounded queue makes `put` wait for a
//! free slot and `put_nowait` fail when full.
//!
//! # Cancel Safety
//!
//! - `get().await`: Cancel-safe, no item is removed unless the future
//!   completes. A consumer dropped after being woken passes its wakeup on to
//!   the next waiting consumer.
//! - `put().await`: Cancel-safe, the value is dropped with the future if it
//!   was not yet stored.
//!
//! # Example
//!
//! ```
//! use coopsync::Queue;
//! use futures_lite::future;
//!
//! let queue = Queue::new();
//! future::block_on(async {
//!     queue.put(1).await;
//!     queue.put(2).await;
//!     assert_eq!(queue.get().await, 1);
//! });
//! assert_eq!(queue.get_nowait().unwrap(), 2);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError, TryPutError};
use crate::sync::notify::Notify;
use crate::sync::uncancelled;

/// A FIFO queue for passing items between tasks.
#[derive(Debug)]
pub struct Queue<T> {
    items: RefCell<VecDeque<T>>,
    /// `None` for an unbounded queue.
    maxsize: Option<NonZeroUsize>,
    /// Consumers waiting for an item.
    not_empty: Notify,
    /// Producers waiting for a free slot.
    not_full: Notify,
}

impl<T> Queue<T> {
    /// Creates an unbounded queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            maxsize: None,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Creates a queue holding at most `maxsize` items.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `maxsize` is zero.
    pub fn bounded(maxsize: usize) -> Result<Self> {
        let maxsize = NonZeroUsize::new(maxsize).ok_or_else(|| {
            SyncError::invalid_argument("maxsize", "a positive integer", maxsize as u64)
        })?;
        Ok(Self {
            items: RefCell::new(VecDeque::with_capacity(maxsize.get())),
            maxsize: Some(maxsize),
            ..Self::new()
        })
    }

    /// Returns the maximum number of items, or `None` if unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.maxsize.map(NonZeroUsize::get)
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn qsize(&self) -> usize {
        self.len()
    }

    /// Returns true if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Returns true if a bounded queue is at capacity. Always false when
    /// unbounded.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.maxsize.is_some_and(|max| self.len() >= max.get())
    }

    /// Returns the number of consumers waiting in `get`.
    #[must_use]
    pub fn waiting_consumers(&self) -> usize {
        self.not_empty.waiter_count()
    }

    /// Appends `value`, waiting for a free slot if the queue is full.
    ///
    /// A producer that finds the queue full joins the wait list when this
    /// method is called.
    pub fn put(&self, value: T) -> impl Future<Output = ()> {
        let queued = self.is_full().then(|| self.not_full.notified().forwarding());
        async move {
            if let Some(queued) = queued {
                uncancelled(queued.await);
            }
            while self.is_full() {
                uncancelled(self.not_full.notified().forwarding().await);
            }
            self.store(value);
        }
    }

    /// Appends `value` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the value inside a [`TryPutError`] if the queue is full.
    pub fn put_nowait(&self, value: T) -> core::result::Result<(), TryPutError<T>> {
        if let Some(max) = self.maxsize.filter(|_| self.is_full()) {
            return Err(TryPutError::new(value, "queue", max.get()));
        }
        self.store(value);
        Ok(())
    }

    /// Removes the oldest item, waiting for one if the queue is empty.
    ///
    /// A consumer that finds the queue empty joins the wait list when this
    /// method is called, so consumers are served in call order.
    pub fn get(&self) -> impl Future<Output = T> {
        let queued = self.is_empty().then(|| self.not_empty.notified().forwarding());
        async move {
            if let Some(queued) = queued {
                uncancelled(queued.await);
            }
            loop {
                if let Some(value) = self.take() {
                    return value;
                }
                uncancelled(self.not_empty.notified().forwarding().await);
            }
        }
    }

    /// Removes the oldest item, giving up when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `token` has already fired or fires
    /// before an item arrives.
    pub fn get_with(&self, token: &CancelToken) -> impl Future<Output = Result<T>> {
        let fired = token.checkpoint();
        let queued = (fired.is_ok() && self.is_empty())
            .then(|| self.not_empty.notified_with(token).forwarding());
        async move {
            fired?;
            if let Some(queued) = queued {
                queued.await?;
            }
            loop {
                if let Some(value) = self.take() {
                    return Ok(value);
                }
                self.not_empty.notified_with(token).forwarding().await?;
            }
        }
    }

    /// Removes the oldest item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Empty`] if there is nothing to take.
    pub fn get_nowait(&self) -> Result<T> {
        self.take().ok_or(SyncError::Empty { container: "queue" })
    }

    fn store(&self, value: T) {
        let len = {
            let mut items = self.items.borrow_mut();
            items.push_back(value);
            items.len()
        };
        tracing::trace!(len, "queue put");
        self.not_empty.wake(1);
    }

    fn take(&self) -> Option<T> {
        let value = self.items.borrow_mut().pop_front()?;
        if self.maxsize.is_some() {
            self.not_full.wake(1);
        }
        Some(value)
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
