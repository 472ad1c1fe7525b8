//! A mutex that owns the value it protects.
//!
//! The value is only reachable inside [`Lock::lock`], so it can never be
//! touched without holding the mutex.
//!
//! # Example
//!
//! ```
//! use coopsync::Lock;
//! use futures_lite::future;
//!
//! let counter = Lock::new(0u32);
//! let total = future::block_on(counter.lock(async |n: &mut u32| {
//!     *n += 1;
//!     *n
//! }));
//! assert_eq!(total, 1);
//! ```

use std::cell::RefCell;
use std::future::Future;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::sync::mutex::Mutex;
use crate::sync::uncancelled;

/// Exclusive async access to an owned value.
#[derive(Debug, Default)]
pub struct Lock<T> {
    mutex: Mutex,
    value: RefCell<T>,
}

impl<T> Lock<T> {
    /// Creates a new lock around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            mutex: Mutex::new(),
            value: RefCell::new(value),
        }
    }

    /// Returns true if some task is inside [`lock`](Self::lock).
    #[must_use]
    pub fn locked(&self) -> bool {
        self.mutex.locked()
    }

    /// Runs `f` with exclusive access to the value and returns its result.
    ///
    /// The mutex is released on every exit path, including a panic in `f`.
    /// The caller queues for access when this method is called.
    pub fn lock<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce(&mut T) -> R,
    {
        let acquire = self.mutex.acquire();
        async move {
            let _guard = uncancelled(acquire.await);
            let mut value = self.value.borrow_mut();
            f(&mut value).await
        }
    }

    /// Like [`lock`](Self::lock), but gives up waiting when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`](crate::SyncError::Cancelled) if
    /// `token` fires before access is granted; `f` is not run in that case.
    pub fn lock_with<F, R>(&self, token: &CancelToken, f: F) -> impl Future<Output = Result<R>>
    where
        F: AsyncFnOnce(&mut T) -> R,
    {
        let acquire = self.mutex.acquire_with(token);
        async move {
            let _guard = acquire.await?;
            let mut value = self.value.borrow_mut();
            Ok(f(&mut value).await)
        }
    }
}
