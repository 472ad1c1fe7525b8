//! Async mutex with scoped guards.
//!
//! A [`Mutex`] is a [`Semaphore`] with a single permit. It protects no data
//! of its own; see [`Lock`](crate::Lock) for a mutex that owns a value.
//!
//! # Cancel Safety
//!
//! - `acquire().await`: Cancel-safe, inherits the semaphore's hand-off rules
//! - Once a guard is acquired, it is released on drop
//!
//! # Example
//!
//! ```
//! use coopsync::Mutex;
//! use futures_lite::future;
//!
//! let mutex = Mutex::new();
//! future::block_on(async {
//!     let guard = mutex.acquire().await.unwrap();
//!     assert!(mutex.locked());
//!     guard.release();
//! });
//! assert!(!mutex.locked());
//! ```

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use crate::sync::semaphore::{Acquire, ReleasePolicy, Semaphore, SemaphorePermit};
use crate::sync::uncancelled;

/// A FIFO-fair async mutual exclusion lock.
#[derive(Debug)]
pub struct Mutex {
    semaphore: Semaphore,
}

impl Mutex {
    /// Creates a new, unlocked mutex.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            semaphore: Semaphore::with_capacity(NonZeroUsize::MIN, ReleasePolicy::Strict),
        }
    }

    /// Returns true if the mutex is currently held.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.semaphore.locked()
    }

    /// Returns the number of tasks waiting for the lock.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.semaphore.waiter_count()
    }

    /// Acquires the mutex, waiting behind earlier callers.
    pub fn acquire(&self) -> MutexAcquire<'_> {
        MutexAcquire {
            inner: self.semaphore.acquire(),
        }
    }

    /// Acquires the mutex, giving up when `token` fires.
    pub fn acquire_with(&self, token: &CancelToken) -> MutexAcquire<'_> {
        MutexAcquire {
            inner: self.semaphore.acquire_with(token),
        }
    }

    /// Tries to acquire the mutex without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WouldBlock`] if the mutex is held.
    pub fn try_acquire(&self) -> Result<MutexGuard<'_>> {
        self.semaphore
            .try_acquire()
            .map(|permit| MutexGuard { permit })
            .map_err(|_| SyncError::WouldBlock { primitive: "mutex" })
    }

    /// Releases the mutex without a guard.
    ///
    /// Pairs with [`MutexGuard::forget`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLocked`] if the mutex is not held.
    pub fn release(&self) -> Result<()> {
        self.semaphore
            .release()
            .map_err(|_| SyncError::NotLocked { primitive: "mutex" })
    }

    /// Runs `f` while holding the mutex and returns its result.
    ///
    /// The caller queues for the mutex when this method is called.
    pub fn lock<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce() -> R,
    {
        let acquire = self.acquire();
        async move {
            let _guard = uncancelled(acquire.await);
            f().await
        }
    }

    /// Like [`lock`](Self::lock), but gives up waiting when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `token` fires before the mutex is
    /// acquired.
    pub fn lock_with<F, R>(&self, token: &CancelToken, f: F) -> impl Future<Output = Result<R>>
    where
        F: AsyncFnOnce() -> R,
    {
        let acquire = self.acquire_with(token);
        async move {
            let _guard = acquire.await?;
            Ok(f().await)
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Mutex::acquire`] and [`Mutex::acquire_with`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct MutexAcquire<'a> {
    inner: Acquire<'a>,
}

impl<'a> Future for MutexAcquire<'a> {
    type Output = Result<MutexGuard<'a>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.map(|permit| MutexGuard { permit }))
    }
}

/// A guard that releases the mutex when dropped.
#[derive(Debug)]
#[must_use = "guard will be immediately released if not held"]
pub struct MutexGuard<'a> {
    permit: SemaphorePermit<'a>,
}

impl MutexGuard<'_> {
    /// Releases the mutex now, handing it to the next waiter if any.
    pub fn release(self) {
        self.permit.release();
    }

    /// Keeps the mutex locked after the guard is gone.
    ///
    /// The lock must later be released with [`Mutex::release`].
    pub fn forget(self) {
        self.permit.forget();
    }
}
