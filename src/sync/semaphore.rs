//! Counting semaphore with FIFO permit hand-off.
//!
//! A semaphore controls access to a finite number of resources through
//! permits. Releasing a permit while tasks are waiting transfers it straight
//! to the oldest waiter without passing through the counter, so a task that
//! arrives later can never take a permit ahead of one that is already queued.
//!
//! # Cancel Safety
//!
//! - `acquire().await`: Cancel-safe, a dropped acquire leaves the queue; if a
//!   permit had already been handed to it, the permit moves on to the next
//!   waiter
//! - `acquire_with(&token)`: Resolves into `SyncError::Cancelled` when the
//!   token fires before a permit is handed over
//!
//! # Example
//!
//! ```
//! use coopsync::Semaphore;
//! use futures_lite::future;
//!
//! let sem = Semaphore::new(2).unwrap();
//! future::block_on(async {
//!     let permit = sem.acquire().await.unwrap();
//!     assert_eq!(sem.available_permits(), 1);
//!     drop(permit);
//! });
//! assert_eq!(sem.available_permits(), 2);
//! ```

use std::cell::Cell;
use std::future::Future;
use std::mem;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use crate::sync::notify::{Notified, Notify};
use crate::sync::uncancelled;

/// What a raw [`Semaphore::release`] does when every permit is already free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReleasePolicy {
    /// Over-release is reported as [`SyncError::Overflow`].
    #[default]
    Strict,
    /// Over-release is ignored; permits never exceed the capacity.
    Saturating,
    /// Over-release adds a permit, so the count may exceed the capacity.
    Unbounded,
}

/// A counting semaphore for limiting concurrent access.
#[derive(Debug)]
pub struct Semaphore {
    /// Permits currently free.
    permits: Cell<usize>,
    /// Permits at construction.
    capacity: usize,
    policy: ReleasePolicy,
    /// Tasks waiting for a permit.
    waiters: Notify,
}

impl Semaphore {
    /// Creates a semaphore with `size` permits and [`ReleasePolicy::Strict`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_policy(size, ReleasePolicy::Strict)
    }

    /// Creates a semaphore with `size` permits and the given release policy.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `size` is zero.
    pub fn with_policy(size: usize, policy: ReleasePolicy) -> Result<Self> {
        let capacity = NonZeroUsize::new(size).ok_or_else(|| {
            SyncError::invalid_argument("size", "a positive integer", size as u64)
        })?;
        Ok(Self::with_capacity(capacity, policy))
    }

    pub(crate) const fn with_capacity(capacity: NonZeroUsize, policy: ReleasePolicy) -> Self {
        Self {
            permits: Cell::new(capacity.get()),
            capacity: capacity.get(),
            policy,
            waiters: Notify::new(),
        }
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.get()
    }

    /// Returns the number of permits the semaphore was created with.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the release policy.
    #[must_use]
    pub const fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Returns true if no permit is free, so `acquire` would suspend.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.permits.get() == 0
    }

    /// Returns the number of tasks waiting for a permit.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.waiter_count()
    }

    /// Acquires a permit, waiting in FIFO order if none is free.
    ///
    /// The caller joins the queue when this method is called. Without a
    /// token the returned future always resolves to `Ok`.
    pub fn acquire(&self) -> Acquire<'_> {
        self.begin_acquire(None)
    }

    /// Acquires a permit, giving up when `token` fires.
    pub fn acquire_with(&self, token: &CancelToken) -> Acquire<'_> {
        self.begin_acquire(Some(token))
    }

    fn begin_acquire(&self, token: Option<&CancelToken>) -> Acquire<'_> {
        let state = if let Some(err) = token.and_then(|token| token.checkpoint().err()) {
            AcquireState::Failed(err)
        } else if self.take_permit() {
            AcquireState::Granted
        } else {
            let notified = match token {
                Some(token) => self.waiters.notified_with(token),
                None => self.waiters.notified(),
            };
            AcquireState::Waiting(notified)
        };
        Acquire {
            semaphore: self,
            state,
        }
    }

    /// Tries to acquire a permit without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WouldBlock`] if no permit is free.
    pub fn try_acquire(&self) -> Result<SemaphorePermit<'_>> {
        if self.take_permit() {
            Ok(SemaphorePermit { semaphore: self })
        } else {
            Err(SyncError::WouldBlock {
                primitive: "semaphore",
            })
        }
    }

    fn take_permit(&self) -> bool {
        let permits = self.permits.get();
        if permits == 0 {
            return false;
        }
        self.permits.set(permits - 1);
        tracing::trace!(permits = permits - 1, "semaphore permit taken");
        true
    }

    /// Releases one permit without a guard.
    ///
    /// Hands the permit to the oldest waiter if there is one. Otherwise the
    /// free count grows, subject to the [`ReleasePolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Overflow`] under [`ReleasePolicy::Strict`] if
    /// every permit is already free.
    pub fn release(&self) -> Result<()> {
        // A full counter implies nobody is waiting.
        if self.permits.get() >= self.capacity {
            match self.policy {
                ReleasePolicy::Strict => {
                    return Err(SyncError::Overflow {
                        capacity: self.capacity,
                    });
                }
                ReleasePolicy::Saturating => {
                    tracing::trace!(capacity = self.capacity, "saturated release ignored");
                    return Ok(());
                }
                ReleasePolicy::Unbounded => {}
            }
        }
        self.release_permit();
        Ok(())
    }

    /// Returns a held permit to the pool or hands it to the next waiter.
    ///
    /// Outside [`ReleasePolicy::Unbounded`] the free count never exceeds the
    /// capacity. A permit whose slot was already returned through a raw
    /// [`release`](Self::release) is discarded.
    pub(crate) fn release_permit(&self) {
        if self.waiters.wake(1) > 0 {
            tracing::trace!("semaphore permit handed off");
            return;
        }
        let permits = self.permits.get();
        if permits >= self.capacity && self.policy != ReleasePolicy::Unbounded {
            tracing::warn!(
                permits,
                capacity = self.capacity,
                "permit dropped after its slot was already released"
            );
            return;
        }
        self.permits.set(permits + 1);
        tracing::trace!(permits = permits + 1, "semaphore permit returned");
    }

    /// Runs `f` while holding a permit and returns its result.
    ///
    /// The permit is released on every exit path, including a panic in `f`.
    /// The caller queues for a permit when this method is called.
    pub fn lock<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: AsyncFnOnce() -> R,
    {
        let acquire = self.acquire();
        async move {
            let _permit = uncancelled(acquire.await);
            f().await
        }
    }

    /// Like [`lock`](Self::lock), but gives up waiting when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `token` fires before a permit is
    /// granted; `f` is not run in that case.
    pub fn lock_with<F, R>(&self, token: &CancelToken, f: F) -> impl Future<Output = Result<R>>
    where
        F: AsyncFnOnce() -> R,
    {
        let acquire = self.acquire_with(token);
        async move {
            let _permit = acquire.await?;
            Ok(f().await)
        }
    }
}

enum AcquireState<'a> {
    /// A free permit was taken at call time.
    Granted,
    Waiting(Notified<'a>),
    Failed(SyncError),
    Done,
}

/// Future returned by [`Semaphore::acquire`] and [`Semaphore::acquire_with`].
#[must_use = "futures do nothing unless polled"]
pub struct Acquire<'a> {
    semaphore: &'a Semaphore,
    state: AcquireState<'a>,
}

impl<'a> Future for Acquire<'a> {
    type Output = Result<SemaphorePermit<'a>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let semaphore = this.semaphore;
        match mem::replace(&mut this.state, AcquireState::Done) {
            AcquireState::Granted => Poll::Ready(Ok(SemaphorePermit { semaphore })),
            AcquireState::Failed(err) => Poll::Ready(Err(err)),
            AcquireState::Waiting(mut notified) => match Pin::new(&mut notified).poll(cx) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(SemaphorePermit { semaphore })),
                Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
                Poll::Pending => {
                    this.state = AcquireState::Waiting(notified);
                    Poll::Pending
                }
            },
            AcquireState::Done => panic!("`Acquire` polled after completion"),
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        match &mut self.state {
            AcquireState::Granted => self.semaphore.release_permit(),
            AcquireState::Waiting(notified) => {
                if notified.detach() {
                    tracing::trace!("dropped acquire passes its permit on");
                    self.semaphore.release_permit();
                }
            }
            AcquireState::Failed(_) | AcquireState::Done => {}
        }
    }
}

impl std::fmt::Debug for Acquire<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            AcquireState::Granted => "granted",
            AcquireState::Waiting(_) => "waiting",
            AcquireState::Failed(_) => "failed",
            AcquireState::Done => "done",
        };
        f.debug_struct("Acquire").field("state", &state).finish()
    }
}

/// A permit from a semaphore, released when dropped.
#[derive(Debug)]
#[must_use = "permit will be immediately released if not held"]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Releases the permit now.
    pub fn release(self) {
        drop(self);
    }

    /// Forgets the permit without releasing it back to the semaphore.
    pub fn forget(self) {
        mem::forget(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release_permit();
    }
}
