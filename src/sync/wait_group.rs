//! Wait group: waits for a set of tasks to finish.
//!
//! The counter starts at zero. Workers call [`WaitGroup::add`] before they
//! start and [`WaitGroup::done`] when they finish; every task blocked in
//! [`WaitGroup::wait`] is released when the counter returns to zero.

use std::cell::Cell;
use std::future::Future;

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use crate::sync::notify::Notify;

/// A counter that releases its waiters when it reaches zero.
#[derive(Debug, Default)]
pub struct WaitGroup {
    counter: Cell<i64>,
    waiters: Notify,
}

impl WaitGroup {
    /// Creates a wait group with a zero counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: Cell::new(0),
            waiters: Notify::new(),
        }
    }

    /// Returns the current counter value.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.counter.get()
    }

    /// Adds `delta`, which may be negative, to the counter.
    ///
    /// Releases every current waiter if the counter becomes zero.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NegativeCounter`] if the counter would drop below
    /// zero and [`SyncError::InvalidArgument`] if it would overflow. The
    /// counter is unchanged in both cases.
    pub fn add(&self, delta: i64) -> Result<()> {
        let counter = self.counter.get();
        let next = counter.checked_add(delta).ok_or_else(|| {
            SyncError::invalid_argument("delta", "within the counter range", delta)
        })?;
        if next < 0 {
            return Err(SyncError::NegativeCounter { counter, delta });
        }
        self.counter.set(next);
        if next == 0 && counter != 0 {
            let woken = self.waiters.wake(usize::MAX);
            tracing::debug!(woken, "wait group released");
        }
        Ok(())
    }

    /// Decrements the counter by one.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NegativeCounter`] if the counter is already zero.
    pub fn done(&self) -> Result<()> {
        self.add(-1)
    }

    /// Waits until the counter is zero.
    ///
    /// Resolves immediately if it already is.
    pub fn wait(&self) -> impl Future<Output = ()> + '_ {
        let pending = (self.counter.get() != 0).then(|| self.waiters.notified());
        async move {
            if let Some(notified) = pending {
                crate::sync::uncancelled(notified.await);
            }
        }
    }

    /// Waits until the counter is zero, giving up when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `token` has already fired or fires
    /// before the counter reaches zero.
    pub fn wait_with<'a>(
        &'a self,
        token: &CancelToken,
    ) -> impl Future<Output = Result<()>> + use<'a> {
        let fired = token.checkpoint();
        let pending =
            (fired.is_ok() && self.counter.get() != 0).then(|| self.waiters.notified_with(token));
        async move {
            fired?;
            match pending {
                Some(notified) => notified.await,
                None => Ok(()),
            }
        }
    }
}
