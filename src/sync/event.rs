//! Level-triggered event flag.
//!
//! [`Event::set`] releases every waiter and makes later waits return
//! immediately until [`Event::clear`] re-arms the flag.

use std::cell::Cell;
use std::future::Future;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::sync::notify::Notify;

/// A flag tasks can wait on.
#[derive(Debug, Default)]
pub struct Event {
    set: Cell<bool>,
    waiters: Notify,
}

impl Event {
    /// Creates an event in the cleared state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            set: Cell::new(false),
            waiters: Notify::new(),
        }
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.get()
    }

    /// Sets the flag and wakes every waiter.
    pub fn set(&self) {
        if !self.set.replace(true) {
            let woken = self.waiters.wake(usize::MAX);
            tracing::trace!(woken, "event set");
        }
    }

    /// Clears the flag so later waits suspend again.
    pub fn clear(&self) {
        self.set.set(false);
    }

    /// Waits until the flag is set.
    pub fn wait(&self) -> impl Future<Output = ()> + '_ {
        let pending = (!self.is_set()).then(|| self.waiters.notified());
        async move {
            if let Some(notified) = pending {
                crate::sync::uncancelled(notified.await);
            }
        }
    }

    /// Waits until the flag is set, giving up when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`](crate::SyncError::Cancelled) if
    /// `token` fires before the flag is set.
    pub fn wait_with<'a>(
        &'a self,
        token: &CancelToken,
    ) -> impl Future<Output = Result<()>> + use<'a> {
        let fired = token.checkpoint();
        let pending =
            (fired.is_ok() && !self.is_set()).then(|| self.waiters.notified_with(token));
        async move {
            fired?;
            match pending {
                Some(notified) => notified.await,
                None => Ok(()),
            }
        }
    }
}
