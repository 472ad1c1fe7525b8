//! Cancellation token shared between a canceller and the waits it abandons.

use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::task::Waker;

use crate::error::{Result, SyncError};
use crate::types::CancelReason;

/// Smallest child list length at which unobservable children are pruned.
const MIN_PRUNE_AT: usize = 16;

/// Internal shared state for a cancellation token.
struct CancelTokenState {
    /// Whether cancellation has been requested.
    cancelled: Cell<bool>,
    /// The cancellation reason (set when cancelled).
    reason: RefCell<Option<CancelReason>>,
    /// Wakers of waits currently subscribed to this token.
    wakers: RefCell<BTreeMap<u64, Waker>>,
    /// Next subscription key.
    next_key: Cell<u64>,
    /// Child tokens cancelled together with this one.
    children: RefCell<Vec<CancelToken>>,
    /// Child list length that triggers the next prune.
    prune_at: Cell<usize>,
}

/// A cancellation token for abandoning pending waits.
///
/// Tokens are cheap to clone; every clone refers to the same state. Firing a
/// token wakes every wait currently subscribed to it, and each such wait then
/// resolves into [`SyncError::Cancelled`] instead of its normal outcome.
/// A token fires at most once; later calls to [`cancel`](Self::cancel) only
/// strengthen the recorded reason.
///
/// # Example
///
/// ```
/// use coopsync::{CancelToken, Notify};
///
/// let notify = Notify::new();
/// let token = CancelToken::new();
/// token.cancel();
///
/// // An already-fired token short-circuits without registering a waiter.
/// let result = futures_lite::future::block_on(notify.notified_with(&token));
/// assert!(result.unwrap_err().is_cancelled());
/// assert_eq!(notify.waiter_count(), 0);
/// ```
#[derive(Clone)]
pub struct CancelToken {
    state: Rc<CancelTokenState>,
}

impl CancelToken {
    /// Creates a new token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(CancelTokenState {
                cancelled: Cell::new(false),
                reason: RefCell::new(None),
                wakers: RefCell::new(BTreeMap::new()),
                next_key: Cell::new(0),
                children: RefCell::new(Vec::new()),
                prune_at: Cell::new(MIN_PRUNE_AT),
            }),
        }
    }

    /// Creates a child token that fires whenever this token fires.
    ///
    /// Cancelling the child does not affect the parent. A child created
    /// from an already-cancelled parent starts out cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        if let Some(reason) = self.reason() {
            child.cancel_with(reason);
        } else {
            if self.state.children.borrow().len() >= self.state.prune_at.get() {
                self.prune_children();
                let len = self.state.children.borrow().len();
                self.state.prune_at.set((len * 2).max(MIN_PRUNE_AT));
            }
            self.state.children.borrow_mut().push(child.clone());
        }
        child
    }

    /// Fires the token with a default user reason.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::default());
    }

    /// Fires the token with the given reason.
    ///
    /// Wakes every subscribed wait and cancels all child tokens.
    pub fn cancel_with(&self, reason: CancelReason) {
        {
            let mut current = self.state.reason.borrow_mut();
            if let Some(existing) = current.as_mut() {
                existing.strengthen(&reason);
                return;
            }
            *current = Some(reason.clone());
        }
        self.state.cancelled.set(true);
        tracing::debug!(reason = %reason, "cancel token fired");

        let wakers = std::mem::take(&mut *self.state.wakers.borrow_mut());
        let children = std::mem::take(&mut *self.state.children.borrow_mut());
        for waker in wakers.into_values() {
            waker.wake();
        }
        for child in children {
            child.cancel_with(reason.clone());
        }
    }

    /// Drops children that can no longer be observed: cancelled ones, and
    /// ones with no handle left outside this list and no live children of
    /// their own. Returns true if any child remains.
    fn prune_children(&self) -> bool {
        let mut children = self.state.children.borrow_mut();
        let before = children.len();
        children.retain(|child| {
            !child.is_cancelled()
                && (Rc::strong_count(&child.state) > 1 || child.prune_children())
        });
        if children.len() < before {
            tracing::trace!(pruned = before - children.len(), "cancel token children pruned");
        }
        !children.is_empty()
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// Returns the reason the token fired with, if it has fired.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.state.reason.borrow().clone()
    }

    /// Returns `Err(SyncError::Cancelled)` if the token has fired.
    pub fn checkpoint(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(SyncError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// The error a wait resolves into once this token has fired.
    pub(crate) fn cancelled_error(&self) -> SyncError {
        SyncError::Cancelled(self.reason().unwrap_or_default())
    }

    /// Subscribes a waker, or refreshes an existing subscription.
    ///
    /// Returns the subscription key to pass back on the next call or to
    /// [`unsubscribe`](Self::unsubscribe).
    pub(crate) fn subscribe(&self, key: Option<u64>, waker: &Waker) -> u64 {
        let mut wakers = self.state.wakers.borrow_mut();
        if let Some(key) = key {
            if let Some(existing) = wakers.get_mut(&key) {
                if !existing.will_wake(waker) {
                    existing.clone_from(waker);
                }
                return key;
            }
        }
        let key = self.state.next_key.get();
        self.state.next_key.set(key.wrapping_add(1));
        wakers.insert(key, waker.clone());
        key
    }

    /// Drops a subscription made with [`subscribe`](Self::subscribe).
    pub(crate) fn unsubscribe(&self, key: u64) {
        self.state.wakers.borrow_mut().remove(&key);
    }

    /// Number of waits currently subscribed to this token.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.wakers.borrow().len()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
