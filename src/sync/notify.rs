//! Event notification primitive with FIFO waiters and cancel-aware waiting.
//!
//! [`Notify`] is the wakeup engine the other primitives are built on. It
//! keeps an ordered list of suspended waiters; `notify(n)` resolves the
//! oldest `n` of them and `notify_all()` resolves every one registered at
//! the time of the call.
//!
//! # Cancel Safety
//!
//! - `notified().await`: Cancel-safe, the waiter is removed when dropped
//! - `notified_with(&token)`: A fired token removes the waiter and the wait
//!   resolves into [`SyncError::Cancelled`]
//! - A waiter whose token has fired is never counted by a later `notify(n)`
//!
//! Notifications are not stored: calling `notify` with nobody waiting is a
//! no-op, and a later waiter still suspends.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};

/// Settlement state of a single waiter. Moves out of `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaiterState {
    /// Registered and not yet settled.
    Pending,
    /// Resolved by `notify`/`notify_all`.
    Notified,
    /// Resolved by its cancellation token.
    Cancelled,
}

/// Entry in the waiter queue.
#[derive(Debug)]
struct Waiter {
    id: u64,
    state: Cell<WaiterState>,
    /// The waker to call when notified.
    waker: RefCell<Option<Waker>>,
    /// Token that may abandon this wait.
    token: Option<CancelToken>,
}

impl Waiter {
    fn token_fired(&self) -> bool {
        self.token.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn cancelled_error(&self) -> SyncError {
        self.token
            .as_ref()
            .map_or_else(|| SyncError::Cancelled(Default::default()), CancelToken::cancelled_error)
    }
}

/// A notify primitive for signaling events.
///
/// `Notify` provides a mechanism for tasks to wait for events and for
/// other tasks to signal those events. Waiters are woken in the order they
/// registered.
///
/// # Example
///
/// ```
/// use coopsync::Notify;
/// use futures_lite::future;
///
/// let notify = Notify::new();
/// let mut first = notify.notified();
/// let mut second = notify.notified();
///
/// notify.notify(1).unwrap();
/// assert!(future::block_on(future::poll_once(&mut first)).is_some());
/// assert!(future::block_on(future::poll_once(&mut second)).is_none());
///
/// notify.notify(1).unwrap();
/// assert!(future::block_on(future::poll_once(&mut second)).is_some());
/// ```
#[derive(Debug)]
pub struct Notify {
    /// Registered waiters, oldest first.
    waiters: RefCell<VecDeque<Rc<Waiter>>>,
    /// Next waiter id, for trace correlation.
    next_id: Cell<u64>,
}

impl Notify {
    /// Creates a new `Notify` with no waiters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
        }
    }

    /// Returns the number of tasks currently waiting.
    ///
    /// Waiters whose token has fired are not counted, even before they
    /// have been polled and removed.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters
            .borrow()
            .iter()
            .filter(|waiter| !waiter.token_fired())
            .count()
    }

    /// Wakes the oldest `n` pending waiters.
    ///
    /// If fewer than `n` are waiting, all of them are woken. With nobody
    /// waiting this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `n` is zero.
    pub fn notify(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(SyncError::invalid_argument(
                "n",
                "a positive integer",
                n as u64,
            ));
        }
        self.wake(n);
        Ok(())
    }

    /// Wakes every waiter registered at the time of the call.
    ///
    /// Tasks that start waiting after this call are not affected.
    pub fn notify_all(&self) {
        self.wake(usize::MAX);
    }

    /// Returns a future that completes when this `Notify` wakes it.
    ///
    /// The waiter joins the queue when this method is called, not when the
    /// future is first polled. Dropping the future removes the waiter.
    /// Without a token the future always resolves to `Ok(())`.
    pub fn notified(&self) -> Notified<'_> {
        self.register(None)
    }

    /// Like [`notified`](Self::notified), but abandoned when `token` fires.
    ///
    /// If `token` has already fired, the returned future fails immediately
    /// and no waiter is registered.
    pub fn notified_with(&self, token: &CancelToken) -> Notified<'_> {
        self.register(Some(token))
    }

    fn register(&self, token: Option<&CancelToken>) -> Notified<'_> {
        if let Some(token) = token.filter(|token| token.is_cancelled()) {
            tracing::trace!("notify wait short-circuited by fired token");
            return Notified {
                notify: self,
                waiter: None,
                token_key: None,
                early: Some(token.cancelled_error()),
                forward_on_drop: false,
            };
        }

        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let waiter = Rc::new(Waiter {
            id,
            state: Cell::new(WaiterState::Pending),
            waker: RefCell::new(None),
            token: token.cloned(),
        });

        let queued = {
            let mut waiters = self.waiters.borrow_mut();
            waiters.push_back(Rc::clone(&waiter));
            waiters.len()
        };
        tracing::trace!(waiter_id = id, queued, "notify waiter registered");

        Notified {
            notify: self,
            waiter: Some(waiter),
            token_key: None,
            early: None,
            forward_on_drop: false,
        }
    }

    /// Settles up to `n` waiters as notified and returns how many were woken.
    ///
    /// Waiters whose token already fired are settled as cancelled and do not
    /// count toward `n`.
    pub(crate) fn wake(&self, n: usize) -> usize {
        let mut woken = Vec::new();
        {
            let mut waiters = self.waiters.borrow_mut();
            while woken.len() < n {
                let Some(waiter) = waiters.pop_front() else {
                    break;
                };
                if waiter.token_fired() {
                    // The token already woke this task; it will observe the cancellation.
                    waiter.state.set(WaiterState::Cancelled);
                    continue;
                }
                waiter.state.set(WaiterState::Notified);
                woken.push(waiter);
            }
        }

        let count = woken.len();
        for waiter in woken {
            tracing::trace!(waiter_id = waiter.id, "notify waking waiter");
            let waker = waiter.waker.borrow_mut().take();
            if let Some(waker) = waker {
                waker.wake();
            }
        }
        count
    }

    fn remove(&self, waiter: &Rc<Waiter>) {
        let mut waiters = self.waiters.borrow_mut();
        if let Some(pos) = waiters.iter().position(|entry| Rc::ptr_eq(entry, waiter)) {
            waiters.remove(pos);
        }
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Notify::notified`] and [`Notify::notified_with`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Notified<'a> {
    notify: &'a Notify,
    /// `None` once settled and observed, or when short-circuited.
    waiter: Option<Rc<Waiter>>,
    /// Subscription key on the waiter's token.
    token_key: Option<u64>,
    /// Error to report on the first poll of a short-circuited wait.
    early: Option<SyncError>,
    /// Pass an unobserved notification on to the next waiter when dropped.
    forward_on_drop: bool,
}

impl Notified<'_> {
    /// Makes a dropped-but-notified wait hand its wakeup to the next waiter.
    pub(crate) fn forwarding(mut self) -> Self {
        self.forward_on_drop = true;
        self
    }

    /// Leaves the wait list without observing the outcome.
    ///
    /// Returns `true` if this waiter had already been notified, meaning the
    /// caller now owns a wakeup that nobody observed.
    pub(crate) fn detach(&mut self) -> bool {
        let Some(waiter) = self.waiter.clone() else {
            return false;
        };
        let notified = match waiter.state.get() {
            WaiterState::Pending => {
                self.notify.remove(&waiter);
                waiter.state.set(WaiterState::Cancelled);
                false
            }
            WaiterState::Notified => true,
            WaiterState::Cancelled => false,
        };
        self.complete();
        notified
    }

    fn complete(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            if let (Some(key), Some(token)) = (self.token_key.take(), waiter.token.as_ref()) {
                token.unsubscribe(key);
            }
        }
    }
}

impl Future for Notified<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(waiter) = this.waiter.clone() else {
            return match this.early.take() {
                Some(err) => Poll::Ready(Err(err)),
                None => panic!("`Notified` polled after completion"),
            };
        };

        match waiter.state.get() {
            WaiterState::Notified => {
                this.complete();
                Poll::Ready(Ok(()))
            }
            WaiterState::Cancelled => {
                this.complete();
                Poll::Ready(Err(waiter.cancelled_error()))
            }
            WaiterState::Pending if waiter.token_fired() => {
                this.notify.remove(&waiter);
                waiter.state.set(WaiterState::Cancelled);
                tracing::trace!(waiter_id = waiter.id, "notify waiter cancelled");
                this.complete();
                Poll::Ready(Err(waiter.cancelled_error()))
            }
            WaiterState::Pending => {
                {
                    let mut slot = waiter.waker.borrow_mut();
                    match slot.as_ref() {
                        Some(existing) if existing.will_wake(cx.waker()) => {}
                        _ => *slot = Some(cx.waker().clone()),
                    }
                }
                if let Some(token) = waiter.token.as_ref() {
                    this.token_key = Some(token.subscribe(this.token_key, cx.waker()));
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for Notified<'_> {
    fn drop(&mut self) {
        if self.detach() && self.forward_on_drop {
            tracing::trace!("forwarding unobserved notification");
            self.notify.wake(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn poll_once<F>(fut: &mut F) -> Poll<F::Output>
    where
        F: Future + Unpin,
    {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(fut).poll(&mut cx)
    }

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn notify_wakes_oldest_first() {
        init_test("notify_wakes_oldest_first");
        let notify = Notify::new();
        let mut first = notify.notified();
        let mut second = notify.notified();
        assert!(poll_once(&mut first).is_pending());
        assert!(poll_once(&mut second).is_pending());

        notify.notify(1).expect("notify");
        let first_ready = poll_once(&mut first).is_ready();
        crate::assert_with_log!(first_ready, "first ready", true, first_ready);
        let second_pending = poll_once(&mut second).is_pending();
        crate::assert_with_log!(second_pending, "second pending", true, second_pending);

        notify.notify(1).expect("notify");
        let second_ready = poll_once(&mut second).is_ready();
        crate::assert_with_log!(second_ready, "second ready", true, second_ready);
        crate::test_complete!("notify_wakes_oldest_first");
    }

    #[test]
    fn notify_n_wakes_at_most_n() {
        init_test("notify_n_wakes_at_most_n");
        let notify = Notify::new();
        let mut futs: Vec<_> = (0..3).map(|_| notify.notified()).collect();

        notify.notify(2).expect("notify");
        let ready: Vec<bool> = futs.iter_mut().map(|f| poll_once(f).is_ready()).collect();
        crate::assert_with_log!(
            ready == [true, true, false],
            "two oldest ready",
            [true, true, false],
            ready
        );

        notify.notify(10).expect("notify more than waiting");
        let last_ready = poll_once(&mut futs[2]).is_ready();
        crate::assert_with_log!(last_ready, "remaining ready", true, last_ready);
        crate::assert_with_log!(
            notify.waiter_count() == 0,
            "no waiters",
            0usize,
            notify.waiter_count()
        );
        crate::test_complete!("notify_n_wakes_at_most_n");
    }

    #[test]
    fn notify_zero_is_rejected() {
        init_test("notify_zero_is_rejected");
        let notify = Notify::new();
        let err = notify.notify(0).expect_err("zero rejected");
        let is_validation = matches!(err, SyncError::InvalidArgument { name: "n", .. });
        crate::assert_with_log!(is_validation, "invalid argument", true, is_validation);
        crate::test_complete!("notify_zero_is_rejected");
    }

    #[test]
    fn notify_all_wakes_current_waiters_only() {
        init_test("notify_all_wakes_current_waiters_only");
        let notify = Notify::new();
        let mut a = notify.notified();
        let mut b = notify.notified();

        notify.notify_all();
        let mut late = notify.notified();

        assert!(poll_once(&mut a).is_ready());
        assert!(poll_once(&mut b).is_ready());
        let late_pending = poll_once(&mut late).is_pending();
        crate::assert_with_log!(late_pending, "late waiter pending", true, late_pending);
        crate::test_complete!("notify_all_wakes_current_waiters_only");
    }

    #[test]
    fn notify_without_waiters_is_not_stored() {
        init_test("notify_without_waiters_is_not_stored");
        let notify = Notify::new();
        notify.notify(1).expect("notify");
        notify.notify_all();

        let mut fut = notify.notified();
        let pending = poll_once(&mut fut).is_pending();
        crate::assert_with_log!(pending, "still pending", true, pending);
        crate::test_complete!("notify_without_waiters_is_not_stored");
    }

    #[test]
    fn fired_token_short_circuits() {
        init_test("fired_token_short_circuits");
        let notify = Notify::new();
        let token = CancelToken::new();
        token.cancel();

        let mut fut = notify.notified_with(&token);
        crate::assert_with_log!(
            notify.waiter_count() == 0,
            "no waiter registered",
            0usize,
            notify.waiter_count()
        );
        let result = poll_once(&mut fut);
        let cancelled = matches!(result, Poll::Ready(Err(SyncError::Cancelled(_))));
        crate::assert_with_log!(cancelled, "cancelled", true, cancelled);
        crate::test_complete!("fired_token_short_circuits");
    }

    #[test]
    fn cancelled_waiter_is_skipped_by_notify() {
        init_test("cancelled_waiter_is_skipped_by_notify");
        let notify = Notify::new();
        let token = CancelToken::new();

        let mut cancelled = notify.notified_with(&token);
        let mut other = notify.notified();
        assert!(poll_once(&mut cancelled).is_pending());
        assert!(poll_once(&mut other).is_pending());

        // Fire the token but do not poll the cancelled waiter yet.
        token.cancel();
        crate::assert_with_log!(
            notify.waiter_count() == 1,
            "cancelled waiter not counted",
            1usize,
            notify.waiter_count()
        );

        notify.notify(1).expect("notify");
        let other_ready = poll_once(&mut other).is_ready();
        crate::assert_with_log!(other_ready, "other woken", true, other_ready);

        let result = poll_once(&mut cancelled);
        let is_cancelled = matches!(result, Poll::Ready(Err(SyncError::Cancelled(_))));
        crate::assert_with_log!(is_cancelled, "cancelled outcome", true, is_cancelled);
        crate::test_complete!("cancelled_waiter_is_skipped_by_notify");
    }

    #[test]
    fn cancel_after_notify_keeps_notification() {
        init_test("cancel_after_notify_keeps_notification");
        let notify = Notify::new();
        let token = CancelToken::new();
        let mut fut = notify.notified_with(&token);
        assert!(poll_once(&mut fut).is_pending());

        notify.notify(1).expect("notify");
        token.cancel();

        // The waiter settled as notified first; exactly one outcome fires.
        let result = poll_once(&mut fut);
        let ok = matches!(result, Poll::Ready(Ok(())));
        crate::assert_with_log!(ok, "notified outcome wins", true, ok);
        crate::test_complete!("cancel_after_notify_keeps_notification");
    }

    #[test]
    fn drop_removes_waiter() {
        init_test("drop_removes_waiter");
        let notify = Notify::new();
        let first = notify.notified();
        let mut second = notify.notified();
        crate::assert_with_log!(
            notify.waiter_count() == 2,
            "two waiters",
            2usize,
            notify.waiter_count()
        );

        drop(first);
        crate::assert_with_log!(
            notify.waiter_count() == 1,
            "one waiter after drop",
            1usize,
            notify.waiter_count()
        );

        notify.notify(1).expect("notify");
        let ready = poll_once(&mut second).is_ready();
        crate::assert_with_log!(ready, "remaining waiter woken", true, ready);
        crate::test_complete!("drop_removes_waiter");
    }

    #[test]
    fn forwarding_wait_passes_unobserved_wakeup() {
        init_test("forwarding_wait_passes_unobserved_wakeup");
        let notify = Notify::new();
        let first = notify.notified().forwarding();
        let mut second = notify.notified();

        notify.notify(1).expect("notify");
        drop(first);

        let ready = poll_once(&mut second).is_ready();
        crate::assert_with_log!(ready, "wakeup forwarded", true, ready);
        crate::test_complete!("forwarding_wait_passes_unobserved_wakeup");
    }

    #[test]
    fn repeated_cancel_leaves_no_waiters() {
        init_test("repeated_cancel_leaves_no_waiters");
        let notify = Notify::new();
        for _ in 0..100 {
            let token = CancelToken::new();
            let mut fut = notify.notified_with(&token);
            assert!(poll_once(&mut fut).is_pending());
            token.cancel();
            assert!(poll_once(&mut fut).is_ready());
            crate::assert_with_log!(
                token.subscriber_count() == 0,
                "token subscription released",
                0usize,
                token.subscriber_count()
            );
        }
        let len = notify.waiters.borrow().len();
        crate::assert_with_log!(len == 0, "queue empty", 0usize, len);
        crate::test_complete!("repeated_cancel_leaves_no_waiters");
    }
}
