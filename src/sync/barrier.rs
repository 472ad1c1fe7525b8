//! Barrier for N-way rendezvous with cancel-aware waiting.
//!
//! The barrier trips when `size` callers have arrived. Exactly one caller,
//! the arrival that trips it, observes `is_leader = true` per generation.
//! After tripping the barrier resets, so it can be reused for the next round.
//!
//! An arrival is counted when `wait` is called. A caller whose wait is later
//! cancelled or dropped still counts toward the generation it joined: the
//! barrier counts arrivals, not completions.

use std::cell::Cell;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use crate::sync::notify::{Notified, Notify};

/// Barrier for N-way rendezvous.
#[derive(Debug)]
pub struct Barrier {
    size: usize,
    /// Arrivals still missing in the current generation.
    remaining: Cell<usize>,
    generation: Cell<u64>,
    waiters: Notify,
}

/// Result of a barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// Returns true for exactly one caller per generation.
    #[must_use]
    pub const fn is_leader(&self) -> bool {
        self.is_leader
    }
}

impl Barrier {
    /// Creates a barrier that trips after `size` arrivals.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SyncError::invalid_argument(
                "size",
                "a positive integer",
                size as u64,
            ));
        }
        Ok(Self {
            size,
            remaining: Cell::new(size),
            generation: Cell::new(0),
            waiters: Notify::new(),
        })
    }

    /// Returns the number of arrivals needed to trip the barrier.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the arrivals still missing in the current generation.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }

    /// Returns how many times the barrier has tripped.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Arrives at the barrier and waits for it to trip.
    pub fn wait(&self) -> BarrierWait<'_> {
        self.arrive(None)
    }

    /// Arrives at the barrier; the wait is abandoned if `token` fires.
    ///
    /// An already-fired token fails immediately and does not count as an
    /// arrival.
    pub fn wait_with(&self, token: &CancelToken) -> BarrierWait<'_> {
        self.arrive(Some(token))
    }

    fn arrive(&self, token: Option<&CancelToken>) -> BarrierWait<'_> {
        if let Some(err) = token.and_then(|token| token.checkpoint().err()) {
            return BarrierWait {
                state: WaitState::Failed(err),
            };
        }

        let remaining = self.remaining.get() - 1;
        if remaining == 0 {
            let generation = self.generation.get().wrapping_add(1);
            self.remaining.set(self.size);
            self.generation.set(generation);
            self.waiters.notify_all();
            tracing::debug!(size = self.size, generation, "barrier tripped");
            return BarrierWait {
                state: WaitState::Leader,
            };
        }

        self.remaining.set(remaining);
        tracing::trace!(remaining, "barrier arrival");
        let notified = match token {
            Some(token) => self.waiters.notified_with(token),
            None => self.waiters.notified(),
        };
        BarrierWait {
            state: WaitState::Waiting(notified),
        }
    }
}

enum WaitState<'a> {
    Leader,
    Waiting(Notified<'a>),
    Failed(SyncError),
    Done,
}

/// Future returned by [`Barrier::wait`] and [`Barrier::wait_with`].
#[must_use = "futures do nothing unless polled"]
pub struct BarrierWait<'a> {
    state: WaitState<'a>,
}

impl Future for BarrierWait<'_> {
    type Output = Result<BarrierWaitResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.state, WaitState::Done) {
            WaitState::Leader => Poll::Ready(Ok(BarrierWaitResult { is_leader: true })),
            WaitState::Failed(err) => Poll::Ready(Err(err)),
            WaitState::Waiting(mut notified) => match Pin::new(&mut notified).poll(cx) {
                Poll::Ready(outcome) => {
                    Poll::Ready(outcome.map(|()| BarrierWaitResult { is_leader: false }))
                }
                Poll::Pending => {
                    this.state = WaitState::Waiting(notified);
                    Poll::Pending
                }
            },
            WaitState::Done => panic!("`BarrierWait` polled after completion"),
        }
    }
}

impl std::fmt::Debug for BarrierWait<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            WaitState::Leader => "leader",
            WaitState::Waiting(_) => "waiting",
            WaitState::Failed(_) => "failed",
            WaitState::Done => "done",
        };
        f.debug_struct("BarrierWait").field("state", &state).finish()
    }
}
