//! Cooperative synchronization primitives with FIFO-fair waiters.
//!
//! Every primitive here is built for a single-threaded cooperative executor.
//! Bookkeeping lives in `Cell`/`RefCell` and is only mutated between
//! suspension points, so no hardware atomics are involved.
//!
//! # Primitives
//!
//! - [`Notify`]: FIFO waiter registry, the wakeup engine for the rest
//! - [`Semaphore`]: Counting permit pool with direct permit hand-off
//! - [`Mutex`]: Semaphore of capacity one with scoped guards
//! - [`Lock`]: Mutex that owns the value it protects
//! - [`RwLock`]: Many readers or one writer, fair through the write gate
//! - [`Condition`]: Monitor pairing a mutex with a wait list
//! - [`Event`]: Level-triggered flag
//! - [`Barrier`]: Reusable N-way rendezvous with leader election
//! - [`WaitGroup`]: Counter that releases waiters when it returns to zero
//! - [`Queue`] / [`Stack`]: FIFO/LIFO containers whose take suspends when empty
//!
//! # Cancel Safety
//!
//! - Suspending operations register their waiter when called, not when first
//!   polled, so wake order is call order
//! - A woken `Queue`/`Stack` consumer that loses its item to a `*_nowait`
//!   caller re-queues at the back
//! - Dropping a pending operation removes its waiter
//! - `*_with(&token)` variants resolve into `SyncError::Cancelled` when the
//!   token fires, and short-circuit if it already has
//! - Guards and permits release on drop, including during unwinding

mod barrier;
mod condition;
mod event;
mod lock;
mod mutex;
mod notify;
mod queue;
mod rwlock;
mod semaphore;
mod stack;
mod wait_group;

pub use barrier::{Barrier, BarrierWait, BarrierWaitResult};
pub use condition::Condition;
pub use event::Event;
pub use lock::Lock;
pub use mutex::{Mutex, MutexAcquire, MutexGuard};
pub use notify::{Notified, Notify};
pub use queue::Queue;
pub use rwlock::RwLock;
pub use semaphore::{Acquire, ReleasePolicy, Semaphore, SemaphorePermit};
pub use stack::Stack;
pub use wait_group::WaitGroup;

use crate::error::Result;

/// Unwraps the outcome of a wait that was given no cancellation token.
pub(crate) fn uncancelled<T>(outcome: Result<T>) -> T {
    match outcome {
        Ok(value) => value,
        Err(err) => unreachable!("wait without a cancellation token failed: {err}"),
    }
}
