//! coopsync: FIFO-fair synchronization primitives for cooperative async executors.
//!
//! # Overview
//!
//! coopsync provides the classic coordination primitives (semaphore, mutex,
//! read-write lock, condition variable, event, barrier, wait group, FIFO queue
//! and LIFO stack) for tasks that share one thread and interleave only at
//! `.await` points. Every primitive keeps an explicit FIFO wait list, so the
//! task that started waiting first is served first.
//!
//! # Core Guarantees
//!
//! - **FIFO fairness**: Waiters are woken in the order their waits were called
//! - **No lost permits**: Permits and guards are RAII values released on drop
//! - **Cancel-correctness**: A cancelled or dropped wait leaves the wait list and
//!   passes on any wakeup it was already handed
//! - **Deterministic testing**: The [`lab`] runtime drives tasks in a fixed order
//!
//! # Module Structure
//!
//! - [`sync`]: The primitives
//! - [`cancel`]: Cancellation tokens for abandoning pending waits
//! - [`types`]: Cancellation reasons
//! - [`lab`]: Deterministic single-threaded executor for tests and examples
//! - [`error`]: Error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::future_not_send)]
#![allow(clippy::cast_possible_truncation)]

pub mod cancel;
pub mod error;
pub mod lab;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cancel::CancelToken;
pub use error::{ErrorCategory, Result, SyncError, TryPutError};
pub use sync::{
    Acquire, Barrier, BarrierWait, BarrierWaitResult, Condition, Event, Lock, Mutex,
    MutexAcquire, MutexGuard, Notified, Notify, Queue, ReleasePolicy, RwLock, Semaphore,
    SemaphorePermit, Stack, WaitGroup,
};
pub use types::{CancelKind, CancelReason};
