//! Error types and error handling strategy for coopsync.
//!
//! Every fallible operation returns [`SyncError`]. Error handling follows
//! these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors surface synchronously to the operation that caused them
//! - No primitive retries internally; retry policy belongs to the caller
//! - A primitive stays usable after reporting any error
//!
//! # Error Categories
//!
//! - **Validation**: A size, count, or delta argument was out of range
//! - **InvalidState**: The primitive was used without holding its lock
//! - **Capacity**: A non-waiting call found the container empty or full
//! - **Cancellation**: A pending wait was abandoned through its token
//! - **Overflow**: A bounded semaphore or wait group was over-released

use core::fmt;

use crate::types::CancelReason;

/// The category of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Construction or argument validation failed.
    Validation,
    /// The operation requires a lock the caller does not hold.
    InvalidState,
    /// A non-waiting operation could not proceed right now.
    Capacity,
    /// The operation was cancelled while pending.
    Cancellation,
    /// A release or decrement went past a guarded bound.
    Overflow,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Capacity => write!(f, "capacity"),
            Self::Cancellation => write!(f, "cancellation"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// The error type for all coopsync operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A numeric argument was outside its allowed range.
    #[error("{name} must be {requirement}, got {value}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// Human-readable description of the allowed range.
        requirement: &'static str,
        /// The rejected value.
        value: i128,
    },

    /// The primitive's lock is not held by anyone.
    #[error("{primitive} is not locked")]
    NotLocked {
        /// The primitive that was misused.
        primitive: &'static str,
    },

    /// A non-waiting take found nothing to take.
    #[error("{container} is empty")]
    Empty {
        /// The container that was empty.
        container: &'static str,
    },

    /// A non-waiting put found no free slot.
    #[error("{container} is full (capacity {capacity})")]
    Full {
        /// The container that was full.
        container: &'static str,
        /// The container's maximum size.
        capacity: usize,
    },

    /// A non-waiting acquire found no permit.
    #[error("{primitive} would block")]
    WouldBlock {
        /// The primitive that had no permit available.
        primitive: &'static str,
    },

    /// The wait was cancelled through its token.
    #[error("operation cancelled: {0}")]
    Cancelled(CancelReason),

    /// A bounded semaphore was released more often than it was acquired.
    #[error("release would exceed capacity {capacity}")]
    Overflow {
        /// The semaphore's capacity.
        capacity: usize,
    },

    /// A wait group counter would drop below zero.
    #[error("wait group counter {counter} cannot take delta {delta}")]
    NegativeCounter {
        /// The counter before the rejected update.
        counter: i64,
        /// The rejected delta.
        delta: i64,
    },
}

impl SyncError {
    /// Builds an [`SyncError::InvalidArgument`] for any integer value.
    pub(crate) fn invalid_argument(
        name: &'static str,
        requirement: &'static str,
        value: impl Into<i128>,
    ) -> Self {
        Self::InvalidArgument {
            name,
            requirement,
            value: value.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } => ErrorCategory::Validation,
            Self::NotLocked { .. } => ErrorCategory::InvalidState,
            Self::Empty { .. } | Self::Full { .. } | Self::WouldBlock { .. } => {
                ErrorCategory::Capacity
            }
            Self::Cancelled(_) => ErrorCategory::Cancellation,
            Self::Overflow { .. } | Self::NegativeCounter { .. } => ErrorCategory::Overflow,
        }
    }

    /// Returns true if trying again later may succeed.
    ///
    /// Only capacity errors are transient: the container or permit pool may
    /// change as other tasks run. Everything else indicates a programming
    /// error or a deliberate cancellation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Capacity)
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the cancellation reason, if this is a cancellation.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A specialized `Result` type for coopsync operations.
pub type Result<T> = core::result::Result<T, SyncError>;

/// Error returned by a non-waiting put into a full container.
///
/// The rejected value is handed back so the caller can retry with it.
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
#[error("{container} is full (capacity {capacity})")]
pub struct TryPutError<T> {
    value: T,
    container: &'static str,
    capacity: usize,
}

impl<T> TryPutError<T> {
    pub(crate) const fn new(value: T, container: &'static str, capacity: usize) -> Self {
        Self {
            value,
            container,
            capacity,
        }
    }

    /// Returns the value that could not be stored.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Returns the capacity of the container that rejected the value.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for TryPutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryPutError")
            .field("container", &self.container)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> From<TryPutError<T>> for SyncError {
    fn from(err: TryPutError<T>) -> Self {
        Self::Full {
            container: err.container,
            capacity: err.capacity,
        }
    }
}
