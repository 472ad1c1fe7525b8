//! Cancellation tokens for abandoning pending waits.
//!
//! Every suspending operation in [`crate::sync`] has a `*_with` variant that
//! takes a [`CancelToken`]. Firing the token removes the waiter from its
//! primitive's wait list and resolves the wait into
//! [`SyncError::Cancelled`](crate::SyncError::Cancelled). A token that has
//! already fired short-circuits the operation before any waiter is registered.

pub mod token;

pub use token::CancelToken;
