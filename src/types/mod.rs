//! Core value types shared by the primitives.
//!
//! - [`cancel`]: Cancellation reason and kind types

pub mod cancel;

pub use cancel::{CancelKind, CancelReason};
