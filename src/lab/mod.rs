//! Deterministic lab runtime for testing.
//!
//! The lab runtime provides:
//!
//! - A single-threaded FIFO executor with no wall-clock dependencies
//! - Reproducible interleavings (same program, same schedule)
//! - Step limits and stall detection
//! - [`yield_now`] as an explicit suspension point

pub mod config;
pub mod runtime;
mod yield_now;

pub use config::LabConfig;
pub use runtime::{JoinHandle, LabRuntime};
pub use yield_now::{YieldNow, yield_now};
