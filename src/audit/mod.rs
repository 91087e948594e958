//! Cumulative bookkeeping across pipeline runs.
//!
//! Only counts are kept; no message text or source names end up in the log.

pub mod log;

pub use log::{RunLog, RunStats};
