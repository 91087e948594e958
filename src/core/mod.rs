//! Core resampling logic.
//!
//! This module contains:
//! - Bucketing of per-source observations into fixed time intervals
//! - Adaptive short/long window averaging of each bucket
//! - Pivoting of resampled buckets into a source × time matrix

pub mod averaging;
pub mod bucketing;
pub mod pivot;

// Re-export commonly used types
pub use averaging::{AveragingPolicy, ResampleSummary, Resampler, Tier};
pub use bucketing::{group_by_source, BucketError, SourceSeries, TimeBucketer};
pub use pivot::{MatrixWindow, PivotError, PivotedMatrix};
