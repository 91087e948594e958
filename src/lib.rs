//! toxnet - toxicity influence networks from chat messages.
//!
//! Messages are scored for toxicity by an external service, the per-source
//! scores are resampled onto a regular time grid, and a directed influence
//! network between sources is estimated over consecutive time windows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              toxnet                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Classify   │──▶│  Resample   │──▶│   Pivot     │             │
//! │  │(Perspective)│   │ (5 min bins)│   │(src × time) │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │         │                                   │                    │
//! │         ▼                                   ▼                    │
//! │  ┌─────────────┐                     ┌─────────────┐             │
//! │  │   Run log   │◀────────────────────│  Sliding    │             │
//! │  │             │                     │  windows    │             │
//! │  └─────────────┘                     └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use toxnet::core::{PivotedMatrix, Resampler};
//! use toxnet::data::{read_observations, BucketRecord};
//! use toxnet::network::{EstimatorSettings, GaussianTransferEntropy, SlidingWindowEstimator};
//! use toxnet::config::ColumnConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let observations = read_observations(
//!     std::path::Path::new("scored.csv"),
//!     &ColumnConfig::default(),
//!     chrono_tz::UTC,
//! )?;
//! let (buckets, _) = Resampler::default().resample(&observations)?;
//! let records: Vec<BucketRecord> = buckets.into_iter().map(BucketRecord::from).collect();
//! let matrix = PivotedMatrix::from_records(&records)?;
//!
//! let mut estimator = SlidingWindowEstimator::new(
//!     GaussianTransferEntropy::new(),
//!     EstimatorSettings::default(),
//!     100,
//!     3,
//! )?;
//! let run = estimator.run(&matrix)?;
//! println!("{} windows", run.results.len());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod classify;
pub mod config;
pub mod core;
pub mod data;
pub mod network;
pub mod perspective;

// Re-export key types at crate root for convenience
pub use audit::{RunLog, RunStats};
pub use classify::{ClassificationSummary, Classifier};
pub use config::{ColumnConfig, Config, ConfigError, ResampleConfig};
pub use core::{AveragingPolicy, PivotedMatrix, Resampler, TimeBucketer};
pub use data::{Bucket, BucketRecord, ClassificationRecord, DataError, Observation};
pub use network::{
    EstimationError, EstimationRun, EstimatorSettings, GaussianTransferEntropy, NetworkInference,
    NetworkResult, SlidingWindowEstimator,
};
pub use perspective::{
    BlockingPerspectiveClient, PerspectiveClient, PerspectiveConfig, PerspectiveError,
    ToxicityScorer,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable consulted for the scoring service API key.
pub const API_KEY_ENV: &str = "PERSPECTIVEKEY";
