//! Windowed influence-network estimation.
//!
//! The sliding-window loop is generic over a [`NetworkInference`] routine, so
//! the statistical estimator can be swapped without touching the windowing.
//! [`GaussianTransferEntropy`] is the built-in routine.

pub mod gaussian;
pub mod ids;
pub mod output;
pub mod settings;
pub mod sliding;

pub use gaussian::{GaussianTransferEntropy, NetworkResult, SourceLink, TargetResult};
pub use ids::{IdTable, LocalIdMap};
pub use output::{write_run, OutputPaths};
pub use settings::{EstimatorSettings, SettingsError};
pub use sliding::{EstimationRun, SlidingWindowEstimator, WindowSummary, NO_VALID_INDEX};

use nalgebra::DMatrix;
use serde::Serialize;

/// The surviving columns of one window, laid out `process × sample`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowData {
    values: DMatrix<f64>,
}

impl WindowData {
    pub fn new(values: DMatrix<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn processes(&self) -> usize {
        self.values.nrows()
    }

    pub fn samples(&self) -> usize {
        self.values.ncols()
    }
}

/// A routine that infers a directed network from a `process × sample` matrix.
///
/// Degenerate input (no processes, very few samples) is the routine's own
/// business; the window loop passes whatever survives column dropping.
pub trait NetworkInference {
    type Output: Serialize;

    fn analyse_network(
        &mut self,
        data: &WindowData,
        settings: &EstimatorSettings,
    ) -> Result<Self::Output, EstimationError>;
}

/// Estimation errors.
#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Network inference failed: {0}")]
    Inference(String),

    #[error("Window size must be positive")]
    ZeroWindow,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
