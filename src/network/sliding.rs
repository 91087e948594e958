//! Non-overlapping sliding windows over the pivoted matrix.
//!
//! Window `k` covers rows `[k·W, (k+1)·W)`. Sources with any missing value in a
//! window are dropped for that window only. The survivors get dense local ids,
//! and a local → global remap is recorded so results can be attributed back to
//! stable source identities.

use crate::core::pivot::PivotedMatrix;
use crate::data::types::format_timestamp;
use crate::network::ids::{IdTable, LocalIdMap};
use crate::network::settings::EstimatorSettings;
use crate::network::{EstimationError, NetworkInference, WindowData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Key used for a window that has no first valid row.
pub const NO_VALID_INDEX: &str = "None";

/// What one iteration looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub iteration: usize,
    /// Requested row range; rows past the end of the matrix are simply absent
    pub begin: usize,
    pub end: usize,
    /// Rows actually present in the window
    pub rows: usize,
    /// Sources that survived column dropping, in local id order
    pub sources: Vec<String>,
    /// Key the result was stored under
    pub key: String,
    pub last_valid: Option<String>,
}

/// Everything one estimation run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationRun<T> {
    pub global_ids: IdTable,
    /// Inference results keyed by window start
    pub results: BTreeMap<String, T>,
    /// Local → global id maps keyed by window start
    pub local_ids: BTreeMap<String, LocalIdMap>,
    pub windows: Vec<WindowSummary>,
}

/// Drives a [`NetworkInference`] routine over consecutive windows.
pub struct SlidingWindowEstimator<E> {
    estimator: E,
    settings: EstimatorSettings,
    window_size: usize,
    iterations: usize,
}

impl<E: NetworkInference> SlidingWindowEstimator<E> {
    pub fn new(
        estimator: E,
        settings: EstimatorSettings,
        window_size: usize,
        iterations: usize,
    ) -> Result<Self, EstimationError> {
        if window_size == 0 {
            return Err(EstimationError::ZeroWindow);
        }
        settings.validate()?;

        Ok(Self {
            estimator,
            settings,
            window_size,
            iterations,
        })
    }

    /// Row ranges visited, one per iteration.
    ///
    /// Bounds saturate at `usize::MAX`; the matrix clips them to its rows.
    pub fn window_bounds(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.iterations).map(move |k| self.bounds(k))
    }

    fn bounds(&self, k: usize) -> (usize, usize) {
        (
            k.saturating_mul(self.window_size),
            k.saturating_add(1).saturating_mul(self.window_size),
        )
    }

    /// Run all iterations. The first inference error aborts the run.
    pub fn run(
        &mut self,
        matrix: &PivotedMatrix,
    ) -> Result<EstimationRun<E::Output>, EstimationError> {
        let global_ids = IdTable::from_columns(matrix.columns());
        if global_ids.is_empty() {
            warn!("Input has no sources; every window will be empty");
        }
        let mut results = BTreeMap::new();
        let mut local_ids = BTreeMap::new();
        let mut windows = Vec::new();

        for iteration in 0..self.iterations {
            let (begin, end) = self.bounds(iteration);
            info!(
                "Starting estimation: {}, going to {}.",
                iteration, self.iterations
            );

            let window = matrix.window(begin, end);
            let surviving = window.complete_columns();
            let sources: Vec<String> = surviving
                .iter()
                .map(|&c| matrix.columns()[c].clone())
                .collect();
            let local_map = global_ids.local_map(&sources);

            let first = window.first_valid_timestamp(&surviving).map(format_timestamp);
            let last = window.last_valid_timestamp(&surviving).map(format_timestamp);
            let key = first.unwrap_or_else(|| NO_VALID_INDEX.to_string());
            info!(
                "This window starts at: {} and ends at {}.",
                key,
                last.as_deref().unwrap_or(NO_VALID_INDEX)
            );
            debug!(
                "Window {} keeps {} of {} sources over {} rows",
                iteration,
                sources.len(),
                matrix.columns().len(),
                window.row_count()
            );

            let data = WindowData::new(window.to_dense(&surviving));
            let result = self.estimator.analyse_network(&data, &self.settings)?;

            results.insert(key.clone(), result);
            local_ids.insert(key.clone(), local_map);
            windows.push(WindowSummary {
                iteration,
                begin,
                end,
                rows: window.row_count(),
                sources,
                key,
                last_valid: last,
            });
        }

        Ok(EstimationRun {
            global_ids,
            results,
            local_ids,
            windows,
        })
    }

    pub fn into_inner(self) -> E {
        self.estimator
    }
}
