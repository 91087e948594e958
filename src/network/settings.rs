//! Settings handed to the network inference routine.

use serde::{Deserialize, Serialize};

/// Lag ranges and significance levels for network inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Largest source lag considered (in samples)
    pub max_lag_sources: usize,
    /// Smallest source lag considered (in samples)
    pub min_lag_sources: usize,
    /// Largest lag of the target's own past; defaults to `max_lag_sources`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lag_target: Option<usize>,
    /// Significance level of the inclusion (maximum statistic) test
    pub alpha_max_stat: f64,
    /// Significance level of the pruning (minimum statistic) test
    pub alpha_min_stat: f64,
    /// Significance level of the collective test over all selected sources
    pub alpha_omnibus: f64,
    /// Log every selection step
    pub verbose: bool,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            max_lag_sources: 6,
            min_lag_sources: 1,
            max_lag_target: None,
            alpha_max_stat: 0.01,
            alpha_min_stat: 0.01,
            alpha_omnibus: 0.01,
            verbose: false,
        }
    }
}

impl EstimatorSettings {
    /// Effective target lag.
    pub fn target_lag(&self) -> usize {
        self.max_lag_target.unwrap_or(self.max_lag_sources)
    }

    /// Largest lag over sources and target; the first `max_lag` samples only
    /// serve as history.
    pub fn max_lag(&self) -> usize {
        self.max_lag_sources.max(self.target_lag())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.min_lag_sources == 0 {
            return Err(SettingsError("min_lag_sources must be at least 1".to_string()));
        }
        if self.min_lag_sources > self.max_lag_sources {
            return Err(SettingsError(format!(
                "min_lag_sources ({}) exceeds max_lag_sources ({})",
                self.min_lag_sources, self.max_lag_sources
            )));
        }
        for (name, alpha) in [
            ("alpha_max_stat", self.alpha_max_stat),
            ("alpha_min_stat", self.alpha_min_stat),
            ("alpha_omnibus", self.alpha_omnibus),
        ] {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(SettingsError(format!("{name} must be in (0, 1), got {alpha}")));
            }
        }
        Ok(())
    }
}

/// Invalid estimator settings.
#[derive(Debug, thiserror::Error)]
#[error("Invalid estimator settings: {0}")]
pub struct SettingsError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EstimatorSettings::default();
        assert_eq!(settings.max_lag_sources, 6);
        assert_eq!(settings.min_lag_sources, 1);
        assert_eq!(settings.target_lag(), 6);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_lag_ordering_rejected() {
        let settings = EstimatorSettings {
            min_lag_sources: 4,
            max_lag_sources: 2,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_alpha_range_rejected() {
        let settings = EstimatorSettings {
            alpha_omnibus: 1.5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
