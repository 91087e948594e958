//! Persistent run counters.

use crate::classify::ClassificationSummary;
use crate::core::averaging::ResampleSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Counters accumulated over every run recorded in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    pub messages_classified: u64,
    pub classification_failures: u64,
    pub records_skipped: u64,
    pub observations_read: u64,
    pub buckets_written: u64,
    pub missing_buckets: u64,
    pub windows_estimated: u64,
    pub runs_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Run log, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct RunLog {
    stats: RunStats,
    persist_path: Option<PathBuf>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a run log that continues from, and saves back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self {
            stats: RunStats::default(),
            persist_path: Some(path),
        };

        if let Err(e) = log.load() {
            warn!("Could not load previous run log: {}", e);
        }

        log
    }

    pub fn record_classification(&mut self, summary: &ClassificationSummary) {
        self.stats.messages_classified += summary.classified as u64;
        self.stats.classification_failures += summary.failed as u64;
        self.stats.records_skipped += summary.skipped as u64;
    }

    pub fn record_resample(&mut self, observations: usize, summary: &ResampleSummary) {
        self.stats.observations_read += observations as u64;
        self.stats.buckets_written += summary.buckets as u64;
        self.stats.missing_buckets += summary.missing as u64;
    }

    pub fn record_estimation(&mut self, windows: usize) {
        self.stats.windows_estimated += windows as u64;
    }

    /// Count a finished run and return the id it was logged under.
    pub fn record_run_completed(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.stats.runs_completed += 1;
        self.stats.last_run_id = Some(id);
        id
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = &self.stats;
        let last = stats
            .last_updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Run Statistics:\n\
             - Messages classified: {}\n\
             - Classification failures: {}\n\
             - Records skipped: {}\n\
             - Observations read: {}\n\
             - Buckets written: {} ({} missing)\n\
             - Windows estimated: {}\n\
             - Runs completed: {}\n\
             - Last run: {}\n\
             - Last updated: {}",
            stats.messages_classified,
            stats.classification_failures,
            stats.records_skipped,
            stats.observations_read,
            stats.buckets_written,
            stats.missing_buckets,
            stats.windows_estimated,
            stats.runs_completed,
            stats
                .last_run_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string()),
            last
        )
    }

    /// Save stats to disk. A log without a path is a no-op.
    pub fn save(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            self.stats.last_updated = Some(Utc::now());
            let json = serde_json::to_string_pretty(&self.stats).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.stats = serde_json::from_str(&content).map_err(std::io::Error::other)?;
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        self.stats = RunStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let mut log = RunLog::new();

        log.record_classification(&ClassificationSummary {
            classified: 8,
            failed: 2,
            skipped: 1,
            interrupted: false,
        });
        log.record_estimation(3);
        log.record_estimation(2);
        log.record_run_completed();

        let stats = log.stats();
        assert_eq!(stats.messages_classified, 8);
        assert_eq!(stats.classification_failures, 2);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.windows_estimated, 5);
        assert_eq!(stats.runs_completed, 1);
    }

    #[test]
    fn test_persistence_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("run_log.json");

        let mut first = RunLog::with_persistence(path.clone());
        first.record_estimation(4);
        let id = first.record_run_completed();
        first.save().unwrap();

        let mut second = RunLog::with_persistence(path);
        assert_eq!(second.stats().windows_estimated, 4);
        assert!(second.stats().last_updated.is_some());
        assert_eq!(second.stats().last_run_id, Some(id));

        second.record_estimation(1);
        assert_eq!(second.stats().windows_estimated, 5);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.json");
        std::fs::write(&path, "not json").unwrap();

        let log = RunLog::with_persistence(path);
        assert_eq!(log.stats(), &RunStats::default());
    }

    #[test]
    fn test_reset_and_summary() {
        let mut log = RunLog::new();
        log.record_run_completed();
        log.reset();
        assert_eq!(log.stats().runs_completed, 0);

        let summary = log.summary();
        assert!(summary.contains("Runs completed: 0"));
        assert!(summary.contains("Last updated: never"));
    }
}
