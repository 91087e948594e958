//! Adaptive dual-window averaging of bucketed toxicity scores.
//!
//! Each bucket is resampled independently:
//!
//! - **Short window**: if the bucket holds at least `short_min_count`
//!   observations, average every score in the closed interval
//!   `[start, start + short_window]`. The count is checked again over that
//!   closed interval, and too few scores leave the bucket missing.
//! - **Long window**: otherwise take the scores in the closed trailing interval
//!   `[start + short_window - long_window, start + short_window]`, keep the
//!   last `long_max_samples` in time order and average them. An empty interval
//!   leaves the bucket missing.

use crate::core::bucketing::{group_by_source, BucketError, SourceSeries, TimeBucketer};
use crate::data::types::{Bucket, Observation};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

/// Which averaging rule produced a bucket's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Short,
    Long,
}

/// Count-based choice between the short and the long averaging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragingPolicy {
    pub short_window: Duration,
    pub short_min_count: usize,
    pub long_window: Duration,
    pub long_max_samples: usize,
}

impl Default for AveragingPolicy {
    fn default() -> Self {
        Self {
            short_window: Duration::minutes(5),
            short_min_count: 5,
            long_window: Duration::hours(24),
            long_max_samples: 5,
        }
    }
}

impl AveragingPolicy {
    /// Tier selected by the bucket's raw count.
    pub fn tier_for(&self, count: usize) -> Tier {
        if count >= self.short_min_count {
            Tier::Short
        } else {
            Tier::Long
        }
    }

    /// Resampled value for `bucket`, computed from its source's series.
    pub fn average(&self, bucket: &Bucket, series: &SourceSeries) -> Option<f64> {
        let stop = bucket.start + self.short_window;

        match self.tier_for(bucket.count) {
            Tier::Short => {
                let range = series.closed_range(bucket.start, stop);
                if !range.is_empty() && range.len() >= self.short_min_count {
                    Some(mean(&series.scores[range]))
                } else {
                    None
                }
            }
            Tier::Long => {
                let range = series.closed_range(stop - self.long_window, stop);
                let recent = range.start.max(range.end.saturating_sub(self.long_max_samples));
                if range.end > recent {
                    Some(mean(&series.scores[recent..range.end]))
                } else {
                    None
                }
            }
        }
    }

    /// Fill `retox` for every bucket of one source. No other field changes.
    pub fn fill(&self, buckets: &mut [Bucket], series: &SourceSeries) {
        for bucket in buckets.iter_mut() {
            bucket.retox = self.average(bucket, series);
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Counts describing one resampling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResampleSummary {
    pub sources: usize,
    pub buckets: usize,
    pub short_window: usize,
    pub long_window: usize,
    pub missing: usize,
}

/// Bucketing followed by adaptive averaging, over all sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler {
    bucketer: TimeBucketer,
    policy: AveragingPolicy,
}

impl Resampler {
    pub fn new(bucketer: TimeBucketer, policy: AveragingPolicy) -> Self {
        Self { bucketer, policy }
    }

    /// Resample all observations into buckets, ordered by source then time.
    pub fn resample(
        &self,
        observations: &[Observation],
    ) -> Result<(Vec<Bucket>, ResampleSummary), BucketError> {
        let mut all = Vec::new();
        let mut summary = ResampleSummary::default();

        for series in group_by_source(observations) {
            let mut buckets = self.bucketer.bucket_source(&series)?;
            debug!(
                "Beginning resampling of source '{}' for {} buckets",
                series.source,
                buckets.len()
            );

            self.policy.fill(&mut buckets, &series);

            summary.sources += 1;
            for bucket in &buckets {
                match self.policy.tier_for(bucket.count) {
                    Tier::Short => summary.short_window += 1,
                    Tier::Long => summary.long_window += 1,
                }
                if bucket.is_missing() {
                    summary.missing += 1;
                }
            }
            summary.buckets += buckets.len();
            all.extend(buckets);
        }

        info!(
            "Resampled {} sources into {} buckets ({} short-window, {} long-window, {} missing)",
            summary.sources,
            summary.buckets,
            summary.short_window,
            summary.long_window,
            summary.missing
        );

        Ok((all, summary))
    }
}
