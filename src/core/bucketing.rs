//! Grouping of per-source observations into fixed-length time buckets.
//!
//! Bucket boundaries are aligned to multiples of the interval since the Unix
//! epoch. Every source gets a bucket at every boundary between its first and
//! last observation, including empty ones: the trailing-window fallback of the
//! averager needs to see those intervals too.

use crate::data::types::{Bucket, Observation};
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::BTreeMap;

/// Default bucket length.
pub const DEFAULT_BUCKET_MINUTES: i64 = 5;

/// Observations of one source, sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSeries {
    pub source: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub scores: Vec<f64>,
}

impl SourceSeries {
    /// Build a series from one source's observations.
    ///
    /// The sort is stable: observations sharing a timestamp keep input order.
    pub fn new(source: impl Into<String>, mut observations: Vec<(DateTime<Utc>, f64)>) -> Self {
        observations.sort_by_key(|(ts, _)| *ts);
        let (timestamps, scores) = observations.into_iter().unzip();
        Self {
            source: source.into(),
            timestamps,
            scores,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Index range of observations in the closed interval `[from, to]`.
    pub fn closed_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> std::ops::Range<usize> {
        let lo = self.timestamps.partition_point(|ts| *ts < from);
        let hi = self.timestamps.partition_point(|ts| *ts <= to);
        lo..hi.max(lo)
    }

    /// Number of observations in the half-open interval `[from, to)`.
    pub fn count_half_open(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        let lo = self.timestamps.partition_point(|ts| *ts < from);
        let hi = self.timestamps.partition_point(|ts| *ts < to);
        hi.saturating_sub(lo)
    }
}

/// Split observations by source, in ascending source order.
pub fn group_by_source(observations: &[Observation]) -> Vec<SourceSeries> {
    let mut grouped: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    for obs in observations {
        grouped
            .entry(obs.source.as_str())
            .or_default()
            .push((obs.timestamp, obs.toxicity));
    }

    grouped
        .into_iter()
        .map(|(source, points)| SourceSeries::new(source, points))
        .collect()
}

/// Cuts a source's time range into fixed-length buckets.
#[derive(Debug, Clone, Copy)]
pub struct TimeBucketer {
    interval: Duration,
}

impl Default for TimeBucketer {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_BUCKET_MINUTES))
    }
}

impl TimeBucketer {
    /// Create a bucketer with the given interval length.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start of the bucket containing `timestamp`.
    pub fn bucket_start(&self, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, BucketError> {
        timestamp
            .duration_trunc(self.interval)
            .map_err(|e| BucketError::Alignment(format!("{timestamp}: {e}")))
    }

    /// Produce one bucket per interval boundary in the series' range.
    ///
    /// Returns no buckets for an empty series.
    pub fn bucket_source(&self, series: &SourceSeries) -> Result<Vec<Bucket>, BucketError> {
        let (Some(first), Some(last)) = (series.timestamps.first(), series.timestamps.last())
        else {
            return Ok(Vec::new());
        };

        let first_start = self.bucket_start(*first)?;
        let last_start = self.bucket_start(*last)?;

        let mut buckets = Vec::new();
        let mut start = first_start;
        while start <= last_start {
            let end = start + self.interval;
            let count = series.count_half_open(start, end);
            buckets.push(Bucket::new(series.source.clone(), start, count));
            start = end;
        }

        Ok(buckets)
    }
}

/// Bucketing errors.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("Cannot align timestamp to bucket boundary: {0}")]
    Alignment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_bucket_start_alignment() {
        let bucketer = TimeBucketer::default();
        assert_eq!(bucketer.bucket_start(at(10, 7, 59)).unwrap(), at(10, 5, 0));
        assert_eq!(bucketer.bucket_start(at(10, 5, 0)).unwrap(), at(10, 5, 0));
    }

    #[test]
    fn test_empty_buckets_are_kept() {
        let series = SourceSeries::new(
            "a",
            vec![(at(0, 1, 0), 0.1), (at(0, 2, 0), 0.2), (at(0, 16, 0), 0.3)],
        );
        let buckets = TimeBucketer::default().bucket_source(&series).unwrap();

        let starts: Vec<_> = buckets.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![at(0, 0, 0), at(0, 5, 0), at(0, 10, 0), at(0, 15, 0)]);

        let counts: Vec<_> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 0, 1]);
        assert!(buckets.iter().all(|b| b.is_missing()));
    }

    #[test]
    fn test_bucket_end_is_exclusive() {
        let series = SourceSeries::new("a", vec![(at(0, 0, 0), 1.0), (at(0, 5, 0), 2.0)]);
        let buckets = TimeBucketer::default().bucket_source(&series).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[1].count, 1);
    }

    #[test]
    fn test_empty_series_has_no_buckets() {
        let series = SourceSeries::new("ghost", Vec::new());
        assert!(TimeBucketer::default().bucket_source(&series).unwrap().is_empty());
    }

    #[test]
    fn test_group_by_source_sorted_and_stable() {
        let observations = vec![
            Observation::new("zeta", at(0, 3, 0), 0.3),
            Observation::new("alpha", at(0, 2, 0), 0.9),
            Observation::new("zeta", at(0, 1, 0), 0.1),
            Observation::new("zeta", at(0, 1, 0), 0.2),
        ];
        let grouped = group_by_source(&observations);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].source, "alpha");
        assert_eq!(grouped[1].source, "zeta");
        assert_eq!(grouped[1].scores, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_closed_range_includes_both_ends() {
        let series = SourceSeries::new(
            "a",
            vec![(at(0, 0, 0), 1.0), (at(0, 5, 0), 2.0), (at(0, 5, 1), 3.0)],
        );
        assert_eq!(series.closed_range(at(0, 0, 0), at(0, 5, 0)), 0..2);
        assert_eq!(series.closed_range(at(1, 0, 0), at(2, 0, 0)), 3..3);
    }
}
