//! End-to-end tests driving the stages through files on disk.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use toxnet::classify::Classifier;
use toxnet::config::ColumnConfig;
use toxnet::core::{PivotedMatrix, Resampler};
use toxnet::data::{
    read_bucket_records, read_messages, read_observations, write_buckets, ClassificationRecord,
    JsonLinesWriter,
};
use toxnet::network::{
    write_run, EstimatorSettings, GaussianTransferEntropy, OutputPaths, SlidingWindowEstimator,
};
use toxnet::perspective::{PerspectiveError, ToxicityScorer};

/// Deterministic uniform numbers in `[0, 1)`.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Six messages per source and bucket, all carrying the bucket's score and
/// none on a bucket boundary, so each resampled value equals that score.
fn write_scored_csv(path: &Path, series: &[(&str, Vec<f64>)]) {
    let mut csv = String::from("source,date,toxicity\n");
    for (source, values) in series {
        for (bucket, value) in values.iter().enumerate() {
            for j in 0..6 {
                let ts = start() + Duration::minutes(5 * bucket as i64) + Duration::seconds(10 + 40 * j);
                writeln!(csv, "{source},{},{value}", ts.format("%Y-%m-%d %H:%M:%S")).unwrap();
            }
        }
    }
    std::fs::write(path, csv).unwrap();
}

#[test]
fn test_resample_then_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let scored = dir.path().join("scored.csv");
    let resampled = dir.path().join("resampled.csv");
    let columns = ColumnConfig::default();

    let mut rng = Lcg(7);
    let lead: Vec<f64> = (0..400).map(|_| rng.next()).collect();
    let follow: Vec<f64> = (0..400)
        .map(|k| {
            let driven = if k >= 2 { lead[k - 2] } else { 0.0 };
            0.8 * driven + 0.2 * rng.next()
        })
        .collect();
    let noise: Vec<f64> = (0..400).map(|_| rng.next()).collect();
    write_scored_csv(
        &scored,
        &[("lead", lead.clone()), ("follow", follow), ("noise", noise)],
    );

    let observations = read_observations(&scored, &columns, chrono_tz::UTC).unwrap();
    assert_eq!(observations.len(), 3 * 400 * 6);

    let (buckets, summary) = Resampler::default().resample(&observations).unwrap();
    assert_eq!(summary.sources, 3);
    assert_eq!(summary.buckets, 1200);
    assert_eq!(summary.short_window, 1200);
    assert_eq!(summary.missing, 0);
    write_buckets(&resampled, &buckets, &columns).unwrap();

    let records = read_bucket_records(&resampled, &columns, chrono_tz::UTC).unwrap();
    let matrix = PivotedMatrix::from_records(&records).unwrap();
    assert_eq!(matrix.rows(), 400);
    assert_eq!(matrix.columns(), ["follow", "lead", "noise"]);
    approx::assert_relative_eq!(matrix.value(17, 1).unwrap(), lead[17], epsilon = 1e-12);

    let mut estimator = SlidingWindowEstimator::new(
        GaussianTransferEntropy::new(),
        EstimatorSettings::default(),
        200,
        2,
    )
    .unwrap();
    let run = estimator.run(&matrix).unwrap();

    let keys: Vec<&str> = run.results.keys().map(String::as_str).collect();
    assert_eq!(keys, ["2024-03-01 00:00:00", "2024-03-01 16:40:00"]);
    assert_eq!(run.global_ids.get("lead"), Some(1));

    for (key, network) in &run.results {
        assert_eq!(network.n_processes, 3, "window {key}");
        let into_follow = &network.targets[&0];
        assert!(
            into_follow.sources.iter().any(|s| s.source == 1 && s.lag == 2),
            "window {key} missed lead -> follow: {:?}",
            into_follow.sources
        );
        assert_eq!(run.local_ids[key].get(&1), Some(&1));
    }

    let base = dir.path().join("net");
    let paths = OutputPaths::new(&base, 2);
    write_run(&run, &paths).unwrap();

    let global: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.global_ids).unwrap()).unwrap();
    assert_eq!(global, serde_json::json!({"follow": 0, "lead": 1, "noise": 2}));
    assert!(dir.path().join("net_results_iterations_2.json").exists());
    assert!(dir.path().join("net_localID_iterations_2.json").exists());
}

#[test]
fn test_gap_longer_than_a_day_drops_source_from_window() {
    let dir = tempfile::tempdir().unwrap();
    let scored = dir.path().join("scored.csv");
    let resampled = dir.path().join("resampled.csv");
    let columns = ColumnConfig::default();

    // "steady" posts every bucket for two days; "bursty" posts at the very
    // start and again two days later, leaving a stretch with nothing in the
    // trailing 24 hours.
    let steady = vec![0.5; 2 * 288 + 1];
    write_scored_csv(&scored, &[("steady", steady)]);
    let mut csv = std::fs::read_to_string(&scored).unwrap();
    csv.push_str("bursty,2024-03-01 00:00:30,0.9\n");
    csv.push_str("bursty,2024-03-03 00:00:30,0.1\n");
    std::fs::write(&scored, csv).unwrap();

    let observations = read_observations(&scored, &columns, chrono_tz::UTC).unwrap();
    let (buckets, summary) = Resampler::default().resample(&observations).unwrap();
    assert!(summary.missing > 0);
    write_buckets(&resampled, &buckets, &columns).unwrap();

    let records = read_bucket_records(&resampled, &columns, chrono_tz::UTC).unwrap();
    assert!(records.iter().any(|r| r.source == "bursty" && r.retox.is_none()));

    let matrix = PivotedMatrix::from_records(&records).unwrap();
    let window = matrix.window(300, 400);
    let kept: Vec<&str> = window
        .complete_columns()
        .into_iter()
        .map(|c| matrix.columns()[c].as_str())
        .collect();
    assert_eq!(kept, ["steady"]);
}

/// Scores by message length; refuses anything containing "spam".
struct LengthScorer;

impl ToxicityScorer for LengthScorer {
    type Response = serde_json::Value;

    fn score(&self, text: &str) -> Result<serde_json::Value, PerspectiveError> {
        if text.contains("spam") {
            return Err(PerspectiveError::Server {
                status: 400,
                message: "Attribute TOXICITY does not support request languages".to_string(),
            });
        }
        Ok(serde_json::json!({
            "attributeScores": {
                "TOXICITY": { "summaryScore": { "value": text.len() as f64 / 10.0, "type": "PROBABILITY" } }
            },
            "languages": ["en"]
        }))
    }
}

#[test]
fn test_classify_csv_input_to_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("messages.csv");
    let output = dir.path().join("scored.jsonl");
    std::fs::write(&input, "hello,ignored\n  spam spam  \nbye\n").unwrap();

    let messages = read_messages(&input).unwrap();
    assert_eq!(messages, ["hello", "spam spam", "bye"]);

    let mut sink = JsonLinesWriter::create(&output).unwrap();
    let summary = Classifier::new(Arc::new(AtomicBool::new(true)))
        .run(&messages, &LengthScorer, &mut sink)
        .unwrap();
    sink.finish().unwrap();

    assert_eq!(summary.classified, 2);
    assert_eq!(summary.failed, 1);

    let records: Vec<ClassificationRecord> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].toxicity_score(), Some(0.5));
    assert!(records[1].is_failure());
    assert_eq!(records[2].toxicity_score(), Some(0.3));
}
