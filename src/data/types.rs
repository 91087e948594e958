//! Record types flowing between the pipeline stages.
//!
//! Observations are written once by the classification stage and never mutated.
//! Buckets are created empty and filled exactly once by the averaging policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used for every timestamp this crate writes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way output files and window keys carry it.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// A single scored message attributed to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Channel, chat or sender the message came from
    pub source: String,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
    /// Toxicity score assigned by the classification stage
    pub toxicity: f64,
}

impl Observation {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>, toxicity: f64) -> Self {
        Self {
            source: source.into(),
            timestamp,
            toxicity,
        }
    }
}

/// One fixed-length time interval of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Source the bucket belongs to
    pub source: String,
    /// Inclusive start of the interval
    pub start: DateTime<Utc>,
    /// Raw observations in `[start, start + interval)`
    pub count: usize,
    /// Resampled toxicity; `None` means not enough evidence
    pub retox: Option<f64>,
}

impl Bucket {
    /// Create an empty bucket; `retox` is filled in later by the averager.
    pub fn new(source: impl Into<String>, start: DateTime<Utc>, count: usize) -> Self {
        Self {
            source: source.into(),
            start,
            count,
            retox: None,
        }
    }

    /// Whether the averager left this bucket without a value.
    pub fn is_missing(&self) -> bool {
        self.retox.is_none()
    }
}

/// A resampled row as read back by the estimation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRecord {
    pub source: String,
    pub start: DateTime<Utc>,
    pub retox: Option<f64>,
}

impl From<Bucket> for BucketRecord {
    fn from(bucket: Bucket) -> Self {
        Self {
            source: bucket.source,
            start: bucket.start,
            retox: bucket.retox,
        }
    }
}

/// Scoring service reply, or the error that replaced it.
///
/// `Failed` comes first so a bare JSON string reads back as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationResponse<R = serde_json::Value> {
    Failed(String),
    Scored(R),
}

/// One line of the classification output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord<R = serde_json::Value> {
    pub message: String,
    pub response: ClassificationResponse<R>,
}

impl<R> ClassificationRecord<R> {
    /// Record the outcome of one scoring call.
    pub fn from_outcome(message: impl Into<String>, outcome: Result<R, String>) -> Self {
        Self {
            message: message.into(),
            response: match outcome {
                Ok(response) => ClassificationResponse::Scored(response),
                Err(error) => ClassificationResponse::Failed(error),
            },
        }
    }

    /// Whether the scoring call failed for this message.
    pub fn is_failure(&self) -> bool {
        matches!(self.response, ClassificationResponse::Failed(_))
    }
}

impl ClassificationRecord {
    pub fn scored(message: impl Into<String>, response: serde_json::Value) -> Self {
        Self::from_outcome(message, Ok(response))
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::from_outcome(message, Err(error.into()))
    }

    /// Summary score for `attribute`, when the reply carries one.
    pub fn summary_score(&self, attribute: &str) -> Option<f64> {
        match &self.response {
            ClassificationResponse::Scored(value) => value
                .get("attributeScores")?
                .get(attribute)?
                .get("summaryScore")?
                .get("value")?
                .as_f64(),
            ClassificationResponse::Failed(_) => None,
        }
    }

    /// The TOXICITY summary score, when present.
    pub fn toxicity_score(&self) -> Option<f64> {
        self.summary_score("TOXICITY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_starts_missing() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bucket = Bucket::new("a", start, 3);
        assert!(bucket.is_missing());
        assert_eq!(bucket.count, 3);
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-09 14:05:00");
    }

    #[test]
    fn test_record_serializes_flat() {
        let failed = ClassificationRecord::failed("hi", "HTTP 429");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, serde_json::json!({"message": "hi", "response": "HTTP 429"}));

        let scored = ClassificationRecord::scored("hi", serde_json::json!({"languages": ["en"]}));
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["response"]["languages"][0], "en");
    }

    #[test]
    fn test_toxicity_score_extraction() {
        let record = ClassificationRecord::scored(
            "you are great",
            serde_json::json!({
                "attributeScores": {
                    "TOXICITY": {"summaryScore": {"value": 0.042, "type": "PROBABILITY"}}
                }
            }),
        );
        assert_eq!(record.toxicity_score(), Some(0.042));
        assert!(!record.is_failure());

        let failed = ClassificationRecord::failed("x", "timeout");
        assert_eq!(failed.toxicity_score(), None);
        assert!(failed.is_failure());
    }

    #[test]
    fn test_record_roundtrip_keeps_error_string() {
        let line = r#"{"message":"m","response":"quota exceeded"}"#;
        let record: ClassificationRecord = serde_json::from_str(line).unwrap();
        assert!(record.is_failure());
    }
}
