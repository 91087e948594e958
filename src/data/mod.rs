//! Pipeline records and the file formats that carry them between stages.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::{parse_datetime, read_bucket_records, read_messages, read_observations};
pub use types::{
    format_timestamp, Bucket, BucketRecord, ClassificationRecord, ClassificationResponse,
    Observation, TIMESTAMP_FORMAT,
};
pub use writer::{write_buckets, JsonLinesWriter};

/// Errors raised while reading or writing pipeline files.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Invalid datetime '{value}' on line {line}")]
    InvalidDatetime { value: String, line: u64 },

    #[error("Invalid number '{value}' in column '{column}' on line {line}")]
    InvalidNumber {
        value: String,
        column: String,
        line: u64,
    },
}
