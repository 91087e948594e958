//! Readers for the three input formats of the pipeline.

use crate::config::ColumnConfig;
use crate::data::types::{BucketRecord, Observation};
use crate::data::DataError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::path::Path;
use tracing::{debug, info};

/// Layouts carrying an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Wall-clock layouts, interpreted in the configured time zone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Read messages to classify.
///
/// Files whose name ends in `csv` are read as header-less CSV and the first
/// field of each record is used. Anything else is read as one message per line.
pub fn read_messages(path: &Path) -> Result<Vec<String>, DataError> {
    let is_csv = path.to_string_lossy().to_lowercase().ends_with("csv");

    if is_csv {
        info!("Opening {:?} as CSV file, assuming first column contains messages", path);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut messages = Vec::new();
        for result in reader.records() {
            let record = result?;
            if let Some(first) = record.get(0) {
                messages.push(first.trim().to_string());
            }
        }
        Ok(messages)
    } else {
        info!("Opening {:?} as text file, assuming one message per line", path);
        let content = std::fs::read_to_string(path)?;
        Ok(content.lines().map(|l| l.trim().to_string()).collect())
    }
}

/// Read raw scored observations (one row per message).
///
/// Rows with an empty toxicity cell carry no score and are skipped.
pub fn read_observations(
    path: &Path,
    columns: &ColumnConfig,
    tz: Tz,
) -> Result<Vec<Observation>, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let toxicity_idx = column_index(&headers, &columns.toxicity)?;
    let source_idx = column_index(&headers, &columns.source)?;
    let datetime_idx = column_index(&headers, &columns.datetime)?;

    let mut observations = Vec::new();
    let mut unscored = 0usize;

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let raw_score = record.get(toxicity_idx).unwrap_or("").trim();
        let Some(toxicity) = parse_optional_number(raw_score, &columns.toxicity, line)? else {
            unscored += 1;
            continue;
        };

        let source = record.get(source_idx).unwrap_or("").to_string();
        let timestamp = parse_cell_datetime(record.get(datetime_idx).unwrap_or(""), tz, line)?;

        observations.push(Observation {
            source,
            timestamp,
            toxicity,
        });
    }

    if unscored > 0 {
        debug!("Skipped {} rows without a toxicity score", unscored);
    }
    info!("Read {} observations from {:?}", observations.len(), path);

    Ok(observations)
}

/// Read resampled buckets in long form (one row per source and bucket).
pub fn read_bucket_records(
    path: &Path,
    columns: &ColumnConfig,
    tz: Tz,
) -> Result<Vec<BucketRecord>, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let retox_idx = column_index(&headers, &columns.retox)?;
    let source_idx = column_index(&headers, &columns.source)?;
    let datetime_idx = column_index(&headers, &columns.datetime)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let retox =
            parse_optional_number(record.get(retox_idx).unwrap_or("").trim(), &columns.retox, line)?;
        let start = parse_cell_datetime(record.get(datetime_idx).unwrap_or(""), tz, line)?;

        records.push(BucketRecord {
            source: record.get(source_idx).unwrap_or("").to_string(),
            start,
            retox,
        });
    }

    info!("Read {} resampled rows from {:?}", records.len(), path);
    Ok(records)
}

/// Parse a timestamp cell.
///
/// Values with an offset are converted to UTC directly. Values without one are
/// taken as wall-clock time in `tz`. A bare date means midnight.
pub fn parse_datetime(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    // Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_cell_datetime(raw: &str, tz: Tz, line: u64) -> Result<DateTime<Utc>, DataError> {
    parse_datetime(raw, tz).ok_or_else(|| DataError::InvalidDatetime {
        value: raw.to_string(),
        line,
    })
}

/// Empty cells and `nan` read as missing; anything else must be a number.
fn parse_optional_number(raw: &str, column: &str, line: u64) -> Result<Option<f64>, DataError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| DataError::InvalidNumber {
            value: raw.to_string(),
            column: column.to_string(),
            line,
        })
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, DataError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DataError::MissingColumn(name.to_string()))
}
