//! Writers for stage outputs.

use crate::config::ColumnConfig;
use crate::data::types::{format_timestamp, Bucket};
use crate::data::DataError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Newline-delimited JSON sink.
pub struct JsonLinesWriter<W: Write> {
    inner: BufWriter<W>,
    lines: usize,
}

impl JsonLinesWriter<File> {
    /// Create (or truncate) a JSON lines file.
    pub fn create(path: &Path) -> Result<Self, DataError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            lines: 0,
        }
    }

    /// Serialize a record and append it as one line.
    ///
    /// Serialization happens before anything is written, so a record that
    /// fails to serialize leaves the file untouched.
    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), DataError> {
        let line = serde_json::to_string(record)?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W, DataError> {
        self.inner
            .into_inner()
            .map_err(|e| DataError::Io(e.into_error()))
    }
}

/// Write buckets in long form: `source,<datetime>,count,retox`.
///
/// Missing `retox` values are written as empty cells.
pub fn write_buckets(
    path: &Path,
    buckets: &[Bucket],
    columns: &ColumnConfig,
) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)?;
    write_bucket_rows(&mut writer, buckets, columns)?;
    writer.flush()?;
    Ok(())
}

fn write_bucket_rows<W: Write>(
    writer: &mut csv::Writer<W>,
    buckets: &[Bucket],
    columns: &ColumnConfig,
) -> Result<(), DataError> {
    writer.write_record([
        columns.source.as_str(),
        columns.datetime.as_str(),
        "count",
        columns.retox.as_str(),
    ])?;

    for bucket in buckets {
        let retox = bucket.retox.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            bucket.source.clone(),
            format_timestamp(bucket.start),
            bucket.count.to_string(),
            retox,
        ])?;
    }

    Ok(())
}
