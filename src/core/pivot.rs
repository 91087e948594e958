//! Source × time matrix of resampled toxicity values.

use crate::data::types::BucketRecord;
use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet};

/// Rows are bucket timestamps in strictly increasing order, columns are sources
/// in ascending name order. A cell is `None` when that source has no value for
/// that bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedMatrix {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    cells: Vec<Vec<Option<f64>>>,
}

impl PivotedMatrix {
    /// Pivot long-form records into a matrix.
    ///
    /// Each `(timestamp, source)` pair may appear at most once.
    pub fn from_records(records: &[BucketRecord]) -> Result<Self, PivotError> {
        let index: Vec<DateTime<Utc>> = records
            .iter()
            .map(|r| r.start)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let columns: Vec<String> = records
            .iter()
            .map(|r| r.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_of: BTreeMap<DateTime<Utc>, usize> =
            index.iter().enumerate().map(|(i, ts)| (*ts, i)).collect();
        let col_of: BTreeMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut cells = vec![vec![None; columns.len()]; index.len()];
        let mut seen = vec![vec![false; columns.len()]; index.len()];

        for record in records {
            let row = row_of[&record.start];
            let col = col_of[record.source.as_str()];
            if seen[row][col] {
                return Err(PivotError::DuplicateEntry {
                    source_name: record.source.clone(),
                    timestamp: record.start,
                });
            }
            seen[row][col] = true;
            cells[row][col] = record.retox;
        }

        Ok(Self {
            index,
            columns,
            cells,
        })
    }

    /// Number of time rows.
    pub fn rows(&self) -> usize {
        self.index.len()
    }

    /// Source names, in column order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn timestamp(&self, row: usize) -> Option<DateTime<Utc>> {
        self.index.get(row).copied()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// View over rows `[begin, end)`, clipped to the available rows.
    pub fn window(&self, begin: usize, end: usize) -> MatrixWindow<'_> {
        let end = end.min(self.rows());
        let begin = begin.min(end);
        MatrixWindow {
            matrix: self,
            begin,
            end,
        }
    }
}

/// A contiguous run of rows of a [`PivotedMatrix`].
#[derive(Debug, Clone, Copy)]
pub struct MatrixWindow<'a> {
    matrix: &'a PivotedMatrix,
    begin: usize,
    end: usize,
}

impl<'a> MatrixWindow<'a> {
    pub fn row_count(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Columns without any missing value inside the window, in column order.
    ///
    /// Over zero rows every column is complete.
    pub fn complete_columns(&self) -> Vec<usize> {
        (0..self.matrix.columns.len())
            .filter(|&col| {
                self.matrix.cells[self.begin..self.end]
                    .iter()
                    .all(|row| row[col].is_some())
            })
            .collect()
    }

    /// Timestamp of the first row holding a value in any of `columns`.
    pub fn first_valid_timestamp(&self, columns: &[usize]) -> Option<DateTime<Utc>> {
        (self.begin..self.end)
            .find(|&row| columns.iter().any(|&col| self.matrix.cells[row][col].is_some()))
            .map(|row| self.matrix.index[row])
    }

    /// Timestamp of the last row holding a value in any of `columns`.
    pub fn last_valid_timestamp(&self, columns: &[usize]) -> Option<DateTime<Utc>> {
        (self.begin..self.end)
            .rev()
            .find(|&row| columns.iter().any(|&col| self.matrix.cells[row][col].is_some()))
            .map(|row| self.matrix.index[row])
    }

    /// Dense `process × sample` matrix of the given columns.
    ///
    /// Missing cells (only possible for incomplete columns) become NaN.
    pub fn to_dense(&self, columns: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(columns.len(), self.row_count(), |p, s| {
            self.matrix.cells[self.begin + s][columns[p]].unwrap_or(f64::NAN)
        })
    }
}

/// Pivoting errors.
#[derive(Debug, thiserror::Error)]
pub enum PivotError {
    #[error("Duplicate entry for source '{source_name}' at {timestamp}")]
    DuplicateEntry {
        source_name: String,
        timestamp: DateTime<Utc>,
    },
}
