//! Stable and per-window source identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Window-local dense id → global id.
pub type LocalIdMap = BTreeMap<usize, usize>;

/// Source name → dense global id, fixed for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdTable {
    ids: BTreeMap<String, usize>,
}

impl IdTable {
    /// Assign ids `0..n` in the given column order.
    pub fn from_columns(columns: &[String]) -> Self {
        Self {
            ids: columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect(),
        }
    }

    pub fn get(&self, source: &str) -> Option<usize> {
        self.ids.get(source).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Local ids `0..k` for `surviving` (in order), mapped to their global ids.
    ///
    /// Sources unknown to the table are skipped.
    pub fn local_map<S: AsRef<str>>(&self, surviving: &[S]) -> LocalIdMap {
        surviving
            .iter()
            .enumerate()
            .filter_map(|(local, name)| self.get(name.as_ref()).map(|global| (local, global)))
            .collect()
    }
}
