//! Persisting an estimation run.
//!
//! Three JSON files share a base path and carry the iteration count in their
//! names, so runs with different iteration counts never clobber each other.

use crate::network::sliding::EstimationRun;
use crate::network::EstimationError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output file locations derived from a base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub global_ids: PathBuf,
    pub results: PathBuf,
    pub local_ids: PathBuf,
}

impl OutputPaths {
    /// `<base>_globalID_iterations_<n>.json` and its two siblings.
    pub fn new(base: &Path, iterations: usize) -> Self {
        let with_suffix = |kind: &str| {
            let mut name = base.as_os_str().to_os_string();
            name.push(format!("_{kind}_iterations_{iterations}.json"));
            PathBuf::from(name)
        };

        Self {
            global_ids: with_suffix("globalID"),
            results: with_suffix("results"),
            local_ids: with_suffix("localID"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.global_ids, &self.results, &self.local_ids]
    }
}

/// Write the run's id table, results and local maps.
pub fn write_run<T: Serialize>(
    run: &EstimationRun<T>,
    paths: &OutputPaths,
) -> Result<(), EstimationError> {
    write_json(&paths.global_ids, &run.global_ids)?;
    write_json(&paths.results, &run.results)?;
    write_json(&paths.local_ids, &run.local_ids)?;

    info!(
        "Wrote {} window results to {}",
        run.results.len(),
        paths.results.display()
    );
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), EstimationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
