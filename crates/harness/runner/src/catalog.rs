use std::{
    fs, io,
    path::{Path, PathBuf},
};

use harness_core::circuit::CircuitCase;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("circuit catalog unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lists the circuits described in `dir`, sorted by name.
///
/// Per-party input files share the directory and are skipped.
pub fn list_circuits(dir: &Path) -> Result<Vec<CircuitCase>, CatalogError> {
    let unavailable = |source| CatalogError::Unavailable {
        path: dir.to_path_buf(),
        source,
    };

    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        if !entry.path().is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            debug!(file = ?entry.path(), "skipping non utf-8 file name");
            continue;
        };

        if let Some(case) = CircuitCase::from_file_name(file_name, dir) {
            cases.push(case);
        }
    }

    cases.sort_by(|a, b| a.name().cmp(b.name()));

    debug!(dir = %dir.display(), count = cases.len(), "listed circuits");

    Ok(cases)
}

/// Keeps the circuits whose name starts with `prefix`.
pub fn filter_by_prefix(cases: Vec<CircuitCase>, prefix: Option<&str>) -> Vec<CircuitCase> {
    match prefix {
        Some(prefix) => cases
            .into_iter()
            .filter(|case| case.name().starts_with(prefix))
            .collect(),
        None => cases,
    }
}
