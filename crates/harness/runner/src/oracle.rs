use std::{
    collections::HashMap,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, WriterBuilder};
use harness_core::test::{ORACLE_HEADER, OracleEntry};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle not found at {path}, generate the ground truth first")]
    NotFound { path: PathBuf },
    #[error("oracle at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to access oracle at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write oracle: {0}")]
    Csv(#[from] csv::Error),
}

/// Expected evaluator outputs keyed by circuit name, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Oracle {
    entries: Vec<OracleEntry>,
    index: HashMap<String, usize>,
}

impl Oracle {
    /// Builds an oracle, a later entry for the same circuit replaces an
    /// earlier one.
    pub fn from_entries(entries: impl IntoIterator<Item = OracleEntry>) -> Self {
        let mut oracle = Self::default();
        for entry in entries {
            match oracle.index.get(&entry.case) {
                Some(&idx) => oracle.entries[idx] = entry,
                None => {
                    oracle.index.insert(entry.case.clone(), oracle.entries.len());
                    oracle.entries.push(entry);
                }
            }
        }
        oracle
    }

    /// Returns the expected output of a circuit.
    pub fn get(&self, case: &str) -> Option<&str> {
        self.index
            .get(case)
            .map(|&idx| self.entries[idx].output.as_str())
    }

    pub fn entries(&self) -> &[OracleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes the oracle, replacing any existing file.
pub fn save(entries: &[OracleEntry], path: &Path) -> Result<(), OracleError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| OracleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(ORACLE_HEADER)?;
    for entry in entries {
        wtr.serialize(entry)?;
    }
    wtr.flush().map_err(|source| OracleError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), entries = entries.len(), "saved oracle");

    Ok(())
}

/// Loads the oracle.
pub fn load(path: &Path) -> Result<Oracle, OracleError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => OracleError::NotFound {
            path: path.to_path_buf(),
        },
        _ => OracleError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let corrupt = |reason: String| OracleError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers().map_err(|e| corrupt(e.to_string()))?.clone();
    for column in ORACLE_HEADER {
        if !headers.iter().any(|header| header == column) {
            return Err(corrupt(format!("missing column `{column}`")));
        }
    }

    let entries = rdr
        .deserialize::<OracleEntry>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| corrupt(e.to_string()))?;

    debug!(path = %path.display(), entries = entries.len(), "loaded oracle");

    Ok(Oracle::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<OracleEntry> {
        pairs
            .iter()
            .map(|(case, output)| OracleEntry::new(*case, *output))
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench").join("test-cases.csv");
        let saved = entries(&[
            ("add", "0111"),
            ("mult", "10,01"),
            ("quoted", "say \"hi\""),
            ("multiline", "1\n0"),
        ]);

        save(&saved, &path).unwrap();
        let oracle = load(&path).unwrap();

        assert_eq!(oracle.entries(), saved.as_slice());
        assert_eq!(oracle.get("mult"), Some("10,01"));
        assert_eq!(oracle.get("multiline"), Some("1\n0"));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");

        save(&entries(&[("add", "7")]), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "case,output\nadd,7\n");
    }

    #[test]
    fn test_regeneration_replaces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");

        save(&entries(&[("add", "7"), ("sub", "1")]), &path).unwrap();
        save(&entries(&[("mult", "12")]), &path).unwrap();
        let oracle = load(&path).unwrap();

        assert_eq!(oracle.len(), 1);
        assert_eq!(oracle.get("mult"), Some("12"));
        assert_eq!(oracle.get("add"), None);
        assert_eq!(oracle.get("sub"), None);
    }

    #[test]
    fn test_empty_oracle_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");

        save(&[], &path).unwrap();

        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_rows_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");
        fs::write(&path, "case,output\nadd,7\nsub,1\nadd,8\n").unwrap();

        let oracle = load(&path).unwrap();

        assert_eq!(oracle.len(), 2);
        assert_eq!(oracle.get("add"), Some("8"));
        assert_eq!(oracle.entries()[0].case, "add");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("test-cases.csv")).unwrap_err();
        assert!(matches!(err, OracleError::NotFound { .. }));
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");
        fs::write(&path, "case,result\nadd,7\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(
            matches!(&err, OracleError::Corrupt { reason, .. } if reason.contains("output")),
            "{err}"
        );
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-cases.csv");
        fs::write(&path, "note,case,output\nx,add,7\n").unwrap();

        assert_eq!(load(&path).unwrap().get("add"), Some("7"));
    }
}
