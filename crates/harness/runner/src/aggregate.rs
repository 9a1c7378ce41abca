use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, WriterBuilder};
use harness_core::{
    AGGREGATE_FILE, BENCH_FILE_SUFFIX,
    bench::{AGGREGATE_HEADER, AggregatedRow, BENCH_HEADER, BenchmarkRecord},
};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("benchmark results at {path} are malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("failed to write aggregate results: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    pub rows: usize,
    pub path: PathBuf,
}

/// Merges every `<label>-bench.csv` in `results_dir` into `agg-results.csv`.
///
/// Files are read in label order, runtimes are copied as written.
pub fn aggregate(results_dir: &Path) -> Result<AggregateSummary, AggregateError> {
    let io_failed = |path: &Path| {
        let path = path.to_path_buf();
        move |source| AggregateError::Io { path, source }
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(results_dir).map_err(io_failed(results_dir))? {
        let entry = entry.map_err(io_failed(results_dir))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(label) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.strip_suffix(BENCH_FILE_SUFFIX))
            .map(str::to_string)
        else {
            continue;
        };

        if label.is_empty() {
            warn!(file = %path.display(), "skipping benchmark file without label");
            continue;
        }

        files.push((label, path));
    }
    files.sort();

    let mut rows = Vec::new();
    for (label, path) in &files {
        let records = read_records(path)?;
        debug!(label, records = records.len(), "read benchmark results");
        rows.extend(
            records
                .into_iter()
                .map(|record| AggregatedRow::new(label.as_str(), record)),
        );
    }

    let output = results_dir.join(AGGREGATE_FILE);
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(&output)?;
    wtr.write_record(AGGREGATE_HEADER)?;
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(io_failed(&output))?;

    info!(
        files = files.len(),
        rows = rows.len(),
        path = %output.display(),
        "aggregated benchmark results"
    );

    Ok(AggregateSummary {
        rows: rows.len(),
        path: output,
    })
}

fn read_records(path: &Path) -> Result<Vec<BenchmarkRecord>, AggregateError> {
    let malformed = |reason: String| AggregateError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|source| AggregateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new().from_reader(file);

    let headers = rdr.headers().map_err(|e| malformed(e.to_string()))?.clone();
    for column in BENCH_HEADER {
        if !headers.iter().any(|header| header == column) {
            return Err(malformed(format!("missing column `{column}`")));
        }
    }

    rdr.deserialize()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(e.to_string()))
}
