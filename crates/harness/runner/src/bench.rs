use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use csv::WriterBuilder;
use harness_core::{
    bench::{BENCH_HEADER, BenchmarkRow},
    circuit::CircuitCase,
};
use tracing::{debug, info};

use crate::{
    executor::{RunError, TrialRunner},
    flush_stdout,
};

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("number of tries must be at least 1")]
    NoTries,
    #[error("trial {trial} of circuit `{circuit}` on `{version}` failed: {source}")]
    Trial {
        circuit: String,
        version: String,
        trial: usize,
        #[source]
        source: RunError,
    },
    #[error("trial {trial} of circuit `{circuit}` on `{version}`: evaluator exited unsuccessfully")]
    Evaluator {
        circuit: String,
        version: String,
        trial: usize,
    },
    #[error("failed to write benchmark results to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write benchmark results: {0}")]
    Csv(#[from] csv::Error),
}

/// Benchmarks every circuit `tries` times against `version` and writes the
/// mean runtimes to `output`.
///
/// The first failed trial aborts the run, rows written for earlier circuits
/// stay in the file.
pub async fn run_bench<R>(
    runner: &mut R,
    cases: &[CircuitCase],
    version: &str,
    tries: usize,
    output: &Path,
) -> Result<Vec<BenchmarkRow>, BenchError>
where
    R: TrialRunner + Send + ?Sized,
{
    if tries == 0 {
        return Err(BenchError::NoTries);
    }

    let io_failed = |source| BenchError::Io {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(io_failed)?;
    }

    let mut wtr = WriterBuilder::new().has_headers(false).from_path(output)?;
    wtr.write_record(BENCH_HEADER)?;
    wtr.flush().map_err(io_failed)?;

    info!(version, tries, circuits = cases.len(), "starting benchmark");

    let mut rows = Vec::with_capacity(cases.len());
    for case in cases {
        print!("Benchmarking circuit: {} ", case.name());
        flush_stdout();

        let mut samples: Vec<Duration> = Vec::with_capacity(tries);
        for trial in 0..tries {
            let result = runner
                .run_trial(case, version)
                .await
                .map_err(|source| BenchError::Trial {
                    circuit: case.name().to_string(),
                    version: version.to_string(),
                    trial,
                    source,
                })?;

            if !result.success {
                return Err(BenchError::Evaluator {
                    circuit: case.name().to_string(),
                    version: version.to_string(),
                    trial,
                });
            }

            samples.push(result.elapsed);
            print!(".");
            flush_stdout();
        }

        let row = BenchmarkRow::from_samples(case.name(), &samples).ok_or(BenchError::NoTries)?;
        println!(" {:.4}s", row.runtime);
        debug!(circuit = case.name(), runtime = row.runtime, "benchmarked circuit");

        wtr.serialize(&row)?;
        wtr.flush().map_err(io_failed)?;
        rows.push(row);
    }

    Ok(rows)
}
