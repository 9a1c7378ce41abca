pub mod aggregate;
pub mod bench;
pub mod catalog;
pub mod cli;
pub mod executor;
pub mod oracle;

use std::{io::Write as _, process::ExitCode};

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use executor::Executor;

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "garble_harness=info,harness_runner=info";

/// Installs the global subscriber, logging to stderr.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}

/// Flushes progress printed without a trailing newline.
pub(crate) fn flush_stdout() {
    _ = std::io::stdout().flush();
}

pub async fn main() -> anyhow::Result<ExitCode> {
    init_tracing()?;
    run(Cli::parse()).await
}

/// Runs a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.load_config()?;
    info!(root = %config.root.display(), "loaded harness config");

    match cli.command {
        Command::Bench { label, name, .. } => {
            let cases = catalog::filter_by_prefix(
                catalog::list_circuits(&config.circuits_dir())?,
                name.as_deref(),
            );
            let output = config.bench_path(&label);
            let tries = config.tries;

            let mut executor = Executor::new(config);
            bench::run_bench(&mut executor, &cases, &label, tries, &output)
                .await
                .with_context(|| format!("benchmark of `{label}` failed"))?;

            println!("Results written to {}", output.display());
        }
        Command::GenerateTruth { name } => {
            let cases = catalog::filter_by_prefix(
                catalog::list_circuits(&config.circuits_dir())?,
                name.as_deref(),
            );
            let baseline = config.baseline.clone();
            let oracle_path = config.oracle_path();

            let mut executor = Executor::new(config);
            let entries = test::generate_truth(&mut executor, &cases, &baseline, &oracle_path)
                .await
                .context("failed to generate ground truth")?;

            println!(
                "Recorded {} circuits to {}",
                entries.len(),
                oracle_path.display()
            );
        }
        Command::Test { label } => {
            let circuits_dir = config.circuits_dir();
            let oracle_path = config.oracle_path();

            let mut executor = Executor::new(config);
            let report = test::run_tests(&mut executor, &circuits_dir, &oracle_path, &label)
                .await
                .with_context(|| format!("testing `{label}` failed"))?;

            println!("{} passed, {} failed", report.passed(), report.failed());
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Aggregate {} => {
            let summary = aggregate::aggregate(&config.results_dir())
                .context("failed to aggregate benchmark results")?;

            println!("Wrote {} rows to {}", summary.rows, summary.path.display());
        }
        Command::List { name } => {
            let cases = catalog::filter_by_prefix(
                catalog::list_circuits(&config.circuits_dir())?,
                name.as_deref(),
            );
            for case in cases {
                println!("{}", case.name());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
