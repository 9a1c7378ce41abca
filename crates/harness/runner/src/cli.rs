use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use harness_core::HarnessConfig;

#[derive(Parser)]
#[command(version, about, name = "garble-harness", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Project root containing `circuits/`, `archive/` and `bench/`.
    #[arg(long, env = "HARNESS_ROOT")]
    pub root: Option<PathBuf>,
    /// TOML configuration file. Flags override values from the file.
    #[arg(short, long, env = "HARNESS_CONFIG")]
    pub config: Option<PathBuf>,
    /// Seconds to wait for the evaluator before killing a trial.
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Use a fresh loopback port for every trial.
    #[arg(long)]
    pub ephemeral_port: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// benchmarks an implementation.
    Bench {
        /// Implementation version, selects `<prefix>_<role>_<label>`.
        label: String,
        /// Number of trials per circuit.
        #[arg(short, long)]
        tries: Option<usize>,
        /// Circuit name prefix filter.
        #[arg(long)]
        name: Option<String>,
    },
    /// records the baseline outputs as the oracle.
    GenerateTruth {
        /// Circuit name prefix filter.
        #[arg(long)]
        name: Option<String>,
    },
    /// checks an implementation against the oracle.
    Test {
        /// Implementation version, selects `<prefix>_<role>_<label>`.
        label: String,
    },
    /// merges all benchmark results into one file.
    Aggregate {},
    /// lists the circuit catalog.
    List {
        /// Circuit name prefix filter.
        #[arg(long)]
        name: Option<String>,
    },
}

impl Cli {
    /// Loads the config file, if any, and applies the command line overrides.
    pub fn load_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(timeout) = self.timeout {
            config.evaluator_timeout_secs = timeout;
        }
        if self.ephemeral_port {
            config.ephemeral_port = true;
        }
        if let Command::Bench {
            tries: Some(tries), ..
        } = &self.command
        {
            config.tries = *tries;
        }

        Ok(config)
    }
}

fn read_config(path: &Path) -> anyhow::Result<HarnessConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let mut config: HarnessConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;

    // A relative root is relative to the config file.
    if config.root.is_relative() {
        if let Some(parent) = path.parent() {
            config.root = parent.join(&config.root);
        }
    }

    Ok(config)
}
