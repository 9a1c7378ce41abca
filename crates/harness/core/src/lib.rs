pub mod bench;
pub mod circuit;
pub mod network;
pub mod trial;

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::network::RendezvousAddr;

/// Directory under the project root holding circuit descriptions and inputs.
pub const CIRCUITS_DIR: &str = "circuits";
/// Directory under the project root holding the protocol executables.
pub const ARCHIVE_DIR: &str = "archive";
/// Directory under the project root holding oracle and benchmark files.
pub const RESULTS_DIR: &str = "bench";
/// Name of the ground-truth oracle file.
pub const ORACLE_FILE: &str = "test-cases.csv";
/// Name of the cross-implementation aggregate file.
pub const AGGREGATE_FILE: &str = "agg-results.csv";
/// Suffix of a per-implementation benchmark result file.
pub const BENCH_FILE_SUFFIX: &str = "-bench.csv";

pub const DEFAULT_TOOL_PREFIX: &str = "yaos";
pub const DEFAULT_BASELINE: &str = "baseline";
pub const DEFAULT_TRIES: usize = 50;
pub const DEFAULT_GRACE_MS: u64 = 100;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_EVALUATOR_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Garbler,
    Evaluator,
}

impl Role {
    /// Name used in the executable template `<prefix>_<role>_<version>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Garbler => "garbler",
            Role::Evaluator => "evaluator",
        }
    }

    /// Index of the party's input file, `<name>-input-<index>.txt`.
    pub fn input_index(&self) -> u8 {
        match self {
            Role::Garbler => 1,
            Role::Evaluator => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the runner decides that the garbler is listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Readiness {
    /// Sleep for a fixed grace period after starting the garbler.
    Delay {
        #[serde(default = "default_grace_ms")]
        grace_ms: u64,
    },
    /// Wait until the garbler prints a line containing `marker` on stdout.
    Marker {
        marker: String,
        #[serde(default = "default_ready_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Delay {
            grace_ms: DEFAULT_GRACE_MS,
        }
    }
}

fn default_grace_ms() -> u64 {
    DEFAULT_GRACE_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

/// Harness configuration.
///
/// Every trial receives the rendezvous address from here, there is no other
/// shared state between trials. Elapsed times only ever cover the evaluator,
/// garbler setup is excluded.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Project root containing `circuits/`, `archive/` and `bench/`.
    #[builder(into, default = PathBuf::from("."))]
    pub root: PathBuf,
    /// Executable prefix, executables are named `<prefix>_<role>_<version>`.
    #[builder(into, default = DEFAULT_TOOL_PREFIX.to_string())]
    pub tool_prefix: String,
    /// Version used to record the ground truth.
    #[builder(into, default = DEFAULT_BASELINE.to_string())]
    pub baseline: String,
    /// Number of trials per circuit when benchmarking.
    #[builder(default = DEFAULT_TRIES)]
    pub tries: usize,
    /// Address the garbler listens on and the evaluator connects to.
    #[builder(default)]
    pub rendezvous: RendezvousAddr,
    /// Allocate a fresh loopback port for every trial instead of using
    /// `rendezvous.port`.
    #[builder(default)]
    pub ephemeral_port: bool,
    #[builder(default)]
    pub readiness: Readiness,
    /// Upper bound on the evaluator's runtime in seconds.
    #[builder(default = DEFAULT_EVALUATOR_TIMEOUT_SECS)]
    pub evaluator_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HarnessConfig {
    /// Returns the circuits directory.
    pub fn circuits_dir(&self) -> PathBuf {
        self.root.join(CIRCUITS_DIR)
    }

    /// Returns the executables directory.
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// Returns the directory holding oracle and benchmark files.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    /// Returns the oracle path.
    pub fn oracle_path(&self) -> PathBuf {
        self.results_dir().join(ORACLE_FILE)
    }

    /// Returns the benchmark result path for an implementation label.
    pub fn bench_path(&self, label: &str) -> PathBuf {
        self.results_dir().join(format!("{label}{BENCH_FILE_SUFFIX}"))
    }

    /// Returns the path of the executable for `role` built as `version`.
    pub fn executable(&self, role: Role, version: &str) -> PathBuf {
        executable_path(&self.archive_dir(), &self.tool_prefix, role, version)
    }

    /// Returns the evaluator timeout.
    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluator_timeout_secs)
    }
}

/// Resolves `<dir>/<prefix>_<role>_<version>`.
fn executable_path(dir: &Path, prefix: &str, role: Role, version: &str) -> PathBuf {
    dir.join(format!("{prefix}_{role}_{version}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();

        assert_eq!(config.tries, 50);
        assert_eq!(config.rendezvous.host, "localhost");
        assert_eq!(config.rendezvous.port, 8000);
        assert_eq!(config.readiness, Readiness::Delay { grace_ms: 100 });
        assert_eq!(config.baseline, "baseline");
        assert!(!config.ephemeral_port);
    }

    #[test]
    fn test_executable_template() {
        let config = HarnessConfig::builder().root("/proj").build();

        assert_eq!(
            config.executable(Role::Garbler, "v2"),
            PathBuf::from("/proj/archive/yaos_garbler_v2")
        );
        assert_eq!(
            config.executable(Role::Evaluator, "baseline"),
            PathBuf::from("/proj/archive/yaos_evaluator_baseline")
        );
    }

    #[test]
    fn test_result_paths() {
        let config = HarnessConfig::builder().root("/proj").build();

        assert_eq!(config.oracle_path(), PathBuf::from("/proj/bench/test-cases.csv"));
        assert_eq!(config.bench_path("v2"), PathBuf::from("/proj/bench/v2-bench.csv"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{ "tries": 3, "readiness": { "mode": "marker", "marker": "READY" } }"#,
        )
        .unwrap();

        assert_eq!(config.tries, 3);
        assert_eq!(config.tool_prefix, "yaos");
        assert_eq!(
            config.readiness,
            Readiness::Marker {
                marker: "READY".to_string(),
                timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            }
        );
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Garbler.to_string(), "garbler");
        assert_eq!(Role::Evaluator.to_string(), "evaluator");
        assert_eq!(Role::Garbler.input_index(), 1);
        assert_eq!(Role::Evaluator.input_index(), 2);
    }
}
