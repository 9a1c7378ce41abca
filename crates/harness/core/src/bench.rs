use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Header of a per-implementation benchmark result file.
pub const BENCH_HEADER: [&str; 2] = ["case", "runtime"];
/// Header of the aggregate file.
pub const AGGREGATE_HEADER: [&str; 3] = ["name", "circuit", "runtime"];

/// Mean runtime of one circuit over all of its trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRow {
    pub case: String,
    /// Mean elapsed seconds, written with 4 decimal places.
    #[serde(serialize_with = "serialize_runtime")]
    pub runtime: f64,
}

impl BenchmarkRow {
    /// Computes the row from the trial samples, returning `None` if there are
    /// no samples.
    pub fn from_samples(case: impl Into<String>, samples: &[Duration]) -> Option<Self> {
        Some(Self {
            case: case.into(),
            runtime: mean_secs(samples)?,
        })
    }
}

fn serialize_runtime<S: Serializer>(runtime: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{runtime:.4}"))
}

/// A benchmark row as read back from a result file.
///
/// The runtime is kept as text so that re-emitting it is lossless.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchmarkRecord {
    pub case: String,
    pub runtime: String,
}

/// A benchmark row tagged with the implementation it was measured on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub name: String,
    pub circuit: String,
    pub runtime: String,
}

impl AggregatedRow {
    pub fn new(label: impl Into<String>, record: BenchmarkRecord) -> Self {
        Self {
            name: label.into(),
            circuit: record.case,
            runtime: record.runtime,
        }
    }
}

/// Arithmetic mean of the samples in seconds.
pub fn mean_secs(samples: &[Duration]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let total: f64 = samples.iter().map(Duration::as_secs_f64).sum();
    Some(total / samples.len() as f64)
}
