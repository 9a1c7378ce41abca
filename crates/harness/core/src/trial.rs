use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one paired garbler/evaluator execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Evaluator stdout with surrounding whitespace trimmed.
    pub output: String,
    /// Wall-clock time of the evaluator alone.
    pub elapsed: Duration,
    /// Whether the evaluator exited successfully.
    pub success: bool,
}

impl RunResult {
    pub fn new(output: impl Into<String>, elapsed: Duration, success: bool) -> Self {
        Self {
            output: output.into(),
            elapsed,
            success,
        }
    }
}
