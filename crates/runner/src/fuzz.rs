//! Echidna invocation and verdict classification.

use crate::process::{run_with_deadline, CancelFlag};
use crate::RunnerResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Coarse classification of one fuzzing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuzzStatus {
    /// The fuzzer falsified the injected oracle.
    Detected,
    /// The run finished with all properties passing.
    Undetected,
    /// Output matched neither signal; configuration or tooling problem.
    Error,
    /// The run was killed at the deadline.
    Timeout,
}

impl FuzzStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Detected => "DETECTED",
            Self::Undetected => "UNDETECTED",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// One fuzzing verdict plus the raw output for downstream log analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzVerdict {
    pub status: FuzzStatus,
    pub raw_output: String,
    pub elapsed_secs: f64,
}

/// Configuration for the Echidna property-mode run.
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    pub echidna_path: String,
    /// Per-contract wall-clock budget.
    pub timeout: Duration,
    pub test_limit: u64,
    /// Base directory for per-contract corpus dirs.
    pub corpus_dir: PathBuf,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            echidna_path: "echidna".to_string(),
            timeout: Duration::from_secs(120),
            test_limit: 1_000_000,
            corpus_dir: PathBuf::from("echidna-results"),
        }
    }
}

/// Runs Echidna against one mutant. The contract name must be the one the
/// assembler derived; classifying the textual output is the extent of the
/// interpretation done here.
#[derive(Debug, Clone)]
pub struct FuzzerRunner {
    config: FuzzConfig,
}

impl FuzzerRunner {
    pub fn new(config: FuzzConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        contract: &Path,
        contract_name: &str,
        cancel: &CancelFlag,
    ) -> RunnerResult<FuzzVerdict> {
        let corpus = self.config.corpus_dir.join(format!("corpus_{contract_name}"));

        let mut cmd = Command::new(&self.config.echidna_path);
        cmd.arg(contract)
            .args(["--contract", contract_name])
            .args(["--format", "text"])
            .args(["--test-mode", "property"])
            .arg("--corpus-dir")
            .arg(&corpus)
            .args(["--test-limit", &self.config.test_limit.to_string()]);

        tracing::info!(contract = %contract.display(), contract_name, "fuzzing mutant");
        let output = run_with_deadline(cmd, self.config.timeout, cancel, "echidna")?;

        let status = if output.timed_out {
            FuzzStatus::Timeout
        } else {
            classify(&output.combined())
        };
        tracing::info!(contract_name, status = status.label(), "fuzzing finished");

        Ok(FuzzVerdict {
            status,
            raw_output: output.combined(),
            elapsed_secs: output.elapsed.as_secs_f64(),
        })
    }
}

/// Map raw fuzzer text to a verdict. "falsified" wins over "passed" because a
/// run with several properties reports each separately.
fn classify(output: &str) -> FuzzStatus {
    let lower = output.to_lowercase();
    if lower.contains("falsified") {
        FuzzStatus::Detected
    } else if lower.contains("passed") || lower.contains("passing") {
        FuzzStatus::Undetected
    } else {
        FuzzStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsified_output_is_detected() {
        assert_eq!(
            classify("echidna_test_classic_call: falsified!\n  Call sequence: ..."),
            FuzzStatus::Detected
        );
    }

    #[test]
    fn falsified_wins_over_passing_properties() {
        let mixed = "echidna_test_a: passing\nechidna_test_b: FALSIFIED!";
        assert_eq!(classify(mixed), FuzzStatus::Detected);
    }

    #[test]
    fn all_passing_is_undetected() {
        assert_eq!(
            classify("echidna_test_solvency: passing"),
            FuzzStatus::Undetected
        );
        assert_eq!(classify("all tests passed"), FuzzStatus::Undetected);
    }

    #[test]
    fn unrecognized_output_is_an_error() {
        assert_eq!(
            classify("No tests found in ABI"),
            FuzzStatus::Error
        );
        assert_eq!(classify(""), FuzzStatus::Error);
    }

    #[test]
    fn status_labels_match_reporting_vocabulary() {
        assert_eq!(FuzzStatus::Detected.label(), "DETECTED");
        assert_eq!(FuzzStatus::Timeout.label(), "TIMEOUT");
    }
}
