//! Compile verification of generated mutants via `solc`.

use crate::process::{run_with_deadline, CancelFlag};
use crate::RunnerResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Pass/fail plus a short diagnostic; the core never interprets compiler
/// output beyond this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub passed: bool,
    /// First diagnostic line on failure, empty on success.
    pub diagnostic: String,
    pub elapsed_secs: f64,
}

/// Wraps `solc --bin <file>` as a deadline-boxed check that the mutant is an
/// independently compilable unit.
#[derive(Debug, Clone)]
pub struct SolcVerifier {
    solc_path: String,
    timeout: Duration,
}

impl SolcVerifier {
    pub fn new() -> Self {
        Self {
            solc_path: "solc".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_solc_path(mut self, path: impl Into<String>) -> Self {
        self.solc_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verify(&self, contract: &Path, cancel: &CancelFlag) -> RunnerResult<VerifyOutcome> {
        let mut cmd = Command::new(&self.solc_path);
        cmd.arg("--bin").arg(contract);

        let output = run_with_deadline(cmd, self.timeout, cancel, "solc")?;
        let outcome = if output.timed_out {
            VerifyOutcome {
                passed: false,
                diagnostic: "compilation timed out".to_string(),
                elapsed_secs: output.elapsed.as_secs_f64(),
            }
        } else if output.success() {
            VerifyOutcome {
                passed: true,
                diagnostic: String::new(),
                elapsed_secs: output.elapsed.as_secs_f64(),
            }
        } else {
            VerifyOutcome {
                passed: false,
                diagnostic: first_line(&output.stderr),
                elapsed_secs: output.elapsed.as_secs_f64(),
            }
        };

        if !outcome.passed {
            tracing::warn!(
                contract = %contract.display(),
                diagnostic = %outcome.diagnostic,
                "mutant failed verification"
            );
        }
        Ok(outcome)
    }
}

impl Default for SolcVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_skips_blanks() {
        assert_eq!(first_line("\n\nError: bad\nmore"), "Error: bad");
        assert_eq!(first_line(""), "unknown error");
    }

    // Exercised with a stand-in binary so the test does not need solc.
    #[test]
    fn failing_compiler_yields_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-solc");
        std::fs::write(&fake, "#!/bin/sh\necho 'Error: expected ;' >&2\nexit 1\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let verifier = SolcVerifier::new().with_solc_path(fake.display().to_string());
        let outcome = verifier
            .verify(Path::new("whatever.sol"), &CancelFlag::new())
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.diagnostic, "Error: expected ;");
    }

    #[test]
    fn succeeding_compiler_passes() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-solc");
        std::fs::write(&fake, "#!/bin/sh\necho 'Binary:'\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let verifier = SolcVerifier::new().with_solc_path(fake.display().to_string());
        let outcome = verifier
            .verify(Path::new("whatever.sol"), &CancelFlag::new())
            .unwrap();
        assert!(outcome.passed);
        assert!(outcome.diagnostic.is_empty());
    }
}
