use std::path::PathBuf;
use std::time::Duration;

/// Resolved settings for one batch run, assembled from CLI arguments.
/// Immutable once built; pipelines receive a reference, never globals.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory scanned for `.sol` inputs.
    pub input_dir: PathBuf,
    /// Directory mutants / instrumented files are written to.
    pub output_dir: PathBuf,
    /// Directory the CSV/JSON injection reports are written to.
    pub log_dir: PathBuf,
    /// Whether detection returns every candidate mapping or just the first.
    pub exhaustive: bool,
    /// Path to the `solc` binary.
    pub solc_path: String,
    /// Path to the `echidna` binary.
    pub echidna_path: String,
    /// Per-contract budget for external tool runs.
    pub tool_timeout: Duration,
    /// Echidna test-case budget.
    pub test_limit: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("contracts"),
            output_dir: PathBuf::from("injected-contracts"),
            log_dir: PathBuf::from("logs"),
            exhaustive: false,
            solc_path: "solc".to_string(),
            echidna_path: "echidna".to_string(),
            tool_timeout: Duration::from_secs(120),
            test_limit: 1_000_000,
        }
    }
}
