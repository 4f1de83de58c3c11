use serde::{Deserialize, Serialize};

/// Immutable configuration for state detection.
///
/// Passed in at construction rather than read from process-wide globals, so
/// two detectors with different settings can coexist in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Name assumed for the balance mapping when none is detected.
    pub default_mapping: String,
    /// Name assumed (and preferred during pairing) for the aggregate
    /// accounting variable.
    pub default_aggregate: String,
    /// Case-insensitive substrings that disqualify a state variable from
    /// being an aggregate candidate. These cover counters commonly unrelated
    /// to funds accounting: time bounds, versioning, periods.
    pub aggregate_denylist: Vec<String>,
    /// When true, detection returns every candidate mapping; when false, only
    /// the first in declaration order.
    pub exhaustive: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            default_mapping: "balances".to_string(),
            default_aggregate: "totalDeposits".to_string(),
            aggregate_denylist: [
                "time", "deadline", "period", "duration", "version", "epoch", "decimals",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exhaustive: false,
        }
    }
}

impl DetectorConfig {
    /// Default configuration with exhaustive multi-mapping detection enabled.
    pub fn exhaustive() -> Self {
        Self {
            exhaustive: true,
            ..Self::default()
        }
    }
}
