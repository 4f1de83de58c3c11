//! Pattern-based detection of custodial accounting state.
//!
//! `StateDetector` scans a [`SourceModel`] for two declaration shapes: an
//! address-keyed unsigned-integer balance mapping, and standalone
//! unsigned-integer state variables that could serve as the contract's
//! aggregate "total funds" counter. Detection is deliberately textual — there
//! is no data-flow analysis tying a mapping to "its" aggregate — so every
//! result is a candidate, not a proof, and a miss degrades to fixed defaults
//! instead of failing.

pub mod config;

pub use config::DetectorConfig;

use regex::Regex;
use serde::{Deserialize, Serialize};
use source::SourceModel;

/// One candidate custodial-balance relationship: a balance mapping paired
/// with the aggregate variable assumed to track its total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountingTarget {
    /// Name of the `mapping(address => uint..)` declaration.
    pub mapping_name: String,
    /// Name of the standalone unsigned-integer state variable.
    pub aggregate_name: String,
}

impl AccountingTarget {
    pub fn new(mapping_name: impl Into<String>, aggregate_name: impl Into<String>) -> Self {
        Self {
            mapping_name: mapping_name.into(),
            aggregate_name: aggregate_name.into(),
        }
    }

    /// Short descriptor used in records and file names.
    pub fn descriptor(&self) -> String {
        format!("{}:{}", self.mapping_name, self.aggregate_name)
    }
}

/// Everything one detection pass found, including provenance warnings for
/// detection misses (which are non-fatal by contract).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDetection {
    /// Balance mapping names in declaration order.
    pub mappings: Vec<String>,
    /// Aggregate candidates in declaration order, denylist already applied.
    pub aggregates: Vec<String>,
    /// Human-readable notes about fallbacks taken.
    pub warnings: Vec<String>,
}

/// Declaration-shape scanner for balance mappings and aggregate candidates.
pub struct StateDetector {
    config: DetectorConfig,
    mapping_re: Regex,
    aggregate_re: Regex,
}

impl StateDetector {
    pub fn new(config: DetectorConfig) -> Self {
        // mapping(address => uint*) [visibility] name;
        let mapping_re = Regex::new(
            r"mapping\s*\(\s*address\s*=>\s*u?int\d*\s*\)\s*(?:(?:public|private|internal)\s+)?([A-Za-z_]\w*)\s*;",
        )
        .unwrap();
        // uint*/int* [visibility] name [= init];  (standalone state variable)
        let aggregate_re = Regex::new(
            r"^\s*u?int\d*\s+(?:(?:public|private|internal)\s+)?([A-Za-z_]\w*)\s*(?:=[^;]*)?;",
        )
        .unwrap();
        Self {
            config,
            mapping_re,
            aggregate_re,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Scan a source model for accounting state. Never fails: when a shape is
    /// not found the configured default name is substituted and a warning is
    /// recorded on the result.
    pub fn detect(&self, model: &SourceModel) -> StateDetection {
        let mut detection = StateDetection::default();
        let spans = model.function_spans();

        for (idx, line) in model.lines().iter().enumerate() {
            if let Some(caps) = self.mapping_re.captures(line) {
                let name = caps[1].to_string();
                if !detection.mappings.contains(&name) {
                    detection.mappings.push(name);
                }
                continue;
            }
            // Aggregate candidates must be state variables, so only lines
            // above any function declaration qualify.
            if spans[idx].is_none() {
                if let Some(caps) = self.aggregate_re.captures(line) {
                    let name = caps[1].to_string();
                    if !self.is_denylisted(&name) && !detection.aggregates.contains(&name) {
                        detection.aggregates.push(name);
                    }
                }
            }
        }

        if !self.config.exhaustive {
            detection.mappings.truncate(1);
        }

        if detection.mappings.is_empty() {
            tracing::warn!(
                path = %model.path().display(),
                "no balance mapping detected, falling back to '{}'",
                self.config.default_mapping
            );
            detection.warnings.push(format!(
                "no balance mapping detected; assuming '{}'",
                self.config.default_mapping
            ));
            detection.mappings.push(self.config.default_mapping.clone());
        }

        if detection.aggregates.is_empty() {
            detection.warnings.push(format!(
                "no aggregate accounting variable detected; assuming '{}'",
                self.config.default_aggregate
            ));
            detection
                .aggregates
                .push(self.config.default_aggregate.clone());
        }

        tracing::debug!(
            mappings = ?detection.mappings,
            aggregates = ?detection.aggregates,
            "state detection complete"
        );
        detection
    }

    /// Pair each detected mapping with an aggregate candidate.
    ///
    /// The pairing is an explicit approximation: with no data-flow analysis
    /// there is no reliable way to associate a mapping with the variable that
    /// actually tracks its total. The policy is to prefer an aggregate
    /// literally named like the configured default (`totalDeposits`) and
    /// otherwise take the first remaining candidate in declaration order.
    pub fn pair_targets(&self, detection: &StateDetection) -> Vec<AccountingTarget> {
        let aggregate = detection
            .aggregates
            .iter()
            .find(|name| **name == self.config.default_aggregate)
            .or_else(|| detection.aggregates.first());

        let Some(aggregate) = aggregate else {
            return Vec::new();
        };

        detection
            .mappings
            .iter()
            .map(|mapping| AccountingTarget::new(mapping.clone(), aggregate.clone()))
            .collect()
    }

    fn is_denylisted(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.config
            .aggregate_denylist
            .iter()
            .any(|entry| lower.contains(entry.as_str()))
    }
}
