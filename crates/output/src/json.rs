//! JSON report for the injection log, consumed by downstream tooling.

use crate::{InjectionRecord, RunSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level structure of the JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub summary: RunSummary,
    pub records: Vec<InjectionRecord>,
}

/// JSON output formatter.
#[derive(Debug)]
pub struct JsonFormatter {
    pretty_print: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty_print: true }
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn format(&self, records: &[InjectionRecord]) -> Result<String, JsonError> {
        let report = JsonReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            summary: RunSummary::from_records(records),
            records: records.to_vec(),
        };
        if self.pretty_print {
            Ok(serde_json::to_string_pretty(&report)?)
        } else {
            Ok(serde_json::to_string(&report)?)
        }
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Operation, Outcome};

    fn records() -> Vec<InjectionRecord> {
        vec![
            InjectionRecord::new(
                "A.sol",
                "balances:totalDeposits",
                Operation::Inject,
                Outcome::Generated,
            )
            .with_template("classic_call")
            .with_output("out/A_balances_classic_call.sol"),
            InjectionRecord::new(
                "B.sol",
                "stakes:totalDeposits",
                Operation::Inject,
                Outcome::Failed("no contract declaration".to_string()),
            ),
        ]
    }

    #[test]
    fn report_round_trips_records_and_summary() {
        let json = JsonFormatter::new().format(&records()).unwrap();
        let parsed: JsonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.summary.generated, 1);
        assert_eq!(parsed.summary.failed, 1);
        assert_eq!(parsed.records[0].template_id.as_deref(), Some("classic_call"));
        assert_eq!(
            parsed.records[1].outcome,
            Outcome::Failed("no contract declaration".to_string())
        );
    }

    #[test]
    fn compact_mode_emits_single_line() {
        let json = JsonFormatter::new()
            .with_pretty_print(false)
            .format(&records())
            .unwrap();
        assert_eq!(json.lines().count(), 1);
    }
}
