//! Run-scoped injection records and report formatters.
//!
//! Every unit of work the engine performs — one instrumentation pass or one
//! (file, target, template) mutant — appends exactly one [`InjectionRecord`]
//! to the run's [`InjectionLog`]. Records are append-only and never updated;
//! the log is the single synchronized resource shared between batch workers.

pub mod console;
pub mod csv;
pub mod json;

pub use console::ConsoleFormatter;
pub use csv::CsvFormatter;
pub use json::{JsonError, JsonFormatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// What kind of unit a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// One invariant-instrumentation pass over a source file.
    Instrument,
    /// One assembled mutant for a (target, template) combination.
    Inject,
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Instrument => "instrument",
            Self::Inject => "inject",
        }
    }
}

/// Outcome of one unit. Skips and manual-review flags are deliberate results,
/// not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum Outcome {
    /// Output was produced and written.
    Generated,
    /// The idempotence guard found the injection already present.
    SkippedDuplicate,
    /// Output was produced but contains a marker requiring manual follow-up.
    FlaggedForReview,
    /// The unit failed; the batch continues.
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::FlaggedForReview => "flagged_for_review",
            Self::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Failed(reason) => reason,
            _ => "",
        }
    }
}

/// One row of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub timestamp: DateTime<Utc>,
    pub source_file: PathBuf,
    /// Accounting-target descriptor (`mapping:aggregate`).
    pub target: String,
    pub operation: Operation,
    /// Template id for `Inject` records; absent for instrumentation passes.
    pub template_id: Option<String>,
    /// Where the output landed, when any was written.
    pub output_path: Option<PathBuf>,
    pub outcome: Outcome,
    /// Wall-clock seconds spent on this unit.
    pub elapsed_secs: f64,
}

impl InjectionRecord {
    pub fn new(
        source_file: impl Into<PathBuf>,
        target: impl Into<String>,
        operation: Operation,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            source_file: source_file.into(),
            target: target.into(),
            operation,
            template_id: None,
            output_path: None,
            outcome,
            elapsed_secs: 0.0,
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_elapsed(mut self, secs: f64) -> Self {
        self.elapsed_secs = secs;
        self
    }
}

/// Per-run counts shown to the user and embedded in reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated: usize,
    pub skipped_duplicates: usize,
    pub flagged_for_review: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_records(records: &[InjectionRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.outcome {
                Outcome::Generated => summary.generated += 1,
                Outcome::SkippedDuplicate => summary.skipped_duplicates += 1,
                Outcome::FlaggedForReview => summary.flagged_for_review += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.generated + self.skipped_duplicates + self.flagged_for_review + self.failed
    }
}

/// Append-only, run-scoped record log. Workers share one instance; appends
/// are serialized through the interior mutex so rows never interleave.
#[derive(Debug, Default)]
pub struct InjectionLog {
    records: Mutex<Vec<InjectionRecord>>,
}

impl InjectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: InjectionRecord) {
        self.records
            .lock()
            .expect("injection log lock poisoned")
            .push(record);
    }

    /// Copy of all records appended so far, in append order.
    pub fn snapshot(&self) -> Vec<InjectionRecord> {
        self.records
            .lock()
            .expect("injection log lock poisoned")
            .clone()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_records(&self.snapshot())
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("injection log lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
