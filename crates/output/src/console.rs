//! Human-readable console rendering of injection records.

use crate::{InjectionRecord, RunSummary};
use std::fmt::Write;

/// Console formatter for per-record lines plus the run summary block.
#[derive(Debug, Default)]
pub struct ConsoleFormatter {
    /// When false, only the summary block is rendered.
    show_records: bool,
}

impl ConsoleFormatter {
    pub fn new() -> Self {
        Self { show_records: true }
    }

    pub fn summary_only() -> Self {
        Self {
            show_records: false,
        }
    }

    pub fn format(&self, records: &[InjectionRecord]) -> String {
        let mut out = String::new();

        if self.show_records {
            for record in records {
                let tag = record.outcome.label().to_uppercase();
                let _ = write!(
                    out,
                    "[{tag}] {} | {} | {}",
                    record.source_file.display(),
                    record.target,
                    record
                        .template_id
                        .as_deref()
                        .unwrap_or(record.operation.label()),
                );
                if let Some(path) = &record.output_path {
                    let _ = write!(out, " -> {}", path.display());
                }
                let detail = record.outcome.detail();
                if !detail.is_empty() {
                    let _ = write!(out, " ({detail})");
                }
                out.push('\n');
            }
            out.push('\n');
        }

        let summary = RunSummary::from_records(records);
        let _ = writeln!(out, "Run summary");
        let _ = writeln!(out, "  generated:           {}", summary.generated);
        let _ = writeln!(out, "  skipped (duplicate): {}", summary.skipped_duplicates);
        let _ = writeln!(out, "  flagged for review:  {}", summary.flagged_for_review);
        let _ = writeln!(out, "  failed:              {}", summary.failed);
        out
    }
}
