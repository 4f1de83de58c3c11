//! CSV rendering of the injection log.

use crate::InjectionRecord;

/// Renders records as a CSV document, one row per record plus a header.
#[derive(Debug, Default)]
pub struct CsvFormatter;

impl CsvFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, records: &[InjectionRecord]) -> String {
        let mut out = String::from(
            "timestamp,source_file,target,operation,template_id,output_path,outcome,detail,elapsed_secs\n",
        );
        for record in records {
            let row = [
                record.timestamp.to_rfc3339(),
                record.source_file.display().to_string(),
                record.target.clone(),
                record.operation.label().to_string(),
                record.template_id.clone().unwrap_or_default(),
                record
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                record.outcome.label().to_string(),
                record.outcome.detail().to_string(),
                format!("{:.3}", record.elapsed_secs),
            ];
            let escaped: Vec<String> = row.iter().map(|field| escape(field)).collect();
            out.push_str(&escaped.join(","));
            out.push('\n');
        }
        out
    }
}

/// Quote a field when it contains a delimiter, quote, or newline. Shared by
/// every CSV the tool emits.
pub fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Operation, Outcome};

    #[test]
    fn header_plus_one_row_per_record() {
        let records = vec![
            InjectionRecord::new("A.sol", "balances:totalDeposits", Operation::Inject, Outcome::Generated)
                .with_template("classic_call")
                .with_output("out/A_balances_classic_call.sol"),
            InjectionRecord::new("B.sol", "balances:totalDeposits", Operation::Instrument, Outcome::FlaggedForReview),
        ];
        let csv = CsvFormatter::new().format(&records);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,source_file"));
        assert!(lines[1].contains("classic_call"));
        assert!(lines[2].contains("flagged_for_review"));
    }

    #[test]
    fn elapsed_time_lands_in_the_last_column() {
        let records = vec![InjectionRecord::new(
            "A.sol",
            "balances:totalDeposits",
            Operation::Inject,
            Outcome::Generated,
        )
        .with_elapsed(1.25)];
        let csv = CsvFormatter::new().format(&records);
        assert!(csv.lines().next().unwrap().ends_with(",elapsed_secs"));
        assert!(csv.lines().nth(1).unwrap().ends_with(",1.250"));
    }

    #[test]
    fn failure_reasons_with_commas_are_quoted() {
        let records = vec![InjectionRecord::new(
            "A.sol",
            "balances:totalDeposits",
            Operation::Inject,
            Outcome::Failed("expected one declaration, found 2".to_string()),
        )];
        let csv = CsvFormatter::new().format(&records);
        assert!(csv.contains("\"expected one declaration, found 2\""));
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("plain"), "plain");
    }
}
