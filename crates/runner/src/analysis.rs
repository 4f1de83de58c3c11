//! Downstream analysis of saved fuzzer output.
//!
//! Echidna's text output carries `[YYYY-MM-DD HH:MM:SS.ff]` timestamps; from
//! those this module derives elapsed time to first falsification and whether
//! the vulnerable entrypoint was ever exercised. Purely downstream of the
//! core: it only ever reads text the fuzzer already produced.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d+)\]").unwrap()
    })
}

/// Timing and activation facts extracted from one fuzzer log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogAnalysis {
    /// Seconds from the first timestamp to the falsification line, when the
    /// bug was detected.
    pub seconds_to_detection: Option<f64>,
    /// Total seconds spanned by the log's timestamps.
    pub total_seconds: Option<f64>,
    /// Whether any falsification appeared at all.
    pub detected: bool,
    /// Whether the named vulnerable entrypoint shows up in a call sequence.
    pub entrypoint_activated: bool,
}

/// Analyze raw fuzzer text for the given vulnerable entrypoint name.
pub fn analyze_fuzzer_log(raw: &str, entrypoint: &str) -> LogAnalysis {
    let mut analysis = LogAnalysis::default();
    let mut first: Option<NaiveDateTime> = None;
    let mut last: Option<NaiveDateTime> = None;
    let mut detection: Option<NaiveDateTime> = None;

    for line in raw.lines() {
        let stamp = timestamp_re()
            .captures(line)
            .and_then(|c| NaiveDateTime::parse_from_str(&c[1], "%Y-%m-%d %H:%M:%S%.f").ok());

        if let Some(stamp) = stamp {
            first.get_or_insert(stamp);
            last = Some(stamp);
        }

        if line.to_lowercase().contains("falsified") {
            analysis.detected = true;
            if detection.is_none() {
                detection = stamp.or(last);
            }
        }
        if line.contains(entrypoint) {
            analysis.entrypoint_activated = true;
        }
    }

    if let (Some(first), Some(last)) = (first, last) {
        analysis.total_seconds = Some((last - first).num_milliseconds() as f64 / 1000.0);
    }
    if let (Some(first), Some(detection)) = (first, detection) {
        analysis.seconds_to_detection = Some((detection - first).num_milliseconds() as f64 / 1000.0);
    }
    analysis
}
