//! Idempotent solvency-invariant instrumentation.
//!
//! Given a source model and an accounting target, the instrumenter injects an
//! accounting discipline in three steps: declare the aggregate variable if it
//! is missing, mirror every balance mutation into the aggregate, and append an
//! Echidna solvency oracle before the contract's final closing brace. Running
//! the instrumenter on its own output is a byte-identical no-op; the
//! duplicate-injection guard that makes this true is part of the contract,
//! not an optimization.

use detectors::AccountingTarget;
use regex::Regex;
use serde::{Deserialize, Serialize};
use source::SourceModel;

/// Configuration for the instrumentation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Function-name substrings whose balance mutations are never mirrored.
    /// These functions move value between internal accounts (mint, burn,
    /// transfer families) without changing the contract's custodial total.
    pub ignore_functions: Vec<String>,
    /// How many lines after a balance mutation are searched for an existing
    /// mirror before inserting one.
    pub lookahead: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            ignore_functions: ["mint", "burn", "transfer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookahead: 3,
        }
    }
}

/// Counters describing what one instrumentation pass did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InstrumentStats {
    /// Balance mutations mirrored into the aggregate.
    pub mirrored: usize,
    /// Mutations skipped because a mirror was already present.
    pub skipped_duplicates: usize,
    /// Mutations inside ignore-listed functions, left untouched.
    pub ignored: usize,
    /// Balance resets flagged for manual review.
    pub flagged_resets: usize,
    /// Whether the aggregate declaration was inserted by this pass.
    pub aggregate_declared: bool,
    /// Whether the solvency oracle was appended by this pass.
    pub oracle_appended: bool,
}

impl InstrumentStats {
    /// True when the pass changed nothing, i.e. the input was already fully
    /// instrumented.
    pub fn is_noop(&self) -> bool {
        self.mirrored == 0
            && self.flagged_resets == 0
            && !self.aggregate_declared
            && !self.oracle_appended
    }
}

/// An instrumented source model plus the pass counters.
#[derive(Debug, Clone)]
pub struct InstrumentedSource {
    pub model: SourceModel,
    pub stats: InstrumentStats,
}

/// Name of the injected solvency oracle function.
pub const ORACLE_FUNCTION: &str = "echidna_test_solvency";

/// The invariant instrumenter. Pure over its input: every call clones the
/// model and returns the rewritten copy.
pub struct Instrumenter {
    config: InstrumentConfig,
}

impl Instrumenter {
    pub fn new(config: InstrumentConfig) -> Self {
        Self { config }
    }

    /// Instrument `model` for `target`. Infallible by design: detection
    /// misses and unresolvable patterns degrade to warnings on the model.
    pub fn instrument(&self, model: &SourceModel, target: &AccountingTarget) -> InstrumentedSource {
        let mut model = model.clone();
        let mut stats = InstrumentStats::default();

        stats.aggregate_declared = self.declare_aggregate(&mut model, target);
        self.mirror_mutations(&mut model, target, &mut stats);
        stats.oracle_appended = self.append_oracle(&mut model, target);

        tracing::debug!(
            path = %model.path().display(),
            mirrored = stats.mirrored,
            skipped = stats.skipped_duplicates,
            flagged = stats.flagged_resets,
            "instrumentation pass complete"
        );
        InstrumentedSource { model, stats }
    }

    /// Step 1: ensure the aggregate state variable exists. Inserted directly
    /// after the mapping declaration, or after the contract opening when the
    /// mapping itself was a detection fallback.
    fn declare_aggregate(&self, model: &mut SourceModel, target: &AccountingTarget) -> bool {
        let decl_re = aggregate_decl_re(&target.aggregate_name);
        if model.lines().iter().any(|line| decl_re.is_match(line)) {
            return false;
        }

        let declaration = format!("    uint256 public {};", target.aggregate_name);
        let mapping_line = model.lines().iter().position(|line| {
            line.contains("mapping") && line.contains(&target.mapping_name) && line.contains(';')
        });

        match mapping_line.or_else(|| model.contract_body_start()) {
            Some(idx) => {
                model.insert_line(idx + 1, declaration);
                true
            }
            None => {
                model.push_warning(format!(
                    "no insertion point for aggregate '{}'",
                    target.aggregate_name
                ));
                false
            }
        }
    }

    /// Step 2: mirror `map[key] += e` / `-= e` into the aggregate and flag
    /// `map[key] = 0` resets that cannot be mirrored automatically.
    fn mirror_mutations(
        &self,
        model: &mut SourceModel,
        target: &AccountingTarget,
        stats: &mut InstrumentStats,
    ) {
        let op_re = balance_op_re(&target.mapping_name);
        let reset_re = balance_reset_re(&target.mapping_name);
        let spans = model.function_spans();
        let lines = model.lines().to_vec();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut reset_warnings: Vec<String> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            out.push(line.clone());

            let in_ignored_function = spans[idx]
                .as_deref()
                .is_some_and(|name| self.is_ignored_function(name));

            if let Some(caps) = op_re.captures(line) {
                if in_ignored_function {
                    stats.ignored += 1;
                    continue;
                }
                let op = &caps[1];
                if self.window_contains(&lines, idx, &target.aggregate_name, op) {
                    stats.skipped_duplicates += 1;
                    continue;
                }
                let expr = caps[2].trim();
                let indent = leading_whitespace(line);
                out.push(format!(
                    "{indent}{} {op} {expr};",
                    target.aggregate_name
                ));
                stats.mirrored += 1;
            } else if reset_re.is_match(line) {
                if in_ignored_function {
                    stats.ignored += 1;
                    continue;
                }
                if self.window_contains(&lines, idx, &target.aggregate_name, "-=") {
                    stats.skipped_duplicates += 1;
                    continue;
                }
                // The subtracted amount is unknown from the text alone, so a
                // marker is emitted instead of a guess.
                let function = spans[idx].as_deref().unwrap_or("<unknown>");
                tracing::warn!(
                    path = %model.path().display(),
                    function,
                    "balance reset cannot be mirrored automatically"
                );
                let indent = leading_whitespace(line);
                out.push(format!(
                    "{indent}// [MANUAL] {} -= <amount reset above>;",
                    target.aggregate_name
                ));
                reset_warnings.push(format!(
                    "balance reset in '{function}' requires a manual aggregate update"
                ));
                stats.flagged_resets += 1;
            }
        }

        model.replace_lines(out);
        for warning in reset_warnings {
            model.push_warning(warning);
        }
    }

    /// Step 3: append the solvency oracle before the final closing brace,
    /// unless a function of that exact name already exists.
    fn append_oracle(&self, model: &mut SourceModel, target: &AccountingTarget) -> bool {
        if model.has_function(ORACLE_FUNCTION) {
            return false;
        }
        let Some(brace) = model.final_brace_line() else {
            model.push_warning("no closing brace found; oracle not appended".to_string());
            return false;
        };

        let oracle = [
            String::new(),
            format!("    function {ORACLE_FUNCTION}() public view returns (bool) {{"),
            format!(
                "        return address(this).balance >= {};",
                target.aggregate_name
            ),
            "    }".to_string(),
        ];
        for (offset, line) in oracle.into_iter().enumerate() {
            model.insert_line(brace + offset, line);
        }
        true
    }

    fn is_ignored_function(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.config
            .ignore_functions
            .iter()
            .any(|entry| lower.contains(entry.as_str()))
    }

    /// Duplicate-injection guard: does the lookahead window after `idx`
    /// already combine the aggregate name with this operator?
    fn window_contains(&self, lines: &[String], idx: usize, aggregate: &str, op: &str) -> bool {
        lines
            .iter()
            .skip(idx + 1)
            .take(self.config.lookahead)
            .any(|line| line.contains(aggregate) && line.contains(op))
    }
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new(InstrumentConfig::default())
    }
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn balance_op_re(mapping: &str) -> Regex {
    Regex::new(&format!(
        r"{}\s*\[[^\]]*\]\s*(\+=|-=)\s*([^;]+);",
        regex::escape(mapping)
    ))
    .unwrap()
}

fn balance_reset_re(mapping: &str) -> Regex {
    Regex::new(&format!(
        r"{}\s*\[[^\]]*\]\s*=\s*0\s*;",
        regex::escape(mapping)
    ))
    .unwrap()
}

fn aggregate_decl_re(aggregate: &str) -> Regex {
    Regex::new(&format!(
        r"uint\d*\s+(?:(?:public|private|internal)\s+)?{}\s*(?:=[^;]*)?;",
        regex::escape(aggregate)
    ))
    .unwrap()
}
