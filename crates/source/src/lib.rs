//! Line-oriented source model for Solidity contracts.
//!
//! The mutation engine never builds a real syntax tree; every stage works on
//! an ordered sequence of lines plus a handful of facts derived by pattern
//! matching (contract name, enclosing function per line, the contract's final
//! closing brace). Keeping all of that behind `SourceModel` means the
//! pattern-based view could later be swapped for a parser-backed one without
//! touching the instrumenter or the variant generator.

pub mod error;

pub use error::{SourceError, SourceResult};

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn contract_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"contract\s+([A-Za-z_]\w*)").unwrap())
}

fn function_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"function\s+([A-Za-z_]\w*)\s*\(").unwrap())
}

fn constructor_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*constructor\s*\(").unwrap())
}

fn receive_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*receive\s*\(").unwrap())
}

/// One contract's text as an ordered sequence of lines, plus provenance
/// warnings accumulated by the pipeline stages that processed it.
///
/// Every stage that rewrites a model does so on its own clone, so a single
/// input file can fan out into many independent mutants without aliasing.
#[derive(Debug, Clone)]
pub struct SourceModel {
    path: PathBuf,
    lines: Vec<String>,
    warnings: Vec<String>,
}

impl SourceModel {
    /// Load a model from a file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path).map_err(|source| SourceError::Read {
            path: path.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Err(SourceError::Empty(path));
        }
        Ok(Self::from_text(path, &text))
    }

    /// Build a model from in-memory text. `path` is provenance only.
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(|l| l.to_string()).collect(),
            warnings: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|l| l.as_str())
    }

    /// Re-join the line sequence into source text with a trailing newline.
    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    /// Write the model back out to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> SourceResult<()> {
        let path = path.as_ref();
        fs::write(path, self.text()).map_err(|source| SourceError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Insert a line before `index` (append when `index` is past the end).
    pub fn insert_line(&mut self, index: usize, line: impl Into<String>) {
        let line = line.into();
        if index >= self.lines.len() {
            self.lines.push(line);
        } else {
            self.lines.insert(index, line);
        }
    }

    /// Replace the entire line sequence, e.g. after a rewriting pass.
    pub fn replace_lines(&mut self, lines: Vec<String>) {
        self.lines = lines;
    }

    /// Name of the first declared contract, if any.
    pub fn contract_name(&self) -> Option<String> {
        let text = self.lines.join("\n");
        contract_decl_re()
            .captures(&text)
            .map(|c| c[1].to_string())
    }

    /// Enclosing function name per line, from a single forward scan.
    ///
    /// A line belongs to the most recently declared function above it; block
    /// ends are not tracked, which is precise enough for the declaration-shape
    /// patterns the pipeline matches (state variables sit above the first
    /// function in virtually all real contracts).
    pub fn function_spans(&self) -> Vec<Option<String>> {
        let mut spans = Vec::with_capacity(self.lines.len());
        let mut current: Option<String> = None;
        for line in &self.lines {
            if let Some(caps) = function_decl_re().captures(line) {
                current = Some(caps[1].to_string());
            } else if constructor_decl_re().is_match(line) {
                current = Some("constructor".to_string());
            }
            spans.push(current.clone());
        }
        spans
    }

    /// Index of the contract's final closing brace: the first line from the
    /// end whose trimmed content starts with `}`. Scanning backward avoids
    /// disturbing nested function bodies.
    pub fn final_brace_line(&self) -> Option<usize> {
        self.lines
            .iter()
            .rposition(|line| line.trim_start().starts_with('}'))
    }

    /// Index of the line that opens the first contract's body.
    pub fn contract_body_start(&self) -> Option<usize> {
        let open = self
            .lines
            .iter()
            .position(|line| contract_decl_re().is_match(line))?;
        self.lines[open..]
            .iter()
            .position(|line| line.contains('{'))
            .map(|offset| open + offset)
    }

    /// Whether a function with exactly this name is declared anywhere.
    pub fn has_function(&self, name: &str) -> bool {
        self.lines.iter().any(|line| {
            function_decl_re()
                .captures(line)
                .is_some_and(|caps| &caps[1] == name)
        })
    }

    pub fn has_constructor(&self) -> bool {
        self.lines
            .iter()
            .any(|line| constructor_decl_re().is_match(line))
    }

    /// Whether a `receive()` handler is declared.
    pub fn has_receive(&self) -> bool {
        self.lines
            .iter()
            .any(|line| receive_decl_re().is_match(line))
    }

    /// Substring search across the whole text.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Attach a provenance warning (detection miss, manual-review flag).
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
