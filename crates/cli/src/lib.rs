//! Batch orchestration and command-line surface.
//!
//! The pipelines here drive the core engine across many files: independent
//! worker tasks each own one `SourceModel` copy, so the only coordination is
//! the append-only injection log and the output directory.

pub mod app;
pub mod config;
pub mod discovery;
pub mod pipeline;

pub use app::{CliApp, ExitCode};
pub use config::RunConfig;
pub use discovery::discover_contracts;
