//! External collaborators of the mutation engine.
//!
//! The core never interprets compiler or fuzzer output beyond a coarse
//! classification; this crate wraps the two external tools (`solc` for
//! compile verification, Echidna for property fuzzing) as blocking,
//! deadline-boxed processes, plus the downstream analysis of saved fuzzer
//! logs. All invocations honor a caller-supplied cancellation flag; nothing
//! is retried, because failures are deterministic given the same input.

pub mod analysis;
pub mod fuzz;
pub mod process;
pub mod verify;

pub use analysis::{analyze_fuzzer_log, LogAnalysis};
pub use fuzz::{FuzzConfig, FuzzStatus, FuzzVerdict, FuzzerRunner};
pub use process::{run_with_deadline, CancelFlag, ProcessOutput};
pub use verify::{SolcVerifier, VerifyOutcome};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} run was cancelled")]
    Cancelled { tool: String },

    #[error("io error while driving {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
