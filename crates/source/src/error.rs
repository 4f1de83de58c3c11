use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or serializing contract source text
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source file is empty: {0}")]
    Empty(PathBuf),
}

pub type SourceResult<T> = Result<T, SourceError>;
