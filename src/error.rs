//! The unified CLI error type.
//!
//! Subsystem errors (database, parser) are bridged into `ScryError` so the
//! binary has one thing to render and one exit-code mapping. Warnings are
//! not errors: a run that only warned exits zero.

use thiserror::Error;

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum ScryError {
    #[error(transparent)]
    Database(#[from] scry_core::DbError),

    #[error(transparent)]
    Parse(#[from] scry_cpp::ParseError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("i/o error on {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
}

impl ScryError {
    /// Stable exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            ScryError::InvalidArguments(_) => 2,
            ScryError::Parse(_) => 3,
            ScryError::Database(_) => 4,
            ScryError::Io { .. } => 5,
        }
    }
}
