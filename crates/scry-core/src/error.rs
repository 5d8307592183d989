//! Error types for the interrogation database.
//!
//! The database distinguishes three classes of failure:
//! - **Consistency errors**: an `add_*` call collides with an existing,
//!   incompatible record, or two fully-defined types disagree.
//! - **File errors**: a database file is truncated, malformed, or carries a
//!   version this build does not understand.
//! - **Module errors**: a registered module's database file no longer lines
//!   up with the index range compiled into the module.
//!
//! Lookup misses are deliberately NOT errors anywhere in this crate: asking
//! whether a type is already interrogated is an expected, common operation,
//! so every `get_*` query returns a sentinel (the zero index, or a shared
//! empty record) instead.

use thiserror::Error;

/// Which kind of record an index refers to.
///
/// Used in error reporting so a duplicate-index failure names the map it
/// collided in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Type,
    Function,
    Wrapper,
    Manifest,
    Element,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Type => "type",
            RecordKind::Function => "function",
            RecordKind::Wrapper => "wrapper",
            RecordKind::Manifest => "manifest",
            RecordKind::Element => "element",
        };
        write!(f, "{}", name)
    }
}

/// Unified error type for database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// An `add_*` call hit an index already holding an incompatible record.
    #[error("duplicate {kind} record at index {index}")]
    DuplicateIndex { kind: RecordKind, index: u32 },

    /// Index 0 is the reserved "not found" sentinel and can never hold a
    /// record.
    #[error("index 0 is reserved and cannot hold a {kind} record")]
    ReservedIndex { kind: RecordKind },

    /// Two fully-defined type records with different true names landed on
    /// the same index.
    #[error("type conflict at index {index}: '{existing}' vs '{incoming}'")]
    TypeConflict {
        index: u32,
        existing: String,
        incoming: String,
    },

    /// A database file declares a version this build cannot read.
    ///
    /// The major version must match exactly; the minor version may be older
    /// than ours but never newer (additive evolution only).
    #[error(
        "database is version {file_major}.{file_minor} while we are expecting \
         {expected_major}.{expected_minor}"
    )]
    VersionMismatch {
        file_major: u32,
        file_minor: u32,
        expected_major: u32,
        expected_minor: u32,
    },

    /// A module's database file did not remap onto the index range the
    /// module reserved, meaning the file is stale relative to the binary.
    #[error("module database file {filename} is out of date")]
    ModuleOutOfDate { filename: String },

    /// The datafile stream ended or failed to parse mid-record.
    #[error("malformed database file: {message}")]
    Datafile { message: String },

    /// Underlying I/O failure reading a database file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Shorthand for a datafile parse failure.
    pub fn datafile(message: impl Into<String>) -> Self {
        DbError::Datafile {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offending_record() {
        let err = DbError::DuplicateIndex {
            kind: RecordKind::Wrapper,
            index: 42,
        };
        assert_eq!(err.to_string(), "duplicate wrapper record at index 42");

        let err = DbError::TypeConflict {
            index: 7,
            existing: "Foo".to_string(),
            incoming: "Bar".to_string(),
        };
        assert!(err.to_string().contains("'Foo' vs 'Bar'"));
    }

    #[test]
    fn version_mismatch_reports_both_versions() {
        let err = DbError::VersionMismatch {
            file_major: 3,
            file_minor: 0,
            expected_major: 2,
            expected_minor: 2,
        };
        assert!(err.to_string().contains("3.0"));
        assert!(err.to_string().contains("2.2"));
    }
}
