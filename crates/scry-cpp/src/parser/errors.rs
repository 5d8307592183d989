//! Error and warning types for the parsing pipeline.
//!
//! The taxonomy mirrors how failures are handled:
//! - [`ParseWarning`]: recoverable; the construct is skipped, parsing
//!   continues, and the warning is collected on the parser.
//! - [`ParseError`]: fatal for one translation unit; declarations already
//!   built from earlier in the unit remain valid.

use thiserror::Error;

use crate::preprocessor::PreprocessorError;
use crate::token::SourceLoc;
use crate::tokenizer::TokenError;

/// A recoverable diagnostic: the offending declaration is omitted and
/// parsing continues at the next declaration boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub message: String,
    pub loc: SourceLoc,
}

impl ParseWarning {
    pub fn new(message: impl Into<String>, loc: SourceLoc) -> Self {
        ParseWarning {
            message: message.into(),
            loc,
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: warning: {}", self.loc, self.message)
    }
}

/// A fatal failure for the translation unit being parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Preprocessor(#[from] PreprocessorError),

    #[error(transparent)]
    Tokenizer(#[from] TokenError),

    /// The token stream ended inside an unfinished construct.
    #[error("unexpected end of file at {loc} while parsing {context}")]
    UnexpectedEof {
        loc: SourceLoc,
        context: &'static str,
    },

    /// A construct that must parse (string entry points, required syntax)
    /// did not.
    #[error("syntax error at {loc}: {message}")]
    Syntax { loc: SourceLoc, message: String },

    #[error("i/o error reading {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
}
