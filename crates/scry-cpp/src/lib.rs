//! A C++ header declaration parser and type model for scry.
//!
//! This crate is the language half of the interrogation pipeline:
//! - `tokenizer`: hand-written char-level scanner with provenance
//! - `preprocessor`: includes, macros, conditional compilation
//! - `ast`: the declaration/type/expression model (closed sum types)
//! - `scope`: the arena-based scope tree with lookup and substitution
//! - `parser`: recursive descent over the preprocessed token stream
//! - `remap`: the parameter remapping policy table
//! - `builder`: registration of parse results into a `scry-core` database
//!
//! The typical flow: build a [`Parser`] with a [`PreprocessorConfig`],
//! parse headers into it, call [`Parser::resolve_types`], then hand it to
//! [`build_database`] along with a database to populate.

pub mod ast;
pub mod builder;
pub mod parser;
pub mod preprocessor;
pub mod remap;
pub mod scope;
pub mod token;
pub mod tokenizer;

pub use ast::{CppType, Declaration, Expression, QualifiedName};
pub use builder::{build_database, library_hash_name, BuildOptions, BuildStats};
pub use parser::{ParseError, ParseWarning, Parser};
pub use preprocessor::{MacroDef, Preprocessor, PreprocessorConfig, PreprocessorError};
pub use remap::{ConversionStrategy, ParameterRemap, RemapContext, RemapRegistry, RemapRule};
pub use scope::{ScopeArena, ScopeError, ScopeId, ScopeKind};
pub use token::{Keyword, Punct, SourceLoc, Token, TokenKind};
