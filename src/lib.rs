//! scry: C++ header interrogation for cross-language bindings.
//!
//! Reads C++ header declarations well enough to build a symbol table and
//! export metadata describing each public entity — its parameters, return
//! types, and how each should be remapped when crossing into another
//! language's calling convention. It does not compile C++; it recognizes
//! declarations, resolves names against scope, and hands the result off as
//! a versioned, mergeable database for a separate binding-generation pass.

// Core infrastructure - re-exported from the workspace crates
pub use scry_core::database;
pub use scry_core::datafile;
pub use scry_core::index;
pub use scry_core::module;
pub use scry_core::records;
pub use scry_core::search_path;

pub use scry_cpp::ast;
pub use scry_cpp::builder;
pub use scry_cpp::parser;
pub use scry_cpp::preprocessor;
pub use scry_cpp::remap;
pub use scry_cpp::scope;

// Front door for the batch binary
pub mod cli;
pub mod error;

pub use error::ScryError;
