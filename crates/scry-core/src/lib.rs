//! Core infrastructure for scry.
//!
//! This crate provides the language-agnostic half of the interrogation
//! pipeline:
//! - The indexed, mergeable database of parsed declaration metadata
//! - Record types for functions, wrappers, types, manifests, and elements
//! - Index remapping for renumbering and cross-module merges
//! - The datafile wire format (versioned, text-framed)
//! - Module registration and unique-name wrapper lookup
//! - The ordered search-path collaborator
//!
//! The C++ frontend that populates a [`Database`] lives in the `scry-cpp`
//! crate; a binding generator consuming one needs only this crate.

pub mod database;
pub mod datafile;
pub mod error;
pub mod index;
pub mod module;
pub mod records;
pub mod search_path;

pub use database::{Database, CURRENT_MAJOR_VERSION, CURRENT_MINOR_VERSION};
pub use error::{DbError, RecordKind};
pub use index::{
    ElementIndex, FunctionIndex, IndexRemapper, ManifestIndex, TypeIndex, WrapperIndex,
};
pub use module::{FunctionPointer, ModuleDef, UniqueNameEntry};
pub use records::{
    AtomicKind, ElementRecord, EnumValueRecord, FunctionRecord, ManifestRecord, TypeRecord,
    WrapperParameter, WrapperRecord,
};
pub use search_path::SearchPath;
