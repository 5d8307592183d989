//! Module definitions: the bridge between a compiled binary module and its
//! interrogation data.
//!
//! A binding layer compiled into a program registers one [`ModuleDef`] per
//! binary module. The def names the database file to load lazily, carries
//! the 4-character library hash that prefixes every unique wrapper name in
//! the module, reserves a contiguous index range for the module's
//! compiled-in function pointers, and holds the sorted unique-name table
//! used for hash lookups. The database consumes the def purely to resolve a
//! wrapper index to a callable pointer; it never calls the function itself.

use std::path::PathBuf;

/// An opaque callable address supplied by a compiled module.
///
/// The database stores and returns these; invoking one is entirely the
/// caller's business. Because this wraps a raw pointer, module defs (and
/// any database holding them) are confined to one thread, which matches
/// the database's single-writer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionPointer(*const ());

impl FunctionPointer {
    pub fn new(ptr: *const ()) -> Self {
        FunctionPointer(ptr)
    }

    pub fn null() -> Self {
        FunctionPointer(std::ptr::null())
    }

    pub fn as_ptr(self) -> *const () {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for FunctionPointer {
    fn default() -> Self {
        FunctionPointer::null()
    }
}

/// One entry in a module's sorted unique-name table: the per-wrapper hash
/// (the unique name minus its 4-character library prefix) and the wrapper's
/// offset from the module's first index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UniqueNameEntry {
    pub name: String,
    pub index_offset: u32,
}

/// A record per binary module carrying interrogation data.
#[derive(Debug, Default, Clone)]
pub struct ModuleDef {
    /// Path to the module's database file, loaded lazily on first query.
    pub database_filename: Option<PathBuf>,
    pub library_name: String,
    /// 4-character hash; the first component of every unique wrapper name
    /// in this module.
    pub library_hash_name: String,
    pub module_name: String,
    /// Identifier stamped into the database file at generation time; a
    /// mismatch on load means file and compiled-in data are out of sync.
    pub file_identifier: u32,
    /// First index of the contiguous range reserved for this module.
    pub first_index: u32,
    /// One past the last index of the reserved range.
    pub next_index: u32,
    /// Function-pointer slots, addressable by `index - first_index`.
    pub fptrs: Vec<FunctionPointer>,
    /// Per-wrapper hash names, sorted by name for binary search.
    pub unique_names: Vec<UniqueNameEntry>,
}

impl ModuleDef {
    /// A def that only requests a database file, with no compiled-in data.
    pub fn for_database_file(filename: impl Into<PathBuf>) -> Self {
        ModuleDef {
            database_filename: Some(filename.into()),
            ..ModuleDef::default()
        }
    }

    /// Number of indices reserved by this module.
    pub fn num_indices(&self) -> u32 {
        self.next_index.saturating_sub(self.first_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_database_request_reserves_no_indices() {
        let def = ModuleDef::for_database_file("libscry.in");
        assert_eq!(def.num_indices(), 0);
        assert!(def.database_filename.is_some());
    }

    #[test]
    fn null_pointer_is_the_default_slot() {
        assert!(FunctionPointer::default().is_null());
        let p = FunctionPointer::new(0x1000 as *const ());
        assert!(!p.is_null());
    }
}
