//! Record index types and the index remapper.
//!
//! Every record in the database is identified by a small integer index.
//! Index 0 is the reserved "not found" sentinel for all five kinds; live
//! indices are assigned monotonically from the database's single counter and
//! are never reused within a process. The distinct newtypes exist so a
//! wrapper index cannot be handed to a type lookup by accident; the raw
//! `u32` is still public because the datafile format and the module index
//! ranges speak in plain integers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies a type record.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TypeIndex(pub u32);

/// Identifies a function record.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FunctionIndex(pub u32);

/// Identifies a function wrapper record.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WrapperIndex(pub u32);

/// Identifies a manifest (compile-time constant) record.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ManifestIndex(pub u32);

/// Identifies a data element record.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ElementIndex(pub u32);

macro_rules! impl_index {
    ($name:ident) => {
        impl $name {
            /// The reserved "not found" sentinel.
            pub const NONE: $name = $name(0);

            /// Create an index from its raw integer value.
            pub fn new(raw: u32) -> Self {
                $name(raw)
            }

            /// The raw integer value, as written to the datafile.
            pub fn raw(self) -> u32 {
                self.0
            }

            /// True if this is the reserved sentinel.
            pub fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_index!(TypeIndex);
impl_index!(FunctionIndex);
impl_index!(WrapperIndex);
impl_index!(ManifestIndex);
impl_index!(ElementIndex);

/// Records the mapping of old index numbers to new index numbers during a
/// renumbering or merge operation.
///
/// Indices that were never entered into the map pass through unchanged;
/// this is what lets `remap_indices` touch only the records that actually
/// moved while every cross-reference is rewritten with the same call.
#[derive(Debug, Default, Clone)]
pub struct IndexRemapper {
    mapping: HashMap<u32, u32>,
}

impl IndexRemapper {
    /// Create an empty remapper.
    pub fn new() -> Self {
        IndexRemapper::default()
    }

    /// Remove all mappings.
    pub fn clear(&mut self) {
        self.mapping.clear();
    }

    /// Record that `from` is now known as `to`.
    pub fn add_mapping(&mut self, from: u32, to: u32) {
        self.mapping.insert(from, to);
    }

    /// True if `from` has an explicit mapping.
    pub fn in_map(&self, from: u32) -> bool {
        self.mapping.contains_key(&from)
    }

    /// The new index for `from`, or `from` itself if it was never remapped.
    pub fn map_from(&self, from: u32) -> u32 {
        self.mapping.get(&from).copied().unwrap_or(from)
    }

    /// Typed convenience over [`map_from`](Self::map_from).
    pub fn map_type(&self, index: TypeIndex) -> TypeIndex {
        TypeIndex(self.map_from(index.0))
    }

    /// Typed convenience over [`map_from`](Self::map_from).
    pub fn map_function(&self, index: FunctionIndex) -> FunctionIndex {
        FunctionIndex(self.map_from(index.0))
    }

    /// Typed convenience over [`map_from`](Self::map_from).
    pub fn map_wrapper(&self, index: WrapperIndex) -> WrapperIndex {
        WrapperIndex(self.map_from(index.0))
    }

    /// Typed convenience over [`map_from`](Self::map_from).
    pub fn map_manifest(&self, index: ManifestIndex) -> ManifestIndex {
        ManifestIndex(self.map_from(index.0))
    }

    /// Typed convenience over [`map_from`](Self::map_from).
    pub fn map_element(&self, index: ElementIndex) -> ElementIndex {
        ElementIndex(self.map_from(index.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_zero() {
        assert!(TypeIndex::NONE.is_none());
        assert!(!TypeIndex::new(1).is_none());
        assert_eq!(WrapperIndex::default(), WrapperIndex::NONE);
    }

    #[test]
    fn unmapped_indices_pass_through() {
        let mut remap = IndexRemapper::new();
        remap.add_mapping(3, 100);

        assert_eq!(remap.map_from(3), 100);
        assert_eq!(remap.map_from(4), 4);
        assert!(remap.in_map(3));
        assert!(!remap.in_map(4));

        assert_eq!(remap.map_type(TypeIndex(3)), TypeIndex(100));
        assert_eq!(remap.map_wrapper(WrapperIndex(9)), WrapperIndex(9));
    }

    #[test]
    fn clear_forgets_mappings() {
        let mut remap = IndexRemapper::new();
        remap.add_mapping(1, 2);
        remap.clear();
        assert_eq!(remap.map_from(1), 1);
    }
}
