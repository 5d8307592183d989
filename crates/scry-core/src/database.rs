//! The interrogation database: an indexed, mergeable store of parsed
//! declaration metadata.
//!
//! The database holds five record maps (types, functions, wrappers,
//! manifests, elements) keyed by integer index, plus the bookkeeping around
//! them:
//! - enumeration lists of global and all indices per kind,
//! - lazily rebuilt name→index lookup caches behind a freshness bitmask,
//! - the registered module defs with their reserved index ranges,
//! - a queue of module database files to load on first query.
//!
//! Storage is `BTreeMap` keyed by raw index so iteration (and therefore the
//! datafile output) is deterministic. The database is single-writer: parse
//! each translation unit into a private database and [`merge_from`] it into
//! the shared one when the unit completes — that merge is the only
//! sanctioned cross-unit synchronization point.
//!
//! [`merge_from`]: Database::merge_from

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, error, warn};

use crate::datafile::{DatafileReader, DatafileWriter};
use crate::error::{DbError, RecordKind};
use crate::index::{
    ElementIndex, FunctionIndex, IndexRemapper, ManifestIndex, TypeIndex, WrapperIndex,
};
use crate::module::{FunctionPointer, ModuleDef, UniqueNameEntry};
use crate::records::{
    ElementRecord, FunctionRecord, ManifestRecord, TypeRecord, WrapperRecord,
};
use crate::search_path::SearchPath;

/// Major version written to database files by this build.
pub const CURRENT_MAJOR_VERSION: u32 = 2;
/// Minor version written to database files by this build.
pub const CURRENT_MINOR_VERSION: u32 = 2;

// Freshness bits for the lazy lookup caches. A cleared bit means the
// corresponding map must be rebuilt before its next use.
const FRESH_TYPES_BY_NAME: u32 = 0x0001;
const FRESH_TYPES_BY_SCOPED_NAME: u32 = 0x0002;
const FRESH_TYPES_BY_TRUE_NAME: u32 = 0x0004;
const FRESH_MANIFESTS_BY_NAME: u32 = 0x0008;
const FRESH_ELEMENTS_BY_NAME: u32 = 0x0010;
const FRESH_ELEMENTS_BY_SCOPED_NAME: u32 = 0x0020;
const FRESH_TYPE_BITS: u32 =
    FRESH_TYPES_BY_NAME | FRESH_TYPES_BY_SCOPED_NAME | FRESH_TYPES_BY_TRUE_NAME;
const FRESH_ELEMENT_BITS: u32 = FRESH_ELEMENTS_BY_NAME | FRESH_ELEMENTS_BY_SCOPED_NAME;

// Shared sentinel records returned for unknown indices; "not present" is an
// expected outcome and never an error.
static BOGUS_TYPE: TypeRecord = TypeRecord {
    flags: 0,
    name: String::new(),
    scoped_name: String::new(),
    true_name: String::new(),
    comment: String::new(),
    atomic_kind: crate::records::AtomicKind::NotAtomic,
    outer_type: TypeIndex(0),
    wrapped_type: TypeIndex(0),
    constructors: Vec::new(),
    destructor: FunctionIndex(0),
    methods: Vec::new(),
    elements: Vec::new(),
    derivations: Vec::new(),
    nested_types: Vec::new(),
    enum_values: Vec::new(),
};
static BOGUS_FUNCTION: FunctionRecord = FunctionRecord {
    flags: 0,
    name: String::new(),
    scoped_name: String::new(),
    comment: String::new(),
    class_type: TypeIndex(0),
    wrappers: Vec::new(),
};
static BOGUS_WRAPPER: WrapperRecord = WrapperRecord {
    flags: 0,
    function: FunctionIndex(0),
    return_type: TypeIndex(0),
    return_value_destructor: FunctionIndex(0),
    unique_name: String::new(),
    parameters: Vec::new(),
};
static BOGUS_MANIFEST: ManifestRecord = ManifestRecord {
    flags: 0,
    name: String::new(),
    definition: String::new(),
    manifest_type: TypeIndex(0),
    int_value: 0,
    getter: FunctionIndex(0),
};
static BOGUS_ELEMENT: ElementRecord = ElementRecord {
    flags: 0,
    name: String::new(),
    scoped_name: String::new(),
    element_type: TypeIndex(0),
    getter: FunctionIndex(0),
    setter: FunctionIndex(0),
};

/// The in-memory interrogation database.
///
/// Construct one explicitly and pass it to whatever needs it; there is no
/// process-wide instance.
#[derive(Debug, Default, Clone)]
pub struct Database {
    next_index: u32,

    type_map: BTreeMap<u32, TypeRecord>,
    function_map: BTreeMap<u32, FunctionRecord>,
    wrapper_map: BTreeMap<u32, WrapperRecord>,
    manifest_map: BTreeMap<u32, ManifestRecord>,
    element_map: BTreeMap<u32, ElementRecord>,

    global_types: Vec<TypeIndex>,
    all_types: Vec<TypeIndex>,
    global_functions: Vec<FunctionIndex>,
    all_functions: Vec<FunctionIndex>,
    global_manifests: Vec<ManifestIndex>,
    global_elements: Vec<ElementIndex>,

    lookups_fresh: u32,
    types_by_name: HashMap<String, u32>,
    types_by_scoped_name: HashMap<String, u32>,
    types_by_true_name: HashMap<String, u32>,
    manifests_by_name: HashMap<String, u32>,
    elements_by_name: HashMap<String, u32>,
    elements_by_scoped_name: HashMap<String, u32>,

    /// Every registered module def, in registration order.
    modules: Vec<ModuleDef>,
    /// Indices into `modules` for defs with a reserved index range, in
    /// ascending `first_index` order (ranges are handed out monotonically).
    module_order: Vec<usize>,
    modules_by_hash: HashMap<String, usize>,
    /// Indices into `modules` whose database files are queued for loading.
    requests: Vec<usize>,

    search_path: SearchPath,

    file_major_version: u32,
    file_minor_version: u32,
}

impl Database {
    pub fn new() -> Self {
        Database {
            next_index: 1,
            ..Database::default()
        }
    }

    /// Set the search path used to resolve relative module database
    /// filenames at load time.
    pub fn set_search_path(&mut self, path: SearchPath) {
        self.search_path = path;
    }

    /// Hand out the next unused index.
    pub fn get_next_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// The next index that would be handed out, without claiming it. Use
    /// this to remap another database onto this one's free range before a
    /// merge.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    // ========================================================================
    // Module registration
    // ========================================================================

    /// Register interrogation data for a binary module.
    ///
    /// If the def reserves any indices, its range is re-based onto this
    /// database's counter so it cannot collide with any other module. The
    /// def's database file, if named, is queued and loaded lazily the next
    /// time a query needs the full data.
    pub fn request_module(&mut self, mut def: ModuleDef) {
        if def.library_name.is_empty() {
            debug!("got interrogate data for anonymous module");
        } else {
            debug!(library = %def.library_name, "got interrogate data for module");
        }

        let num_indices = def.num_indices();
        if num_indices > 0 {
            def.first_index = self.next_index;
            self.next_index += num_indices;
            def.next_index = self.next_index;
        }
        // The table is required sorted for the hash binary search; enforce
        // it here rather than trusting every generator.
        def.unique_names.sort_by(|a, b| a.name.cmp(&b.name));

        let has_filename = def.database_filename.is_some();
        let has_hash = !def.unique_names.is_empty() && !def.library_hash_name.is_empty();
        let slot = self.modules.len();
        if has_hash {
            self.modules_by_hash.insert(def.library_hash_name.clone(), slot);
        }
        self.modules.push(def);
        if num_indices > 0 {
            self.module_order.push(slot);
        }
        if has_filename {
            self.requests.push(slot);
        }
    }

    /// Queue a bare database file with no compiled-in data.
    pub fn request_database(&mut self, filename: impl Into<std::path::PathBuf>) {
        self.request_module(ModuleDef::for_database_file(filename));
    }

    /// Resolve a wrapper index to the callable pointer its module compiled
    /// in, if one is available.
    pub fn get_fptr(&self, wrapper: WrapperIndex) -> Option<FunctionPointer> {
        let (slot, offset) = self.find_module(wrapper.raw())?;
        self.modules[slot]
            .fptrs
            .get(offset as usize)
            .copied()
            .filter(|p| !p.is_null())
    }

    /// Look up a wrapper by its globally unique name.
    ///
    /// The first four characters are always the library hash name; the
    /// remainder is the per-wrapper hash searched within that module's
    /// sorted unique-name table. Returns the zero sentinel when either half
    /// fails to match.
    pub fn get_wrapper_by_unique_name(&mut self, unique_name: &str) -> WrapperIndex {
        self.check_latest();
        if unique_name.len() < 4 {
            return WrapperIndex::NONE;
        }
        let (library_hash, wrapper_hash) = unique_name.split_at(4);
        let Some(&slot) = self.modules_by_hash.get(library_hash) else {
            return WrapperIndex::NONE;
        };
        let def = &self.modules[slot];
        let offset = binary_search_wrapper_hash(&def.unique_names, wrapper_hash);
        if offset >= 0 {
            WrapperIndex(def.first_index + offset as u32)
        } else {
            WrapperIndex::NONE
        }
    }

    /// The module owning `wrapper`, by binary search over the sorted module
    /// ranges. Degrades to `None` for an index outside every range.
    fn find_module(&self, wrapper: u32) -> Option<(usize, u32)> {
        let pos = self
            .module_order
            .partition_point(|&slot| self.modules[slot].first_index <= wrapper);
        if pos == 0 {
            return None;
        }
        let slot = self.module_order[pos - 1];
        let def = &self.modules[slot];
        (wrapper < def.next_index).then_some((slot, wrapper - def.first_index))
    }

    // ========================================================================
    // Record insertion
    // ========================================================================

    /// Add a type record at the given index.
    ///
    /// If the index already holds an incomplete forward reference, the new
    /// record is merged into it; two fully-defined records with different
    /// true names fail with [`DbError::TypeConflict`] and leave the
    /// existing record untouched.
    pub fn add_type(&mut self, index: TypeIndex, record: TypeRecord) -> Result<(), DbError> {
        if index.is_none() {
            return Err(DbError::ReservedIndex {
                kind: RecordKind::Type,
            });
        }
        match self.type_map.entry(index.raw()) {
            Entry::Vacant(entry) => {
                if record.is_global() {
                    self.global_types.push(index);
                }
                self.all_types.push(index);
                entry.insert(record);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                let was_global = existing.is_global();
                existing
                    .merge_with(record)
                    .map_err(|(existing, incoming)| DbError::TypeConflict {
                        index: index.raw(),
                        existing,
                        incoming,
                    })?;
                if !was_global && existing.is_global() {
                    self.global_types.push(index);
                }
            }
        }
        self.lookups_fresh &= !FRESH_TYPE_BITS;
        Ok(())
    }

    pub fn add_function(
        &mut self,
        index: FunctionIndex,
        record: FunctionRecord,
    ) -> Result<(), DbError> {
        if index.is_none() {
            return Err(DbError::ReservedIndex {
                kind: RecordKind::Function,
            });
        }
        match self.function_map.entry(index.raw()) {
            Entry::Vacant(entry) => {
                if record.is_global() {
                    self.global_functions.push(index);
                }
                self.all_functions.push(index);
                entry.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => Err(DbError::DuplicateIndex {
                kind: RecordKind::Function,
                index: index.raw(),
            }),
        }
    }

    pub fn add_wrapper(
        &mut self,
        index: WrapperIndex,
        record: WrapperRecord,
    ) -> Result<(), DbError> {
        if index.is_none() {
            return Err(DbError::ReservedIndex {
                kind: RecordKind::Wrapper,
            });
        }
        match self.wrapper_map.entry(index.raw()) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => Err(DbError::DuplicateIndex {
                kind: RecordKind::Wrapper,
                index: index.raw(),
            }),
        }
    }

    pub fn add_manifest(
        &mut self,
        index: ManifestIndex,
        record: ManifestRecord,
    ) -> Result<(), DbError> {
        if index.is_none() {
            return Err(DbError::ReservedIndex {
                kind: RecordKind::Manifest,
            });
        }
        match self.manifest_map.entry(index.raw()) {
            Entry::Vacant(entry) => {
                entry.insert(record);
                self.global_manifests.push(index);
                self.lookups_fresh &= !FRESH_MANIFESTS_BY_NAME;
                Ok(())
            }
            Entry::Occupied(_) => Err(DbError::DuplicateIndex {
                kind: RecordKind::Manifest,
                index: index.raw(),
            }),
        }
    }

    pub fn add_element(
        &mut self,
        index: ElementIndex,
        record: ElementRecord,
    ) -> Result<(), DbError> {
        if index.is_none() {
            return Err(DbError::ReservedIndex {
                kind: RecordKind::Element,
            });
        }
        match self.element_map.entry(index.raw()) {
            Entry::Vacant(entry) => {
                if record.is_global() {
                    self.global_elements.push(index);
                }
                entry.insert(record);
                self.lookups_fresh &= !FRESH_ELEMENT_BITS;
                Ok(())
            }
            Entry::Occupied(_) => Err(DbError::DuplicateIndex {
                kind: RecordKind::Element,
                index: index.raw(),
            }),
        }
    }

    /// Erase a type from the database. Used to prune forward-reference
    /// placeholders that never resolved.
    pub fn remove_type(&mut self, index: TypeIndex) {
        self.type_map.remove(&index.raw());
        self.all_types.retain(|&i| i != index);
        self.global_types.retain(|&i| i != index);
        self.lookups_fresh &= !FRESH_TYPE_BITS;
    }

    // ========================================================================
    // Record access
    // ========================================================================

    /// The type at `index`, or a shared empty record if there is none.
    pub fn get_type(&mut self, index: TypeIndex) -> &TypeRecord {
        self.check_latest();
        self.type_map.get(&index.raw()).unwrap_or(&BOGUS_TYPE)
    }

    pub fn get_function(&mut self, index: FunctionIndex) -> &FunctionRecord {
        self.check_latest();
        self.function_map
            .get(&index.raw())
            .unwrap_or(&BOGUS_FUNCTION)
    }

    pub fn get_wrapper(&mut self, index: WrapperIndex) -> &WrapperRecord {
        self.check_latest();
        self.wrapper_map.get(&index.raw()).unwrap_or(&BOGUS_WRAPPER)
    }

    pub fn get_manifest(&mut self, index: ManifestIndex) -> &ManifestRecord {
        self.check_latest();
        self.manifest_map
            .get(&index.raw())
            .unwrap_or(&BOGUS_MANIFEST)
    }

    pub fn get_element(&mut self, index: ElementIndex) -> &ElementRecord {
        self.check_latest();
        self.element_map.get(&index.raw()).unwrap_or(&BOGUS_ELEMENT)
    }

    /// Mutable access to the type at `index`, inserting an empty record if
    /// none exists yet.
    pub fn update_type(&mut self, index: TypeIndex) -> &mut TypeRecord {
        debug_assert!(!index.is_none());
        self.check_latest();
        self.lookups_fresh &= !FRESH_TYPE_BITS;
        self.type_map.entry(index.raw()).or_default()
    }

    pub fn update_function(&mut self, index: FunctionIndex) -> &mut FunctionRecord {
        self.check_latest();
        self.function_map.entry(index.raw()).or_default()
    }

    /// Mutable access to the wrapper at `index`.
    ///
    /// The index is assumed valid — obtained from a prior `add_wrapper` —
    /// as a precondition; an unknown index silently materializes an empty
    /// record rather than failing.
    pub fn update_wrapper(&mut self, index: WrapperIndex) -> &mut WrapperRecord {
        debug_assert!(!index.is_none());
        self.check_latest();
        self.wrapper_map.entry(index.raw()).or_default()
    }

    pub fn update_manifest(&mut self, index: ManifestIndex) -> &mut ManifestRecord {
        self.check_latest();
        self.lookups_fresh &= !FRESH_MANIFESTS_BY_NAME;
        self.manifest_map.entry(index.raw()).or_default()
    }

    pub fn update_element(&mut self, index: ElementIndex) -> &mut ElementRecord {
        self.check_latest();
        self.lookups_fresh &= !FRESH_ELEMENT_BITS;
        self.element_map.entry(index.raw()).or_default()
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Number of types defined at global level, candidates for export.
    pub fn get_num_global_types(&mut self) -> usize {
        self.check_latest();
        self.global_types.len()
    }

    pub fn get_global_type(&mut self, n: usize) -> TypeIndex {
        self.check_latest();
        self.global_types.get(n).copied().unwrap_or(TypeIndex::NONE)
    }

    /// Number of all types known, global as well as incidental.
    pub fn get_num_all_types(&mut self) -> usize {
        self.check_latest();
        self.all_types.len()
    }

    pub fn get_all_type(&mut self, n: usize) -> TypeIndex {
        self.check_latest();
        self.all_types.get(n).copied().unwrap_or(TypeIndex::NONE)
    }

    pub fn get_num_global_functions(&mut self) -> usize {
        self.check_latest();
        self.global_functions.len()
    }

    pub fn get_global_function(&mut self, n: usize) -> FunctionIndex {
        self.check_latest();
        self.global_functions
            .get(n)
            .copied()
            .unwrap_or(FunctionIndex::NONE)
    }

    pub fn get_num_all_functions(&mut self) -> usize {
        self.check_latest();
        self.all_functions.len()
    }

    pub fn get_all_function(&mut self, n: usize) -> FunctionIndex {
        self.check_latest();
        self.all_functions
            .get(n)
            .copied()
            .unwrap_or(FunctionIndex::NONE)
    }

    pub fn get_num_global_manifests(&mut self) -> usize {
        self.check_latest();
        self.global_manifests.len()
    }

    pub fn get_global_manifest(&mut self, n: usize) -> ManifestIndex {
        self.check_latest();
        self.global_manifests
            .get(n)
            .copied()
            .unwrap_or(ManifestIndex::NONE)
    }

    pub fn get_num_global_elements(&mut self) -> usize {
        self.check_latest();
        self.global_elements.len()
    }

    pub fn get_global_element(&mut self, n: usize) -> ElementIndex {
        self.check_latest();
        self.global_elements
            .get(n)
            .copied()
            .unwrap_or(ElementIndex::NONE)
    }

    /// Iterate every wrapper record in index order. Does not trigger a
    /// lazy load; call a query method first if pending modules matter.
    pub fn wrappers(&self) -> impl Iterator<Item = (WrapperIndex, &WrapperRecord)> {
        self.wrapper_map
            .iter()
            .map(|(&i, record)| (WrapperIndex(i), record))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionIndex, &FunctionRecord)> {
        self.function_map
            .iter()
            .map(|(&i, record)| (FunctionIndex(i), record))
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeIndex, &TypeRecord)> {
        self.type_map
            .iter()
            .map(|(&i, record)| (TypeIndex(i), record))
    }

    pub fn manifests(&self) -> impl Iterator<Item = (ManifestIndex, &ManifestRecord)> {
        self.manifest_map
            .iter()
            .map(|(&i, record)| (ManifestIndex(i), record))
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementIndex, &ElementRecord)> {
        self.element_map
            .iter()
            .map(|(&i, record)| (ElementIndex(i), record))
    }

    // ========================================================================
    // Name lookups
    // ========================================================================

    /// The type with the given simple name, or the zero sentinel.
    pub fn lookup_type_by_name(&mut self, name: &str) -> TypeIndex {
        self.check_latest();
        self.freshen(FRESH_TYPES_BY_NAME);
        TypeIndex(self.types_by_name.get(name).copied().unwrap_or(0))
    }

    pub fn lookup_type_by_scoped_name(&mut self, name: &str) -> TypeIndex {
        self.check_latest();
        self.freshen(FRESH_TYPES_BY_SCOPED_NAME);
        TypeIndex(self.types_by_scoped_name.get(name).copied().unwrap_or(0))
    }

    pub fn lookup_type_by_true_name(&mut self, name: &str) -> TypeIndex {
        self.check_latest();
        self.freshen(FRESH_TYPES_BY_TRUE_NAME);
        TypeIndex(self.types_by_true_name.get(name).copied().unwrap_or(0))
    }

    pub fn lookup_manifest_by_name(&mut self, name: &str) -> ManifestIndex {
        self.check_latest();
        self.freshen(FRESH_MANIFESTS_BY_NAME);
        ManifestIndex(self.manifests_by_name.get(name).copied().unwrap_or(0))
    }

    pub fn lookup_element_by_name(&mut self, name: &str) -> ElementIndex {
        self.check_latest();
        self.freshen(FRESH_ELEMENTS_BY_NAME);
        ElementIndex(self.elements_by_name.get(name).copied().unwrap_or(0))
    }

    pub fn lookup_element_by_scoped_name(&mut self, name: &str) -> ElementIndex {
        self.check_latest();
        self.freshen(FRESH_ELEMENTS_BY_SCOPED_NAME);
        ElementIndex(
            self.elements_by_scoped_name
                .get(name)
                .copied()
                .unwrap_or(0),
        )
    }

    /// Rebuild one lookup cache if its freshness bit is cleared.
    fn freshen(&mut self, bit: u32) {
        if (self.lookups_fresh & bit) != 0 {
            return;
        }
        match bit {
            FRESH_TYPES_BY_NAME => {
                self.types_by_name = self
                    .type_map
                    .iter()
                    .map(|(&i, t)| (t.name.clone(), i))
                    .collect();
            }
            FRESH_TYPES_BY_SCOPED_NAME => {
                self.types_by_scoped_name = self
                    .type_map
                    .iter()
                    .map(|(&i, t)| (t.scoped_name.clone(), i))
                    .collect();
            }
            FRESH_TYPES_BY_TRUE_NAME => {
                self.types_by_true_name = self
                    .type_map
                    .iter()
                    .map(|(&i, t)| (t.true_name.clone(), i))
                    .collect();
            }
            FRESH_MANIFESTS_BY_NAME => {
                self.manifests_by_name = self
                    .manifest_map
                    .iter()
                    .map(|(&i, m)| (m.name.clone(), i))
                    .collect();
            }
            FRESH_ELEMENTS_BY_NAME => {
                self.elements_by_name = self
                    .element_map
                    .iter()
                    .map(|(&i, e)| (e.name.clone(), i))
                    .collect();
            }
            FRESH_ELEMENTS_BY_SCOPED_NAME => {
                self.elements_by_scoped_name = self
                    .element_map
                    .iter()
                    .map(|(&i, e)| (e.scoped_name.clone(), i))
                    .collect();
            }
            _ => unreachable!("unknown lookup freshness bit"),
        }
        self.lookups_fresh |= bit;
    }

    // ========================================================================
    // Renumbering and merging
    // ========================================================================

    /// Resequence every index so wrappers start at `first_index` and run
    /// consecutively, followed by functions, types, manifests, and
    /// elements, in that fixed order. Returns the next available index.
    ///
    /// Wrapper contiguity is load-bearing: module defs address their
    /// function-pointer slots as `wrapper - first_index`.
    pub fn remap_indices(&mut self, first_index: u32) -> u32 {
        let mut remap = IndexRemapper::new();
        self.remap_indices_with(first_index, &mut remap)
    }

    /// As [`remap_indices`](Self::remap_indices), but exposes the old→new
    /// mapping so the caller can update its own tables to match.
    pub fn remap_indices_with(&mut self, first_index: u32, remap: &mut IndexRemapper) -> u32 {
        remap.clear();
        let mut next = first_index;

        renumber(&mut self.wrapper_map, remap, &mut next);
        renumber(&mut self.function_map, remap, &mut next);
        renumber(&mut self.type_map, remap, &mut next);
        renumber(&mut self.manifest_map, remap, &mut next);
        renumber(&mut self.element_map, remap, &mut next);
        self.next_index = next;

        for record in self.wrapper_map.values_mut() {
            record.remap_indices(remap);
        }
        for record in self.function_map.values_mut() {
            record.remap_indices(remap);
        }
        for record in self.type_map.values_mut() {
            record.remap_indices(remap);
        }
        for record in self.manifest_map.values_mut() {
            record.remap_indices(remap);
        }
        for record in self.element_map.values_mut() {
            record.remap_indices(remap);
        }

        for index in &mut self.global_types {
            *index = remap.map_type(*index);
        }
        for index in &mut self.all_types {
            *index = remap.map_type(*index);
        }
        for index in &mut self.global_functions {
            *index = remap.map_function(*index);
        }
        for index in &mut self.all_functions {
            *index = remap.map_function(*index);
        }
        for index in &mut self.global_manifests {
            *index = remap.map_manifest(*index);
        }
        for index in &mut self.global_elements {
            *index = remap.map_element(*index);
        }

        self.lookups_fresh = 0;
        self.next_index
    }

    /// Copy all data from `other` into this database.
    ///
    /// Type records present on both sides — matched by true name — are
    /// unified; every other record kind is copied verbatim. The caller must
    /// already have remapped `other` into a free index range (as
    /// [`read`](Self::read) does); colliding indices surface as the usual
    /// add errors.
    pub fn merge_from(&mut self, other: Database) -> Result<(), DbError> {
        let mut remap = IndexRemapper::new();

        // What types do we already have, by true name?
        let types_by_true_name: HashMap<&str, u32> = self
            .type_map
            .iter()
            .filter(|(_, t)| t.has_true_name())
            .map(|(&i, t)| (t.true_name.as_str(), i))
            .collect();

        // Determine the mapping of the other set of types into this one.
        for (&other_index, other_type) in &other.type_map {
            if other_type.has_true_name() {
                if let Some(&this_index) = types_by_true_name.get(other_type.true_name.as_str())
                {
                    // A type we have in common; merge rather than copy.
                    remap.add_mapping(other_index, this_index);
                }
            }
        }
        drop(types_by_true_name);

        for (other_index, other_type) in other.type_map {
            if !remap.in_map(other_index) {
                // A new type.
                self.add_type(TypeIndex(other_index), other_type)?;
                self.update_type(TypeIndex(other_index)).remap_indices(&remap);
            } else {
                // A type to merge with one of ours.
                let this_index = TypeIndex(remap.map_from(other_index));
                let was_global = self.get_type(this_index).is_global();
                if !was_global && other_type.is_global() {
                    self.global_types.push(this_index);
                }
                let mut merge_type = other_type;
                merge_type.remap_indices(&remap);
                self.update_type(this_index)
                    .merge_with(merge_type)
                    .map_err(|(existing, incoming)| DbError::TypeConflict {
                        index: this_index.raw(),
                        existing,
                        incoming,
                    })?;
            }
        }

        for (index, record) in other.function_map {
            self.add_function(FunctionIndex(index), record)?;
            self.update_function(FunctionIndex(index)).remap_indices(&remap);
        }
        for (index, record) in other.wrapper_map {
            self.add_wrapper(WrapperIndex(index), record)?;
            self.update_wrapper(WrapperIndex(index)).remap_indices(&remap);
        }
        for (index, record) in other.manifest_map {
            self.add_manifest(ManifestIndex(index), record)?;
            self.update_manifest(ManifestIndex(index)).remap_indices(&remap);
        }
        for (index, record) in other.element_map {
            self.add_element(ElementIndex(index), record)?;
            self.update_element(ElementIndex(index)).remap_indices(&remap);
        }

        self.next_index = self.next_index.max(other.next_index);
        self.lookups_fresh = 0;
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serialize the database to datafile text, stamped with the given
    /// module def and the current format version.
    pub fn write(&self, def: &ModuleDef) -> String {
        let mut w = DatafileWriter::new();

        // File header.
        w.write_u32(def.file_identifier);
        w.end_line();
        w.write_u32(CURRENT_MAJOR_VERSION);
        w.write_u32(CURRENT_MINOR_VERSION);
        w.end_line();

        // Module definition.
        w.write_string(&def.library_name);
        w.write_string(&def.library_hash_name);
        w.write_string(&def.module_name);
        w.end_line();

        // Components, each a count followed by that many records.
        w.write_u32(self.function_map.len() as u32);
        w.end_line();
        for (&index, record) in &self.function_map {
            w.write_u32(index);
            record.write(&mut w);
            w.end_line();
        }

        w.write_u32(self.wrapper_map.len() as u32);
        w.end_line();
        for (&index, record) in &self.wrapper_map {
            w.write_u32(index);
            record.write(&mut w);
            w.end_line();
        }

        w.write_u32(self.type_map.len() as u32);
        w.end_line();
        for (&index, record) in &self.type_map {
            w.write_u32(index);
            record.write(&mut w);
            w.end_line();
        }

        w.write_u32(self.manifest_map.len() as u32);
        w.end_line();
        for (&index, record) in &self.manifest_map {
            w.write_u32(index);
            record.write(&mut w);
            w.end_line();
        }

        w.write_u32(self.element_map.len() as u32);
        w.end_line();
        for (&index, record) in &self.element_map {
            w.write_u32(index);
            record.write(&mut w);
            w.end_line();
        }

        w.finish()
    }

    /// Write the database to a file on disk.
    pub fn write_file(&self, path: impl AsRef<Path>, def: &ModuleDef) -> Result<(), DbError> {
        std::fs::write(path, self.write(def))?;
        Ok(())
    }

    /// Read a database from datafile text and merge it into this one.
    ///
    /// The incoming data is staged in a scratch database, remapped onto
    /// either this database's free range (when the def reserves none) or
    /// the def's reserved range, then merged atomically: on any error this
    /// database is left in its last-known-good state.
    pub fn read(&mut self, contents: &str, def: &mut ModuleDef) -> Result<(), DbError> {
        let mut r = DatafileReader::new(contents);

        let file_identifier = r.next_u32()?;
        self.file_major_version = r.next_u32()?;
        self.file_minor_version = r.next_u32()?;

        if def.file_identifier != 0 && file_identifier != def.file_identifier {
            warn!(
                "interrogate data is out of sync with the compiled-in data \
                 (file identifier {} vs {})",
                file_identifier, def.file_identifier
            );
        }
        def.file_identifier = file_identifier;

        if self.file_major_version != CURRENT_MAJOR_VERSION
            || self.file_minor_version > CURRENT_MINOR_VERSION
        {
            return Err(DbError::VersionMismatch {
                file_major: self.file_major_version,
                file_minor: self.file_minor_version,
                expected_major: CURRENT_MAJOR_VERSION,
                expected_minor: CURRENT_MINOR_VERSION,
            });
        }

        let mut temp = Database::new();
        temp.read_new(&mut r, def)?;

        if def.first_index == 0 && def.next_index == 0 {
            self.next_index = temp.remap_indices(self.next_index);
        } else {
            let next = temp.remap_indices(def.first_index);
            if next != def.next_index {
                return Err(DbError::ModuleOutOfDate {
                    filename: def
                        .database_filename
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| def.library_name.clone()),
                });
            }
        }

        self.merge_from(temp)
    }

    /// Read a database file from disk and merge it into this one.
    pub fn read_file(
        &mut self,
        path: impl AsRef<Path>,
        def: &mut ModuleDef,
    ) -> Result<(), DbError> {
        let contents = std::fs::read_to_string(path)?;
        self.read(&contents, def)
    }

    /// Read datafile records into this freshly created database. The file
    /// header has already been consumed.
    fn read_new(&mut self, r: &mut DatafileReader<'_>, def: &mut ModuleDef) -> Result<(), DbError> {
        def.library_name = r.next_string()?;
        def.library_hash_name = r.next_string()?;
        def.module_name = r.next_string()?;

        let num_functions = r.next_u32()?;
        for _ in 0..num_functions {
            let index = FunctionIndex(r.next_u32()?);
            self.add_function(index, FunctionRecord::read(r)?)?;
        }

        let num_wrappers = r.next_u32()?;
        for _ in 0..num_wrappers {
            let index = WrapperIndex(r.next_u32()?);
            self.add_wrapper(index, WrapperRecord::read(r)?)?;
        }

        let num_types = r.next_u32()?;
        for _ in 0..num_types {
            let index = TypeIndex(r.next_u32()?);
            self.add_type(index, TypeRecord::read(r)?)?;
        }

        let num_manifests = r.next_u32()?;
        for _ in 0..num_manifests {
            let index = ManifestIndex(r.next_u32()?);
            self.add_manifest(index, ManifestRecord::read(r)?)?;
        }

        let num_elements = r.next_u32()?;
        for _ in 0..num_elements {
            let index = ElementIndex(r.next_u32()?);
            self.add_element(index, ElementRecord::read(r)?)?;
        }

        Ok(())
    }

    // ========================================================================
    // Lazy loading
    // ========================================================================

    /// Drain the queue of requested module database files.
    ///
    /// Failures here are logged and skipped rather than propagated: one
    /// stale or missing module file must not take down queries against
    /// every other module. Use [`read_file`](Self::read_file) directly for
    /// fail-fast loading.
    fn check_latest(&mut self) {
        if self.requests.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.requests);
        for slot in pending {
            let Some(filename) = self.modules[slot].database_filename.clone() else {
                continue;
            };
            let pathname = if filename.is_absolute() {
                Some(filename.clone())
            } else {
                self.search_path.find_file(&filename)
            };
            let Some(pathname) = pathname else {
                error!(
                    "unable to find {} on {}",
                    filename.display(),
                    self.search_path
                );
                continue;
            };

            let contents = match std::fs::read_to_string(&pathname) {
                Ok(contents) => contents,
                Err(err) => {
                    error!("unable to read {}: {}", pathname.display(), err);
                    continue;
                }
            };

            debug!("reading {}", pathname.display());
            let mut def = std::mem::take(&mut self.modules[slot]);
            if let Err(err) = self.read(&contents, &mut def) {
                error!("error reading {}: {}", pathname.display(), err);
            }
            self.modules[slot] = def;
        }
    }

    /// Major version of the database file most recently read.
    pub fn get_file_major_version(&self) -> u32 {
        self.file_major_version
    }

    /// Minor version of the database file most recently read.
    pub fn get_file_minor_version(&self) -> u32 {
        self.file_minor_version
    }

    pub fn get_current_major_version(&self) -> u32 {
        CURRENT_MAJOR_VERSION
    }

    pub fn get_current_minor_version(&self) -> u32 {
        CURRENT_MINOR_VERSION
    }
}

/// Move every record of `map` to consecutive indices starting at `*next`,
/// recording each move in `remap`.
fn renumber<T>(map: &mut BTreeMap<u32, T>, remap: &mut IndexRemapper, next: &mut u32) {
    let old = std::mem::take(map);
    for (old_index, record) in old {
        remap.add_mapping(old_index, *next);
        map.insert(*next, record);
        *next += 1;
    }
}

/// Binary search a module's sorted unique-name table for a wrapper hash.
/// Returns the wrapper's index offset within the module, or -1.
fn binary_search_wrapper_hash(entries: &[UniqueNameEntry], wrapper_hash: &str) -> i64 {
    match entries.binary_search_by(|entry| entry.name.as_str().cmp(wrapper_hash)) {
        Ok(pos) => entries[pos].index_offset as i64,
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_record(name: &str, flags: u32) -> TypeRecord {
        TypeRecord {
            flags,
            name: name.to_string(),
            scoped_name: name.to_string(),
            true_name: name.to_string(),
            ..TypeRecord::default()
        }
    }

    #[test]
    fn unknown_indices_return_the_bogus_record() {
        let mut db = Database::new();
        assert_eq!(db.get_type(TypeIndex(99)).name, "");
        assert!(!db.get_wrapper(WrapperIndex(99)).has_return_value());
        assert_eq!(db.get_function(FunctionIndex(99)).wrappers.len(), 0);
    }

    #[test]
    fn zero_index_is_rejected() {
        let mut db = Database::new();
        assert!(db.add_type(TypeIndex::NONE, TypeRecord::default()).is_err());
        assert!(db
            .add_function(FunctionIndex::NONE, FunctionRecord::default())
            .is_err());
    }

    #[test]
    fn duplicate_function_index_is_an_error() {
        let mut db = Database::new();
        db.add_function(FunctionIndex(1), FunctionRecord::default())
            .unwrap();
        let err = db
            .add_function(FunctionIndex(1), FunctionRecord::default())
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateIndex { .. }));
    }

    #[test]
    fn forward_reference_type_merges_in_place() {
        let mut db = Database::new();
        db.add_type(TypeIndex(5), type_record("Foo", 0)).unwrap();
        assert!(!db.get_type(TypeIndex(5)).is_fully_defined());

        db.add_type(
            TypeIndex(5),
            type_record("Foo", TypeRecord::F_FULLY_DEFINED | TypeRecord::F_CLASS),
        )
        .unwrap();
        assert!(db.get_type(TypeIndex(5)).is_fully_defined());
        // Still exactly one entry in the enumeration list.
        assert_eq!(db.get_num_all_types(), 1);
    }

    #[test]
    fn conflicting_fully_defined_types_fail() {
        let mut db = Database::new();
        db.add_type(
            TypeIndex(5),
            type_record("Foo", TypeRecord::F_FULLY_DEFINED),
        )
        .unwrap();
        let err = db
            .add_type(
                TypeIndex(5),
                type_record("Bar", TypeRecord::F_FULLY_DEFINED),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::TypeConflict { index: 5, .. }));
        // Last-known-good: the original record is untouched.
        assert_eq!(db.get_type(TypeIndex(5)).true_name, "Foo");
    }

    #[test]
    fn lookup_caches_go_stale_on_mutation() {
        let mut db = Database::new();
        db.add_type(TypeIndex(1), type_record("Foo", TypeRecord::F_GLOBAL))
            .unwrap();
        assert_eq!(db.lookup_type_by_name("Foo"), TypeIndex(1));
        assert_eq!(db.lookup_type_by_name("Bar"), TypeIndex::NONE);

        db.add_type(TypeIndex(2), type_record("Bar", TypeRecord::F_GLOBAL))
            .unwrap();
        // The freshness bit was cleared; the next lookup rebuilds.
        assert_eq!(db.lookup_type_by_name("Bar"), TypeIndex(2));
    }

    #[test]
    fn remap_keeps_wrappers_first_and_contiguous() {
        let mut db = Database::new();
        db.add_type(TypeIndex(10), type_record("Foo", 0)).unwrap();
        db.add_wrapper(WrapperIndex(20), WrapperRecord::default())
            .unwrap();
        db.add_wrapper(WrapperIndex(30), WrapperRecord::default())
            .unwrap();
        db.add_function(FunctionIndex(40), FunctionRecord::default())
            .unwrap();

        let next = db.remap_indices(1000);
        assert_eq!(next, 1004);
        let wrappers: Vec<u32> = db.wrappers().map(|(i, _)| i.raw()).collect();
        assert_eq!(wrappers, vec![1000, 1001]);
        let functions: Vec<u32> = db.functions().map(|(i, _)| i.raw()).collect();
        assert_eq!(functions, vec![1002]);
        let types: Vec<u32> = db.types().map(|(i, _)| i.raw()).collect();
        assert_eq!(types, vec![1003]);
    }

    #[test]
    fn remap_preserves_cross_references() {
        let mut db = Database::new();
        db.add_type(TypeIndex(7), type_record("Foo", 0)).unwrap();
        db.add_wrapper(
            WrapperIndex(8),
            WrapperRecord {
                flags: WrapperRecord::F_HAS_RETURN,
                return_type: TypeIndex(7),
                ..WrapperRecord::default()
            },
        )
        .unwrap();

        db.remap_indices(1000);
        let (wrapper_index, wrapper) = db.wrappers().next().map(|(i, w)| (i, w.clone())).unwrap();
        assert_eq!(wrapper_index, WrapperIndex(1000));
        let return_type = wrapper.return_type;
        assert_eq!(db.get_type(return_type).name, "Foo");
    }

    #[test]
    fn module_binary_search_finds_owner() {
        let mut db = Database::new();
        db.request_module(ModuleDef {
            library_name: "alpha".to_string(),
            first_index: 0,
            next_index: 10,
            fptrs: (0..10)
                .map(|i| FunctionPointer::new((0x1000 + i) as *const ()))
                .collect(),
            ..ModuleDef::default()
        });
        db.request_module(ModuleDef {
            library_name: "beta".to_string(),
            first_index: 0,
            next_index: 5,
            fptrs: (0..5)
                .map(|i| FunctionPointer::new((0x2000 + i) as *const ()))
                .collect(),
            ..ModuleDef::default()
        });

        // alpha owns [1, 11), beta owns [11, 16).
        let p = db.get_fptr(WrapperIndex(3)).unwrap();
        assert_eq!(p.as_ptr(), 0x1002 as *const ());
        let p = db.get_fptr(WrapperIndex(12)).unwrap();
        assert_eq!(p.as_ptr(), 0x2001 as *const ());
        assert!(db.get_fptr(WrapperIndex(99)).is_none());
    }

    #[test]
    fn unique_name_lookup_splits_at_four_characters() {
        let mut db = Database::new();
        db.request_module(ModuleDef {
            library_name: "alpha".to_string(),
            library_hash_name: "ABCD".to_string(),
            first_index: 0,
            next_index: 5,
            unique_names: vec![
                UniqueNameEntry {
                    name: "xyz123".to_string(),
                    index_offset: 2,
                },
                UniqueNameEntry {
                    name: "aaa000".to_string(),
                    index_offset: 0,
                },
            ],
            ..ModuleDef::default()
        });

        // Module got re-based to [1, 6).
        assert_eq!(db.get_wrapper_by_unique_name("ABCDxyz123"), WrapperIndex(3));
        assert_eq!(db.get_wrapper_by_unique_name("ABCDaaa000"), WrapperIndex(1));
        assert_eq!(
            db.get_wrapper_by_unique_name("ABCDnope"),
            WrapperIndex::NONE
        );
        assert_eq!(
            db.get_wrapper_by_unique_name("WXYZxyz123"),
            WrapperIndex::NONE
        );
        assert_eq!(db.get_wrapper_by_unique_name("AB"), WrapperIndex::NONE);
    }

    #[test]
    fn version_gate_rejects_newer_files() {
        let mut db = Database::new();
        let mut def = ModuleDef::default();

        let err = db.read("0 \n3 0 \n0 0 0 \n", &mut def).unwrap_err();
        assert!(matches!(err, DbError::VersionMismatch { file_major: 3, .. }));
        assert_eq!(db.get_num_all_types(), 0);

        let err = db.read("0 \n2 3 \n0 0 0 \n", &mut def).unwrap_err();
        assert!(matches!(err, DbError::VersionMismatch { file_minor: 3, .. }));
    }

    #[test]
    fn older_minor_version_is_accepted() {
        let mut db = Database::new();
        let mut def = ModuleDef::default();
        // An empty 2.0 database: no module strings, zero of each record.
        db.read("0 \n2 0 \n0 0 0 \n0 \n0 \n0 \n0 \n0 \n", &mut def)
            .unwrap();
        assert_eq!(db.get_file_minor_version(), 0);
    }
}
