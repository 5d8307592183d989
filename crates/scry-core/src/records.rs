//! The five record kinds stored in the interrogation database.
//!
//! Records are plain data: names, flags words, and cross-references to other
//! records by index. They know how to write themselves to the datafile
//! format, read themselves back, and rewrite their cross-references through
//! an [`IndexRemapper`]. They deliberately know nothing about the C++ type
//! model that produced them — the database is the handoff point between the
//! parser and a binding generator, and both sides speak only these records.
//!
//! Field order within each record's datafile form is a wire contract; add
//! new fields only at the end, guarded by a minor version bump.

use crate::datafile::{DatafileReader, DatafileWriter};
use crate::error::DbError;
use crate::index::{
    ElementIndex, FunctionIndex, IndexRemapper, TypeIndex, WrapperIndex,
};

// ============================================================================
// Types
// ============================================================================

/// The builtin kind of an atomic (non-composite) type record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    #[default]
    NotAtomic,
    Int,
    Float,
    Double,
    Bool,
    Char,
    Void,
    String,
    LongLong,
}

impl AtomicKind {
    fn to_raw(self) -> u32 {
        match self {
            AtomicKind::NotAtomic => 0,
            AtomicKind::Int => 1,
            AtomicKind::Float => 2,
            AtomicKind::Double => 3,
            AtomicKind::Bool => 4,
            AtomicKind::Char => 5,
            AtomicKind::Void => 6,
            AtomicKind::String => 7,
            AtomicKind::LongLong => 8,
        }
    }

    fn from_raw(raw: u32) -> Result<Self, DbError> {
        Ok(match raw {
            0 => AtomicKind::NotAtomic,
            1 => AtomicKind::Int,
            2 => AtomicKind::Float,
            3 => AtomicKind::Double,
            4 => AtomicKind::Bool,
            5 => AtomicKind::Char,
            6 => AtomicKind::Void,
            7 => AtomicKind::String,
            8 => AtomicKind::LongLong,
            _ => return Err(DbError::datafile("unknown atomic kind")),
        })
    }
}

/// One named value of an enum type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumValueRecord {
    pub name: String,
    pub scoped_name: String,
    pub value: i64,
}

/// A type known to the database.
///
/// A type record may begin life as an incomplete forward reference (no
/// [`F_FULLY_DEFINED`](Self::F_FULLY_DEFINED) flag) and later be merged with
/// its full definition; see [`merge_with`](Self::merge_with). The *true
/// name* is the fully-qualified canonical name used as the deduplication key
/// when merging databases.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TypeRecord {
    pub flags: u32,
    pub name: String,
    pub scoped_name: String,
    pub true_name: String,
    pub comment: String,
    pub atomic_kind: AtomicKind,
    /// The enclosing class for a nested type.
    pub outer_type: TypeIndex,
    /// The pointed-to / qualified type for pointer and const derivations.
    pub wrapped_type: TypeIndex,
    pub constructors: Vec<FunctionIndex>,
    pub destructor: FunctionIndex,
    pub methods: Vec<FunctionIndex>,
    pub elements: Vec<ElementIndex>,
    /// Direct base classes.
    pub derivations: Vec<TypeIndex>,
    pub nested_types: Vec<TypeIndex>,
    pub enum_values: Vec<EnumValueRecord>,
}

impl TypeRecord {
    /// Declared at global scope; a candidate for export.
    pub const F_GLOBAL: u32 = 0x0001;
    /// The full definition has been seen, not just a forward reference.
    pub const F_FULLY_DEFINED: u32 = 0x0002;
    pub const F_ATOMIC: u32 = 0x0004;
    pub const F_POINTER: u32 = 0x0008;
    pub const F_CONST: u32 = 0x0010;
    pub const F_STRUCT: u32 = 0x0020;
    pub const F_CLASS: u32 = 0x0040;
    pub const F_UNION: u32 = 0x0080;
    pub const F_ENUM: u32 = 0x0100;
    /// Nested within another class, rather than at namespace scope.
    pub const F_NESTED: u32 = 0x0200;

    pub fn is_global(&self) -> bool {
        (self.flags & Self::F_GLOBAL) != 0
    }

    pub fn is_fully_defined(&self) -> bool {
        (self.flags & Self::F_FULLY_DEFINED) != 0
    }

    pub fn is_enum(&self) -> bool {
        (self.flags & Self::F_ENUM) != 0
    }

    pub fn has_true_name(&self) -> bool {
        !self.true_name.is_empty()
    }

    /// Fold `other` into this record.
    ///
    /// This is the forward-reference fill-in path: whichever side is fully
    /// defined contributes the concrete fields, and member lists are
    /// unioned. Two fully-defined records may only merge when they agree on
    /// the true name; anything else is a [`DbError::TypeConflict`] reported
    /// by the caller with the index attached.
    pub fn merge_with(&mut self, other: TypeRecord) -> Result<(), (String, String)> {
        if self.is_fully_defined()
            && other.is_fully_defined()
            && self.true_name != other.true_name
        {
            return Err((self.true_name.clone(), other.true_name.clone()));
        }

        // If the other side carries the definition, its concrete fields win.
        let other_defined = other.is_fully_defined() && !self.is_fully_defined();

        self.flags |= other.flags;
        if self.name.is_empty() {
            self.name = other.name;
        }
        if self.scoped_name.is_empty() {
            self.scoped_name = other.scoped_name;
        }
        if self.true_name.is_empty() {
            self.true_name = other.true_name;
        }
        if self.comment.is_empty() {
            self.comment = other.comment;
        }
        if self.atomic_kind == AtomicKind::NotAtomic || other_defined {
            if other.atomic_kind != AtomicKind::NotAtomic {
                self.atomic_kind = other.atomic_kind;
            }
        }
        if self.outer_type.is_none() {
            self.outer_type = other.outer_type;
        }
        if self.wrapped_type.is_none() {
            self.wrapped_type = other.wrapped_type;
        }
        if self.destructor.is_none() {
            self.destructor = other.destructor;
        }

        merge_index_list(&mut self.constructors, other.constructors);
        merge_index_list(&mut self.methods, other.methods);
        merge_index_list(&mut self.elements, other.elements);
        merge_index_list(&mut self.derivations, other.derivations);
        merge_index_list(&mut self.nested_types, other.nested_types);
        if self.enum_values.is_empty() {
            self.enum_values = other.enum_values;
        }

        Ok(())
    }

    pub fn remap_indices(&mut self, remap: &IndexRemapper) {
        self.outer_type = remap.map_type(self.outer_type);
        self.wrapped_type = remap.map_type(self.wrapped_type);
        self.destructor = remap.map_function(self.destructor);
        for f in &mut self.constructors {
            *f = remap.map_function(*f);
        }
        for f in &mut self.methods {
            *f = remap.map_function(*f);
        }
        for e in &mut self.elements {
            *e = remap.map_element(*e);
        }
        for t in &mut self.derivations {
            *t = remap.map_type(*t);
        }
        for t in &mut self.nested_types {
            *t = remap.map_type(*t);
        }
    }

    pub fn write(&self, w: &mut DatafileWriter) {
        w.write_u32(self.flags);
        w.write_u32(self.atomic_kind.to_raw());
        w.write_u32(self.outer_type.raw());
        w.write_u32(self.wrapped_type.raw());
        w.write_u32(self.destructor.raw());
        w.write_string(&self.name);
        w.write_string(&self.scoped_name);
        w.write_string(&self.true_name);
        w.write_string(&self.comment);
        write_index_list(w, &self.constructors, FunctionIndex::raw);
        write_index_list(w, &self.methods, FunctionIndex::raw);
        write_index_list(w, &self.elements, ElementIndex::raw);
        write_index_list(w, &self.derivations, TypeIndex::raw);
        write_index_list(w, &self.nested_types, TypeIndex::raw);
        w.write_u32(self.enum_values.len() as u32);
        for ev in &self.enum_values {
            w.write_string(&ev.name);
            w.write_string(&ev.scoped_name);
            w.write_i64(ev.value);
        }
    }

    pub fn read(r: &mut DatafileReader<'_>) -> Result<Self, DbError> {
        let flags = r.next_u32()?;
        let atomic_kind = AtomicKind::from_raw(r.next_u32()?)?;
        let outer_type = TypeIndex(r.next_u32()?);
        let wrapped_type = TypeIndex(r.next_u32()?);
        let destructor = FunctionIndex(r.next_u32()?);
        let name = r.next_string()?;
        let scoped_name = r.next_string()?;
        let true_name = r.next_string()?;
        let comment = r.next_string()?;
        let constructors = read_index_list(r, FunctionIndex)?;
        let methods = read_index_list(r, FunctionIndex)?;
        let elements = read_index_list(r, ElementIndex)?;
        let derivations = read_index_list(r, TypeIndex)?;
        let nested_types = read_index_list(r, TypeIndex)?;
        let count = r.next_u32()?;
        let mut enum_values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            enum_values.push(EnumValueRecord {
                name: r.next_string()?,
                scoped_name: r.next_string()?,
                value: r.next_i64()?,
            });
        }
        Ok(TypeRecord {
            flags,
            name,
            scoped_name,
            true_name,
            comment,
            atomic_kind,
            outer_type,
            wrapped_type,
            constructors,
            destructor,
            methods,
            elements,
            derivations,
            nested_types,
            enum_values,
        })
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A function known to the database: a name plus an overload set of
/// wrappers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FunctionRecord {
    pub flags: u32,
    pub name: String,
    pub scoped_name: String,
    pub comment: String,
    /// The owning class, for methods.
    pub class_type: TypeIndex,
    pub wrappers: Vec<WrapperIndex>,
}

impl FunctionRecord {
    /// A free function at global or namespace scope, not a method.
    pub const F_GLOBAL: u32 = 0x0001;
    pub const F_METHOD: u32 = 0x0002;
    pub const F_VIRTUAL: u32 = 0x0004;

    pub fn is_global(&self) -> bool {
        (self.flags & Self::F_GLOBAL) != 0
    }

    pub fn is_method(&self) -> bool {
        (self.flags & Self::F_METHOD) != 0
    }

    pub fn remap_indices(&mut self, remap: &IndexRemapper) {
        self.class_type = remap.map_type(self.class_type);
        for w in &mut self.wrappers {
            *w = remap.map_wrapper(*w);
        }
    }

    pub fn write(&self, w: &mut DatafileWriter) {
        w.write_u32(self.flags);
        w.write_u32(self.class_type.raw());
        w.write_string(&self.name);
        w.write_string(&self.scoped_name);
        w.write_string(&self.comment);
        write_index_list(w, &self.wrappers, WrapperIndex::raw);
    }

    pub fn read(r: &mut DatafileReader<'_>) -> Result<Self, DbError> {
        Ok(FunctionRecord {
            flags: r.next_u32()?,
            class_type: TypeIndex(r.next_u32()?),
            name: r.next_string()?,
            scoped_name: r.next_string()?,
            comment: r.next_string()?,
            wrappers: read_index_list(r, WrapperIndex)?,
        })
    }
}

// ============================================================================
// Function wrappers
// ============================================================================

/// One parameter of a function wrapper.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WrapperParameter {
    pub flags: u32,
    pub param_type: TypeIndex,
    pub name: String,
}

impl WrapperParameter {
    pub const PF_HAS_NAME: u32 = 0x0001;
    /// This parameter is the synthesized `this` pointer.
    pub const PF_IS_THIS: u32 = 0x0002;

    pub fn has_name(&self) -> bool {
        (self.flags & Self::PF_HAS_NAME) != 0
    }

    pub fn is_this(&self) -> bool {
        (self.flags & Self::PF_IS_THIS) != 0
    }
}

/// One concrete callable signature of a function, after parameter
/// remapping.
///
/// This is the record a binding generator consumes: the parameter list in
/// call order (with any synthesized `this` first), the exported return
/// type, and the memory contract for the return value. The unique name is
/// the cross-module lookup key: the first four characters are the library
/// hash name, the remainder the per-wrapper hash.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WrapperRecord {
    pub flags: u32,
    pub function: FunctionIndex,
    pub return_type: TypeIndex,
    /// Destructor to call when the caller owns the return value.
    pub return_value_destructor: FunctionIndex,
    pub unique_name: String,
    pub parameters: Vec<WrapperParameter>,
}

impl WrapperRecord {
    /// The caller is responsible for freeing the return value.
    pub const F_CALLER_MANAGES: u32 = 0x0001;
    pub const F_HAS_RETURN: u32 = 0x0002;
    pub const F_CALLABLE_BY_NAME: u32 = 0x0004;

    pub fn caller_manages_return_value(&self) -> bool {
        (self.flags & Self::F_CALLER_MANAGES) != 0
    }

    pub fn has_return_value(&self) -> bool {
        (self.flags & Self::F_HAS_RETURN) != 0
    }

    pub fn is_callable_by_name(&self) -> bool {
        (self.flags & Self::F_CALLABLE_BY_NAME) != 0
    }

    pub fn number_of_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_is_this(&self, n: usize) -> bool {
        self.parameters.get(n).is_some_and(WrapperParameter::is_this)
    }

    pub fn remap_indices(&mut self, remap: &IndexRemapper) {
        self.function = remap.map_function(self.function);
        self.return_type = remap.map_type(self.return_type);
        self.return_value_destructor = remap.map_function(self.return_value_destructor);
        for p in &mut self.parameters {
            p.param_type = remap.map_type(p.param_type);
        }
    }

    pub fn write(&self, w: &mut DatafileWriter) {
        w.write_u32(self.flags);
        w.write_u32(self.function.raw());
        w.write_u32(self.return_type.raw());
        w.write_u32(self.return_value_destructor.raw());
        w.write_string(&self.unique_name);
        w.write_u32(self.parameters.len() as u32);
        for p in &self.parameters {
            w.write_u32(p.flags);
            w.write_u32(p.param_type.raw());
            w.write_string(&p.name);
        }
    }

    pub fn read(r: &mut DatafileReader<'_>) -> Result<Self, DbError> {
        let flags = r.next_u32()?;
        let function = FunctionIndex(r.next_u32()?);
        let return_type = TypeIndex(r.next_u32()?);
        let return_value_destructor = FunctionIndex(r.next_u32()?);
        let unique_name = r.next_string()?;
        let count = r.next_u32()?;
        let mut parameters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            parameters.push(WrapperParameter {
                flags: r.next_u32()?,
                param_type: TypeIndex(r.next_u32()?),
                name: r.next_string()?,
            });
        }
        Ok(WrapperRecord {
            flags,
            function,
            return_type,
            return_value_destructor,
            unique_name,
            parameters,
        })
    }
}

// ============================================================================
// Manifests
// ============================================================================

/// A named compile-time constant: a `#define` of constant value or a
/// `static const` at global scope.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ManifestRecord {
    pub flags: u32,
    pub name: String,
    /// The literal replacement text.
    pub definition: String,
    pub manifest_type: TypeIndex,
    pub int_value: i64,
    /// Function returning the value, for non-integer constants.
    pub getter: FunctionIndex,
}

impl ManifestRecord {
    pub const F_HAS_TYPE: u32 = 0x0001;
    pub const F_HAS_INT_VALUE: u32 = 0x0002;
    pub const F_HAS_GETTER: u32 = 0x0004;

    pub fn has_type(&self) -> bool {
        (self.flags & Self::F_HAS_TYPE) != 0
    }

    pub fn has_int_value(&self) -> bool {
        (self.flags & Self::F_HAS_INT_VALUE) != 0
    }

    pub fn remap_indices(&mut self, remap: &IndexRemapper) {
        self.manifest_type = remap.map_type(self.manifest_type);
        self.getter = remap.map_function(self.getter);
    }

    pub fn write(&self, w: &mut DatafileWriter) {
        w.write_u32(self.flags);
        w.write_u32(self.manifest_type.raw());
        w.write_i64(self.int_value);
        w.write_u32(self.getter.raw());
        w.write_string(&self.name);
        w.write_string(&self.definition);
    }

    pub fn read(r: &mut DatafileReader<'_>) -> Result<Self, DbError> {
        Ok(ManifestRecord {
            flags: r.next_u32()?,
            manifest_type: TypeIndex(r.next_u32()?),
            int_value: r.next_i64()?,
            getter: FunctionIndex(r.next_u32()?),
            name: r.next_string()?,
            definition: r.next_string()?,
        })
    }
}

// ============================================================================
// Elements
// ============================================================================

/// A named data member or global variable, with the accessors a binding
/// layer should use to reach it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ElementRecord {
    pub flags: u32,
    pub name: String,
    pub scoped_name: String,
    pub element_type: TypeIndex,
    pub getter: FunctionIndex,
    pub setter: FunctionIndex,
}

impl ElementRecord {
    pub const F_GLOBAL: u32 = 0x0001;
    pub const F_HAS_GETTER: u32 = 0x0002;
    pub const F_HAS_SETTER: u32 = 0x0004;

    pub fn is_global(&self) -> bool {
        (self.flags & Self::F_GLOBAL) != 0
    }

    pub fn has_getter(&self) -> bool {
        (self.flags & Self::F_HAS_GETTER) != 0
    }

    pub fn has_setter(&self) -> bool {
        (self.flags & Self::F_HAS_SETTER) != 0
    }

    pub fn remap_indices(&mut self, remap: &IndexRemapper) {
        self.element_type = remap.map_type(self.element_type);
        self.getter = remap.map_function(self.getter);
        self.setter = remap.map_function(self.setter);
    }

    pub fn write(&self, w: &mut DatafileWriter) {
        w.write_u32(self.flags);
        w.write_u32(self.element_type.raw());
        w.write_u32(self.getter.raw());
        w.write_u32(self.setter.raw());
        w.write_string(&self.name);
        w.write_string(&self.scoped_name);
    }

    pub fn read(r: &mut DatafileReader<'_>) -> Result<Self, DbError> {
        Ok(ElementRecord {
            flags: r.next_u32()?,
            element_type: TypeIndex(r.next_u32()?),
            getter: FunctionIndex(r.next_u32()?),
            setter: FunctionIndex(r.next_u32()?),
            name: r.next_string()?,
            scoped_name: r.next_string()?,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn merge_index_list<T: Copy + PartialEq>(dest: &mut Vec<T>, src: Vec<T>) {
    for item in src {
        if !dest.contains(&item) {
            dest.push(item);
        }
    }
}

fn write_index_list<T: Copy>(w: &mut DatafileWriter, list: &[T], raw: impl Fn(T) -> u32) {
    w.write_u32(list.len() as u32);
    for &item in list {
        w.write_u32(raw(item));
    }
}

fn read_index_list<T>(
    r: &mut DatafileReader<'_>,
    wrap: impl Fn(u32) -> T,
) -> Result<Vec<T>, DbError> {
    let count = r.next_u32()?;
    let mut list = Vec::with_capacity(count as usize);
    for _ in 0..count {
        list.push(wrap(r.next_u32()?));
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wrapper() -> WrapperRecord {
        WrapperRecord {
            flags: WrapperRecord::F_HAS_RETURN | WrapperRecord::F_CALLABLE_BY_NAME,
            function: FunctionIndex(4),
            return_type: TypeIndex(2),
            return_value_destructor: FunctionIndex::NONE,
            unique_name: "ABCDxyz123".to_string(),
            parameters: vec![
                WrapperParameter {
                    flags: WrapperParameter::PF_IS_THIS,
                    param_type: TypeIndex(9),
                    name: String::new(),
                },
                WrapperParameter {
                    flags: WrapperParameter::PF_HAS_NAME,
                    param_type: TypeIndex(3),
                    name: "s".to_string(),
                },
            ],
        }
    }

    #[test]
    fn wrapper_round_trips() {
        let wrapper = sample_wrapper();
        let mut w = DatafileWriter::new();
        wrapper.write(&mut w);
        let text = w.finish();

        let mut r = DatafileReader::new(&text);
        let back = WrapperRecord::read(&mut r).unwrap();
        assert_eq!(back, wrapper);
        assert!(back.has_return_value());
        assert!(back.parameter_is_this(0));
        assert!(!back.parameter_is_this(1));
    }

    #[test]
    fn type_round_trips() {
        let record = TypeRecord {
            flags: TypeRecord::F_GLOBAL | TypeRecord::F_FULLY_DEFINED | TypeRecord::F_CLASS,
            name: "Foo".to_string(),
            scoped_name: "Foo".to_string(),
            true_name: "Foo".to_string(),
            comment: "A class.".to_string(),
            methods: vec![FunctionIndex(4), FunctionIndex(5)],
            enum_values: vec![EnumValueRecord {
                name: "RED".to_string(),
                scoped_name: "Color::RED".to_string(),
                value: -1,
            }],
            ..TypeRecord::default()
        };
        let mut w = DatafileWriter::new();
        record.write(&mut w);
        let text = w.finish();

        let back = TypeRecord::read(&mut DatafileReader::new(&text)).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn forward_reference_merges_into_full_definition() {
        let mut fwd = TypeRecord {
            name: "Foo".to_string(),
            true_name: "Foo".to_string(),
            ..TypeRecord::default()
        };
        let full = TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED | TypeRecord::F_CLASS,
            name: "Foo".to_string(),
            scoped_name: "Foo".to_string(),
            true_name: "Foo".to_string(),
            methods: vec![FunctionIndex(7)],
            ..TypeRecord::default()
        };

        fwd.merge_with(full).unwrap();
        assert!(fwd.is_fully_defined());
        assert_eq!(fwd.methods, vec![FunctionIndex(7)]);
    }

    #[test]
    fn fully_defined_types_with_different_true_names_conflict() {
        let mut a = TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED,
            true_name: "Foo".to_string(),
            ..TypeRecord::default()
        };
        let b = TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED,
            true_name: "Bar".to_string(),
            ..TypeRecord::default()
        };
        assert!(a.merge_with(b).is_err());
    }

    #[test]
    fn merge_does_not_duplicate_members() {
        let mut a = TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED,
            true_name: "Foo".to_string(),
            methods: vec![FunctionIndex(4)],
            ..TypeRecord::default()
        };
        let b = TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED,
            true_name: "Foo".to_string(),
            methods: vec![FunctionIndex(4), FunctionIndex(5)],
            ..TypeRecord::default()
        };
        a.merge_with(b).unwrap();
        assert_eq!(a.methods, vec![FunctionIndex(4), FunctionIndex(5)]);
    }

    #[test]
    fn remap_rewrites_every_cross_reference() {
        let mut remap = IndexRemapper::new();
        remap.add_mapping(2, 1002);
        remap.add_mapping(9, 1009);

        let mut wrapper = sample_wrapper();
        wrapper.remap_indices(&remap);
        assert_eq!(wrapper.return_type, TypeIndex(1002));
        assert_eq!(wrapper.parameters[0].param_type, TypeIndex(1009));
        // Unmapped indices pass through.
        assert_eq!(wrapper.function, FunctionIndex(4));
    }
}
