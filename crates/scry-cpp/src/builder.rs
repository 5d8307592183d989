//! The database builder: walks a parsed, resolved scope tree and registers
//! every exported entity into a `scry-core` database.
//!
//! The builder assigns indices from the database's own counter, registers
//! incidental types (pointers, const wrappers, the string boundary type)
//! on demand, applies the parameter remapping policy to every function
//! signature, and computes the hash-based unique wrapper names a binding
//! layer uses for cross-module lookup.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use scry_core::{
    AtomicKind, Database, DbError, ElementIndex, ElementRecord, EnumValueRecord, FunctionIndex,
    FunctionRecord, ManifestIndex, ManifestRecord, TypeIndex, TypeRecord, WrapperIndex,
    WrapperParameter, WrapperRecord,
};

use crate::ast::decl::{Declaration, FunctionDecl, FunctionGroup, InstanceDecl};
use crate::ast::ty::{Access, CppType, SimpleKind, StructType};
use crate::parser::Parser;
use crate::remap::{ParameterRemap, RemapContext, RemapRegistry};
use crate::scope::{ScopeArena, ScopeId};

/// What to stamp into the database being built.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub library_name: String,
    pub module_name: String,
}

/// Counts reported back to the batch driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub types: usize,
    pub functions: usize,
    pub manifests: usize,
    pub elements: usize,
}

/// Register everything the parser produced into `db`.
///
/// The parser should have had [`Parser::resolve_types`] run first so TBD
/// placeholders that can resolve, have.
pub fn build_database(
    parser: &Parser,
    db: &mut Database,
    options: &BuildOptions,
) -> Result<BuildStats, DbError> {
    let library_hash = hash_string(&options.library_name, 4);
    let mut builder = Builder {
        arena: &parser.arena,
        db,
        registry: RemapRegistry::with_default_rules(),
        library_hash,
        types_seen: HashMap::new(),
    };

    let global = parser.arena.global();
    builder.scan_scope(global, true)?;
    builder.register_manifests(parser)?;

    Ok(BuildStats {
        types: builder.db.get_num_all_types(),
        functions: builder.db.get_num_all_functions(),
        manifests: builder.db.get_num_global_manifests(),
        elements: builder.db.get_num_global_elements(),
    })
}

/// The 4-character library hash used as the unique-name prefix.
pub fn library_hash_name(library_name: &str) -> String {
    hash_string(library_name, 4)
}

struct Builder<'a> {
    arena: &'a ScopeArena,
    db: &'a mut Database,
    registry: RemapRegistry,
    library_hash: String,
    /// True name → index, pre-seeded before a record is filled so
    /// self-referential types terminate.
    types_seen: HashMap<String, TypeIndex>,
}

impl<'a> Builder<'a> {
    /// Walk one namespace-like scope, registering its exported contents.
    fn scan_scope(&mut self, scope_id: ScopeId, global: bool) -> Result<(), DbError> {
        let decls: Vec<Declaration> = self.arena.scope(scope_id).declarations().cloned().collect();
        for decl in decls {
            match decl {
                Declaration::Type(type_decl) => {
                    let exported = global && type_decl.access == Access::Public;
                    self.type_index(&type_decl.ty, exported)?;
                }
                Declaration::Functions(group) => {
                    self.register_function_group(&group, None, scope_id)?;
                }
                Declaration::Variable(var) if global => {
                    self.register_global_element(&var, scope_id)?;
                }
                Declaration::Namespace { scope, .. } => {
                    self.scan_scope(scope, global)?;
                }
                // Templates export through their instantiations; using
                // aliases re-export something already registered from its
                // own scope.
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// The database index for a type, registering it (and everything it
    /// wraps) on first sight.
    fn type_index(&mut self, ty: &Arc<CppType>, global: bool) -> Result<TypeIndex, DbError> {
        let true_name = ty.scoped_name(self.arena);
        if let Some(&index) = self.types_seen.get(&true_name) {
            if global {
                // Promote to global visibility via the merge path.
                let mut promote = TypeRecord {
                    flags: TypeRecord::F_GLOBAL,
                    ..TypeRecord::default()
                };
                promote.true_name = true_name;
                self.db.add_type(index, promote)?;
            }
            return Ok(index);
        }

        let index = TypeIndex(self.db.get_next_index());
        self.types_seen.insert(true_name.clone(), index);

        let mut record = TypeRecord {
            name: ty.simple_name(),
            scoped_name: true_name.clone(),
            true_name,
            ..TypeRecord::default()
        };
        if global {
            record.flags |= TypeRecord::F_GLOBAL;
        }

        match &**ty {
            CppType::Simple(simple) => {
                record.flags |= TypeRecord::F_ATOMIC | TypeRecord::F_FULLY_DEFINED;
                record.atomic_kind = atomic_kind_for(simple.kind, simple.flags);
            }
            CppType::Pointer(inner) | CppType::Reference(inner) => {
                record.flags |= TypeRecord::F_POINTER | TypeRecord::F_FULLY_DEFINED;
                record.wrapped_type = self.type_index(inner, false)?;
            }
            CppType::Const(inner) => {
                record.flags |= TypeRecord::F_CONST | TypeRecord::F_FULLY_DEFINED;
                record.wrapped_type = self.type_index(inner, false)?;
            }
            CppType::Array { element, .. } => {
                record.flags |= TypeRecord::F_FULLY_DEFINED;
                record.wrapped_type = self.type_index(element, false)?;
            }
            CppType::Enum(enum_type) => {
                record.flags |= TypeRecord::F_ENUM | TypeRecord::F_FULLY_DEFINED;
                for value in &enum_type.values {
                    let scoped_name = match enum_type.declared_in {
                        Some(scope) => self.arena.qualify(scope, &value.name),
                        None => value.name.clone(),
                    };
                    record.enum_values.push(EnumValueRecord {
                        name: value.name.clone(),
                        scoped_name,
                        value: value.value,
                    });
                }
            }
            CppType::Struct(struct_type) => {
                self.fill_struct_record(&mut record, ty, struct_type, index)?;
            }
            CppType::Function(_) => {
                record.flags |= TypeRecord::F_FULLY_DEFINED;
            }
            CppType::Extension(ext) => {
                record.flags |= TypeRecord::F_FULLY_DEFINED;
                if ext.text == "string" {
                    record.flags |= TypeRecord::F_ATOMIC;
                    record.atomic_kind = AtomicKind::String;
                }
            }
            // Unresolved: record a forward reference, not fully defined.
            CppType::Tbd(_) => {}
        }

        self.db.add_type(index, record)?;
        Ok(index)
    }

    fn fill_struct_record(
        &mut self,
        record: &mut TypeRecord,
        class_ty: &Arc<CppType>,
        struct_type: &StructType,
        class_index: TypeIndex,
    ) -> Result<(), DbError> {
        record.flags |= match struct_type.kind {
            crate::ast::ty::StructKind::Class => TypeRecord::F_CLASS,
            crate::ast::ty::StructKind::Struct => TypeRecord::F_STRUCT,
            crate::ast::ty::StructKind::Union => TypeRecord::F_UNION,
        };

        for base in &struct_type.bases {
            if base.access == Access::Public {
                let base_index = self.type_index(&base.base, false)?;
                record.derivations.push(base_index);
            }
        }

        let Some(member_scope) = struct_type.scope else {
            // Forward reference; fully-defined stays unset.
            return Ok(());
        };
        record.flags |= TypeRecord::F_FULLY_DEFINED;

        let members: Vec<Declaration> = self
            .arena
            .scope(member_scope)
            .declarations()
            .cloned()
            .collect();

        // Methods first, so element getter/setter association can see
        // them.
        let mut method_indices: HashMap<String, FunctionIndex> = HashMap::new();
        for member in &members {
            let Declaration::Functions(group) = member else {
                continue;
            };
            let public: Vec<FunctionDecl> = group
                .overloads
                .iter()
                .filter(|f| f.access == Access::Public)
                .cloned()
                .collect();
            if public.is_empty() {
                continue;
            }
            let public_group = FunctionGroup {
                name: group.name.clone(),
                overloads: public,
            };
            let fn_index = self.register_function_group(
                &public_group,
                Some((class_index, class_ty.clone())),
                member_scope,
            )?;

            let representative = &public_group.overloads[0];
            if representative.is_constructor() {
                record.constructors.push(fn_index);
            } else if representative.is_destructor() {
                record.destructor = fn_index;
            } else {
                record.methods.push(fn_index);
                method_indices.insert(public_group.name.clone(), fn_index);
            }
        }

        for member in &members {
            match member {
                Declaration::Variable(var) if var.access == Access::Public => {
                    let element_index =
                        self.register_member_element(var, member_scope, &method_indices)?;
                    record.elements.push(element_index);
                }
                Declaration::Type(nested) => {
                    let nested_index = self.type_index(&nested.ty, false)?;
                    self.db.update_type(nested_index).flags |= TypeRecord::F_NESTED;
                    self.db.update_type(nested_index).outer_type = class_index;
                    record.nested_types.push(nested_index);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // Functions and wrappers
    // ========================================================================

    /// Register one function record with one wrapper per overload.
    fn register_function_group(
        &mut self,
        group: &FunctionGroup,
        class: Option<(TypeIndex, Arc<CppType>)>,
        scope: ScopeId,
    ) -> Result<FunctionIndex, DbError> {
        let fn_index = FunctionIndex(self.db.get_next_index());
        let scoped_name = self.arena.qualify(scope, &group.name);

        let mut record = FunctionRecord {
            name: group.name.clone(),
            scoped_name: scoped_name.clone(),
            class_type: class.as_ref().map(|(i, _)| *i).unwrap_or_default(),
            ..FunctionRecord::default()
        };
        record.flags |= match class {
            Some(_) => FunctionRecord::F_METHOD,
            None => FunctionRecord::F_GLOBAL,
        };

        for overload in &group.overloads {
            let wrapper_index =
                self.register_wrapper(overload, fn_index, class.as_ref(), &scoped_name)?;
            record.wrappers.push(wrapper_index);
        }

        self.db.add_function(fn_index, record)?;
        Ok(fn_index)
    }

    fn register_wrapper(
        &mut self,
        decl: &FunctionDecl,
        fn_index: FunctionIndex,
        class: Option<&(TypeIndex, Arc<CppType>)>,
        scoped_name: &str,
    ) -> Result<WrapperIndex, DbError> {
        let wrapper_index = WrapperIndex(self.db.get_next_index());
        let mut wrapper = WrapperRecord {
            function: fn_index,
            flags: WrapperRecord::F_CALLABLE_BY_NAME,
            ..WrapperRecord::default()
        };

        // Synthesized `this` comes first for non-static methods.
        if let Some((_, class_ty)) = class {
            let needs_this =
                !decl.is_static() && !decl.is_constructor() && !decl.is_destructor();
            if needs_this {
                let remap = ParameterRemap::synthesized_this(
                    class_ty.clone(),
                    decl.signature.is_const_method(),
                );
                let type_index = self.type_index(&remap.new_type, false)?;
                wrapper.parameters.push(WrapperParameter {
                    flags: WrapperParameter::PF_IS_THIS,
                    param_type: type_index,
                    name: String::new(),
                });
            }
        }

        for param in &decl.signature.params {
            let ctx = RemapContext {
                arena: self.arena,
                is_return: false,
            };
            let remap = self.registry.remap(&param.ty, &ctx);
            let type_index = self.type_index(&remap.new_type, false)?;
            let mut flags = 0;
            if param.name.is_some() {
                flags |= WrapperParameter::PF_HAS_NAME;
            }
            wrapper.parameters.push(WrapperParameter {
                flags,
                param_type: type_index,
                name: param.name.clone().unwrap_or_default(),
            });
        }

        // Return value.
        let return_type: Arc<CppType> = if decl.is_constructor() {
            match class {
                Some((_, class_ty)) => CppType::pointer_to(class_ty.clone()),
                None => CppType::simple(SimpleKind::Void),
            }
        } else {
            decl.signature.return_type.clone()
        };
        let returns_void = matches!(
            return_type.peel_const().0,
            CppType::Simple(simple) if simple.kind == SimpleKind::Void
        );
        if !returns_void {
            let ctx = RemapContext {
                arena: self.arena,
                is_return: true,
            };
            let remap = self.registry.remap(&return_type, &ctx);
            let return_index = self.type_index(&remap.new_type, false)?;
            wrapper.flags |= WrapperRecord::F_HAS_RETURN;
            wrapper.return_type = return_index;

            // A by-value class return (or a constructed instance) is the
            // caller's to free.
            let caller_manages = decl.is_constructor()
                || matches!(remap.new_type.peel_const().0, CppType::Struct(_));
            if caller_manages {
                wrapper.flags |= WrapperRecord::F_CALLER_MANAGES;
                let class_record_index = match remap.new_type.peel_const().0 {
                    CppType::Struct(_) => return_index,
                    _ => class.map(|(i, _)| *i).unwrap_or_default(),
                };
                wrapper.return_value_destructor =
                    self.db.get_type(class_record_index).destructor;
            }
        }

        // The globally unique lookup name: 4-character library hash, then
        // the per-wrapper hash.
        let mut signature_text = String::from(scoped_name);
        for param in &wrapper.parameters {
            signature_text.push(';');
            signature_text.push_str(&param.param_type.raw().to_string());
        }
        if decl.signature.is_const_method() {
            signature_text.push_str(";const");
        }
        wrapper.unique_name = format!(
            "{}{}",
            self.library_hash,
            hash_string(&signature_text, 10)
        );

        self.db.add_wrapper(wrapper_index, wrapper)?;
        Ok(wrapper_index)
    }

    // ========================================================================
    // Elements and manifests
    // ========================================================================

    fn register_member_element(
        &mut self,
        var: &InstanceDecl,
        scope: ScopeId,
        method_indices: &HashMap<String, FunctionIndex>,
    ) -> Result<ElementIndex, DbError> {
        let element_index = ElementIndex(self.db.get_next_index());
        let type_index = self.type_index(&var.ty, false)?;

        let mut record = ElementRecord {
            name: var.name.clone(),
            scoped_name: self.arena.qualify(scope, &var.name),
            element_type: type_index,
            ..ElementRecord::default()
        };
        if let Some(&getter) = method_indices.get(&format!("get_{}", var.name)) {
            record.flags |= ElementRecord::F_HAS_GETTER;
            record.getter = getter;
        }
        if let Some(&setter) = method_indices.get(&format!("set_{}", var.name)) {
            record.flags |= ElementRecord::F_HAS_SETTER;
            record.setter = setter;
        }

        self.db.add_element(element_index, record)?;
        Ok(element_index)
    }

    fn register_global_element(
        &mut self,
        var: &InstanceDecl,
        scope: ScopeId,
    ) -> Result<(), DbError> {
        let element_index = ElementIndex(self.db.get_next_index());
        let type_index = self.type_index(&var.ty, false)?;
        let record = ElementRecord {
            flags: ElementRecord::F_GLOBAL,
            name: var.name.clone(),
            scoped_name: self.arena.qualify(scope, &var.name),
            element_type: type_index,
            ..ElementRecord::default()
        };
        self.db.add_element(element_index, record)?;
        Ok(())
    }

    /// Every object-like macro becomes a manifest record; those whose
    /// bodies evaluate to an integer constant store the value inline.
    fn register_manifests(&mut self, parser: &Parser) -> Result<(), DbError> {
        let mut macros: Vec<_> = parser.preprocessor().macros().values().collect();
        macros.sort_by(|a, b| a.name.cmp(&b.name));

        for def in macros {
            if def.params.is_some() || def.body.is_empty() {
                continue;
            }
            let mut record = ManifestRecord {
                name: def.name.clone(),
                definition: def.definition_text(),
                ..ManifestRecord::default()
            };
            let int_value = crate::ast::expr::parse_expression(&def.body)
                .ok()
                .and_then(|e| e.evaluate_constant().ok())
                .and_then(|v| v.as_int());
            if let Some(value) = int_value {
                record.flags |= ManifestRecord::F_HAS_INT_VALUE | ManifestRecord::F_HAS_TYPE;
                record.int_value = value;
                record.manifest_type =
                    self.type_index(&CppType::simple(SimpleKind::Int), false)?;
            }
            let index = ManifestIndex(self.db.get_next_index());
            self.db.add_manifest(index, record)?;
        }
        Ok(())
    }
}

fn atomic_kind_for(kind: SimpleKind, flags: u32) -> AtomicKind {
    use crate::ast::ty::SimpleType;
    match kind {
        SimpleKind::Void => AtomicKind::Void,
        SimpleKind::Bool => AtomicKind::Bool,
        SimpleKind::Char | SimpleKind::WChar => AtomicKind::Char,
        SimpleKind::Int => {
            if (flags & SimpleType::F_LONGLONG) != 0 {
                AtomicKind::LongLong
            } else {
                AtomicKind::Int
            }
        }
        SimpleKind::Float => AtomicKind::Float,
        SimpleKind::Double => AtomicKind::Double,
    }
}

/// A stable lowercase-hex hash prefix of the given length.
fn hash_string(input: &str, length: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(length);
    encoded
}
