//! The scope model: a tree of nested namespaces/classes/templates with
//! name lookup and template substitution.
//!
//! Scopes live in an arena and refer to each other by [`ScopeId`] handle —
//! parent links, using lists, and the member scopes of struct types are all
//! indices, so the natural parent/child reference cycles of C++ scoping
//! need no shared-ownership pointers at all. Scopes are created as the
//! parser opens `{` constructs and persist for the life of the arena, since
//! later declarations may reference earlier-defined nested types.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::decl::{Declaration, FunctionGroup};
use crate::ast::ty::{CppType, QualifiedName};

/// Handle to a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// What kind of construct introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Namespace,
    Class,
    Template,
    Local,
}

/// Lookup and declaration failures.
///
/// These are diagnostics, not fatal conditions: a duplicate declaration is
/// reported and the later declaration wins; an ambiguous name is reported
/// and treated as not found.
#[derive(Debug, Error, PartialEq)]
pub enum ScopeError {
    #[error("ambiguous name '{name}': visible through multiple using directives")]
    AmbiguousName { name: String },
    #[error("duplicate declaration of '{name}'")]
    DuplicateName { name: String },
}

/// One scope: an ordered mapping of names to declarations.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// Insertion order; re-emission and the database builder walk this.
    order: Vec<String>,
    decls: HashMap<String, Declaration>,
    /// Scopes named by `using namespace`, searched after local names.
    pub using: Vec<ScopeId>,
}

impl Scope {
    fn new(name: String, kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Scope {
            name,
            kind,
            parent,
            order: Vec::new(),
            decls: HashMap::new(),
            using: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.decls.get(name)
    }

    /// Declarations in insertion order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.order.iter().filter_map(|name| self.decls.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Arena owning every scope; the root global scope is always id 0.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    /// Template instantiation cache: (member scope, argument key) → the
    /// substituted scope. Makes substitution idempotent and breaks
    /// self-referential instantiation loops.
    instantiations: HashMap<(u32, String), ScopeId>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        ScopeArena::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena {
            scopes: vec![Scope::new(String::new(), ScopeKind::Global, None)],
            instantiations: HashMap::new(),
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn create_scope(
        &mut self,
        name: impl Into<String>,
        kind: ScopeKind,
        parent: ScopeId,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(name.into(), kind, Some(parent)));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// Total number of scopes ever created; ids are dense from 0.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Overwrite a name's declaration in place, preserving declaration
    /// order. Used by post-parse resolution, which rewrites declarations
    /// it has already vetted.
    pub fn replace(&mut self, id: ScopeId, decl: Declaration) {
        let name = decl.name().to_string();
        let scope = self.scope_mut(id);
        if !scope.decls.contains_key(&name) {
            scope.order.push(name.clone());
        }
        scope.decls.insert(name, decl);
    }

    pub fn add_using(&mut self, scope: ScopeId, target: ScopeId) {
        let scope = self.scope_mut(scope);
        if !scope.using.contains(&target) {
            scope.using.push(target);
        }
    }

    /// Insert a declaration into a scope.
    ///
    /// Function declarations sharing a name merge into one overload group.
    /// A forward reference being filled in by (or after) its complete
    /// definition is silent. A genuine redefinition conflict returns
    /// `DuplicateName` — the caller surfaces the diagnostic, and the later
    /// declaration wins.
    pub fn declare(&mut self, id: ScopeId, decl: Declaration) -> Result<(), ScopeError> {
        use std::collections::hash_map::Entry;

        let name = decl.name().to_string();
        let scope = self.scope_mut(id);

        match scope.decls.entry(name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(decl);
                scope.order.push(name);
                Ok(())
            }
            Entry::Occupied(mut entry) => match (entry.get_mut(), decl) {
                // Another overload of a known function name.
                (Declaration::Functions(group), Declaration::Functions(new_group)) => {
                    for overload in new_group.overloads {
                        let already_known = group
                            .overloads
                            .iter()
                            .any(|f| signatures_match(f, &overload));
                        if !already_known {
                            group.overloads.push(overload);
                        }
                    }
                    Ok(())
                }
                // A forward reference being completed.
                (Declaration::Type(old), Declaration::Type(new)) => {
                    let old_complete = is_complete_type(&old.ty);
                    let new_complete = is_complete_type(&new.ty);
                    if !old_complete {
                        *old = new;
                        Ok(())
                    } else if !new_complete {
                        // Forward declaration after the definition; keep
                        // the definition.
                        Ok(())
                    } else {
                        *old = new;
                        Err(ScopeError::DuplicateName { name })
                    }
                }
                (slot, new) => {
                    *slot = new;
                    Err(ScopeError::DuplicateName { name })
                }
            },
        }
    }

    /// Look up an unqualified name in one scope only.
    pub fn local_lookup(&self, id: ScopeId, name: &str) -> Option<&Declaration> {
        self.scope(id).get(name)
    }

    /// Look up an unqualified name: current scope, then its using scopes,
    /// then the parent, repeating to the root. First match wins; a name
    /// visible through two using scopes at the same depth is ambiguous.
    pub fn lookup(
        &self,
        start: ScopeId,
        name: &str,
    ) -> Result<Option<&Declaration>, ScopeError> {
        let mut current = Some(start);
        while let Some(id) = current {
            if let Some(decl) = self.local_lookup(id, name) {
                return Ok(Some(decl));
            }
            let scope = self.scope(id);
            let mut hit = None;
            for &using in &scope.using {
                if let Some(decl) = self.local_lookup(using, name) {
                    if hit.is_some() {
                        return Err(ScopeError::AmbiguousName {
                            name: name.to_string(),
                        });
                    }
                    hit = Some(decl);
                }
            }
            if let Some(decl) = hit {
                return Ok(Some(decl));
            }
            current = scope.parent;
        }
        Ok(None)
    }

    /// Look up a possibly-qualified name starting from `start`.
    pub fn lookup_qualified(
        &self,
        start: ScopeId,
        name: &QualifiedName,
    ) -> Result<Option<&Declaration>, ScopeError> {
        let (first, rest) = match name.components.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };

        let mut decl = if name.is_global {
            self.local_lookup(self.global(), first)
        } else {
            self.lookup(start, first)?
        };

        for component in rest {
            let Some(found) = decl else { return Ok(None) };
            let Some(inner_scope) = self.scope_of(found) else {
                return Ok(None);
            };
            decl = self.local_lookup(inner_scope, component);
        }
        Ok(decl)
    }

    /// The member scope a declaration opens, if any: a namespace's scope or
    /// a defined struct's member scope.
    pub fn scope_of(&self, decl: &Declaration) -> Option<ScopeId> {
        match decl {
            Declaration::Namespace { scope, .. } => Some(*scope),
            Declaration::Type(d) => match &*d.ty {
                CppType::Struct(s) => s.scope,
                _ => None,
            },
            Declaration::Template(t) => t.scope,
            Declaration::UsingAlias { target, .. } => self.scope_of(target),
            _ => None,
        }
    }

    /// Resolve a qualified name to the type it denotes, if it denotes one.
    /// Ambiguity degrades to "not found" here; the parser reports ambiguity
    /// where the name was written.
    pub fn lookup_type(&self, start: ScopeId, name: &QualifiedName) -> Option<Arc<CppType>> {
        self.lookup_qualified(start, name)
            .ok()
            .flatten()
            .and_then(Declaration::as_type)
    }

    /// The `A::B` prefix naming a scope, empty for the global scope.
    pub fn fully_scoped_name(&self, id: ScopeId) -> String {
        let mut components = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let scope = self.scope(id);
            if !scope.name.is_empty() {
                components.push(scope.name.clone());
            }
            current = scope.parent;
        }
        components.reverse();
        components.join("::")
    }

    /// Qualify `name` with the scope's full path.
    pub fn qualify(&self, id: ScopeId, name: &str) -> String {
        let prefix = self.fully_scoped_name(id);
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", prefix, name)
        }
    }

    /// Produce a structural copy of a template's member scope with every
    /// TBD type bound to a template parameter replaced by its argument.
    ///
    /// The source scope is never modified, and the same (scope, arguments)
    /// pair always returns the same copy, so substitution is idempotent.
    pub fn substitute_scope(
        &mut self,
        src: ScopeId,
        subst: &HashMap<String, Arc<CppType>>,
        new_name: &str,
    ) -> ScopeId {
        let key = (src.0, substitution_key(subst));
        if let Some(&cached) = self.instantiations.get(&key) {
            return cached;
        }

        let source = self.scope(src).clone();
        let new_id = self.create_scope(new_name, source.kind, source.parent.unwrap_or(ScopeId(0)));
        // Reserve the cache slot before filling the scope, so a
        // self-referential member type terminates on the cache instead of
        // recursing.
        self.instantiations.insert(key, new_id);

        for name in &source.order {
            if let Some(decl) = source.decls.get(name) {
                let substituted = decl.substitute(subst);
                // Substitution output never conflicts; the source scope was
                // already consistent.
                let _ = self.declare(new_id, substituted);
            }
        }
        self.scope_mut(new_id).using = source.using.clone();
        new_id
    }
}

/// Two function declarations with equivalent parameter lists are the same
/// overload seen twice, not a new overload.
fn signatures_match(
    a: &crate::ast::decl::FunctionDecl,
    b: &crate::ast::decl::FunctionDecl,
) -> bool {
    a.signature.flags == b.signature.flags
        && a.signature.params.len() == b.signature.params.len()
        && a.signature
            .params
            .iter()
            .zip(&b.signature.params)
            .all(|(p, q)| p.ty.is_equivalent(&q.ty))
}

fn is_complete_type(ty: &CppType) -> bool {
    match ty {
        CppType::Struct(s) => !s.is_incomplete(),
        _ => true,
    }
}

/// A canonical string key for a substitution map.
fn substitution_key(subst: &HashMap<String, Arc<CppType>>) -> String {
    let mut pairs: Vec<(&String, String)> = subst
        .iter()
        .map(|(name, ty)| (name, ty.simple_name()))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(name, ty)| format!("{}={}", name, ty))
        .collect::<Vec<_>>()
        .join(",")
}

/// Convenience for building an overload group of one.
pub fn function_group(decl: crate::ast::decl::FunctionDecl) -> Declaration {
    Declaration::Functions(FunctionGroup {
        name: decl.name.clone(),
        overloads: vec![decl],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::decl::{TypeDecl, TypedefDecl};
    use crate::ast::ty::{Access, SimpleKind, StructKind, StructType, TbdType};
    use crate::token::SourceLoc;

    fn typedef(name: &str, ty: Arc<CppType>) -> Declaration {
        Declaration::Typedef(TypedefDecl {
            name: name.to_string(),
            ty,
            access: Access::Public,
            comment: None,
            loc: SourceLoc::internal(),
        })
    }

    fn struct_decl(name: &str, scope: Option<ScopeId>, declared_in: ScopeId) -> Declaration {
        Declaration::Type(TypeDecl {
            name: name.to_string(),
            ty: Arc::new(CppType::Struct(StructType {
                kind: StructKind::Class,
                name: name.to_string(),
                declared_in: Some(declared_in),
                scope,
                bases: Vec::new(),
            })),
            access: Access::Public,
            comment: None,
            loc: SourceLoc::internal(),
        })
    }

    #[test]
    fn lookup_walks_to_parent() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        arena
            .declare(global, typedef("byte", CppType::simple(SimpleKind::Char)))
            .unwrap();
        let inner = arena.create_scope("Inner", ScopeKind::Class, global);

        let found = arena.lookup(inner, "byte").unwrap();
        assert!(found.is_some());
        assert!(arena.lookup(inner, "missing").unwrap().is_none());
    }

    #[test]
    fn shadowing_prefers_the_nearest_scope() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let inner = arena.create_scope("Inner", ScopeKind::Class, global);
        arena
            .declare(global, typedef("t", CppType::simple(SimpleKind::Int)))
            .unwrap();
        arena
            .declare(inner, typedef("t", CppType::simple(SimpleKind::Char)))
            .unwrap();

        let found = arena.lookup(inner, "t").unwrap().unwrap();
        let ty = found.as_type().unwrap();
        assert!(ty.is_equivalent(&CppType::simple(SimpleKind::Char)));
    }

    #[test]
    fn same_depth_using_collision_is_ambiguous() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let ns_a = arena.create_scope("A", ScopeKind::Namespace, global);
        let ns_b = arena.create_scope("B", ScopeKind::Namespace, global);
        arena
            .declare(ns_a, typedef("t", CppType::simple(SimpleKind::Int)))
            .unwrap();
        arena
            .declare(ns_b, typedef("t", CppType::simple(SimpleKind::Char)))
            .unwrap();

        let user = arena.create_scope("user", ScopeKind::Namespace, global);
        arena.add_using(user, ns_a);
        arena.add_using(user, ns_b);

        assert_eq!(
            arena.lookup(user, "t"),
            Err(ScopeError::AmbiguousName {
                name: "t".to_string()
            })
        );
        // A single-source name is fine.
        arena
            .declare(ns_a, typedef("only_a", CppType::simple(SimpleKind::Int)))
            .unwrap();
        assert!(arena.lookup(user, "only_a").unwrap().is_some());
    }

    #[test]
    fn forward_reference_fill_in_is_not_a_duplicate() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        arena.declare(global, struct_decl("Foo", None, global)).unwrap();

        let members = arena.create_scope("Foo", ScopeKind::Class, global);
        // Completing the forward reference is fine.
        arena
            .declare(global, struct_decl("Foo", Some(members), global))
            .unwrap();
        // Redefining the complete type is a conflict; later wins.
        let members2 = arena.create_scope("Foo", ScopeKind::Class, global);
        let err = arena
            .declare(global, struct_decl("Foo", Some(members2), global))
            .unwrap_err();
        assert_eq!(
            err,
            ScopeError::DuplicateName {
                name: "Foo".to_string()
            }
        );
    }

    #[test]
    fn qualified_lookup_descends_scopes() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let ns = arena.create_scope("outer", ScopeKind::Namespace, global);
        arena
            .declare(
                global,
                Declaration::Namespace {
                    name: "outer".to_string(),
                    scope: ns,
                },
            )
            .unwrap();
        arena
            .declare(ns, typedef("size_type", CppType::simple(SimpleKind::Int)))
            .unwrap();

        let qn = QualifiedName {
            is_global: false,
            components: vec!["outer".to_string(), "size_type".to_string()],
        };
        let found = arena.lookup_qualified(global, &qn).unwrap();
        assert!(found.is_some());
        assert_eq!(arena.qualify(ns, "size_type"), "outer::size_type");
    }

    #[test]
    fn substitution_copies_without_mutating_the_template() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let members = arena.create_scope("Vector", ScopeKind::Class, global);
        let tbd: Arc<CppType> = Arc::new(CppType::Tbd(TbdType {
            name: QualifiedName::simple("T"),
        }));
        arena
            .declare(members, typedef("value_type", tbd.clone()))
            .unwrap();

        let mut subst = HashMap::new();
        subst.insert("T".to_string(), CppType::simple(SimpleKind::Int));
        let instance = arena.substitute_scope(members, &subst, "Vector< int >");

        // The copy is substituted.
        let value_type = arena
            .local_lookup(instance, "value_type")
            .unwrap()
            .as_type()
            .unwrap();
        assert!(value_type.is_equivalent(&CppType::simple(SimpleKind::Int)));

        // The template scope still holds the placeholder.
        let original = arena
            .local_lookup(members, "value_type")
            .unwrap()
            .as_type()
            .unwrap();
        assert!(original.is_tbd());

        // Idempotent: the same arguments return the same scope.
        let again = arena.substitute_scope(members, &subst, "Vector< int >");
        assert_eq!(instance, again);
    }
}
