//! The C++ type model.
//!
//! One closed sum type covers every kind of type the parser can produce;
//! the original design question of "one virtual class per kind" is settled
//! here in favor of exhaustive pattern matching. Types are immutable value
//! nodes shared through `Arc`: resolution and substitution return a new
//! node when anything changed and hand back the same `Arc` otherwise, so a
//! type published into a scope is never edited behind its back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::expr::Expression;
use crate::scope::{ScopeArena, ScopeId};

/// A failure during type resolution.
#[derive(Debug, Error, PartialEq)]
pub enum TypeError {
    /// A to-be-determined type depends on itself through a chain of
    /// typedefs or template parameters.
    #[error("cyclic template dependency on '{name}'")]
    CyclicTemplate { name: String },
}

/// A possibly-qualified name, e.g. `Foo::Bar::baz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    /// True if written with a leading `::`.
    pub is_global: bool,
    pub components: Vec<String>,
}

impl QualifiedName {
    pub fn simple(name: impl Into<String>) -> Self {
        QualifiedName {
            is_global: false,
            components: vec![name.into()],
        }
    }

    /// The unqualified trailing component.
    pub fn last(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// True for a single unqualified component.
    pub fn is_simple(&self) -> bool {
        !self.is_global && self.components.len() == 1
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global {
            write!(f, "::")?;
        }
        write!(f, "{}", self.components.join("::"))
    }
}

/// Builtin scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleKind {
    Void,
    Bool,
    Char,
    WChar,
    Int,
    Float,
    Double,
}

/// A builtin type plus its sign/length modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleType {
    pub kind: SimpleKind,
    pub flags: u32,
}

impl SimpleType {
    pub const F_UNSIGNED: u32 = 0x0001;
    pub const F_SIGNED: u32 = 0x0002;
    pub const F_LONG: u32 = 0x0004;
    pub const F_LONGLONG: u32 = 0x0008;
    pub const F_SHORT: u32 = 0x0010;

    pub fn plain(kind: SimpleKind) -> Self {
        SimpleType { kind, flags: 0 }
    }

    pub fn is_unsigned(&self) -> bool {
        (self.flags & Self::F_UNSIGNED) != 0
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.flags & Self::F_UNSIGNED) != 0 {
            write!(f, "unsigned ")?;
        } else if (self.flags & Self::F_SIGNED) != 0 {
            write!(f, "signed ")?;
        }
        if (self.flags & Self::F_SHORT) != 0 {
            write!(f, "short ")?;
        } else if (self.flags & Self::F_LONGLONG) != 0 {
            write!(f, "long long ")?;
        } else if (self.flags & Self::F_LONG) != 0 {
            write!(f, "long ")?;
        }
        let name = match self.kind {
            SimpleKind::Void => "void",
            SimpleKind::Bool => "bool",
            SimpleKind::Char => "char",
            SimpleKind::WChar => "wchar_t",
            SimpleKind::Int => "int",
            SimpleKind::Float => "float",
            SimpleKind::Double => "double",
        };
        write!(f, "{}", name)
    }
}

/// `class` / `struct` / `union`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Class,
    Struct,
    Union,
}

impl StructKind {
    pub fn keyword(self) -> &'static str {
        match self {
            StructKind::Class => "class",
            StructKind::Struct => "struct",
            StructKind::Union => "union",
        }
    }
}

/// Base-class access, also used for member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    Private,
}

/// One base class of a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseClass {
    pub base: Arc<CppType>,
    pub access: Access,
}

/// A class, struct, or union.
///
/// The member scope is an arena handle, not an owning pointer; a forward
/// declaration has no member scope yet.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub kind: StructKind,
    pub name: String,
    /// Lexical scope this type was declared in (for scoped names).
    pub declared_in: Option<ScopeId>,
    /// Member scope; `None` while only forward-declared.
    pub scope: Option<ScopeId>,
    pub bases: Vec<BaseClass>,
}

impl StructType {
    pub fn is_incomplete(&self) -> bool {
        self.scope.is_none()
    }
}

/// One named enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// An enumerated type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub declared_in: Option<ScopeId>,
    pub values: Vec<EnumValue>,
}

/// One parameter of a function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Option<String>,
    pub ty: Arc<CppType>,
    pub default: Option<Expression>,
}

/// A function signature: return type, parameters, method qualifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub return_type: Arc<CppType>,
    pub params: Vec<Parameter>,
    pub flags: u32,
}

impl FunctionSignature {
    /// Declared `const` (method reads but does not mutate its object).
    pub const F_CONST_METHOD: u32 = 0x0001;
    pub const F_VARIADIC: u32 = 0x0002;

    pub fn is_const_method(&self) -> bool {
        (self.flags & Self::F_CONST_METHOD) != 0
    }
}

/// A type whose concrete identity is still to be determined: a name
/// referenced before its definition, typically through a template
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TbdType {
    pub name: QualifiedName,
}

/// A compiler-specific extension type we recognize but do not model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionType {
    pub keyword: String,
    pub text: String,
}

/// The closed set of type variants.
#[derive(Debug, Clone, PartialEq)]
pub enum CppType {
    Simple(SimpleType),
    Pointer(Arc<CppType>),
    Reference(Arc<CppType>),
    Array {
        element: Arc<CppType>,
        bound: Option<Expression>,
    },
    Const(Arc<CppType>),
    Struct(StructType),
    Enum(EnumType),
    Function(FunctionSignature),
    Tbd(TbdType),
    Extension(ExtensionType),
}

impl CppType {
    pub fn pointer_to(inner: Arc<CppType>) -> Arc<CppType> {
        Arc::new(CppType::Pointer(inner))
    }

    pub fn reference_to(inner: Arc<CppType>) -> Arc<CppType> {
        Arc::new(CppType::Reference(inner))
    }

    pub fn const_of(inner: Arc<CppType>) -> Arc<CppType> {
        // Collapse duplicate const wrappers on the way in.
        if matches!(&*inner, CppType::Const(_)) {
            return inner;
        }
        Arc::new(CppType::Const(inner))
    }

    pub fn simple(kind: SimpleKind) -> Arc<CppType> {
        Arc::new(CppType::Simple(SimpleType::plain(kind)))
    }

    /// True if no to-be-determined placeholder appears anywhere in the
    /// structure.
    pub fn is_fully_specified(&self) -> bool {
        match self {
            CppType::Simple(_) | CppType::Enum(_) | CppType::Extension(_) => true,
            CppType::Pointer(inner) | CppType::Reference(inner) | CppType::Const(inner) => {
                inner.is_fully_specified()
            }
            CppType::Array { element, .. } => element.is_fully_specified(),
            CppType::Struct(s) => s.bases.iter().all(|b| b.base.is_fully_specified()),
            CppType::Function(sig) => {
                sig.return_type.is_fully_specified()
                    && sig.params.iter().all(|p| p.ty.is_fully_specified())
            }
            CppType::Tbd(_) => false,
        }
    }

    /// True if this type is, or wraps, a TBD placeholder.
    pub fn is_tbd(&self) -> bool {
        !self.is_fully_specified()
    }

    /// Strip const qualification wherever it sits, returning the bare type
    /// and whether any const was present.
    pub fn peel_const(&self) -> (&CppType, bool) {
        let mut ty = self;
        let mut was_const = false;
        while let CppType::Const(inner) = ty {
            was_const = true;
            ty = inner;
        }
        (ty, was_const)
    }


    /// Structural equivalence, independent of cv-qualification placement:
    /// `const X` and `X const` compare equal, as do references to either.
    pub fn is_equivalent(&self, other: &CppType) -> bool {
        let (a, a_const) = self.peel_const();
        let (b, b_const) = other.peel_const();
        if a_const != b_const {
            return false;
        }
        match (a, b) {
            (CppType::Simple(x), CppType::Simple(y)) => x == y,
            (CppType::Pointer(x), CppType::Pointer(y))
            | (CppType::Reference(x), CppType::Reference(y)) => x.is_equivalent(y),
            (
                CppType::Array {
                    element: xe,
                    bound: xb,
                },
                CppType::Array {
                    element: ye,
                    bound: yb,
                },
            ) => {
                if !xe.is_equivalent(ye) {
                    return false;
                }
                match (xb, yb) {
                    (None, None) => true,
                    (Some(xb), Some(yb)) => {
                        match (xb.evaluate_constant(), yb.evaluate_constant()) {
                            (Ok(x), Ok(y)) => x == y,
                            _ => xb == yb,
                        }
                    }
                    _ => false,
                }
            }
            (CppType::Struct(x), CppType::Struct(y)) => {
                x.name == y.name && x.declared_in == y.declared_in
            }
            (CppType::Enum(x), CppType::Enum(y)) => {
                x.name == y.name && x.declared_in == y.declared_in
            }
            (CppType::Function(x), CppType::Function(y)) => {
                x.flags == y.flags
                    && x.return_type.is_equivalent(&y.return_type)
                    && x.params.len() == y.params.len()
                    && x.params
                        .iter()
                        .zip(&y.params)
                        .all(|(p, q)| p.ty.is_equivalent(&q.ty))
            }
            (CppType::Tbd(x), CppType::Tbd(y)) => x.name == y.name,
            (CppType::Extension(x), CppType::Extension(y)) => x == y,
            _ => false,
        }
    }


    /// The unqualified display name of this type.
    pub fn simple_name(&self) -> String {
        match self {
            CppType::Simple(s) => s.to_string(),
            CppType::Pointer(inner) => format!("{} *", inner.simple_name()),
            CppType::Reference(inner) => format!("{} &", inner.simple_name()),
            CppType::Const(inner) => format!("const {}", inner.simple_name()),
            CppType::Array { element, .. } => format!("{} []", element.simple_name()),
            CppType::Struct(s) => s.name.clone(),
            CppType::Enum(e) => e.name.clone(),
            CppType::Function(sig) => {
                let params: Vec<String> =
                    sig.params.iter().map(|p| p.ty.simple_name()).collect();
                format!("{} ({})", sig.return_type.simple_name(), params.join(", "))
            }
            CppType::Tbd(tbd) => tbd.name.to_string(),
            CppType::Extension(e) => e.text.clone(),
        }
    }

    /// The fully scoped re-emission of this type, used as the canonical
    /// "true name" for database deduplication. Const is always emitted in
    /// prefix position so both `const X` spellings canonicalize the same.
    pub fn scoped_name(&self, arena: &ScopeArena) -> String {
        match self {
            CppType::Simple(s) => s.to_string(),
            CppType::Pointer(inner) => format!("{} *", inner.scoped_name(arena)),
            CppType::Reference(inner) => format!("{} &", inner.scoped_name(arena)),
            CppType::Const(inner) => format!("const {}", inner.scoped_name(arena)),
            CppType::Array { element, .. } => format!("{} []", element.scoped_name(arena)),
            CppType::Struct(s) => match s.declared_in {
                Some(scope) => arena.qualify(scope, &s.name),
                None => s.name.clone(),
            },
            CppType::Enum(e) => match e.declared_in {
                Some(scope) => arena.qualify(scope, &e.name),
                None => e.name.clone(),
            },
            CppType::Function(sig) => {
                let params: Vec<String> =
                    sig.params.iter().map(|p| p.ty.scoped_name(arena)).collect();
                format!(
                    "{} ({})",
                    sig.return_type.scoped_name(arena),
                    params.join(", ")
                )
            }
            CppType::Tbd(tbd) => tbd.name.to_string(),
            CppType::Extension(e) => e.text.clone(),
        }
    }
}

/// The type with a single outer const layer removed, if any.
pub fn unwrap_const(ty: &Arc<CppType>) -> Arc<CppType> {
    match &**ty {
        CppType::Const(inner) => inner.clone(),
        _ => ty.clone(),
    }
}

/// Attempt to replace TBD and forward-declared components of a type with
/// their concrete definitions from the scope model.
///
/// Returns the same node unchanged when already concrete. A TBD chain that
/// reaches itself again fails with [`TypeError::CyclicTemplate`] rather
/// than looping.
pub fn resolve_type(
    ty: &Arc<CppType>,
    arena: &ScopeArena,
    current_scope: ScopeId,
    global_scope: ScopeId,
) -> Result<Arc<CppType>, TypeError> {
    let mut visiting = Vec::new();
    resolve_inner(ty, arena, current_scope, global_scope, &mut visiting)
}

fn resolve_inner(
    ty: &Arc<CppType>,
    arena: &ScopeArena,
    current_scope: ScopeId,
    global_scope: ScopeId,
    visiting: &mut Vec<String>,
) -> Result<Arc<CppType>, TypeError> {
    match &**ty {
        CppType::Tbd(tbd) => {
            let key = tbd.name.to_string();
            if visiting.contains(&key) {
                return Err(TypeError::CyclicTemplate { name: key });
            }
            let Some(found) = arena
                .lookup_type(current_scope, &tbd.name)
                .or_else(|| arena.lookup_type(global_scope, &tbd.name))
            else {
                // Still unknown; leave the placeholder in place.
                return Ok(ty.clone());
            };
            visiting.push(key);
            let resolved = resolve_inner(&found, arena, current_scope, global_scope, visiting)?;
            visiting.pop();
            Ok(resolved)
        }
        CppType::Pointer(inner) => {
            let resolved = resolve_inner(inner, arena, current_scope, global_scope, visiting)?;
            if Arc::ptr_eq(&resolved, inner) {
                Ok(ty.clone())
            } else {
                Ok(Arc::new(CppType::Pointer(resolved)))
            }
        }
        CppType::Reference(inner) => {
            let resolved = resolve_inner(inner, arena, current_scope, global_scope, visiting)?;
            if Arc::ptr_eq(&resolved, inner) {
                Ok(ty.clone())
            } else {
                Ok(Arc::new(CppType::Reference(resolved)))
            }
        }
        CppType::Const(inner) => {
            let resolved = resolve_inner(inner, arena, current_scope, global_scope, visiting)?;
            if Arc::ptr_eq(&resolved, inner) {
                Ok(ty.clone())
            } else {
                Ok(CppType::const_of(resolved))
            }
        }
        CppType::Array { element, bound } => {
            let resolved = resolve_inner(element, arena, current_scope, global_scope, visiting)?;
            if Arc::ptr_eq(&resolved, element) {
                Ok(ty.clone())
            } else {
                Ok(Arc::new(CppType::Array {
                    element: resolved,
                    bound: bound.clone(),
                }))
            }
        }
        CppType::Function(sig) => {
            let return_type =
                resolve_inner(&sig.return_type, arena, current_scope, global_scope, visiting)?;
            let mut changed = !Arc::ptr_eq(&return_type, &sig.return_type);
            let mut params = Vec::with_capacity(sig.params.len());
            for param in &sig.params {
                let resolved =
                    resolve_inner(&param.ty, arena, current_scope, global_scope, visiting)?;
                changed |= !Arc::ptr_eq(&resolved, &param.ty);
                params.push(Parameter {
                    name: param.name.clone(),
                    ty: resolved,
                    default: param.default.clone(),
                });
            }
            if changed {
                Ok(Arc::new(CppType::Function(FunctionSignature {
                    return_type,
                    params,
                    flags: sig.flags,
                })))
            } else {
                Ok(ty.clone())
            }
        }
        _ => Ok(ty.clone()),
    }
}

/// Replace TBD placeholders bound to template parameters with the concrete
/// argument types. Returns a new node only when something changed; the
/// input is never mutated.
pub fn substitute_type(
    ty: &Arc<CppType>,
    subst: &HashMap<String, Arc<CppType>>,
) -> Arc<CppType> {
    match &**ty {
        CppType::Tbd(tbd) if tbd.name.is_simple() => subst
            .get(tbd.name.last())
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        CppType::Pointer(inner) => {
            let new = substitute_type(inner, subst);
            if Arc::ptr_eq(&new, inner) {
                ty.clone()
            } else {
                Arc::new(CppType::Pointer(new))
            }
        }
        CppType::Reference(inner) => {
            let new = substitute_type(inner, subst);
            if Arc::ptr_eq(&new, inner) {
                ty.clone()
            } else {
                Arc::new(CppType::Reference(new))
            }
        }
        CppType::Const(inner) => {
            let new = substitute_type(inner, subst);
            if Arc::ptr_eq(&new, inner) {
                ty.clone()
            } else {
                CppType::const_of(new)
            }
        }
        CppType::Array { element, bound } => {
            let new = substitute_type(element, subst);
            if Arc::ptr_eq(&new, element) {
                ty.clone()
            } else {
                Arc::new(CppType::Array {
                    element: new,
                    bound: bound.clone(),
                })
            }
        }
        CppType::Function(sig) => {
            let return_type = substitute_type(&sig.return_type, subst);
            let mut changed = !Arc::ptr_eq(&return_type, &sig.return_type);
            let params: Vec<Parameter> = sig
                .params
                .iter()
                .map(|p| {
                    let new = substitute_type(&p.ty, subst);
                    changed |= !Arc::ptr_eq(&new, &p.ty);
                    Parameter {
                        name: p.name.clone(),
                        ty: new,
                        default: p.default.clone(),
                    }
                })
                .collect();
            if changed {
                Arc::new(CppType::Function(FunctionSignature {
                    return_type,
                    params,
                    flags: sig.flags,
                }))
            } else {
                ty.clone()
            }
        }
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_type() -> Arc<CppType> {
        CppType::simple(SimpleKind::Int)
    }

    #[test]
    fn const_placement_does_not_affect_equivalence() {
        // `const int &` vs `int const &`: the declarator parser produces
        // the same shape, but even a doubled const collapses.
        let a = CppType::reference_to(CppType::const_of(int_type()));
        let b = CppType::reference_to(CppType::const_of(CppType::const_of(int_type())));
        assert!(a.is_equivalent(&b));

        let plain = CppType::reference_to(int_type());
        assert!(!a.is_equivalent(&plain));
    }

    #[test]
    fn const_collapses_on_construction() {
        let doubled = CppType::const_of(CppType::const_of(int_type()));
        assert!(matches!(
            &*doubled,
            CppType::Const(inner) if !matches!(&**inner, CppType::Const(_))
        ));
    }

    #[test]
    fn tbd_types_are_not_fully_specified() {
        let tbd = Arc::new(CppType::Tbd(TbdType {
            name: QualifiedName::simple("T"),
        }));
        assert!(!tbd.is_fully_specified());
        assert!(CppType::pointer_to(tbd.clone()).is_tbd());
        assert!(int_type().is_fully_specified());
    }

    #[test]
    fn substitution_replaces_bound_parameters_only() {
        let tbd = Arc::new(CppType::Tbd(TbdType {
            name: QualifiedName::simple("T"),
        }));
        let ptr = CppType::pointer_to(tbd);

        let mut subst = HashMap::new();
        subst.insert("T".to_string(), int_type());
        let out = substitute_type(&ptr, &subst);
        assert!(matches!(&*out, CppType::Pointer(inner) if inner.is_equivalent(&int_type())));

        // An unrelated name is untouched, and the original is unchanged.
        let other = HashMap::new();
        let unchanged = substitute_type(&ptr, &other);
        assert!(Arc::ptr_eq(&unchanged, &ptr));
    }

    #[test]
    fn substitution_is_idempotent() {
        let tbd = Arc::new(CppType::Tbd(TbdType {
            name: QualifiedName::simple("T"),
        }));
        let mut subst = HashMap::new();
        subst.insert("T".to_string(), int_type());

        let once = substitute_type(&tbd, &subst);
        let twice = substitute_type(&once, &subst);
        assert!(once.is_equivalent(&twice));
    }

    #[test]
    fn simple_type_display_orders_modifiers() {
        let ty = SimpleType {
            kind: SimpleKind::Int,
            flags: SimpleType::F_UNSIGNED | SimpleType::F_LONG,
        };
        assert_eq!(ty.to_string(), "unsigned long int");
    }
}
