//! Declaration variants: what a scope actually contains.
//!
//! Every named entity the parser understands becomes one of these. A
//! declaration records its originating scope implicitly (it is owned by the
//! scope's ordered map), whether it is fully specified, and the doc comment
//! that preceded it in the source.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::expr::Expression;
use crate::ast::ty::{self, Access, CppType, FunctionSignature};
use crate::scope::ScopeId;
use crate::token::SourceLoc;

/// A class/struct/union/enum definition or forward declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub ty: Arc<CppType>,
    pub access: Access,
    pub comment: Option<String>,
    pub loc: SourceLoc,
}

/// A `typedef` alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDecl {
    pub name: String,
    pub ty: Arc<CppType>,
    pub access: Access,
    pub comment: Option<String>,
    pub loc: SourceLoc,
}

/// One concrete function or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub signature: FunctionSignature,
    pub flags: u32,
    pub access: Access,
    pub comment: Option<String>,
    pub loc: SourceLoc,
}

impl FunctionDecl {
    pub const F_STATIC: u32 = 0x0001;
    pub const F_VIRTUAL: u32 = 0x0002;
    pub const F_PURE_VIRTUAL: u32 = 0x0004;
    pub const F_CONSTRUCTOR: u32 = 0x0008;
    pub const F_DESTRUCTOR: u32 = 0x0010;
    pub const F_OPERATOR: u32 = 0x0020;
    pub const F_INLINE: u32 = 0x0040;

    pub fn is_static(&self) -> bool {
        (self.flags & Self::F_STATIC) != 0
    }

    pub fn is_constructor(&self) -> bool {
        (self.flags & Self::F_CONSTRUCTOR) != 0
    }

    pub fn is_destructor(&self) -> bool {
        (self.flags & Self::F_DESTRUCTOR) != 0
    }

    pub fn is_operator(&self) -> bool {
        (self.flags & Self::F_OPERATOR) != 0
    }
}

/// All the overloads sharing one function name within a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionGroup {
    pub name: String,
    pub overloads: Vec<FunctionDecl>,
}

/// A variable or data member.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDecl {
    pub name: String,
    pub ty: Arc<CppType>,
    pub initializer: Option<Expression>,
    pub is_static: bool,
    pub access: Access,
    pub comment: Option<String>,
    pub loc: SourceLoc,
}

/// One value of an enum, injected into the enclosing scope the way C++
/// hoists enumerators.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub name: String,
    pub value: i64,
    pub enum_type: Arc<CppType>,
}

/// A template declaration: the parameter names plus the templated inner
/// declaration, whose types reference the parameters as TBD placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub name: String,
    pub params: Vec<String>,
    /// The scope holding the templated class's members (still TBD-typed).
    pub scope: Option<ScopeId>,
    pub decl: Box<Declaration>,
}

/// Any entity a scope can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Type(TypeDecl),
    Typedef(TypedefDecl),
    Functions(FunctionGroup),
    Variable(InstanceDecl),
    Namespace { name: String, scope: ScopeId },
    /// A using-declaration aliasing a single name from another scope.
    UsingAlias {
        name: String,
        target: Box<Declaration>,
    },
    EnumValue(EnumValueDecl),
    Template(TemplateDecl),
}

impl Declaration {
    /// The name this declaration binds in its scope.
    pub fn name(&self) -> &str {
        match self {
            Declaration::Type(d) => &d.name,
            Declaration::Typedef(d) => &d.name,
            Declaration::Functions(d) => &d.name,
            Declaration::Variable(d) => &d.name,
            Declaration::Namespace { name, .. } => name,
            Declaration::UsingAlias { name, .. } => name,
            Declaration::EnumValue(d) => &d.name,
            Declaration::Template(d) => &d.name,
        }
    }

    /// True when no TBD placeholder remains anywhere in the declaration.
    pub fn is_fully_specified(&self) -> bool {
        match self {
            Declaration::Type(d) => d.ty.is_fully_specified(),
            Declaration::Typedef(d) => d.ty.is_fully_specified(),
            Declaration::Functions(group) => group.overloads.iter().all(|f| {
                f.signature.return_type.is_fully_specified()
                    && f.signature.params.iter().all(|p| p.ty.is_fully_specified())
            }),
            Declaration::Variable(d) => d.ty.is_fully_specified(),
            Declaration::Namespace { .. } => true,
            Declaration::UsingAlias { target, .. } => target.is_fully_specified(),
            Declaration::EnumValue(_) => true,
            // A template is by definition parameterized.
            Declaration::Template(_) => false,
        }
    }

    /// The type this declaration denotes in type position, if any.
    pub fn as_type(&self) -> Option<Arc<CppType>> {
        match self {
            Declaration::Type(d) => Some(d.ty.clone()),
            Declaration::Typedef(d) => Some(d.ty.clone()),
            Declaration::UsingAlias { target, .. } => target.as_type(),
            _ => None,
        }
    }

    /// Rewrite every type reference through a template substitution map.
    /// Produces a structural copy; `self` is never modified.
    pub fn substitute(&self, subst: &HashMap<String, Arc<CppType>>) -> Declaration {
        match self {
            Declaration::Type(d) => Declaration::Type(TypeDecl {
                ty: ty::substitute_type(&d.ty, subst),
                ..d.clone()
            }),
            Declaration::Typedef(d) => Declaration::Typedef(TypedefDecl {
                ty: ty::substitute_type(&d.ty, subst),
                ..d.clone()
            }),
            Declaration::Functions(group) => Declaration::Functions(FunctionGroup {
                name: group.name.clone(),
                overloads: group
                    .overloads
                    .iter()
                    .map(|f| {
                        let sig = Arc::new(CppType::Function(f.signature.clone()));
                        let substituted = ty::substitute_type(&sig, subst);
                        let signature = match &*substituted {
                            CppType::Function(sig) => sig.clone(),
                            _ => f.signature.clone(),
                        };
                        FunctionDecl {
                            signature,
                            ..f.clone()
                        }
                    })
                    .collect(),
            }),
            Declaration::Variable(d) => Declaration::Variable(InstanceDecl {
                ty: ty::substitute_type(&d.ty, subst),
                ..d.clone()
            }),
            Declaration::UsingAlias { name, target } => Declaration::UsingAlias {
                name: name.clone(),
                target: Box::new(target.substitute(subst)),
            },
            Declaration::Namespace { .. }
            | Declaration::EnumValue(_)
            | Declaration::Template(_) => self.clone(),
        }
    }
}
