//! The declaration and type AST.

pub mod decl;
pub mod expr;
pub mod ty;

pub use decl::{
    Declaration, EnumValueDecl, FunctionDecl, FunctionGroup, InstanceDecl, TemplateDecl,
    TypeDecl, TypedefDecl,
};
pub use expr::{EvalError, ExprOp, ExprValue, Expression};
pub use ty::{
    resolve_type, substitute_type, unwrap_const, Access, BaseClass, CppType, EnumType,
    EnumValue, ExtensionType, FunctionSignature, Parameter, QualifiedName, SimpleKind,
    SimpleType, StructKind, StructType, TbdType, TypeError,
};
