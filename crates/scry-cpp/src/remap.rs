//! Parameter remapping policy: how "hard" C++ parameter and return types
//! become the simplified types a foreign-binding layer can carry.
//!
//! The policy is a registry of matcher→handler pairs evaluated in a fixed
//! priority order; the first matching rule wins and anything unmatched
//! passes through unchanged. New rules are added with
//! [`RemapRegistry::register`] without touching the parser or the builder.

use std::sync::Arc;

use crate::ast::ty::{CppType, ExtensionType, SimpleKind};
use crate::scope::ScopeArena;

/// How a value crosses the language boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    /// Pass through unchanged in both directions.
    Identity,
    /// The foreign side carries a plain integer; conversion back into the
    /// enum is a checked range cast.
    EnumToInt,
    /// The foreign side carries a string; crossing the boundary allocates
    /// and copies as needed.
    CharStarToString,
    /// A synthesized `this` for a non-static method, typed
    /// pointer-to-class (const-qualified for const methods).
    This { is_const: bool },
}

/// The remapping decision for one parameter or return value.
#[derive(Debug, Clone)]
pub struct ParameterRemap {
    pub orig_type: Arc<CppType>,
    pub new_type: Arc<CppType>,
    pub strategy: ConversionStrategy,
}

impl ParameterRemap {
    pub fn identity(ty: Arc<CppType>) -> Self {
        ParameterRemap {
            orig_type: ty.clone(),
            new_type: ty,
            strategy: ConversionStrategy::Identity,
        }
    }

    /// The synthesized first parameter of a non-static method.
    pub fn synthesized_this(class_type: Arc<CppType>, is_const: bool) -> Self {
        let pointee = if is_const {
            CppType::const_of(class_type.clone())
        } else {
            class_type.clone()
        };
        ParameterRemap {
            orig_type: class_type,
            new_type: CppType::pointer_to(pointee),
            strategy: ConversionStrategy::This { is_const },
        }
    }

    pub fn is_this(&self) -> bool {
        matches!(self.strategy, ConversionStrategy::This { .. })
    }
}

/// Context handed to every rule.
pub struct RemapContext<'a> {
    pub arena: &'a ScopeArena,
    /// True when remapping a return value rather than a parameter.
    pub is_return: bool,
}

/// One remapping rule: a matcher and a handler.
pub trait RemapRule {
    fn name(&self) -> &'static str;
    fn matches(&self, ty: &CppType, ctx: &RemapContext<'_>) -> bool;
    fn apply(&self, ty: &Arc<CppType>, ctx: &RemapContext<'_>) -> ParameterRemap;
}

/// The rule table. Registration order is priority order: first match wins.
pub struct RemapRegistry {
    rules: Vec<Box<dyn RemapRule>>,
}

impl Default for RemapRegistry {
    fn default() -> Self {
        RemapRegistry::with_default_rules()
    }
}

impl RemapRegistry {
    /// An empty registry; matches nothing, everything passes unchanged.
    pub fn empty() -> Self {
        RemapRegistry { rules: Vec::new() }
    }

    /// The standard rule set, highest priority first.
    pub fn with_default_rules() -> Self {
        let mut registry = RemapRegistry::empty();
        registry.register(Box::new(CharStarToStringRule));
        registry.register(Box::new(EnumToIntRule));
        registry.register(Box::new(ConstToNonConstRule));
        registry
    }

    /// Append a rule at the lowest priority position.
    pub fn register(&mut self, rule: Box<dyn RemapRule>) {
        self.rules.push(rule);
    }

    /// Apply the first matching rule, or the identity.
    pub fn remap(&self, ty: &Arc<CppType>, ctx: &RemapContext<'_>) -> ParameterRemap {
        for rule in &self.rules {
            if rule.matches(ty, ctx) {
                return rule.apply(ty, ctx);
            }
        }
        ParameterRemap::identity(ty.clone())
    }
}

/// The exported representation of a string crossing the boundary.
pub fn string_type() -> Arc<CppType> {
    Arc::new(CppType::Extension(ExtensionType {
        keyword: "atomic".to_string(),
        text: "string".to_string(),
    }))
}

// ============================================================================
// Built-in rules
// ============================================================================

/// `const T` for a value type: strip the const and pass by value. The
/// conversion is the identity in both directions.
struct ConstToNonConstRule;

impl RemapRule for ConstToNonConstRule {
    fn name(&self) -> &'static str {
        "const-to-nonconst"
    }

    fn matches(&self, ty: &CppType, _ctx: &RemapContext<'_>) -> bool {
        matches!(ty, CppType::Const(_))
    }

    fn apply(&self, ty: &Arc<CppType>, _ctx: &RemapContext<'_>) -> ParameterRemap {
        ParameterRemap {
            orig_type: ty.clone(),
            new_type: crate::ast::ty::unwrap_const(ty),
            strategy: ConversionStrategy::Identity,
        }
    }
}

/// An enum parameter or return is carried as a plain integer.
struct EnumToIntRule;

impl RemapRule for EnumToIntRule {
    fn name(&self) -> &'static str {
        "enum-to-int"
    }

    fn matches(&self, ty: &CppType, _ctx: &RemapContext<'_>) -> bool {
        matches!(ty.peel_const().0, CppType::Enum(_))
    }

    fn apply(&self, ty: &Arc<CppType>, _ctx: &RemapContext<'_>) -> ParameterRemap {
        ParameterRemap {
            orig_type: ty.clone(),
            new_type: CppType::simple(SimpleKind::Int),
            strategy: ConversionStrategy::EnumToInt,
        }
    }
}

/// `const char *` is carried as a string.
struct CharStarToStringRule;

impl CharStarToStringRule {
    fn is_const_char_ptr(ty: &CppType) -> bool {
        let (bare, _) = ty.peel_const();
        let CppType::Pointer(pointee) = bare else {
            return false;
        };
        let (pointee, _) = pointee.peel_const();
        matches!(
            pointee,
            CppType::Simple(simple) if simple.kind == SimpleKind::Char
        )
    }
}

impl RemapRule for CharStarToStringRule {
    fn name(&self) -> &'static str {
        "char-star-to-string"
    }

    fn matches(&self, ty: &CppType, _ctx: &RemapContext<'_>) -> bool {
        Self::is_const_char_ptr(ty)
    }

    fn apply(&self, ty: &Arc<CppType>, _ctx: &RemapContext<'_>) -> ParameterRemap {
        ParameterRemap {
            orig_type: ty.clone(),
            new_type: string_type(),
            strategy: ConversionStrategy::CharStarToString,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::{EnumType, EnumValue};

    fn ctx(arena: &ScopeArena) -> RemapContext<'_> {
        RemapContext {
            arena,
            is_return: false,
        }
    }

    #[test]
    fn const_value_types_lose_their_const() {
        let arena = ScopeArena::new();
        let registry = RemapRegistry::with_default_rules();
        let ty = CppType::const_of(CppType::simple(SimpleKind::Int));

        let remap = registry.remap(&ty, &ctx(&arena));
        assert_eq!(remap.strategy, ConversionStrategy::Identity);
        assert!(remap.new_type.is_equivalent(&CppType::simple(SimpleKind::Int)));
    }

    #[test]
    fn enums_become_integers() {
        let arena = ScopeArena::new();
        let registry = RemapRegistry::with_default_rules();
        let ty = Arc::new(CppType::Enum(EnumType {
            name: "Color".to_string(),
            declared_in: None,
            values: vec![EnumValue {
                name: "RED".to_string(),
                value: 0,
            }],
        }));

        let remap = registry.remap(&ty, &ctx(&arena));
        assert_eq!(remap.strategy, ConversionStrategy::EnumToInt);
        assert!(remap.new_type.is_equivalent(&CppType::simple(SimpleKind::Int)));
    }

    #[test]
    fn const_char_pointer_becomes_string() {
        let arena = ScopeArena::new();
        let registry = RemapRegistry::with_default_rules();
        let ty = CppType::pointer_to(CppType::const_of(CppType::simple(SimpleKind::Char)));

        let remap = registry.remap(&ty, &ctx(&arena));
        assert_eq!(remap.strategy, ConversionStrategy::CharStarToString);
    }

    #[test]
    fn priority_order_prefers_the_string_rule_over_const_strip() {
        let arena = ScopeArena::new();
        let registry = RemapRegistry::with_default_rules();
        // `char *const` is const at the top level AND a const char
        // pointer; the string rule is registered first and must win.
        let ty = CppType::const_of(CppType::pointer_to(CppType::const_of(
            CppType::simple(SimpleKind::Char),
        )));
        let remap = registry.remap(&ty, &ctx(&arena));
        assert_eq!(remap.strategy, ConversionStrategy::CharStarToString);
    }

    #[test]
    fn unmatched_types_pass_through_unchanged() {
        let arena = ScopeArena::new();
        let registry = RemapRegistry::with_default_rules();
        let ty = CppType::simple(SimpleKind::Double);

        let remap = registry.remap(&ty, &ctx(&arena));
        assert_eq!(remap.strategy, ConversionStrategy::Identity);
        assert!(Arc::ptr_eq(&remap.orig_type, &remap.new_type));
    }

    #[test]
    fn synthesized_this_is_const_aware() {
        let class_ty = CppType::simple(SimpleKind::Int); // stand-in
        let remap = ParameterRemap::synthesized_this(class_ty, true);
        assert!(remap.is_this());
        let CppType::Pointer(pointee) = &*remap.new_type else {
            panic!("this must be a pointer");
        };
        assert!(matches!(&**pointee, CppType::Const(_)));
    }

    #[test]
    fn custom_rules_extend_the_table() {
        struct DoubleToFloat;
        impl RemapRule for DoubleToFloat {
            fn name(&self) -> &'static str {
                "double-to-float"
            }
            fn matches(&self, ty: &CppType, _ctx: &RemapContext<'_>) -> bool {
                matches!(
                    ty,
                    CppType::Simple(simple) if simple.kind == SimpleKind::Double
                )
            }
            fn apply(&self, ty: &Arc<CppType>, _ctx: &RemapContext<'_>) -> ParameterRemap {
                ParameterRemap {
                    orig_type: ty.clone(),
                    new_type: CppType::simple(SimpleKind::Float),
                    strategy: ConversionStrategy::Identity,
                }
            }
        }

        let arena = ScopeArena::new();
        let mut registry = RemapRegistry::with_default_rules();
        registry.register(Box::new(DoubleToFloat));
        let remap = registry.remap(&CppType::simple(SimpleKind::Double), &ctx(&arena));
        assert!(remap.new_type.is_equivalent(&CppType::simple(SimpleKind::Float)));
    }
}
