//! The JEL type model.
//!
//! A [`Type`] is either a concrete [`Class`] (primitive, object, array or
//! the null sentinel) with optional generic parameters, or a bounded
//! variable/wildcard. Assignability follows Java's loose invocation
//! context: primitive widening along a strict total order, reference
//! covariance, boxing and unboxing.

use std::collections::HashMap;
use std::fmt;

use crate::class::{ClassId, ClassRegistry};

// ══════════════════════════════════════════════════════════════════════════════
// Primitives
// ══════════════════════════════════════════════════════════════════════════════

/// Primitive types. `Void` only appears as a return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    /// Numeric primitives in widening order.
    pub const NUMERIC: [Primitive; 7] = [
        Self::Byte,
        Self::Short,
        Self::Char,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Double,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Self::Boolean,
            "byte" => Self::Byte,
            "short" => Self::Short,
            "char" => Self::Char,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "void" => Self::Void,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Char => "char",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Void => "void",
        }
    }

    /// Position in the widening order, `None` for `boolean` and `void`.
    pub fn rank(self) -> Option<u8> {
        Self::NUMERIC.iter().position(|p| *p == self).map(|i| i as u8)
    }

    pub fn is_numeric(self) -> bool {
        self.rank().is_some()
    }

    /// `byte`, `short`, `char`, `int` or `long`.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Char | Self::Int | Self::Long
        )
    }

    /// Whether a value of this type may be assigned to `target` without a cast.
    pub fn widens_to(self, target: Primitive) -> bool {
        if self == target {
            return self != Self::Void;
        }
        match (self.rank(), target.rank()) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        }
    }

    /// Binary numeric promotion: at least `int`, otherwise the wider side.
    pub fn promote(self, other: Primitive) -> Option<Primitive> {
        let a = self.rank()?;
        let b = other.rank()?;
        let int = Self::Int.rank()?;
        Some(Self::NUMERIC[a.max(b).max(int) as usize])
    }

    /// Unary numeric promotion.
    pub fn promote_unary(self) -> Option<Primitive> {
        self.promote(Self::Int)
    }

    /// The wrapper class used for boxing.
    pub fn wrapper(self) -> Option<ClassId> {
        Some(match self {
            Self::Boolean => ClassId::BOOLEAN,
            Self::Byte => ClassId::BYTE,
            Self::Short => ClassId::SHORT,
            Self::Char => ClassId::CHARACTER,
            Self::Int => ClassId::INTEGER,
            Self::Long => ClassId::LONG,
            Self::Float => ClassId::FLOAT,
            Self::Double => ClassId::DOUBLE,
            Self::Void => return None,
        })
    }

    /// The primitive a wrapper class unboxes to.
    pub fn unwrapped(class: ClassId) -> Option<Primitive> {
        Some(match class {
            ClassId::BOOLEAN => Self::Boolean,
            ClassId::BYTE => Self::Byte,
            ClassId::SHORT => Self::Short,
            ClassId::CHARACTER => Self::Char,
            ClassId::INTEGER => Self::Int,
            ClassId::LONG => Self::Long,
            ClassId::FLOAT => Self::Float,
            ClassId::DOUBLE => Self::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Classes
// ══════════════════════════════════════════════════════════════════════════════

/// A runtime class: what a value actually is, without generic parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Class {
    Primitive(Primitive),
    Object(ClassId),
    Array(Box<Class>),
    /// The type of the `null` literal.
    Null,
}

impl Class {
    pub fn array_of(self) -> Class {
        Class::Array(Box::new(self))
    }

    pub fn element(&self) -> Option<&Class> {
        match self {
            Class::Array(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, Class::Primitive(_))
    }

    /// Fully qualified name, e.g. `java.lang.String[]`.
    pub fn name(&self, registry: &ClassRegistry) -> String {
        match self {
            Class::Primitive(p) => p.name().to_string(),
            Class::Object(id) => registry.get(*id).name.clone(),
            Class::Array(e) => format!("{}[]", e.name(registry)),
            Class::Null => "null".to_string(),
        }
    }

    /// Runtime name as `Class.getName()` reports it: arrays use descriptors,
    /// e.g. `[I` or `[Ljava.lang.String;`.
    pub fn binary_name(&self, registry: &ClassRegistry) -> String {
        match self {
            Class::Array(e) => format!("[{}", e.descriptor(registry)),
            other => other.name(registry),
        }
    }

    fn descriptor(&self, registry: &ClassRegistry) -> String {
        match self {
            Class::Primitive(p) => match p {
                Primitive::Boolean => "Z",
                Primitive::Byte => "B",
                Primitive::Short => "S",
                Primitive::Char => "C",
                Primitive::Int => "I",
                Primitive::Long => "J",
                Primitive::Float => "F",
                Primitive::Double => "D",
                Primitive::Void => "V",
            }
            .to_string(),
            Class::Object(id) => format!("L{};", registry.get(*id).name),
            Class::Array(e) => format!("[{}", e.descriptor(registry)),
            Class::Null => "Ljava.lang.Object;".to_string(),
        }
    }

    /// Simple name, e.g. `String[]`.
    pub fn simple_name(&self, registry: &ClassRegistry) -> String {
        match self {
            Class::Object(id) => registry.get(*id).simple_name().to_string(),
            Class::Array(e) => format!("{}[]", e.simple_name(registry)),
            other => other.name(registry),
        }
    }

    /// Reference class assignability, ignoring generic parameters.
    pub fn is_assignable_from(&self, source: &Class, registry: &ClassRegistry) -> bool {
        match (self, source) {
            (a, b) if a == b => true,
            (Class::Primitive(t), Class::Primitive(s)) => s.widens_to(*t),
            (Class::Primitive(_), _) | (_, Class::Primitive(_)) => false,
            (_, Class::Null) => true,
            (Class::Null, _) => false,
            (Class::Object(ClassId::OBJECT), _) => true,
            (Class::Object(t), Class::Object(s)) => registry.is_subclass(*s, *t),
            (Class::Array(t), Class::Array(s)) => match (t.as_ref(), s.as_ref()) {
                (Class::Primitive(a), Class::Primitive(b)) => a == b,
                (t, s) if t.is_reference() && s.is_reference() => t.is_assignable_from(s, registry),
                _ => false,
            },
            _ => false,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

/// Bound of a type variable or wildcard.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Extends(Box<Type>),
    Super(Box<Type>),
}

/// A static type.
///
/// Exactly one of `base` and `bound` describes the type: a concrete class,
/// or (for wildcards and type variables) a bound. For arrays, `params`
/// belong to the innermost element class.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub base: Option<Class>,
    pub bound: Option<Bound>,
    pub params: Vec<Type>,
    pub var: Option<String>,
}

impl Type {
    pub fn of(class: Class) -> Self {
        Self {
            base: Some(class),
            bound: None,
            params: Vec::new(),
            var: None,
        }
    }

    pub fn primitive(p: Primitive) -> Self {
        Self::of(Class::Primitive(p))
    }

    pub fn object(id: ClassId) -> Self {
        Self::of(Class::Object(id))
    }

    pub fn generic(id: ClassId, params: Vec<Type>) -> Self {
        Self {
            params,
            ..Self::object(id)
        }
    }

    pub fn null() -> Self {
        Self::of(Class::Null)
    }

    pub fn void() -> Self {
        Self::primitive(Primitive::Void)
    }

    pub fn int() -> Self {
        Self::primitive(Primitive::Int)
    }

    pub fn boolean() -> Self {
        Self::primitive(Primitive::Boolean)
    }

    pub fn string() -> Self {
        Self::object(ClassId::STRING)
    }

    pub fn object_root() -> Self {
        Self::object(ClassId::OBJECT)
    }

    /// A type variable such as `E`, bounded by `bound`.
    pub fn variable(name: impl Into<String>, bound: Type) -> Self {
        Self {
            base: None,
            bound: Some(Bound::Extends(Box::new(bound))),
            params: Vec::new(),
            var: Some(name.into()),
        }
    }

    /// `?`, `? extends T` or `? super T`.
    pub fn wildcard(bound: Option<Bound>) -> Self {
        Self {
            base: None,
            bound: Some(bound.unwrap_or_else(|| Bound::Extends(Box::new(Self::object_root())))),
            params: Vec::new(),
            var: None,
        }
    }

    /// This type with `dims` more array dimensions. Variables are erased
    /// to their bound first.
    pub fn array_of(&self, dims: usize) -> Self {
        if dims == 0 {
            return self.clone();
        }
        let mut class = self.erasure();
        for _ in 0..dims {
            class = class.array_of();
        }
        Self {
            base: Some(class),
            bound: None,
            params: self.params.clone(),
            var: None,
        }
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<Type> {
        let class = self.base.as_ref()?.element()?.clone();
        Some(Self {
            base: Some(class),
            bound: None,
            params: self.params.clone(),
            var: None,
        })
    }

    pub fn primitive_kind(&self) -> Option<Primitive> {
        match &self.base {
            Some(Class::Primitive(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive_kind().is_some_and(|p| p != Primitive::Void)
    }

    pub fn is_void(&self) -> bool {
        self.primitive_kind() == Some(Primitive::Void)
    }

    pub fn is_null(&self) -> bool {
        self.base == Some(Class::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.base, Some(Class::Array(_)))
    }

    /// Non-primitive: classes, arrays, null, variables and wildcards.
    pub fn is_reference(&self) -> bool {
        !matches!(self.base, Some(Class::Primitive(_)))
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match &self.base {
            Some(Class::Object(id)) => Some(*id),
            _ => None,
        }
    }

    /// Upper bound used when a variable or wildcard is read.
    pub fn upper(&self) -> Type {
        match (&self.base, &self.bound) {
            (Some(_), _) => self.clone(),
            (None, Some(Bound::Extends(b))) => b.upper(),
            _ => Self::object_root(),
        }
    }

    /// The runtime class of values of this type.
    pub fn erasure(&self) -> Class {
        match self.upper().base {
            Some(c) => c,
            None => Class::Object(ClassId::OBJECT),
        }
    }

    /// The primitive this type holds directly or after unboxing.
    pub fn unboxed(&self) -> Option<Primitive> {
        match &self.base {
            Some(Class::Primitive(p)) if *p != Primitive::Void => Some(*p),
            Some(Class::Object(id)) => Primitive::unwrapped(*id),
            _ => None,
        }
    }

    /// The wrapper type of a primitive type; reference types unchanged.
    pub fn boxed(&self) -> Type {
        match self.primitive_kind().and_then(Primitive::wrapper) {
            Some(id) => Type::object(id),
            None => self.clone(),
        }
    }

    pub fn is_string(&self) -> bool {
        self.class_id() == Some(ClassId::STRING)
    }

    // ── Assignability ──

    /// Whether a value of static type `source` may be stored in `self`.
    pub fn is_assignable_from(&self, source: &Type, registry: &ClassRegistry) -> bool {
        if self.is_void() || source.is_void() {
            return false;
        }
        if self.base.is_none() {
            return match &self.bound {
                Some(Bound::Extends(b)) => b.is_assignable_from(source, registry),
                Some(Bound::Super(b)) => {
                    b.is_assignable_from(source, registry) || source.is_assignable_from(b, registry)
                }
                None => source.is_reference() || source.is_primitive(),
            };
        }
        if source.base.is_none() {
            return self.is_assignable_from(&source.upper(), registry);
        }

        match (self.primitive_kind(), source.primitive_kind()) {
            (Some(t), Some(s)) => s.widens_to(t),
            (Some(t), None) => source.unboxed().is_some_and(|s| s.widens_to(t)),
            (None, Some(_)) => self.is_assignable_from(&source.boxed(), registry),
            (None, None) => self.reference_assignable(source, registry),
        }
    }

    /// Mirror of [`Type::is_assignable_from`].
    pub fn can_assign_to(&self, target: &Type, registry: &ClassRegistry) -> bool {
        target.is_assignable_from(self, registry)
    }

    fn reference_assignable(&self, source: &Type, registry: &ClassRegistry) -> bool {
        let (Some(target_class), Some(source_class)) = (&self.base, &source.base) else {
            return false;
        };
        if !target_class.is_assignable_from(source_class, registry) {
            return false;
        }
        if self.params.is_empty() || source.params.is_empty() || source.is_null() {
            return true;
        }
        let (Some(target_id), Some(_)) = (innermost(target_class), innermost(source_class)) else {
            return true;
        };
        let view = match registry.as_super(&source.element_view(), target_id) {
            Some(view) => view,
            None => return true,
        };
        if view.params.len() != self.params.len() {
            return true;
        }
        self.params
            .iter()
            .zip(&view.params)
            .all(|(t, s)| t.is_assignable_from(s, registry))
    }

    /// The innermost element class with this type's parameters.
    fn element_view(&self) -> Type {
        match &self.base {
            Some(class) => match innermost(class) {
                Some(id) => Type::generic(id, self.params.clone()),
                None => self.clone(),
            },
            None => self.clone(),
        }
    }

    // ── Casts ──

    /// Whether `(target) value-of-self` is a legal cast.
    pub fn is_castable_to(&self, target: &Type, registry: &ClassRegistry) -> bool {
        if self.is_void() || target.is_void() {
            return false;
        }
        if target.is_assignable_from(self, registry) {
            return true;
        }
        match (self.primitive_kind(), target.primitive_kind()) {
            (Some(s), Some(t)) => {
                (s.is_numeric() && t.is_numeric()) || (s == Primitive::Boolean && t == s)
            }
            (Some(s), None) => target.is_assignable_from(&Type::primitive(s).boxed(), registry),
            (None, Some(t)) => match self.unboxed() {
                Some(s) => s.widens_to(t),
                None => self.is_assignable_from(&Type::primitive(t).boxed(), registry),
            },
            (None, None) => castable_classes(&self.erasure(), &target.erasure(), registry),
        }
    }

    // ── Generics ──

    /// Replace type variables named in `bindings`.
    pub fn substitute(&self, bindings: &HashMap<String, Type>) -> Type {
        if let Some(name) = &self.var {
            if let Some(bound) = bindings.get(name) {
                return bound.clone();
            }
        }
        Type {
            base: self.base.clone(),
            bound: self.bound.as_ref().map(|b| match b {
                Bound::Extends(t) => Bound::Extends(Box::new(t.substitute(bindings))),
                Bound::Super(t) => Bound::Super(Box::new(t.substitute(bindings))),
            }),
            params: self.params.iter().map(|p| p.substitute(bindings)).collect(),
            var: self.var.clone(),
        }
    }

    /// Resolve a member type declared by `declaring` as seen through
    /// `self` (the receiver's static type).
    ///
    /// Variables are bound first from this type's parameters viewed as
    /// `declaring`, then from `method_bindings`. Anything left stays a
    /// bounded variable.
    pub fn resolve(
        &self,
        generic: &Type,
        declaring: ClassId,
        method_bindings: &HashMap<String, Type>,
        registry: &ClassRegistry,
    ) -> Type {
        let mut bindings = HashMap::new();
        if let Some(view) = registry.as_super(&self.element_view(), declaring) {
            let def = registry.get(declaring);
            for (param, arg) in def.type_params.iter().zip(&view.params) {
                if arg.var.as_deref() != Some(param.name.as_str()) {
                    bindings.insert(param.name.clone(), arg.clone());
                }
            }
        }
        for (name, ty) in method_bindings {
            bindings.entry(name.clone()).or_insert_with(|| ty.clone());
        }
        generic.substitute(&bindings)
    }

    // ── Unification ──

    /// The most specific type both `self` and `other` are assignable to.
    pub fn common_type(&self, other: &Type, registry: &ClassRegistry) -> Option<Type> {
        if self == other {
            return (!self.is_void()).then(|| self.clone());
        }
        if self.is_void() || other.is_void() {
            return None;
        }
        if self.is_null() {
            return Some(other.boxed());
        }
        if other.is_null() {
            return Some(self.boxed());
        }
        match (self.primitive_kind(), other.primitive_kind()) {
            (Some(a), Some(b)) => {
                if a == Primitive::Boolean || b == Primitive::Boolean {
                    return None;
                }
                Some(if a.widens_to(b) { other.clone() } else { self.clone() })
            }
            (Some(_), None) | (None, Some(_)) => self.boxed().common_type(&other.boxed(), registry),
            (None, None) => Some(self.common_reference(other, registry)),
        }
    }

    fn common_reference(&self, other: &Type, registry: &ClassRegistry) -> Type {
        if self.is_assignable_from(other, registry) {
            return self.clone();
        }
        if other.is_assignable_from(self, registry) {
            return other.clone();
        }
        let (a, b) = (self.upper(), other.upper());
        if let (Some(ae), Some(be)) = (a.element(), b.element()) {
            if ae.is_reference() && be.is_reference() {
                return ae.common_reference(&be, registry).array_of(1);
            }
            return Type::object_root();
        }
        let Some(id) = a.class_id() else {
            return Type::object_root();
        };
        for ancestor in registry.ancestors(id) {
            if let Some(view) = registry.as_super(&a, ancestor) {
                if view.is_assignable_from(&b, registry) {
                    return view;
                }
            }
        }
        Type::object_root()
    }

    // ── Display ──

    /// Readable form using simple class names, e.g. `List<String>[]`.
    pub fn display(&self, registry: &ClassRegistry) -> String {
        self.render(registry, false)
    }

    /// Fully qualified form that the default grammar parses back.
    pub fn qualified_name(&self, registry: &ClassRegistry) -> String {
        self.render(registry, true)
    }

    fn render(&self, registry: &ClassRegistry, qualified: bool) -> String {
        match (&self.base, &self.var, &self.bound) {
            (Some(class), _, _) => {
                let (inner, dims) = split_dims(class);
                let mut out = if qualified {
                    inner.name(registry)
                } else {
                    inner.simple_name(registry)
                };
                if !self.params.is_empty() {
                    let params: Vec<String> =
                        self.params.iter().map(|p| p.render(registry, qualified)).collect();
                    out.push('<');
                    out.push_str(&params.join(", "));
                    out.push('>');
                }
                out.push_str(&"[]".repeat(dims));
                out
            }
            (None, Some(name), _) => name.clone(),
            (None, None, Some(Bound::Extends(b))) if b.class_id() == Some(ClassId::OBJECT) => {
                "?".to_string()
            }
            (None, None, Some(Bound::Extends(b))) => {
                format!("? extends {}", b.render(registry, qualified))
            }
            (None, None, Some(Bound::Super(b))) => {
                format!("? super {}", b.render(registry, qualified))
            }
            (None, None, None) => "?".to_string(),
        }
    }
}

/// The innermost object class of a possibly nested array class.
fn innermost(class: &Class) -> Option<ClassId> {
    match class {
        Class::Object(id) => Some(*id),
        Class::Array(e) => innermost(e),
        _ => None,
    }
}

fn split_dims(class: &Class) -> (&Class, usize) {
    let mut dims = 0;
    let mut inner = class;
    while let Class::Array(e) = inner {
        dims += 1;
        inner = e;
    }
    (inner, dims)
}

fn castable_classes(source: &Class, target: &Class, registry: &ClassRegistry) -> bool {
    match (source, target) {
        (Class::Null, t) => t.is_reference(),
        (_, Class::Null) => false,
        (Class::Array(s), Class::Array(t)) => match (s.as_ref(), t.as_ref()) {
            (Class::Primitive(a), Class::Primitive(b)) => a == b,
            (s, t) if s.is_reference() && t.is_reference() => castable_classes(s, t, registry),
            _ => false,
        },
        (Class::Object(s), Class::Object(t)) => {
            registry.is_subclass(*s, *t)
                || registry.is_subclass(*t, *s)
                || registry.get(*s).is_interface()
                || registry.get(*t).is_interface()
        }
        (Class::Object(ClassId::OBJECT), Class::Array(_)) => true,
        _ => target.is_assignable_from(source, registry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg() -> ClassRegistry {
        ClassRegistry::with_builtins()
    }

    fn class(reg: &ClassRegistry, name: &str) -> Type {
        Type::object(reg.lookup(name).unwrap())
    }

    #[test]
    fn test_widening_is_a_strict_total_order() {
        for (i, a) in Primitive::NUMERIC.iter().enumerate() {
            for (j, b) in Primitive::NUMERIC.iter().enumerate() {
                assert_eq!(a.widens_to(*b), i <= j, "{a} -> {b}");
            }
        }
    }

    #[test]
    fn test_boolean_only_to_itself() {
        let r = reg();
        let boolean = Type::boolean();
        assert!(boolean.is_assignable_from(&boolean, &r));
        for p in Primitive::NUMERIC {
            let t = Type::primitive(p);
            assert!(!boolean.is_assignable_from(&t, &r));
            assert!(!t.is_assignable_from(&boolean, &r));
        }
    }

    #[test]
    fn test_null_assignable_to_references_only() {
        let r = reg();
        assert!(Type::string().is_assignable_from(&Type::null(), &r));
        assert!(Type::int().array_of(1).is_assignable_from(&Type::null(), &r));
        assert!(!Type::int().is_assignable_from(&Type::null(), &r));
    }

    #[test]
    fn test_reference_covariance() {
        let r = reg();
        let object = Type::object_root();
        let string = Type::string();
        let chars = class(&r, "java.lang.CharSequence");
        assert!(object.is_assignable_from(&string, &r));
        assert!(chars.is_assignable_from(&string, &r));
        assert!(!string.is_assignable_from(&object, &r));
        assert!(object.array_of(1).is_assignable_from(&string.array_of(1), &r));
        assert!(!object.array_of(1).is_assignable_from(&Type::int().array_of(1), &r));
        assert!(object.is_assignable_from(&Type::int().array_of(2), &r));
    }

    #[test]
    fn test_boxing_and_unboxing() {
        let r = reg();
        let integer = Type::object(ClassId::INTEGER);
        assert!(integer.is_assignable_from(&Type::int(), &r));
        assert!(Type::int().is_assignable_from(&integer, &r));
        assert!(Type::primitive(Primitive::Long).is_assignable_from(&integer, &r));
        assert!(Type::object_root().is_assignable_from(&Type::int(), &r));
        assert!(!Type::object(ClassId::LONG).is_assignable_from(&Type::int(), &r));
    }

    #[test]
    fn test_generic_parameters_checked() {
        let r = reg();
        let list = r.lookup("java.util.List").unwrap();
        let array_list = r.lookup("java.util.ArrayList").unwrap();
        let list_string = Type::generic(list, vec![Type::string()]);
        let list_integer = Type::generic(list, vec![Type::object(ClassId::INTEGER)]);
        let array_list_string = Type::generic(array_list, vec![Type::string()]);
        assert!(list_string.is_assignable_from(&array_list_string, &r));
        assert!(!list_integer.is_assignable_from(&array_list_string, &r));
        // Raw types are compatible both ways.
        assert!(list_string.is_assignable_from(&Type::object(array_list), &r));
        assert!(Type::object(list).is_assignable_from(&array_list_string, &r));
        // Wildcards honour their bound.
        let number = Type::object(ClassId::NUMBER);
        let list_of_numbers = Type::generic(
            list,
            vec![Type::wildcard(Some(Bound::Extends(Box::new(number))))],
        );
        assert!(list_of_numbers.is_assignable_from(&list_integer, &r));
        assert!(!list_of_numbers.is_assignable_from(&list_string, &r));
        assert!(list_integer.can_assign_to(&list_of_numbers, &r));
    }

    #[test]
    fn test_casts() {
        let r = reg();
        assert!(Type::primitive(Primitive::Double).is_castable_to(&Type::int(), &r));
        assert!(!Type::boolean().is_castable_to(&Type::int(), &r));
        assert!(Type::object_root().is_castable_to(&Type::string(), &r));
        assert!(!Type::string().is_castable_to(&Type::object(ClassId::INTEGER), &r));
        assert!(Type::object_root().is_castable_to(&Type::int(), &r));
        assert!(Type::int().is_castable_to(&Type::object_root(), &r));
        let list = class(&r, "java.util.List");
        assert!(Type::object(ClassId::INTEGER).is_castable_to(&list, &r));
    }

    #[test]
    fn test_resolve_through_inheritance() {
        let r = reg();
        let list = r.lookup("java.util.List").unwrap();
        let collection = r.lookup("java.util.Collection").unwrap();
        let array_list = r.lookup("java.util.ArrayList").unwrap();
        let receiver = Type::generic(array_list, vec![Type::string()]);
        let element = Type::variable("E", Type::object_root());
        assert_eq!(
            receiver.resolve(&element, collection, &HashMap::new(), &r),
            Type::string()
        );
        assert_eq!(receiver.resolve(&element, list, &HashMap::new(), &r), Type::string());
        // Raw receivers leave the variable in place.
        let raw = Type::object(array_list);
        let resolved = raw.resolve(&element, list, &HashMap::new(), &r);
        assert_eq!(resolved.var.as_deref(), Some("E"));
        assert_eq!(resolved.upper(), Type::object_root());
    }

    #[test]
    fn test_resolve_method_bindings() {
        let r = reg();
        let t = Type::variable("T", Type::object_root());
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), Type::string());
        assert_eq!(
            Type::object_root().resolve(&t, ClassId::OBJECT, &bindings, &r),
            Type::string()
        );
    }

    #[test]
    fn test_common_type() {
        let r = reg();
        let int = Type::int();
        let double = Type::primitive(Primitive::Double);
        assert_eq!(int.common_type(&double, &r), Some(double.clone()));
        assert_eq!(Type::boolean().common_type(&int, &r), None);
        assert_eq!(Type::null().common_type(&Type::string(), &r), Some(Type::string()));
        let integer = Type::object(ClassId::INTEGER);
        let long = Type::object(ClassId::LONG);
        assert_eq!(integer.common_type(&long, &r), Some(Type::object(ClassId::NUMBER)));
        // Comparable<String> does not accept an Integer.
        assert_eq!(Type::string().common_type(&integer, &r), Some(Type::object_root()));
        assert_eq!(
            Type::string().common_type(&Type::int().array_of(1), &r),
            Some(Type::object_root())
        );
    }

    #[test]
    fn test_display() {
        let r = reg();
        let map = r.lookup("java.util.Map").unwrap();
        let t =
            Type::generic(map, vec![Type::string(), Type::object(ClassId::INTEGER)]).array_of(1);
        assert_eq!(t.display(&r), "Map<String, Integer>[]");
        assert_eq!(
            t.qualified_name(&r),
            "java.util.Map<java.lang.String, java.lang.Integer>[]"
        );
        assert_eq!(Type::wildcard(None).display(&r), "?");
    }
}
