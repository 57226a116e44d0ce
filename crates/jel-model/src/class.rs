//! Host object model.
//!
//! Hosts describe the classes a script may use with [`ClassDef`]s. Fields,
//! methods and constructors carry plain Rust callables, so the evaluator
//! never needs reflection. Members are kept in declaration order, which
//! fixes overload enumeration order.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::ty::{Class, Type};
use crate::value::Value;

// ══════════════════════════════════════════════════════════════════════════════
// Ids
// ══════════════════════════════════════════════════════════════════════════════

/// Index of a class inside its [`ClassRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    // Core classes are always installed first, in this order.
    pub const OBJECT: Self = Self(0);
    pub const STRING: Self = Self(1);
    pub const CLASS: Self = Self(2);
    pub const BOOLEAN: Self = Self(3);
    pub const BYTE: Self = Self(4);
    pub const SHORT: Self = Self(5);
    pub const CHARACTER: Self = Self(6);
    pub const INTEGER: Self = Self(7);
    pub const LONG: Self = Self(8);
    pub const FLOAT: Self = Self(9);
    pub const DOUBLE: Self = Self(10);
    pub const NUMBER: Self = Self(11);
    pub const THROWABLE: Self = Self(12);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Host callables
// ══════════════════════════════════════════════════════════════════════════════

/// A failure raised by host code, reported to scripts as an exception.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{exception}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct HostError {
    /// Fully qualified exception class name.
    pub exception: String,
    pub message: Option<String>,
}

impl HostError {
    pub fn new(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            message: Some(message.into()),
        }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new("java.lang.ArithmeticException", message)
    }

    pub fn null_pointer(message: impl Into<String>) -> Self {
        Self::new("java.lang.NullPointerException", message)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalArgumentException", message)
    }

    pub fn number_format(message: impl Into<String>) -> Self {
        Self::new("java.lang.NumberFormatException", message)
    }

    pub fn index_out_of_bounds(index: i64, len: usize) -> Self {
        Self::new(
            "java.lang.IndexOutOfBoundsException",
            format!("Index {index} out of bounds for length {len}"),
        )
    }

    pub fn class_cast(message: impl Into<String>) -> Self {
        Self::new("java.lang.ClassCastException", message)
    }
}

/// Everything a host callable gets to see.
pub struct Invocation<'a> {
    pub registry: &'a ClassRegistry,
    /// The class the member was looked up on (the created class for
    /// constructors).
    pub class: ClassId,
    /// `None` for static members and constructors.
    pub receiver: Option<&'a Value>,
    pub args: &'a [Value],
}

impl<'a> Invocation<'a> {
    pub fn arg(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&Value::Null)
    }

    /// The receiver, or a `NullPointerException` when absent.
    pub fn this(&self) -> Result<&'a Value, HostError> {
        match self.receiver {
            Some(Value::Null) | None => Err(HostError::null_pointer("receiver is null")),
            Some(v) => Ok(v),
        }
    }
}

/// Method, constructor or field getter implementation.
pub type Callable = Rc<dyn Fn(&Invocation<'_>) -> Result<Value, HostError>>;

/// Field setter implementation.
pub type Setter = Rc<dyn Fn(&Invocation<'_>, Value) -> Result<(), HostError>>;

/// Wrap a closure as a [`Callable`].
pub fn callable(f: impl Fn(&Invocation<'_>) -> Result<Value, HostError> + 'static) -> Callable {
    Rc::new(f)
}

/// Wrap a closure as a [`Setter`].
pub fn setter(f: impl Fn(&Invocation<'_>, Value) -> Result<(), HostError> + 'static) -> Setter {
    Rc::new(f)
}

// ══════════════════════════════════════════════════════════════════════════════
// Member definitions
// ══════════════════════════════════════════════════════════════════════════════

/// A declared type variable such as `E extends Comparable<E>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bound: Type,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: Type::object_root(),
        }
    }
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub is_final: bool,
    pub public: bool,
    pub getter: Callable,
    pub setter: Option<Setter>,
}

impl FieldDef {
    /// A public static final constant.
    pub fn constant(name: impl Into<String>, ty: Type, value: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: true,
            is_final: true,
            public: true,
            getter: callable(move |_| Ok(value.clone())),
            setter: None,
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("is_static", &self.is_static)
            .field("is_final", &self.is_final)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub varargs: bool,
    pub is_static: bool,
    pub public: bool,
    pub type_params: Vec<TypeParam>,
    /// `None` for abstract (interface) methods.
    pub invoke: Option<Callable>,
}

impl MethodDef {
    /// A public instance method.
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type, invoke: Callable) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            varargs: false,
            is_static: false,
            public: true,
            type_params: Vec::new(),
            invoke: Some(invoke),
        }
    }

    /// A public abstract method.
    pub fn abstract_method(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            invoke: None,
            ..Self::new(name, params, ret, callable(|_| Ok(Value::Null)))
        }
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn type_param(mut self, param: TypeParam) -> Self {
        self.type_params.push(param);
        self
    }

    /// Erased parameter classes, used to match overrides.
    pub fn erased_params(&self) -> Vec<Class> {
        self.params.iter().map(Type::erasure).collect()
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("varargs", &self.varargs)
            .field("is_static", &self.is_static)
            .field("public", &self.public)
            .field("abstract", &self.invoke.is_none())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ConstructorDef {
    pub params: Vec<Type>,
    pub varargs: bool,
    pub public: bool,
    pub invoke: Callable,
}

impl ConstructorDef {
    pub fn new(params: Vec<Type>, invoke: Callable) -> Self {
        Self {
            params,
            varargs: false,
            public: true,
            invoke,
        }
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("params", &self.params)
            .field("varargs", &self.varargs)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Classes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
}

/// A host class or interface.
#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Fully qualified name.
    pub name: String,
    pub kind: ClassKind,
    pub superclass: Option<Type>,
    pub interfaces: Vec<Type>,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub constructors: Vec<ConstructorDef>,
    pub public: bool,
    /// Whether values of this class may be persisted.
    pub serializable: bool,
}

impl ClassDef {
    /// A public class extending `java.lang.Object`.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Class,
            superclass: Some(Type::object_root()),
            interfaces: Vec::new(),
            type_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            public: true,
            serializable: false,
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::Interface,
            superclass: None,
            ..Self::class(name)
        }
    }

    pub fn extends(mut self, superclass: Type) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn implements(mut self, interface: Type) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn type_param(mut self, name: &str) -> Self {
        self.type_params.push(TypeParam::new(name));
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constructor(mut self, constructor: ConstructorDef) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(p, _)| p).unwrap_or("")
    }

    /// Type variable `name` of this class, bounded as declared.
    pub fn variable(&self, name: &str) -> Option<Type> {
        self.type_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| Type::variable(&p.name, p.bound.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefineError {
    #[error("class '{0}' is already defined")]
    Duplicate(String),
    #[error("class '{0}' has an empty name")]
    EmptyName(String),
}

// ══════════════════════════════════════════════════════════════════════════════
// Registry
// ══════════════════════════════════════════════════════════════════════════════

/// Every class a script can see.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: Vec<ClassDef>,
    index: HashMap<String, ClassId>,
    packages: BTreeSet<String>,
    /// Objects whose `toString()` is running, innermost last.
    rendering: RefCell<Vec<usize>>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ClassRegistry {
    /// The built-in `java.lang` and `java.util` classes.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            classes: Vec::new(),
            index: HashMap::new(),
            packages: BTreeSet::new(),
            rendering: RefCell::new(Vec::new()),
        };
        crate::lang::install(&mut registry);
        debug!(classes = registry.classes.len(), "installed built-in classes");
        registry
    }

    /// Add a class. Its package and every parent package become known.
    pub fn define(&mut self, def: ClassDef) -> Result<ClassId, DefineError> {
        if def.name.is_empty() || def.simple_name().is_empty() {
            return Err(DefineError::EmptyName(def.name));
        }
        if self.index.contains_key(&def.name) {
            return Err(DefineError::Duplicate(def.name));
        }
        Ok(self.insert(def))
    }

    /// Add a class whose name is known to be unique.
    pub(crate) fn insert(&mut self, def: ClassDef) -> ClassId {
        let mut package = def.package();
        while !package.is_empty() {
            self.packages.insert(package.to_string());
            package = package.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
        }
        let id = ClassId(self.classes.len() as u32);
        self.index.insert(def.name.clone(), id);
        self.classes.push(def);
        id
    }

    pub fn get(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    /// Mutable access for hosts that add members after defining a class.
    pub fn get_mut(&mut self, id: ClassId) -> &mut ClassDef {
        &mut self.classes[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.index.get(name).copied()
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.get(id).name
    }

    // ── Hierarchy ──

    /// `id`, its superclasses, then every interface breadth-first, with
    /// `Object` last.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ClassId::OBJECT || !seen.insert(c) {
                break;
            }
            out.push(c);
            current = self.get(c).superclass.as_ref().and_then(Type::class_id);
        }
        let mut queue: VecDeque<ClassId> = out.iter().copied().collect();
        while let Some(c) = queue.pop_front() {
            for iface in &self.get(c).interfaces {
                if let Some(i) = iface.class_id() {
                    if i != ClassId::OBJECT && seen.insert(i) {
                        out.push(i);
                        queue.push_back(i);
                    }
                }
            }
        }
        out.push(ClassId::OBJECT);
        out
    }

    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        sub == sup || self.ancestors(sub).contains(&sup)
    }

    /// Direct supertypes of `id` as written in its definition.
    fn supertypes(&self, id: ClassId) -> impl Iterator<Item = &Type> {
        let def = self.get(id);
        def.superclass.iter().chain(def.interfaces.iter())
    }

    /// View `ty` as the generic supertype `target`, substituting its
    /// parameters along the inheritance path.
    pub fn as_super(&self, ty: &Type, target: ClassId) -> Option<Type> {
        let id = ty.class_id()?;
        if id == target {
            return Some(ty.clone());
        }
        let def = self.get(id);
        let bindings: HashMap<String, Type> = def
            .type_params
            .iter()
            .zip(&ty.params)
            .map(|(p, t)| (p.name.clone(), t.clone()))
            .collect();
        for sup in self.supertypes(id) {
            let mut sup = sup.substitute(&bindings);
            // A raw subtype yields a raw supertype.
            if ty.params.is_empty() {
                sup.params.clear();
            }
            if let Some(view) = self.as_super(&sup, target) {
                return Some(view);
            }
        }
        (target == ClassId::OBJECT).then(Type::object_root)
    }

    // ── Members ──

    /// Field `name` on `id` or its ancestors, with the declaring class.
    pub fn field(&self, id: ClassId, name: &str) -> Option<(ClassId, &FieldDef)> {
        self.ancestors(id).into_iter().find_map(|c| {
            self.get(c)
                .fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| (c, f))
        })
    }

    /// Methods named `name` visible on `id`: declared ones first, then
    /// inherited ones not overridden by an earlier signature.
    pub fn methods(&self, id: ClassId, name: &str) -> Vec<(ClassId, &MethodDef)> {
        let mut out: Vec<(ClassId, &MethodDef)> = Vec::new();
        let mut signatures: Vec<Vec<Class>> = Vec::new();
        for c in self.ancestors(id) {
            for m in self.get(c).methods.iter().filter(|m| m.name == name) {
                let erased = m.erased_params();
                if signatures.contains(&erased) {
                    continue;
                }
                signatures.push(erased);
                out.push((c, m));
            }
        }
        out
    }

    /// The implementation of `method` that a receiver of runtime class
    /// `runtime` runs.
    pub fn find_override<'a>(
        &'a self,
        runtime: &Class,
        method: &'a MethodDef,
    ) -> Option<(ClassId, &'a MethodDef)> {
        let id = match runtime {
            Class::Object(id) => *id,
            _ => ClassId::OBJECT,
        };
        let erased = method.erased_params();
        self.ancestors(id).into_iter().find_map(|c| {
            self.get(c)
                .methods
                .iter()
                .find(|m| {
                    m.name == method.name
                        && m.invoke.is_some()
                        && m.is_static == method.is_static
                        && m.erased_params() == erased
                })
                .map(|m| (c, m))
        })
    }

    /// Names of static fields and methods visible on `id`.
    pub fn static_members(&self, id: ClassId) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for c in self.ancestors(id) {
            let def = self.get(c);
            out.extend(def.fields.iter().filter(|f| f.is_static).map(|f| f.name.clone()));
            out.extend(def.methods.iter().filter(|m| m.is_static).map(|m| m.name.clone()));
        }
        out
    }

    // ── Values ──

    /// Build an exception object of the named class. Unknown names fall
    /// back to `RuntimeException`.
    pub fn new_exception(&self, exception: &str, message: Option<String>) -> Value {
        let id = self
            .lookup(exception)
            .or_else(|| self.lookup("java.lang.RuntimeException"))
            .unwrap_or(ClassId::THROWABLE);
        crate::lang::throwable(id, message)
    }

    /// Java string conversion, calling `toString()` on host objects.
    ///
    /// An object whose `toString()` reaches itself again through other
    /// objects fails with `StackOverflowError` instead of recursing.
    pub fn to_display(&self, value: &Value) -> Result<String, HostError> {
        let object = match value {
            Value::Object(object) => object,
            Value::Array(_) => return Ok(crate::lang::identity_string(self, value)),
            Value::Class(class) => return Ok(crate::lang::class_to_string(self, class)),
            other => return Ok(other.to_string()),
        };
        let Some((_, to_string)) = self
            .methods(object.class, "toString")
            .into_iter()
            .find(|(_, m)| m.params.is_empty() && !m.is_static)
        else {
            return Ok(value.to_string());
        };
        let Some((owner, method)) = self.find_override(&Class::Object(object.class), to_string)
        else {
            return Ok(value.to_string());
        };
        let Some(invoke) = &method.invoke else {
            return Ok(value.to_string());
        };
        let key = Rc::as_ptr(object) as *const () as usize;
        if self.rendering.borrow().contains(&key) {
            return Err(HostError::new(
                "java.lang.StackOverflowError",
                format!("{} contains itself", self.name(object.class)),
            ));
        }
        self.rendering.borrow_mut().push(key);
        let result = invoke(&Invocation {
            registry: self,
            class: owner,
            receiver: Some(value),
            args: &[],
        });
        self.rendering.borrow_mut().pop();
        match result? {
            Value::Str(s) => Ok(s.to_string()),
            other => Ok(other.to_string()),
        }
    }

    /// `a.equals(b)`: host `equals` overrides for objects, content for
    /// strings and boxed values, identity otherwise.
    pub fn values_equal(&self, a: &Value, b: &Value) -> Result<bool, HostError> {
        if let Value::Object(object) = a {
            let equals = self
                .methods(object.class, "equals")
                .into_iter()
                .find(|(_, m)| m.params.len() == 1 && !m.is_static);
            if let Some((_, m)) = equals {
                if let Some((owner, imp)) = self.find_override(&Class::Object(object.class), m) {
                    if owner != ClassId::OBJECT {
                        if let Some(invoke) = &imp.invoke {
                            let args = [b.clone()];
                            let result = invoke(&Invocation {
                                registry: self,
                                class: owner,
                                receiver: Some(a),
                                args: &args,
                            })?;
                            return Ok(matches!(result, Value::Boolean(true)));
                        }
                    }
                }
            }
            return Ok(a.identical(b));
        }
        Ok(a.same_boxed(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Primitive;

    #[test]
    fn test_core_ids_are_fixed() {
        let r = ClassRegistry::with_builtins();
        let expected = [
            (ClassId::OBJECT, "java.lang.Object"),
            (ClassId::STRING, "java.lang.String"),
            (ClassId::CLASS, "java.lang.Class"),
            (ClassId::BOOLEAN, "java.lang.Boolean"),
            (ClassId::BYTE, "java.lang.Byte"),
            (ClassId::SHORT, "java.lang.Short"),
            (ClassId::CHARACTER, "java.lang.Character"),
            (ClassId::INTEGER, "java.lang.Integer"),
            (ClassId::LONG, "java.lang.Long"),
            (ClassId::FLOAT, "java.lang.Float"),
            (ClassId::DOUBLE, "java.lang.Double"),
            (ClassId::NUMBER, "java.lang.Number"),
            (ClassId::THROWABLE, "java.lang.Throwable"),
        ];
        for (id, name) in expected {
            assert_eq!(r.name(id), name);
        }
    }

    #[test]
    fn test_define_rejects_duplicates() {
        let mut r = ClassRegistry::with_builtins();
        let id = r.define(ClassDef::class("com.acme.Widget")).unwrap();
        assert_eq!(r.lookup("com.acme.Widget"), Some(id));
        assert!(r.has_package("com.acme"));
        assert!(r.has_package("com"));
        assert_eq!(
            r.define(ClassDef::class("com.acme.Widget")),
            Err(DefineError::Duplicate("com.acme.Widget".into()))
        );
    }

    #[test]
    fn test_ancestors_order() {
        let r = ClassRegistry::with_builtins();
        let names: Vec<&str> = r
            .ancestors(ClassId::INTEGER)
            .into_iter()
            .map(|id| r.get(id).simple_name())
            .collect();
        assert_eq!(names, ["Integer", "Number", "Comparable", "Object"]);
    }

    #[test]
    fn test_inherited_methods_after_declared() {
        let r = ClassRegistry::with_builtins();
        let array_list = r.lookup("java.util.ArrayList").unwrap();
        let to_string = r.methods(array_list, "toString");
        assert_eq!(to_string.len(), 1);
        let hash = r.methods(ClassId::STRING, "hashCode");
        assert_eq!(hash[0].0, ClassId::STRING);
    }

    #[test]
    fn test_find_override_dispatches_to_runtime_class() {
        let r = ClassRegistry::with_builtins();
        let list = r.lookup("java.util.List").unwrap();
        let array_list = r.lookup("java.util.ArrayList").unwrap();
        let (_, size) = r.methods(list, "size")[0];
        assert!(size.invoke.is_none());
        let (owner, imp) = r.find_override(&Class::Object(array_list), size).unwrap();
        assert_eq!(owner, array_list);
        assert!(imp.invoke.is_some());
    }

    #[test]
    fn test_fields_and_static_members() {
        let r = ClassRegistry::with_builtins();
        let (owner, max) = r.field(ClassId::INTEGER, "MAX_VALUE").unwrap();
        assert_eq!(owner, ClassId::INTEGER);
        assert_eq!(max.ty, Type::primitive(Primitive::Int));
        let math = r.lookup("java.lang.Math").unwrap();
        let members = r.static_members(math);
        assert!(members.contains("PI"));
        assert!(members.contains("max"));
    }

    #[test]
    fn test_host_error_display() {
        let e = HostError::arithmetic("/ by zero");
        assert_eq!(e.to_string(), "java.lang.ArithmeticException: / by zero");
    }
}
