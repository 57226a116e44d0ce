//! Built-in classes.
//!
//! A small slice of `java.lang` and `java.util`, enough for scripts to
//! work with strings, boxed numbers, collections and exceptions. Classes
//! are installed in a fixed order so their ids are stable.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::class::{
    callable, ClassDef, ClassId, ClassRegistry, ConstructorDef, FieldDef, HostError, Invocation,
    MethodDef,
};
use crate::ty::{Class, Primitive, Type};
use crate::value::{ArrayData, HostObject, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Ids
// ══════════════════════════════════════════════════════════════════════════════

pub const CHAR_SEQUENCE: ClassId = ClassId(13);
pub const COMPARABLE: ClassId = ClassId(14);
pub const ITERABLE: ClassId = ClassId(15);
pub const ITERATOR: ClassId = ClassId(16);
pub const COLLECTION: ClassId = ClassId(17);
pub const LIST: ClassId = ClassId(18);
pub const ARRAY_LIST: ClassId = ClassId(19);
pub const MAP: ClassId = ClassId(20);
pub const HASH_MAP: ClassId = ClassId(21);
pub const MATH: ClassId = ClassId(22);
pub const STRING_BUILDER: ClassId = ClassId(23);
pub const EXCEPTION: ClassId = ClassId(24);
pub const RUNTIME_EXCEPTION: ClassId = ClassId(25);
pub const ARITHMETIC_EXCEPTION: ClassId = ClassId(26);
pub const NULL_POINTER_EXCEPTION: ClassId = ClassId(27);
pub const ILLEGAL_ARGUMENT_EXCEPTION: ClassId = ClassId(28);
pub const NUMBER_FORMAT_EXCEPTION: ClassId = ClassId(29);
pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: ClassId = ClassId(30);
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: ClassId = ClassId(31);
pub const CLASS_CAST_EXCEPTION: ClassId = ClassId(32);

pub(crate) fn install(registry: &mut ClassRegistry) {
    let defs = [
        def_object(),
        def_string(),
        def_class(),
        def_boolean(),
        def_integral("java.lang.Byte", ClassId::BYTE, Primitive::Byte, "parseByte"),
        def_integral("java.lang.Short", ClassId::SHORT, Primitive::Short, "parseShort"),
        def_character(),
        def_integer(),
        def_integral("java.lang.Long", ClassId::LONG, Primitive::Long, "parseLong"),
        def_floating("java.lang.Float", ClassId::FLOAT, Primitive::Float, "parseFloat"),
        def_floating("java.lang.Double", ClassId::DOUBLE, Primitive::Double, "parseDouble"),
        def_number(),
        def_throwable(),
        def_char_sequence(),
        def_comparable(),
        def_iterable(),
        def_iterator(),
        def_collection(),
        def_list(),
        def_array_list(),
        def_map(),
        def_hash_map(),
        def_math(),
        def_string_builder(),
        def_exception("java.lang.Exception", ClassId::THROWABLE),
        def_exception("java.lang.RuntimeException", EXCEPTION),
        def_exception("java.lang.ArithmeticException", RUNTIME_EXCEPTION),
        def_exception("java.lang.NullPointerException", RUNTIME_EXCEPTION),
        def_exception("java.lang.IllegalArgumentException", RUNTIME_EXCEPTION),
        def_exception("java.lang.NumberFormatException", ILLEGAL_ARGUMENT_EXCEPTION),
        def_exception("java.lang.IndexOutOfBoundsException", RUNTIME_EXCEPTION),
        def_exception(
            "java.lang.ArrayIndexOutOfBoundsException",
            INDEX_OUT_OF_BOUNDS_EXCEPTION,
        ),
        def_exception("java.lang.ClassCastException", RUNTIME_EXCEPTION),
    ];
    for def in defs {
        registry.insert(def);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Host state
// ══════════════════════════════════════════════════════════════════════════════

/// Elements of an `ArrayList`.
#[derive(Debug, Clone, Default)]
pub struct ListData(pub Vec<Value>);

/// Entries of a `HashMap`, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MapData(pub Vec<(Value, Value)>);

/// UTF-16 contents of a `StringBuilder`.
#[derive(Debug, Clone, Default)]
pub struct BuilderData(pub Vec<u16>);

#[derive(Debug, Clone, Default)]
pub struct ThrowableData {
    pub message: Option<String>,
}

/// A snapshot iterator.
#[derive(Debug, Clone, Default)]
pub struct IteratorData {
    pub items: Vec<Value>,
    pub next: usize,
}

pub fn new_list(items: Vec<Value>) -> Value {
    Value::Object(HostObject::new(ARRAY_LIST, ListData(items)))
}

pub fn new_map(entries: Vec<(Value, Value)>) -> Value {
    Value::Object(HostObject::new(HASH_MAP, MapData(entries)))
}

pub fn new_builder(text: &str) -> Value {
    Value::Object(HostObject::new(STRING_BUILDER, BuilderData(utf16(text))))
}

pub fn new_iterator(items: Vec<Value>) -> Value {
    Value::Object(HostObject::new(ITERATOR, IteratorData { items, next: 0 }))
}

/// An exception object of class `id`.
pub fn throwable(id: ClassId, message: Option<String>) -> Value {
    Value::Object(HostObject::new(id, ThrowableData { message }))
}

/// Message of an exception object, if it has one.
pub fn throwable_message(value: &Value) -> Option<String> {
    match value {
        Value::Object(o) => o.with(|t: &ThrowableData| t.message.clone()).flatten(),
        _ => None,
    }
}

/// `Object.hashCode` for every kind of value.
pub fn hash_code(value: &Value) -> i32 {
    match value {
        Value::Null => 0,
        Value::Boolean(b) => {
            if *b {
                1231
            } else {
                1237
            }
        }
        Value::Byte(v) => *v as i32,
        Value::Short(v) => *v as i32,
        Value::Char(v) => *v as i32,
        Value::Int(v) => *v,
        Value::Long(v) => (*v ^ ((*v as u64) >> 32) as i64) as i32,
        Value::Float(v) => v.to_bits() as i32,
        Value::Double(v) => {
            let bits = v.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        Value::Str(s) => string_hash(s),
        Value::Array(a) => identity_hash(Rc::as_ptr(a) as *const ()),
        Value::Object(o) => identity_hash(Rc::as_ptr(o) as *const ()),
        Value::Class(c) => string_hash(&format!("{c:?}")),
    }
}

fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

fn identity_hash(ptr: *const ()) -> i32 {
    ((ptr as usize) >> 3) as i32
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

type HostResult = Result<Value, HostError>;

fn m(
    name: &str,
    params: Vec<Type>,
    ret: Type,
    f: impl Fn(&Invocation<'_>) -> HostResult + 'static,
) -> MethodDef {
    MethodDef::new(name, params, ret, callable(f))
}

fn sm(
    name: &str,
    params: Vec<Type>,
    ret: Type,
    f: impl Fn(&Invocation<'_>) -> HostResult + 'static,
) -> MethodDef {
    m(name, params, ret, f).static_method()
}

fn ctor(params: Vec<Type>, f: impl Fn(&Invocation<'_>) -> HostResult + 'static) -> ConstructorDef {
    ConstructorDef::new(params, callable(f))
}

fn p(primitive: Primitive) -> Type {
    Type::primitive(primitive)
}

fn obj(id: ClassId) -> Type {
    Type::object(id)
}

fn var(name: &str) -> Type {
    Type::variable(name, Type::object_root())
}

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> Value {
    Value::from(String::from_utf16_lossy(units))
}

fn wrong_receiver(inv: &Invocation<'_>) -> HostError {
    HostError::class_cast(format!("receiver is not a {}", inv.registry.get(inv.class).name))
}

fn this_str(inv: &Invocation<'_>) -> Result<Rc<str>, HostError> {
    match inv.this()? {
        Value::Str(s) => Ok(s.clone()),
        _ => Err(wrong_receiver(inv)),
    }
}

fn arg_str(inv: &Invocation<'_>, i: usize) -> Result<Rc<str>, HostError> {
    match inv.arg(i) {
        Value::Str(s) => Ok(s.clone()),
        Value::Null => Err(HostError::null_pointer(format!("argument {} is null", i + 1))),
        other => Ok(Rc::from(inv.registry.to_display(other)?)),
    }
}

fn arg_i32(inv: &Invocation<'_>, i: usize) -> Result<i32, HostError> {
    match inv.arg(i).as_i64() {
        Some(v) => Ok(v as i32),
        None => Err(HostError::illegal_argument(format!("argument {} is not an int", i + 1))),
    }
}

fn arg_f64(inv: &Invocation<'_>, i: usize) -> Result<f64, HostError> {
    inv.arg(i)
        .as_f64()
        .ok_or_else(|| HostError::illegal_argument(format!("argument {} is not numeric", i + 1)))
}

/// The UTF-16 units of a `String` or `StringBuilder` argument.
fn arg_chars(inv: &Invocation<'_>, i: usize) -> Result<Vec<u16>, HostError> {
    match inv.arg(i) {
        Value::Str(s) => Ok(utf16(s)),
        Value::Object(o) => o
            .with(|b: &BuilderData| b.0.clone())
            .ok_or_else(|| HostError::class_cast("not a CharSequence")),
        Value::Null => Err(HostError::null_pointer(format!("argument {} is null", i + 1))),
        other => Ok(utf16(&inv.registry.to_display(other)?)),
    }
}

/// Bounds-checked index into a sequence of `len` items.
fn index(i: i32, len: usize) -> Result<usize, HostError> {
    if i < 0 || i as usize >= len {
        return Err(HostError::index_out_of_bounds(i as i64, len));
    }
    Ok(i as usize)
}

fn find_units(hay: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= hay.len()).then_some(from);
    }
    if from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn position(found: Option<usize>) -> Value {
    Value::Int(found.map(|i| i as i32).unwrap_or(-1))
}

/// `Comparable.compareTo` for boxed values and strings.
fn compare_values(a: &Value, b: &Value) -> Result<i32, HostError> {
    let ordering = match (a, b) {
        (_, Value::Null) | (Value::Null, _) => {
            return Err(HostError::null_pointer("cannot compare with null"))
        }
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => return Ok(compare_strings(x, y)),
        (Value::Float(_) | Value::Double(_), _) | (_, Value::Float(_) | Value::Double(_)) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => return Err(HostError::class_cast("values are not comparable")),
            }
        }
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => return Err(HostError::class_cast("values are not comparable")),
        },
    };
    Ok(match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

/// `String.compareTo`: first differing unit, otherwise length difference.
fn compare_strings(a: &str, b: &str) -> i32 {
    let (x, y) = (utf16(a), utf16(b));
    for (c, d) in x.iter().zip(&y) {
        if c != d {
            return *c as i32 - *d as i32;
        }
    }
    x.len() as i32 - y.len() as i32
}

fn number_format(text: &str) -> HostError {
    HostError::number_format(format!("For input string: \"{text}\""))
}

// ══════════════════════════════════════════════════════════════════════════════
// java.lang
// ══════════════════════════════════════════════════════════════════════════════

fn object_to_string(inv: &Invocation<'_>) -> HostResult {
    let this = inv.this()?;
    Ok(Value::from(match this {
        Value::Object(_) | Value::Array(_) => identity_string(inv.registry, this),
        Value::Class(c) => class_to_string(inv.registry, c),
        other => other.to_string(),
    }))
}

/// `Object.toString` without an override: runtime class name and hash.
pub(crate) fn identity_string(registry: &ClassRegistry, value: &Value) -> String {
    format!(
        "{}@{:x}",
        value.runtime_class().binary_name(registry),
        hash_code(value)
    )
}

fn def_object() -> ClassDef {
    ClassDef {
        superclass: None,
        ..ClassDef::class("java.lang.Object")
    }
    .constructor(ctor(vec![], |inv| {
        Ok(Value::Object(HostObject::new(inv.class, ())))
    }))
    .method(m("toString", vec![], Type::string(), object_to_string))
    .method(m("equals", vec![Type::object_root()], Type::boolean(), |inv| {
        Ok(Value::Boolean(inv.this()?.identical(inv.arg(0))))
    }))
    .method(m("hashCode", vec![], Type::int(), |inv| {
        Ok(Value::Int(hash_code(inv.this()?)))
    }))
    .method(m(
        "getClass",
        vec![],
        Type::generic(ClassId::CLASS, vec![Type::wildcard(None)]),
        |inv| Ok(Value::Class(inv.this()?.runtime_class())),
    ))
}

fn def_string() -> ClassDef {
    let string = Type::string;
    let chars = || obj(CHAR_SEQUENCE);
    ClassDef::class("java.lang.String")
        .implements(chars())
        .implements(Type::generic(COMPARABLE, vec![string()]))
        .serializable()
        .constructor(ctor(vec![], |_| Ok(Value::str(""))))
        .constructor(ctor(vec![string()], |inv| Ok(Value::Str(arg_str(inv, 0)?))))
        .method(m("length", vec![], Type::int(), |inv| {
            Ok(Value::Int(utf16(&this_str(inv)?).len() as i32))
        }))
        .method(m("charAt", vec![Type::int()], p(Primitive::Char), |inv| {
            let units = utf16(&this_str(inv)?);
            let i = index(arg_i32(inv, 0)?, units.len())?;
            Ok(Value::Char(units[i]))
        }))
        .method(m("isEmpty", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(this_str(inv)?.is_empty()))
        }))
        .method(m("isBlank", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(this_str(inv)?.trim().is_empty()))
        }))
        .method(m("hashCode", vec![], Type::int(), |inv| {
            Ok(Value::Int(string_hash(&this_str(inv)?)))
        }))
        .method(m("substring", vec![Type::int()], string(), |inv| {
            let units = utf16(&this_str(inv)?);
            substring(&units, arg_i32(inv, 0)?, units.len() as i32)
        }))
        .method(m("substring", vec![Type::int(), Type::int()], string(), |inv| {
            let units = utf16(&this_str(inv)?);
            substring(&units, arg_i32(inv, 0)?, arg_i32(inv, 1)?)
        }))
        .method(m("indexOf", vec![string()], Type::int(), |inv| {
            let hay = utf16(&this_str(inv)?);
            Ok(position(find_units(&hay, &arg_chars(inv, 0)?, 0)))
        }))
        .method(m("indexOf", vec![string(), Type::int()], Type::int(), |inv| {
            let hay = utf16(&this_str(inv)?);
            let from = arg_i32(inv, 1)?.max(0) as usize;
            Ok(position(find_units(&hay, &arg_chars(inv, 0)?, from)))
        }))
        .method(m("indexOf", vec![Type::int()], Type::int(), |inv| {
            let hay = utf16(&this_str(inv)?);
            let c = arg_i32(inv, 0)?;
            Ok(position(hay.iter().position(|u| *u as i32 == c)))
        }))
        .method(m("lastIndexOf", vec![string()], Type::int(), |inv| {
            let hay = utf16(&this_str(inv)?);
            let needle = arg_chars(inv, 0)?;
            if needle.is_empty() {
                return Ok(Value::Int(hay.len() as i32));
            }
            Ok(position(hay.windows(needle.len()).rposition(|w| w == needle)))
        }))
        .method(m("contains", vec![chars()], Type::boolean(), |inv| {
            let hay = utf16(&this_str(inv)?);
            Ok(Value::Boolean(find_units(&hay, &arg_chars(inv, 0)?, 0).is_some()))
        }))
        .method(m("startsWith", vec![string()], Type::boolean(), |inv| {
            Ok(Value::Boolean(this_str(inv)?.starts_with(&*arg_str(inv, 0)?)))
        }))
        .method(m("endsWith", vec![string()], Type::boolean(), |inv| {
            Ok(Value::Boolean(this_str(inv)?.ends_with(&*arg_str(inv, 0)?)))
        }))
        .method(m("toUpperCase", vec![], string(), |inv| {
            Ok(Value::from(this_str(inv)?.to_uppercase()))
        }))
        .method(m("toLowerCase", vec![], string(), |inv| {
            Ok(Value::from(this_str(inv)?.to_lowercase()))
        }))
        .method(m("trim", vec![], string(), |inv| {
            let s = this_str(inv)?;
            Ok(Value::str(s.trim_matches(|c: char| c <= ' ')))
        }))
        .method(m("equalsIgnoreCase", vec![string()], Type::boolean(), |inv| {
            let this = this_str(inv)?;
            Ok(Value::Boolean(match inv.arg(0) {
                Value::Str(other) => this.to_lowercase() == other.to_lowercase(),
                _ => false,
            }))
        }))
        .method(m("compareTo", vec![string()], Type::int(), |inv| {
            Ok(Value::Int(compare_strings(&this_str(inv)?, &arg_str(inv, 0)?)))
        }))
        .method(m("concat", vec![string()], string(), |inv| {
            Ok(Value::from(format!("{}{}", this_str(inv)?, arg_str(inv, 0)?)))
        }))
        .method(m(
            "replace",
            vec![p(Primitive::Char), p(Primitive::Char)],
            string(),
            |inv| {
                let (from, to) = (arg_i32(inv, 0)? as u16, arg_i32(inv, 1)? as u16);
                let units: Vec<u16> = utf16(&this_str(inv)?)
                    .into_iter()
                    .map(|u| if u == from { to } else { u })
                    .collect();
                Ok(from_units(&units))
            },
        ))
        .method(m("replace", vec![chars(), chars()], string(), |inv| {
            let target = String::from_utf16_lossy(&arg_chars(inv, 0)?);
            let replacement = String::from_utf16_lossy(&arg_chars(inv, 1)?);
            Ok(Value::from(this_str(inv)?.replace(&target, &replacement)))
        }))
        .method(m("repeat", vec![Type::int()], string(), |inv| {
            let count = arg_i32(inv, 0)?;
            if count < 0 {
                return Err(HostError::illegal_argument(format!("count is negative: {count}")));
            }
            Ok(Value::from(this_str(inv)?.repeat(count as usize)))
        }))
        .method(m(
            "toCharArray",
            vec![],
            p(Primitive::Char).array_of(1),
            |inv| {
                let items = utf16(&this_str(inv)?).into_iter().map(Value::Char).collect();
                Ok(Value::Array(ArrayData::new(
                    Class::Primitive(Primitive::Char),
                    items,
                )))
            },
        ))
        .method(sm("valueOf", vec![Type::object_root()], string(), |inv| {
            Ok(Value::from(inv.registry.to_display(inv.arg(0))?))
        }))
        .method(
            sm(
                "join",
                vec![chars(), chars().array_of(1)],
                string(),
                |inv| {
                    let separator = String::from_utf16_lossy(&arg_chars(inv, 0)?);
                    let Value::Array(items) = inv.arg(1) else {
                        return Err(HostError::null_pointer("elements are null"));
                    };
                    let mut parts = Vec::new();
                    for item in items.items.borrow().iter() {
                        parts.push(inv.registry.to_display(item)?);
                    }
                    Ok(Value::from(parts.join(&separator)))
                },
            )
            .varargs(),
        )
}

fn substring(units: &[u16], begin: i32, end: i32) -> HostResult {
    let len = units.len() as i32;
    if begin < 0 || end > len || begin > end {
        return Err(HostError::new(
            "java.lang.StringIndexOutOfBoundsException",
            format!("begin {begin}, end {end}, length {len}"),
        ));
    }
    Ok(from_units(&units[begin as usize..end as usize]))
}

pub(crate) fn class_to_string(registry: &ClassRegistry, class: &Class) -> String {
    match class {
        Class::Primitive(p) => p.name().to_string(),
        Class::Object(id) if registry.get(*id).is_interface() => {
            format!("interface {}", registry.name(*id))
        }
        other => format!("class {}", other.binary_name(registry)),
    }
}

fn this_class(inv: &Invocation<'_>) -> Result<Class, HostError> {
    match inv.this()? {
        Value::Class(c) => Ok(c.clone()),
        _ => Err(wrong_receiver(inv)),
    }
}

fn def_class() -> ClassDef {
    ClassDef::class("java.lang.Class")
        .type_param("T")
        .method(m("getName", vec![], Type::string(), |inv| {
            Ok(Value::from(this_class(inv)?.binary_name(inv.registry)))
        }))
        .method(m("getSimpleName", vec![], Type::string(), |inv| {
            Ok(Value::from(this_class(inv)?.simple_name(inv.registry)))
        }))
        .method(m("isArray", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(matches!(this_class(inv)?, Class::Array(_))))
        }))
        .method(m("isPrimitive", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(matches!(this_class(inv)?, Class::Primitive(_))))
        }))
        .method(m("isInterface", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(match this_class(inv)? {
                Class::Object(id) => inv.registry.get(id).is_interface(),
                _ => false,
            }))
        }))
        .method(m("toString", vec![], Type::string(), |inv| {
            Ok(Value::from(class_to_string(inv.registry, &this_class(inv)?)))
        }))
}

// ── Boxes ──

/// Members shared by every wrapper class.
fn wrapper(name: &str, id: ClassId, primitive: Primitive) -> ClassDef {
    let base = if primitive.is_numeric() && primitive != Primitive::Char {
        ClassDef::class(name).extends(obj(ClassId::NUMBER))
    } else {
        ClassDef::class(name)
    };
    base.implements(Type::generic(COMPARABLE, vec![obj(id)]))
        .serializable()
        .constructor(ctor(vec![p(primitive)], move |inv| {
            inv.arg(0)
                .convert(primitive)
                .ok_or_else(|| HostError::illegal_argument("bad constructor argument"))
        }))
        .method(m("compareTo", vec![obj(id)], Type::int(), |inv| {
            Ok(Value::Int(compare_values(inv.this()?, inv.arg(0))?))
        }))
        .method(sm("valueOf", vec![p(primitive)], obj(id), move |inv| {
            inv.arg(0)
                .convert(primitive)
                .ok_or_else(|| HostError::illegal_argument("bad argument"))
        }))
        .method(sm(
            "compare",
            vec![p(primitive), p(primitive)],
            Type::int(),
            |inv| Ok(Value::Int(compare_values(inv.arg(0), inv.arg(1))?)),
        ))
}

fn def_boolean() -> ClassDef {
    let id = ClassId::BOOLEAN;
    wrapper("java.lang.Boolean", id, Primitive::Boolean)
        .field(FieldDef::constant("TRUE", obj(id), Value::Boolean(true)))
        .field(FieldDef::constant("FALSE", obj(id), Value::Boolean(false)))
        .method(sm("parseBoolean", vec![Type::string()], Type::boolean(), |inv| {
            Ok(Value::Boolean(match inv.arg(0) {
                Value::Str(s) => s.eq_ignore_ascii_case("true"),
                _ => false,
            }))
        }))
        .method(m("booleanValue", vec![], Type::boolean(), |inv| {
            Ok(inv.this()?.clone())
        }))
}

fn def_character() -> ClassDef {
    let char_type = || p(Primitive::Char);
    let test = |name: &str, f: fn(char) -> bool| {
        sm(name, vec![char_type()], Type::boolean(), move |inv| {
            let c = char::from_u32(arg_i32(inv, 0)? as u32);
            Ok(Value::Boolean(c.is_some_and(f)))
        })
    };
    let map = |name: &str, f: fn(char) -> char| {
        sm(name, vec![char_type()], char_type(), move |inv| {
            let unit = arg_i32(inv, 0)? as u16;
            Ok(Value::Char(match char::from_u32(unit as u32) {
                Some(c) => {
                    let mapped = f(c);
                    let mut buf = [0u16; 2];
                    match mapped.encode_utf16(&mut buf) {
                        [single] => *single,
                        _ => unit,
                    }
                }
                None => unit,
            }))
        })
    };
    wrapper("java.lang.Character", ClassId::CHARACTER, Primitive::Char)
        .field(FieldDef::constant("MIN_VALUE", char_type(), Value::Char(0)))
        .field(FieldDef::constant("MAX_VALUE", char_type(), Value::Char(u16::MAX)))
        .method(test("isDigit", |c: char| c.is_ascii_digit()))
        .method(test("isLetter", char::is_alphabetic))
        .method(test("isLetterOrDigit", char::is_alphanumeric))
        .method(test("isWhitespace", char::is_whitespace))
        .method(test("isUpperCase", char::is_uppercase))
        .method(test("isLowerCase", char::is_lowercase))
        .method(map("toUpperCase", |c: char| c.to_uppercase().next().unwrap_or(c)))
        .method(map("toLowerCase", |c: char| c.to_lowercase().next().unwrap_or(c)))
        .method(sm("getNumericValue", vec![char_type()], Type::int(), |inv| {
            let c = char::from_u32(arg_i32(inv, 0)? as u32);
            Ok(Value::Int(
                c.and_then(|c| c.to_digit(36)).map(|d| d as i32).unwrap_or(-1),
            ))
        }))
        .method(m("charValue", vec![], char_type(), |inv| Ok(inv.this()?.clone())))
}

/// `Byte`, `Short` and `Long`.
fn def_integral(name: &str, id: ClassId, primitive: Primitive, parse: &str) -> ClassDef {
    let (min, max) = match primitive {
        Primitive::Byte => (Value::Byte(i8::MIN), Value::Byte(i8::MAX)),
        Primitive::Short => (Value::Short(i16::MIN), Value::Short(i16::MAX)),
        _ => (Value::Long(i64::MIN), Value::Long(i64::MAX)),
    };
    wrapper(name, id, primitive)
        .field(FieldDef::constant("MIN_VALUE", p(primitive), min))
        .field(FieldDef::constant("MAX_VALUE", p(primitive), max))
        .method(sm(parse, vec![Type::string()], p(primitive), move |inv| {
            let text = arg_str(inv, 0)?;
            let parsed = text.parse::<i64>().map_err(|_| number_format(&text))?;
            let value = Value::Long(parsed);
            let narrowed = value.convert(primitive).ok_or_else(|| number_format(&text))?;
            if narrowed.as_i64() != Some(parsed) {
                return Err(HostError::number_format(format!(
                    "Value out of range. Value:\"{text}\""
                )));
            }
            Ok(narrowed)
        }))
}

fn def_integer() -> ClassDef {
    let id = ClassId::INTEGER;
    let radix_string = |name: &str, radix: u32| {
        sm(name, vec![Type::int()], Type::string(), move |inv| {
            let v = arg_i32(inv, 0)? as u32;
            Ok(Value::from(match radix {
                2 => format!("{v:b}"),
                8 => format!("{v:o}"),
                _ => format!("{v:x}"),
            }))
        })
    };
    wrapper("java.lang.Integer", id, Primitive::Int)
        .field(FieldDef::constant("MIN_VALUE", Type::int(), Value::Int(i32::MIN)))
        .field(FieldDef::constant("MAX_VALUE", Type::int(), Value::Int(i32::MAX)))
        .method(sm("parseInt", vec![Type::string()], Type::int(), |inv| {
            let text = arg_str(inv, 0)?;
            text.parse::<i32>()
                .map(Value::Int)
                .map_err(|_| number_format(&text))
        }))
        .method(sm(
            "parseInt",
            vec![Type::string(), Type::int()],
            Type::int(),
            |inv| {
                let text = arg_str(inv, 0)?;
                let radix = arg_i32(inv, 1)?;
                if !(2..=36).contains(&radix) {
                    return Err(number_format(&text));
                }
                i32::from_str_radix(&text, radix as u32)
                    .map(Value::Int)
                    .map_err(|_| number_format(&text))
            },
        ))
        .method(sm("valueOf", vec![Type::string()], obj(id), |inv| {
            let text = arg_str(inv, 0)?;
            text.parse::<i32>()
                .map(Value::Int)
                .map_err(|_| number_format(&text))
        }))
        .method(sm("toString", vec![Type::int()], Type::string(), |inv| {
            Ok(Value::from(arg_i32(inv, 0)?.to_string()))
        }))
        .method(radix_string("toHexString", 16))
        .method(radix_string("toOctalString", 8))
        .method(radix_string("toBinaryString", 2))
        .method(sm("signum", vec![Type::int()], Type::int(), |inv| {
            Ok(Value::Int(arg_i32(inv, 0)?.signum()))
        }))
}

/// `Float` and `Double`.
fn def_floating(name: &str, id: ClassId, primitive: Primitive, parse: &str) -> ClassDef {
    let constant = move |v: f64| match primitive {
        Primitive::Float => Value::Float(v as f32),
        _ => Value::Double(v),
    };
    let (max, min) = match primitive {
        Primitive::Float => (f32::MAX as f64, 1.4e-45f32 as f64),
        _ => (f64::MAX, 4.9e-324),
    };
    let t = move || p(primitive);
    wrapper(name, id, primitive)
        .field(FieldDef::constant("MAX_VALUE", t(), constant(max)))
        .field(FieldDef::constant("MIN_VALUE", t(), constant(min)))
        .field(FieldDef::constant("NaN", t(), constant(f64::NAN)))
        .field(FieldDef::constant("POSITIVE_INFINITY", t(), constant(f64::INFINITY)))
        .field(FieldDef::constant("NEGATIVE_INFINITY", t(), constant(f64::NEG_INFINITY)))
        .method(sm(parse, vec![Type::string()], t(), move |inv| {
            let text = arg_str(inv, 0)?;
            let trimmed = text.trim_matches(|c: char| c <= ' ');
            let body = trimmed
                .strip_suffix(['d', 'D', 'f', 'F'])
                .unwrap_or(trimmed);
            let parsed = match body.trim_start_matches(['+', '-']) {
                "Infinity" | "NaN" => body.replace("Infinity", "inf").parse::<f64>(),
                b if b
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
                {
                    body.parse::<f64>()
                }
                _ => return Err(number_format(&text)),
            };
            let v = parsed.map_err(|_| number_format(&text))?;
            Ok(constant(v))
        }))
        .method(sm("isNaN", vec![t()], Type::boolean(), |inv| {
            Ok(Value::Boolean(arg_f64(inv, 0)?.is_nan()))
        }))
        .method(sm("isInfinite", vec![t()], Type::boolean(), |inv| {
            Ok(Value::Boolean(arg_f64(inv, 0)?.is_infinite()))
        }))
        .method(m("isNaN", vec![], Type::boolean(), |inv| {
            Ok(Value::Boolean(inv.this()?.as_f64().is_some_and(f64::is_nan)))
        }))
}

fn def_number() -> ClassDef {
    let convert = |name: &str, target: Primitive| {
        m(name, vec![], p(target), move |inv| {
            inv.this()?
                .convert(target)
                .ok_or_else(|| wrong_receiver(inv))
        })
    };
    ClassDef::class("java.lang.Number")
        .method(convert("byteValue", Primitive::Byte))
        .method(convert("shortValue", Primitive::Short))
        .method(convert("intValue", Primitive::Int))
        .method(convert("longValue", Primitive::Long))
        .method(convert("floatValue", Primitive::Float))
        .method(convert("doubleValue", Primitive::Double))
}

// ── Exceptions ──

fn exception_constructors(def: ClassDef) -> ClassDef {
    def.constructor(ctor(vec![], |inv| Ok(throwable(inv.class, None))))
        .constructor(ctor(vec![Type::string()], |inv| {
            let message = match inv.arg(0) {
                Value::Str(s) => Some(s.to_string()),
                _ => None,
            };
            Ok(throwable(inv.class, message))
        }))
}

fn def_throwable() -> ClassDef {
    exception_constructors(ClassDef::class("java.lang.Throwable").serializable())
        .method(m("getMessage", vec![], Type::string(), |inv| {
            Ok(throwable_message(inv.this()?)
                .map(Value::from)
                .unwrap_or(Value::Null))
        }))
        .method(m("toString", vec![], Type::string(), |inv| {
            let this = inv.this()?;
            let name = this.runtime_class().name(inv.registry);
            Ok(Value::from(match throwable_message(this) {
                Some(message) => format!("{name}: {message}"),
                None => name,
            }))
        }))
}

fn def_exception(name: &str, parent: ClassId) -> ClassDef {
    exception_constructors(ClassDef::class(name).extends(obj(parent)).serializable())
}

// ── Interfaces ──

fn def_char_sequence() -> ClassDef {
    ClassDef::interface("java.lang.CharSequence")
        .method(MethodDef::abstract_method("length", vec![], Type::int()))
        .method(MethodDef::abstract_method(
            "charAt",
            vec![Type::int()],
            p(Primitive::Char),
        ))
}

fn def_comparable() -> ClassDef {
    ClassDef::interface("java.lang.Comparable")
        .type_param("T")
        .method(MethodDef::abstract_method("compareTo", vec![var("T")], Type::int()))
}

fn def_iterable() -> ClassDef {
    ClassDef::interface("java.lang.Iterable")
        .type_param("T")
        .method(MethodDef::abstract_method(
            "iterator",
            vec![],
            Type::generic(ITERATOR, vec![var("T")]),
        ))
}

fn iterator_step(inv: &Invocation<'_>, advance: bool) -> HostResult {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    let step = o.with_mut(|it: &mut IteratorData| {
        if !advance {
            return Ok(Value::Boolean(it.next < it.items.len()));
        }
        match it.items.get(it.next).cloned() {
            Some(v) => {
                it.next += 1;
                Ok(v)
            }
            None => Err(HostError::new("java.util.NoSuchElementException", "no more elements")),
        }
    });
    step.unwrap_or_else(|| Err(wrong_receiver(inv)))
}

fn def_iterator() -> ClassDef {
    ClassDef::interface("java.util.Iterator")
        .type_param("E")
        .method(m("hasNext", vec![], Type::boolean(), |inv| iterator_step(inv, false)))
        .method(m("next", vec![], var("E"), |inv| iterator_step(inv, true)))
}

fn def_collection() -> ClassDef {
    ClassDef::interface("java.util.Collection")
        .type_param("E")
        .implements(Type::generic(ITERABLE, vec![var("E")]))
        .method(MethodDef::abstract_method("size", vec![], Type::int()))
        .method(MethodDef::abstract_method("isEmpty", vec![], Type::boolean()))
        .method(MethodDef::abstract_method(
            "contains",
            vec![Type::object_root()],
            Type::boolean(),
        ))
        .method(MethodDef::abstract_method("add", vec![var("E")], Type::boolean()))
        .method(MethodDef::abstract_method("clear", vec![], Type::void()))
}

fn def_list() -> ClassDef {
    ClassDef::interface("java.util.List")
        .type_param("E")
        .implements(Type::generic(COLLECTION, vec![var("E")]))
        .method(MethodDef::abstract_method("get", vec![Type::int()], var("E")))
        .method(MethodDef::abstract_method(
            "set",
            vec![Type::int(), var("E")],
            var("E"),
        ))
        .method(MethodDef::abstract_method(
            "add",
            vec![Type::int(), var("E")],
            Type::void(),
        ))
        .method(MethodDef::abstract_method("remove", vec![Type::int()], var("E")))
        .method(MethodDef::abstract_method(
            "indexOf",
            vec![Type::object_root()],
            Type::int(),
        ))
}

fn def_map() -> ClassDef {
    let (k, v) = (|| var("K"), || var("V"));
    let object = Type::object_root;
    ClassDef::interface("java.util.Map")
        .type_param("K")
        .type_param("V")
        .method(MethodDef::abstract_method("size", vec![], Type::int()))
        .method(MethodDef::abstract_method("isEmpty", vec![], Type::boolean()))
        .method(MethodDef::abstract_method("get", vec![object()], v()))
        .method(MethodDef::abstract_method("getOrDefault", vec![object(), v()], v()))
        .method(MethodDef::abstract_method("put", vec![k(), v()], v()))
        .method(MethodDef::abstract_method(
            "containsKey",
            vec![object()],
            Type::boolean(),
        ))
        .method(MethodDef::abstract_method("remove", vec![object()], v()))
        .method(MethodDef::abstract_method(
            "keySet",
            vec![],
            Type::generic(COLLECTION, vec![k()]),
        ))
        .method(MethodDef::abstract_method(
            "values",
            vec![],
            Type::generic(COLLECTION, vec![v()]),
        ))
        .method(MethodDef::abstract_method("clear", vec![], Type::void()))
}

// ══════════════════════════════════════════════════════════════════════════════
// java.util
// ══════════════════════════════════════════════════════════════════════════════

fn list_items(inv: &Invocation<'_>) -> Result<Vec<Value>, HostError> {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    o.with(|l: &ListData| l.0.clone())
        .ok_or_else(|| wrong_receiver(inv))
}

fn with_list<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&mut Vec<Value>) -> Result<R, HostError>,
) -> Result<R, HostError> {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    match o.with_mut(|l: &mut ListData| f(&mut l.0)) {
        Some(result) => result,
        None => Err(wrong_receiver(inv)),
    }
}

fn position_of(
    registry: &ClassRegistry,
    items: &[Value],
    needle: &Value,
) -> Result<Option<usize>, HostError> {
    for (i, item) in items.iter().enumerate() {
        let equal = match item {
            Value::Null => needle.is_null(),
            _ => registry.values_equal(item, needle)?,
        };
        if equal {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// String form of a collection element; the collection itself prints as
/// `marker`.
fn element_display(
    inv: &Invocation<'_>,
    this: &Value,
    item: &Value,
    marker: &str,
) -> Result<String, HostError> {
    if item.identical(this) {
        Ok(marker.to_string())
    } else {
        inv.registry.to_display(item)
    }
}

fn join_display(parts: &[String], open: char, close: char) -> Value {
    Value::from(format!("{open}{}{close}", parts.join(", ")))
}

fn def_array_list() -> ClassDef {
    let e = || var("E");
    ClassDef::class("java.util.ArrayList")
        .type_param("E")
        .implements(Type::generic(LIST, vec![e()]))
        .serializable()
        .constructor(ctor(vec![], |_| Ok(new_list(Vec::new()))))
        .constructor(ctor(vec![Type::int()], |inv| {
            let capacity = arg_i32(inv, 0)?;
            if capacity < 0 {
                return Err(HostError::illegal_argument(format!("Illegal Capacity: {capacity}")));
            }
            Ok(new_list(Vec::with_capacity(capacity as usize)))
        }))
        .method(m("size", vec![], Type::int(), |inv| {
            with_list(inv, |l| Ok(Value::Int(l.len() as i32)))
        }))
        .method(m("isEmpty", vec![], Type::boolean(), |inv| {
            with_list(inv, |l| Ok(Value::Boolean(l.is_empty())))
        }))
        .method(m("contains", vec![Type::object_root()], Type::boolean(), |inv| {
            let items = list_items(inv)?;
            Ok(Value::Boolean(
                position_of(inv.registry, &items, inv.arg(0))?.is_some(),
            ))
        }))
        .method(m("add", vec![e()], Type::boolean(), |inv| {
            let item = inv.arg(0).clone();
            with_list(inv, |l| {
                l.push(item);
                Ok(Value::Boolean(true))
            })
        }))
        .method(m("add", vec![Type::int(), e()], Type::void(), |inv| {
            let (at, item) = (arg_i32(inv, 0)?, inv.arg(1).clone());
            with_list(inv, |l| {
                if at < 0 || at as usize > l.len() {
                    return Err(HostError::index_out_of_bounds(at as i64, l.len()));
                }
                l.insert(at as usize, item);
                Ok(Value::Null)
            })
        }))
        .method(m("get", vec![Type::int()], e(), |inv| {
            let at = arg_i32(inv, 0)?;
            with_list(inv, |l| Ok(l[index(at, l.len())?].clone()))
        }))
        .method(m("set", vec![Type::int(), e()], e(), |inv| {
            let (at, item) = (arg_i32(inv, 0)?, inv.arg(1).clone());
            with_list(inv, |l| {
                let i = index(at, l.len())?;
                Ok(std::mem::replace(&mut l[i], item))
            })
        }))
        .method(m("remove", vec![Type::int()], e(), |inv| {
            let at = arg_i32(inv, 0)?;
            with_list(inv, |l| {
                let i = index(at, l.len())?;
                Ok(l.remove(i))
            })
        }))
        .method(m("indexOf", vec![Type::object_root()], Type::int(), |inv| {
            let items = list_items(inv)?;
            Ok(position(position_of(inv.registry, &items, inv.arg(0))?))
        }))
        .method(m("clear", vec![], Type::void(), |inv| {
            with_list(inv, |l| {
                l.clear();
                Ok(Value::Null)
            })
        }))
        .method(m(
            "iterator",
            vec![],
            Type::generic(ITERATOR, vec![e()]),
            |inv| Ok(new_iterator(list_items(inv)?)),
        ))
        .method(m("toString", vec![], Type::string(), |inv| {
            let this = inv.this()?;
            let mut parts = Vec::new();
            for item in list_items(inv)? {
                parts.push(element_display(inv, this, &item, "(this Collection)")?);
            }
            Ok(join_display(&parts, '[', ']'))
        }))
        .method(m("equals", vec![Type::object_root()], Type::boolean(), |inv| {
            if inv.this()?.identical(inv.arg(0)) {
                return Ok(Value::Boolean(true));
            }
            let items = list_items(inv)?;
            let Value::Object(other) = inv.arg(0) else {
                return Ok(Value::Boolean(false));
            };
            let Some(others) = other.with(|l: &ListData| l.0.clone()) else {
                return Ok(Value::Boolean(false));
            };
            if items.len() != others.len() {
                return Ok(Value::Boolean(false));
            }
            for (a, b) in items.iter().zip(&others) {
                let equal = match a {
                    Value::Null => b.is_null(),
                    _ => inv.registry.values_equal(a, b)?,
                };
                if !equal {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }))
}

fn map_entries(inv: &Invocation<'_>) -> Result<Vec<(Value, Value)>, HostError> {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    o.with(|m: &MapData| m.0.clone())
        .ok_or_else(|| wrong_receiver(inv))
}

fn with_map<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&mut Vec<(Value, Value)>) -> R,
) -> Result<R, HostError> {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    o.with_mut(|m: &mut MapData| f(&mut m.0))
        .ok_or_else(|| wrong_receiver(inv))
}

/// Position of `key` among the map's entries.
fn key_slot(inv: &Invocation<'_>, key: &Value) -> Result<Option<usize>, HostError> {
    let keys: Vec<Value> = map_entries(inv)?.into_iter().map(|(k, _)| k).collect();
    position_of(inv.registry, &keys, key)
}

fn def_hash_map() -> ClassDef {
    let (k, v) = (|| var("K"), || var("V"));
    let object = Type::object_root;
    ClassDef::class("java.util.HashMap")
        .type_param("K")
        .type_param("V")
        .implements(Type::generic(MAP, vec![k(), v()]))
        .serializable()
        .constructor(ctor(vec![], |_| Ok(new_map(Vec::new()))))
        .method(m("size", vec![], Type::int(), |inv| {
            with_map(inv, |e| Value::Int(e.len() as i32))
        }))
        .method(m("isEmpty", vec![], Type::boolean(), |inv| {
            with_map(inv, |e| Value::Boolean(e.is_empty()))
        }))
        .method(m("get", vec![object()], v(), |inv| {
            let slot = key_slot(inv, inv.arg(0))?;
            Ok(match slot {
                Some(i) => with_map(inv, |e| e[i].1.clone())?,
                None => Value::Null,
            })
        }))
        .method(m("getOrDefault", vec![object(), v()], v(), |inv| {
            let slot = key_slot(inv, inv.arg(0))?;
            Ok(match slot {
                Some(i) => with_map(inv, |e| e[i].1.clone())?,
                None => inv.arg(1).clone(),
            })
        }))
        .method(m("put", vec![k(), v()], v(), |inv| {
            let slot = key_slot(inv, inv.arg(0))?;
            let (key, value) = (inv.arg(0).clone(), inv.arg(1).clone());
            with_map(inv, |e| match slot {
                Some(i) => std::mem::replace(&mut e[i].1, value),
                None => {
                    e.push((key, value));
                    Value::Null
                }
            })
        }))
        .method(m("containsKey", vec![object()], Type::boolean(), |inv| {
            Ok(Value::Boolean(key_slot(inv, inv.arg(0))?.is_some()))
        }))
        .method(m("remove", vec![object()], v(), |inv| {
            let slot = key_slot(inv, inv.arg(0))?;
            Ok(match slot {
                Some(i) => with_map(inv, |e| e.remove(i).1)?,
                None => Value::Null,
            })
        }))
        .method(m(
            "keySet",
            vec![],
            Type::generic(COLLECTION, vec![k()]),
            |inv| Ok(new_list(map_entries(inv)?.into_iter().map(|(k, _)| k).collect())),
        ))
        .method(m(
            "values",
            vec![],
            Type::generic(COLLECTION, vec![v()]),
            |inv| Ok(new_list(map_entries(inv)?.into_iter().map(|(_, v)| v).collect())),
        ))
        .method(m("clear", vec![], Type::void(), |inv| {
            with_map(inv, |e| {
                e.clear();
                Value::Null
            })
        }))
        .method(m("toString", vec![], Type::string(), |inv| {
            let this = inv.this()?;
            let mut parts = Vec::new();
            for (key, value) in map_entries(inv)? {
                parts.push(format!(
                    "{}={}",
                    element_display(inv, this, &key, "(this Map)")?,
                    element_display(inv, this, &value, "(this Map)")?
                ));
            }
            Ok(join_display(&parts, '{', '}'))
        }))
}

// ── Math ──

fn def_math() -> ClassDef {
    let double = || p(Primitive::Double);
    let long = || p(Primitive::Long);
    let unary = |name: &str, f: fn(f64) -> f64| {
        sm(name, vec![double()], double(), move |inv| {
            Ok(Value::Double(f(arg_f64(inv, 0)?)))
        })
    };
    let pick = |name: &str, ty: Primitive, want_max: bool| {
        sm(name, vec![p(ty), p(ty)], p(ty), move |inv| {
            let (a, b) = (inv.arg(0).clone(), inv.arg(1).clone());
            Ok(match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) if ty != Primitive::Double => {
                    let v = if want_max { x.max(y) } else { x.min(y) };
                    Value::Long(v).convert(ty).unwrap_or(Value::Null)
                }
                _ => {
                    let (x, y) = (arg_f64(inv, 0)?, arg_f64(inv, 1)?);
                    Value::Double(if x.is_nan() || y.is_nan() {
                        f64::NAN
                    } else if want_max {
                        x.max(y)
                    } else {
                        x.min(y)
                    })
                }
            })
        })
    };
    ClassDef::class("java.lang.Math")
        .field(FieldDef::constant("PI", double(), Value::Double(std::f64::consts::PI)))
        .field(FieldDef::constant("E", double(), Value::Double(std::f64::consts::E)))
        .method(sm("abs", vec![Type::int()], Type::int(), |inv| {
            Ok(Value::Int(arg_i32(inv, 0)?.wrapping_abs()))
        }))
        .method(sm("abs", vec![long()], long(), |inv| {
            let v = inv.arg(0).as_i64().unwrap_or_default();
            Ok(Value::Long(v.wrapping_abs()))
        }))
        .method(sm("abs", vec![double()], double(), |inv| {
            Ok(Value::Double(arg_f64(inv, 0)?.abs()))
        }))
        .method(pick("max", Primitive::Int, true))
        .method(pick("max", Primitive::Long, true))
        .method(pick("max", Primitive::Double, true))
        .method(pick("min", Primitive::Int, false))
        .method(pick("min", Primitive::Long, false))
        .method(pick("min", Primitive::Double, false))
        .method(sm("pow", vec![double(), double()], double(), |inv| {
            Ok(Value::Double(arg_f64(inv, 0)?.powf(arg_f64(inv, 1)?)))
        }))
        .method(unary("sqrt", f64::sqrt))
        .method(unary("cbrt", f64::cbrt))
        .method(unary("floor", f64::floor))
        .method(unary("ceil", f64::ceil))
        .method(unary("exp", f64::exp))
        .method(unary("log", f64::ln))
        .method(unary("log10", f64::log10))
        .method(unary("sin", f64::sin))
        .method(unary("cos", f64::cos))
        .method(unary("tan", f64::tan))
        .method(sm("round", vec![double()], long(), |inv| {
            Ok(Value::Long((arg_f64(inv, 0)? + 0.5).floor() as i64))
        }))
}

// ── StringBuilder ──

fn with_builder<R>(
    inv: &Invocation<'_>,
    f: impl FnOnce(&mut Vec<u16>) -> R,
) -> Result<R, HostError> {
    let Value::Object(o) = inv.this()? else {
        return Err(wrong_receiver(inv));
    };
    o.with_mut(|b: &mut BuilderData| f(&mut b.0))
        .ok_or_else(|| wrong_receiver(inv))
}

fn def_string_builder() -> ClassDef {
    let builder = || obj(STRING_BUILDER);
    ClassDef::class("java.lang.StringBuilder")
        .implements(obj(CHAR_SEQUENCE))
        .serializable()
        .constructor(ctor(vec![], |_| Ok(new_builder(""))))
        .constructor(ctor(vec![Type::string()], |inv| {
            Ok(new_builder(&arg_str(inv, 0)?))
        }))
        .method(m("append", vec![Type::object_root()], builder(), |inv| {
            let text = utf16(&inv.registry.to_display(inv.arg(0))?);
            with_builder(inv, |b| b.extend(text))?;
            Ok(inv.this()?.clone())
        }))
        .method(m(
            "insert",
            vec![Type::int(), Type::object_root()],
            builder(),
            |inv| {
                let at = arg_i32(inv, 0)?;
                let text = utf16(&inv.registry.to_display(inv.arg(1))?);
                with_builder(inv, |b| {
                    if at < 0 || at as usize > b.len() {
                        return Err(HostError::index_out_of_bounds(at as i64, b.len()));
                    }
                    let at = at as usize;
                    b.splice(at..at, text);
                    Ok(())
                })??;
                Ok(inv.this()?.clone())
            },
        ))
        .method(m("deleteCharAt", vec![Type::int()], builder(), |inv| {
            let at = arg_i32(inv, 0)?;
            with_builder(inv, |b| index(at, b.len()).map(|i| b.remove(i)))??;
            Ok(inv.this()?.clone())
        }))
        .method(m("reverse", vec![], builder(), |inv| {
            with_builder(inv, |b| {
                let reversed: String = String::from_utf16_lossy(b).chars().rev().collect();
                *b = utf16(&reversed);
            })?;
            Ok(inv.this()?.clone())
        }))
        .method(m("length", vec![], Type::int(), |inv| {
            with_builder(inv, |b| Value::Int(b.len() as i32))
        }))
        .method(m("charAt", vec![Type::int()], p(Primitive::Char), |inv| {
            let at = arg_i32(inv, 0)?;
            with_builder(inv, |b| index(at, b.len()).map(|i| Value::Char(b[i])))?
        }))
        .method(m("toString", vec![], Type::string(), |inv| {
            with_builder(inv, |b| from_units(b))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        r: &ClassRegistry,
        class: ClassId,
        name: &str,
        this: Option<&Value>,
        args: &[Value],
    ) -> HostResult {
        let (owner, method) = r
            .methods(class, name)
            .into_iter()
            .find(|(_, m)| m.params.len() == args.len() && m.invoke.is_some())
            .unwrap();
        let invoke = method.invoke.clone().unwrap();
        invoke(&Invocation {
            registry: r,
            class: owner,
            receiver: this,
            args,
        })
    }

    #[test]
    fn test_ids_follow_install_order() {
        let r = ClassRegistry::with_builtins();
        assert_eq!(r.name(CHAR_SEQUENCE), "java.lang.CharSequence");
        assert_eq!(r.name(ARRAY_LIST), "java.util.ArrayList");
        assert_eq!(r.name(STRING_BUILDER), "java.lang.StringBuilder");
        assert_eq!(r.name(CLASS_CAST_EXCEPTION), "java.lang.ClassCastException");
        assert_eq!(r.len(), 33);
    }

    #[test]
    fn test_string_methods_use_utf16_indices() {
        let r = ClassRegistry::with_builtins();
        let s = Value::str("héllo");
        let len = call(&r, ClassId::STRING, "length", Some(&s), &[]).unwrap();
        assert_eq!(len, Value::Int(5));
        let c = call(&r, ClassId::STRING, "charAt", Some(&s), &[Value::Int(1)]).unwrap();
        assert_eq!(c, Value::Char('é' as u16));
        let err = call(&r, ClassId::STRING, "charAt", Some(&s), &[Value::Int(9)]).unwrap_err();
        assert_eq!(err.exception, "java.lang.IndexOutOfBoundsException");
    }

    #[test]
    fn test_string_compare_and_hash() {
        assert_eq!(compare_strings("apple", "banana"), 'a' as i32 - 'b' as i32);
        assert_eq!(compare_strings("ab", "abc"), -1);
        assert_eq!(hash_code(&Value::str("hello")), 99162322);
        assert_eq!(hash_code(&Value::Boolean(true)), 1231);
    }

    #[test]
    fn test_parse_int_failure_is_number_format() {
        let r = ClassRegistry::with_builtins();
        let ok = call(&r, ClassId::INTEGER, "parseInt", None, &[Value::str("-42")]).unwrap();
        assert_eq!(ok, Value::Int(-42));
        let err = call(&r, ClassId::INTEGER, "parseInt", None, &[Value::str("4x")]).unwrap_err();
        assert_eq!(err.exception, "java.lang.NumberFormatException");
        assert_eq!(err.message.as_deref(), Some("For input string: \"4x\""));
    }

    #[test]
    fn test_list_and_map_state() {
        let r = ClassRegistry::with_builtins();
        let list = new_list(Vec::new());
        call(&r, ARRAY_LIST, "add", Some(&list), &[Value::str("a")]).unwrap();
        call(&r, ARRAY_LIST, "add", Some(&list), &[Value::str("b")]).unwrap();
        assert_eq!(r.to_display(&list).unwrap(), "[a, b]");
        let found = call(&r, ARRAY_LIST, "indexOf", Some(&list), &[Value::str("b")]).unwrap();
        assert_eq!(found, Value::Int(1));

        let map = new_map(Vec::new());
        call(&r, HASH_MAP, "put", Some(&map), &[Value::str("k"), Value::Int(1)]).unwrap();
        let old = call(&r, HASH_MAP, "put", Some(&map), &[Value::str("k"), Value::Int(2)]).unwrap();
        assert_eq!(old, Value::Int(1));
        assert_eq!(r.to_display(&map).unwrap(), "{k=2}");
    }

    #[test]
    fn test_self_containing_collections_display() {
        let r = ClassRegistry::with_builtins();
        let list = new_list(Vec::new());
        call(&r, ARRAY_LIST, "add", Some(&list), &[list.clone()]).unwrap();
        assert_eq!(r.to_display(&list).unwrap(), "[(this Collection)]");
        let same = call(&r, ARRAY_LIST, "equals", Some(&list), &[list.clone()]).unwrap();
        assert_eq!(same, Value::Boolean(true));

        let map = new_map(Vec::new());
        call(&r, HASH_MAP, "put", Some(&map), &[Value::str("me"), map.clone()]).unwrap();
        assert_eq!(r.to_display(&map).unwrap(), "{me=(this Map)}");
    }

    #[test]
    fn test_indirect_cycle_display_fails() {
        let r = ClassRegistry::with_builtins();
        let outer = new_list(Vec::new());
        let inner = new_list(vec![outer.clone()]);
        call(&r, ARRAY_LIST, "add", Some(&outer), &[inner]).unwrap();
        let err = r.to_display(&outer).unwrap_err();
        assert_eq!(err.exception, "java.lang.StackOverflowError");
        // The guard is released, so unrelated values still render.
        assert_eq!(r.to_display(&new_list(vec![Value::Int(1)])).unwrap(), "[1]");
    }

    #[test]
    fn test_class_and_array_display() {
        let r = ClassRegistry::with_builtins();
        let string = Value::Class(Class::Object(ClassId::STRING));
        assert_eq!(r.to_display(&string).unwrap(), "class java.lang.String");
        let list = Value::Class(Class::Object(LIST));
        assert_eq!(r.to_display(&list).unwrap(), "interface java.util.List");
        let ints = Value::Array(ArrayData::new(Class::Primitive(Primitive::Int), vec![]));
        assert!(r.to_display(&ints).unwrap().starts_with("[I@"));
        let strings = Value::Array(ArrayData::new(Class::Object(ClassId::STRING), vec![]));
        let shown = r.to_display(&strings).unwrap();
        assert!(shown.starts_with("[Ljava.lang.String;@"));
        let via_object = call(&r, ClassId::OBJECT, "toString", Some(&strings), &[]).unwrap();
        assert_eq!(via_object, Value::from(shown));
        let int_matrix = Value::Class(Class::Primitive(Primitive::Int).array_of().array_of());
        assert_eq!(r.to_display(&int_matrix).unwrap(), "class [[I");
    }

    #[test]
    fn test_builder_appends_display_forms() {
        let r = ClassRegistry::with_builtins();
        let b = new_builder("x");
        call(&r, STRING_BUILDER, "append", Some(&b), &[Value::Int(1)]).unwrap();
        call(&r, STRING_BUILDER, "append", Some(&b), &[Value::Char('c' as u16)]).unwrap();
        call(&r, STRING_BUILDER, "append", Some(&b), &[Value::Double(2.0)]).unwrap();
        assert_eq!(r.to_display(&b).unwrap(), "x1c2.0");
    }

    #[test]
    fn test_exception_display() {
        let r = ClassRegistry::with_builtins();
        let e = r.new_exception("java.lang.ArithmeticException", Some("/ by zero".into()));
        assert_eq!(
            r.to_display(&e).unwrap(),
            "java.lang.ArithmeticException: / by zero"
        );
        assert_eq!(throwable_message(&e).as_deref(), Some("/ by zero"));
        let unknown = r.new_exception("com.acme.Missing", None);
        assert_eq!(r.to_display(&unknown).unwrap(), "java.lang.RuntimeException");
    }
}
