//! Runtime values.
//!
//! Primitive values are stored unboxed even when their static type is a
//! wrapper class; boxing only changes the static type. Arrays and host
//! objects are shared handles compared by identity.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use jel_types::ast::Literal;

use crate::class::ClassId;
use crate::ty::{Class, Primitive};

pub type ArrayRef = Rc<ArrayData>;
pub type ObjectRef = Rc<HostObject>;

/// A JEL runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    /// A class literal or `getClass()` result.
    Class(Class),
}

/// Array storage. The element class is fixed at creation.
#[derive(Debug)]
pub struct ArrayData {
    pub element: Class,
    pub items: RefCell<Vec<Value>>,
}

impl ArrayData {
    pub fn new(element: Class, items: Vec<Value>) -> ArrayRef {
        Rc::new(Self {
            element,
            items: RefCell::new(items),
        })
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Store `value` at `index`; returns `false` when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// An instance of a host class with opaque Rust state.
pub struct HostObject {
    pub class: ClassId,
    data: RefCell<Box<dyn Any>>,
}

impl HostObject {
    pub fn new(class: ClassId, data: impl Any) -> ObjectRef {
        Rc::new(Self {
            class,
            data: RefCell::new(Box::new(data)),
        })
    }

    /// Borrow the state as `T`, or `None` when it holds something else.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let data = self.data.borrow();
        data.downcast_ref::<T>().map(f)
    }

    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut data = self.data.borrow_mut();
        data.downcast_mut::<T>().map(f)
    }

    pub fn holds<T: 'static>(&self) -> bool {
        self.data.borrow().is::<T>()
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The class of the value itself. Primitives report their wrapper.
    pub fn runtime_class(&self) -> Class {
        match self {
            Self::Null => Class::Null,
            Self::Boolean(_) => Class::Object(ClassId::BOOLEAN),
            Self::Byte(_) => Class::Object(ClassId::BYTE),
            Self::Short(_) => Class::Object(ClassId::SHORT),
            Self::Char(_) => Class::Object(ClassId::CHARACTER),
            Self::Int(_) => Class::Object(ClassId::INTEGER),
            Self::Long(_) => Class::Object(ClassId::LONG),
            Self::Float(_) => Class::Object(ClassId::FLOAT),
            Self::Double(_) => Class::Object(ClassId::DOUBLE),
            Self::Str(_) => Class::Object(ClassId::STRING),
            Self::Array(a) => a.element.clone().array_of(),
            Self::Object(o) => Class::Object(o.class),
            Self::Class(_) => Class::Object(ClassId::CLASS),
        }
    }

    /// The primitive held, if any.
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Self::Boolean(_) => Primitive::Boolean,
            Self::Byte(_) => Primitive::Byte,
            Self::Short(_) => Primitive::Short,
            Self::Char(_) => Primitive::Char,
            Self::Int(_) => Primitive::Int,
            Self::Long(_) => Primitive::Long,
            Self::Float(_) => Primitive::Float,
            Self::Double(_) => Primitive::Double,
            _ => return None,
        })
    }

    /// `==` on references: handles for arrays and objects, content for
    /// strings.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => self.same_boxed(other),
        }
    }

    /// `equals` for values that are not host objects: same wrapper class
    /// and same content.
    pub fn same_boxed(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral and `char` values widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Self::Byte(v) => *v as i64,
            Self::Short(v) => *v as i64,
            Self::Char(v) => *v as i64,
            Self::Int(v) => *v as i64,
            Self::Long(v) => *v,
            _ => return None,
        })
    }

    /// Any numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Primitive conversion with Java's widening and narrowing rules.
    /// Floating values narrow to `byte`, `short` and `char` through `int`.
    pub fn convert(&self, target: Primitive) -> Option<Value> {
        if target == Primitive::Boolean {
            return self.as_bool().map(Value::Boolean);
        }
        if self.primitive()? == Primitive::Boolean {
            return None;
        }
        let floating = matches!(self, Self::Float(_) | Self::Double(_));
        let whole: i64 = if floating {
            let f = self.as_f64()?;
            match target {
                Primitive::Long => f as i64,
                _ => (f as i32) as i64,
            }
        } else {
            self.as_i64()?
        };
        Some(match target {
            Primitive::Byte => Value::Byte(whole as i8),
            Primitive::Short => Value::Short(whole as i16),
            Primitive::Char => Value::Char(whole as u16),
            Primitive::Int => Value::Int(whole as i32),
            Primitive::Long => Value::Long(whole),
            Primitive::Float => match self {
                Self::Double(d) => Value::Float(*d as f32),
                Self::Float(f) => Value::Float(*f),
                other => Value::Float(other.as_i64()? as f32),
            },
            Primitive::Double => Value::Double(self.as_f64()?),
            Primitive::Boolean | Primitive::Void => return None,
        })
    }

    /// The value an uninitialized array element of `class` holds.
    pub fn default_for(class: &Class) -> Value {
        match class {
            Class::Primitive(p) => match p {
                Primitive::Boolean => Value::Boolean(false),
                Primitive::Byte => Value::Byte(0),
                Primitive::Short => Value::Short(0),
                Primitive::Char => Value::Char(0),
                Primitive::Int => Value::Int(0),
                Primitive::Long => Value::Long(0),
                Primitive::Float => Value::Float(0.0),
                Primitive::Double => Value::Double(0.0),
                Primitive::Void => Value::Null,
            },
            _ => Value::Null,
        }
    }

    pub fn from_literal(literal: &Literal) -> Value {
        match literal {
            Literal::Int(v) => Value::Int(*v),
            Literal::Long(v) => Value::Long(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::Char(v) => Value::Char(*v),
            Literal::Str(s) => Value::str(s),
            Literal::Bool(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_boxed(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// String conversion
// ══════════════════════════════════════════════════════════════════════════════

/// `Double.toString`: plain notation in `[1e-3, 1e7)`, otherwise
/// scientific with an `E` exponent.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let magnitude = d.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let mut s = d.to_string();
        if !s.contains('.') {
            s.push_str(".0");
        }
        return s;
    }
    scientific(&format!("{d:e}"))
}

/// `Float.toString`.
pub fn format_float(f: f32) -> String {
    if f.is_nan() || f.is_infinite() || f == 0.0 {
        return format_double(f as f64);
    }
    let magnitude = f.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let mut s = f.to_string();
        if !s.contains('.') {
            s.push_str(".0");
        }
        return s;
    }
    scientific(&format!("{f:e}"))
}

fn scientific(rust: &str) -> String {
    let (mantissa, exponent) = rust.split_once('e').unwrap_or((rust, "0"));
    if mantissa.contains('.') {
        format!("{mantissa}E{exponent}")
    } else {
        format!("{mantissa}.0E{exponent}")
    }
}

/// Java string conversion of values that need no registry. Objects and
/// class values render with their ids; use
/// [`ClassRegistry::to_display`](crate::class::ClassRegistry::to_display)
/// for the real names.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Char(c) => f.write_str(&String::from_utf16_lossy(&[*c])),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Double(v) => f.write_str(&format_double(*v)),
            Self::Str(s) => f.write_str(s),
            Self::Array(a) => {
                write!(f, "[{:?}@{:x}", a.element, Rc::as_ptr(a) as *const () as usize)
            }
            Self::Object(o) => {
                write!(f, "#{}@{:x}", o.class.0, Rc::as_ptr(o) as *const () as usize)
            }
            Self::Class(c) => write!(f, "class {c:?}"),
        }
    }
}
