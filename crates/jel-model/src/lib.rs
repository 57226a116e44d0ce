//! JEL type model.
//!
//! Static [`Type`]s with generics, the host object model that replaces
//! reflection ([`ClassRegistry`] of [`ClassDef`]s with Rust callables),
//! runtime [`Value`]s and overload selection.
//!
//! ```
//! use jel_model::{ClassRegistry, Type};
//!
//! let registry = ClassRegistry::with_builtins();
//! let object = Type::object_root();
//! assert!(object.is_assignable_from(&Type::string(), &registry));
//! ```

pub mod class;
pub mod lang;
pub mod overload;
pub mod ty;
pub mod value;

pub use class::{
    callable, setter, Callable, ClassDef, ClassId, ClassKind, ClassRegistry, ConstructorDef,
    DefineError, FieldDef, HostError, Invocation, MethodDef, Setter, TypeParam,
};
pub use overload::{select, Lookup, OverloadError, Selected, Signature};
pub use ty::{Bound, Class, Primitive, Type};
pub use value::{format_double, format_float, ArrayData, ArrayRef, HostObject, ObjectRef, Value};
