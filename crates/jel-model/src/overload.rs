//! Overload selection.
//!
//! Candidates are tried in declaration order (declared members before
//! inherited ones) and the first whose parameters accept every argument
//! wins. Trailing arguments may fill a varargs parameter. When nothing
//! applies, the candidate matching the most leading arguments is reported.

use std::collections::HashMap;

use jel_types::ErrorCode;
use thiserror::Error;
use tracing::trace;

use crate::class::{ClassId, ClassRegistry, ConstructorDef, MethodDef, TypeParam};
use crate::ty::Type;

/// The parts of a method or constructor overload selection looks at.
pub trait Signature {
    fn params(&self) -> &[Type];
    fn is_varargs(&self) -> bool;
    fn is_public(&self) -> bool;
    fn is_static(&self) -> bool;
    fn type_params(&self) -> &[TypeParam];
}

impl Signature for MethodDef {
    fn params(&self) -> &[Type] {
        &self.params
    }

    fn is_varargs(&self) -> bool {
        self.varargs
    }

    fn is_public(&self) -> bool {
        self.public
    }

    fn is_static(&self) -> bool {
        self.is_static
    }

    fn type_params(&self) -> &[TypeParam] {
        &self.type_params
    }
}

impl Signature for ConstructorDef {
    fn params(&self) -> &[Type] {
        &self.params
    }

    fn is_varargs(&self) -> bool {
        self.varargs
    }

    fn is_public(&self) -> bool {
        self.public
    }

    fn is_static(&self) -> bool {
        false
    }

    fn type_params(&self) -> &[TypeParam] {
        &[]
    }
}

/// Where a member is being looked up from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lookup {
    /// Hide non-public members.
    pub public_only: bool,
    /// Only static members apply (the target is a type name).
    pub static_context: bool,
}

/// The chosen overload.
#[derive(Debug)]
pub struct Selected<'a, S> {
    pub owner: ClassId,
    pub member: &'a S,
    /// Parameter types as seen through the receiver.
    pub params: Vec<Type>,
    /// Whether trailing arguments are packed into the varargs array.
    pub spread: bool,
    /// Method type variables inferred from the arguments.
    pub bindings: HashMap<String, Type>,
}

impl<'a, S> Selected<'a, S> {
    /// Parameter type the argument at `i` must convert to.
    pub fn param_for(&self, i: usize) -> Option<Type> {
        let last = self.params.len().checked_sub(1)?;
        if self.spread && i >= last {
            return self.params[last].element();
        }
        self.params.get(i).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverloadError {
    #[error("no member named '{name}'")]
    NoSuchMember { name: String },
    #[error("'{name}' is not accessible")]
    Inaccessible { name: String },
    #[error("instance member '{name}' cannot be used from a static context")]
    StaticContext { name: String },
    #[error("no applicable overload for {name}({args}){}", .near_miss.as_ref().map(|n| format!("; closest candidate is {name}({n})")).unwrap_or_default())]
    NoApplicable {
        name: String,
        args: String,
        near_miss: Option<String>,
    },
}

impl OverloadError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchMember { .. } => ErrorCode::NO_SUCH_METHOD,
            Self::Inaccessible { .. } => ErrorCode::INACCESSIBLE,
            Self::StaticContext { .. } => ErrorCode::STATIC_CONTEXT,
            Self::NoApplicable { .. } => ErrorCode::NO_APPLICABLE_OVERLOAD,
        }
    }
}

/// Pick the overload of `name` that `args` select.
///
/// `receiver` is the static type the member is accessed through (or the
/// type being constructed); class type variables are resolved against it.
pub fn select<'a, S: Signature>(
    registry: &ClassRegistry,
    name: &str,
    candidates: &[(ClassId, &'a S)],
    args: &[Type],
    receiver: Option<&Type>,
    lookup: Lookup,
) -> Result<Selected<'a, S>, OverloadError> {
    if candidates.is_empty() {
        return Err(OverloadError::NoSuchMember {
            name: name.to_string(),
        });
    }
    let visible: Vec<_> = candidates
        .iter()
        .filter(|(_, s)| s.is_public() || !lookup.public_only)
        .collect();
    if visible.is_empty() {
        return Err(OverloadError::Inaccessible {
            name: name.to_string(),
        });
    }
    let usable: Vec<_> = visible
        .into_iter()
        .filter(|(_, s)| s.is_static() || !lookup.static_context)
        .collect();
    if usable.is_empty() {
        return Err(OverloadError::StaticContext {
            name: name.to_string(),
        });
    }

    let mut near_miss: Option<(usize, String)> = None;
    for &(owner, member) in usable {
        let bindings = infer(member.type_params(), member.params(), args);
        let params: Vec<Type> = member
            .params()
            .iter()
            .map(|t| match receiver {
                Some(r) => r.resolve(t, owner, &bindings, registry),
                None => t.substitute(&bindings),
            })
            .collect();
        match applicability(registry, &params, member.is_varargs(), args) {
            Ok(spread) => {
                trace!(name, owner = owner.0, spread, "overload selected");
                return Ok(Selected {
                    owner,
                    member,
                    params,
                    spread,
                    bindings,
                });
            }
            Err(matched) => {
                if near_miss.as_ref().map_or(true, |(best, _)| matched > *best) {
                    near_miss = Some((matched, describe(registry, &params)));
                }
            }
        }
    }
    Err(OverloadError::NoApplicable {
        name: name.to_string(),
        args: describe(registry, args),
        near_miss: near_miss.map(|(_, s)| s),
    })
}

/// `Ok(spread)` when `args` fit `params`, else the number of leading
/// arguments that did fit.
fn applicability(
    registry: &ClassRegistry,
    params: &[Type],
    varargs: bool,
    args: &[Type],
) -> Result<bool, usize> {
    let leading = params
        .iter()
        .zip(args)
        .take_while(|(p, a)| p.is_assignable_from(a, registry))
        .count();
    if args.len() == params.len() && leading == params.len() {
        return Ok(false);
    }
    if !varargs {
        return Err(leading);
    }
    let Some(fixed) = params.len().checked_sub(1) else {
        return Err(leading);
    };
    if args.len() < fixed || leading < fixed {
        return Err(leading);
    }
    let Some(element) = params[fixed].element() else {
        return Err(leading);
    };
    let spread = args[fixed..]
        .iter()
        .take_while(|a| element.is_assignable_from(a, registry))
        .count();
    if spread == args.len() - fixed {
        Ok(true)
    } else {
        Err(fixed + spread)
    }
}

/// Bind method type variables used directly as parameter types.
fn infer(type_params: &[TypeParam], params: &[Type], args: &[Type]) -> HashMap<String, Type> {
    let mut bindings = HashMap::new();
    for (param, arg) in params.iter().zip(args) {
        let Some(name) = param.var.as_deref() else {
            continue;
        };
        if param.base.is_some() || arg.is_null() || !type_params.iter().any(|t| t.name == name) {
            continue;
        }
        bindings
            .entry(name.to_string())
            .or_insert_with(|| arg.boxed());
    }
    bindings
}

fn describe(registry: &ClassRegistry, types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.display(registry))
        .collect::<Vec<_>>()
        .join(", ")
}
