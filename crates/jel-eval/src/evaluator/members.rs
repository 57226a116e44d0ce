//! Fields, method calls, constructors and script functions.

use std::collections::HashMap;
use std::rc::Rc;

use jel_model::{
    select, ArrayData, Class, ClassId, FieldDef, HostError, Invocation, Lookup, OverloadError,
    Selected, Type, Value,
};
use jel_types::ast::NodeId;
use jel_types::ErrorCode;

use super::{settle, Evaluated, Flow, Resolved, Run};
use crate::env::{Environment, Function, Variable};
use crate::error::EvalResult;

/// An evaluated call argument with the node it came from.
type Arg = (NodeId, Evaluated);

impl<'a> Run<'a> {
    fn lookup_mode(&self, static_context: bool) -> Lookup {
        Lookup {
            public_only: self.eval.options.public_only,
            static_context,
        }
    }

    fn cannot_dereference(&self, node: NodeId, ty: &Type) -> crate::EvalError {
        self.semantic(
            node,
            ErrorCode::BAD_OPERANDS,
            format!("{} cannot be dereferenced", self.show(ty)),
        )
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Fields
    // ══════════════════════════════════════════════════════════════════════════

    /// `target.name`, where the target may be a package, a type or a value.
    pub(super) fn field_access(
        &self,
        node: NodeId,
        name: &str,
        env: &Environment,
    ) -> EvalResult<Resolved> {
        let target = self.child(node, 0)?;
        match self.resolve_target(target, env)? {
            Resolved::Package(package) => {
                let full = format!("{package}.{name}");
                if let Some(id) = self.registry.lookup(&full) {
                    return Ok(Resolved::Type(Type::object(id)));
                }
                if self.registry.has_package(&full) {
                    return Ok(Resolved::Package(full));
                }
                Err(self.semantic(
                    node,
                    ErrorCode::UNKNOWN_TYPE,
                    format!("cannot find symbol: class {name} in package {package}"),
                ))
            }
            Resolved::Type(ty) => {
                let (owner, field) = self.static_field(node, &ty, name)?;
                self.read_field(node, owner, field, None, None)
                    .map(Resolved::Value)
            }
            Resolved::Value(target) => {
                if target.ty.upper().is_array() && name == "length" {
                    let value = if self.exec {
                        match self.value_of(&target) {
                            Value::Array(a) => {
                                Some(Value::Int(i32::try_from(a.len()).unwrap_or(i32::MAX)))
                            }
                            _ => {
                                return Err(self.null_pointer(
                                    node,
                                    "cannot read the array length of a null array",
                                ))
                            }
                        }
                    } else {
                        None
                    };
                    return Ok(Resolved::Value(Evaluated::new(Type::int(), value)));
                }
                let (owner, field) = self.instance_field(node, &target.ty, name)?;
                let receiver = self.exec.then(|| self.value_of(&target));
                self.read_field(node, owner, field, receiver, Some(&target.ty))
                    .map(Resolved::Value)
            }
        }
    }

    /// A static field of `ty`.
    pub(super) fn static_field(
        &self,
        node: NodeId,
        ty: &Type,
        name: &str,
    ) -> EvalResult<(ClassId, &'a FieldDef)> {
        let found = ty.class_id().and_then(|id| self.registry.field(id, name));
        match found {
            Some((owner, field)) if field.is_static => Ok((owner, field)),
            Some(_) => Err(self.semantic(
                node,
                ErrorCode::STATIC_CONTEXT,
                format!("non-static variable {name} cannot be referenced from a static context"),
            )),
            None => Err(self.semantic(
                node,
                ErrorCode::NO_SUCH_FIELD,
                format!("cannot find symbol: variable {name} in {}", self.show(ty)),
            )),
        }
    }

    /// A field read through a value of static type `ty`.
    pub(super) fn instance_field(
        &self,
        node: NodeId,
        ty: &Type,
        name: &str,
    ) -> EvalResult<(ClassId, &'a FieldDef)> {
        let upper = ty.upper();
        if upper.is_primitive() {
            return Err(self.cannot_dereference(node, ty));
        }
        let id = upper.class_id().unwrap_or(ClassId::OBJECT);
        self.registry.field(id, name).ok_or_else(|| {
            self.semantic(
                node,
                ErrorCode::NO_SUCH_FIELD,
                format!("cannot find symbol: variable {name} in {}", self.show(ty)),
            )
        })
    }

    pub(super) fn check_field_access(&self, node: NodeId, field: &FieldDef) -> EvalResult<()> {
        if self.eval.options.public_only && !field.public {
            return Err(self.semantic(
                node,
                ErrorCode::INACCESSIBLE,
                format!("{} is not public", field.name),
            ));
        }
        Ok(())
    }

    /// Declared field type, seen through the receiver's type arguments.
    pub(super) fn field_type(
        &self,
        owner: ClassId,
        field: &FieldDef,
        receiver_ty: Option<&Type>,
    ) -> Type {
        let ty = match receiver_ty {
            Some(receiver) if !field.is_static => {
                receiver
                    .upper()
                    .resolve(&field.ty, owner, &HashMap::new(), self.registry)
            }
            _ => field.ty.clone(),
        };
        settle(ty)
    }

    /// Run a field getter.
    pub(super) fn get_field(
        &self,
        node: NodeId,
        owner: ClassId,
        field: &FieldDef,
        receiver: Option<&Value>,
    ) -> EvalResult<Value> {
        let receiver = if field.is_static {
            None
        } else {
            match receiver {
                Some(v) if !v.is_null() => Some(v),
                _ => {
                    return Err(self.null_pointer(
                        node,
                        &format!("cannot read field \"{}\" because the value is null", field.name),
                    ))
                }
            }
        };
        (field.getter)(&Invocation {
            registry: self.registry,
            class: owner,
            receiver,
            args: &[],
        })
        .map_err(|e| self.throw(node, e))
    }

    pub(super) fn read_field(
        &self,
        node: NodeId,
        owner: ClassId,
        field: &'a FieldDef,
        receiver: Option<Value>,
        receiver_ty: Option<&Type>,
    ) -> EvalResult<Evaluated> {
        self.check_field_access(node, field)?;
        let ty = self.field_type(owner, field, receiver_ty);
        let value = if self.exec {
            let raw = self.get_field(node, owner, field, receiver.as_ref())?;
            Some(self.coerce(node, raw, &ty)?)
        } else {
            None
        };
        Ok(Evaluated::new(ty, value))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════════

    fn arguments(&self, nodes: &[NodeId], env: &Environment) -> EvalResult<Vec<Arg>> {
        nodes
            .iter()
            .map(|&n| Ok((n, self.operand(n, env)?)))
            .collect()
    }

    /// `name(args)` or `target.name(args)`. The target is evaluated before
    /// the arguments.
    pub(super) fn call(
        &self,
        node: NodeId,
        name: &str,
        qualified: bool,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let children = self.children(node);
        if qualified {
            let target = self.child(node, 0)?;
            let resolved = self.resolve_target(target, env)?;
            let args = self.arguments(&children[1..], env)?;
            return match resolved {
                Resolved::Type(ty) => self.invoke_method(node, name, &ty, None, &args, true),
                Resolved::Value(v) => {
                    let receiver = self.exec.then(|| self.value_of(&v));
                    self.invoke_method(node, name, &v.ty, receiver, &args, false)
                }
                Resolved::Package(package) => Err(self.semantic(
                    node,
                    ErrorCode::UNDECLARED,
                    format!("cannot find symbol: variable {package}"),
                )),
            };
        }
        let args = self.arguments(children, env)?;
        if let Some(function) = env.function(name) {
            return self.call_function(node, &function, &args, env);
        }
        let imported = env.static_imports().into_iter().find(|import| {
            import.member.as_deref().map_or(true, |m| m == name)
                && self
                    .registry
                    .methods(import.class, name)
                    .iter()
                    .any(|(_, m)| m.is_static)
        });
        if let Some(import) = imported {
            return self.invoke_method(node, name, &Type::object(import.class), None, &args, true);
        }
        Err(self.semantic(
            node,
            ErrorCode::NO_SUCH_METHOD,
            format!("cannot find symbol: method {name}"),
        ))
    }

    /// Call host method `name` through a receiver of static type
    /// `receiver_ty`. Instance methods dispatch on the receiver's runtime
    /// class.
    fn invoke_method(
        &self,
        node: NodeId,
        name: &str,
        receiver_ty: &Type,
        receiver: Option<Value>,
        args: &[Arg],
        static_context: bool,
    ) -> EvalResult<Evaluated> {
        let upper = receiver_ty.upper();
        if upper.is_primitive() {
            return Err(self.cannot_dereference(node, receiver_ty));
        }
        let id = upper.class_id().unwrap_or(ClassId::OBJECT);
        let candidates = self.registry.methods(id, name);
        let arg_types: Vec<Type> = args.iter().map(|(_, e)| e.ty.clone()).collect();
        let selected = select(
            self.registry,
            name,
            &candidates,
            &arg_types,
            Some(&upper),
            self.lookup_mode(static_context),
        )
        .map_err(|e| self.semantic(node, e.code(), e.to_string()))?;
        let method = selected.member;
        let ret = if method.is_static {
            method.ret.substitute(&selected.bindings)
        } else {
            upper.resolve(&method.ret, selected.owner, &selected.bindings, self.registry)
        };
        let ret = settle(ret);
        if !self.exec {
            return Ok(Evaluated::new(ret, None));
        }
        let packed = self.pack_args(&selected, args)?;
        let receiver = if method.is_static {
            None
        } else {
            match receiver {
                Some(v) if !v.is_null() => Some(v),
                _ => {
                    return Err(self.null_pointer(
                        node,
                        &format!("cannot invoke \"{name}()\" because the value is null"),
                    ))
                }
            }
        };
        let (owner, target) = match &receiver {
            Some(v) => self
                .registry
                .find_override(&v.runtime_class(), method)
                .unwrap_or((selected.owner, method)),
            None => (selected.owner, method),
        };
        let Some(invoke) = &target.invoke else {
            return Err(self.throw(
                node,
                HostError::new(
                    "java.lang.AbstractMethodError",
                    format!("{}.{name}", self.registry.name(owner)),
                ),
            ));
        };
        let result = invoke(&Invocation {
            registry: self.registry,
            class: owner,
            receiver: receiver.as_ref(),
            args: &packed,
        })
        .map_err(|e| self.throw(node, e))?;
        if ret.is_void() {
            return Ok(Evaluated::void());
        }
        let value = self.coerce(node, result, &ret)?;
        Ok(Evaluated::new(ret, Some(value)))
    }

    /// Argument values converted to their parameter types, with trailing
    /// varargs packed into an array.
    fn pack_args<S>(&self, selected: &Selected<'_, S>, args: &[Arg]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for (i, (arg_node, e)) in args.iter().enumerate() {
            let value = self.value_of(e);
            values.push(match selected.param_for(i) {
                Some(param) => self.coerce(*arg_node, value, &settle(param))?,
                None => value,
            });
        }
        if selected.spread {
            let last = selected.params.len().saturating_sub(1).min(values.len());
            let element = selected
                .params
                .last()
                .and_then(Type::element)
                .map(settle)
                .unwrap_or_else(Type::object_root);
            let rest = values.split_off(last);
            values.push(Value::Array(ArrayData::new(element.erasure(), rest)));
        }
        Ok(values)
    }

    /// `new T(args)`.
    pub(super) fn new_object(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let children = self.children(node);
        let ty = self.eval.resolve_type(self.ast, self.child(node, 0)?, env)?;
        let Some(id) = ty.class_id().filter(|_| !ty.is_array()) else {
            return Err(self.semantic(
                node,
                ErrorCode::TYPE_MISMATCH,
                format!("cannot instantiate {}", self.show(&ty)),
            ));
        };
        let def = self.registry.get(id);
        let simple = def.simple_name();
        if def.is_interface() {
            return Err(self.semantic(
                node,
                ErrorCode::NO_SUCH_CONSTRUCTOR,
                format!("{simple} is abstract; cannot be instantiated"),
            ));
        }
        let args = self.arguments(&children[1..], env)?;
        let candidates: Vec<_> = def.constructors.iter().map(|c| (id, c)).collect();
        let arg_types: Vec<Type> = args.iter().map(|(_, e)| e.ty.clone()).collect();
        let selected = select(
            self.registry,
            simple,
            &candidates,
            &arg_types,
            Some(&ty),
            self.lookup_mode(false),
        )
        .map_err(|e| match e {
            OverloadError::NoSuchMember { .. } => self.semantic(
                node,
                ErrorCode::NO_SUCH_CONSTRUCTOR,
                format!("{simple} has no constructors"),
            ),
            other => self.semantic(node, other.code(), other.to_string()),
        })?;
        if !self.exec {
            return Ok(Evaluated::new(ty, None));
        }
        let packed = self.pack_args(&selected, &args)?;
        let value = (selected.member.invoke)(&Invocation {
            registry: self.registry,
            class: id,
            receiver: None,
            args: &packed,
        })
        .map_err(|e| self.throw(node, e))?;
        Ok(Evaluated::new(ty, Some(value)))
    }

    /// Dynamically dispatched zero-argument call, as `for` loops use on
    /// iterables.
    pub(super) fn call_virtual(
        &self,
        node: NodeId,
        receiver: &Value,
        name: &str,
    ) -> EvalResult<Value> {
        let runtime = receiver.runtime_class();
        let id = match runtime {
            Class::Object(id) => id,
            _ => ClassId::OBJECT,
        };
        let found = self
            .registry
            .methods(id, name)
            .into_iter()
            .find(|(_, m)| m.params.is_empty() && !m.is_static)
            .and_then(|(_, m)| self.registry.find_override(&runtime, m));
        let found = found.and_then(|(owner, m)| Some((owner, m.invoke.as_ref()?)));
        let Some((owner, invoke)) = found else {
            return Err(self.throw(node, HostError::new("java.lang.NoSuchMethodError", name)));
        };
        invoke(&Invocation {
            registry: self.registry,
            class: owner,
            receiver: Some(receiver),
            args: &[],
        })
        .map_err(|e| self.throw(node, e))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Script functions
    // ══════════════════════════════════════════════════════════════════════════

    /// Whether `args` fit `function`, and if so whether the trailing ones
    /// are packed into its varargs array.
    fn function_fit(&self, function: &Function, args: &[Arg]) -> Option<bool> {
        let params = &function.params;
        let exact = args.len() == params.len()
            && params
                .iter()
                .zip(args)
                .all(|(p, (n, e))| self.accepts(&p.ty, &e.ty, *n));
        if exact {
            return Some(false);
        }
        if !function.varargs {
            return None;
        }
        let fixed = params.len().saturating_sub(1);
        let element = params.last().and_then(|p| p.ty.element())?;
        let spread = args.len() >= fixed
            && args.iter().enumerate().all(|(i, (n, e))| {
                let target = if i < fixed { &params[i].ty } else { &element };
                self.accepts(target, &e.ty, *n)
            });
        spread.then_some(true)
    }

    /// Call a script function. The body runs in a fresh independent scope
    /// holding the parameters.
    pub(super) fn call_function(
        &self,
        node: NodeId,
        function: &Rc<Function>,
        args: &[Arg],
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let Some(spread) = self.function_fit(function, args) else {
            let required: Vec<String> = function.params.iter().map(|p| self.show(&p.ty)).collect();
            let found: Vec<String> = args.iter().map(|(_, e)| self.show(&e.ty)).collect();
            return Err(self.semantic(
                node,
                ErrorCode::NO_APPLICABLE_OVERLOAD,
                format!(
                    "method {} cannot be applied to given types; required: {}; found: {}",
                    function.name,
                    required.join(","),
                    found.join(",")
                ),
            ));
        };
        if !self.exec {
            return Ok(Evaluated::new(function.ret.clone(), None));
        }
        if self.depth >= self.eval.options.max_call_depth {
            return Err(self.throw(
                node,
                HostError::new("java.lang.StackOverflowError", function.name.clone()),
            ));
        }

        let params = &function.params;
        let fixed = if spread { params.len() - 1 } else { params.len() };
        let mut values = Vec::with_capacity(params.len());
        for (param, (n, e)) in params.iter().zip(args).take(fixed) {
            values.push(self.coerce(*n, self.value_of(e), &param.ty)?);
        }
        if spread {
            let element = params
                .last()
                .and_then(|p| p.ty.element())
                .unwrap_or_else(Type::object_root);
            let mut rest = Vec::new();
            for (n, e) in &args[fixed..] {
                rest.push(self.coerce(*n, self.value_of(e), &element)?);
            }
            values.push(Value::Array(ArrayData::new(element.erasure(), rest)));
        }

        let scope = env.scope(false);
        scope.set_return_type(function.ret.clone());
        for (param, value) in params.iter().zip(values) {
            // Parameters hide captured finals of the same name.
            let _ = scope.drop(&param.name);
            let mut var =
                Variable::new(param.name.clone(), param.ty.clone()).with_value(Some(value));
            if param.is_final {
                var = var.final_var();
            }
            scope.declare(var).map_err(|e| self.env_error(node, e))?;
        }

        let Some(body) = function.body() else {
            return Ok(Evaluated::void());
        };
        let run = Run::new(self.eval, &function.ast, true, self.depth + 1);
        match run.stmt(body, &scope)? {
            Flow::Return(value) if !function.ret.is_void() => {
                Ok(Evaluated::new(function.ret.clone(), value))
            }
            Flow::Return(_) | Flow::Normal if function.ret.is_void() => Ok(Evaluated::void()),
            _ => Err(self.semantic(
                node,
                ErrorCode::MISPLACED_JUMP,
                format!("missing return statement in {}", function.name),
            )),
        }
    }
}
