//! Expressions: literals, operators, arrays, casts and assignment.

use jel_model::{
    ArrayData, ArrayRef, ClassId, FieldDef, HostError, Invocation, Primitive, Type, Value,
};
use jel_types::ast::{AssignOp, BinaryOp, Literal, NodeId, NodeKind, StepOp, UnaryOp};
use jel_types::ErrorCode;

use super::{operators, settle, Evaluated, Resolved, Run};
use crate::env::Environment;
use crate::error::EvalResult;

/// Something an assignment can store into.
enum Place<'r> {
    Variable {
        name: String,
        ty: Type,
    },
    Element {
        array: Option<ArrayRef>,
        index: i64,
        ty: Type,
    },
    Field {
        owner: ClassId,
        field: &'r FieldDef,
        receiver: Option<Value>,
        ty: Type,
    },
}

impl Place<'_> {
    fn ty(&self) -> &Type {
        match self {
            Place::Variable { ty, .. } | Place::Element { ty, .. } | Place::Field { ty, .. } => ty,
        }
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Int(_) => Type::int(),
        Literal::Long(_) => Type::primitive(Primitive::Long),
        Literal::Float(_) => Type::primitive(Primitive::Float),
        Literal::Double(_) => Type::primitive(Primitive::Double),
        Literal::Char(_) => Type::primitive(Primitive::Char),
        Literal::Str(_) => Type::string(),
        Literal::Bool(_) => Type::boolean(),
        Literal::Null => Type::null(),
    }
}

impl<'a> Run<'a> {
    pub(super) fn expr(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        match self.kind(node) {
            NodeKind::Literal(literal) => Ok(Evaluated::new(
                literal_type(literal),
                self.exec.then(|| Value::from_literal(literal)),
            )),
            NodeKind::Name(name) => match self.resolve_name(node, name, env)? {
                Resolved::Value(v) => Ok(v),
                _ => Err(self.semantic(
                    node,
                    ErrorCode::UNDECLARED,
                    format!("cannot find symbol: variable {name}"),
                )),
            },
            NodeKind::Field(name) => match self.field_access(node, name, env)? {
                Resolved::Value(v) => Ok(v),
                _ => Err(self.semantic(
                    node,
                    ErrorCode::UNDECLARED,
                    format!("cannot find symbol: variable {name}"),
                )),
            },
            NodeKind::Call { name, qualified } => self.call(node, name, *qualified, env),
            NodeKind::Index => self.index(node, env),
            NodeKind::New => self.new_object(node, env),
            NodeKind::NewArray { dims } => self.new_array(node, *dims, env),
            NodeKind::ArrayInit => Err(self.semantic(
                node,
                ErrorCode::TYPE_MISMATCH,
                "illegal initializer; an array initializer needs an array type",
            )),
            NodeKind::ClassLiteral => self.class_literal(node, env),
            NodeKind::Binary(op) => self.binary(node, *op, env),
            NodeKind::Unary(op) => self.unary(node, *op, env),
            NodeKind::Step { op, prefix } => self.step(node, *op, *prefix, env),
            NodeKind::Assign(op) => self.assign(node, *op, env),
            NodeKind::Conditional => self.conditional(node, env),
            NodeKind::Cast => self.cast(node, env),
            NodeKind::InstanceOf => self.instance_of(node, env),
            other => Err(self.semantic(
                node,
                ErrorCode::UNEXPECTED_INPUT,
                format!("{} is not an expression", other.label()),
            )),
        }
    }

    /// An expression whose value is used, so it may not be `void`.
    pub(super) fn operand(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let e = self.expr(node, env)?;
        if e.ty.is_void() {
            return Err(self.semantic(node, ErrorCode::VOID_VALUE, "'void' type not allowed here"));
        }
        Ok(e)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Operators
    // ══════════════════════════════════════════════════════════════════════════

    fn bad_operands(
        &self,
        node: NodeId,
        op: BinaryOp,
        left: &Type,
        right: &Type,
    ) -> crate::EvalError {
        self.semantic(
            node,
            ErrorCode::BAD_OPERANDS,
            format!(
                "bad operand types for binary operator '{}': {} and {}",
                op.symbol(),
                self.show(left),
                self.show(right)
            ),
        )
    }

    fn binary(&self, node: NodeId, op: BinaryOp, env: &Environment) -> EvalResult<Evaluated> {
        let left = self.operand(self.child(node, 0)?, env)?;
        let right_node = self.child(node, 1)?;
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.short_circuit(node, op, left, right_node, env);
        }
        let right = self.operand(right_node, env)?;
        self.combine(node, op, &left, &right)
    }

    /// `left op right` once both operands are known.
    fn combine(
        &self,
        node: NodeId,
        op: BinaryOp,
        left: &Evaluated,
        right: &Evaluated,
    ) -> EvalResult<Evaluated> {
        if op == BinaryOp::Add && (left.ty.is_string() || right.ty.is_string()) {
            return self.concat(node, left, right);
        }
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne)
            && left.ty.is_reference()
            && right.ty.is_reference()
        {
            return self.reference_equality(node, op, left, right);
        }
        let kinds = left.ty.unboxed().zip(right.ty.unboxed());
        let Some(result) = kinds.and_then(|(a, b)| operators::binary_type(op, a, b)) else {
            return Err(self.bad_operands(node, op, &left.ty, &right.ty));
        };
        let ty = Type::primitive(result);
        if !self.exec {
            return Ok(Evaluated::new(ty, None));
        }
        let value = operators::binary(op, &self.value_of(left), &self.value_of(right))
            .map_err(|e| self.throw(node, e))?;
        Ok(Evaluated::new(ty, Some(value)))
    }

    fn concat(&self, node: NodeId, left: &Evaluated, right: &Evaluated) -> EvalResult<Evaluated> {
        if !self.exec {
            return Ok(Evaluated::new(Type::string(), None));
        }
        let display = |e: &Evaluated| {
            self.registry
                .to_display(&self.value_of(e))
                .map_err(|err| self.throw(node, err))
        };
        let text = display(left)? + &display(right)?;
        Ok(Evaluated::new(Type::string(), Some(Value::from(text))))
    }

    /// `==` and `!=` between references compare identity.
    fn reference_equality(
        &self,
        node: NodeId,
        op: BinaryOp,
        left: &Evaluated,
        right: &Evaluated,
    ) -> EvalResult<Evaluated> {
        let comparable = left.ty.is_castable_to(&right.ty, self.registry)
            || right.ty.is_castable_to(&left.ty, self.registry);
        if !comparable {
            return Err(self.semantic(
                node,
                ErrorCode::BAD_OPERANDS,
                format!(
                    "incomparable types: {} and {}",
                    self.show(&left.ty),
                    self.show(&right.ty)
                ),
            ));
        }
        let value = self.exec.then(|| {
            let same = self.value_of(left).identical(&self.value_of(right));
            Value::Boolean(same == (op == BinaryOp::Eq))
        });
        Ok(Evaluated::new(Type::boolean(), value))
    }

    /// `&&` and `||`. The right operand is always checked but only run
    /// when the left one does not decide the result.
    fn short_circuit(
        &self,
        node: NodeId,
        op: BinaryOp,
        left: Evaluated,
        right_node: NodeId,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let check = |l: &Type, r: &Type| {
            if l.unboxed() == Some(Primitive::Boolean) && r.unboxed() == Some(Primitive::Boolean) {
                Ok(())
            } else {
                Err(self.bad_operands(node, op, l, r))
            }
        };
        if self.exec && left.ty.unboxed() == Some(Primitive::Boolean) {
            let decided = op == BinaryOp::Or;
            let l = self.truth(node, &left)?;
            if l == decided {
                let right = self.checker().operand(right_node, &env.transact())?;
                check(&left.ty, &right.ty)?;
                return Ok(Evaluated::new(Type::boolean(), Some(Value::Boolean(l))));
            }
        }
        let right = self.operand(right_node, env)?;
        check(&left.ty, &right.ty)?;
        let value = if self.exec {
            Some(Value::Boolean(self.truth(node, &right)?))
        } else {
            None
        };
        Ok(Evaluated::new(Type::boolean(), value))
    }

    fn unary(&self, node: NodeId, op: UnaryOp, env: &Environment) -> EvalResult<Evaluated> {
        let operand = self.operand(self.child(node, 0)?, env)?;
        let Some(result) = operand
            .ty
            .unboxed()
            .and_then(|p| operators::unary_type(op, p))
        else {
            return Err(self.semantic(
                node,
                ErrorCode::BAD_OPERANDS,
                format!(
                    "bad operand type {} for unary operator '{}'",
                    self.show(&operand.ty),
                    op.symbol()
                ),
            ));
        };
        let value = if self.exec {
            Some(operators::unary(op, &self.value_of(&operand)).map_err(|e| self.throw(node, e))?)
        } else {
            None
        };
        Ok(Evaluated::new(Type::primitive(result), value))
    }

    fn conditional(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let cond_node = self.child(node, 0)?;
        let (then_node, else_node) = (self.child(node, 1)?, self.child(node, 2)?);
        let cond = self.operand(cond_node, env)?;
        self.require_boolean(cond_node, &cond.ty)?;
        if !self.exec {
            let a = self.operand(then_node, env)?;
            let b = self.operand(else_node, env)?;
            let ty = self.conditional_type(node, &a.ty, &b.ty)?;
            return Ok(Evaluated::new(ty, None));
        }
        let taken = self.truth(cond_node, &cond)?;
        let (live, dead) = if taken {
            (then_node, else_node)
        } else {
            (else_node, then_node)
        };
        let dead_ty = self.checker().operand(dead, &env.transact())?.ty;
        let live = self.operand(live, env)?;
        let ty = if taken {
            self.conditional_type(node, &live.ty, &dead_ty)?
        } else {
            self.conditional_type(node, &dead_ty, &live.ty)?
        };
        let value = self.coerce(node, self.value_of(&live), &ty)?;
        Ok(Evaluated::new(ty, Some(value)))
    }

    /// Result type of `c ? a : b`.
    fn conditional_type(&self, node: NodeId, a: &Type, b: &Type) -> EvalResult<Type> {
        if let (Some(x), Some(y)) = (a.unboxed(), b.unboxed()) {
            if x == y {
                return Ok(if a.is_primitive() || b.is_primitive() {
                    Type::primitive(x)
                } else {
                    a.clone()
                });
            }
            if x.is_numeric() && y.is_numeric() {
                let wider = if x.widens_to(y) {
                    Some(y)
                } else if y.widens_to(x) {
                    Some(x)
                } else {
                    x.promote(y)
                };
                if let Some(p) = wider {
                    return Ok(Type::primitive(p));
                }
            }
        }
        a.common_type(b, self.registry).ok_or_else(|| {
            self.semantic(
                node,
                ErrorCode::NO_COMMON_TYPE,
                format!(
                    "incompatible types in conditional expression: {} and {}",
                    self.show(a),
                    self.show(b)
                ),
            )
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Types at runtime
    // ══════════════════════════════════════════════════════════════════════════

    fn cast(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let target = self.eval.resolve_type(self.ast, self.child(node, 0)?, env)?;
        let source = self.operand(self.child(node, 1)?, env)?;
        if !source.ty.is_castable_to(&target, self.registry) {
            return Err(self.semantic(
                node,
                ErrorCode::INVALID_CAST,
                format!(
                    "incompatible types: {} cannot be converted to {}",
                    self.show(&source.ty),
                    self.show(&target)
                ),
            ));
        }
        let value = if self.exec {
            Some(self.cast_value(node, self.value_of(&source), &target)?)
        } else {
            None
        };
        Ok(Evaluated::new(target, value))
    }

    /// Runtime half of a cast: primitive conversion or a class check.
    fn cast_value(&self, node: NodeId, value: Value, target: &Type) -> EvalResult<Value> {
        if value.is_null() {
            if target.is_primitive() {
                return Err(self.null_pointer(node, "cannot unbox a null value"));
            }
            return Ok(value);
        }
        if let (Some(p), Some(_)) = (target.unboxed(), value.primitive()) {
            if let Some(converted) = value.convert(p) {
                if target.is_primitive() || converted.runtime_class() == value.runtime_class() {
                    return Ok(converted);
                }
            }
        }
        let class = target.erasure();
        let runtime = value.runtime_class();
        if class.is_assignable_from(&runtime, self.registry) {
            return Ok(value);
        }
        Err(self.throw(
            node,
            HostError::class_cast(format!(
                "class {} cannot be cast to class {}",
                runtime.name(self.registry),
                class.name(self.registry)
            )),
        ))
    }

    fn instance_of(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let source = self.operand(self.child(node, 0)?, env)?;
        let target = self.eval.resolve_type(self.ast, self.child(node, 1)?, env)?;
        if source.ty.is_primitive() || target.is_primitive() {
            let found = if source.ty.is_primitive() { &source.ty } else { &target };
            return Err(self.semantic(
                node,
                ErrorCode::BAD_OPERANDS,
                format!("unexpected type; required: reference, found: {}", self.show(found)),
            ));
        }
        if !source.ty.is_castable_to(&target, self.registry) {
            return Err(self.semantic(
                node,
                ErrorCode::INVALID_CAST,
                format!(
                    "incompatible types: {} cannot be converted to {}",
                    self.show(&source.ty),
                    self.show(&target)
                ),
            ));
        }
        let value = self.exec.then(|| {
            let v = self.value_of(&source);
            Value::Boolean(
                !v.is_null()
                    && target
                        .erasure()
                        .is_assignable_from(&v.runtime_class(), self.registry),
            )
        });
        Ok(Evaluated::new(Type::boolean(), value))
    }

    fn class_literal(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let ty = self.eval.resolve_type(self.ast, self.child(node, 0)?, env)?;
        let param = if ty.is_void() {
            Type::object_root()
        } else {
            ty.boxed()
        };
        let value = self.exec.then(|| Value::Class(ty.erasure()));
        Ok(Evaluated::new(Type::generic(ClassId::CLASS, vec![param]), value))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Arrays
    // ══════════════════════════════════════════════════════════════════════════

    /// An array index: any integral type that promotes to `int`.
    fn require_index(&self, node: NodeId, ty: &Type) -> EvalResult<()> {
        match ty.unboxed().and_then(Primitive::promote_unary) {
            Some(Primitive::Int) => Ok(()),
            _ => Err(self.semantic(
                node,
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "incompatible types: {} cannot be converted to int",
                    self.show(ty)
                ),
            )),
        }
    }

    fn array_ref(&self, node: NodeId, e: &Evaluated) -> EvalResult<ArrayRef> {
        match self.value_of(e) {
            Value::Array(a) => Ok(a),
            _ => Err(self.null_pointer(node, "cannot access an element of a null array")),
        }
    }

    fn out_of_bounds(&self, node: NodeId, index: i64, len: usize) -> crate::EvalError {
        self.throw(
            node,
            HostError::new(
                "java.lang.ArrayIndexOutOfBoundsException",
                format!("Index {index} out of bounds for length {len}"),
            ),
        )
    }

    /// Array and index operands of `a[i]`, with the element type.
    fn element_parts(
        &self,
        node: NodeId,
        env: &Environment,
    ) -> EvalResult<(Option<ArrayRef>, i64, Type)> {
        let array_node = self.child(node, 0)?;
        let index_node = self.child(node, 1)?;
        let array = self.operand(array_node, env)?;
        let Some(element) = array.ty.upper().element() else {
            return Err(self.semantic(
                array_node,
                ErrorCode::NOT_AN_ARRAY,
                format!("array required, but {} found", self.show(&array.ty)),
            ));
        };
        let index = self.operand(index_node, env)?;
        self.require_index(index_node, &index.ty)?;
        if !self.exec {
            return Ok((None, 0, element));
        }
        let data = self.array_ref(node, &array)?;
        let i = self
            .value_of(&index)
            .as_i64()
            .ok_or_else(|| self.null_pointer(index_node, "cannot unbox a null value"))?;
        Ok((Some(data), i, element))
    }

    fn load(&self, node: NodeId, array: &ArrayRef, index: i64) -> EvalResult<Value> {
        usize::try_from(index)
            .ok()
            .and_then(|i| array.get(i))
            .ok_or_else(|| self.out_of_bounds(node, index, array.len()))
    }

    fn index(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        let (array, index, element) = self.element_parts(node, env)?;
        let value = match array {
            Some(a) => Some(self.load(node, &a, index)?),
            None => None,
        };
        Ok(Evaluated::new(element, value))
    }

    fn new_array(&self, node: NodeId, dims: usize, env: &Environment) -> EvalResult<Evaluated> {
        let children = self.children(node);
        let element = self.eval.resolve_type(self.ast, self.child(node, 0)?, env)?;
        if element.is_void() {
            return Err(self.semantic(
                node,
                ErrorCode::TYPE_MISMATCH,
                "'void' type not allowed here",
            ));
        }
        let ty = element.array_of(dims);
        let rest = &children[1..];
        if let Some((&last, sizes)) = rest.split_last() {
            if matches!(self.kind(last), NodeKind::ArrayInit) {
                if !sizes.is_empty() {
                    return Err(self.semantic(
                        node,
                        ErrorCode::UNEXPECTED_INPUT,
                        "array creation with both dimension expression and initialization is illegal",
                    ));
                }
                return self.array_init(last, &ty, env);
            }
        }
        let mut lengths = Vec::with_capacity(rest.len());
        for &size_node in rest {
            let size = self.operand(size_node, env)?;
            self.require_index(size_node, &size.ty)?;
            if self.exec {
                let n = self
                    .value_of(&size)
                    .as_i64()
                    .ok_or_else(|| self.null_pointer(size_node, "cannot unbox a null value"))?;
                let n = usize::try_from(n).map_err(|_| {
                    self.throw(
                        size_node,
                        HostError::new("java.lang.NegativeArraySizeException", n.to_string()),
                    )
                })?;
                lengths.push(n);
            }
        }
        let value = self.exec.then(|| build_array(&ty, &lengths));
        Ok(Evaluated::new(ty, value))
    }

    /// `{a, b, ...}` for an array of type `ty`.
    pub(super) fn array_init(
        &self,
        node: NodeId,
        ty: &Type,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let Some(element) = ty.element() else {
            return Err(self.semantic(
                node,
                ErrorCode::TYPE_MISMATCH,
                format!("illegal initializer for {}", self.show(ty)),
            ));
        };
        let mut items = Vec::new();
        for &item in self.children(node) {
            let e = if matches!(self.kind(item), NodeKind::ArrayInit) {
                self.array_init(item, &element, env)?
            } else {
                let e = self.operand(item, env)?;
                self.check_assignable(item, &element, &e.ty)?;
                e
            };
            if self.exec {
                items.push(self.coerce(item, self.value_of(&e), &element)?);
            }
        }
        let value = self
            .exec
            .then(|| Value::Array(ArrayData::new(element.erasure(), items)));
        Ok(Evaluated::new(ty.clone(), value))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Assignment
    // ══════════════════════════════════════════════════════════════════════════

    fn place(&self, node: NodeId, env: &Environment) -> EvalResult<Place<'a>> {
        match self.kind(node) {
            NodeKind::Name(name) => {
                if let Some(var) = env.lookup(name) {
                    return Ok(Place::Variable {
                        name: name.clone(),
                        ty: var.ty,
                    });
                }
                if let Some((owner, field)) = self.static_import_field(name, env) {
                    return self.field_place(node, owner, field, None, None);
                }
                Err(self.semantic(
                    node,
                    ErrorCode::UNDECLARED,
                    format!("cannot find symbol: variable {name}"),
                ))
            }
            NodeKind::Field(name) => {
                let target = self.child(node, 0)?;
                match self.resolve_target(target, env)? {
                    Resolved::Type(t) => {
                        let (owner, field) = self.static_field(node, &t, name)?;
                        self.field_place(node, owner, field, None, None)
                    }
                    Resolved::Value(v) => {
                        if v.ty.is_array() && name == "length" {
                            return Err(self.semantic(
                                node,
                                ErrorCode::FINAL_REASSIGNED,
                                "cannot assign a value to final variable length",
                            ));
                        }
                        let (owner, field) = self.instance_field(node, &v.ty, name)?;
                        let receiver = self.exec.then(|| self.value_of(&v));
                        self.field_place(node, owner, field, receiver, Some(&v.ty))
                    }
                    Resolved::Package(p) => Err(self.semantic(
                        node,
                        ErrorCode::UNDECLARED,
                        format!("cannot find symbol: {p}.{name}"),
                    )),
                }
            }
            NodeKind::Index => {
                let (array, index, ty) = self.element_parts(node, env)?;
                Ok(Place::Element { array, index, ty })
            }
            other => Err(self.semantic(
                node,
                ErrorCode::NOT_ASSIGNABLE,
                format!("unexpected type; required: variable, found: {}", other.label()),
            )),
        }
    }

    fn field_place(
        &self,
        node: NodeId,
        owner: ClassId,
        field: &'a FieldDef,
        receiver: Option<Value>,
        receiver_ty: Option<&Type>,
    ) -> EvalResult<Place<'a>> {
        self.check_field_access(node, field)?;
        if field.is_final || field.setter.is_none() {
            return Err(self.semantic(
                node,
                ErrorCode::FINAL_REASSIGNED,
                format!("cannot assign a value to final variable {}", field.name),
            ));
        }
        Ok(Place::Field {
            owner,
            field,
            receiver,
            ty: self.field_type(owner, field, receiver_ty),
        })
    }

    fn read_place(
        &self,
        node: NodeId,
        place: &Place<'a>,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        match place {
            Place::Variable { name, .. } => self.expr_name(node, name, env),
            Place::Element { array, index, ty } => {
                let value = match array {
                    Some(a) => Some(self.load(node, a, *index)?),
                    None if self.exec => return Err(self.null_pointer(node, "array is null")),
                    None => None,
                };
                Ok(Evaluated::new(ty.clone(), value))
            }
            Place::Field {
                owner,
                field,
                receiver,
                ty,
            } => {
                let value = if self.exec {
                    Some(self.get_field(node, *owner, field, receiver.as_ref())?)
                } else {
                    None
                };
                Ok(Evaluated::new(ty.clone(), value))
            }
        }
    }

    fn expr_name(&self, node: NodeId, name: &str, env: &Environment) -> EvalResult<Evaluated> {
        match self.resolve_name(node, name, env)? {
            Resolved::Value(v) => Ok(v),
            _ => Err(self.semantic(
                node,
                ErrorCode::UNDECLARED,
                format!("cannot find symbol: variable {name}"),
            )),
        }
    }

    fn write_place(
        &self,
        node: NodeId,
        place: &Place<'a>,
        value: Option<Value>,
        env: &Environment,
    ) -> EvalResult<()> {
        match place {
            Place::Variable { name, ty } => env
                .set(name, ty, value)
                .map_err(|e| self.env_error(node, e)),
            Place::Element { array, index, .. } => {
                let (Some(array), Some(value)) = (array, value) else {
                    return Ok(());
                };
                if array.element.is_reference() && !value.is_null() {
                    let runtime = value.runtime_class();
                    if !array.element.is_assignable_from(&runtime, self.registry) {
                        return Err(self.throw(
                            node,
                            HostError::new(
                                "java.lang.ArrayStoreException",
                                runtime.name(self.registry),
                            ),
                        ));
                    }
                }
                let stored = usize::try_from(*index)
                    .ok()
                    .is_some_and(|i| array.set(i, value));
                if !stored {
                    return Err(self.out_of_bounds(node, *index, array.len()));
                }
                Ok(())
            }
            Place::Field {
                owner,
                field,
                receiver,
                ..
            } => {
                let (Some(value), Some(set)) = (value, field.setter.as_ref()) else {
                    return Ok(());
                };
                if !field.is_static && receiver.as_ref().map_or(true, Value::is_null) {
                    return Err(self.null_pointer(node, "cannot assign a field of a null object"));
                }
                let receiver = if field.is_static { None } else { receiver.as_ref() };
                set(
                    &Invocation {
                        registry: self.registry,
                        class: *owner,
                        receiver,
                        args: &[],
                    },
                    value,
                )
                .map_err(|e| self.throw(node, e))
            }
        }
    }

    fn assign(&self, node: NodeId, op: AssignOp, env: &Environment) -> EvalResult<Evaluated> {
        let target = self.child(node, 0)?;
        let source = self.child(node, 1)?;
        let place = self.place(target, env)?;
        let ty = settle(place.ty().clone());
        let stored = match op {
            AssignOp::Assign => {
                let value = self.operand(source, env)?;
                self.check_assignable(source, &ty, &value.ty)?;
                if self.exec {
                    Some(self.coerce(source, self.value_of(&value), &ty)?)
                } else {
                    None
                }
            }
            AssignOp::Compound(bop) => {
                let current = self.read_place(target, &place, env)?;
                let rhs = self.operand(source, env)?;
                let result = self.combine(node, bop, &current, &rhs)?;
                if !result.ty.is_castable_to(&ty, self.registry) {
                    return Err(self.semantic(
                        node,
                        ErrorCode::TYPE_MISMATCH,
                        format!(
                            "incompatible types: {} cannot be converted to {}",
                            self.show(&result.ty),
                            self.show(&ty)
                        ),
                    ));
                }
                match result.value {
                    Some(v) => Some(self.cast_value(node, v, &ty)?),
                    None => None,
                }
            }
        };
        self.write_place(node, &place, stored.clone(), env)?;
        Ok(Evaluated::new(ty, stored))
    }

    fn step(
        &self,
        node: NodeId,
        op: StepOp,
        prefix: bool,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let target = self.child(node, 0)?;
        let place = self.place(target, env)?;
        let current = self.read_place(target, &place, env)?;
        if !current.ty.unboxed().is_some_and(Primitive::is_numeric) {
            let symbol = if op == StepOp::Increment { "++" } else { "--" };
            return Err(self.semantic(
                node,
                ErrorCode::BAD_OPERANDS,
                format!(
                    "bad operand type {} for unary operator '{symbol}'",
                    self.show(&current.ty)
                ),
            ));
        }
        let ty = current.ty.clone();
        if !self.exec {
            self.write_place(node, &place, None, env)?;
            return Ok(Evaluated::new(ty, None));
        }
        let old = self.value_of(&current);
        let delta = if op == StepOp::Increment { 1 } else { -1 };
        let new = operators::step(&old, delta).map_err(|e| self.throw(node, e))?;
        self.write_place(node, &place, Some(new.clone()), env)?;
        Ok(Evaluated::new(ty, Some(if prefix { new } else { old })))
    }
}

/// A fresh multi-dimensional array. Dimensions without a length stay null.
fn build_array(ty: &Type, lengths: &[usize]) -> Value {
    let (Some(element), Some((&len, rest))) = (ty.element(), lengths.split_first()) else {
        return Value::Null;
    };
    let items = (0..len)
        .map(|_| {
            if rest.is_empty() {
                Value::default_for(&element.erasure())
            } else {
                build_array(&element, rest)
            }
        })
        .collect();
    Value::Array(ArrayData::new(element.erasure(), items))
}
