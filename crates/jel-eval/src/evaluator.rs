//! Validating tree-walking evaluator.
//!
//! One walk serves both modes. With values off, every node is type
//! checked and scoped inside a throwaway transaction, so validation can
//! never mutate the environment. With values on, the same checks run and
//! values and mutations are produced; branches that are not taken are
//! still checked, without running them.

mod members;
mod operators;
mod statements;
mod expressions;

use std::cell::Cell;
use std::rc::Rc;

use jel_model::{lang, ClassId, ClassRegistry, HostError, Primitive, Type, Value};
use jel_types::ast::{Ast, Literal, NodeId, NodeKind};
use jel_types::ErrorCode;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::env::{EnvError, Environment};
use crate::error::{EvalError, EvalResult};

/// Knobs for one evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Hide non-public host members.
    pub public_only: bool,
    /// Abort any single loop after this many iterations.
    pub max_loop_iterations: Option<u64>,
    /// Deepest allowed nesting of script function calls.
    pub max_call_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            public_only: true,
            max_loop_iterations: None,
            max_call_depth: 64,
        }
    }
}

/// Static type of a node and, when values were requested, its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub ty: Type,
    /// `None` while validating and for `void` results.
    pub value: Option<Value>,
}

impl Evaluated {
    pub fn new(ty: Type, value: Option<Value>) -> Self {
        Self { ty, value }
    }

    pub fn void() -> Self {
        Self::new(Type::void(), None)
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Option<Value>),
}

/// What a name or dotted path denotes.
#[derive(Debug, Clone)]
enum Resolved {
    Value(Evaluated),
    Type(Type),
    Package(String),
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: Rc<ClassRegistry>,
    options: EvalOptions,
}

impl Evaluator {
    pub fn new(registry: Rc<ClassRegistry>, options: EvalOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Rc<ClassRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Check, and optionally run, one node of `ast` in `env`.
    ///
    /// With `as_type`, the result must be assignable to that type and is
    /// converted to it. A top-level expression statement run with values
    /// appends its result to the history.
    pub fn evaluate(
        &self,
        ast: &Rc<Ast>,
        node: NodeId,
        env: &Environment,
        as_type: Option<&Type>,
        with_values: bool,
    ) -> EvalResult<Evaluated> {
        let kind = ast.kind(node);
        trace!(kind = kind.label(), with_values, "evaluate");
        let scope = if with_values {
            env.clone()
        } else {
            env.transact()
        };
        let run = Run::new(self, ast, with_values, 0);
        run.poll(node, &scope)?;
        let mut result = if kind.is_statement() {
            run.top_level(node, &scope)?
        } else {
            run.expr(node, &scope)?
        };
        if let Some(target) = as_type {
            let expr = match kind {
                NodeKind::ExprStmt => ast.child(node, 0).unwrap_or(node),
                _ => node,
            };
            run.check_assignable(expr, target, &result.ty)?;
            if let Some(value) = result.value.take() {
                result.value = Some(run.coerce(expr, value, target)?);
            }
            result.ty = target.clone();
        }
        if with_values && matches!(kind, NodeKind::ExprStmt) {
            if let Some(value) = &result.value {
                env.add_history(value.clone());
            }
        }
        Ok(result)
    }

    /// Type check `node` without running it or touching `env`.
    pub fn validate(
        &self,
        ast: &Rc<Ast>,
        node: NodeId,
        env: &Environment,
        as_type: Option<&Type>,
    ) -> EvalResult<Type> {
        self.evaluate(ast, node, env, as_type, false)
            .map(|e| e.ty)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Types and class names
    // ══════════════════════════════════════════════════════════════════════════

    /// The class a type name denotes in `env`: the literal name, then
    /// single-type imports, package imports and finally `java.lang`.
    pub fn find_class(&self, name: &str, env: &Environment) -> Option<ClassId> {
        if let Some(id) = self.registry.lookup(name) {
            return Some(id);
        }
        if name.contains('.') {
            return None;
        }
        env.type_import(name)
            .or_else(|| {
                env.package_imports()
                    .iter()
                    .find_map(|p| self.registry.lookup(&format!("{p}.{name}")))
            })
            .or_else(|| self.registry.lookup(&format!("java.lang.{name}")))
    }

    /// Resolve a `TypeRef` or `Wildcard` node.
    pub fn resolve_type(&self, ast: &Ast, node: NodeId, env: &Environment) -> EvalResult<Type> {
        let semantic =
            |code, message: String| EvalError::Semantic(ast.diagnostic(node, code, message));
        match ast.kind(node) {
            NodeKind::TypeRef { name, dims } => {
                let args = ast.children(node);
                let base = if let Some(p) = Primitive::from_name(name) {
                    if !args.is_empty() {
                        return Err(semantic(
                            ErrorCode::TYPE_MISMATCH,
                            format!("primitive type {name} cannot have type arguments"),
                        ));
                    }
                    if p == Primitive::Void && *dims > 0 {
                        return Err(semantic(
                            ErrorCode::TYPE_MISMATCH,
                            "'void' type not allowed here".to_string(),
                        ));
                    }
                    Type::primitive(p)
                } else {
                    let id = self.find_class(name, env).ok_or_else(|| {
                        semantic(
                            ErrorCode::UNKNOWN_TYPE,
                            format!("cannot find symbol: class {name}"),
                        )
                    })?;
                    let params = args
                        .iter()
                        .map(|&a| self.resolve_type(ast, a, env))
                        .collect::<EvalResult<Vec<_>>>()?;
                    if let Some(p) = params.iter().find(|p| p.is_primitive() || p.is_void()) {
                        return Err(semantic(
                            ErrorCode::TYPE_MISMATCH,
                            format!(
                                "unexpected type; required: reference, found: {}",
                                p.display(&self.registry)
                            ),
                        ));
                    }
                    let expected = self.registry.get(id).type_params.len();
                    if !params.is_empty() && params.len() != expected {
                        return Err(semantic(
                            ErrorCode::TYPE_MISMATCH,
                            format!(
                                "wrong number of type arguments for {}; required {expected}",
                                self.registry.get(id).simple_name()
                            ),
                        ));
                    }
                    Type::generic(id, params)
                };
                Ok(base.array_of(*dims))
            }
            NodeKind::Wildcard(bound) => {
                let inner = ast
                    .child(node, 0)
                    .map(|c| self.resolve_type(ast, c, env))
                    .transpose()?;
                Ok(Type::wildcard(match (bound, inner) {
                    (jel_types::ast::WildcardBound::Extends, Some(t)) => {
                        Some(jel_model::Bound::Extends(Box::new(t)))
                    }
                    (jel_types::ast::WildcardBound::Super, Some(t)) => {
                        Some(jel_model::Bound::Super(Box::new(t)))
                    }
                    _ => None,
                }))
            }
            other => Err(semantic(
                ErrorCode::UNKNOWN_TYPE,
                format!("expected a type, found {}", other.label()),
            )),
        }
    }
}

/// Variables and wildcards read as their upper bound.
fn settle(ty: Type) -> Type {
    if ty.base.is_none() {
        ty.upper()
    } else {
        ty
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Walk state
// ══════════════════════════════════════════════════════════════════════════════

/// One walk over one AST.
struct Run<'a> {
    eval: &'a Evaluator,
    registry: &'a ClassRegistry,
    ast: &'a Rc<Ast>,
    /// Produce values and mutations.
    exec: bool,
    /// Script function nesting.
    depth: usize,
    /// Enclosing loops, for `break`/`continue` checks.
    loops: Cell<usize>,
}

impl<'a> Run<'a> {
    fn new(eval: &'a Evaluator, ast: &'a Rc<Ast>, exec: bool, depth: usize) -> Self {
        Self {
            eval,
            registry: &eval.registry,
            ast,
            exec,
            depth,
            loops: Cell::new(0),
        }
    }

    /// A check-only copy of this walk, at the same loop depth.
    fn checker(&self) -> Run<'a> {
        Run {
            exec: false,
            loops: Cell::new(self.loops.get()),
            ..Run::new(self.eval, self.ast, false, self.depth)
        }
    }

    fn kind(&self, node: NodeId) -> &'a NodeKind {
        self.ast.kind(node)
    }

    fn child(&self, node: NodeId, i: usize) -> EvalResult<NodeId> {
        self.ast.child(node, i).ok_or_else(|| {
            self.semantic(
                node,
                ErrorCode::UNEXPECTED_INPUT,
                format!("malformed {}", self.kind(node).label()),
            )
        })
    }

    fn children(&self, node: NodeId) -> &'a [NodeId] {
        self.ast.children(node)
    }

    fn show(&self, ty: &Type) -> String {
        ty.display(self.registry)
    }

    // ── Errors ──

    fn semantic(&self, node: NodeId, code: ErrorCode, message: impl Into<String>) -> EvalError {
        EvalError::Semantic(self.ast.diagnostic(node, code, message))
    }

    fn env_error(&self, node: NodeId, error: EnvError) -> EvalError {
        self.semantic(node, error.code(), error.to_string())
    }

    /// Raise a host failure as a script exception.
    fn throw(&self, node: NodeId, error: HostError) -> EvalError {
        let message = if self.registry.lookup(&error.exception).is_some() {
            error.message.clone()
        } else {
            Some(error.to_string())
        };
        let exception = self.registry.new_exception(&error.exception, message);
        self.throw_value(node, exception)
    }

    fn throw_value(&self, node: NodeId, exception: Value) -> EvalError {
        let message = self
            .registry
            .to_display(&exception)
            .unwrap_or_else(|e| e.to_string());
        let code = match &exception {
            Value::Object(o) => {
                let is = |id| self.registry.is_subclass(o.class, id);
                if is(lang::ARITHMETIC_EXCEPTION) {
                    ErrorCode::ARITHMETIC
                } else if is(lang::INDEX_OUT_OF_BOUNDS_EXCEPTION) {
                    ErrorCode::INDEX_OUT_OF_BOUNDS
                } else if is(lang::NULL_POINTER_EXCEPTION) {
                    ErrorCode::NULL_DEREFERENCE
                } else if is(lang::CLASS_CAST_EXCEPTION) {
                    ErrorCode::CLASS_CAST
                } else {
                    ErrorCode::HOST_EXCEPTION
                }
            }
            _ => ErrorCode::HOST_EXCEPTION,
        };
        EvalError::Execution {
            diagnostic: self.ast.diagnostic(node, code, message),
            exception,
        }
    }

    fn null_pointer(&self, node: NodeId, what: &str) -> EvalError {
        self.throw(node, HostError::null_pointer(what))
    }

    /// Stop when the environment was cancelled.
    fn poll(&self, node: NodeId, env: &Environment) -> EvalResult<()> {
        if env.is_cancelled() {
            return Err(EvalError::Aborted(self.ast.diagnostic(
                node,
                ErrorCode::CANCELLED,
                "evaluation cancelled",
            )));
        }
        Ok(())
    }

    /// Count one loop iteration against the configured limit.
    fn tick(&self, node: NodeId, env: &Environment, count: &mut u64) -> EvalResult<()> {
        self.poll(node, env)?;
        *count += 1;
        match self.eval.options.max_loop_iterations {
            Some(max) if *count > max => Err(EvalError::Aborted(self.ast.diagnostic(
                node,
                ErrorCode::LOOP_LIMIT,
                format!("loop exceeded {max} iterations"),
            ))),
            _ => Ok(()),
        }
    }

    // ── Values ──

    /// The value of an evaluated operand while running.
    fn value_of(&self, e: &Evaluated) -> Value {
        e.value.clone().unwrap_or(Value::Null)
    }

    /// Convert `value` for storage in a `to`-typed slot.
    fn coerce(&self, node: NodeId, value: Value, to: &Type) -> EvalResult<Value> {
        let Some(p) = to.unboxed() else {
            return Ok(value);
        };
        if value.is_null() {
            if to.is_primitive() {
                return Err(self.null_pointer(node, "cannot unbox a null value"));
            }
            return Ok(value);
        }
        Ok(value.convert(p).unwrap_or(value))
    }

    /// Assignment compatibility, allowing an `int` literal to narrow into
    /// a `byte`, `short` or `char` slot it fits.
    fn accepts(&self, target: &Type, source: &Type, node: NodeId) -> bool {
        if target.is_assignable_from(source, self.registry) {
            return true;
        }
        let NodeKind::Literal(Literal::Int(v)) = self.kind(node) else {
            return false;
        };
        match target.unboxed() {
            Some(Primitive::Byte) => i8::try_from(*v).is_ok(),
            Some(Primitive::Short) => i16::try_from(*v).is_ok(),
            Some(Primitive::Char) => u16::try_from(*v).is_ok(),
            _ => false,
        }
    }

    fn check_assignable(&self, node: NodeId, target: &Type, source: &Type) -> EvalResult<()> {
        if self.accepts(target, source, node) {
            return Ok(());
        }
        if let (Some(s), Some(t)) = (source.primitive_kind(), target.primitive_kind()) {
            if s.is_numeric() && t.is_numeric() {
                let message = format!(
                    "incompatible types: possible lossy conversion from {} to {}",
                    s.name(),
                    t.name()
                );
                let diagnostic = self
                    .ast
                    .diagnostic(node, ErrorCode::TYPE_MISMATCH, message)
                    .with_suggestion(format!("add an explicit cast: ({})", t.name()));
                return Err(EvalError::Semantic(diagnostic));
            }
        }
        let message = format!(
            "incompatible types: {} cannot be converted to {}",
            self.show(source),
            self.show(target)
        );
        Err(self.semantic(node, ErrorCode::TYPE_MISMATCH, message))
    }

    fn require_boolean(&self, node: NodeId, ty: &Type) -> EvalResult<()> {
        if ty.unboxed() == Some(Primitive::Boolean) {
            return Ok(());
        }
        Err(self.semantic(
            node,
            ErrorCode::NOT_BOOLEAN,
            format!(
                "incompatible types: {} cannot be converted to boolean",
                self.show(ty)
            ),
        ))
    }

    /// The running value of a boolean operand.
    fn truth(&self, node: NodeId, e: &Evaluated) -> EvalResult<bool> {
        self.value_of(e)
            .as_bool()
            .ok_or_else(|| self.null_pointer(node, "cannot unbox a null value"))
    }

    // ── Top level ──

    fn top_level(&self, node: NodeId, env: &Environment) -> EvalResult<Evaluated> {
        match self.kind(node) {
            NodeKind::ExprStmt => self.expr(self.child(node, 0)?, env),
            NodeKind::VarDecl { is_final } => self.var_decl(node, *is_final, env),
            _ => match self.stmt(node, env)? {
                Flow::Normal => Ok(Evaluated::void()),
                _ => Err(self.semantic(
                    node,
                    ErrorCode::MISPLACED_JUMP,
                    "jump outside of a loop or function",
                )),
            },
        }
    }

    // ── Names ──

    /// A simple name: local variable, primitive keyword, class, package,
    /// then a statically imported field.
    fn resolve_name(&self, node: NodeId, name: &str, env: &Environment) -> EvalResult<Resolved> {
        if let Some(var) = env.lookup(name) {
            if !var.initialized {
                return Err(self.semantic(
                    node,
                    ErrorCode::NOT_INITIALIZED,
                    format!("variable {name} might not have been initialized"),
                ));
            }
            let value = if self.exec {
                Some(var.value.unwrap_or(Value::Null))
            } else {
                None
            };
            return Ok(Resolved::Value(Evaluated::new(var.ty, value)));
        }
        if let Some(p) = Primitive::from_name(name) {
            return Ok(Resolved::Type(Type::primitive(p)));
        }
        if let Some(id) = self.eval.find_class(name, env) {
            return Ok(Resolved::Type(Type::object(id)));
        }
        if self.registry.has_package(name) {
            return Ok(Resolved::Package(name.to_string()));
        }
        if let Some((owner, field)) = self.static_import_field(name, env) {
            return self
                .read_field(node, owner, field, None, None)
                .map(Resolved::Value);
        }
        Err(self.semantic(
            node,
            ErrorCode::UNDECLARED,
            format!("cannot find symbol: variable {name}"),
        ))
    }

    /// A statically imported field called `name`.
    fn static_import_field(
        &self,
        name: &str,
        env: &Environment,
    ) -> Option<(ClassId, &'a jel_model::FieldDef)> {
        env.static_imports().into_iter().find_map(|import| {
            if import.member.as_deref().is_some_and(|m| m != name) {
                return None;
            }
            self.registry
                .field(import.class, name)
                .filter(|(_, f)| f.is_static)
        })
    }

    /// Resolve an expression that may also denote a type or package.
    fn resolve_target(&self, node: NodeId, env: &Environment) -> EvalResult<Resolved> {
        match self.kind(node) {
            NodeKind::Name(name) => self.resolve_name(node, name, env),
            NodeKind::Field(name) => self.field_access(node, name, env),
            _ => self.operand(node, env).map(Resolved::Value),
        }
    }
}
