//! Statements and declarations.

use jel_model::{lang, ArrayRef, ClassId, HostError, Type, Value};
use jel_types::ast::{Literal, NodeId, NodeKind};
use jel_types::ErrorCode;

use super::{settle, Evaluated, Flow, Run};
use crate::env::{Caught, Environment, Function, Param, StaticImport, Variable};
use crate::error::{EvalError, EvalResult};

/// One `catch` clause with its resolved types.
struct Clause<'n> {
    name: &'n str,
    /// Alternatives of a multi-catch.
    types: Vec<Type>,
    /// Declared type of the caught variable.
    ty: Type,
    block: NodeId,
}

/// What a `for (x : source)` loop walks.
enum Items {
    Array(ArrayRef, usize),
    Iterator(Value),
}

impl<'a> Run<'a> {
    pub(super) fn stmt(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        self.poll(node, env)?;
        match self.kind(node) {
            NodeKind::Empty => Ok(Flow::Normal),
            NodeKind::ExprStmt => {
                self.expr(self.child(node, 0)?, env)?;
                Ok(Flow::Normal)
            }
            NodeKind::VarDecl { is_final } => {
                self.var_decl(node, *is_final, env)?;
                Ok(Flow::Normal)
            }
            NodeKind::Block => self.block(node, env),
            NodeKind::If => self.if_stmt(node, env),
            NodeKind::While => self.while_loop(node, env),
            NodeKind::DoWhile => self.do_while(node, env),
            NodeKind::For {
                init,
                has_cond,
                update,
            } => self.for_loop(node, *init, *has_cond, *update, env),
            NodeKind::ForEach { name, is_final } => self.for_each(node, name, *is_final, env),
            NodeKind::Break => self.jump(node, Flow::Break, "break outside switch or loop"),
            NodeKind::Continue => self.jump(node, Flow::Continue, "continue outside of loop"),
            NodeKind::Return => self.return_stmt(node, env),
            NodeKind::Throw => self.throw_stmt(node, env),
            NodeKind::Try { has_finally } => self.try_stmt(node, *has_finally, env),
            NodeKind::Import {
                is_static,
                wildcard,
                path,
            } => {
                self.import(node, *is_static, *wildcard, path, env)?;
                Ok(Flow::Normal)
            }
            NodeKind::FunctionDecl { name, varargs } => {
                self.function_decl(node, name, *varargs, env)?;
                Ok(Flow::Normal)
            }
            other => Err(self.semantic(
                node,
                ErrorCode::UNEXPECTED_INPUT,
                format!("{} is not a statement", other.label()),
            )),
        }
    }

    /// A sub-statement in its own nested scope.
    fn branch(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        self.stmt(node, &env.scope(true))
    }

    fn block(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let scope = env.scope(true);
        for &child in self.children(node) {
            let flow = self.stmt(child, &scope)?;
            if self.exec && flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn if_stmt(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let cond_node = self.child(node, 0)?;
        let then = self.child(node, 1)?;
        let otherwise = self.ast.child(node, 2);
        let cond = self.operand(cond_node, env)?;
        self.require_boolean(cond_node, &cond.ty)?;
        if !self.exec {
            self.branch(then, env)?;
            if let Some(e) = otherwise {
                self.branch(e, env)?;
            }
            return Ok(Flow::Normal);
        }
        let taken = self.truth(cond_node, &cond)?;
        let (live, dead) = if taken {
            (Some(then), otherwise)
        } else {
            (otherwise, Some(then))
        };
        if let Some(dead) = dead {
            self.checker().branch(dead, &env.transact())?;
        }
        match live {
            Some(live) => self.branch(live, env),
            None => Ok(Flow::Normal),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Loops
    // ══════════════════════════════════════════════════════════════════════════

    fn in_loop(&self, f: impl FnOnce() -> EvalResult<Flow>) -> EvalResult<Flow> {
        self.loops.set(self.loops.get() + 1);
        let result = f();
        self.loops.set(self.loops.get() - 1);
        result
    }

    /// Check a loop body that never ran.
    fn check_body(&self, body: NodeId, env: &Environment) -> EvalResult<()> {
        let checker = self.checker();
        let trial = env.transact();
        checker.in_loop(|| checker.branch(body, &trial))?;
        Ok(())
    }

    fn condition(&self, node: NodeId, env: &Environment) -> EvalResult<bool> {
        let cond = self.operand(node, env)?;
        self.require_boolean(node, &cond.ty)?;
        if !self.exec {
            return Ok(false);
        }
        self.truth(node, &cond)
    }

    fn while_loop(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let cond = self.child(node, 0)?;
        let body = self.child(node, 1)?;
        if !self.exec {
            self.condition(cond, env)?;
            self.in_loop(|| self.branch(body, env))?;
            return Ok(Flow::Normal);
        }
        let mut iterations = 0;
        while self.condition(cond, env)? {
            self.tick(node, env, &mut iterations)?;
            match self.in_loop(|| self.branch(body, env))? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        if iterations == 0 {
            self.check_body(body, env)?;
        }
        Ok(Flow::Normal)
    }

    fn do_while(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let body = self.child(node, 0)?;
        let cond = self.child(node, 1)?;
        self.checker().condition(cond, &env.transact())?;
        if !self.exec {
            self.in_loop(|| self.branch(body, env))?;
            return Ok(Flow::Normal);
        }
        let mut iterations = 0;
        loop {
            self.tick(node, env, &mut iterations)?;
            match self.in_loop(|| self.branch(body, env))? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if !self.condition(cond, env)? {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn for_loop(
        &self,
        node: NodeId,
        init: usize,
        has_cond: bool,
        update: usize,
        env: &Environment,
    ) -> EvalResult<Flow> {
        let children = self.children(node);
        let malformed = || self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed for loop");
        let (inits, rest) = children.split_at(init.min(children.len()));
        let (cond, rest) = match rest.split_first() {
            Some((&c, rest)) if has_cond => (Some(c), rest),
            _ => (None, rest),
        };
        let (updates, body) = rest.split_at(update.min(rest.len()));
        let &body = body.first().ok_or_else(malformed)?;

        let scope = env.scope(true);
        for &i in inits {
            self.stmt(i, &scope)?;
        }
        if !self.exec {
            if let Some(c) = cond {
                self.condition(c, &scope)?;
            }
            self.in_loop(|| self.branch(body, &scope))?;
            for &u in updates {
                self.stmt(u, &scope)?;
            }
            return Ok(Flow::Normal);
        }
        let mut iterations = 0;
        loop {
            if let Some(c) = cond {
                if !self.condition(c, &scope)? {
                    break;
                }
            }
            self.tick(node, env, &mut iterations)?;
            match self.in_loop(|| self.branch(body, &scope))? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            for &u in updates {
                self.stmt(u, &scope)?;
            }
        }
        if iterations == 0 {
            self.check_body(body, &scope)?;
            let checker = self.checker();
            let trial = scope.transact();
            for &u in updates {
                checker.stmt(u, &trial)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Element type of what a `for (x : source)` loop walks.
    fn iterated_type(&self, node: NodeId, source: &Type) -> EvalResult<Type> {
        let upper = source.upper();
        if let Some(element) = upper.element() {
            return Ok(element);
        }
        match self.registry.as_super(&upper, lang::ITERABLE) {
            Some(view) => Ok(view
                .params
                .first()
                .cloned()
                .map(settle)
                .unwrap_or_else(Type::object_root)),
            None => Err(self.semantic(
                node,
                ErrorCode::NOT_ITERABLE,
                format!("for-each not applicable to expression type {}", self.show(source)),
            )),
        }
    }

    fn next_item(&self, node: NodeId, items: &mut Items) -> EvalResult<Option<Value>> {
        match items {
            Items::Array(array, i) => {
                let item = array.get(*i);
                *i += 1;
                Ok(item)
            }
            Items::Iterator(it) => {
                let more = self.call_virtual(node, it, "hasNext")?;
                if more.as_bool() != Some(true) {
                    return Ok(None);
                }
                self.call_virtual(node, it, "next").map(Some)
            }
        }
    }

    fn for_each(
        &self,
        node: NodeId,
        name: &str,
        is_final: bool,
        env: &Environment,
    ) -> EvalResult<Flow> {
        let type_node = self.child(node, 0)?;
        let source_node = self.child(node, 1)?;
        let body = self.child(node, 2)?;
        let source = self.operand(source_node, env)?;
        let element = self.iterated_type(source_node, &source.ty)?;
        let declared = if self.is_inferred(type_node) {
            element.clone()
        } else {
            let declared = self.eval.resolve_type(self.ast, type_node, env)?;
            self.check_assignable(type_node, &declared, &element)?;
            declared
        };
        let variable = |value: Option<Value>| {
            let var = Variable::new(name, declared.clone()).with_value(value);
            if is_final {
                var.final_var()
            } else {
                var
            }
        };

        if !self.exec {
            let scope = env.scope(true);
            scope
                .declare(variable(None))
                .map_err(|e| self.env_error(node, e))?;
            self.in_loop(|| self.stmt(body, &scope))?;
            return Ok(Flow::Normal);
        }
        let mut items = match self.value_of(&source) {
            Value::Array(array) => Items::Array(array, 0),
            Value::Null => {
                return Err(self.null_pointer(source_node, "cannot iterate over a null value"))
            }
            other => Items::Iterator(self.call_virtual(source_node, &other, "iterator")?),
        };
        let mut iterations = 0;
        while let Some(item) = self.next_item(source_node, &mut items)? {
            self.tick(node, env, &mut iterations)?;
            if declared.is_reference() && !item.is_null() {
                let runtime = item.runtime_class();
                if !declared.erasure().is_assignable_from(&runtime, self.registry) {
                    return Err(self.throw(
                        source_node,
                        HostError::class_cast(format!(
                            "class {} cannot be cast to class {}",
                            runtime.name(self.registry),
                            declared.erasure().name(self.registry)
                        )),
                    ));
                }
            }
            let item = self.coerce(source_node, item, &declared)?;
            let scope = env.scope(true);
            scope
                .declare(variable(Some(item)))
                .map_err(|e| self.env_error(node, e))?;
            match self.in_loop(|| self.stmt(body, &scope))? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        if iterations == 0 {
            let checker = self.checker();
            let scope = env.transact().scope(true);
            scope
                .declare(variable(None))
                .map_err(|e| self.env_error(node, e))?;
            checker.in_loop(|| checker.stmt(body, &scope))?;
        }
        Ok(Flow::Normal)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Jumps and exceptions
    // ══════════════════════════════════════════════════════════════════════════

    fn jump(&self, node: NodeId, flow: Flow, misplaced: &str) -> EvalResult<Flow> {
        if self.loops.get() == 0 {
            return Err(self.semantic(node, ErrorCode::MISPLACED_JUMP, misplaced));
        }
        Ok(flow)
    }

    fn return_stmt(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let Some(ret) = env.return_type() else {
            return Err(self.semantic(node, ErrorCode::MISPLACED_JUMP, "return outside method"));
        };
        let Some(value_node) = self.ast.child(node, 0) else {
            if !ret.is_void() {
                return Err(self.semantic(node, ErrorCode::TYPE_MISMATCH, "missing return value"));
            }
            return Ok(Flow::Return(None));
        };
        if ret.is_void() {
            return Err(self.semantic(
                value_node,
                ErrorCode::TYPE_MISMATCH,
                "incompatible types: unexpected return value",
            ));
        }
        let e = self.operand(value_node, env)?;
        self.check_assignable(value_node, &ret, &e.ty)?;
        let value = match e.value {
            Some(v) if self.exec => Some(self.coerce(value_node, v, &ret)?),
            _ => None,
        };
        Ok(Flow::Return(value))
    }

    fn throw_stmt(&self, node: NodeId, env: &Environment) -> EvalResult<Flow> {
        let value_node = self.child(node, 0)?;
        let e = self.operand(value_node, env)?;
        let throwable = Type::object(ClassId::THROWABLE);
        if !throwable.is_assignable_from(&e.ty, self.registry) {
            return Err(self.semantic(
                value_node,
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "incompatible types: {} cannot be converted to Throwable",
                    self.show(&e.ty)
                ),
            ));
        }
        if !self.exec {
            return Ok(Flow::Normal);
        }
        let exception = self.value_of(&e);
        if exception.is_null() {
            return Err(self.null_pointer(node, "cannot throw a null exception"));
        }
        // Rethrowing a caught exception keeps where it was first raised.
        if let Some(caught) = env.caught() {
            if caught.exception.identical(&exception) {
                return Err(EvalError::Execution {
                    diagnostic: caught.diagnostic,
                    exception,
                });
            }
        }
        Err(self.throw_value(node, exception))
    }

    fn clause(&self, node: NodeId, env: &Environment) -> EvalResult<Clause<'a>> {
        let NodeKind::Catch { name } = self.kind(node) else {
            return Err(self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed catch clause"));
        };
        let children = self.children(node);
        let Some((&block, type_nodes)) = children.split_last() else {
            return Err(self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed catch clause"));
        };
        let throwable = Type::object(ClassId::THROWABLE);
        let mut types = Vec::with_capacity(type_nodes.len());
        for &t in type_nodes {
            let ty = self.eval.resolve_type(self.ast, t, env)?;
            if !throwable.is_assignable_from(&ty, self.registry) {
                return Err(self.semantic(
                    t,
                    ErrorCode::TYPE_MISMATCH,
                    format!(
                        "incompatible types: {} cannot be converted to Throwable",
                        self.show(&ty)
                    ),
                ));
            }
            types.push(ty);
        }
        let mut ty = types.first().cloned().unwrap_or_else(|| throwable.clone());
        for other in types.iter().skip(1) {
            ty = ty.common_type(other, self.registry).unwrap_or_else(|| throwable.clone());
        }
        Ok(Clause {
            name,
            types,
            ty,
            block,
        })
    }

    fn catch_body(
        &self,
        clause: &Clause<'_>,
        caught: Option<Caught>,
        env: &Environment,
    ) -> EvalResult<Flow> {
        let scope = env.scope(true);
        let value = caught.as_ref().map(|c| c.exception.clone());
        scope
            .declare(Variable::new(clause.name, clause.ty.clone()).with_value(value))
            .map_err(|e| self.env_error(clause.block, e))?;
        if let Some(caught) = caught {
            scope.set_caught(caught);
        }
        self.stmt(clause.block, &scope)
    }

    /// Check the clauses that did not run.
    fn check_clauses(
        &self,
        clauses: &[Clause<'_>],
        skip: Option<usize>,
        env: &Environment,
    ) -> EvalResult<()> {
        let checker = self.checker();
        let trial = env.transact();
        for (i, clause) in clauses.iter().enumerate() {
            if Some(i) != skip {
                checker.catch_body(clause, None, &trial)?;
            }
        }
        Ok(())
    }

    fn try_stmt(&self, node: NodeId, has_finally: bool, env: &Environment) -> EvalResult<Flow> {
        let children = self.children(node);
        let Some((&block, rest)) = children.split_first() else {
            return Err(self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed try statement"));
        };
        let (catch_nodes, finally) = match rest.split_last() {
            Some((&f, catches)) if has_finally => (catches, Some(f)),
            _ => (rest, None),
        };
        let clauses = catch_nodes
            .iter()
            .map(|&c| self.clause(c, env))
            .collect::<EvalResult<Vec<_>>>()?;

        if !self.exec {
            self.branch(block, env)?;
            for clause in &clauses {
                self.catch_body(clause, None, env)?;
            }
            if let Some(f) = finally {
                self.branch(f, env)?;
            }
            return Ok(Flow::Normal);
        }

        let outcome = match self.branch(block, env) {
            Err(EvalError::Execution {
                diagnostic,
                exception,
            }) => {
                let runtime = exception.runtime_class();
                let handler = clauses.iter().position(|c| {
                    c.types
                        .iter()
                        .any(|t| t.erasure().is_assignable_from(&runtime, self.registry))
                });
                self.check_clauses(&clauses, handler, env)?;
                match handler {
                    Some(i) => self.catch_body(
                        &clauses[i],
                        Some(Caught {
                            exception,
                            diagnostic,
                        }),
                        env,
                    ),
                    None => Err(EvalError::Execution {
                        diagnostic,
                        exception,
                    }),
                }
            }
            Err(other) => return Err(other),
            Ok(flow) => {
                self.check_clauses(&clauses, None, env)?;
                Ok(flow)
            }
        };
        if matches!(outcome, Err(EvalError::Semantic(_) | EvalError::Aborted(_))) {
            return outcome;
        }
        if let Some(f) = finally {
            match self.branch(f, env)? {
                Flow::Normal => {}
                jump => return Ok(jump),
            }
        }
        outcome
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Declarations
    // ══════════════════════════════════════════════════════════════════════════

    /// A `var` type: local inference from the initializer.
    fn is_inferred(&self, type_node: NodeId) -> bool {
        matches!(self.kind(type_node), NodeKind::TypeRef { name, dims: 0 } if name == "var")
            && self.children(type_node).is_empty()
    }

    /// Declare every declarator; the result is the last one.
    pub(super) fn var_decl(
        &self,
        node: NodeId,
        is_final: bool,
        env: &Environment,
    ) -> EvalResult<Evaluated> {
        let children = self.children(node);
        let Some((&type_node, declarators)) = children.split_first() else {
            return Err(self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed declaration"));
        };
        let base = if self.is_inferred(type_node) {
            None
        } else {
            let ty = self.eval.resolve_type(self.ast, type_node, env)?;
            if ty.is_void() {
                return Err(self.semantic(
                    type_node,
                    ErrorCode::TYPE_MISMATCH,
                    "'void' type not allowed here",
                ));
            }
            Some(ty)
        };
        let mut last = Evaluated::void();
        for &d in declarators {
            let NodeKind::Declarator { name, dims } = self.kind(d) else {
                return Err(self.semantic(d, ErrorCode::UNEXPECTED_INPUT, "malformed declarator"));
            };
            let init = self.ast.child(d, 0);
            let (ty, value) = match (&base, init) {
                (None, None) => {
                    return Err(self.semantic(
                        d,
                        ErrorCode::TYPE_MISMATCH,
                        format!("cannot infer type for local variable {name}; variable initializer is missing"),
                    ))
                }
                (None, Some(i)) => {
                    if matches!(self.kind(i), NodeKind::ArrayInit) || *dims > 0 {
                        return Err(self.semantic(
                            d,
                            ErrorCode::TYPE_MISMATCH,
                            format!("cannot infer type for local variable {name}; array initializer needs an explicit target-type"),
                        ));
                    }
                    let e = self.operand(i, env)?;
                    if e.ty.is_null() {
                        return Err(self.semantic(
                            d,
                            ErrorCode::TYPE_MISMATCH,
                            format!("cannot infer type for local variable {name}; variable initializer is 'null'"),
                        ));
                    }
                    (settle(e.ty), e.value)
                }
                (Some(base), None) => (base.array_of(*dims), None),
                (Some(base), Some(i)) => {
                    let ty = base.array_of(*dims);
                    let value = if matches!(self.kind(i), NodeKind::ArrayInit) {
                        self.array_init(i, &ty, env)?.value
                    } else {
                        let e = self.operand(i, env)?;
                        self.check_assignable(i, &ty, &e.ty)?;
                        match e.value {
                            Some(v) => Some(self.coerce(i, v, &ty)?),
                            None => None,
                        }
                    };
                    (ty, value)
                }
            };
            let mut var = Variable::new(name.clone(), ty.clone());
            if init.is_some() {
                var = var.with_value(value.clone());
            }
            if is_final {
                var = var.final_var();
            }
            env.declare(var).map_err(|e| self.env_error(d, e))?;
            last = Evaluated::new(ty, value);
        }
        Ok(last)
    }

    fn import(
        &self,
        node: NodeId,
        is_static: bool,
        wildcard: bool,
        path: &str,
        env: &Environment,
    ) -> EvalResult<()> {
        let unknown = |what: &str| {
            self.semantic(
                node,
                ErrorCode::UNKNOWN_TYPE,
                format!("cannot find symbol: {what} {path}"),
            )
        };
        match (is_static, wildcard) {
            (false, false) => {
                let id = self.registry.lookup(path).ok_or_else(|| unknown("class"))?;
                env.add_type_import(self.registry.get(id).simple_name(), id);
            }
            (false, true) => {
                if !self.registry.has_package(path) && self.registry.lookup(path).is_none() {
                    return Err(self.semantic(
                        node,
                        ErrorCode::UNKNOWN_TYPE,
                        format!("package {path} does not exist"),
                    ));
                }
                env.add_package_import(path);
            }
            (true, false) => {
                let (class, member) = path.rsplit_once('.').ok_or_else(|| unknown("class"))?;
                let id = self.eval.find_class(class, env).ok_or_else(|| unknown("class"))?;
                if !self.registry.static_members(id).contains(member) {
                    return Err(self.semantic(
                        node,
                        ErrorCode::NO_SUCH_FIELD,
                        format!("cannot find symbol: static {member} in {class}"),
                    ));
                }
                env.add_static_import(StaticImport {
                    class: id,
                    member: Some(member.to_string()),
                });
            }
            (true, true) => {
                let id = self.eval.find_class(path, env).ok_or_else(|| unknown("class"))?;
                env.add_static_import(StaticImport {
                    class: id,
                    member: None,
                });
            }
        }
        Ok(())
    }

    /// Declare (or replace) a script function after checking its body in a
    /// trial scope where it can already call itself.
    fn function_decl(
        &self,
        node: NodeId,
        name: &str,
        varargs: bool,
        env: &Environment,
    ) -> EvalResult<()> {
        let children = self.children(node);
        let malformed = || {
            self.semantic(node, ErrorCode::UNEXPECTED_INPUT, "malformed function declaration")
        };
        let (&ret_node, rest) = children.split_first().ok_or_else(malformed)?;
        let (&body, param_nodes) = rest.split_last().ok_or_else(malformed)?;

        let ret = self.eval.resolve_type(self.ast, ret_node, env)?;
        let mut params: Vec<Param> = Vec::with_capacity(param_nodes.len());
        for (i, &p) in param_nodes.iter().enumerate() {
            let NodeKind::Param {
                name: param,
                is_final,
            } = self.kind(p)
            else {
                return Err(malformed());
            };
            let mut ty = self.eval.resolve_type(self.ast, self.child(p, 0)?, env)?;
            if ty.is_void() {
                return Err(self.semantic(
                    p,
                    ErrorCode::TYPE_MISMATCH,
                    "'void' type not allowed here",
                ));
            }
            if varargs && i + 1 == param_nodes.len() {
                ty = ty.array_of(1);
            }
            if params.iter().any(|q| q.name == *param) {
                return Err(self.semantic(
                    p,
                    ErrorCode::ALREADY_DECLARED,
                    format!("variable {param} is already defined in method {name}"),
                ));
            }
            params.push(Param {
                name: param.clone(),
                ty,
                is_final: *is_final,
            });
        }
        let function = Function {
            name: name.to_string(),
            params,
            ret,
            varargs,
            ast: self.ast.clone(),
            node,
        };

        let trial = env.transact();
        trial.declare_function(function.clone());
        let scope = trial.scope(false);
        scope.set_return_type(function.ret.clone());
        for param in &function.params {
            let _ = scope.drop(&param.name);
            let var = Variable::new(param.name.clone(), param.ty.clone()).with_value(None);
            let var = if param.is_final { var.final_var() } else { var };
            scope.declare(var).map_err(|e| self.env_error(node, e))?;
        }
        Run::new(self.eval, self.ast, false, self.depth).stmt(body, &scope)?;
        if !function.ret.is_void() && self.can_complete(body) {
            return Err(self.semantic(body, ErrorCode::MISPLACED_JUMP, "missing return statement"));
        }

        env.declare_function(function);
        Ok(())
    }

    // ── Reachability ──

    /// Whether control can fall off the end of `node`.
    fn can_complete(&self, node: NodeId) -> bool {
        let children = self.children(node);
        match self.kind(node) {
            NodeKind::Return | NodeKind::Throw | NodeKind::Break | NodeKind::Continue => false,
            NodeKind::Block => children.iter().all(|&c| self.can_complete(c)),
            NodeKind::If => match children {
                [_, then, otherwise] => self.can_complete(*then) || self.can_complete(*otherwise),
                _ => true,
            },
            NodeKind::While => {
                !(children.first().is_some_and(|&c| self.is_true(c)) && !self.breaks_out(node))
            }
            NodeKind::DoWhile => {
                !(children.get(1).is_some_and(|&c| self.is_true(c)) && !self.breaks_out(node))
            }
            NodeKind::For { init, has_cond, .. } => {
                let endless = !has_cond || children.get(*init).is_some_and(|&c| self.is_true(c));
                !(endless && !self.breaks_out(node))
            }
            NodeKind::Try { has_finally } => {
                let (body, rest) = match children.split_first() {
                    Some((&b, rest)) => (b, rest),
                    None => return true,
                };
                let (catches, finally) = match rest.split_last() {
                    Some((&f, catches)) if *has_finally => (catches, Some(f)),
                    _ => (rest, None),
                };
                let handled = self.can_complete(body)
                    || catches
                        .iter()
                        .any(|&c| self.children(c).last().is_some_and(|&b| self.can_complete(b)));
                handled && finally.map_or(true, |f| self.can_complete(f))
            }
            _ => true,
        }
    }

    fn is_true(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Literal(Literal::Bool(true)))
    }

    /// Whether a `break` inside `node` leaves it, ignoring nested loops.
    fn breaks_out(&self, node: NodeId) -> bool {
        self.children(node).iter().any(|&c| match self.kind(c) {
            NodeKind::Break => true,
            NodeKind::While
            | NodeKind::DoWhile
            | NodeKind::For { .. }
            | NodeKind::ForEach { .. }
            | NodeKind::FunctionDecl { .. } => false,
            _ => self.breaks_out(c),
        })
    }
}
