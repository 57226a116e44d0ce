//! Nested evaluation environment.
//!
//! An [`Environment`] is a cheap handle to one scope. Scopes form a tree:
//!
//! - a **dependent** scope reads and writes through to its parent;
//! - an **independent** scope starts from a snapshot of its parent
//!   (imports, functions, history and final initialized variables) and is
//!   otherwise isolated;
//! - a **transaction** overlays its parent: reads fall through, every
//!   write lands in the overlay until [`Environment::commit`].
//!
//! Cancellation set on any scope is seen by every scope below it.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use jel_model::{ClassId, ClassRegistry, Type, Value};
use jel_types::ast::{Ast, NodeId};
use jel_types::{Diagnostic, ErrorCode};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Dependent,
    Independent,
    Transaction,
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub is_final: bool,
    pub initialized: bool,
    /// `None` while validating, or before initialization.
    pub value: Option<Value>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            is_final: false,
            initialized: false,
            value: None,
        }
    }

    pub fn final_var(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Mark initialized, with `value` when one is known.
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.initialized = true;
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub is_final: bool,
}

/// A script-declared function. Its body stays in the AST it was parsed in.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub varargs: bool,
    pub ast: Rc<Ast>,
    /// The `FunctionDecl` node.
    pub node: NodeId,
}

impl Function {
    /// Source text of the whole declaration.
    pub fn source(&self) -> &str {
        self.ast.text(self.node)
    }

    /// The body block.
    pub fn body(&self) -> Option<NodeId> {
        self.ast.children(self.node).last().copied()
    }
}

/// `import static C.member` (`member: None` for `C.*`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StaticImport {
    pub class: ClassId,
    pub member: Option<String>,
}

/// The failure being handled inside a `catch` block.
#[derive(Debug, Clone)]
pub struct Caught {
    pub exception: Value,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("variable '{0}' is already defined")]
    AlreadyDeclared(String),
    #[error("cannot find symbol '{0}'")]
    Undeclared(String),
    #[error("cannot assign a value to final variable '{0}'")]
    FinalReassigned(String),
    #[error("incompatible types: {found} cannot be converted to {expected} for '{name}'")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error("variable '{0}' is not declared in this scope")]
    NotDroppable(String),
}

impl EnvError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyDeclared(_) => ErrorCode::ALREADY_DECLARED,
            Self::Undeclared(_) => ErrorCode::UNDECLARED,
            Self::FinalReassigned(_) => ErrorCode::FINAL_REASSIGNED,
            Self::TypeMismatch { .. } => ErrorCode::TYPE_MISMATCH,
            Self::NotDroppable(_) => ErrorCode::NOT_DROPPABLE,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Scopes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct State {
    variables: BTreeMap<String, Variable>,
    /// Transaction copies of variables owned by an ancestor.
    shadows: BTreeMap<String, Variable>,
    /// Ancestor variables dropped through a transaction.
    dropped: BTreeSet<String>,
    functions: BTreeMap<String, Rc<Function>>,
    type_imports: BTreeMap<String, ClassId>,
    package_imports: BTreeSet<String>,
    static_imports: BTreeSet<StaticImport>,
    history: Vec<Value>,
    history_cleared: bool,
    return_type: Option<Type>,
    caught: Option<Caught>,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    parent: Option<Environment>,
    registry: Rc<ClassRegistry>,
    cancelled: Cell<bool>,
    state: RefCell<State>,
}

/// Handle to one scope of the environment tree.
#[derive(Debug, Clone)]
pub struct Environment(Rc<Scope>);

impl Environment {
    /// A fresh root scope.
    pub fn new(registry: Rc<ClassRegistry>) -> Self {
        Self(Rc::new(Scope {
            kind: ScopeKind::Root,
            parent: None,
            registry,
            cancelled: Cell::new(false),
            state: RefCell::new(State::default()),
        }))
    }

    fn child(&self, kind: ScopeKind) -> Self {
        Self(Rc::new(Scope {
            kind,
            parent: Some(self.clone()),
            registry: self.0.registry.clone(),
            cancelled: Cell::new(false),
            state: RefCell::new(State::default()),
        }))
    }

    pub fn registry(&self) -> &Rc<ClassRegistry> {
        &self.0.registry
    }

    pub fn kind(&self) -> ScopeKind {
        self.0.kind
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// This scope and every ancestor whose state it can see.
    fn chain(&self) -> Vec<&Environment> {
        let mut out = vec![self];
        let mut current = self;
        while matches!(current.0.kind, ScopeKind::Dependent | ScopeKind::Transaction) {
            match &current.0.parent {
                Some(parent) => {
                    out.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        out
    }

    // ── Nesting ──

    /// A child scope. Dependent children share this scope's state;
    /// independent ones get a snapshot.
    pub fn scope(&self, dependent: bool) -> Environment {
        if dependent {
            return self.child(ScopeKind::Dependent);
        }
        let snapshot = self.child(ScopeKind::Independent);
        {
            let mut state = snapshot.0.state.borrow_mut();
            state.variables = self
                .variables()
                .into_iter()
                .filter(|v| v.is_final && v.initialized)
                .map(|v| (v.name.clone(), v))
                .collect();
            state.functions = self.functions();
            for scope in self.chain() {
                let other = scope.0.state.borrow();
                for (simple, id) in &other.type_imports {
                    state.type_imports.entry(simple.clone()).or_insert(*id);
                }
                state.package_imports.extend(other.package_imports.iter().cloned());
                state.static_imports.extend(other.static_imports.iter().cloned());
            }
            state.history = self.all_history();
        }
        snapshot
    }

    /// An overlay whose changes reach this scope only on [`commit`](Self::commit).
    pub fn transact(&self) -> Environment {
        debug!("transaction opened");
        self.child(ScopeKind::Transaction)
    }

    /// Apply a transaction's changes to its parent. The overlay is left
    /// empty, so committing twice has no further effect. Other scope
    /// kinds have nothing to commit.
    pub fn commit(&self) -> Result<(), EnvError> {
        if self.0.kind != ScopeKind::Transaction {
            return Ok(());
        }
        let Some(parent) = &self.0.parent else {
            return Ok(());
        };
        let state = std::mem::take(&mut *self.0.state.borrow_mut());
        debug!(
            declared = state.variables.len(),
            assigned = state.shadows.len(),
            dropped = state.dropped.len(),
            history = state.history.len(),
            "transaction committed"
        );
        for name in &state.dropped {
            parent.drop(name)?;
        }
        for (_, var) in state.shadows {
            parent.store(var);
        }
        {
            let mut target = parent.0.state.borrow_mut();
            target.variables.extend(state.variables);
            target.functions.extend(state.functions);
            target.type_imports.extend(state.type_imports);
            target.package_imports.extend(state.package_imports);
            target.static_imports.extend(state.static_imports);
        }
        if state.history_cleared {
            parent.clear_history();
        }
        for value in state.history {
            parent.add_history(value);
        }
        Ok(())
    }

    // ── Variables ──

    /// The variable visible under `name`.
    pub fn lookup(&self, name: &str) -> Option<Variable> {
        for scope in self.chain() {
            let state = scope.0.state.borrow();
            if let Some(var) = state.variables.get(name).or_else(|| state.shadows.get(name)) {
                return Some(var.clone());
            }
            if state.dropped.contains(name) {
                return None;
            }
        }
        None
    }

    /// Every visible variable, innermost declaration first on clashes.
    pub fn variables(&self) -> Vec<Variable> {
        let mut seen: BTreeMap<String, Variable> = BTreeMap::new();
        let mut hidden = BTreeSet::new();
        for scope in self.chain() {
            let state = scope.0.state.borrow();
            for var in state.variables.values().chain(state.shadows.values()) {
                if !hidden.contains(&var.name) && !seen.contains_key(&var.name) {
                    seen.insert(var.name.clone(), var.clone());
                }
            }
            hidden.extend(state.dropped.iter().cloned());
        }
        seen.into_values().collect()
    }

    /// Declare `var` here. The name must be free in this scope and, unless
    /// this scope is independent, in every visible ancestor.
    pub fn declare(&self, var: Variable) -> Result<(), EnvError> {
        let taken = {
            let state = self.0.state.borrow();
            state.variables.contains_key(&var.name) || state.shadows.contains_key(&var.name)
        };
        let shadowing = match (self.0.kind, &self.0.parent) {
            (ScopeKind::Dependent | ScopeKind::Transaction, Some(parent)) => {
                !self.0.state.borrow().dropped.contains(&var.name)
                    && parent.lookup(&var.name).is_some()
            }
            _ => false,
        };
        if taken || shadowing {
            return Err(EnvError::AlreadyDeclared(var.name));
        }
        self.0
            .state
            .borrow_mut()
            .variables
            .insert(var.name.clone(), var);
        Ok(())
    }

    /// Assign a variable whose new value has static type `source`.
    /// A final variable may be assigned once.
    pub fn set(&self, name: &str, source: &Type, value: Option<Value>) -> Result<(), EnvError> {
        let registry = self.0.registry.clone();
        let assign = |var: &mut Variable| -> Result<(), EnvError> {
            if var.is_final && var.initialized {
                return Err(EnvError::FinalReassigned(var.name.clone()));
            }
            if !var.ty.is_assignable_from(source, &registry) {
                return Err(EnvError::TypeMismatch {
                    name: var.name.clone(),
                    expected: var.ty.display(&registry),
                    found: source.display(&registry),
                });
            }
            var.initialized = true;
            var.value = value.clone();
            Ok(())
        };
        let mut current = self;
        loop {
            {
                let mut state = current.0.state.borrow_mut();
                if let Some(var) = state.variables.get_mut(name) {
                    return assign(var);
                }
                if let Some(var) = state.shadows.get_mut(name) {
                    return assign(var);
                }
                if state.dropped.contains(name) {
                    return Err(EnvError::Undeclared(name.to_string()));
                }
            }
            let parent = match (current.0.kind, &current.0.parent) {
                (ScopeKind::Dependent | ScopeKind::Transaction, Some(parent)) => parent,
                _ => return Err(EnvError::Undeclared(name.to_string())),
            };
            if current.0.kind == ScopeKind::Transaction {
                let Some(mut var) = parent.lookup(name) else {
                    return Err(EnvError::Undeclared(name.to_string()));
                };
                assign(&mut var)?;
                current
                    .0
                    .state
                    .borrow_mut()
                    .shadows
                    .insert(name.to_string(), var);
                return Ok(());
            }
            current = parent;
        }
    }

    /// Overwrite `var` in the scope that owns it, without checks.
    fn store(&self, var: Variable) {
        let mut current = self;
        loop {
            {
                let mut state = current.0.state.borrow_mut();
                if let Some(slot) = state.variables.get_mut(&var.name) {
                    *slot = var;
                    return;
                }
                if let Some(slot) = state.shadows.get_mut(&var.name) {
                    *slot = var;
                    return;
                }
                if current.0.kind == ScopeKind::Transaction {
                    state.shadows.insert(var.name.clone(), var);
                    return;
                }
            }
            match (current.0.kind, &current.0.parent) {
                (ScopeKind::Dependent, Some(parent)) => current = parent,
                _ => {
                    current
                        .0
                        .state
                        .borrow_mut()
                        .variables
                        .insert(var.name.clone(), var);
                    return;
                }
            }
        }
    }

    /// Remove a variable. Only the declaring scope may drop it, or a
    /// transaction over it (the drop then applies on commit).
    pub fn drop(&self, name: &str) -> Result<(), EnvError> {
        if self.0.state.borrow_mut().variables.remove(name).is_some() {
            return Ok(());
        }
        if self.0.kind == ScopeKind::Transaction {
            let shadowed = self.0.state.borrow_mut().shadows.remove(name).is_some();
            let visible = shadowed
                || self
                    .0
                    .parent
                    .as_ref()
                    .is_some_and(|p| p.lookup(name).is_some());
            if visible {
                self.0.state.borrow_mut().dropped.insert(name.to_string());
                return Ok(());
            }
            return Err(EnvError::Undeclared(name.to_string()));
        }
        if self.lookup(name).is_some() {
            return Err(EnvError::NotDroppable(name.to_string()));
        }
        Err(EnvError::Undeclared(name.to_string()))
    }

    // ── Functions ──

    /// Declare or replace a function.
    pub fn declare_function(&self, function: Function) {
        self.0
            .state
            .borrow_mut()
            .functions
            .insert(function.name.clone(), Rc::new(function));
    }

    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        self.chain()
            .into_iter()
            .find_map(|scope| scope.0.state.borrow().functions.get(name).cloned())
    }

    /// Every visible function by name.
    pub fn functions(&self) -> BTreeMap<String, Rc<Function>> {
        let mut out = BTreeMap::new();
        for scope in self.chain() {
            for (name, f) in &scope.0.state.borrow().functions {
                out.entry(name.clone()).or_insert_with(|| f.clone());
            }
        }
        out
    }

    // ── Imports ──

    pub fn add_type_import(&self, simple: impl Into<String>, class: ClassId) {
        self.0
            .state
            .borrow_mut()
            .type_imports
            .insert(simple.into(), class);
    }

    pub fn type_import(&self, simple: &str) -> Option<ClassId> {
        self.chain()
            .into_iter()
            .find_map(|scope| scope.0.state.borrow().type_imports.get(simple).copied())
    }

    /// Every visible single-type import, as simple name to class.
    pub fn type_imports(&self) -> BTreeMap<String, ClassId> {
        let mut out = BTreeMap::new();
        for scope in self.chain() {
            for (simple, id) in &scope.0.state.borrow().type_imports {
                out.entry(simple.clone()).or_insert(*id);
            }
        }
        out
    }

    pub fn add_package_import(&self, package: impl Into<String>) {
        self.0
            .state
            .borrow_mut()
            .package_imports
            .insert(package.into());
    }

    pub fn package_imports(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for scope in self.chain() {
            out.extend(scope.0.state.borrow().package_imports.iter().cloned());
        }
        out
    }

    pub fn add_static_import(&self, import: StaticImport) {
        self.0.state.borrow_mut().static_imports.insert(import);
    }

    pub fn static_imports(&self) -> BTreeSet<StaticImport> {
        let mut out = BTreeSet::new();
        for scope in self.chain() {
            out.extend(scope.0.state.borrow().static_imports.iter().cloned());
        }
        out
    }

    // ── History ──

    /// The scope that owns history entries added here.
    fn history_owner(&self) -> &Environment {
        let mut current = self;
        while current.0.kind == ScopeKind::Dependent {
            match &current.0.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// Record the result of a top-level expression.
    pub fn add_history(&self, value: Value) {
        self.history_owner().0.state.borrow_mut().history.push(value);
    }

    /// The `i`-th most recent history entry (0 is the latest).
    pub fn history(&self, i: usize) -> Option<Value> {
        let all = self.all_history();
        all.len().checked_sub(i + 1).map(|k| all[k].clone())
    }

    pub fn history_len(&self) -> usize {
        self.all_history().len()
    }

    /// Every history entry, oldest first.
    pub fn all_history(&self) -> Vec<Value> {
        let owner = self.history_owner();
        let state = owner.0.state.borrow();
        let mut out = match (owner.0.kind, &owner.0.parent) {
            (ScopeKind::Transaction, Some(parent)) if !state.history_cleared => {
                parent.all_history()
            }
            _ => Vec::new(),
        };
        out.extend(state.history.iter().cloned());
        out
    }

    pub fn clear_history(&self) {
        let owner = self.history_owner();
        let mut state = owner.0.state.borrow_mut();
        state.history.clear();
        if owner.0.kind == ScopeKind::Transaction {
            state.history_cleared = true;
        }
    }

    // ── Overrides ──

    /// Declare the return type of the function body run in this scope.
    pub fn set_return_type(&self, ty: Type) {
        self.0.state.borrow_mut().return_type = Some(ty);
    }

    /// Return type of the enclosing function body, if any.
    pub fn return_type(&self) -> Option<Type> {
        self.chain()
            .into_iter()
            .find_map(|scope| scope.0.state.borrow().return_type.clone())
    }

    pub fn set_caught(&self, caught: Caught) {
        self.0.state.borrow_mut().caught = Some(caught);
    }

    /// The failure handled by the innermost enclosing `catch` block.
    pub fn caught(&self) -> Option<Caught> {
        self.chain()
            .into_iter()
            .find_map(|scope| scope.0.state.borrow().caught.clone())
    }

    // ── Cancellation ──

    /// Ask every evaluation running in this scope or below to stop.
    pub fn cancel(&self) {
        self.0.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.0.cancelled.get() {
                return true;
            }
            current = scope.0.parent.as_ref();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jel_model::Primitive;

    fn root() -> Environment {
        Environment::new(Rc::new(ClassRegistry::with_builtins()))
    }

    fn int_var(name: &str, v: i32) -> Variable {
        Variable::new(name, Type::int()).with_value(Some(Value::Int(v)))
    }

    fn value_of(env: &Environment, name: &str) -> Option<Value> {
        env.lookup(name).and_then(|v| v.value)
    }

    #[test]
    fn test_declare_rejects_visible_names() {
        let env = root();
        env.declare(int_var("x", 1)).unwrap();
        assert_eq!(
            env.declare(int_var("x", 2)),
            Err(EnvError::AlreadyDeclared("x".into()))
        );
        let block = env.scope(true);
        assert!(block.declare(int_var("x", 3)).is_err());
        assert!(block.declare(int_var("y", 3)).is_ok());
        assert!(env.lookup("y").is_none());
    }

    #[test]
    fn test_independent_scope_snapshot() {
        let env = root();
        env.declare(int_var("plain", 1)).unwrap();
        env.declare(int_var("fixed", 2).final_var()).unwrap();
        env.add_history(Value::Int(9));
        let inner = env.scope(false);
        assert!(inner.lookup("plain").is_none());
        assert_eq!(value_of(&inner, "fixed"), Some(Value::Int(2)));
        assert_eq!(inner.history(0), Some(Value::Int(9)));
        // Independent scopes may reuse outer names.
        inner.declare(int_var("plain", 5)).unwrap();
        assert_eq!(value_of(&env, "plain"), Some(Value::Int(1)));
    }

    #[test]
    fn test_set_checks_types_and_finals() {
        let env = root();
        env.declare(Variable::new("y", Type::int()).final_var()).unwrap();
        env.set("y", &Type::int(), Some(Value::Int(1))).unwrap();
        assert_eq!(
            env.set("y", &Type::int(), Some(Value::Int(2))),
            Err(EnvError::FinalReassigned("y".into()))
        );
        env.declare(int_var("n", 0)).unwrap();
        let err = env.set("n", &Type::string(), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TYPE_MISMATCH);
        env.set("n", &Type::primitive(Primitive::Short), Some(Value::Int(3)))
            .unwrap();
        assert_eq!(
            env.set("missing", &Type::int(), None),
            Err(EnvError::Undeclared("missing".into()))
        );
    }

    #[test]
    fn test_transaction_isolation() {
        let env = root();
        env.declare(int_var("x", 1)).unwrap();
        let tx = env.transact();
        tx.set("x", &Type::int(), Some(Value::Int(2))).unwrap();
        tx.declare(int_var("z", 3)).unwrap();
        tx.add_history(Value::Int(7));
        assert_eq!(value_of(&tx, "x"), Some(Value::Int(2)));
        assert_eq!(value_of(&env, "x"), Some(Value::Int(1)));
        assert!(env.lookup("z").is_none());
        assert_eq!(env.history_len(), 0);
        assert_eq!(tx.history(0), Some(Value::Int(7)));
        drop(tx);
        assert_eq!(value_of(&env, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_commit_applies_overlay() {
        let env = root();
        env.declare(int_var("x", 1)).unwrap();
        env.declare(int_var("gone", 0)).unwrap();
        let tx = env.transact();
        let block = tx.scope(true);
        block.set("x", &Type::int(), Some(Value::Int(5))).unwrap();
        tx.declare(int_var("z", 3)).unwrap();
        tx.drop("gone").unwrap();
        assert!(tx.lookup("gone").is_none());
        tx.add_type_import("List", jel_model::lang::LIST);
        tx.add_history(Value::Int(5));
        tx.commit().unwrap();
        assert_eq!(value_of(&env, "x"), Some(Value::Int(5)));
        assert_eq!(value_of(&env, "z"), Some(Value::Int(3)));
        assert!(env.lookup("gone").is_none());
        assert_eq!(env.type_import("List"), Some(jel_model::lang::LIST));
        assert_eq!(env.history(0), Some(Value::Int(5)));
        // The overlay is empty after a commit.
        tx.commit().unwrap();
        assert_eq!(env.history_len(), 1);
    }

    #[test]
    fn test_drop_only_from_declaring_scope() {
        let env = root();
        env.declare(int_var("x", 1)).unwrap();
        let block = env.scope(true);
        assert_eq!(block.drop("x"), Err(EnvError::NotDroppable("x".into())));
        assert_eq!(block.drop("nope"), Err(EnvError::Undeclared("nope".into())));
        env.drop("x").unwrap();
        assert!(env.lookup("x").is_none());
    }

    #[test]
    fn test_history_most_recent_first() {
        let env = root();
        env.add_history(Value::Int(1));
        env.scope(true).add_history(Value::Int(2));
        assert_eq!(env.history(0), Some(Value::Int(2)));
        assert_eq!(env.history(1), Some(Value::Int(1)));
        assert_eq!(env.history(2), None);
        let tx = env.transact();
        tx.clear_history();
        assert_eq!(tx.history_len(), 0);
        assert_eq!(env.history_len(), 2);
        tx.commit().unwrap();
        assert_eq!(env.history_len(), 0);
    }

    #[test]
    fn test_cancel_reaches_descendants() {
        let env = root();
        let block = env.scope(true);
        let inner = block.scope(false).transact();
        assert!(!inner.is_cancelled());
        block.cancel();
        assert!(inner.is_cancelled());
        assert!(!env.is_cancelled());
    }

    #[test]
    fn test_overrides_visible_through_dependent_scopes() {
        let env = root();
        let body = env.scope(false);
        body.set_return_type(Type::int());
        assert_eq!(body.scope(true).return_type(), Some(Type::int()));
        assert_eq!(env.return_type(), None);
    }
}
