//! AST construction from match trees.
//!
//! Every grammar rule may name an implementation. The [`Registry`] maps
//! implementation names to [`NodeFactory`] functions, and the
//! [`AstBuilder`] dispatches each rule match to its factory. A rule with no
//! implementation passes through to its only significant rule child.

use std::collections::HashMap;
use std::fmt;

use jel_grammar::{Grammar, MatchKind, ParseMatch};
use jel_types::ast::{Ast, NodeId, NodeKind};
use jel_types::{Diagnostic, ErrorCode, Span};

/// Builds the node for one rule match and attaches it under `parent`.
pub type NodeFactory =
    fn(&mut AstBuilder<'_>, Option<NodeId>, &ParseMatch) -> Result<NodeId, Diagnostic>;

/// Implementation name → factory.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, NodeFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("factories", &names).finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factories for every implementation named by the default grammar.
    pub fn java() -> Self {
        let mut registry = Self::new();
        crate::build_type::register(&mut registry);
        crate::build_expr::register(&mut registry);
        crate::build_stmt::register(&mut registry);
        registry
    }

    /// Add or replace a factory; returns the one it replaced.
    pub fn register(
        &mut self,
        implementation: impl Into<String>,
        factory: NodeFactory,
    ) -> Option<NodeFactory> {
        self.factories.insert(implementation.into(), factory)
    }

    pub fn get(&self, implementation: &str) -> Option<NodeFactory> {
        self.factories.get(implementation).copied()
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }
}

/// Dispatches rule matches to factories and allocates nodes.
pub struct AstBuilder<'a> {
    grammar: &'a Grammar,
    registry: &'a Registry,
    ast: &'a mut Ast,
}

impl<'a> AstBuilder<'a> {
    pub fn new(grammar: &'a Grammar, registry: &'a Registry, ast: &'a mut Ast) -> Self {
        Self {
            grammar,
            registry,
            ast,
        }
    }

    pub fn ast(&self) -> &Ast {
        &*self.ast
    }

    /// Build the node for `m` under `parent`.
    pub fn build(&mut self, parent: Option<NodeId>, m: &ParseMatch) -> Result<NodeId, Diagnostic> {
        if !m.complete {
            return Err(self.error(
                m,
                ErrorCode::UNEXPECTED_INPUT,
                "cannot build from an incomplete match",
            ));
        }
        let id = match m.kind {
            MatchKind::Rule(id) => id,
            MatchKind::Statement => match m.statement_root() {
                Some(root) => return self.build(parent, root),
                None => {
                    return Err(self.error(m, ErrorCode::UNEXPECTED_INPUT, "empty statement match"))
                }
            },
            _ => return Err(self.error(m, ErrorCode::UNEXPECTED_INPUT, "expected a rule match")),
        };
        let grammar = self.grammar;
        let rule = grammar.rule(id);
        match &rule.implementation {
            Some(implementation) => {
                let factory = self.registry.get(implementation).ok_or_else(|| {
                    self.error(
                        m,
                        ErrorCode::UNKNOWN_IMPLEMENTATION,
                        format!("no factory registered for '{implementation}'"),
                    )
                })?;
                factory(self, parent, m)
            }
            None => match self.rules(m).as_slice() {
                [only] => self.build(parent, only),
                _ => Err(self.error(
                    m,
                    ErrorCode::UNKNOWN_IMPLEMENTATION,
                    format!("rule '{}' has no implementation", rule.name),
                )),
            },
        }
    }

    /// Build every match in order under `parent`.
    pub fn build_all(&mut self, parent: NodeId, matches: &[&ParseMatch]) -> Result<(), Diagnostic> {
        for m in matches {
            self.build(Some(parent), m)?;
        }
        Ok(())
    }

    // ── Nodes ──

    /// Allocate a node spanning `m`.
    pub fn node(&mut self, kind: NodeKind, m: &ParseMatch, parent: Option<NodeId>) -> NodeId {
        let span = self.span(m);
        self.ast.alloc(kind, span, parent)
    }

    /// Allocate a node spanning byte offsets `start..end`.
    pub fn node_spanning(
        &mut self,
        kind: NodeKind,
        start: usize,
        end: usize,
        parent: Option<NodeId>,
    ) -> NodeId {
        let span = self.ast.source().span(start, end.saturating_sub(start));
        self.ast.alloc(kind, span, parent)
    }

    /// Move an already built node under `parent`.
    pub fn adopt(&mut self, parent: NodeId, child: NodeId) {
        self.ast.reparent(child, parent);
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.ast.set_kind(id, kind);
    }

    // ── Match inspection ──

    pub fn span(&self, m: &ParseMatch) -> Span {
        self.ast.source().span(m.offset, m.len)
    }

    pub fn text(&self, m: &ParseMatch) -> &str {
        m.text(&self.ast.source().source)
    }

    /// Text of `m` with whitespace removed, for dotted names.
    pub fn compact_text(&self, m: &ParseMatch) -> String {
        self.text(m).chars().filter(|c| !c.is_whitespace()).collect()
    }

    pub fn rule_name(&self, m: &ParseMatch) -> Option<&str> {
        m.rule().map(|id| self.grammar.rule(id).name.as_str())
    }

    /// Keyword rules are named with quotes, e.g. `'if'`.
    pub fn is_keyword(&self, m: &ParseMatch) -> bool {
        self.rule_name(m).is_some_and(|n| n.starts_with('\''))
    }

    /// Rule children other than keywords.
    pub fn rules<'m>(&self, m: &'m ParseMatch) -> Vec<&'m ParseMatch> {
        m.rule_children()
            .into_iter()
            .filter(|c| !self.is_keyword(c))
            .collect()
    }

    /// First rule child named `name`.
    pub fn child_named<'m>(&self, m: &'m ParseMatch, name: &str) -> Option<&'m ParseMatch> {
        m.rule_children()
            .into_iter()
            .find(|c| self.rule_name(c) == Some(name))
    }

    /// All rule children named `name`.
    pub fn children_named<'m>(&self, m: &'m ParseMatch, name: &str) -> Vec<&'m ParseMatch> {
        m.rule_children()
            .into_iter()
            .filter(|c| self.rule_name(c) == Some(name))
            .collect()
    }

    /// Like [`AstBuilder::child_named`] but a structural error when absent.
    pub fn require<'m>(&self, m: &'m ParseMatch, name: &str) -> Result<&'m ParseMatch, Diagnostic> {
        self.child_named(m, name).ok_or_else(|| {
            self.error(
                m,
                ErrorCode::UNEXPECTED_INPUT,
                format!("expected {name} in {}", self.rule_name(m).unwrap_or("match")),
            )
        })
    }

    pub fn error(&self, m: &ParseMatch, code: ErrorCode, message: impl Into<String>) -> Diagnostic {
        let span = self.span(m);
        let line = self.ast.source().line(span.start_line).unwrap_or("");
        Diagnostic::new(code, message, span, line)
    }
}
