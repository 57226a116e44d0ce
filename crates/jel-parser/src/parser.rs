//! Text to AST: match statements, then run the node factories.

use std::sync::Arc;

use jel_grammar::{ConfigError, Grammar, MatchFailure, Matcher, ParseMatch};
use jel_types::ast::{Ast, NodeId};
use jel_types::{Diagnostic, ErrorCode, SourceFile};
use thiserror::Error;
use tracing::trace;

use crate::builder::{AstBuilder, Registry};

/// Name given to every parsed source.
pub const SOURCE_NAME: &str = "input";

/// Why text could not be turned into statements.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The text does not match the grammar.
    #[error("{0}")]
    Syntax(Diagnostic),
    /// The text is a valid prefix; more input could complete it.
    #[error("{0}")]
    Incomplete(Diagnostic),
    /// The text matched but a factory rejected its structure.
    #[error("{0}")]
    Structure(Diagnostic),
}

impl ParseError {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            Self::Syntax(d) | Self::Incomplete(d) | Self::Structure(d) => d,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }
}

impl From<MatchFailure> for ParseError {
    fn from(failure: MatchFailure) -> Self {
        match failure {
            MatchFailure::Syntax(d) => Self::Syntax(d),
            MatchFailure::Incomplete(d) => Self::Incomplete(d),
        }
    }
}

/// The statements of one parse call, in source order.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub ast: Ast,
    pub statements: Vec<NodeId>,
}

/// A grammar plus the factories for every implementation it names.
#[derive(Debug, Clone)]
pub struct Parser {
    matcher: Matcher,
    registry: Registry,
}

impl Parser {
    /// Pair a grammar with a registry. Every implementation named by the
    /// grammar must have a factory.
    pub fn new(grammar: Arc<Grammar>, registry: Registry) -> Result<Self, ConfigError> {
        if let Some((rule, implementation)) = grammar
            .implementations()
            .find(|(_, imp)| !registry.contains(imp))
        {
            return Err(ConfigError::UnknownImplementation {
                rule: rule.to_string(),
                implementation: implementation.to_string(),
            });
        }
        Ok(Self {
            matcher: Matcher::new(grammar),
            registry,
        })
    }

    /// The default Java-like grammar with its factories.
    pub fn java() -> Result<Self, ConfigError> {
        Self::new(Arc::new(crate::java::grammar()?), Registry::java())
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        self.matcher.grammar()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Split `text` into statement matches without building nodes.
    pub fn parse_matches(&self, text: &str) -> Result<Vec<ParseMatch>, ParseError> {
        Ok(self.matcher.parse_matches(text)?)
    }

    /// Build nodes for `matches` under `parent`. Statements made only of
    /// trivia and terminators produce no node.
    pub fn parse_structures(
        &self,
        ast: &mut Ast,
        parent: Option<NodeId>,
        matches: &[ParseMatch],
    ) -> Result<Vec<NodeId>, Diagnostic> {
        let grammar = self.matcher.grammar();
        let mut builder = AstBuilder::new(grammar, &self.registry, ast);
        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            if m.statement_root().is_none() {
                continue;
            }
            out.push(builder.build(parent, m)?);
        }
        Ok(out)
    }

    /// Parse `text` into an AST of top-level statements.
    pub fn parse(&self, text: &str) -> Result<Parsed, ParseError> {
        let matches = self.parse_matches(text)?;
        let mut ast = Ast::new(SourceFile::new(SOURCE_NAME, text));
        let statements = self
            .parse_structures(&mut ast, None, &matches)
            .map_err(ParseError::Structure)?;
        trace!(statements = statements.len(), nodes = ast.len(), "parsed");
        Ok(Parsed { ast, statements })
    }

    /// Parse a standalone type such as `List<String>[]`.
    pub fn parse_type(&self, text: &str) -> Result<(Ast, NodeId), ParseError> {
        let rule = self.grammar().lookup("Type").ok_or_else(|| {
            ParseError::Syntax(Diagnostic::detached(
                ErrorCode::UNRESOLVED_RULE,
                "grammar has no 'Type' rule",
            ))
        })?;
        let m = self.matcher.match_rule(text, rule)?;
        let mut ast = Ast::new(SourceFile::new(SOURCE_NAME, text));
        let grammar = self.matcher.grammar();
        let mut builder = AstBuilder::new(grammar, &self.registry, &mut ast);
        let id = builder.build(None, &m).map_err(ParseError::Structure)?;
        Ok((ast, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jel_grammar::dsl::*;
    use jel_grammar::{GrammarBuilder, GrammarRule};

    #[test]
    fn test_missing_factory_is_rejected() {
        let mut b = GrammarBuilder::new("Main");
        b.add_rule(GrammarRule::new("Main", vec![lit("x")]).implementation("Nowhere"));
        let grammar = Arc::new(b.build().unwrap());
        let err = Parser::new(grammar, Registry::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UNKNOWN_IMPLEMENTATION);
    }

    #[test]
    fn test_incomplete_maps_to_incomplete() {
        let parser = Parser::java().unwrap();
        let err = parser.parse("if (x > 0").unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(err.diagnostic().code, ErrorCode::MORE_INPUT_NEEDED);
    }
}
