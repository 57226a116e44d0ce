//! REPL driver: parse, validate and run text against one environment.

use std::rc::Rc;

use jel_grammar::ConfigError;
use jel_model::{ClassRegistry, Type, Value};
use jel_parser::{ParseError, Parser};
use jel_types::Diagnostic;
use thiserror::Error;
use tracing::trace;

use crate::env::Environment;
use crate::error::EvalError;
use crate::evaluator::{EvalOptions, Evaluator};

/// Result of one top-level statement.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Source text of the statement.
    pub text: String,
    pub ty: Type,
    pub value: Option<Value>,
    /// `toString()` of the value, for display.
    pub display: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The text is an unfinished statement; buffer more input.
    #[error("{0}")]
    Incomplete(Diagnostic),
    #[error("{0}")]
    Parse(ParseError),
    #[error("{0}")]
    Eval(EvalError),
}

impl SessionError {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            Self::Incomplete(d) => d,
            Self::Parse(e) => e.diagnostic(),
            Self::Eval(e) => e.diagnostic(),
        }
    }
}

impl From<ParseError> for SessionError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Incomplete(d) => Self::Incomplete(d),
            other => Self::Parse(other),
        }
    }
}

impl From<EvalError> for SessionError {
    fn from(error: EvalError) -> Self {
        Self::Eval(error)
    }
}

pub struct Session {
    parser: Parser,
    evaluator: Evaluator,
    env: Environment,
}

impl Session {
    pub fn new(parser: Parser, evaluator: Evaluator, env: Environment) -> Self {
        Self {
            parser,
            evaluator,
            env,
        }
    }

    /// The default grammar over the built-in classes.
    pub fn java(options: EvalOptions) -> Result<Self, ConfigError> {
        let registry = Rc::new(ClassRegistry::with_builtins());
        Ok(Self::new(
            Parser::java()?,
            Evaluator::new(registry.clone(), options),
            Environment::new(registry),
        ))
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run every statement of `text` in order. Each statement is checked
    /// first, then run in a transaction that is committed only when it
    /// succeeds. Earlier statements stay committed when a later one fails.
    pub fn run(&self, text: &str) -> Result<Vec<Outcome>, SessionError> {
        let parsed = self.parser.parse(text)?;
        let ast = Rc::new(parsed.ast);
        let mut outcomes = Vec::with_capacity(parsed.statements.len());
        for statement in parsed.statements {
            trace!(kind = ast.kind(statement).label(), "session statement");
            self.evaluator.validate(&ast, statement, &self.env, None)?;
            let tx = self.env.transact();
            let result = self.evaluator.evaluate(&ast, statement, &tx, None, true)?;
            tx.commit().map_err(|e| {
                EvalError::Semantic(ast.diagnostic(statement, e.code(), e.to_string()))
            })?;
            let display = match &result.value {
                Some(v) => Some(
                    self.evaluator
                        .registry()
                        .to_display(v)
                        .unwrap_or_else(|e| e.to_string()),
                ),
                None => None,
            };
            outcomes.push(Outcome {
                text: ast.text(statement).to_string(),
                ty: result.ty,
                value: result.value,
                display,
            });
        }
        Ok(outcomes)
    }

    /// Run `text` and return the last statement's outcome.
    pub fn eval(&self, text: &str) -> Result<Option<Outcome>, SessionError> {
        Ok(self.run(text)?.pop())
    }
}
