//! Evaluation errors.
//!
//! Semantic errors are reported before anything runs. Execution errors
//! carry the exception object that was thrown so `catch` blocks and hosts
//! can inspect it. Aborts (cancellation, loop limits) cannot be caught.

use jel_model::Value;
use jel_types::{Diagnostic, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Static check failure: types, scoping, member resolution.
    #[error("{0}")]
    Semantic(Diagnostic),
    /// An exception escaped evaluation.
    #[error("{diagnostic}")]
    Execution {
        diagnostic: Diagnostic,
        exception: Value,
    },
    /// Evaluation was stopped from outside or hit a resource limit.
    #[error("{0}")]
    Aborted(Diagnostic),
}

impl EvalError {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            Self::Semantic(d) | Self::Aborted(d) => d,
            Self::Execution { diagnostic, .. } => diagnostic,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.diagnostic().code
    }

    /// The thrown exception object, for execution errors.
    pub fn exception(&self) -> Option<&Value> {
        match self {
            Self::Execution { exception, .. } => Some(exception),
            _ => None,
        }
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic(_))
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
