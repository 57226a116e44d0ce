//! Shared types for JEL.
//!
//! This crate defines source spans, structured diagnostics and the arena
//! AST shared by the grammar engine, the AST builder and the evaluator.

mod error;
mod span;
pub mod ast;

pub use error::{Diagnostic, ErrorCategory, ErrorCode};
pub use span::{SourceFile, Span};

/// Result type used throughout JEL for diagnostics-bearing operations.
pub type Result<T> = std::result::Result<T, Diagnostic>;
