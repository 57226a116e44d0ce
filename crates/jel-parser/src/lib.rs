//! AST construction for JEL.
//!
//! Turns the statement matches produced by `jel-grammar` into an arena
//! [`Ast`](jel_types::ast::Ast). Rules name an implementation; a
//! [`Registry`] maps implementation names to node factories. The default
//! Java-like grammar lives in [`java`].
//!
//! # Example
//!
//! ```
//! use jel_parser::Parser;
//!
//! let parser = Parser::java().unwrap();
//! let parsed = parser.parse("int x = 3 + 4 * 2;").unwrap();
//! assert_eq!(parsed.statements.len(), 1);
//! ```

pub mod builder;
mod build_expr;
mod build_stmt;
mod build_type;
pub mod java;
pub mod parser;

pub use build_expr::{parse_float, parse_integer, unescape};
pub use builder::{AstBuilder, NodeFactory, Registry};
pub use parser::{ParseError, Parsed, Parser, SOURCE_NAME};
