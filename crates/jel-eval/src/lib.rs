//! JEL evaluation.
//!
//! [`Environment`] holds variables, functions, imports and history in
//! nested scopes with transactions. [`Evaluator`] validates and runs AST
//! nodes against an environment. [`Session`] ties a parser, an evaluator
//! and a root environment into a REPL driver.
//!
//! # Example
//!
//! ```
//! use jel_eval::{EvalOptions, Session};
//! use jel_model::Value;
//!
//! let session = Session::java(EvalOptions::default()).unwrap();
//! let outcomes = session.run("int x = 5; x++; x").unwrap();
//! assert_eq!(outcomes[2].value, Some(Value::Int(6)));
//! assert_eq!(session.env().history(0), Some(Value::Int(6)));
//! ```

pub mod env;
pub mod error;
pub mod evaluator;
pub mod persist;
pub mod session;

pub use env::{Caught, EnvError, Environment, Function, Param, ScopeKind, StaticImport, Variable};
pub use error::{EvalError, EvalResult};
pub use evaluator::{EvalOptions, Evaluated, Evaluator};
pub use persist::{Decoder, Encoded, Encoder, PersistError, Record};
pub use session::{Outcome, Session, SessionError};
