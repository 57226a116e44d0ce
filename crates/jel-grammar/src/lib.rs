//! JEL grammar model and match engine.
//!
//! Grammars are declarative: rules built from literals, character sets,
//! whitespace, optional/repeated groups, negative lookahead, selections and
//! rule references. The [`Matcher`] turns text into [`ParseMatch`] trees,
//! one per terminator-delimited statement.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jel_grammar::dsl::*;
//! use jel_grammar::{GrammarBuilder, GrammarRule, Matcher};
//!
//! let grammar = GrammarBuilder::new("Sum")
//!     .rule(GrammarRule::new("Sum", vec![rule("Num"), many(vec![lit("+"), rule("Num")])]))
//!     .rule(GrammarRule::new("Num", vec![chars("0-9", 1, None)]).contiguous())
//!     .build()
//!     .unwrap();
//! let matcher = Matcher::new(Arc::new(grammar));
//! let statements = matcher.parse_matches("1 + 2; 3").unwrap();
//! assert_eq!(statements.len(), 2);
//! ```

pub mod charset;
pub mod config;
pub mod grammar;
pub mod matcher;
pub mod matches;

pub use charset::{CharSet, NamedClass};
pub use config::ConfigNode;
pub use grammar::{dsl, ConfigError, Element, Grammar, GrammarBuilder, GrammarRule, RuleId, RuleRef};
pub use matcher::{MatchFailure, Matcher, MemoCache};
pub use matches::{MatchError, MatchKind, ParseMatch};
