//! Declarative grammar model.
//!
//! A [`Grammar`] is a set of named [`GrammarRule`]s, each an ordered list of
//! [`Element`]s. Grammars are assembled with [`GrammarBuilder`] (or loaded
//! from a config tree, see [`crate::config`]) and are immutable once built:
//! every rule reference is resolved to a [`RuleId`] and every `select` is
//! ordered by rule priority at build time.

use std::collections::HashMap;

use jel_types::{Diagnostic, ErrorCode};
use thiserror::Error;

use crate::charset::CharSet;

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

/// Grammar configuration failure, raised only while a grammar is loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate rule '{0}'")]
    DuplicateRule(String),

    #[error("rule '{rule}' references unknown rule '{reference}'")]
    UnresolvedRule { rule: String, reference: String },

    #[error("unknown root rule '{0}'")]
    UnknownRoot(String),

    #[error("rule '{rule}' names unknown implementation '{implementation}'")]
    UnknownImplementation { rule: String, implementation: String },

    #[error("malformed grammar: {0}")]
    Malformed(String),

    #[error("invalid grammar document: {0}")]
    Document(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateRule(_) => ErrorCode::DUPLICATE_RULE,
            Self::UnresolvedRule { .. } | Self::UnknownRoot(_) => ErrorCode::UNRESOLVED_RULE,
            Self::UnknownImplementation { .. } => ErrorCode::UNKNOWN_IMPLEMENTATION,
            Self::Malformed(_) | Self::Document(_) => ErrorCode::MALFORMED_GRAMMAR,
        }
    }

    /// Structured form for hosts that report every error as a [`Diagnostic`].
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::detached(self.code(), self.to_string())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Elements & rules
// ══════════════════════════════════════════════════════════════════════════════

/// Index of a rule inside its [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

/// A named rule reference. `id` is filled in when the grammar is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub name: String,
    pub id: Option<RuleId>,
}

/// One element of a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Exact text.
    Literal(String),
    /// A character class repeated `min..=max` times, matched as one leaf.
    Chars {
        set: CharSet,
        min: u32,
        max: Option<u32>,
    },
    /// One or more whitespace characters.
    Whitespace,
    /// Optional or repeated group.
    Option {
        elements: Vec<Element>,
        min: u32,
        max: Option<u32>,
    },
    /// Negative lookahead: fails when the group occurs at least
    /// `max(min, 1)` (and at most `max`) times at this position.
    Forbid {
        elements: Vec<Element>,
        min: u32,
        max: Option<u32>,
    },
    /// Alternatives; the engine keeps the best candidate.
    Select(Vec<Element>),
    /// Reference to another rule.
    Rule(RuleRef),
}

impl Element {
    /// Short human description used in "expected ..." messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(text) => format!("'{}'", text.escape_debug()),
            Self::Chars { set, .. } => format!("character in {set}"),
            Self::Whitespace => "whitespace".to_string(),
            Self::Option { elements, .. } | Self::Forbid { elements, .. } => elements
                .first()
                .map(Element::describe)
                .unwrap_or_else(|| "nothing".to_string()),
            Self::Select(alts) => alts
                .iter()
                .map(Element::describe)
                .collect::<Vec<_>>()
                .join(" or "),
            Self::Rule(r) => r.name.clone(),
        }
    }

    fn visit_refs_mut(&mut self, f: &mut dyn FnMut(&mut RuleRef)) {
        match self {
            Self::Rule(r) => f(r),
            Self::Option { elements, .. } | Self::Forbid { elements, .. } => {
                for e in elements {
                    e.visit_refs_mut(f);
                }
            }
            Self::Select(alts) => {
                for e in alts {
                    e.visit_refs_mut(f);
                }
            }
            Self::Literal(_) | Self::Chars { .. } | Self::Whitespace => {}
        }
    }
}

/// A named, prioritized grammar rule.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarRule {
    pub name: String,
    /// Higher priority alternatives are tried first inside a `select`.
    pub priority: i32,
    /// Ignorable rules (comments) are consumed between elements like whitespace.
    pub ignorable: bool,
    /// Contiguous rules do not skip whitespace or ignorables between their elements.
    pub contiguous: bool,
    /// Identifier of the AST node factory for this rule.
    pub implementation: Option<String>,
    /// Tag copied onto every match of this rule.
    pub store_as: Option<String>,
    pub elements: Vec<Element>,
}

impl GrammarRule {
    pub fn new(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            ignorable: false,
            contiguous: false,
            implementation: None,
            store_as: None,
            elements,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn ignorable(mut self) -> Self {
        self.ignorable = true;
        self.contiguous = true;
        self
    }

    pub fn contiguous(mut self) -> Self {
        self.contiguous = true;
        self
    }

    pub fn implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    pub fn store_as(mut self, tag: impl Into<String>) -> Self {
        self.store_as = Some(tag.into());
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Grammar
// ══════════════════════════════════════════════════════════════════════════════

/// Default statement terminators.
pub const DEFAULT_TERMINATORS: [&str; 2] = ["\n", ";"];

/// An immutable, fully resolved grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: Vec<GrammarRule>,
    index: HashMap<String, RuleId>,
    root: RuleId,
    ignorables: Vec<RuleId>,
    terminators: Vec<String>,
}

impl Grammar {
    pub fn rule(&self, id: RuleId) -> &GrammarRule {
        &self.rules[id.0 as usize]
    }

    pub fn rules(&self) -> &[GrammarRule] {
        &self.rules
    }

    pub fn lookup(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn ignorables(&self) -> &[RuleId] {
        &self.ignorables
    }

    pub fn terminators(&self) -> &[String] {
        &self.terminators
    }

    /// Iterate `(rule name, implementation)` pairs.
    pub fn implementations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().filter_map(|r| {
            r.implementation
                .as_deref()
                .map(|imp| (r.name.as_str(), imp))
        })
    }
}

/// Assembles and validates a [`Grammar`].
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    root: String,
    rules: Vec<GrammarRule>,
    terminators: Vec<String>,
}

impl GrammarBuilder {
    /// Start a grammar whose statements are matched by `root`.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            rules: Vec::new(),
            terminators: DEFAULT_TERMINATORS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn rule(mut self, rule: GrammarRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: GrammarRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn terminators<I, S>(mut self, terminators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminators = terminators.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve references, order selections and freeze the grammar.
    pub fn build(self) -> Result<Grammar, ConfigError> {
        let mut index = HashMap::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(ConfigError::Malformed("rule with empty name".into()));
            }
            if index.insert(rule.name.clone(), RuleId(i as u32)).is_some() {
                return Err(ConfigError::DuplicateRule(rule.name.clone()));
            }
        }
        let root = *index
            .get(&self.root)
            .ok_or_else(|| ConfigError::UnknownRoot(self.root.clone()))?;

        if self.terminators.iter().any(|t| t.is_empty()) {
            return Err(ConfigError::Malformed("empty terminator".into()));
        }

        let priorities: Vec<i32> = self.rules.iter().map(|r| r.priority).collect();
        let mut rules = self.rules;
        for rule in &mut rules {
            let owner = rule.name.clone();
            let mut failure = None;
            for element in &mut rule.elements {
                element.visit_refs_mut(&mut |r| match index.get(&r.name) {
                    Some(id) => r.id = Some(*id),
                    None => {
                        failure.get_or_insert_with(|| ConfigError::UnresolvedRule {
                            rule: owner.clone(),
                            reference: r.name.clone(),
                        });
                    }
                });
                check_counts(&owner, element)?;
                order_selects(element, &priorities);
            }
            if let Some(err) = failure {
                return Err(err);
            }
            if rule.elements.is_empty() {
                return Err(ConfigError::Malformed(format!("rule '{owner}' has no elements")));
            }
        }

        let ignorables = rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.ignorable)
            .map(|(i, _)| RuleId(i as u32))
            .collect();

        Ok(Grammar {
            rules,
            index,
            root,
            ignorables,
            terminators: self.terminators,
        })
    }
}

fn check_counts(rule: &str, element: &Element) -> Result<(), ConfigError> {
    match element {
        Element::Option { elements, min, max } | Element::Forbid { elements, min, max } => {
            if elements.is_empty() {
                return Err(ConfigError::Malformed(format!("rule '{rule}' has an empty group")));
            }
            if let Some(max) = max {
                if max < min || *max == 0 {
                    return Err(ConfigError::Malformed(format!(
                        "rule '{rule}' has invalid occurrence bounds {min}..{max}"
                    )));
                }
            }
            for e in elements {
                check_counts(rule, e)?;
            }
        }
        Element::Chars { min, max, .. } => {
            if let Some(max) = max {
                if max < min || *max == 0 {
                    return Err(ConfigError::Malformed(format!(
                        "rule '{rule}' has invalid character bounds {min}..{max}"
                    )));
                }
            }
        }
        Element::Select(alts) => {
            if alts.is_empty() {
                return Err(ConfigError::Malformed(format!("rule '{rule}' has an empty select")));
            }
            for e in alts {
                check_counts(rule, e)?;
            }
        }
        Element::Literal(text) if text.is_empty() => {
            return Err(ConfigError::Malformed(format!("rule '{rule}' has an empty literal")));
        }
        Element::Literal(_) | Element::Whitespace | Element::Rule(_) => {}
    }
    Ok(())
}

/// Stable-sort every `select` by descending priority of referenced rules.
fn order_selects(element: &mut Element, priorities: &[i32]) {
    match element {
        Element::Select(alts) => {
            for alt in alts.iter_mut() {
                order_selects(alt, priorities);
            }
            alts.sort_by_key(|alt| match alt {
                Element::Rule(RuleRef { id: Some(id), .. }) => -priorities[id.0 as usize],
                _ => 0,
            });
        }
        Element::Option { elements, .. } | Element::Forbid { elements, .. } => {
            for e in elements {
                order_selects(e, priorities);
            }
        }
        Element::Literal(_) | Element::Chars { .. } | Element::Whitespace | Element::Rule(_) => {}
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Element constructors
// ══════════════════════════════════════════════════════════════════════════════

/// Terse constructors for writing grammars in Rust.
pub mod dsl {
    use super::{Element, RuleRef};
    use crate::charset::{CharSet, NamedClass};

    pub fn lit(text: &str) -> Element {
        Element::Literal(text.to_string())
    }

    /// Characters from a set pattern (see [`CharSet::parse`]).
    ///
    /// Panics on a malformed pattern; intended for grammars written in code.
    pub fn chars(pattern: &str, min: u32, max: Option<u32>) -> Element {
        let set = CharSet::parse(pattern).unwrap_or_else(|e| panic!("bad character set: {e}"));
        Element::Chars { set, min, max }
    }

    /// Exactly one character of a named class.
    pub fn class(class: NamedClass) -> Element {
        Element::Chars {
            set: CharSet::named(class),
            min: 1,
            max: Some(1),
        }
    }

    pub fn ws() -> Element {
        Element::Whitespace
    }

    /// Zero or one occurrence.
    pub fn opt(elements: Vec<Element>) -> Element {
        Element::Option {
            elements,
            min: 0,
            max: Some(1),
        }
    }

    /// Zero or more occurrences.
    pub fn many(elements: Vec<Element>) -> Element {
        Element::Option {
            elements,
            min: 0,
            max: None,
        }
    }

    /// One or more occurrences.
    pub fn many1(elements: Vec<Element>) -> Element {
        Element::Option {
            elements,
            min: 1,
            max: None,
        }
    }

    /// Exactly one occurrence: a plain sequence group.
    pub fn group(elements: Vec<Element>) -> Element {
        Element::Option {
            elements,
            min: 1,
            max: Some(1),
        }
    }

    pub fn repeat(elements: Vec<Element>, min: u32, max: Option<u32>) -> Element {
        Element::Option { elements, min, max }
    }

    pub fn forbid(elements: Vec<Element>) -> Element {
        Element::Forbid {
            elements,
            min: 1,
            max: None,
        }
    }

    pub fn select(alternatives: Vec<Element>) -> Element {
        Element::Select(alternatives)
    }

    pub fn rule(name: &str) -> Element {
        Element::Rule(RuleRef {
            name: name.to_string(),
            id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::dsl::*;
    use super::*;

    #[test]
    fn test_build_resolves_references() {
        let g = GrammarBuilder::new("Sum")
            .rule(GrammarRule::new("Sum", vec![rule("Num"), many(vec![lit("+"), rule("Num")])]))
            .rule(GrammarRule::new("Num", vec![chars("0-9", 1, None)]).contiguous())
            .build()
            .unwrap();
        let sum = g.lookup("Sum").unwrap();
        assert_eq!(g.root(), sum);
        match &g.rule(sum).elements[0] {
            Element::Rule(r) => assert_eq!(r.id, g.lookup("Num")),
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_rule() {
        let err = GrammarBuilder::new("A")
            .rule(GrammarRule::new("A", vec![lit("a")]))
            .rule(GrammarRule::new("A", vec![lit("b")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRule(ref n) if n == "A"));
        assert_eq!(err.code(), ErrorCode::DUPLICATE_RULE);
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.code, ErrorCode::DUPLICATE_RULE);
        assert!(diagnostic.message.contains('A'));
    }

    #[test]
    fn test_unresolved_reference() {
        let err = GrammarBuilder::new("A")
            .rule(GrammarRule::new("A", vec![opt(vec![rule("Missing")])]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnresolvedRule { ref reference, .. } if reference == "Missing"
        ));
    }

    #[test]
    fn test_unknown_root() {
        let err = GrammarBuilder::new("Nope")
            .rule(GrammarRule::new("A", vec![lit("a")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRoot(_)));
    }

    #[test]
    fn test_invalid_bounds() {
        let err = GrammarBuilder::new("A")
            .rule(GrammarRule::new("A", vec![repeat(vec![lit("a")], 3, Some(2))]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_select_ordered_by_priority() {
        let g = GrammarBuilder::new("S")
            .rule(GrammarRule::new("S", vec![select(vec![rule("Low"), rule("High")])]))
            .rule(GrammarRule::new("Low", vec![lit("x")]).priority(1))
            .rule(GrammarRule::new("High", vec![lit("x")]).priority(5))
            .build()
            .unwrap();
        let s = g.lookup("S").unwrap();
        match &g.rule(s).elements[0] {
            Element::Select(alts) => {
                assert_eq!(alts[0].describe(), "High");
                assert_eq!(alts[1].describe(), "Low");
            }
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn test_ignorables_collected() {
        let g = GrammarBuilder::new("A")
            .rule(GrammarRule::new("A", vec![lit("a")]))
            .rule(GrammarRule::new("Comment", vec![lit("#"), chars("^\\n", 0, None)]).ignorable())
            .build()
            .unwrap();
        assert_eq!(g.ignorables(), &[g.lookup("Comment").unwrap()]);
        assert!(g.rule(g.lookup("Comment").unwrap()).contiguous);
    }
}
