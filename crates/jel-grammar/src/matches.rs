//! Match trees produced by the engine.

use std::fmt;
use std::rc::Rc;

use crate::grammar::{Grammar, RuleId};

/// What produced a [`ParseMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// A named grammar rule.
    Rule(RuleId),
    Literal,
    Chars,
    Whitespace,
    /// Anonymous `option`/`select` group.
    Group,
    /// A statement terminator.
    Terminator,
    /// A top-level, terminator-delimited statement.
    Statement,
}

/// Furthest failure seen while producing a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchError {
    /// Byte offset of the failure.
    pub offset: usize,
    /// Descriptions of what would have been accepted there.
    pub expected: Vec<String>,
}

impl MatchError {
    pub fn new(offset: usize, expected: impl Into<String>) -> Self {
        Self {
            offset,
            expected: vec![expected.into()],
        }
    }

    /// Keep the deeper failure; at equal depth merge the expectations.
    pub fn merge(a: Option<MatchError>, b: Option<MatchError>) -> Option<MatchError> {
        match (a, b) {
            (None, x) | (x, None) => x,
            (Some(a), Some(b)) => Some(if a.offset > b.offset {
                a
            } else if b.offset > a.offset {
                b
            } else {
                let mut merged = a;
                for e in b.expected {
                    if !merged.expected.contains(&e) {
                        merged.expected.push(e);
                    }
                }
                merged
            }),
        }
    }

    /// Human message, e.g. `expected ';' or Expression`.
    pub fn message(&self) -> String {
        match self.expected.as_slice() {
            [] => "unexpected input".to_string(),
            [one] => format!("expected {one}"),
            many => format!(
                "expected {} or {}",
                many[..many.len() - 1].join(", "),
                many[many.len() - 1]
            ),
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message(), self.offset)
    }
}

/// A recognized span of text and its matched sub-spans.
///
/// A match is complete only when every sub-match is complete. An
/// incomplete match keeps the partial children it managed to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseMatch {
    pub kind: MatchKind,
    pub offset: usize,
    pub len: usize,
    /// `None` for leaves.
    pub children: Option<Vec<Rc<ParseMatch>>>,
    pub complete: bool,
    /// Set on the match that failed; `furthest` carries it upwards.
    pub error: Option<MatchError>,
    /// Tag from the rule's `store_as`.
    pub tag: Option<String>,
    /// Whitespace, ignorables and terminators.
    pub trivia: bool,
    /// Length excluding trivia, used to rank alternatives.
    pub weight: usize,
    /// Deepest failure seen anywhere below this match.
    pub furthest: Option<MatchError>,
}

impl ParseMatch {
    /// A complete leaf.
    pub fn leaf(kind: MatchKind, offset: usize, len: usize, trivia: bool) -> Self {
        Self {
            kind,
            offset,
            len,
            children: None,
            complete: true,
            error: None,
            tag: None,
            trivia,
            weight: if trivia { 0 } else { len },
            furthest: None,
        }
    }

    /// A failed leaf at `offset`.
    pub fn failed(kind: MatchKind, offset: usize, error: MatchError) -> Self {
        Self {
            kind,
            offset,
            len: 0,
            children: None,
            complete: false,
            furthest: Some(error.clone()),
            error: Some(error),
            tag: None,
            trivia: false,
            weight: 0,
        }
    }

    /// A node over `children`, which must be contiguous from `offset`.
    pub fn node(
        kind: MatchKind,
        offset: usize,
        children: Vec<Rc<ParseMatch>>,
        complete: bool,
        furthest: Option<MatchError>,
    ) -> Self {
        let end = children.last().map(|c| c.end()).unwrap_or(offset);
        let weight = children.iter().map(|c| c.weight).sum();
        let furthest = children
            .iter()
            .fold(furthest, |acc, c| MatchError::merge(acc, c.furthest.clone()));
        Self {
            kind,
            offset,
            len: end - offset,
            children: Some(children),
            complete,
            error: if complete { None } else { furthest.clone() },
            tag: None,
            trivia: false,
            weight,
            furthest,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.offset..self.end()]
    }

    pub fn rule(&self) -> Option<RuleId> {
        match self.kind {
            MatchKind::Rule(id) => Some(id),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Rc<ParseMatch>] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Rule matches directly below this one. Anonymous groups are looked
    /// through, so a rule's elements appear flat.
    pub fn rule_children(&self) -> Vec<&ParseMatch> {
        let mut out = Vec::new();
        self.collect_rules(&mut out);
        out
    }

    fn collect_rules<'a>(&'a self, out: &mut Vec<&'a ParseMatch>) {
        for child in self.children() {
            if child.trivia {
                continue;
            }
            match child.kind {
                MatchKind::Rule(_) => out.push(child),
                MatchKind::Group | MatchKind::Statement => child.collect_rules(out),
                MatchKind::Literal
                | MatchKind::Chars
                | MatchKind::Whitespace
                | MatchKind::Terminator => {}
            }
        }
    }

    /// First rule match below this one carrying `tag`.
    pub fn find_tag(&self, tag: &str) -> Option<&ParseMatch> {
        self.rule_children()
            .into_iter()
            .find(|c| c.tag.as_deref() == Some(tag))
    }

    /// All rule matches below this one carrying `tag`, in order.
    pub fn find_tags(&self, tag: &str) -> Vec<&ParseMatch> {
        self.rule_children()
            .into_iter()
            .filter(|c| c.tag.as_deref() == Some(tag))
            .collect()
    }

    /// Whether a literal leaf with exactly `text` appears among this match's
    /// own (non-rule) descendants.
    pub fn has_literal(&self, source: &str, text: &str) -> bool {
        self.children().iter().any(|c| match c.kind {
            MatchKind::Literal => c.text(source) == text,
            MatchKind::Group => c.has_literal(source, text),
            _ => false,
        })
    }

    /// The root-rule match of a top-level statement.
    pub fn statement_root(&self) -> Option<&ParseMatch> {
        self.children()
            .iter()
            .map(Rc::as_ref)
            .find(|c| matches!(c.kind, MatchKind::Rule(_)) && !c.trivia)
    }

    /// Indented dump of the match tree (debugging and tests).
    pub fn dump(&self, grammar: &Grammar, source: &str) -> String {
        let mut out = String::new();
        self.dump_into(grammar, source, 0, &mut out);
        out
    }

    fn dump_into(&self, grammar: &Grammar, source: &str, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        let label = match self.kind {
            MatchKind::Rule(id) => grammar.rule(id).name.clone(),
            other => format!("{other:?}"),
        };
        out.push_str(&format!("{label} {:?}", self.text(source)));
        if !self.complete {
            out.push_str(" (incomplete)");
        }
        out.push('\n');
        for child in self.children() {
            child.dump_into(grammar, source, depth + 1, out);
        }
    }
}
