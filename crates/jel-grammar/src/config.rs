//! Hierarchical grammar configuration.
//!
//! A grammar document is a tree of [`ConfigNode`]s, usually deserialized
//! from JSON:
//!
//! ```json
//! { "name": "grammar", "attributes": { "root": "Sum" }, "children": [
//!   { "name": "rule", "attributes": { "name": "Sum" }, "children": [
//!     { "name": "ref", "attributes": { "rule": "Num" } },
//!     { "name": "option", "attributes": { "min": "0", "max": "*" }, "children": [
//!       { "name": "literal", "attributes": { "text": "+" } },
//!       { "name": "ref", "attributes": { "rule": "Num" } } ] } ] },
//!   { "name": "rule", "attributes": { "name": "Num", "contiguous": "true" }, "children": [
//!     { "name": "chars", "attributes": { "set": "0-9", "min": "1", "max": "*" } } ] } ] }
//! ```
//!
//! Element node names: `literal`, `chars`, `whitespace`, `option`,
//! `forbid`, `select`, `ref`. A `terminator` child of the grammar node
//! replaces the default terminator list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::charset::CharSet;
use crate::grammar::{ConfigError, Element, Grammar, GrammarBuilder, GrammarRule, RuleRef};

/// One node of a grammar configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| {
            ConfigError::Malformed(format!("'{}' node is missing attribute '{key}'", self.name))
        })
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key) {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(ConfigError::Malformed(format!(
                "attribute '{key}' of '{}' must be true or false, got '{other}'",
                self.name
            ))),
        }
    }

    fn count(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some("*") | Some("unbounded") => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| {
                ConfigError::Malformed(format!(
                    "attribute '{key}' of '{}' must be a count, got '{text}'",
                    self.name
                ))
            }),
        }
    }

    /// `min`/`max` pair with the option defaults: `0..=1`, or unbounded
    /// when only `min` is given.
    fn bounds(&self) -> Result<(u32, Option<u32>), ConfigError> {
        let min = self.count("min")?.unwrap_or(0);
        let max = match (self.get("min"), self.get("max")) {
            (_, Some(_)) => self.count("max")?,
            (Some(_), None) => None,
            (None, None) => Some(1),
        };
        Ok((min, max))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Loading
// ══════════════════════════════════════════════════════════════════════════════

/// Parse a JSON grammar document and build the grammar.
pub fn from_json(text: &str) -> Result<Grammar, ConfigError> {
    let node: ConfigNode = serde_json::from_str(text)?;
    load(&node)
}

/// Build a grammar from a configuration tree.
pub fn load(root: &ConfigNode) -> Result<Grammar, ConfigError> {
    if root.name != "grammar" {
        return Err(ConfigError::Malformed(format!(
            "expected a 'grammar' node, found '{}'",
            root.name
        )));
    }
    let mut builder = GrammarBuilder::new(root.require("root")?);
    let mut terminators = Vec::new();
    for child in &root.children {
        match child.name.as_str() {
            "rule" => {
                builder.add_rule(load_rule(child)?);
            }
            "terminator" => terminators.push(unescape(child.require("text")?)),
            other => {
                return Err(ConfigError::Malformed(format!(
                    "unexpected '{other}' node in grammar"
                )))
            }
        }
    }
    if !terminators.is_empty() {
        builder = builder.terminators(terminators);
    }
    builder.build()
}

fn load_rule(node: &ConfigNode) -> Result<GrammarRule, ConfigError> {
    let name = node.require("name")?;
    let elements = node
        .children
        .iter()
        .map(load_element)
        .collect::<Result<Vec<_>, _>>()?;
    let mut rule = GrammarRule::new(name, elements);
    if let Some(priority) = node.get("priority") {
        rule.priority = priority.parse().map_err(|_| {
            ConfigError::Malformed(format!("rule '{name}' has bad priority '{priority}'"))
        })?;
    }
    rule.ignorable = node.flag("ignorable")?;
    rule.contiguous = node.flag("contiguous")? || rule.ignorable;
    rule.implementation = node.get("implementation").map(str::to_string);
    rule.store_as = node.get("store_as").map(str::to_string);
    Ok(rule)
}

fn load_element(node: &ConfigNode) -> Result<Element, ConfigError> {
    let children = || {
        node.children
            .iter()
            .map(load_element)
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(match node.name.as_str() {
        "literal" => Element::Literal(unescape(node.require("text")?)),
        "chars" => {
            let pattern = node.require("set")?;
            let set = CharSet::parse(pattern).map_err(ConfigError::Malformed)?;
            let min = node.count("min")?.unwrap_or(1);
            let max = match (node.get("min"), node.get("max")) {
                (_, Some(_)) => node.count("max")?,
                (Some(_), None) => None,
                (None, None) => Some(1),
            };
            Element::Chars { set, min, max }
        }
        "whitespace" => Element::Whitespace,
        "option" => {
            let (min, max) = node.bounds()?;
            Element::Option {
                elements: children()?,
                min,
                max,
            }
        }
        "forbid" => {
            let (min, max) = node.bounds()?;
            Element::Forbid {
                elements: children()?,
                min,
                max,
            }
        }
        "select" => Element::Select(children()?),
        "ref" => Element::Rule(RuleRef {
            name: node.require("rule")?.to_string(),
            id: None,
        }),
        other => {
            return Err(ConfigError::Malformed(format!(
                "unknown element kind '{other}'"
            )))
        }
    })
}

/// Literal text in documents may spell control characters as escapes.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
