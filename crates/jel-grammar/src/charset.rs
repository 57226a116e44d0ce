//! Character classes for `chars` grammar elements.
//!
//! Set syntax follows the body of a regex bracket expression:
//! - `a-z` ranges, single characters, `\n` `\t` `\r` `\0` `\\` escapes
//! - a leading `^` negates the whole set
//! - `:name:` inserts a named class (`alpha`, `digit`, `alnum`, `space`,
//!   `ident_start`, `ident_part`, `hex`, `any`)

use std::fmt;

/// A named character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedClass {
    Alpha,
    Digit,
    Alnum,
    Space,
    IdentStart,
    IdentPart,
    Hex,
    Any,
}

impl NamedClass {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "alpha" => Self::Alpha,
            "digit" => Self::Digit,
            "alnum" => Self::Alnum,
            "space" => Self::Space,
            "ident_start" => Self::IdentStart,
            "ident_part" => Self::IdentPart,
            "hex" => Self::Hex,
            "any" => Self::Any,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Digit => "digit",
            Self::Alnum => "alnum",
            Self::Space => "space",
            Self::IdentStart => "ident_start",
            Self::IdentPart => "ident_part",
            Self::Hex => "hex",
            Self::Any => "any",
        }
    }

    fn contains(self, c: char) -> bool {
        match self {
            Self::Alpha => c.is_alphabetic(),
            Self::Digit => c.is_ascii_digit(),
            Self::Alnum => c.is_alphanumeric(),
            Self::Space => c.is_whitespace(),
            Self::IdentStart => c.is_alphabetic() || c == '_' || c == '$',
            Self::IdentPart => c.is_alphanumeric() || c == '_' || c == '$',
            Self::Hex => c.is_ascii_hexdigit(),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Single(char),
    Range(char, char),
    Class(NamedClass),
}

/// A set of characters, possibly negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    items: Vec<Item>,
    negated: bool,
    source: String,
}

impl CharSet {
    /// Parse a set pattern such as `a-zA-Z_` or `^"\\\n`.
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;
        let mut negated = false;
        if chars.len() > 1 && chars[0] == '^' {
            negated = true;
            i = 1;
        }

        let mut items = Vec::new();
        while i < chars.len() {
            let (c, next) = Self::read_char(&chars, i)?;
            // Named class `:name:`
            if chars[i] == ':' {
                if let Some(close) = chars[i + 1..].iter().position(|&c| c == ':') {
                    let name: String = chars[i + 1..i + 1 + close].iter().collect();
                    if let Some(class) = NamedClass::from_name(&name) {
                        items.push(Item::Class(class));
                        i += close + 2;
                        continue;
                    }
                }
            }
            // Range `a-z`
            if next + 1 < chars.len() && chars[next] == '-' {
                let (hi, after) = Self::read_char(&chars, next + 1)?;
                if hi < c {
                    return Err(format!("reversed range '{c}-{hi}' in set '{pattern}'"));
                }
                items.push(Item::Range(c, hi));
                i = after;
                continue;
            }
            items.push(Item::Single(c));
            i = next;
        }

        if items.is_empty() {
            return Err(format!("empty character set '{pattern}'"));
        }
        Ok(Self {
            items,
            negated,
            source: pattern.to_string(),
        })
    }

    /// A set holding one named class.
    pub fn named(class: NamedClass) -> Self {
        Self {
            items: vec![Item::Class(class)],
            negated: false,
            source: format!(":{}:", class.name()),
        }
    }

    fn read_char(chars: &[char], i: usize) -> Result<(char, usize), String> {
        if chars[i] != '\\' {
            return Ok((chars[i], i + 1));
        }
        let escaped = chars
            .get(i + 1)
            .ok_or_else(|| "dangling escape at end of character set".to_string())?;
        let c = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => *other,
        };
        Ok((c, i + 2))
    }

    /// Whether `c` belongs to the set.
    pub fn contains(&self, c: char) -> bool {
        let hit = self.items.iter().any(|item| match item {
            Item::Single(s) => *s == c,
            Item::Range(lo, hi) => *lo <= c && c <= *hi,
            Item::Class(class) => class.contains(c),
        });
        hit != self.negated
    }
}

impl fmt::Display for CharSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.source.escape_debug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_and_singles() {
        let set = CharSet::parse("a-cX_").unwrap();
        assert!(set.contains('a'));
        assert!(set.contains('c'));
        assert!(!set.contains('d'));
        assert!(set.contains('X'));
        assert!(set.contains('_'));
    }

    #[test]
    fn test_negation_and_escapes() {
        let set = CharSet::parse("^\"\\\\\\n").unwrap();
        assert!(set.contains('a'));
        assert!(!set.contains('"'));
        assert!(!set.contains('\\'));
        assert!(!set.contains('\n'));
    }

    #[test]
    fn test_lone_caret_is_literal() {
        let set = CharSet::parse("^").unwrap();
        assert!(set.contains('^'));
        assert!(!set.contains('a'));
    }

    #[test]
    fn test_named_classes() {
        let set = CharSet::parse(":ident_start:").unwrap();
        assert!(set.contains('$'));
        assert!(set.contains('x'));
        assert!(!set.contains('1'));
        let part = CharSet::named(NamedClass::IdentPart);
        assert!(part.contains('1'));
        assert!(!part.contains('-'));
    }

    #[test]
    fn test_trailing_dash_is_literal() {
        let set = CharSet::parse("+-").unwrap();
        assert!(set.contains('+'));
        assert!(set.contains('-'));
    }

    #[test]
    fn test_errors() {
        assert!(CharSet::parse("").is_err());
        assert!(CharSet::parse("z-a").is_err());
        assert!(CharSet::parse("\\").is_err());
    }
}
