//! Expression factories.

use jel_grammar::ParseMatch;
use jel_types::ast::{AssignOp, BinaryOp, Literal, NodeId, NodeKind, StepOp, UnaryOp};
use jel_types::{Diagnostic, ErrorCode};

use crate::builder::{AstBuilder, Registry};

pub(crate) fn register(registry: &mut Registry) {
    registry.register("Assign", assign);
    registry.register("Conditional", conditional);
    registry.register("BinaryChain", binary_chain);
    registry.register("Prefix", prefix);
    registry.register("PreStep", pre_step);
    registry.register("Cast", cast);
    registry.register("Postfix", postfix);
    registry.register("Call", call);
    registry.register("Name", name);
    registry.register("New", new_object);
    registry.register("NewArray", new_array);
    registry.register("ClassLiteral", class_literal);
    registry.register("IntegerLiteral", integer_literal);
    registry.register("FloatLiteral", float_literal);
    registry.register("CharLiteral", char_literal);
    registry.register("StringLiteral", string_literal);
    registry.register("BooleanLiteral", boolean_literal);
    registry.register("NullLiteral", null_literal);
}

type Built = Result<NodeId, Diagnostic>;

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn assign(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let target = b.require(m, "Postfix")?;
    let op_match = b.require(m, "AssignOp")?;
    let value = b.require(m, "Expression")?;
    let op = AssignOp::from_symbol(b.text(op_match)).ok_or_else(|| {
        b.error(op_match, ErrorCode::UNEXPECTED_INPUT, "unknown assignment operator")
    })?;
    let node = b.node(NodeKind::Assign(op), m, parent);
    b.build(Some(node), target)?;
    b.build(Some(node), value)?;
    Ok(node)
}

fn conditional(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let parts = b.rules(m);
    if parts.len() != 3 {
        return Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "malformed conditional expression"));
    }
    let node = b.node(NodeKind::Conditional, m, parent);
    b.build_all(node, &parts)?;
    Ok(node)
}

/// `operand (op operand)*` folded to the left. Also handles
/// `expr instanceof Type` links in the relational chain.
fn binary_chain(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let parts = m.rule_children();
    let Some((first, rest)) = parts.split_first() else {
        return Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "empty operator chain"));
    };
    if rest.is_empty() {
        return b.build(parent, first);
    }

    let mut left = b.build(None, first)?;
    for pair in rest.chunks(2) {
        let [op_match, operand] = pair else {
            return Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "dangling operator"));
        };
        let kind = if op_match.tag.as_deref() == Some("instanceof") {
            NodeKind::InstanceOf
        } else {
            let op = BinaryOp::from_symbol(b.text(op_match)).ok_or_else(|| {
                b.error(op_match, ErrorCode::UNEXPECTED_INPUT, "unknown operator")
            })?;
            NodeKind::Binary(op)
        };
        let right = b.build(None, operand)?;
        let node = b.node_spanning(kind, m.offset, operand.end(), None);
        b.adopt(node, left);
        b.adopt(node, right);
        left = node;
    }
    if let Some(p) = parent {
        b.adopt(p, left);
    }
    Ok(left)
}

fn prefix(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let op_match = b.require(m, "PrefixOp")?;
    let operand = b.require(m, "Unary")?;
    let op = UnaryOp::from_symbol(b.text(op_match))
        .ok_or_else(|| b.error(op_match, ErrorCode::UNEXPECTED_INPUT, "unknown operator"))?;

    // `-2147483648` is only representable with its sign attached.
    if op == UnaryOp::Neg {
        if let Ok(literal) = parse_integer(b.text(operand), true) {
            return Ok(b.node(NodeKind::Literal(literal), m, parent));
        }
    }

    let node = b.node(NodeKind::Unary(op), m, parent);
    b.build(Some(node), operand)?;
    Ok(node)
}

fn step_op(b: &AstBuilder<'_>, m: &ParseMatch) -> Result<StepOp, Diagnostic> {
    match b.text(m) {
        "++" => Ok(StepOp::Increment),
        "--" => Ok(StepOp::Decrement),
        _ => Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "expected '++' or '--'")),
    }
}

fn pre_step(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let op = step_op(b, b.require(m, "StepOp")?)?;
    let operand = b.require(m, "Unary")?;
    let node = b.node(NodeKind::Step { op, prefix: true }, m, parent);
    b.build(Some(node), operand)?;
    Ok(node)
}

fn cast(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let parts = b.rules(m);
    let [ty, operand] = parts.as_slice() else {
        return Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "malformed cast"));
    };
    let node = b.node(NodeKind::Cast, m, parent);
    b.build(Some(node), ty)?;
    b.build(Some(node), operand)?;
    Ok(node)
}

// ══════════════════════════════════════════════════════════════════════════════
// Postfix, calls & names
// ══════════════════════════════════════════════════════════════════════════════

/// `primary (.name | .name(args) | [index] | ++ | --)*`
fn postfix(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let parts = m.rule_children();
    let Some((primary, suffixes)) = parts.split_first() else {
        return Err(b.error(m, ErrorCode::UNEXPECTED_INPUT, "empty postfix expression"));
    };
    if suffixes.is_empty() {
        return b.build(parent, primary);
    }

    let mut current = b.build(None, primary)?;
    for suffix in suffixes {
        let end = suffix.end();
        let node = match suffix.tag.as_deref() {
            Some("member") => {
                let ident = b.require(suffix, "Identifier")?;
                let name = b.text(ident).to_string();
                match b.child_named(suffix, "Arguments") {
                    Some(args) => {
                        let kind = NodeKind::Call {
                            name,
                            qualified: true,
                        };
                        let node = b.node_spanning(kind, m.offset, end, None);
                        b.adopt(node, current);
                        let args = b.rules(args);
                        b.build_all(node, &args)?;
                        node
                    }
                    None => {
                        let node = b.node_spanning(NodeKind::Field(name), m.offset, end, None);
                        b.adopt(node, current);
                        node
                    }
                }
            }
            Some("index") => {
                let index = b.require(suffix, "Expression")?;
                let node = b.node_spanning(NodeKind::Index, m.offset, end, None);
                b.adopt(node, current);
                b.build(Some(node), index)?;
                node
            }
            Some("step") => {
                let op = step_op(b, suffix)?;
                let kind = NodeKind::Step { op, prefix: false };
                let node = b.node_spanning(kind, m.offset, end, None);
                b.adopt(node, current);
                node
            }
            _ => return Err(b.error(suffix, ErrorCode::UNEXPECTED_INPUT, "unknown postfix suffix")),
        };
        current = node;
    }
    if let Some(p) = parent {
        b.adopt(p, current);
    }
    Ok(current)
}

fn call(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = b.text(b.require(m, "Identifier")?).to_string();
    let args = b.rules(b.require(m, "Arguments")?);
    let node = b.node(
        NodeKind::Call {
            name,
            qualified: false,
        },
        m,
        parent,
    );
    b.build_all(node, &args)?;
    Ok(node)
}

fn name(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let name = b.text(m).to_string();
    Ok(b.node(NodeKind::Name(name), m, parent))
}

fn new_object(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let ty = b.require(m, "CreatedType")?;
    let args = b.rules(b.require(m, "Arguments")?);
    let node = b.node(NodeKind::New, m, parent);
    b.build(Some(node), ty)?;
    b.build_all(node, &args)?;
    Ok(node)
}

fn new_array(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let element = b.require(m, "ElementType")?;
    let sized = m.find_tags("dimexpr");
    let dims = sized.len() + m.find_tags("dim").len();
    let node = b.node(NodeKind::NewArray { dims }, m, parent);
    b.build(Some(node), element)?;
    for dim in sized {
        let expr = b.require(dim, "Expression")?;
        b.build(Some(node), expr)?;
    }
    if let Some(init) = b.child_named(m, "ArrayInit") {
        b.build(Some(node), init)?;
    }
    Ok(node)
}

fn class_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let ty = b.require(m, "Type")?;
    let node = b.node(NodeKind::ClassLiteral, m, parent);
    b.build(Some(node), ty)?;
    Ok(node)
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

fn literal(
    b: &mut AstBuilder<'_>,
    parent: Option<NodeId>,
    m: &ParseMatch,
    value: Result<Literal, String>,
) -> Built {
    match value {
        Ok(lit) => Ok(b.node(NodeKind::Literal(lit), m, parent)),
        Err(message) => Err(b.error(m, ErrorCode::MALFORMED_LITERAL, message)),
    }
}

fn integer_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let value = parse_integer(b.text(m), false);
    literal(b, parent, m, value)
}

fn float_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let value = parse_float(b.text(m));
    literal(b, parent, m, value)
}

fn char_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let text = b.text(m);
    let value = unescape(&text[1..text.len() - 1]).and_then(|s| {
        let units: Vec<u16> = s.encode_utf16().collect();
        match units.as_slice() {
            [unit] => Ok(Literal::Char(*unit)),
            _ => Err(format!("character literal {text} must hold exactly one character")),
        }
    });
    literal(b, parent, m, value)
}

fn string_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let text = b.text(m);
    let value = unescape(&text[1..text.len() - 1]).map(Literal::Str);
    literal(b, parent, m, value)
}

fn boolean_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    let value = b.text(m) == "true";
    Ok(b.node(NodeKind::Literal(Literal::Bool(value)), m, parent))
}

fn null_literal(b: &mut AstBuilder<'_>, parent: Option<NodeId>, m: &ParseMatch) -> Built {
    Ok(b.node(NodeKind::Literal(Literal::Null), m, parent))
}

/// Parse an integer literal (decimal, hex, octal or binary, optional `L`).
///
/// Decimal `int` literals may reach 2147483648 only when `negative`; hex,
/// octal and binary literals may use the full 32/64-bit pattern.
pub fn parse_integer(text: &str, negative: bool) -> Result<Literal, String> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (digits, long) = match cleaned.strip_suffix(['l', 'L']) {
        Some(d) => (d, true),
        None => (cleaned.as_str(), false),
    };
    let (digits, radix) = if let Some(hex) =
        digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };
    if digits.is_empty() {
        return Err(format!("malformed integer literal '{text}'"));
    }
    let magnitude = u64::from_str_radix(digits, radix)
        .map_err(|_| format!("integer literal '{text}' is out of range"))?;

    let out_of_range = || format!("integer literal '{text}' is out of range");
    if long {
        let value = if radix == 10 {
            let limit = i64::MAX as u64 + u64::from(negative);
            if magnitude > limit {
                return Err(out_of_range());
            }
            magnitude as i64
        } else {
            magnitude as i64
        };
        Ok(Literal::Long(if negative { value.wrapping_neg() } else { value }))
    } else {
        let value = if radix == 10 {
            let limit = i32::MAX as u64 + u64::from(negative);
            if magnitude > limit {
                return Err(out_of_range());
            }
            magnitude as u32 as i32
        } else {
            if magnitude > u64::from(u32::MAX) {
                return Err(out_of_range());
            }
            magnitude as u32 as i32
        };
        Ok(Literal::Int(if negative { value.wrapping_neg() } else { value }))
    }
}

/// Parse a floating point literal with an optional `f`/`d` suffix.
pub fn parse_float(text: &str) -> Result<Literal, String> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let malformed = |_| format!("malformed floating point literal '{text}'");
    if let Some(body) = cleaned.strip_suffix(['f', 'F']) {
        return body.parse::<f32>().map(Literal::Float).map_err(malformed);
    }
    let body = cleaned.strip_suffix(['d', 'D']).unwrap_or(&cleaned);
    body.parse::<f64>().map(Literal::Double).map_err(malformed)
}

/// Resolve backslash escapes inside a string or character literal.
pub fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&e) = chars.get(i) else {
            return Err("dangling escape".to_string());
        };
        i += 1;
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            's' => out.push(' '),
            '"' | '\'' | '\\' => out.push(e),
            'u' => {
                while chars.get(i) == Some(&'u') {
                    i += 1;
                }
                let hex: String = chars.iter().skip(i).take(4).collect();
                if hex.len() != 4 {
                    return Err("malformed unicode escape".to_string());
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("malformed unicode escape '\\u{hex}'"))?;
                // Lone surrogates cannot live in a Rust string.
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("unsupported unicode escape '\\u{hex}'"))?;
                out.push(ch);
                i += 4;
            }
            '0'..='7' => {
                let max = if e <= '3' { 3 } else { 2 };
                let mut value = e.to_digit(8).unwrap_or(0);
                let mut taken = 1;
                while taken < max {
                    match chars.get(i).and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            taken += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\0'));
            }
            other => return Err(format!("illegal escape '\\{other}'")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_radixes() {
        assert_eq!(parse_integer("42", false), Ok(Literal::Int(42)));
        assert_eq!(parse_integer("0x1F", false), Ok(Literal::Int(31)));
        assert_eq!(parse_integer("0b101", false), Ok(Literal::Int(5)));
        assert_eq!(parse_integer("017", false), Ok(Literal::Int(15)));
        assert_eq!(parse_integer("1_000L", false), Ok(Literal::Long(1000)));
        assert_eq!(parse_integer("0xFFFFFFFF", false), Ok(Literal::Int(-1)));
    }

    #[test]
    fn test_parse_integer_limits() {
        assert!(parse_integer("2147483648", false).is_err());
        assert_eq!(parse_integer("2147483648", true), Ok(Literal::Int(i32::MIN)));
        assert_eq!(
            parse_integer("9223372036854775808L", true),
            Ok(Literal::Long(i64::MIN))
        );
        assert!(parse_integer("9223372036854775808L", false).is_err());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("1.5"), Ok(Literal::Double(1.5)));
        assert_eq!(parse_float("2f"), Ok(Literal::Float(2.0)));
        assert_eq!(parse_float("1e3"), Ok(Literal::Double(1000.0)));
        assert_eq!(parse_float(".5d"), Ok(Literal::Double(0.5)));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\tb\\n").unwrap(), "a\tb\n");
        assert_eq!(unescape("\\u0041\\\\").unwrap(), "A\\");
        assert_eq!(unescape("\\101").unwrap(), "A");
        assert!(unescape("\\q").is_err());
    }
}
