//! Primitive operator semantics.
//!
//! Boxed and primitive values share one representation, so these work on
//! [`Value`]s directly. Static typing happens in the evaluator; a `null`
//! operand here means an unboxing failure.

use jel_model::{HostError, Primitive, Value};
use jel_types::ast::{BinaryOp, UnaryOp};

/// Result primitive of `a op b`, or `None` when the operands don't fit.
pub(crate) fn binary_type(op: BinaryOp, a: Primitive, b: Primitive) -> Option<Primitive> {
    use BinaryOp::*;
    let both_bool = a == Primitive::Boolean && b == Primitive::Boolean;
    match op {
        Add | Sub | Mul | Div | Rem => a.promote(b),
        Shl | Shr | UShr => {
            if a.is_integral() && b.is_integral() {
                a.promote_unary()
            } else {
                None
            }
        }
        Lt | Gt | Le | Ge => a.promote(b).map(|_| Primitive::Boolean),
        Eq | Ne => {
            if both_bool || a.promote(b).is_some() {
                Some(Primitive::Boolean)
            } else {
                None
            }
        }
        BitAnd | BitOr | BitXor => {
            if both_bool {
                Some(Primitive::Boolean)
            } else if a.is_integral() && b.is_integral() {
                a.promote(b)
            } else {
                None
            }
        }
        And | Or => both_bool.then_some(Primitive::Boolean),
    }
}

/// Result primitive of `op a`.
pub(crate) fn unary_type(op: UnaryOp, a: Primitive) -> Option<Primitive> {
    match op {
        UnaryOp::Not => (a == Primitive::Boolean).then_some(a),
        UnaryOp::Plus | UnaryOp::Neg => a.promote_unary(),
        UnaryOp::BitNot => {
            if a.is_integral() {
                a.promote_unary()
            } else {
                None
            }
        }
    }
}

fn unboxing_null() -> HostError {
    HostError::null_pointer("cannot unbox a null value")
}

fn unsupported(op: &str) -> HostError {
    HostError::illegal_argument(format!("bad operand types for '{op}'"))
}

/// `left op right` for primitive (or boxed) operands.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, HostError> {
    let (Some(a), Some(b)) = (left.primitive(), right.primitive()) else {
        return Err(unboxing_null());
    };
    if a == Primitive::Boolean || b == Primitive::Boolean {
        return logical(op, left.as_bool(), right.as_bool());
    }
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr) {
        return shift(op, a, left, right);
    }
    let promoted = a.promote(b).ok_or_else(|| unsupported(op.symbol()))?;
    let (Some(x), Some(y)) = (left.convert(promoted), right.convert(promoted)) else {
        return Err(unsupported(op.symbol()));
    };
    match (x, y) {
        (Value::Int(x), Value::Int(y)) => int_op(op, x, y),
        (Value::Long(x), Value::Long(y)) => long_op(op, x, y),
        (Value::Float(x), Value::Float(y)) => {
            float_op(op, x as f64, y as f64).map(|v| match v {
                Value::Double(d) => Value::Float(d as f32),
                other => other,
            })
        }
        (Value::Double(x), Value::Double(y)) => float_op(op, x, y),
        _ => Err(unsupported(op.symbol())),
    }
}

fn logical(op: BinaryOp, a: Option<bool>, b: Option<bool>) -> Result<Value, HostError> {
    let (Some(a), Some(b)) = (a, b) else {
        return Err(unsupported(op.symbol()));
    };
    Ok(Value::Boolean(match op {
        BinaryOp::And | BinaryOp::BitAnd => a && b,
        BinaryOp::Or | BinaryOp::BitOr => a || b,
        BinaryOp::BitXor | BinaryOp::Ne => a != b,
        BinaryOp::Eq => a == b,
        other => return Err(unsupported(other.symbol())),
    }))
}

macro_rules! integral_op {
    ($name:ident, $ty:ty, $wrap:path) => {
        fn $name(op: BinaryOp, x: $ty, y: $ty) -> Result<Value, HostError> {
            use BinaryOp::*;
            Ok(match op {
                Add => $wrap(x.wrapping_add(y)),
                Sub => $wrap(x.wrapping_sub(y)),
                Mul => $wrap(x.wrapping_mul(y)),
                Div | Rem if y == 0 => return Err(HostError::arithmetic("/ by zero")),
                Div => $wrap(x.wrapping_div(y)),
                Rem => $wrap(x.wrapping_rem(y)),
                BitAnd => $wrap(x & y),
                BitOr => $wrap(x | y),
                BitXor => $wrap(x ^ y),
                Lt => Value::Boolean(x < y),
                Gt => Value::Boolean(x > y),
                Le => Value::Boolean(x <= y),
                Ge => Value::Boolean(x >= y),
                Eq => Value::Boolean(x == y),
                Ne => Value::Boolean(x != y),
                Shl | Shr | UShr | And | Or => return Err(unsupported(op.symbol())),
            })
        }
    };
}

integral_op!(int_op, i32, Value::Int);
integral_op!(long_op, i64, Value::Long);

/// IEEE arithmetic; `%` truncates like `fmod`.
fn float_op(op: BinaryOp, x: f64, y: f64) -> Result<Value, HostError> {
    use BinaryOp::*;
    Ok(match op {
        Add => Value::Double(x + y),
        Sub => Value::Double(x - y),
        Mul => Value::Double(x * y),
        Div => Value::Double(x / y),
        Rem => Value::Double(x % y),
        Lt => Value::Boolean(x < y),
        Gt => Value::Boolean(x > y),
        Le => Value::Boolean(x <= y),
        Ge => Value::Boolean(x >= y),
        Eq => Value::Boolean(x == y),
        Ne => Value::Boolean(x != y),
        other => return Err(unsupported(other.symbol())),
    })
}

/// Shift distances are masked to the width of the promoted left operand.
fn shift(
    op: BinaryOp,
    left_kind: Primitive,
    left: &Value,
    right: &Value,
) -> Result<Value, HostError> {
    let distance = right.as_i64().ok_or_else(|| unsupported(op.symbol()))?;
    let value = left.as_i64().ok_or_else(|| unsupported(op.symbol()))?;
    if left_kind.promote_unary() == Some(Primitive::Long) {
        let d = (distance & 0x3f) as u32;
        return Ok(Value::Long(match op {
            BinaryOp::Shl => value.wrapping_shl(d),
            BinaryOp::Shr => value.wrapping_shr(d),
            _ => ((value as u64) >> d) as i64,
        }));
    }
    let x = value as i32;
    let d = (distance & 0x1f) as u32;
    Ok(Value::Int(match op {
        BinaryOp::Shl => x.wrapping_shl(d),
        BinaryOp::Shr => x.wrapping_shr(d),
        _ => ((x as u32) >> d) as i32,
    }))
}

/// `op operand`.
pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, HostError> {
    let kind = operand.primitive().ok_or_else(unboxing_null)?;
    if op == UnaryOp::Not {
        return operand
            .as_bool()
            .map(|b| Value::Boolean(!b))
            .ok_or_else(|| unsupported(op.symbol()));
    }
    let promoted = kind.promote_unary().ok_or_else(|| unsupported(op.symbol()))?;
    let value = operand
        .convert(promoted)
        .ok_or_else(|| unsupported(op.symbol()))?;
    Ok(match (op, value) {
        (UnaryOp::Plus, v) => v,
        (UnaryOp::Neg, Value::Int(v)) => Value::Int(v.wrapping_neg()),
        (UnaryOp::Neg, Value::Long(v)) => Value::Long(v.wrapping_neg()),
        (UnaryOp::Neg, Value::Float(v)) => Value::Float(-v),
        (UnaryOp::Neg, Value::Double(v)) => Value::Double(-v),
        (UnaryOp::BitNot, Value::Int(v)) => Value::Int(!v),
        (UnaryOp::BitNot, Value::Long(v)) => Value::Long(!v),
        _ => return Err(unsupported(op.symbol())),
    })
}

/// `value + delta` computed in the promoted type, narrowed back to the
/// value's own primitive (`++`/`--` on a `byte` wraps as a `byte`).
pub(crate) fn step(value: &Value, delta: i32) -> Result<Value, HostError> {
    let kind = value.primitive().ok_or_else(unboxing_null)?;
    let sum = binary(BinaryOp::Add, value, &Value::Int(delta))?;
    sum.convert(kind).ok_or_else(|| unsupported("++"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int(i32::MAX), &Value::Int(1)),
            Ok(Value::Int(i32::MIN))
        );
        assert_eq!(
            binary(BinaryOp::Div, &Value::Int(i32::MIN), &Value::Int(-1)),
            Ok(Value::Int(i32::MIN))
        );
        assert_eq!(
            binary(BinaryOp::Rem, &Value::Int(-7), &Value::Int(2)),
            Ok(Value::Int(-1))
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.exception, "java.lang.ArithmeticException");
        assert_eq!(err.message.as_deref(), Some("/ by zero"));
        let inf = binary(BinaryOp::Div, &Value::Double(1.0), &Value::Int(0)).unwrap();
        assert_eq!(inf, Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_promotion() {
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Char(2), &Value::Byte(3)),
            Ok(Value::Int(6))
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int(1), &Value::Long(2)),
            Ok(Value::Long(3))
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::Float(0.5), &Value::Int(1)),
            Ok(Value::Float(1.5))
        );
        assert_eq!(
            binary_type(BinaryOp::Add, Primitive::Short, Primitive::Byte),
            Some(Primitive::Int)
        );
        assert_eq!(binary_type(BinaryOp::And, Primitive::Int, Primitive::Int), None);
    }

    #[test]
    fn test_shifts_mask_distance() {
        assert_eq!(
            binary(BinaryOp::Shl, &Value::Int(1), &Value::Int(33)),
            Ok(Value::Int(2))
        );
        assert_eq!(
            binary(BinaryOp::UShr, &Value::Int(-1), &Value::Int(28)),
            Ok(Value::Int(15))
        );
        assert_eq!(
            binary(BinaryOp::Shr, &Value::Long(-16), &Value::Int(2)),
            Ok(Value::Long(-4))
        );
    }

    #[test]
    fn test_nan_comparisons() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(binary(BinaryOp::Eq, &nan, &nan), Ok(Value::Boolean(false)));
        assert_eq!(binary(BinaryOp::Ne, &nan, &nan), Ok(Value::Boolean(true)));
        assert_eq!(binary(BinaryOp::Lt, &nan, &Value::Int(0)), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_unary_and_step() {
        assert_eq!(unary(UnaryOp::Neg, &Value::Byte(5)), Ok(Value::Int(-5)));
        assert_eq!(unary(UnaryOp::BitNot, &Value::Int(0)), Ok(Value::Int(-1)));
        assert_eq!(unary(UnaryOp::Not, &Value::Boolean(true)), Ok(Value::Boolean(false)));
        assert_eq!(step(&Value::Byte(127), 1), Ok(Value::Byte(-128)));
        assert_eq!(step(&Value::Char(98), -1), Ok(Value::Char(97)));
        assert!(step(&Value::Null, 1).is_err());
    }
}
