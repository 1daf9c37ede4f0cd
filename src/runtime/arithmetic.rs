//! IL operators over runtime values
//!
//! Integer arithmetic wraps. `Remainder` takes the sign of the dividend and
//! `Modulo` the sign of the divisor, for integers and floats alike.
//! Arithmetic on composites applies component-wise.

use super::value::Value;
use crate::error::{Error, Result};
use crate::il::OpCode;

fn unsupported(opcode: OpCode, left: &Value, right: &Value) -> Error {
    Error::runtime(format!(
        "{:?} is not defined for {} and {}",
        opcode,
        left.type_name(),
        right.type_name()
    ))
}

fn division_by_zero(opcode: OpCode) -> Error {
    Error::runtime(format!("integer division by zero in {:?}", opcode))
}

fn floor_int(left: i32, right: i32) -> i32 {
    let remainder = left.wrapping_rem(right);
    if remainder != 0 && (remainder < 0) != (right < 0) {
        remainder.wrapping_add(right)
    } else {
        remainder
    }
}

fn floor_float(left: f32, right: f32) -> f32 {
    let remainder = left % right;
    if remainder != 0.0 && (remainder < 0.0) != (right < 0.0) {
        remainder + right
    } else {
        remainder
    }
}

fn is_arithmetic(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::Add
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide
            | OpCode::Modulo
            | OpCode::Remainder
    )
}

/// `left opcode right` for every binary IL opcode
pub fn binary(opcode: OpCode, left: &Value, right: &Value) -> Result<Value> {
    use Value::{Bool, Composite, Float, Int, UInt};

    let value = match (left, right) {
        (Composite(l), Composite(r)) if is_arithmetic(opcode) && l.len() == r.len() => Composite(
            l.iter()
                .zip(r)
                .map(|(l, r)| binary(opcode, l, r))
                .collect::<Result<_>>()?,
        ),
        (UInt(l), UInt(r)) => {
            let (l, r) = (*l, *r);
            match opcode {
                OpCode::Add => UInt(l.wrapping_add(r)),
                OpCode::Subtract => UInt(l.wrapping_sub(r)),
                OpCode::Multiply => UInt(l.wrapping_mul(r)),
                OpCode::Divide => UInt(l.checked_div(r).ok_or_else(|| division_by_zero(opcode))?),
                OpCode::Modulo | OpCode::Remainder => {
                    UInt(l.checked_rem(r).ok_or_else(|| division_by_zero(opcode))?)
                }
                _ => compare(opcode, &l, &r).ok_or_else(|| unsupported(opcode, left, right))?,
            }
        }
        (Int(l), Int(r)) => {
            let (l, r) = (*l, *r);
            if r == 0 && matches!(opcode, OpCode::Divide | OpCode::Modulo | OpCode::Remainder) {
                return Err(division_by_zero(opcode));
            }
            match opcode {
                OpCode::Add => Int(l.wrapping_add(r)),
                OpCode::Subtract => Int(l.wrapping_sub(r)),
                OpCode::Multiply => Int(l.wrapping_mul(r)),
                OpCode::Divide => Int(l.wrapping_div(r)),
                OpCode::Remainder => Int(l.wrapping_rem(r)),
                OpCode::Modulo => Int(floor_int(l, r)),
                _ => compare(opcode, &l, &r).ok_or_else(|| unsupported(opcode, left, right))?,
            }
        }
        (Float(l), Float(r)) => {
            let (l, r) = (*l, *r);
            match opcode {
                OpCode::Add => Float(l + r),
                OpCode::Subtract => Float(l - r),
                OpCode::Multiply => Float(l * r),
                OpCode::Divide => Float(l / r),
                OpCode::Remainder => Float(l % r),
                OpCode::Modulo => Float(floor_float(l, r)),
                _ => compare(opcode, &l, &r).ok_or_else(|| unsupported(opcode, left, right))?,
            }
        }
        (Bool(l), Bool(r)) => match opcode {
            OpCode::Equal => Bool(l == r),
            OpCode::NotEqual => Bool(l != r),
            OpCode::And => Bool(*l && *r),
            OpCode::Or => Bool(*l || *r),
            _ => return Err(unsupported(opcode, left, right)),
        },
        _ => return Err(unsupported(opcode, left, right)),
    };
    Ok(value)
}

fn compare<T: PartialOrd>(opcode: OpCode, left: &T, right: &T) -> Option<Value> {
    let result = match opcode {
        OpCode::Equal => left == right,
        OpCode::NotEqual => left != right,
        OpCode::Less => left < right,
        OpCode::LessOrEqual => left <= right,
        OpCode::Greater => left > right,
        OpCode::GreaterOrEqual => left >= right,
        _ => return None,
    };
    Some(Value::Bool(result))
}

/// `Negate` or `Not`
pub fn unary(opcode: OpCode, operand: &Value) -> Result<Value> {
    let value = match (opcode, operand) {
        (OpCode::Negate, Value::Int(value)) => Value::Int(value.wrapping_neg()),
        (OpCode::Negate, Value::Float(value)) => Value::Float(-value),
        (OpCode::Negate, Value::Composite(members)) => Value::Composite(
            members
                .iter()
                .map(|member| unary(opcode, member))
                .collect::<Result<_>>()?,
        ),
        (OpCode::Not, Value::Bool(value)) => Value::Bool(!value),
        _ => {
            return Err(Error::runtime(format!(
                "{:?} is not defined for {}",
                opcode,
                operand.type_name()
            )))
        }
    };
    Ok(value)
}

/// `left ** right` on floats
pub fn power(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Float(base), Value::Float(exponent)) => Ok(Value::Float(base.powf(*exponent))),
        _ => Err(Error::runtime(format!(
            "Power is not defined for {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_wraps() {
        assert_eq!(
            binary(OpCode::Subtract, &Value::UInt(0), &Value::UInt(1)).unwrap(),
            Value::UInt(u32::MAX)
        );
        assert_eq!(
            binary(OpCode::Add, &Value::UInt(5), &Value::UInt(3)).unwrap(),
            Value::UInt(8)
        );
    }

    #[test]
    fn test_signed_remainder_and_modulo() {
        let rem = binary(OpCode::Remainder, &Value::Int(-7), &Value::Int(3)).unwrap();
        let modulo = binary(OpCode::Modulo, &Value::Int(-7), &Value::Int(3)).unwrap();
        assert_eq!(rem, Value::Int(-1));
        assert_eq!(modulo, Value::Int(2));
        assert_eq!(
            binary(OpCode::Modulo, &Value::Int(7), &Value::Int(-3)).unwrap(),
            Value::Int(-2)
        );
    }

    #[test]
    fn test_float_modulo_follows_divisor() {
        assert_eq!(
            binary(OpCode::Remainder, &Value::Float(-5.5), &Value::Float(2.0)).unwrap(),
            Value::Float(-1.5)
        );
        assert_eq!(
            binary(OpCode::Modulo, &Value::Float(-5.5), &Value::Float(2.0)).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_integer_division_by_zero_traps() {
        assert!(binary(OpCode::Divide, &Value::UInt(1), &Value::UInt(0)).is_err());
        assert!(binary(OpCode::Remainder, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(binary(OpCode::Divide, &Value::Int(i32::MIN), &Value::Int(-1)).is_ok());
    }

    #[test]
    fn test_vector_arithmetic() {
        let left = Value::Composite(vec![Value::Float(1.0), Value::Float(2.0)]);
        let right = Value::Composite(vec![Value::Float(0.5), Value::Float(4.0)]);
        assert_eq!(
            binary(OpCode::Multiply, &left, &right).unwrap(),
            Value::Composite(vec![Value::Float(0.5), Value::Float(8.0)])
        );
        assert!(binary(OpCode::Less, &left, &right).is_err());
    }

    #[test]
    fn test_mixed_operands_fail() {
        assert!(binary(OpCode::Add, &Value::UInt(1), &Value::Int(1)).is_err());
        assert!(unary(OpCode::Negate, &Value::UInt(1)).is_err());
        assert_eq!(unary(OpCode::Not, &Value::Bool(false)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_power() {
        assert_eq!(
            power(&Value::Float(2.0), &Value::Float(3.0)).unwrap(),
            Value::Float(8.0)
        );
    }
}
