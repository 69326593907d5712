//! Integer and Float share one method table; mixed operands promote to
//! Float.
use std::cmp::Ordering;

use super::{PrimitiveDesc, PrimitiveResult, arg, expect_str};
use crate::{Float, Integer, RuntimeError, VM, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }

    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn operator(op: &str) -> &str {
    match op {
        "add" => "+",
        "sub" => "-",
        "mul" => "*",
        "div" => "/",
        "mod" => "%",
        other => other,
    }
}

/// `op` is the method name: `add`, `sub`, `mul`, `div` or `mod`.
///
/// Integer overflow raises a range error and integer division by zero
/// raises; float arithmetic follows IEEE 754.
pub fn arithmetic(op: &str, a: Number, b: Number) -> Result<Number, RuntimeError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let result = match op {
                "add" => x.checked_add(y),
                "sub" => x.checked_sub(y),
                "mul" => x.checked_mul(y),
                "div" | "mod" if y == 0 => return Err(RuntimeError::DivideByZero),
                "div" => x.checked_div(y),
                "mod" => x.checked_rem_euclid(y),
                _ => return Err(RuntimeError::malformed(format!("unknown operator {op}"))),
            };
            result.map(Number::Int).ok_or_else(|| {
                RuntimeError::range(format!("integer overflow in {x} {} {y}", operator(op)))
            })
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let result = match op {
                "add" => x + y,
                "sub" => x - y,
                "mul" => x * y,
                "div" => x / y,
                "mod" => x.rem_euclid(y),
                _ => return Err(RuntimeError::malformed(format!("unknown operator {op}"))),
            };
            Ok(Number::Float(result))
        }
    }
}

pub(crate) fn to_value(vm: &mut VM, n: Number) -> Value {
    match n {
        Number::Int(i) => vm.alloc_integer(i),
        Number::Float(f) => vm.alloc_float(f),
    }
}

fn expect_number(vm: &VM, value: Value) -> Result<Number, RuntimeError> {
    vm.number(value).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "expected a number, got {}",
            vm.type_name(value)
        ))
    })
}

fn binop(vm: &mut VM, op: &str, a: Value, b: Value) -> PrimitiveResult {
    let (x, y) = match (vm.number(a), vm.number(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "unsupported operand types for {}: {} and {}",
                operator(op),
                vm.type_name(a),
                vm.type_name(b)
            )));
        }
    };
    let result = arithmetic(op, x, y)?;
    Ok(to_value(vm, result))
}

fn add(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    binop(vm, "add", a, b)
}

fn sub(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    binop(vm, "sub", a, b)
}

fn mul(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    binop(vm, "mul", a, b)
}

fn div(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    binop(vm, "div", a, b)
}

fn rem(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    binop(vm, "mod", a, b)
}

fn ordering(vm: &VM, a: Value, b: Value) -> Result<Option<Ordering>, RuntimeError> {
    let x = expect_number(vm, a)?;
    let y = expect_number(vm, b)?;
    Ok(x.compare(y))
}

fn lt(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    Ok(Value::from_bool(ordering(vm, a, b)? == Some(Ordering::Less)))
}

fn le(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    let o = ordering(vm, a, b)?;
    Ok(Value::from_bool(matches!(o, Some(Ordering::Less | Ordering::Equal))))
}

fn gt(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    Ok(Value::from_bool(ordering(vm, a, b)? == Some(Ordering::Greater)))
}

fn ge(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    let o = ordering(vm, a, b)?;
    Ok(Value::from_bool(matches!(o, Some(Ordering::Greater | Ordering::Equal))))
}

fn neg(vm: &mut VM, a: Value) -> PrimitiveResult {
    let result = match expect_number(vm, a)? {
        Number::Int(n) => Number::Int(
            n.checked_neg()
                .ok_or_else(|| RuntimeError::range(format!("integer overflow in -{n}")))?,
        ),
        Number::Float(f) => Number::Float(-f),
    };
    Ok(to_value(vm, result))
}

fn abs(vm: &mut VM, a: Value) -> PrimitiveResult {
    let result = match expect_number(vm, a)? {
        Number::Int(n) => Number::Int(
            n.checked_abs()
                .ok_or_else(|| RuntimeError::range(format!("integer overflow in abs({n})")))?,
        ),
        Number::Float(f) => Number::Float(f.abs()),
    };
    Ok(to_value(vm, result))
}

fn float_to_int(f: f64) -> Result<i64, RuntimeError> {
    // i64::MAX is not representable, the first float past the range is 2^63
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(RuntimeError::range(format!("{f} cannot be converted to an Integer")))
    }
}

fn rounded(vm: &mut VM, a: Value, round: fn(f64) -> f64) -> PrimitiveResult {
    let n = match expect_number(vm, a)? {
        Number::Int(n) => n,
        Number::Float(f) => float_to_int(round(f))?,
    };
    Ok(vm.alloc_integer(n))
}

fn to_int(vm: &mut VM, a: Value) -> PrimitiveResult {
    rounded(vm, a, f64::trunc)
}

fn floor(vm: &mut VM, a: Value) -> PrimitiveResult {
    rounded(vm, a, f64::floor)
}

fn ceil(vm: &mut VM, a: Value) -> PrimitiveResult {
    rounded(vm, a, f64::ceil)
}

fn round(vm: &mut VM, a: Value) -> PrimitiveResult {
    rounded(vm, a, f64::round)
}

fn to_float(vm: &mut VM, a: Value) -> PrimitiveResult {
    let f = expect_number(vm, a)?.as_f64();
    Ok(vm.alloc_float(f))
}

fn sqrt(vm: &mut VM, a: Value) -> PrimitiveResult {
    let f = expect_number(vm, a)?.as_f64();
    Ok(vm.alloc_float(f.sqrt()))
}

fn is_nan(vm: &mut VM, a: Value) -> PrimitiveResult {
    let n = expect_number(vm, a)?;
    Ok(Value::from_bool(matches!(n, Number::Float(f) if f.is_nan())))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::binary("add", add),
    PrimitiveDesc::binary("sub", sub),
    PrimitiveDesc::binary("mul", mul),
    PrimitiveDesc::binary("div", div),
    PrimitiveDesc::binary("mod", rem),
    PrimitiveDesc::binary("lt", lt),
    PrimitiveDesc::binary("le", le),
    PrimitiveDesc::binary("gt", gt),
    PrimitiveDesc::binary("ge", ge),
    PrimitiveDesc::unary("neg", neg),
    PrimitiveDesc::unary("abs", abs),
    PrimitiveDesc::unary("to_int", to_int),
    PrimitiveDesc::unary("to_float", to_float),
    PrimitiveDesc::unary("floor", floor),
    PrimitiveDesc::unary("ceil", ceil),
    PrimitiveDesc::unary("round", round),
    PrimitiveDesc::unary("sqrt", sqrt),
    PrimitiveDesc::unary("is_nan", is_nan),
];

/// `Integer(x)` converts numbers and parses strings.
pub(crate) fn construct_integer(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    if args.len() != 1 {
        return Err(RuntimeError::arity(1, args.len()));
    }
    let value = arg(args, 0, 1)?;
    let n = match vm.number(value) {
        Some(Number::Int(n)) => n,
        Some(Number::Float(f)) => float_to_int(f.trunc())?,
        None => {
            let text = expect_str(vm, value, "Integer argument")?;
            text.trim().parse::<i64>().map_err(|_| {
                RuntimeError::type_error(format!("cannot parse {text:?} as an Integer"))
            })?
        }
    };
    if ty == vm.special().integer {
        Ok(vm.alloc_integer(n))
    } else {
        Ok(vm.alloc(ty, Integer { value: n }))
    }
}

/// `Float(x)` converts numbers and parses strings.
pub(crate) fn construct_float(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    if args.len() != 1 {
        return Err(RuntimeError::arity(1, args.len()));
    }
    let value = arg(args, 0, 1)?;
    let f = match vm.number(value) {
        Some(n) => n.as_f64(),
        None => {
            let text = expect_str(vm, value, "Float argument")?;
            text.trim().parse::<f64>().map_err(|_| {
                RuntimeError::type_error(format!("cannot parse {text:?} as a Float"))
            })?
        }
    };
    Ok(vm.alloc(ty, Float { value: f }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(
            arithmetic("add", Number::Int(3), Number::Int(4)).expect("add"),
            Number::Int(7)
        );
        assert_eq!(
            arithmetic("div", Number::Int(7), Number::Int(2)).expect("div"),
            Number::Int(3)
        );
        assert_eq!(
            arithmetic("mod", Number::Int(-7), Number::Int(3)).expect("mod"),
            Number::Int(2)
        );
    }

    #[test]
    fn mixed_operands_promote_to_float() {
        assert_eq!(
            arithmetic("mul", Number::Int(2), Number::Float(1.5)).expect("mul"),
            Number::Float(3.0)
        );
    }

    #[test]
    fn integer_division_by_zero_raises_but_float_does_not() {
        assert!(matches!(
            arithmetic("div", Number::Int(1), Number::Int(0)),
            Err(RuntimeError::DivideByZero)
        ));
        assert_eq!(
            arithmetic("div", Number::Float(1.0), Number::Int(0)).expect("ieee"),
            Number::Float(f64::INFINITY)
        );
    }

    #[test]
    fn overflow_is_a_range_error() {
        assert!(matches!(
            arithmetic("add", Number::Int(i64::MAX), Number::Int(1)),
            Err(RuntimeError::RangeError(_))
        ));
        assert!(matches!(
            arithmetic("div", Number::Int(i64::MIN), Number::Int(-1)),
            Err(RuntimeError::RangeError(_))
        ));
    }

    #[test]
    fn comparisons_cross_representations() {
        let mut vm = VM::default();
        let one = vm.alloc_integer(1);
        let half = vm.alloc_float(0.5);
        assert_eq!(lt(&mut vm, half, one).expect("lt"), Value::TRUE);
        assert_eq!(ge(&mut vm, half, one).expect("ge"), Value::FALSE);
        let nan = vm.alloc_float(f64::NAN);
        assert_eq!(le(&mut vm, nan, one).expect("le"), Value::FALSE);
    }

    #[test]
    fn float_conversion_rejects_out_of_range() {
        assert_eq!(float_to_int(-2.7).expect("in range"), -2);
        assert!(float_to_int(f64::NAN).is_err());
        assert!(float_to_int(1e19).is_err());
    }
}
