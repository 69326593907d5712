use super::{PrimitiveDesc, PrimitiveResult};
use crate::{ObjectKind, RuntimeError, Symbol, TypeObject, VM, Value};

/// Arrays nested deeper than this compare unequal instead of recursing.
const MAX_EQ_DEPTH: usize = 64;

/// Structural equality as `eq` defines it.
///
/// Numbers compare by value across Integer and Float, strings by content,
/// arrays element-wise. Other values are equal only to themselves unless
/// their type defines its own `eq` in bytecode.
pub fn values_equal(vm: &mut VM, a: Value, b: Value) -> Result<bool, RuntimeError> {
    equal_at(vm, a, b, 0)
}

fn equal_at(vm: &mut VM, a: Value, b: Value, depth: usize) -> Result<bool, RuntimeError> {
    if a == b {
        return Ok(true);
    }
    if let (Some(x), Some(y)) = (vm.number(a), vm.number(b)) {
        return Ok(x.compare(y) == Some(std::cmp::Ordering::Equal));
    }
    match (a.kind(), b.kind()) {
        (ObjectKind::String, ObjectKind::String) => Ok(vm.string_value(a) == vm.string_value(b)),
        (ObjectKind::Array, ObjectKind::Array) => {
            if depth >= MAX_EQ_DEPTH {
                return Ok(false);
            }
            let left = vm.array_elements(a).unwrap_or_default().to_vec();
            let right = vm.array_elements(b).unwrap_or_default().to_vec();
            if left.len() != right.len() {
                return Ok(false);
            }
            for (x, y) in left.into_iter().zip(right) {
                if !equal_at(vm, x, y, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => match vm.find_method(a, "eq") {
            Some(method) if method.kind() == ObjectKind::Function => {
                Ok(vm.call_method(a, method, &[b])?.is_truthy())
            }
            _ => Ok(false),
        },
    }
}

fn eq(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    Ok(Value::from_bool(values_equal(vm, a, b)?))
}

fn ne(vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    Ok(Value::from_bool(!values_equal(vm, a, b)?))
}

fn same(_vm: &mut VM, a: Value, b: Value) -> PrimitiveResult {
    Ok(Value::from_bool(a == b))
}

fn to_str(vm: &mut VM, a: Value) -> PrimitiveResult {
    let text = vm.display(a)?;
    Ok(vm.alloc_string(text))
}

fn to_repr(vm: &mut VM, a: Value) -> PrimitiveResult {
    let text = vm.repr(a)?;
    Ok(vm.alloc_string(text))
}

fn type_(vm: &mut VM, a: Value) -> PrimitiveResult {
    Ok(vm.type_of(a))
}

fn is_a(vm: &mut VM, a: Value, ty: Value) -> PrimitiveResult {
    if vm.heap.try_get::<TypeObject>(ty).is_none() {
        return Err(RuntimeError::type_error(format!(
            "is_a expects a type, got {}",
            vm.type_name(ty)
        )));
    }
    Ok(Value::from_bool(vm.is_instance_of(a, ty)))
}

fn responds_to(vm: &mut VM, a: Value, name: Value) -> PrimitiveResult {
    let name = match name.as_symbol() {
        Some(symbol) => symbol,
        None => match vm.string_value(name) {
            Some(text) => Symbol::intern(text),
            None => {
                return Err(RuntimeError::type_error(format!(
                    "responds_to expects a Symbol, got {}",
                    vm.type_name(name)
                )));
            }
        },
    };
    let ty = vm.type_of(a);
    Ok(Value::from_bool(
        crate::lookup::find_method(&vm.heap, ty, name).is_some(),
    ))
}

fn not(_vm: &mut VM, a: Value) -> PrimitiveResult {
    Ok(Value::from_bool(!a.is_truthy()))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::binary("eq", eq),
    PrimitiveDesc::binary("ne", ne),
    PrimitiveDesc::binary("same", same),
    PrimitiveDesc::unary("str", to_str),
    PrimitiveDesc::unary("repr", to_repr),
    PrimitiveDesc::unary("type", type_),
    PrimitiveDesc::binary("is_a", is_a),
    PrimitiveDesc::binary("responds_to", responds_to),
];

pub const BOOLEAN_METHODS: &[PrimitiveDesc] = &[PrimitiveDesc::unary("not", not)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_by_value_and_strings_by_content() {
        let mut vm = VM::default();
        let a = vm.alloc_integer(2);
        let b = vm.alloc_float(2.0);
        assert!(values_equal(&mut vm, a, b).expect("eq"));
        let s = vm.alloc_string("x");
        let t = vm.alloc_string("x");
        assert!(values_equal(&mut vm, s, t).expect("eq"));
        assert!(!values_equal(&mut vm, s, a).expect("eq"));
    }

    #[test]
    fn arrays_compare_element_wise() {
        let mut vm = VM::default();
        let one = vm.alloc_integer(1);
        let s = vm.alloc_string("a");
        let t = vm.alloc_string("a");
        let x = vm.alloc_array(vec![one, s]);
        let y = vm.alloc_array(vec![one, t]);
        let z = vm.alloc_array(vec![one]);
        assert!(values_equal(&mut vm, x, y).expect("eq"));
        assert!(!values_equal(&mut vm, x, z).expect("eq"));
    }

    #[test]
    fn instances_are_identity_equal_by_default() {
        let mut vm = VM::default();
        let ty = vm.special().object;
        let a = vm.construct(ty, &[]).expect("construct");
        let b = vm.construct(ty, &[]).expect("construct");
        assert!(values_equal(&mut vm, a, a).expect("eq"));
        assert!(!values_equal(&mut vm, a, b).expect("eq"));
    }
}
