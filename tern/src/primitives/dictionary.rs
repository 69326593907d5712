//! Dictionaries keep insertion order; keys hash by content for numbers,
//! strings and symbols and by identity for everything else.
use super::{PrimitiveDesc, PrimitiveResult, arg, expect_kind, int_result, iterator};
use crate::{Dictionary, ObjectKind, RuntimeError, VM, Value};

fn check(vm: &VM, d: Value) -> Result<(), RuntimeError> {
    expect_kind(vm, d, ObjectKind::Dictionary, "receiver")
}

fn size(vm: &mut VM, d: Value) -> PrimitiveResult {
    check(vm, d)?;
    let n = vm.heap.get::<Dictionary>(d).entries.len();
    Ok(int_result(vm, n))
}

fn at(vm: &mut VM, d: Value, key: Value) -> PrimitiveResult {
    check(vm, d)?;
    match vm.dict_get(d, key) {
        Some(value) => Ok(value),
        None => {
            let key = vm.repr(key)?;
            Err(RuntimeError::range(format!("key not found: {key}")))
        }
    }
}

/// Like `at`, but missing keys give the default (or `nil`).
fn get(vm: &mut VM, d: Value, args: &[Value]) -> PrimitiveResult {
    check(vm, d)?;
    let key = arg(args, 0, 1)?;
    let default = args.get(1).copied().unwrap_or(Value::NIL);
    Ok(vm.dict_get(d, key).unwrap_or(default))
}

fn set(vm: &mut VM, d: Value, args: &[Value]) -> PrimitiveResult {
    check(vm, d)?;
    let key = arg(args, 0, 2)?;
    let value = arg(args, 1, 2)?;
    vm.dict_insert(d, key, value);
    Ok(value)
}

fn contains(vm: &mut VM, d: Value, key: Value) -> PrimitiveResult {
    check(vm, d)?;
    Ok(Value::from_bool(vm.dict_get(d, key).is_some()))
}

fn remove(vm: &mut VM, d: Value, key: Value) -> PrimitiveResult {
    check(vm, d)?;
    let hashed = vm.dict_key(key);
    Ok(vm
        .heap
        .get_mut::<Dictionary>(d)
        .entries
        .shift_remove(&hashed)
        .map_or(Value::NIL, |(_, value)| value))
}

fn keys(vm: &mut VM, d: Value) -> PrimitiveResult {
    check(vm, d)?;
    let keys = vm.heap.get::<Dictionary>(d).entries.values().map(|&(k, _)| k).collect();
    Ok(vm.alloc_array(keys))
}

fn values(vm: &mut VM, d: Value) -> PrimitiveResult {
    check(vm, d)?;
    let values = vm.heap.get::<Dictionary>(d).entries.values().map(|&(_, v)| v).collect();
    Ok(vm.alloc_array(values))
}

/// `[key, value]` pairs in insertion order.
fn items(vm: &mut VM, d: Value) -> PrimitiveResult {
    check(vm, d)?;
    let entries: Vec<(Value, Value)> = vm.heap.get::<Dictionary>(d).entries.values().copied().collect();
    let result = vm.alloc_array(Vec::with_capacity(entries.len()));
    vm.root(result);
    for (key, value) in entries {
        let pair = vm.alloc_array(vec![key, value]);
        vm.heap.get_mut::<crate::Array>(result).elements.push(pair);
    }
    Ok(result)
}

/// Iterates over the keys.
fn start(vm: &mut VM, d: Value) -> PrimitiveResult {
    check(vm, d)?;
    Ok(iterator::new_iterator(vm, d))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("size", size),
    PrimitiveDesc::binary("at", at),
    PrimitiveDesc::variadic("get", get),
    PrimitiveDesc::variadic("set", set),
    PrimitiveDesc::binary("contains", contains),
    PrimitiveDesc::binary("remove", remove),
    PrimitiveDesc::unary("keys", keys),
    PrimitiveDesc::unary("values", values),
    PrimitiveDesc::unary("items", items),
    PrimitiveDesc::unary("start", start),
];

/// `Dictionary(k1, v1, k2, v2, ...)`.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    if args.len() % 2 != 0 {
        return Err(RuntimeError::type_error(
            "Dictionary expects key/value pairs",
        ));
    }
    let d = vm.alloc(ty, Dictionary::default());
    for pair in args.chunks_exact(2) {
        vm.dict_insert(d, pair[0], pair[1]);
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_keeps_the_order_of_the_rest() {
        let mut vm = VM::default();
        let d = vm.alloc_dictionary();
        let names = ["a", "b", "c"].map(|n| vm.alloc_string(n));
        for (i, &name) in names.iter().enumerate() {
            let value = vm.alloc_integer(i as i64);
            vm.dict_insert(d, name, value);
        }
        let b = vm.alloc_string("b");
        let removed = remove(&mut vm, d, b).expect("remove");
        assert_eq!(vm.int_value(removed), Some(1));

        let k = keys(&mut vm, d).expect("keys");
        let keys: Vec<_> = vm
            .array_elements(k)
            .expect("array")
            .iter()
            .map(|&v| vm.string_value(v).expect("string").to_string())
            .collect();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn integer_and_float_keys_are_distinct() {
        let mut vm = VM::default();
        let d = vm.alloc_dictionary();
        let one = vm.alloc_integer(1);
        let one_f = vm.alloc_float(1.0);
        vm.dict_insert(d, one, Value::TRUE);
        assert_eq!(get(&mut vm, d, &[one_f]).expect("get"), Value::NIL);
        assert_eq!(get(&mut vm, d, &[one]).expect("get"), Value::TRUE);
    }

    #[test]
    fn missing_key_is_a_range_error() {
        let mut vm = VM::default();
        let d = vm.alloc_dictionary();
        let k = vm.alloc_string("nope");
        let err = at(&mut vm, d, k).expect_err("missing");
        assert_eq!(err.to_string(), r#"key not found: "nope""#);
    }
}
