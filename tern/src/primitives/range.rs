//! Half-open integer ranges.
use super::{PrimitiveDesc, PrimitiveResult, expect_int, expect_kind, iterator};
use crate::{ObjectKind, Range, RuntimeError, VM, Value};

pub(crate) fn bounds(vm: &VM, r: Value) -> Result<(i64, i64), RuntimeError> {
    expect_kind(vm, r, ObjectKind::Range, "receiver")?;
    let range = vm.heap.get::<Range>(r);
    let start = expect_int(vm, range.start, "range start")?;
    let end = expect_int(vm, range.end, "range end")?;
    Ok((start, end))
}

pub(crate) fn new_range(vm: &mut VM, start: Value, end: Value) -> PrimitiveResult {
    let ty = vm.special().range;
    range_of(vm, ty, start, end)
}

fn range_of(vm: &mut VM, ty: Value, start: Value, end: Value) -> PrimitiveResult {
    expect_int(vm, start, "range start")?;
    expect_int(vm, end, "range end")?;
    Ok(vm.alloc(ty, Range { start, end }))
}

fn size(vm: &mut VM, r: Value) -> PrimitiveResult {
    let (start, end) = bounds(vm, r)?;
    Ok(vm.alloc_integer(end.saturating_sub(start).max(0)))
}

fn contains(vm: &mut VM, r: Value, n: Value) -> PrimitiveResult {
    let (start, end) = bounds(vm, r)?;
    Ok(Value::from_bool(
        vm.int_value(n).is_some_and(|n| (start..end).contains(&n)),
    ))
}

fn first(vm: &mut VM, r: Value) -> PrimitiveResult {
    let (start, end) = bounds(vm, r)?;
    Ok(if start < end {
        vm.alloc_integer(start)
    } else {
        Value::NIL
    })
}

fn last(vm: &mut VM, r: Value) -> PrimitiveResult {
    let (start, end) = bounds(vm, r)?;
    Ok(if start < end {
        vm.alloc_integer(end - 1)
    } else {
        Value::NIL
    })
}

fn to_array(vm: &mut VM, r: Value) -> PrimitiveResult {
    let (start, end) = bounds(vm, r)?;
    let result = vm.alloc_array(Vec::new());
    vm.root(result);
    for n in start..end {
        let n = vm.alloc_integer(n);
        vm.heap.get_mut::<crate::Array>(result).elements.push(n);
    }
    Ok(result)
}

fn start(vm: &mut VM, r: Value) -> PrimitiveResult {
    bounds(vm, r)?;
    Ok(iterator::new_iterator(vm, r))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("size", size),
    PrimitiveDesc::binary("contains", contains),
    PrimitiveDesc::unary("first", first),
    PrimitiveDesc::unary("last", last),
    PrimitiveDesc::unary("to_array", to_array),
    PrimitiveDesc::unary("start", start),
];

/// `Range(end)` or `Range(start, end)`.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    match args {
        [end] => {
            let zero = vm.alloc_integer(0);
            range_of(vm, ty, zero, *end)
        }
        [start, end] => range_of(vm, ty, *start, *end),
        _ => Err(RuntimeError::arity(2, args.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_reversed_ranges_have_no_elements() {
        let mut vm = VM::default();
        let five = vm.alloc_integer(5);
        let two = vm.alloc_integer(2);
        let r = new_range(&mut vm, five, two).expect("range");
        let n = size(&mut vm, r).expect("size");
        assert_eq!(vm.int_value(n), Some(0));
        assert_eq!(first(&mut vm, r).expect("first"), Value::NIL);
    }

    #[test]
    fn to_array_materialises_every_element() {
        let mut vm = VM::default();
        let two = vm.alloc_integer(2);
        let five = vm.alloc_integer(5);
        let r = new_range(&mut vm, two, five).expect("range");
        let a = to_array(&mut vm, r).expect("array");
        let items: Vec<_> = vm
            .array_elements(a)
            .expect("array")
            .iter()
            .map(|&v| vm.int_value(v).expect("int"))
            .collect();
        assert_eq!(items, [2, 3, 4]);
        assert_eq!(contains(&mut vm, r, five).expect("contains"), Value::FALSE);
    }

    #[test]
    fn bounds_must_be_integers() {
        let mut vm = VM::default();
        let s = vm.alloc_string("a");
        let one = vm.alloc_integer(1);
        assert!(matches!(new_range(&mut vm, s, one), Err(RuntimeError::TypeError(_))));
    }
}
