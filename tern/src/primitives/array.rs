use std::cmp::Ordering;

use super::{
    PrimitiveDesc, PrimitiveResult, arg, expect_index, expect_int, expect_kind, int_result,
    iterator, number::Number, values_equal,
};
use crate::{Array, ObjectKind, RuntimeError, VM, Value};

fn elements(vm: &VM, a: Value) -> Result<Vec<Value>, RuntimeError> {
    expect_kind(vm, a, ObjectKind::Array, "receiver")?;
    Ok(vm.heap.get::<Array>(a).elements.clone())
}

fn elements_mut<'vm>(vm: &'vm mut VM, a: Value) -> Result<&'vm mut Vec<Value>, RuntimeError> {
    expect_kind(vm, a, ObjectKind::Array, "receiver")?;
    Ok(&mut vm.heap.get_mut::<Array>(a).elements)
}

fn len(vm: &VM, a: Value) -> Result<usize, RuntimeError> {
    expect_kind(vm, a, ObjectKind::Array, "receiver")?;
    Ok(vm.heap.get::<Array>(a).elements.len())
}

fn size(vm: &mut VM, a: Value) -> PrimitiveResult {
    let n = len(vm, a)?;
    Ok(int_result(vm, n))
}

/// Returns the receiver so appends chain.
fn append(vm: &mut VM, a: Value, item: Value) -> PrimitiveResult {
    elements_mut(vm, a)?.push(item);
    Ok(a)
}

fn pop(vm: &mut VM, a: Value) -> PrimitiveResult {
    elements_mut(vm, a)?
        .pop()
        .ok_or_else(|| RuntimeError::range("pop from an empty Array"))
}

fn at(vm: &mut VM, a: Value, index: Value) -> PrimitiveResult {
    let n = len(vm, a)?;
    let i = expect_index(vm, index, n)?;
    Ok(vm.heap.get::<Array>(a).elements[i])
}

fn set(vm: &mut VM, a: Value, args: &[Value]) -> PrimitiveResult {
    let index = arg(args, 0, 2)?;
    let item = arg(args, 1, 2)?;
    let n = len(vm, a)?;
    let i = expect_index(vm, index, n)?;
    elements_mut(vm, a)?[i] = item;
    Ok(item)
}

/// Inserting at `size` appends.
fn insert(vm: &mut VM, a: Value, args: &[Value]) -> PrimitiveResult {
    let index = arg(args, 0, 2)?;
    let item = arg(args, 1, 2)?;
    let n = len(vm, a)?;
    let i = expect_index(vm, index, n + 1)?;
    elements_mut(vm, a)?.insert(i, item);
    Ok(a)
}

fn remove_at(vm: &mut VM, a: Value, index: Value) -> PrimitiveResult {
    let n = len(vm, a)?;
    let i = expect_index(vm, index, n)?;
    Ok(elements_mut(vm, a)?.remove(i))
}

fn position(vm: &mut VM, a: Value, item: Value) -> Result<Option<usize>, RuntimeError> {
    for (i, element) in elements(vm, a)?.into_iter().enumerate() {
        if values_equal(vm, element, item)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn contains(vm: &mut VM, a: Value, item: Value) -> PrimitiveResult {
    Ok(Value::from_bool(position(vm, a, item)?.is_some()))
}

fn index_of(vm: &mut VM, a: Value, item: Value) -> PrimitiveResult {
    Ok(match position(vm, a, item)? {
        Some(i) => int_result(vm, i),
        None => Value::NIL,
    })
}

fn join(vm: &mut VM, a: Value, args: &[Value]) -> PrimitiveResult {
    let separator = match args.first() {
        Some(&sep) => super::expect_str(vm, sep, "separator")?,
        None => String::new(),
    };
    let mut parts = Vec::new();
    for element in elements(vm, a)? {
        parts.push(vm.display(element)?);
    }
    Ok(vm.alloc_string(parts.join(&separator)))
}

fn reverse(vm: &mut VM, a: Value) -> PrimitiveResult {
    let mut items = elements(vm, a)?;
    items.reverse();
    Ok(vm.alloc_array(items))
}

fn concat(vm: &mut VM, a: Value, other: Value) -> PrimitiveResult {
    let mut items = elements(vm, a)?;
    expect_kind(vm, other, ObjectKind::Array, "argument")?;
    items.extend(vm.heap.get::<Array>(other).elements.iter().copied());
    Ok(vm.alloc_array(items))
}

fn first(vm: &mut VM, a: Value) -> PrimitiveResult {
    Ok(elements(vm, a)?.first().copied().unwrap_or(Value::NIL))
}

fn last(vm: &mut VM, a: Value) -> PrimitiveResult {
    Ok(elements(vm, a)?.last().copied().unwrap_or(Value::NIL))
}

fn slice(vm: &mut VM, a: Value, args: &[Value]) -> PrimitiveResult {
    let items = elements(vm, a)?;
    let from = expect_int(vm, arg(args, 0, 2)?, "slice start")?;
    let to = match args.get(1) {
        Some(&end) => expect_int(vm, end, "slice end")?,
        None => items.len() as i64,
    };
    if from < 0 || to < from || to > items.len() as i64 {
        return Err(RuntimeError::range(format!(
            "slice {from}..{to} out of range for size {}",
            items.len()
        )));
    }
    Ok(vm.alloc_array(items[from as usize..to as usize].to_vec()))
}

enum SortKey {
    Number(Number),
    Text(String),
}

/// Sorts in place. Elements must be all numbers or all strings.
fn sort(vm: &mut VM, a: Value) -> PrimitiveResult {
    let items = elements(vm, a)?;
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = match (vm.number(item), vm.string_value(item)) {
            (Some(n), _) => SortKey::Number(n),
            (None, Some(s)) => SortKey::Text(s.to_string()),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "cannot sort a {}",
                    vm.type_name(item)
                )));
            }
        };
        keyed.push((key, item));
    }

    let mut mixed = false;
    keyed.sort_by(|(x, _), (y, _)| match (x, y) {
        (SortKey::Number(x), SortKey::Number(y)) => x.compare(*y).unwrap_or(Ordering::Equal),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        _ => {
            mixed = true;
            Ordering::Equal
        }
    });
    if mixed {
        return Err(RuntimeError::type_error("cannot sort numbers and strings together"));
    }
    *elements_mut(vm, a)? = keyed.into_iter().map(|(_, v)| v).collect();
    Ok(a)
}

fn start(vm: &mut VM, a: Value) -> PrimitiveResult {
    expect_kind(vm, a, ObjectKind::Array, "receiver")?;
    Ok(iterator::new_iterator(vm, a))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("size", size),
    PrimitiveDesc::binary("append", append),
    PrimitiveDesc::unary("pop", pop),
    PrimitiveDesc::binary("at", at),
    PrimitiveDesc::variadic("set", set),
    PrimitiveDesc::variadic("insert", insert),
    PrimitiveDesc::binary("remove_at", remove_at),
    PrimitiveDesc::binary("contains", contains),
    PrimitiveDesc::binary("index_of", index_of),
    PrimitiveDesc::variadic("join", join),
    PrimitiveDesc::unary("reverse", reverse),
    PrimitiveDesc::binary("add", concat),
    PrimitiveDesc::unary("first", first),
    PrimitiveDesc::unary("last", last),
    PrimitiveDesc::variadic("slice", slice),
    PrimitiveDesc::unary("sort", sort),
    PrimitiveDesc::unary("start", start),
];

/// `Array()` is empty; `Array(n, fill)` holds `n` copies of `fill`.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    match args {
        [] => Ok(vm.alloc(ty, Array::default())),
        [count] | [count, _] => {
            let n = expect_int(vm, *count, "Array size")?;
            let n = usize::try_from(n)
                .map_err(|_| RuntimeError::range(format!("negative Array size {n}")))?;
            let fill = args.get(1).copied().unwrap_or(Value::NIL);
            Ok(vm.alloc(
                ty,
                Array {
                    elements: vec![fill; n],
                },
            ))
        }
        _ => Err(RuntimeError::arity(2, args.len())),
    }
}
