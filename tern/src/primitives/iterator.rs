//! Cursor over an Array, String, Range or Dictionary (keys).
//!
//! The owner's length is read on every step, so an iterator over a
//! growing array sees the new elements.
use super::{PrimitiveDesc, PrimitiveResult, range};
use crate::{Array, Dictionary, IteratorObject, ObjectKind, RuntimeError, VM, Value};

pub(crate) fn new_iterator(vm: &mut VM, owner: Value) -> Value {
    let ty = vm.special().iterator;
    vm.alloc(ty, IteratorObject { owner, position: 0 })
}

fn state(vm: &VM, it: Value) -> Result<(Value, i64), RuntimeError> {
    match vm.heap.try_get::<IteratorObject>(it) {
        Some(iterator) => Ok((iterator.owner, iterator.position)),
        None => Err(RuntimeError::type_error(format!(
            "expected an Iterator, got {}",
            vm.type_name(it)
        ))),
    }
}

fn owner_len(vm: &VM, owner: Value) -> Result<i64, RuntimeError> {
    let len = match owner.kind() {
        ObjectKind::Array => vm.heap.get::<Array>(owner).elements.len(),
        ObjectKind::Dictionary => vm.heap.get::<Dictionary>(owner).entries.len(),
        ObjectKind::String => vm.string_value(owner).map_or(0, |s| s.chars().count()),
        ObjectKind::Range => {
            let (start, end) = range::bounds(vm, owner)?;
            return Ok(end.saturating_sub(start).max(0));
        }
        _ => {
            return Err(RuntimeError::iterator(format!(
                "cannot iterate over {}",
                vm.type_name(owner)
            )));
        }
    };
    Ok(i64::try_from(len).unwrap_or(i64::MAX))
}

fn set_position(vm: &mut VM, it: Value, position: i64) {
    vm.heap.get_mut::<IteratorObject>(it).position = position;
}

fn at_end(vm: &mut VM, it: Value) -> PrimitiveResult {
    let (owner, position) = state(vm, it)?;
    Ok(Value::from_bool(position >= owner_len(vm, owner)?))
}

fn get(vm: &mut VM, it: Value) -> PrimitiveResult {
    let (owner, position) = state(vm, it)?;
    if position < 0 || position >= owner_len(vm, owner)? {
        return Err(RuntimeError::iterator(format!(
            "cannot dereference an iterator at position {position}, past the end"
        )));
    }
    let index = position as usize;
    Ok(match owner.kind() {
        ObjectKind::Array => vm.heap.get::<Array>(owner).elements[index],
        ObjectKind::Dictionary => vm
            .heap
            .get::<Dictionary>(owner)
            .entries
            .get_index(index)
            .map_or(Value::NIL, |(_, &(key, _))| key),
        ObjectKind::String => {
            let c = vm
                .string_value(owner)
                .and_then(|s| s.chars().nth(index))
                .map(String::from)
                .unwrap_or_default();
            vm.alloc_string(c)
        }
        _ => {
            let (start, _) = range::bounds(vm, owner)?;
            vm.alloc_integer(start + position)
        }
    })
}

fn increment(vm: &mut VM, it: Value) -> PrimitiveResult {
    let (owner, position) = state(vm, it)?;
    if position >= owner_len(vm, owner)? {
        return Err(RuntimeError::iterator("cannot increment an iterator past the end"));
    }
    set_position(vm, it, position + 1);
    Ok(it)
}

fn decrement(vm: &mut VM, it: Value) -> PrimitiveResult {
    let (_, position) = state(vm, it)?;
    if position <= 0 {
        return Err(RuntimeError::iterator("cannot decrement an iterator past the start"));
    }
    set_position(vm, it, position - 1);
    Ok(it)
}

/// Iterators over different owners cannot be compared.
fn eq(vm: &mut VM, it: Value, other: Value) -> PrimitiveResult {
    let (owner, position) = state(vm, it)?;
    let (other_owner, other_position) = state(vm, other)?;
    if owner != other_owner {
        return Err(RuntimeError::iterator(
            "cannot compare iterators over different collections",
        ));
    }
    Ok(Value::from_bool(position == other_position))
}

fn position(vm: &mut VM, it: Value) -> PrimitiveResult {
    let (_, position) = state(vm, it)?;
    Ok(vm.alloc_integer(position))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("at_end", at_end),
    PrimitiveDesc::unary("get", get),
    PrimitiveDesc::unary("increment", increment),
    PrimitiveDesc::unary("decrement", decrement),
    PrimitiveDesc::binary("eq", eq),
    PrimitiveDesc::unary("position", position),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walking_an_array_to_the_end() {
        let mut vm = VM::default();
        let one = vm.alloc_integer(1);
        let two = vm.alloc_integer(2);
        let a = vm.alloc_array(vec![one, two]);
        let it = new_iterator(&mut vm, a);

        assert_eq!(get(&mut vm, it).expect("get"), one);
        increment(&mut vm, it).expect("increment");
        assert_eq!(get(&mut vm, it).expect("get"), two);
        increment(&mut vm, it).expect("increment");
        assert_eq!(at_end(&mut vm, it).expect("at_end"), Value::TRUE);
        assert!(matches!(
            get(&mut vm, it),
            Err(RuntimeError::IteratorStateError(_))
        ));
        assert!(matches!(
            increment(&mut vm, it),
            Err(RuntimeError::IteratorStateError(_))
        ));
    }

    #[test]
    fn decrement_stops_at_the_start() {
        let mut vm = VM::default();
        let s = vm.alloc_string("ab");
        let it = new_iterator(&mut vm, s);
        assert!(matches!(
            decrement(&mut vm, it),
            Err(RuntimeError::IteratorStateError(_))
        ));
        increment(&mut vm, it).expect("increment");
        let c = get(&mut vm, it).expect("get");
        assert_eq!(vm.string_value(c), Some("b"));
        decrement(&mut vm, it).expect("decrement");
    }

    #[test]
    fn comparing_iterators_of_different_owners_fails() {
        let mut vm = VM::default();
        let a = vm.alloc_array(Vec::new());
        let b = vm.alloc_array(Vec::new());
        let x = new_iterator(&mut vm, a);
        let y = new_iterator(&mut vm, a);
        let z = new_iterator(&mut vm, b);
        assert_eq!(eq(&mut vm, x, y).expect("eq"), Value::TRUE);
        assert!(matches!(
            eq(&mut vm, x, z),
            Err(RuntimeError::IteratorStateError(_))
        ));
    }
}
