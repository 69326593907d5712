//! Functions bound in the base environment.
//!
//! The higher-order ones accept anything that answers `start` with an
//! iterator, so user types that implement the protocol work too.
use log::{debug, info};

use super::{PrimitiveDesc, PrimitiveResult, arg, expect_int, for_each, int_result, range};
use crate::{Array, RuntimeError, VM, Value};

fn print(vm: &mut VM, _receiver: Value, args: &[Value]) -> PrimitiveResult {
    let mut parts = Vec::with_capacity(args.len());
    for &value in args {
        parts.push(vm.display(value)?);
    }
    let mut line = parts.join(" ");
    line.push('\n');
    vm.write_output(&line);
    Ok(Value::NIL)
}

fn to_str(vm: &mut VM, value: Value) -> PrimitiveResult {
    let text = vm.display(value)?;
    Ok(vm.alloc_string(text))
}

fn to_repr(vm: &mut VM, value: Value) -> PrimitiveResult {
    let text = vm.repr(value)?;
    Ok(vm.alloc_string(text))
}

fn type_of(vm: &mut VM, value: Value) -> PrimitiveResult {
    Ok(vm.type_of(value))
}

fn make_range(vm: &mut VM, start: Value, end: Value) -> PrimitiveResult {
    range::new_range(vm, start, end)
}

fn push(vm: &mut VM, array: Value, item: Value) {
    vm.heap.get_mut::<Array>(array).elements.push(item);
}

fn map(vm: &mut VM, iterable: Value, f: Value) -> PrimitiveResult {
    let result = vm.alloc_array(Vec::new());
    vm.root(result);
    for_each(vm, iterable, |vm, item| {
        let mapped = vm.call_value(f, &[item])?;
        push(vm, result, mapped);
        Ok(true)
    })?;
    Ok(result)
}

fn filter(vm: &mut VM, iterable: Value, f: Value) -> PrimitiveResult {
    let result = vm.alloc_array(Vec::new());
    vm.root(result);
    for_each(vm, iterable, |vm, item| {
        if vm.call_value(f, &[item])?.is_truthy() {
            push(vm, result, item);
        }
        Ok(true)
    })?;
    Ok(result)
}

/// `reduce(iterable, initial, f)` folds left with `f(acc, item)`.
fn reduce(vm: &mut VM, _receiver: Value, args: &[Value]) -> PrimitiveResult {
    let iterable = arg(args, 0, 3)?;
    let initial = arg(args, 1, 3)?;
    let f = arg(args, 2, 3)?;
    if args.len() != 3 {
        return Err(RuntimeError::arity(3, args.len()));
    }
    // the running value lives in a rooted one-element array
    let holder = vm.alloc_array(vec![initial]);
    vm.root(holder);
    for_each(vm, iterable, |vm, item| {
        let acc = vm.heap.get::<Array>(holder).elements[0];
        let next = vm.call_value(f, &[acc, item])?;
        vm.heap.get_mut::<Array>(holder).elements[0] = next;
        Ok(true)
    })?;
    Ok(vm.heap.get::<Array>(holder).elements[0])
}

fn each(vm: &mut VM, iterable: Value, f: Value) -> PrimitiveResult {
    for_each(vm, iterable, |vm, item| {
        vm.call_value(f, &[item])?;
        Ok(true)
    })?;
    Ok(Value::NIL)
}

/// Runs a full collection and returns the number of cells freed.
fn gc(vm: &mut VM, _receiver: Value, args: &[Value]) -> PrimitiveResult {
    if !args.is_empty() {
        return Err(RuntimeError::arity(0, args.len()));
    }
    let stats = vm.collect_garbage();
    debug!(
        "gc() marked {} and freed {} in {} chunks",
        stats.marked, stats.freed, stats.chunks
    );
    Ok(int_result(vm, stats.freed))
}

/// Ends the process with `code` (default 0) after flushing program output.
fn quit(vm: &mut VM, _receiver: Value, args: &[Value]) -> PrimitiveResult {
    let code = match args {
        [] => 0,
        [code] => expect_int(vm, *code, "exit code")?,
        _ => return Err(RuntimeError::arity(1, args.len())),
    };
    let code = i32::try_from(code)
        .map_err(|_| RuntimeError::range(format!("exit code {code} out of range")))?;
    vm.flush_output();
    info!("quit({code})");
    std::process::exit(code)
}

pub const FUNCTIONS: &[PrimitiveDesc] = &[
    PrimitiveDesc::variadic("print", print),
    PrimitiveDesc::unary("str", to_str),
    PrimitiveDesc::unary("repr", to_repr),
    PrimitiveDesc::unary("type", type_of),
    PrimitiveDesc::binary("range", make_range),
    PrimitiveDesc::binary("map", map),
    PrimitiveDesc::binary("filter", filter),
    PrimitiveDesc::variadic("reduce", reduce),
    PrimitiveDesc::binary("each", each),
    PrimitiveDesc::variadic("gc", gc),
    PrimitiveDesc::variadic("quit", quit),
];

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Write, rc::Rc};

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn print_joins_display_forms() {
        let mut vm = VM::default();
        let capture = Capture::default();
        vm.set_output(Box::new(capture.clone()));
        let s = vm.alloc_string("x =");
        let n = vm.alloc_integer(3);
        print(&mut vm, Value::NIL, &[s, n]).expect("print");
        assert_eq!(String::from_utf8_lossy(&capture.0.borrow()), "x = 3\n");
    }

    #[test]
    fn map_over_a_range_with_a_builtin() {
        let mut vm = VM::default();
        let zero = vm.alloc_integer(0);
        let three = vm.alloc_integer(3);
        let r = make_range(&mut vm, zero, three).expect("range");
        let f = vm.global("str").expect("str is global");
        let mapped = map(&mut vm, r, f).expect("map");
        let items: Vec<_> = vm
            .array_elements(mapped)
            .expect("array")
            .iter()
            .map(|&v| vm.string_value(v).expect("string").to_string())
            .collect();
        assert_eq!(items, ["0", "1", "2"]);
    }

    #[test]
    fn gc_reports_freed_cells() {
        let mut vm = VM::default();
        for _ in 0..10 {
            vm.alloc_string("garbage");
        }
        let freed = gc(&mut vm, Value::NIL, &[]).expect("gc");
        assert!(vm.int_value(freed).is_some_and(|n| n >= 10));
    }
}
