//! Builtin methods and global functions.
//!
//! Each submodule exports const tables of [`PrimitiveDesc`]; [`install`]
//! turns them into `BuiltinFunction` objects on the bootstrapped types.
use std::fmt;

use crate::{
    Array, Constructor, Dictionary, Float, Integer, NativeFn, Range, RuntimeError, TypeObject,
    VM, VMString, Value, lookup,
};

mod array;
mod dictionary;
mod exception;
mod function;
mod global;
mod iterator;
pub mod number;
mod object;
mod range;
mod regex;
mod string;

pub use object::values_equal;

pub type PrimitiveResult = Result<Value, RuntimeError>;

/// Method on its receiver, or a global of one argument.
pub type UnaryFn = fn(&mut VM, Value) -> PrimitiveResult;
/// Method taking one argument, or a global of two.
pub type BinaryFn = fn(&mut VM, Value, Value) -> PrimitiveResult;
/// Any number of arguments; the receiver is `nil` for globals.
pub type VariadicFn = fn(&mut VM, Value, &[Value]) -> PrimitiveResult;
/// Receives the concrete type being constructed.
pub type ConstructorFn = fn(&mut VM, Value, &[Value]) -> PrimitiveResult;

#[derive(Clone, Copy)]
pub enum Primitive {
    Unary(UnaryFn),
    Binary(BinaryFn),
    Variadic(VariadicFn),
    /// Registered through the native extension interface.
    Native(NativeFn),
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unary(_) => "Unary",
            Self::Binary(_) => "Binary",
            Self::Variadic(_) => "Variadic",
            Self::Native(_) => "Native",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    pub primitive: Primitive,
}

impl PrimitiveDesc {
    pub const fn unary(name: &'static str, f: UnaryFn) -> Self {
        Self {
            name,
            primitive: Primitive::Unary(f),
        }
    }

    pub const fn binary(name: &'static str, f: BinaryFn) -> Self {
        Self {
            name,
            primitive: Primitive::Binary(f),
        }
    }

    pub const fn variadic(name: &'static str, f: VariadicFn) -> Self {
        Self {
            name,
            primitive: Primitive::Variadic(f),
        }
    }
}

/// Populates the method tables of every builtin type and binds the global
/// functions.
pub fn install(vm: &mut VM) {
    let s = *vm.special();
    let tables: [(Value, &[PrimitiveDesc]); 15] = [
        (s.object, object::METHODS),
        (s.integer, number::METHODS),
        (s.float, number::METHODS),
        (s.string, string::METHODS),
        (s.symbol, string::SYMBOL_METHODS),
        (s.array, array::METHODS),
        (s.dictionary, dictionary::METHODS),
        (s.range, range::METHODS),
        (s.regex, regex::METHODS),
        (s.regex_result, regex::RESULT_METHODS),
        (s.iterator, iterator::METHODS),
        (s.function, function::METHODS),
        (s.type_, function::TYPE_METHODS),
        (s.exception, exception::METHODS),
        (s.boolean, object::BOOLEAN_METHODS),
    ];
    for (ty, table) in tables {
        for desc in table {
            vm.define_method(ty, desc.name, desc.primitive);
        }
    }

    let constructors: [(Value, ConstructorFn); 8] = [
        (s.array, array::construct),
        (s.dictionary, dictionary::construct),
        (s.string, string::construct),
        (s.range, range::construct),
        (s.regex, regex::construct),
        (s.integer, number::construct_integer),
        (s.float, number::construct_float),
        (s.exception, exception::construct),
    ];
    for (ty, f) in constructors {
        vm.set_constructor(ty, Constructor::Native(f));
    }

    for desc in global::FUNCTIONS {
        let f = vm.alloc_builtin(desc.name, desc.primitive);
        vm.define_global(desc.name, f);
    }
}

/// An empty value of whichever builtin kind `ty` descends from, typed as
/// `ty`. Subtypes of builtins that define `init` in bytecode start here.
pub(crate) fn blank(vm: &mut VM, ty: Value) -> PrimitiveResult {
    let s = *vm.special();
    let bases = [
        s.array, s.dictionary, s.string, s.range, s.regex, s.integer, s.float, s.exception,
    ];
    let base = lookup::ancestors(&vm.heap, ty).find(|t| bases.contains(t));
    let value = match base {
        Some(b) if b == s.array => vm.alloc(ty, Array::default()),
        Some(b) if b == s.dictionary => vm.alloc(ty, Dictionary::default()),
        Some(b) if b == s.string => vm.alloc(ty, VMString { value: String::new() }),
        Some(b) if b == s.range => {
            let zero = vm.alloc_integer(0);
            vm.alloc(ty, Range { start: zero, end: zero })
        }
        Some(b) if b == s.regex => vm.compile_regex_as(ty, "")?,
        Some(b) if b == s.integer => vm.alloc(ty, Integer { value: 0 }),
        Some(b) if b == s.float => vm.alloc(ty, Float { value: 0.0 }),
        Some(_) => vm.new_exception(ty, ""),
        None => {
            return Err(RuntimeError::type_error(format!(
                "{} cannot be constructed",
                vm.heap.get::<TypeObject>(ty).name
            )));
        }
    };
    Ok(value)
}

// ── argument helpers ───────────────────────────────────────────────

pub(crate) fn arg(args: &[Value], index: usize, expected: usize) -> Result<Value, RuntimeError> {
    args.get(index)
        .copied()
        .ok_or_else(|| RuntimeError::arity(expected, args.len()))
}

pub(crate) fn expect_int(vm: &VM, value: Value, what: &str) -> Result<i64, RuntimeError> {
    vm.int_value(value).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{what} must be an Integer, got {}",
            vm.type_name(value)
        ))
    })
}

pub(crate) fn expect_str(vm: &VM, value: Value, what: &str) -> Result<String, RuntimeError> {
    vm.string_value(value).map(str::to_string).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{what} must be a String, got {}",
            vm.type_name(value)
        ))
    })
}

pub(crate) fn expect_kind(
    vm: &VM,
    value: Value,
    kind: crate::ObjectKind,
    what: &str,
) -> Result<(), RuntimeError> {
    if value.kind() == kind {
        return Ok(());
    }
    Err(RuntimeError::type_error(format!(
        "{what} must be {} {}, got {}",
        article(kind.name()),
        kind.name(),
        vm.type_name(value)
    )))
}

fn article(name: &str) -> &'static str {
    match name.chars().next() {
        Some('A' | 'E' | 'I' | 'O' | 'U') => "an",
        _ => "a",
    }
}

/// Checks `index` against `len`. Negative indices are rejected.
pub(crate) fn expect_index(vm: &VM, index: Value, len: usize) -> Result<usize, RuntimeError> {
    let i = expect_int(vm, index, "index")?;
    match usize::try_from(i) {
        Ok(i) if i < len => Ok(i),
        _ => Err(RuntimeError::range(format!(
            "index {i} out of range for size {len}"
        ))),
    }
}

pub(crate) fn int_result(vm: &mut VM, n: usize) -> Value {
    vm.alloc_integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Drives the iteration protocol (`start`, then `at_end` / `get` /
/// `increment` on the iterator) over any value that implements it.
///
/// `f` returns `false` to stop early.
pub(crate) fn for_each(
    vm: &mut VM,
    iterable: Value,
    mut f: impl FnMut(&mut VM, Value) -> Result<bool, RuntimeError>,
) -> Result<(), RuntimeError> {
    let mark = vm.scratch_mark();
    vm.root(iterable);
    let iterator = vm.send(iterable, "start", &[])?;
    vm.root(iterator);
    loop {
        if vm.send(iterator, "at_end", &[])?.is_truthy() {
            break;
        }
        let item = vm.send(iterator, "get", &[])?;
        let inner = vm.scratch_mark();
        vm.root(item);
        let keep_going = f(vm, item)?;
        vm.release(inner);
        if !keep_going {
            break;
        }
        vm.send(iterator, "increment", &[])?;
    }
    vm.release(mark);
    Ok(())
}
