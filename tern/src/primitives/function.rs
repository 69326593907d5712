use super::{Primitive, PrimitiveDesc, PrimitiveResult};
use crate::{
    BuiltinFunction, Function, ObjectKind, PartialFunction, RuntimeError, TypeObject, VM, Value,
    lookup,
};

/// Declared parameter count, or `nil` when it is not fixed.
fn arity_of(vm: &VM, f: Value) -> Result<Option<usize>, RuntimeError> {
    match f.kind() {
        ObjectKind::Function => {
            let body = &vm.heap.get::<Function>(f).body;
            Ok((!body.vararg).then_some(body.arity))
        }
        ObjectKind::BuiltinFunction => Ok(match vm.heap.get::<BuiltinFunction>(f).primitive {
            Primitive::Unary(_) => Some(1),
            Primitive::Binary(_) => Some(2),
            Primitive::Variadic(_) | Primitive::Native(_) => None,
        }),
        ObjectKind::PartialFunction => {
            let partial = vm.heap.get::<PartialFunction>(f);
            let mut inner = arity_of(vm, partial.callee)?;
            // a builtin bound to a receiver takes it out of its count
            if partial.receiver.is_some() && partial.callee.kind() == ObjectKind::BuiltinFunction {
                inner = inner.map(|n| n.saturating_sub(1));
            }
            Ok(inner.map(|n| n.saturating_sub(partial.bound.len())))
        }
        _ => Err(RuntimeError::type_error(format!(
            "expected a function, got {}",
            vm.type_name(f)
        ))),
    }
}

fn arity(vm: &mut VM, f: Value) -> PrimitiveResult {
    Ok(match arity_of(vm, f)? {
        Some(n) => super::int_result(vm, n),
        None => Value::NIL,
    })
}

fn name(vm: &mut VM, f: Value) -> PrimitiveResult {
    let name = match f.kind() {
        ObjectKind::Function => vm.heap.get::<Function>(f).body.display_name(),
        ObjectKind::BuiltinFunction => vm.heap.get::<BuiltinFunction>(f).name.to_string(),
        ObjectKind::PartialFunction => {
            let callee = vm.heap.get::<PartialFunction>(f).callee;
            return name(vm, callee);
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "expected a function, got {}",
                vm.type_name(f)
            )));
        }
    };
    Ok(vm.alloc_string(name))
}

fn call(vm: &mut VM, f: Value, args: &[Value]) -> PrimitiveResult {
    vm.call_value(f, args)
}

/// Partial application: fixes the leading arguments.
fn bind(vm: &mut VM, f: Value, args: &[Value]) -> PrimitiveResult {
    if !matches!(
        f.kind(),
        ObjectKind::Function | ObjectKind::BuiltinFunction | ObjectKind::PartialFunction
    ) {
        return Err(RuntimeError::NotCallable(vm.type_name(f)));
    }
    let ty = vm.special().partial_function;
    Ok(vm.alloc(
        ty,
        PartialFunction {
            callee: f,
            receiver: None,
            bound: args.to_vec(),
        },
    ))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("arity", arity),
    PrimitiveDesc::unary("name", name),
    PrimitiveDesc::variadic("call", call),
    PrimitiveDesc::variadic("bind", bind),
];

fn expect_type(vm: &VM, ty: Value) -> Result<&TypeObject, RuntimeError> {
    vm.heap.try_get::<TypeObject>(ty).ok_or_else(|| {
        RuntimeError::type_error(format!("expected a type, got {}", vm.type_name(ty)))
    })
}

fn type_name(vm: &mut VM, ty: Value) -> PrimitiveResult {
    let name = expect_type(vm, ty)?.name.to_string();
    Ok(vm.alloc_string(name))
}

/// The root is its own parent; reported as `nil`.
fn parent(vm: &mut VM, ty: Value) -> PrimitiveResult {
    let parent = expect_type(vm, ty)?.parent;
    Ok(if parent == ty { Value::NIL } else { parent })
}

/// Names of the methods defined directly on the type, sorted.
fn methods(vm: &mut VM, ty: Value) -> PrimitiveResult {
    let mut names: Vec<_> = expect_type(vm, ty)?.methods.keys().copied().collect();
    names.sort_by_key(|symbol| symbol.name());
    let names = names.into_iter().map(Value::from_symbol).collect();
    Ok(vm.alloc_array(names))
}

fn new(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    vm.construct(ty, args)
}

fn is_subtype(vm: &mut VM, ty: Value, other: Value) -> PrimitiveResult {
    expect_type(vm, ty)?;
    expect_type(vm, other)?;
    Ok(Value::from_bool(lookup::is_subtype(&vm.heap, ty, other)))
}

pub const TYPE_METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("name", type_name),
    PrimitiveDesc::unary("parent", parent),
    PrimitiveDesc::unary("methods", methods),
    PrimitiveDesc::variadic("new", new),
    PrimitiveDesc::binary("is_subtype", is_subtype),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BytecodeBuilder;

    #[test]
    fn partial_application_reduces_arity() {
        let mut vm = VM::default();
        let mut b = BytecodeBuilder::new();
        b.read_arg(0).read_arg(1).sub_fast().return_();
        let body = b.into_function("minus", 2, false);
        let ty = vm.special().function;
        let globals = vm.globals();
        let f = vm.alloc(
            ty,
            Function {
                body: body.into(),
                env: globals,
            },
        );
        let ten = vm.alloc_integer(10);
        let bound = bind(&mut vm, f, &[ten]).expect("bind");
        let n = arity(&mut vm, bound).expect("arity");
        assert_eq!(vm.int_value(n), Some(1));

        let three = vm.alloc_integer(3);
        let result = vm.call_value(bound, &[three]).expect("call");
        assert_eq!(vm.int_value(result), Some(7));
    }

    #[test]
    fn root_type_reports_no_parent() {
        let mut vm = VM::default();
        let object = vm.special().object;
        assert_eq!(parent(&mut vm, object).expect("parent"), Value::NIL);
        let array = vm.special().array;
        assert_eq!(parent(&mut vm, array).expect("parent"), object);
    }
}
