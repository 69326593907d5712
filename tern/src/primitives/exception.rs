use super::{PrimitiveDesc, PrimitiveResult};
use crate::{Exception, ObjectKind, RuntimeError, VM, Value};

fn fields(vm: &VM, e: Value) -> Result<&Exception, RuntimeError> {
    vm.heap.try_get::<Exception>(e).ok_or_else(|| {
        RuntimeError::type_error(format!("expected an Exception, got {}", vm.type_name(e)))
    })
}

fn message(vm: &mut VM, e: Value) -> PrimitiveResult {
    Ok(fields(vm, e)?.message)
}

fn payload(vm: &mut VM, e: Value) -> PrimitiveResult {
    Ok(fields(vm, e)?.payload)
}

fn set_payload(vm: &mut VM, e: Value, value: Value) -> PrimitiveResult {
    fields(vm, e)?;
    vm.heap.get_mut::<Exception>(e).payload = value;
    Ok(e)
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("message", message),
    PrimitiveDesc::unary("payload", payload),
    PrimitiveDesc::binary("set_payload", set_payload),
];

/// `Exception(message?, payload?)`.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    if args.len() > 2 {
        return Err(RuntimeError::arity(2, args.len()));
    }
    let message = match args.first() {
        None => vm.alloc_string(String::new()),
        Some(&m) if m.kind() == ObjectKind::String => m,
        Some(&m) => {
            let text = vm.display(m)?;
            vm.alloc_string(text)
        }
    };
    let payload = args.get(1).copied().unwrap_or(Value::NIL);
    Ok(vm.alloc(ty, Exception { message, payload }))
}
