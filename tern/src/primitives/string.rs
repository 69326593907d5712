//! String methods index by `char`, not by byte.
use super::{
    PrimitiveDesc, PrimitiveResult, arg, expect_index, expect_int, expect_str, int_result,
    iterator,
};
use crate::{ObjectKind, Regex, RuntimeError, Symbol, VM, VMString, Value};

/// Upper bound on the result of `*`.
const MAX_REPEAT_BYTES: usize = 1 << 28;

fn receiver(vm: &VM, value: Value) -> Result<String, RuntimeError> {
    expect_str(vm, value, "receiver")
}

fn size(vm: &mut VM, s: Value) -> PrimitiveResult {
    let n = receiver(vm, s)?.chars().count();
    Ok(int_result(vm, n))
}

fn add(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    let mut text = receiver(vm, s)?;
    let Some(tail) = vm.string_value(other) else {
        return Err(RuntimeError::type_error(format!(
            "cannot concatenate String and {}",
            vm.type_name(other)
        )));
    };
    text.push_str(tail);
    Ok(vm.alloc_string(text))
}

fn mul(vm: &mut VM, s: Value, count: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let n = expect_int(vm, count, "repeat count")?;
    let n = usize::try_from(n)
        .map_err(|_| RuntimeError::range(format!("negative repeat count {n}")))?;
    match text.len().checked_mul(n) {
        Some(bytes) if bytes <= MAX_REPEAT_BYTES => Ok(vm.alloc_string(text.repeat(n))),
        _ => Err(RuntimeError::range(format!(
            "repeating {} bytes {n} times is too large",
            text.len()
        ))),
    }
}

fn at(vm: &mut VM, s: Value, index: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let i = expect_index(vm, index, text.chars().count())?;
    let c = text.chars().nth(i).map(String::from).unwrap_or_default();
    Ok(vm.alloc_string(c))
}

fn slice(vm: &mut VM, s: Value, args: &[Value]) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let len = text.chars().count();
    let from = expect_int(vm, arg(args, 0, 2)?, "slice start")?;
    let to = match args.get(1) {
        Some(&end) => expect_int(vm, end, "slice end")?,
        None => len as i64,
    };
    if from < 0 || to < from || to > len as i64 {
        return Err(RuntimeError::range(format!(
            "slice {from}..{to} out of range for size {len}"
        )));
    }
    let part: String = text
        .chars()
        .skip(from as usize)
        .take((to - from) as usize)
        .collect();
    Ok(vm.alloc_string(part))
}

fn upper(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?.to_uppercase();
    Ok(vm.alloc_string(text))
}

fn lower(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?.to_lowercase();
    Ok(vm.alloc_string(text))
}

fn trim(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?.trim().to_string();
    Ok(vm.alloc_string(text))
}

fn split(vm: &mut VM, s: Value, args: &[Value]) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let parts: Vec<String> = match args.first() {
        None => text.split_whitespace().map(str::to_string).collect(),
        Some(&sep) if sep.kind() == ObjectKind::Regex => vm
            .heap
            .get::<Regex>(sep)
            .regex
            .split(&text)
            .map(str::to_string)
            .collect(),
        Some(&sep) => {
            let sep = expect_str(vm, sep, "separator")?;
            if sep.is_empty() {
                text.chars().map(String::from).collect()
            } else {
                text.split(sep.as_str()).map(str::to_string).collect()
            }
        }
    };
    let result = vm.alloc_array(Vec::with_capacity(parts.len()));
    vm.root(result);
    for part in parts {
        let part = vm.alloc_string(part);
        vm.heap.get_mut::<crate::Array>(result).elements.push(part);
    }
    Ok(result)
}

fn replace(vm: &mut VM, s: Value, args: &[Value]) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let pattern = arg(args, 0, 2)?;
    let replacement = expect_str(vm, arg(args, 1, 2)?, "replacement")?;
    let result = if pattern.kind() == ObjectKind::Regex {
        vm.heap
            .get::<Regex>(pattern)
            .regex
            .replace_all(&text, replacement.as_str())
            .into_owned()
    } else {
        let pattern = expect_str(vm, pattern, "pattern")?;
        text.replace(&pattern, &replacement)
    };
    Ok(vm.alloc_string(result))
}

fn predicate(
    vm: &mut VM,
    s: Value,
    other: Value,
    test: fn(&str, &str) -> bool,
) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    let other = expect_str(vm, other, "argument")?;
    Ok(Value::from_bool(test(&text, &other)))
}

fn contains(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    predicate(vm, s, other, |a, b| a.contains(b))
}

fn starts_with(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    predicate(vm, s, other, |a, b| a.starts_with(b))
}

fn ends_with(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    predicate(vm, s, other, |a, b| a.ends_with(b))
}

fn lt(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    predicate(vm, s, other, |a, b| a < b)
}

fn gt(vm: &mut VM, s: Value, other: Value) -> PrimitiveResult {
    predicate(vm, s, other, |a, b| a > b)
}

/// `nil` when the text is not an integer.
fn to_int(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    Ok(match text.trim().parse::<i64>() {
        Ok(n) => vm.alloc_integer(n),
        Err(_) => Value::NIL,
    })
}

fn to_float(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    Ok(match text.trim().parse::<f64>() {
        Ok(f) => vm.alloc_float(f),
        Err(_) => Value::NIL,
    })
}

fn to_symbol(vm: &mut VM, s: Value) -> PrimitiveResult {
    let text = receiver(vm, s)?;
    Ok(Value::from_symbol(Symbol::intern(&text)))
}

fn start(vm: &mut VM, s: Value) -> PrimitiveResult {
    receiver(vm, s)?;
    Ok(iterator::new_iterator(vm, s))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("size", size),
    PrimitiveDesc::binary("add", add),
    PrimitiveDesc::binary("mul", mul),
    PrimitiveDesc::binary("at", at),
    PrimitiveDesc::variadic("slice", slice),
    PrimitiveDesc::unary("upper", upper),
    PrimitiveDesc::unary("lower", lower),
    PrimitiveDesc::unary("trim", trim),
    PrimitiveDesc::variadic("split", split),
    PrimitiveDesc::variadic("replace", replace),
    PrimitiveDesc::binary("contains", contains),
    PrimitiveDesc::binary("starts_with", starts_with),
    PrimitiveDesc::binary("ends_with", ends_with),
    PrimitiveDesc::binary("lt", lt),
    PrimitiveDesc::binary("gt", gt),
    PrimitiveDesc::unary("to_int", to_int),
    PrimitiveDesc::unary("to_float", to_float),
    PrimitiveDesc::unary("to_symbol", to_symbol),
    PrimitiveDesc::unary("start", start),
];

fn symbol_name(vm: &mut VM, s: Value) -> PrimitiveResult {
    let symbol = s.as_symbol().ok_or_else(|| {
        RuntimeError::type_error(format!("expected a Symbol, got {}", vm.type_name(s)))
    })?;
    Ok(vm.alloc_string(symbol.name().to_string()))
}

pub const SYMBOL_METHODS: &[PrimitiveDesc] = &[PrimitiveDesc::unary("name", symbol_name)];

/// `String(x)` is the display form of `x`.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    let value = match args {
        [] => String::new(),
        [value] => vm.display(*value)?,
        _ => return Err(RuntimeError::arity(1, args.len())),
    };
    Ok(vm.alloc(ty, VMString { value }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(vm: &VM, array: Value) -> Vec<String> {
        vm.array_elements(array)
            .expect("array")
            .iter()
            .map(|&v| vm.string_value(v).expect("string").to_string())
            .collect()
    }

    #[test]
    fn indexing_counts_characters() {
        let mut vm = VM::default();
        let s = vm.alloc_string("héllo");
        let n = size(&mut vm, s).expect("size");
        assert_eq!(vm.int_value(n), Some(5));
        let one = vm.alloc_integer(1);
        let c = at(&mut vm, s, one).expect("at");
        assert_eq!(vm.string_value(c), Some("é"));
        let far = vm.alloc_integer(5);
        assert!(matches!(at(&mut vm, s, far), Err(RuntimeError::RangeError(_))));
    }

    #[test]
    fn split_by_separator_and_whitespace() {
        let mut vm = VM::default();
        let s = vm.alloc_string("a,b,,c");
        let comma = vm.alloc_string(",");
        let parts = split(&mut vm, s, &[comma]).expect("split");
        assert_eq!(strings(&vm, parts), ["a", "b", "", "c"]);

        let t = vm.alloc_string("  two  words ");
        let parts = split(&mut vm, t, &[]).expect("split");
        assert_eq!(strings(&vm, parts), ["two", "words"]);
    }

    #[test]
    fn unparseable_text_converts_to_nil() {
        let mut vm = VM::default();
        let s = vm.alloc_string("12x");
        assert_eq!(to_int(&mut vm, s).expect("to_int"), Value::NIL);
        let t = vm.alloc_string(" 42 ");
        let n = to_int(&mut vm, t).expect("to_int");
        assert_eq!(vm.int_value(n), Some(42));
    }

    #[test]
    fn concatenation_requires_a_string() {
        let mut vm = VM::default();
        let s = vm.alloc_string("a");
        let n = vm.alloc_integer(1);
        assert!(matches!(add(&mut vm, s, n), Err(RuntimeError::TypeError(_))));
        let t = vm.alloc_string("b");
        let joined = add(&mut vm, s, t).expect("add");
        assert_eq!(vm.string_value(joined), Some("ab"));
    }

    #[test]
    fn oversized_repetition_is_a_range_error() {
        let mut vm = VM::default();
        let s = vm.alloc_string("abc");
        let huge = vm.alloc_integer(i64::MAX);
        assert!(matches!(mul(&mut vm, s, huge), Err(RuntimeError::RangeError(_))));
        let past_cap = vm.alloc_integer((MAX_REPEAT_BYTES / 3 + 1) as i64);
        assert!(matches!(mul(&mut vm, s, past_cap), Err(RuntimeError::RangeError(_))));

        let two = vm.alloc_integer(2);
        let twice = mul(&mut vm, s, two).expect("mul");
        assert_eq!(vm.string_value(twice), Some("abcabc"));
    }
}
