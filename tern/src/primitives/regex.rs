//! Regex literals compile once, when the literal is pushed. Match results
//! keep the subject alive and record group offsets into it.
use super::{PrimitiveDesc, PrimitiveResult, arg, expect_index, expect_kind, expect_str, int_result};
use crate::{ObjectKind, Regex, RegexMatch, RuntimeError, VM, Value};

fn pattern(vm: &VM, r: Value) -> Result<::regex::Regex, RuntimeError> {
    expect_kind(vm, r, ObjectKind::Regex, "receiver")?;
    // cloning a compiled regex shares its program
    Ok(vm.heap.get::<Regex>(r).regex.clone())
}

fn source(vm: &mut VM, r: Value) -> PrimitiveResult {
    expect_kind(vm, r, ObjectKind::Regex, "receiver")?;
    let source = vm.heap.get::<Regex>(r).source.clone();
    Ok(vm.alloc_string(source))
}

fn matches(vm: &mut VM, r: Value, subject: Value) -> PrimitiveResult {
    let regex = pattern(vm, r)?;
    let text = expect_str(vm, subject, "subject")?;
    Ok(Value::from_bool(regex.is_match(&text)))
}

/// The first match as a `RegexResult`, or `nil`.
fn match_(vm: &mut VM, r: Value, subject: Value) -> PrimitiveResult {
    let regex = pattern(vm, r)?;
    let text = expect_str(vm, subject, "subject")?;
    let Some(captures) = regex.captures(&text) else {
        return Ok(Value::NIL);
    };
    let groups = captures
        .iter()
        .map(|group| group.map(|m| (m.start(), m.end())))
        .collect();
    let ty = vm.special().regex_result;
    Ok(vm.alloc(ty, RegexMatch { subject, groups }))
}

fn find_all(vm: &mut VM, r: Value, subject: Value) -> PrimitiveResult {
    let regex = pattern(vm, r)?;
    let text = expect_str(vm, subject, "subject")?;
    let found: Vec<String> = regex.find_iter(&text).map(|m| m.as_str().to_string()).collect();
    let result = vm.alloc_array(Vec::with_capacity(found.len()));
    vm.root(result);
    for item in found {
        let item = vm.alloc_string(item);
        vm.heap.get_mut::<crate::Array>(result).elements.push(item);
    }
    Ok(result)
}

/// Replaces every match; `$1` and `${name}` in the replacement expand.
fn replace(vm: &mut VM, r: Value, args: &[Value]) -> PrimitiveResult {
    let regex = pattern(vm, r)?;
    let text = expect_str(vm, arg(args, 0, 2)?, "subject")?;
    let replacement = expect_str(vm, arg(args, 1, 2)?, "replacement")?;
    let result = regex.replace_all(&text, replacement.as_str()).into_owned();
    Ok(vm.alloc_string(result))
}

pub const METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::unary("source", source),
    PrimitiveDesc::binary("matches", matches),
    PrimitiveDesc::binary("match", match_),
    PrimitiveDesc::binary("find_all", find_all),
    PrimitiveDesc::variadic("replace", replace),
];

fn group_text(vm: &VM, m: Value, index: usize) -> Option<String> {
    let result = vm.heap.get::<RegexMatch>(m);
    let (start, end) = result.groups.get(index).copied().flatten()?;
    vm.string_value(result.subject)
        .and_then(|s| s.get(start..end))
        .map(str::to_string)
}

fn group_count(vm: &VM, m: Value) -> Result<usize, RuntimeError> {
    expect_kind(vm, m, ObjectKind::RegexResult, "receiver")?;
    Ok(vm.heap.get::<RegexMatch>(m).groups.len())
}

/// Group `i`; group 0 is the whole match. Unmatched groups are `nil`.
fn at(vm: &mut VM, m: Value, index: Value) -> PrimitiveResult {
    let count = group_count(vm, m)?;
    let i = expect_index(vm, index, count)?;
    Ok(match group_text(vm, m, i) {
        Some(text) => vm.alloc_string(text),
        None => Value::NIL,
    })
}

fn size(vm: &mut VM, m: Value) -> PrimitiveResult {
    let count = group_count(vm, m)?;
    Ok(int_result(vm, count))
}

fn matched(vm: &mut VM, m: Value) -> PrimitiveResult {
    group_count(vm, m)?;
    let text = group_text(vm, m, 0).unwrap_or_default();
    Ok(vm.alloc_string(text))
}

/// Capture groups 1.., without the whole match.
fn groups(vm: &mut VM, m: Value) -> PrimitiveResult {
    let count = group_count(vm, m)?;
    let result = vm.alloc_array(Vec::with_capacity(count.saturating_sub(1)));
    vm.root(result);
    for i in 1..count {
        let item = match group_text(vm, m, i) {
            Some(text) => vm.alloc_string(text),
            None => Value::NIL,
        };
        vm.heap.get_mut::<crate::Array>(result).elements.push(item);
    }
    Ok(result)
}

/// Character offset of the whole match in the subject.
fn position(vm: &mut VM, m: Value) -> PrimitiveResult {
    group_count(vm, m)?;
    let result = vm.heap.get::<RegexMatch>(m);
    let start = result.groups.first().copied().flatten().map_or(0, |(s, _)| s);
    let chars = vm
        .string_value(result.subject)
        .and_then(|s| s.get(..start))
        .map_or(0, |prefix| prefix.chars().count());
    Ok(int_result(vm, chars))
}

pub const RESULT_METHODS: &[PrimitiveDesc] = &[
    PrimitiveDesc::binary("at", at),
    PrimitiveDesc::unary("size", size),
    PrimitiveDesc::unary("matched", matched),
    PrimitiveDesc::unary("groups", groups),
    PrimitiveDesc::unary("position", position),
];

/// `Regex(source)` compiles at run time.
pub(crate) fn construct(vm: &mut VM, ty: Value, args: &[Value]) -> PrimitiveResult {
    if args.len() != 1 {
        return Err(RuntimeError::arity(1, args.len()));
    }
    let source = expect_str(vm, args[0], "Regex source")?;
    vm.compile_regex_as(ty, &source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_records_groups_and_misses_give_nil() {
        let mut vm = VM::default();
        let r = vm.compile_regex(r"(\w+)@(\w+)?").expect("compile");
        let subject = vm.alloc_string("mail: ann@host");
        let m = match_(&mut vm, r, subject).expect("match");
        assert_eq!(m.kind(), ObjectKind::RegexResult);

        let whole = matched(&mut vm, m).expect("matched");
        assert_eq!(vm.string_value(whole), Some("ann@host"));
        let one = vm.alloc_integer(1);
        let user = at(&mut vm, m, one).expect("group");
        assert_eq!(vm.string_value(user), Some("ann"));
        let pos = position(&mut vm, m).expect("position");
        assert_eq!(vm.int_value(pos), Some(6));

        let none = vm.alloc_string("nothing here");
        assert_eq!(match_(&mut vm, r, none).expect("match"), Value::NIL);
    }

    #[test]
    fn invalid_source_is_a_type_error() {
        let mut vm = VM::default();
        assert!(matches!(vm.compile_regex("("), Err(RuntimeError::TypeError(_))));
    }

    #[test]
    fn replace_expands_group_references() {
        let mut vm = VM::default();
        let r = vm.compile_regex(r"(\d+)-(\d+)").expect("compile");
        let text = vm.alloc_string("1-2 and 30-40");
        let with = vm.alloc_string("$2-$1");
        let out = replace(&mut vm, r, &[text, with]).expect("replace");
        assert_eq!(vm.string_value(out), Some("2-1 and 40-30"));
    }
}
