use crate::{
    BuiltinFunction, Environment, Exception, Function, IteratorObject, ObjectKind, PartialFunction,
    Range, Regex, RegexMatch, RuntimeError, TypeObject, VM, Value,
};

/// Containers nested deeper than this print as `...`.
const MAX_DEPTH: usize = 8;

pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl VM {
    /// The `value()` representation: what an uncaught exception prints
    /// and what containers show for their elements.
    ///
    /// A user-defined `str` or `value` method on the value's type takes
    /// precedence.
    pub fn repr(&mut self, value: Value) -> Result<String, RuntimeError> {
        let mark = self.scratch_mark();
        let result = self.repr_at(value, 0);
        self.release(mark);
        result
    }

    /// What `print` and `str` show: like [`VM::repr`] but strings are not
    /// quoted.
    pub fn display(&mut self, value: Value) -> Result<String, RuntimeError> {
        match self.string_value(value) {
            Some(s) => Ok(s.to_string()),
            None => self.repr(value),
        }
    }

    /// A bytecode `str` method on the value's type, or failing that a
    /// bytecode `value` method.
    fn user_str(&mut self, value: Value) -> Result<Option<String>, RuntimeError> {
        let found = ["str", "value"].into_iter().find_map(|name| {
            self.find_method(value, name)
                .filter(|method| method.kind() == ObjectKind::Function)
                .map(|method| (name, method))
        });
        let Some((name, method)) = found else {
            return Ok(None);
        };
        let result = self.call_method(value, method, &[])?;
        match self.string_value(result) {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(RuntimeError::type_error(format!(
                "{name} must return a String, got {}",
                self.type_name(result)
            ))),
        }
    }

    fn repr_at(&mut self, value: Value, depth: usize) -> Result<String, RuntimeError> {
        if value.is_heap() {
            if let Some(text) = self.user_str(value)? {
                return Ok(text);
            }
        }

        let text = match value.kind() {
            ObjectKind::Nil => "nil".to_string(),
            ObjectKind::Boolean => value.is_truthy().to_string(),
            ObjectKind::Integer => self.int_value(value).unwrap_or_default().to_string(),
            ObjectKind::Float => format_float(self.float_value(value).unwrap_or_default()),
            ObjectKind::String => format!("{:?}", self.string_value(value).unwrap_or_default()),
            ObjectKind::Symbol => match value.as_symbol() {
                Some(symbol) => format!(":{symbol}"),
                None => ":?".to_string(),
            },
            ObjectKind::Array => {
                if depth >= MAX_DEPTH {
                    return Ok("[...]".to_string());
                }
                let elements = self.array_elements(value).unwrap_or_default().to_vec();
                self.root(value);
                let mut parts = Vec::with_capacity(elements.len());
                for element in elements {
                    parts.push(self.repr_at(element, depth + 1)?);
                }
                format!("[{}]", parts.join(", "))
            }
            ObjectKind::Dictionary => {
                if depth >= MAX_DEPTH {
                    return Ok("{...}".to_string());
                }
                let entries: Vec<(Value, Value)> = self
                    .heap
                    .get::<crate::Dictionary>(value)
                    .entries
                    .values()
                    .copied()
                    .collect();
                self.root(value);
                let mut parts = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = self.repr_at(key, depth + 1)?;
                    let item = self.repr_at(item, depth + 1)?;
                    parts.push(format!("{key}: {item}"));
                }
                format!("{{{}}}", parts.join(", "))
            }
            ObjectKind::Range => {
                let range = self.heap.get::<Range>(value);
                let (start, end) = (range.start, range.end);
                format!(
                    "{}..{}",
                    self.int_value(start).unwrap_or_default(),
                    self.int_value(end).unwrap_or_default()
                )
            }
            ObjectKind::Regex => format!("/{}/", self.heap.get::<Regex>(value).source),
            ObjectKind::RegexResult => {
                let result = self.heap.get::<RegexMatch>(value);
                let matched = result
                    .groups
                    .first()
                    .copied()
                    .flatten()
                    .and_then(|(start, end)| {
                        self.string_value(result.subject).and_then(|s| s.get(start..end))
                    })
                    .unwrap_or_default();
                format!("<RegexResult {matched:?}>")
            }
            ObjectKind::Function => {
                let body = &self.heap.get::<Function>(value).body;
                format!("<function {}/{}>", body.display_name(), body.arity)
            }
            ObjectKind::BuiltinFunction => {
                format!("<builtin {}>", self.heap.get::<BuiltinFunction>(value).name)
            }
            ObjectKind::PartialFunction => {
                let callee = self.heap.get::<PartialFunction>(value).callee;
                format!("<partial {}>", self.repr_at(callee, depth + 1)?)
            }
            ObjectKind::Type => format!("<type {}>", self.heap.get::<TypeObject>(value).name),
            ObjectKind::Environment => {
                let count = self.heap.get::<Environment>(value).bindings.len();
                format!("<environment with {count} bindings>")
            }
            ObjectKind::Exception => {
                let message = self.heap.get::<Exception>(value).message;
                let name = self.type_name(value);
                match self.string_value(message) {
                    Some(text) if text.is_empty() => name,
                    Some(text) => format!("{name}: {text}"),
                    None => format!("{name}: {}", self.repr_at(message, depth + 1)?),
                }
            }
            ObjectKind::Blob => format!("<blob {}>", self.heap.get::<crate::Blob>(value).name),
            ObjectKind::Instance => format!("<{} object>", self.type_name(value)),
            ObjectKind::Iterator => {
                let position = self.heap.get::<IteratorObject>(value).position;
                format!("<iterator at {position}>")
            }
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_always_show_a_fraction() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn nested_values_render_recursively() {
        let mut vm = VM::default();
        let s = vm.alloc_string("hi");
        let n = vm.alloc_integer(2000);
        let f = vm.alloc_float(1.5);
        let inner = vm.alloc_array(vec![Value::NIL, Value::TRUE]);
        let outer = vm.alloc_array(vec![s, n, f, inner]);
        assert_eq!(
            vm.repr(outer).expect("repr"),
            r#"["hi", 2000, 1.5, [nil, true]]"#
        );
        assert_eq!(vm.display(s).expect("display"), "hi");
    }

    #[test]
    fn self_containing_array_is_cut_off() {
        let mut vm = VM::default();
        let a = vm.alloc_array(Vec::new());
        vm.heap.get_mut::<crate::Array>(a).elements.push(a);
        let text = vm.repr(a).expect("repr");
        assert!(text.contains("[...]"));
    }

    #[test]
    fn exceptions_show_type_and_message() {
        let mut vm = VM::default();
        let ty = vm.special().range_error;
        let e = vm.alloc_exception(ty, "index 9 out of range");
        assert_eq!(vm.repr(e).expect("repr"), "RangeError: index 9 out of range");
    }
}
