use crate::{
    Constructor, Heap, ObjectKind, RootProvider, RuntimeError, Symbol, TypeObject, Value,
};

/// The builtin types every VM starts with.
///
/// All fields are `Type` objects. They are GC roots for the lifetime of the
/// VM.
#[derive(Debug, Clone, Copy)]
pub struct SpecialObjects {
    // ── Roots of the hierarchy ─────────────────────────────────────
    /// The root type. Its parent is itself.
    pub object: Value,

    /// The type of every `Type`, itself included.
    pub type_: Value,

    // ── Types of builtin kinds ─────────────────────────────────────
    pub nil: Value,
    pub boolean: Value,
    pub integer: Value,
    pub float: Value,
    pub string: Value,
    pub symbol: Value,
    pub array: Value,
    pub dictionary: Value,
    pub range: Value,
    pub regex: Value,
    pub regex_result: Value,
    pub function: Value,
    pub builtin_function: Value,
    pub partial_function: Value,
    pub environment: Value,
    pub blob: Value,
    pub iterator: Value,

    /// Base of every builtin error type. Any value can be raised, but
    /// errors signalled by the VM are instances of a subtype of this.
    pub exception: Value,

    // ── Builtin error types ────────────────────────────────────────
    pub no_such_member: Value,
    pub not_callable: Value,
    pub wrong_argument_count: Value,
    pub type_error: Value,
    pub divide_by_zero: Value,
    pub range_error: Value,
    pub iterator_state_error: Value,
}

/// Temporary root provider used during bootstrap.
struct BootstrapRoots {
    roots: Vec<Value>,
}

impl RootProvider for BootstrapRoots {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for root in &mut self.roots {
            visitor(root);
        }
    }
}

impl SpecialObjects {
    /// Allocates the type hierarchy.
    ///
    /// `Object` and `Type` refer to themselves and each other, so both are
    /// allocated with a placeholder and patched afterwards.
    pub fn bootstrap(heap: &mut Heap) -> Self {
        let mut roots = BootstrapRoots {
            roots: Vec::with_capacity(32),
        };

        let object = heap.alloc(
            Value::NIL,
            TypeObject::new(Symbol::intern("Object"), Value::NIL, Constructor::Instance),
            &mut roots,
        );
        heap.get_mut::<TypeObject>(object).parent = object;
        roots.roots.push(object);

        let type_ = heap.alloc(
            Value::NIL,
            TypeObject::new(Symbol::intern("Type"), object, Constructor::Abstract),
            &mut roots,
        );
        heap.set_type(object, type_);
        heap.set_type(type_, type_);
        roots.roots.push(type_);

        let mut make = |name: &str, parent: Value, constructor: Constructor| {
            let ty = heap.alloc(
                type_,
                TypeObject::new(Symbol::intern(name), parent, constructor),
                &mut roots,
            );
            roots.roots.push(ty);
            ty
        };

        let nil = make("Nil", object, Constructor::Abstract);
        let boolean = make("Boolean", object, Constructor::Abstract);
        let integer = make("Integer", object, Constructor::Abstract);
        let float = make("Float", object, Constructor::Abstract);
        let string = make("String", object, Constructor::Abstract);
        let symbol = make("Symbol", object, Constructor::Abstract);
        let array = make("Array", object, Constructor::Abstract);
        let dictionary = make("Dictionary", object, Constructor::Abstract);
        let range = make("Range", object, Constructor::Abstract);
        let regex = make("Regex", object, Constructor::Abstract);
        let regex_result = make("RegexResult", object, Constructor::Abstract);
        let function = make("Function", object, Constructor::Abstract);
        let builtin_function = make("BuiltinFunction", function, Constructor::Inherit);
        let partial_function = make("PartialFunction", function, Constructor::Inherit);
        let environment = make("Environment", object, Constructor::Abstract);
        let blob = make("Blob", object, Constructor::Abstract);
        let iterator = make("Iterator", object, Constructor::Abstract);
        let exception = make("Exception", object, Constructor::Abstract);

        let no_such_member = make("NoSuchMember", exception, Constructor::Inherit);
        let not_callable = make("NotCallable", exception, Constructor::Inherit);
        let wrong_argument_count = make("WrongArgumentCount", exception, Constructor::Inherit);
        let type_error = make("TypeError", exception, Constructor::Inherit);
        let divide_by_zero = make("DivideByZero", exception, Constructor::Inherit);
        let range_error = make("RangeError", exception, Constructor::Inherit);
        let iterator_state_error = make("IteratorStateError", exception, Constructor::Inherit);

        Self {
            object,
            type_,
            nil,
            boolean,
            integer,
            float,
            string,
            symbol,
            array,
            dictionary,
            range,
            regex,
            regex_result,
            function,
            builtin_function,
            partial_function,
            environment,
            blob,
            iterator,
            exception,
            no_such_member,
            not_callable,
            wrong_argument_count,
            type_error,
            divide_by_zero,
            range_error,
            iterator_state_error,
        }
    }

    fn fields_mut(&mut self) -> [&mut Value; 27] {
        [
            &mut self.object,
            &mut self.type_,
            &mut self.nil,
            &mut self.boolean,
            &mut self.integer,
            &mut self.float,
            &mut self.string,
            &mut self.symbol,
            &mut self.array,
            &mut self.dictionary,
            &mut self.range,
            &mut self.regex,
            &mut self.regex_result,
            &mut self.function,
            &mut self.builtin_function,
            &mut self.partial_function,
            &mut self.environment,
            &mut self.blob,
            &mut self.iterator,
            &mut self.exception,
            &mut self.no_such_member,
            &mut self.not_callable,
            &mut self.wrong_argument_count,
            &mut self.type_error,
            &mut self.divide_by_zero,
            &mut self.range_error,
            &mut self.iterator_state_error,
        ]
    }

    /// Every special type, in declaration order.
    pub fn all(&self) -> Vec<Value> {
        let mut copy = *self;
        copy.fields_mut().into_iter().map(|v| *v).collect()
    }

    pub fn visit(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for field in self.fields_mut() {
            visitor(field);
        }
    }

    /// The type of a value that has no header.
    pub fn immediate_type(&self, value: Value) -> Value {
        match value.kind() {
            ObjectKind::Nil => self.nil,
            ObjectKind::Boolean => self.boolean,
            ObjectKind::Integer => self.integer,
            ObjectKind::Symbol => self.symbol,
            _ => self.object,
        }
    }

    /// The exception type raised for `error`.
    ///
    /// Unbound variables share `NoSuchMember`; malformed commands surface as
    /// `TypeError`.
    pub fn error_type(&self, error: &RuntimeError) -> Value {
        match error {
            RuntimeError::NoSuchMember { .. } | RuntimeError::UnboundVariable(_) => {
                self.no_such_member
            }
            RuntimeError::NotCallable(_) => self.not_callable,
            RuntimeError::WrongArgumentCount { .. } => self.wrong_argument_count,
            RuntimeError::TypeError(_) | RuntimeError::MalformedCommand(_) => self.type_error,
            RuntimeError::DivideByZero => self.divide_by_zero,
            RuntimeError::RangeError(_) => self.range_error,
            RuntimeError::IteratorStateError(_) => self.iterator_state_error,
            RuntimeError::Thrown(_) => self.exception,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapSettings;

    #[test]
    fn root_type_is_its_own_parent_and_typed_by_type() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        assert_eq!(heap.get::<TypeObject>(special.object).parent, special.object);
        assert_eq!(heap.header(special.object).map(|h| h.ty), Some(special.type_));
        assert_eq!(heap.header(special.type_).map(|h| h.ty), Some(special.type_));
        assert_eq!(heap.get::<TypeObject>(special.type_).parent, special.object);
    }

    #[test]
    fn error_types_descend_from_exception() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        for ty in [special.type_error, special.range_error, special.no_such_member] {
            assert_eq!(heap.get::<TypeObject>(ty).parent, special.exception);
        }
        assert_eq!(special.all().len(), 27);
    }

    #[test]
    fn immediates_map_to_their_builtin_types() {
        let mut heap = Heap::new(HeapSettings::default());
        let special = SpecialObjects::bootstrap(&mut heap);
        assert_eq!(special.immediate_type(Value::NIL), special.nil);
        assert_eq!(special.immediate_type(Value::TRUE), special.boolean);
        let five = Value::small_int(5).expect("cached");
        assert_eq!(special.immediate_type(five), special.integer);
    }
}
