use std::{
    io::{self, Write},
    rc::Rc,
};

use log::{error, warn};

use crate::{
    Array, BuiltinFunction, Constructor, DictKey, Dictionary, Environment, Float, FunctionBody,
    GcStats, Heap, HeapObject, HeapSettings, Instance, Integer, ObjectKind, RuntimeError,
    SpecialObjects, Symbol, TypeObject, VMString, Value,
    interpreter::{Frame, InterpreterState},
    lookup,
    primitives::{self, Primitive, number::Number},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct VMCreateInfo {
    pub heap: HeapSettings,
}

/// How a top-level execution ended.
///
/// The carried value is only guaranteed to stay valid until the next
/// allocation; root it or copy out what is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Returned(Value),
    Excepted(Value),
}

impl Outcome {
    pub fn value(self) -> Value {
        match self {
            Self::Returned(v) | Self::Excepted(v) => v,
        }
    }

    pub fn is_returned(self) -> bool {
        matches!(self, Self::Returned(_))
    }
}

pub type ExceptionHandler = Box<dyn FnMut(&mut VM, Value)>;

/// The VM owns the heap, the interpreter state and the bootstrapped types.
pub struct VM {
    pub heap: Heap,
    pub(crate) state: InterpreterState,
    exception_handler: Option<ExceptionHandler>,
    output: Box<dyn Write>,
}

impl VM {
    pub fn new(info: VMCreateInfo) -> Self {
        let mut heap = Heap::new(info.heap);
        let special = SpecialObjects::bootstrap(&mut heap);
        let mut state = InterpreterState {
            stack: Vec::new(),
            frames: Vec::new(),
            catchers: Vec::new(),
            special,
            globals: Value::NIL,
            scratch: Vec::new(),
            native_depth: 0,
        };
        state.globals = heap.alloc(special.environment, Environment::default(), &mut state);

        let mut vm = Self {
            heap,
            state,
            exception_handler: None,
            output: Box::new(io::stdout()),
        };
        for ty in special.all() {
            let name = vm.heap.get::<TypeObject>(ty).name;
            vm.define_global_symbol(name, ty);
        }
        primitives::install(&mut vm);
        vm
    }

    pub fn special(&self) -> &SpecialObjects {
        &self.state.special
    }

    /// The base environment every program closes over.
    pub fn globals(&self) -> Value {
        self.state.globals
    }

    /// The shared operand stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.state.stack
    }

    pub fn set_exception_handler(&mut self, handler: impl FnMut(&mut VM, Value) + 'static) {
        self.exception_handler = Some(Box::new(handler));
    }

    /// Redirects `print`.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        if let Err(err) = self.output.write_all(text.as_bytes()) {
            warn!("failed to write program output: {err}");
        }
    }

    pub fn flush_output(&mut self) {
        if let Err(err) = self.output.flush() {
            warn!("failed to flush program output: {err}");
        }
    }

    // ── execution ──────────────────────────────────────────────────

    /// Runs `body` as a top-level program.
    pub fn execute(&mut self, body: impl Into<Rc<FunctionBody>>) -> Outcome {
        self.execute_top(body.into(), false)
    }

    /// Like [`VM::execute`], but the program's top-level `let`s stay bound
    /// in the base environment afterwards.
    pub fn execute_repl_line(&mut self, body: impl Into<Rc<FunctionBody>>) -> Outcome {
        self.execute_top(body.into(), true)
    }

    fn execute_top(&mut self, body: Rc<FunctionBody>, copy_locals: bool) -> Outcome {
        let floor = self.state.frames.len();
        let base = self.state.stack.len();
        let scratch = self.state.scratch.len();
        let globals = self.state.globals;
        let ty = self.state.special.environment;
        let env = self.alloc(ty, Environment::with_parent(globals));
        self.state.frames.push(Frame {
            body,
            ip: 0,
            env,
            function_env: env,
            caller_env: globals,
            args: Vec::new(),
            stack_base: base,
            copy_locals,
        });

        let outcome = match self.run(floor) {
            Ok(value) => Outcome::Returned(value),
            Err(err) => {
                let exception = self.error_value(err);
                self.push(exception);
                let text = self
                    .repr(exception)
                    .unwrap_or_else(|_| format!("<{} object>", self.type_name(exception)));
                error!("uncaught exception: {text}");
                if let Some(mut handler) = self.exception_handler.take() {
                    handler(self, exception);
                    // the handler may have installed a replacement
                    if self.exception_handler.is_none() {
                        self.exception_handler = Some(handler);
                    }
                }
                Outcome::Excepted(exception)
            }
        };
        self.state.stack.truncate(base);
        self.state.scratch.truncate(scratch);
        outcome
    }

    /// Calls any callable from native code and runs it to completion.
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        self.call_inner(callee, None, args)
    }

    /// Calls `method` with `self` bound to `receiver`.
    pub fn call_method(
        &mut self,
        receiver: Value,
        method: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.call_inner(method, Some(receiver), args)
    }

    /// Dynamic dispatch of `name` on `receiver`.
    pub fn send(&mut self, receiver: Value, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let name = Symbol::intern(name);
        let ty = self.type_of(receiver);
        match lookup::find_method(&self.heap, ty, name) {
            Some(method) => self.call_method(receiver, method, args),
            None => Err(RuntimeError::NoSuchMember {
                receiver: self.type_name(receiver),
                member: name,
            }),
        }
    }

    /// Creates an instance of `ty`. The arguments must be rooted by the
    /// caller.
    pub fn construct(&mut self, ty: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        if self.heap.try_get::<TypeObject>(ty).is_none() {
            return Err(RuntimeError::NotCallable(self.type_name(ty)));
        }
        match lookup::resolve_constructor(&self.heap, ty) {
            Constructor::Instance => {
                let instance = self.alloc(ty, Instance::default());
                let init = lookup::find_method(&self.heap, ty, Symbol::intern("init"));
                match init {
                    Some(init) => {
                        self.call_method(instance, init, args)?;
                        Ok(instance)
                    }
                    None if args.is_empty() => Ok(instance),
                    None => Err(RuntimeError::arity(0, args.len())),
                }
            }
            // a bytecode `init` on a subtype of a builtin gets every
            // argument; the builtin payload starts out empty
            Constructor::Native(construct) => match self.bytecode_init(ty) {
                Some(init) => {
                    let value = primitives::blank(self, ty)?;
                    self.call_method(value, init, args)?;
                    Ok(value)
                }
                None => construct(self, ty, args),
            },
            Constructor::Abstract | Constructor::Inherit => Err(RuntimeError::type_error(format!(
                "{} cannot be constructed",
                self.heap.get::<TypeObject>(ty).name
            ))),
        }
    }

    fn bytecode_init(&self, ty: Value) -> Option<Value> {
        lookup::find_method(&self.heap, ty, Symbol::intern("init"))
            .filter(|method| method.kind() == ObjectKind::Function)
    }

    /// The heap value for `err`. Raised values pass through unchanged;
    /// VM errors become instances of the matching builtin exception type.
    pub fn error_value(&mut self, err: RuntimeError) -> Value {
        match err {
            RuntimeError::Thrown(value) => value,
            other => {
                let ty = self.state.special.error_type(&other);
                self.new_exception(ty, &other.to_string())
            }
        }
    }

    pub fn collect_garbage(&mut self) -> GcStats {
        self.heap.collect(&mut self.state)
    }

    pub(crate) fn call_primitive(
        &mut self,
        name: Symbol,
        primitive: Primitive,
        receiver: Option<Value>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match (primitive, receiver, args) {
            (Primitive::Unary(f), Some(r), []) => f(self, r),
            (Primitive::Unary(f), None, [a]) => f(self, *a),
            (Primitive::Unary(_), Some(_), _) => Err(RuntimeError::arity(0, args.len())),
            (Primitive::Unary(_), None, _) => Err(RuntimeError::arity(1, args.len())),
            (Primitive::Binary(f), Some(r), [a]) => f(self, r, *a),
            (Primitive::Binary(f), None, [a, b]) => f(self, *a, *b),
            (Primitive::Binary(_), Some(_), _) => Err(RuntimeError::arity(1, args.len())),
            (Primitive::Binary(_), None, _) => Err(RuntimeError::arity(2, args.len())),
            (Primitive::Variadic(f), r, args) => f(self, r.unwrap_or(Value::NIL), args),
            (Primitive::Native(f), r, args) => crate::native::invoke(self, name, f, r, args),
        }
    }

    // ── temporaries ────────────────────────────────────────────────

    /// Keeps `value` alive until [`VM::release`] with an earlier mark, or
    /// until the enclosing builtin call returns.
    pub fn root(&mut self, value: Value) {
        self.state.scratch.push(value);
    }

    pub fn scratch_mark(&self) -> usize {
        self.state.scratch.len()
    }

    pub fn release(&mut self, mark: usize) {
        self.state.scratch.truncate(mark);
    }

    // ── allocation ─────────────────────────────────────────────────

    pub fn alloc<T: HeapObject>(&mut self, ty: Value, payload: T) -> Value {
        self.heap.alloc(ty, payload, &mut self.state)
    }

    /// Small integers are immediates and therefore identical; everything
    /// else gets a fresh cell.
    pub fn alloc_integer(&mut self, n: i64) -> Value {
        match Value::small_int(n) {
            Some(value) => value,
            None => {
                let ty = self.state.special.integer;
                self.alloc(ty, Integer { value: n })
            }
        }
    }

    pub fn alloc_float(&mut self, value: f64) -> Value {
        let ty = self.state.special.float;
        self.alloc(ty, Float { value })
    }

    pub fn alloc_string(&mut self, value: impl Into<String>) -> Value {
        let ty = self.state.special.string;
        self.alloc(ty, VMString { value: value.into() })
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> Value {
        self.new_array_of(elements)
    }

    pub fn alloc_dictionary(&mut self) -> Value {
        let ty = self.state.special.dictionary;
        self.alloc(ty, Dictionary::default())
    }

    pub fn alloc_builtin(&mut self, name: &str, primitive: Primitive) -> Value {
        let ty = self.state.special.builtin_function;
        self.alloc(
            ty,
            BuiltinFunction {
                name: Symbol::intern(name),
                primitive,
            },
        )
    }

    pub fn alloc_exception(&mut self, ty: Value, message: &str) -> Value {
        self.new_exception(ty, message)
    }

    // ── globals and methods ────────────────────────────────────────

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.define_global_symbol(Symbol::intern(name), value);
    }

    fn define_global_symbol(&mut self, name: Symbol, value: Value) {
        let globals = self.state.globals;
        self.heap
            .get_mut::<Environment>(globals)
            .bindings
            .insert(name, value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.heap
            .get::<Environment>(self.state.globals)
            .bindings
            .get(&Symbol::intern(name))
            .copied()
    }

    pub fn define_method(&mut self, ty: Value, name: &str, primitive: Primitive) {
        let method = self.alloc_builtin(name, primitive);
        self.heap
            .get_mut::<TypeObject>(ty)
            .methods
            .insert(Symbol::intern(name), method);
    }

    pub fn set_constructor(&mut self, ty: Value, constructor: Constructor) {
        self.heap.get_mut::<TypeObject>(ty).constructor = constructor;
    }

    // ── inspection ─────────────────────────────────────────────────

    pub fn type_of(&self, value: Value) -> Value {
        if value.is_immediate() {
            return self.state.special.immediate_type(value);
        }
        self.heap
            .header(value)
            .map_or(self.state.special.object, |h| h.ty)
    }

    pub fn type_name(&self, value: Value) -> String {
        self.heap
            .try_get::<TypeObject>(self.type_of(value))
            .map_or_else(|| value.kind().name().to_string(), |ty| ty.name.to_string())
    }

    pub fn is_instance_of(&self, value: Value, ty: Value) -> bool {
        lookup::is_subtype(&self.heap, self.type_of(value), ty)
    }

    pub fn find_method(&self, value: Value, name: &str) -> Option<Value> {
        lookup::find_method(&self.heap, self.type_of(value), Symbol::intern(name))
    }

    pub fn int_value(&self, value: Value) -> Option<i64> {
        value
            .as_small_int()
            .or_else(|| self.heap.try_get::<Integer>(value).map(|i| i.value))
    }

    pub fn float_value(&self, value: Value) -> Option<f64> {
        self.heap.try_get::<Float>(value).map(|f| f.value)
    }

    pub fn number(&self, value: Value) -> Option<Number> {
        match value.kind() {
            ObjectKind::Integer => self.int_value(value).map(Number::Int),
            ObjectKind::Float => self.float_value(value).map(Number::Float),
            _ => None,
        }
    }

    pub fn string_value(&self, value: Value) -> Option<&str> {
        self.heap
            .try_get::<VMString>(value)
            .map(|s| s.value.as_str())
    }

    pub fn array_elements(&self, value: Value) -> Option<&[Value]> {
        self.heap
            .try_get::<Array>(value)
            .map(|a| a.elements.as_slice())
    }

    /// The hashable identity of `value` as a dictionary key.
    pub fn dict_key(&self, value: Value) -> DictKey {
        if let Some(n) = self.int_value(value) {
            return DictKey::Int(n);
        }
        match value.kind() {
            ObjectKind::Nil => DictKey::Nil,
            ObjectKind::Boolean => DictKey::Bool(value.is_truthy()),
            ObjectKind::Symbol => value
                .as_symbol()
                .map_or(DictKey::Identity(value.raw()), DictKey::Symbol),
            ObjectKind::Float => match self.float_value(value) {
                // -0.0 and 0.0 are the same key
                Some(f) if f == 0.0 => DictKey::Float(0f64.to_bits()),
                Some(f) => DictKey::Float(f.to_bits()),
                None => DictKey::Identity(value.raw()),
            },
            ObjectKind::String => match self.string_value(value) {
                Some(s) => DictKey::Str(s.into()),
                None => DictKey::Identity(value.raw()),
            },
            _ => DictKey::Identity(value.raw()),
        }
    }

    pub fn dict_insert(&mut self, dict: Value, key: Value, value: Value) {
        let hashed = self.dict_key(key);
        self.heap
            .get_mut::<Dictionary>(dict)
            .entries
            .insert(hashed, (key, value));
    }

    pub fn dict_get(&self, dict: Value, key: Value) -> Option<Value> {
        let hashed = self.dict_key(key);
        self.heap
            .try_get::<Dictionary>(dict)
            .and_then(|d| d.entries.get(&hashed))
            .map(|&(_, v)| v)
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new(VMCreateInfo::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BytecodeBuilder;

    #[test]
    fn small_integers_are_identical_and_large_ones_are_not() {
        let mut vm = VM::default();
        assert_eq!(vm.alloc_integer(5), vm.alloc_integer(5));
        assert_eq!(vm.alloc_integer(1023), vm.alloc_integer(1023));
        let a = vm.alloc_integer(1024);
        let b = vm.alloc_integer(1024);
        assert_ne!(a, b);
        assert_eq!(vm.int_value(a), vm.int_value(b));
        let neg = vm.alloc_integer(-1);
        assert!(neg.is_heap());
        assert_eq!(vm.int_value(neg), Some(-1));
    }

    #[test]
    fn builtin_types_are_bound_as_globals() {
        let vm = VM::default();
        assert_eq!(vm.global("Object"), Some(vm.special().object));
        assert_eq!(vm.global("TypeError"), Some(vm.special().type_error));
        assert_eq!(vm.type_name(Value::NIL), "Nil");
        assert_eq!(vm.type_of(vm.special().object), vm.special().type_);
    }

    #[test]
    fn dictionary_keys_compare_strings_by_content() {
        let mut vm = VM::default();
        let a = vm.alloc_string("key");
        let b = vm.alloc_string("key");
        assert_ne!(a, b);
        assert_eq!(vm.dict_key(a), vm.dict_key(b));
        let x = vm.alloc_float(0.0);
        let y = vm.alloc_float(-0.0);
        assert_eq!(vm.dict_key(x), vm.dict_key(y));
    }

    #[test]
    fn uncaught_exception_reaches_the_handler_with_value_on_stack() {
        use std::{cell::RefCell, rc::Rc};

        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let mut vm = VM::default();
        vm.set_exception_handler(move |vm, value| {
            let on_top = vm.stack().last().copied();
            *sink.borrow_mut() = Some((value, on_top, vm.type_name(value)));
        });

        let mut b = BytecodeBuilder::new();
        b.push_int(1).push_int(0).div_fast().return_();
        let outcome = vm.execute(b.into_program());

        assert!(!outcome.is_returned());
        let (value, on_top, name) = seen.borrow_mut().take().expect("handler ran");
        assert_eq!(value, outcome.value());
        assert_eq!(on_top, Some(value));
        assert_eq!(name, "DivideByZero");
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn repl_lines_keep_their_bindings() {
        let mut vm = VM::default();
        let mut first = BytecodeBuilder::new();
        first.push_int(41).let_("answer").push_nil().return_();
        assert!(vm.execute_repl_line(first.into_program()).is_returned());

        let mut second = BytecodeBuilder::new();
        second.read("answer").push_int(1).add_fast().return_();
        let outcome = vm.execute_repl_line(second.into_program());
        assert_eq!(outcome, Outcome::Returned(Value::small_int(42).expect("cached")));
    }

    #[test]
    fn plain_execution_does_not_leak_bindings() {
        let mut vm = VM::default();
        let mut first = BytecodeBuilder::new();
        first.push_int(1).let_("scoped").push_nil().return_();
        vm.execute(first.into_program());
        assert!(vm.global("scoped").is_none());
    }
}
