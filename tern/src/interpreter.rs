//! The run loop.
//!
//! One [`Frame`] per active call. All frames share one operand stack; a
//! frame owns the part of it above its `stack_base`. Catchers live on their
//! own stack and remember which frame registered them, so unwinding is a
//! matter of truncating three vectors.
use std::rc::Rc;

use log::{debug, trace};

use crate::{
    Array, BuiltinFunction, Command, Constructor, Environment, Exception, Function,
    FunctionBody, Instance, ObjectKind, Op, Operand, PartialFunction, Regex, RootProvider,
    RuntimeError, SpecialObjects, Symbol, TypeObject, Value, VM, lookup,
    primitives::number::{self, Number},
};

pub(crate) const MAX_FRAMES: usize = 4096;
/// Builtins that call back into bytecode nest the run loop on the native
/// stack.
pub(crate) const MAX_NATIVE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) body: Rc<FunctionBody>,
    pub(crate) ip: usize,
    /// Innermost scope; moves with `EnterBlock` / `LeaveBlock`.
    pub(crate) env: Value,
    /// The scope created for this call.
    pub(crate) function_env: Value,
    /// The caller's innermost scope at call time.
    pub(crate) caller_env: Value,
    pub(crate) args: Vec<Value>,
    pub(crate) stack_base: usize,
    /// Merge locals into the caller on any return, not just `Return true`.
    pub(crate) copy_locals: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Catcher {
    /// `nil` catches everything.
    pub(crate) filter: Value,
    pub(crate) handler: Value,
    pub(crate) frame: usize,
    pub(crate) stack_height: usize,
    pub(crate) env: Value,
    pub(crate) resume: usize,
}

pub struct InterpreterState {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) catchers: Vec<Catcher>,
    pub(crate) special: SpecialObjects,
    pub(crate) globals: Value,
    /// Temporaries held by native code across allocations.
    pub(crate) scratch: Vec<Value>,
    /// Run loops currently nested inside builtin calls.
    pub(crate) native_depth: usize,
}

impl RootProvider for InterpreterState {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for value in self.stack.iter_mut() {
            visitor(value);
        }
        for frame in self.frames.iter_mut() {
            visitor(&mut frame.env);
            visitor(&mut frame.function_env);
            visitor(&mut frame.caller_env);
            for arg in frame.args.iter_mut() {
                visitor(arg);
            }
        }
        for catcher in self.catchers.iter_mut() {
            visitor(&mut catcher.filter);
            visitor(&mut catcher.handler);
            visitor(&mut catcher.env);
        }
        self.special.visit(visitor);
        visitor(&mut self.globals);
        for value in self.scratch.iter_mut() {
            visitor(value);
        }
    }
}

/// What a call did with the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invoked {
    /// A frame was pushed; its result arrives when it returns.
    Frame,
    /// The result is already on the stack.
    Value,
}

fn int_operand(command: &Command) -> Result<i64, RuntimeError> {
    match command.operand {
        Operand::Int(n) => Ok(n),
        _ => Err(RuntimeError::malformed(format!("{command} expects an integer"))),
    }
}

fn count_operand(command: &Command) -> Result<usize, RuntimeError> {
    usize::try_from(int_operand(command)?)
        .map_err(|_| RuntimeError::malformed(format!("{command} expects a count")))
}

fn symbol_operand(command: &Command) -> Result<Symbol, RuntimeError> {
    match command.operand {
        Operand::Symbol(symbol) => Ok(symbol),
        _ => Err(RuntimeError::malformed(format!("{command} expects a symbol"))),
    }
}

fn str_operand(command: &Command) -> Result<&Rc<str>, RuntimeError> {
    match &command.operand {
        Operand::Str(s) => Ok(s),
        _ => Err(RuntimeError::malformed(format!("{command} expects a string"))),
    }
}

impl VM {
    /// Runs until the frame at index `floor` returns.
    ///
    /// Errors that no catcher at or above `floor` handles unwind every frame
    /// from `floor` up and come back as [`RuntimeError::Thrown`].
    pub(crate) fn run(&mut self, floor: usize) -> Result<Value, RuntimeError> {
        loop {
            match self.step(floor) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => self.unwind(err, floor)?,
            }
        }
    }

    fn frame(&self) -> Result<&Frame, RuntimeError> {
        self.state
            .frames
            .last()
            .ok_or_else(|| RuntimeError::malformed("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.state
            .frames
            .last_mut()
            .ok_or_else(|| RuntimeError::malformed("no active frame"))
    }

    fn stack_floor(&self) -> usize {
        self.state.frames.last().map_or(0, |f| f.stack_base)
    }

    /// Values the current frame may pop.
    fn available(&self) -> usize {
        self.state.stack.len().saturating_sub(self.stack_floor())
    }

    fn require(&self, count: usize) -> Result<(), RuntimeError> {
        if self.available() < count {
            return Err(RuntimeError::malformed("operand stack underflow"));
        }
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.require(1)?;
        self.state
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::malformed("operand stack underflow"))
    }

    fn peek(&self) -> Result<Value, RuntimeError> {
        self.require(1)?;
        self.state
            .stack
            .last()
            .copied()
            .ok_or_else(|| RuntimeError::malformed("operand stack underflow"))
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.state.stack.push(value);
    }

    /// Executes one command. `Some` means the floor frame returned.
    fn step(&mut self, floor: usize) -> Result<Option<Value>, RuntimeError> {
        let frame = self.frame_mut()?;
        let Some(command) = frame.body.code.get(frame.ip).cloned() else {
            // falling off the end
            return self.do_return(Value::NIL, false, floor);
        };
        trace!("{:04} {command}", frame.ip);
        frame.ip += 1;
        self.execute_command(&command, floor)
    }

    fn execute_command(
        &mut self,
        command: &Command,
        floor: usize,
    ) -> Result<Option<Value>, RuntimeError> {
        match command.op {
            Op::PushInt => {
                let value = self.alloc_integer(int_operand(command)?);
                self.push(value);
            }
            Op::PushFloat => {
                let Operand::Float(f) = command.operand else {
                    return Err(RuntimeError::malformed(format!("{command} expects a float")));
                };
                let value = self.alloc_float(f);
                self.push(value);
            }
            Op::PushBool => {
                let Operand::Bool(b) = command.operand else {
                    return Err(RuntimeError::malformed(format!("{command} expects a boolean")));
                };
                self.push(Value::from_bool(b));
            }
            Op::PushNil => self.push(Value::NIL),
            Op::PushString => {
                let value = self.alloc_string(str_operand(command)?.to_string());
                self.push(value);
            }
            Op::PushSymbol => self.push(Value::from_symbol(symbol_operand(command)?)),
            Op::PushRegex => {
                let source = str_operand(command)?.clone();
                let value = self.compile_regex(&source)?;
                self.push(value);
            }
            Op::PushFunction => {
                let Operand::Function(body) = &command.operand else {
                    return Err(RuntimeError::malformed(format!("{command} expects a function")));
                };
                let env = self.frame()?.env;
                let ty = self.state.special.function;
                let value = self.alloc(
                    ty,
                    Function {
                        body: body.clone(),
                        env,
                    },
                );
                self.push(value);
            }
            Op::PushType => {
                let Operand::Type(desc) = &command.operand else {
                    return Err(RuntimeError::malformed(format!("{command} expects a type")));
                };
                let parent = match desc.parent {
                    Some(name) => {
                        let parent = self.read_variable(name)?;
                        if self.heap.try_get::<TypeObject>(parent).is_none() {
                            return Err(RuntimeError::type_error(format!(
                                "cannot inherit from {}, a {}",
                                name,
                                self.type_name(parent)
                            )));
                        }
                        parent
                    }
                    None => self.state.special.object,
                };
                let ty = self.state.special.type_;
                let value = self.alloc(
                    ty,
                    TypeObject::new(desc.name, parent, Constructor::Inherit),
                );
                self.push(value);
                let env = self.frame()?.env;
                let function_ty = self.state.special.function;
                for (name, body) in &desc.methods {
                    let method = self.alloc(
                        function_ty,
                        Function {
                            body: body.clone(),
                            env,
                        },
                    );
                    self.heap
                        .get_mut::<TypeObject>(value)
                        .methods
                        .insert(*name, method);
                }
            }
            Op::MakeArray => {
                let count = count_operand(command)?;
                self.require(count)?;
                let start = self.state.stack.len() - count;
                let elements = self.state.stack[start..].to_vec();
                let value = self.alloc_array(elements);
                self.state.stack.truncate(start);
                self.push(value);
            }
            Op::MakeDict => {
                let pairs = count_operand(command)?;
                let count = pairs
                    .checked_mul(2)
                    .ok_or_else(|| RuntimeError::malformed("dictionary too large"))?;
                self.require(count)?;
                let start = self.state.stack.len() - count;
                let dict = self.alloc_dictionary();
                let items = self.state.stack[start..].to_vec();
                for pair in items.chunks_exact(2) {
                    self.dict_insert(dict, pair[0], pair[1]);
                }
                self.state.stack.truncate(start);
                self.push(dict);
            }
            Op::Let => {
                let name = symbol_operand(command)?;
                let value = self.pop()?;
                let env = self.frame()?.env;
                self.heap
                    .get_mut::<Environment>(env)
                    .bindings
                    .insert(name, value);
            }
            Op::Read => {
                let value = self.read_variable(symbol_operand(command)?)?;
                self.push(value);
            }
            Op::Write => {
                let name = symbol_operand(command)?;
                let value = self.pop()?;
                self.write_variable(name, value)?;
            }
            Op::ReadSelf => {
                let value = self.current_self()?.unwrap_or(Value::NIL);
                self.push(value);
            }
            Op::ReadArg => {
                let index = count_operand(command)?;
                let frame = self.frame()?;
                let value = frame.args.get(index).copied().ok_or_else(|| {
                    RuntimeError::range(format!(
                        "argument {index} out of range for {} arguments",
                        frame.args.len()
                    ))
                })?;
                self.push(value);
            }
            Op::ReadMember => {
                let name = symbol_operand(command)?;
                let object = self.peek()?;
                let value = self.read_member(object, name)?;
                self.pop()?;
                self.push(value);
            }
            Op::WriteMember => {
                let name = symbol_operand(command)?;
                let value = self.pop()?;
                let object = self.pop()?;
                self.write_member(object, name, value)?;
            }
            Op::Call => {
                let argc = count_operand(command)?;
                self.require(argc + 1)?;
                let base = self.state.stack.len() - argc - 1;
                let callee = self.state.stack[base];
                self.invoke_with(callee, None, base, argc)?;
            }
            Op::New => {
                let argc = count_operand(command)?;
                self.require(argc + 1)?;
                let base = self.state.stack.len() - argc - 1;
                let ty = self.state.stack[base];
                let args = self.state.stack[base + 1..].to_vec();
                let value = self.construct(ty, &args)?;
                self.state.stack.truncate(base);
                self.push(value);
            }
            Op::EnterBlock => {
                let parent = self.frame()?.env;
                let ty = self.state.special.environment;
                let env = self.alloc(ty, Environment::with_parent(parent));
                self.frame_mut()?.env = env;
            }
            Op::LeaveBlock => {
                let frame = self.frame()?;
                if frame.env == frame.function_env {
                    return Err(RuntimeError::malformed("LeaveBlock without EnterBlock"));
                }
                let parent = self
                    .heap
                    .get::<Environment>(frame.env)
                    .parent
                    .ok_or_else(|| RuntimeError::malformed("block scope without parent"))?;
                self.frame_mut()?.env = parent;
            }
            Op::Return => {
                let Operand::Bool(copy_locals) = command.operand else {
                    return Err(RuntimeError::malformed(format!("{command} expects a boolean")));
                };
                let result = if self.available() > 0 {
                    self.pop()?
                } else {
                    Value::NIL
                };
                return self.do_return(result, copy_locals, floor);
            }
            Op::Jump => {
                let target = self.jump_target(int_operand(command)?)?;
                self.frame_mut()?.ip = target;
            }
            Op::JumpIfFalse | Op::JumpIfTrue => {
                let target = self.jump_target(int_operand(command)?)?;
                let condition = self.peek()?.is_truthy();
                if condition == (command.op == Op::JumpIfTrue) {
                    self.frame_mut()?.ip = target;
                }
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let value = self.peek()?;
                self.push(value);
            }
            Op::PushCatcher => {
                let resume = self.jump_target(int_operand(command)?)?;
                let handler = self.pop()?;
                let filter = self.pop()?;
                if !filter.is_nil() && self.heap.try_get::<TypeObject>(filter).is_none() {
                    return Err(RuntimeError::type_error(format!(
                        "catch filter must be a type, got {}",
                        self.type_name(filter)
                    )));
                }
                let frame = self.frame()?;
                let catcher = Catcher {
                    filter,
                    handler,
                    frame: self.state.frames.len() - 1,
                    stack_height: self.state.stack.len(),
                    env: frame.env,
                    resume,
                };
                self.state.catchers.push(catcher);
            }
            Op::PopCatcher => {
                let current = self.state.frames.len().saturating_sub(1);
                match self.state.catchers.last() {
                    Some(catcher) if catcher.frame == current => {
                        self.state.catchers.pop();
                    }
                    _ => return Err(RuntimeError::malformed("PopCatcher without catcher")),
                }
            }
            Op::Raise => {
                let value = self.pop()?;
                return Err(RuntimeError::Thrown(value));
            }
            Op::AddFast | Op::SubFast | Op::MulFast | Op::DivFast => {
                self.fast_arithmetic(command.op)?;
            }
        }
        Ok(None)
    }

    /// `ip` of the following command plus `offset`. Landing one past the
    /// last command is allowed and behaves like `Return nil`.
    fn jump_target(&self, offset: i64) -> Result<usize, RuntimeError> {
        let frame = self.frame()?;
        let len = frame.body.code.len();
        let target = frame.ip as i64 + offset;
        if target < 0 || target > len as i64 {
            return Err(RuntimeError::range(format!(
                "jump target {target} outside 0..={len}"
            )));
        }
        Ok(target as usize)
    }

    fn do_return(
        &mut self,
        result: Value,
        copy_locals: bool,
        floor: usize,
    ) -> Result<Option<Value>, RuntimeError> {
        let index = self.state.frames.len() - 1;
        let frame = self
            .state
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::malformed("return without frame"))?;
        while self.state.catchers.last().is_some_and(|c| c.frame >= index) {
            self.state.catchers.pop();
        }
        self.state.stack.truncate(frame.stack_base);
        if copy_locals || frame.copy_locals {
            self.merge_locals(&frame);
        }
        if index == floor {
            return Ok(Some(result));
        }
        self.push(result);
        Ok(None)
    }

    /// Copies the frame's own bindings into the caller's scope when the
    /// frame's scope encloses directly over it.
    fn merge_locals(&mut self, frame: &Frame) {
        let locals = self.heap.get::<Environment>(frame.function_env);
        if locals.parent != Some(frame.caller_env) {
            return;
        }
        let bindings: Vec<_> = locals.bindings.iter().map(|(&k, &v)| (k, v)).collect();
        self.heap
            .get_mut::<Environment>(frame.caller_env)
            .bindings
            .extend(bindings);
    }

    // ── calls ──────────────────────────────────────────────────────

    /// Calls `callee` with the `argc` values on top of the stack.
    ///
    /// Everything from `base` up is replaced by the result (or by the new
    /// frame's operand stack).
    pub(crate) fn invoke_with(
        &mut self,
        callee: Value,
        receiver: Option<Value>,
        base: usize,
        argc: usize,
    ) -> Result<Invoked, RuntimeError> {
        match callee.kind() {
            ObjectKind::Function => {
                self.push_function_frame(callee, receiver, base, argc)?;
                Ok(Invoked::Frame)
            }
            ObjectKind::BuiltinFunction => {
                let (name, primitive) = {
                    let builtin = self.heap.get::<BuiltinFunction>(callee);
                    (builtin.name, builtin.primitive)
                };
                let args = self.state.stack[self.state.stack.len() - argc..].to_vec();
                let mark = self.state.scratch.len();
                let result = self.call_primitive(name, primitive, receiver, &args);
                self.state.scratch.truncate(mark);
                let value = result?;
                self.state.stack.truncate(base);
                self.push(value);
                Ok(Invoked::Value)
            }
            ObjectKind::PartialFunction => {
                let (inner, bound_receiver, bound) = {
                    let partial = self.heap.get::<PartialFunction>(callee);
                    (partial.callee, partial.receiver, partial.bound.clone())
                };
                let at = self.state.stack.len() - argc;
                let extra = bound.len();
                self.state.stack.splice(at..at, bound);
                self.invoke_with(inner, bound_receiver.or(receiver), base, argc + extra)
            }
            ObjectKind::Type => {
                let args = self.state.stack[self.state.stack.len() - argc..].to_vec();
                let value = self.construct(callee, &args)?;
                self.state.stack.truncate(base);
                self.push(value);
                Ok(Invoked::Value)
            }
            _ => Err(RuntimeError::NotCallable(self.type_name(callee))),
        }
    }

    fn push_function_frame(
        &mut self,
        callee: Value,
        receiver: Option<Value>,
        base: usize,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        if self.state.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::range("stack overflow"));
        }
        let (body, closure_env) = {
            let function = self.heap.get::<Function>(callee);
            (function.body.clone(), function.env)
        };
        if body.vararg {
            if argc < body.arity {
                return Err(RuntimeError::arity_at_least(body.arity, argc));
            }
        } else if argc != body.arity {
            return Err(RuntimeError::arity(body.arity, argc));
        }

        let mut args = self.state.stack[self.state.stack.len() - argc..].to_vec();
        let ty = self.state.special.environment;
        let env = self.alloc(
            ty,
            Environment {
                parent: Some(closure_env),
                self_value: receiver,
                bindings: Default::default(),
            },
        );
        if body.vararg {
            // keep the new scope reachable while the rest array is built
            self.push(env);
            let rest = args.split_off(body.arity);
            let rest = self.alloc_array(rest);
            args.push(rest);
        }
        let caller_env = self
            .state
            .frames
            .last()
            .map_or(self.state.globals, |f| f.env);
        self.state.stack.truncate(base);
        self.state.frames.push(Frame {
            body,
            ip: 0,
            env,
            function_env: env,
            caller_env,
            args,
            stack_base: base,
            copy_locals: false,
        });
        Ok(())
    }

    /// Runs `callee` to completion from native code.
    pub(crate) fn call_inner(
        &mut self,
        callee: Value,
        receiver: Option<Value>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if self.state.native_depth >= MAX_NATIVE_DEPTH {
            return Err(RuntimeError::range("stack overflow in nested builtin calls"));
        }
        self.state.native_depth += 1;
        let result = self.call_nested(callee, receiver, args);
        self.state.native_depth -= 1;
        result
    }

    fn call_nested(
        &mut self,
        callee: Value,
        receiver: Option<Value>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let floor = self.state.frames.len();
        let base = self.state.stack.len();
        self.push(callee);
        if let Some(receiver) = receiver {
            self.push(receiver);
        }
        self.state.stack.extend_from_slice(args);
        match self.invoke_with(callee, receiver, base, args.len()) {
            Ok(Invoked::Frame) => self.run(floor),
            Ok(Invoked::Value) => {
                let value = self.state.stack.pop().unwrap_or(Value::NIL);
                self.state.stack.truncate(base);
                Ok(value)
            }
            Err(err) => {
                self.state.stack.truncate(base);
                Err(err)
            }
        }
    }

    // ── unwinding ──────────────────────────────────────────────────

    /// Hands `err` to the innermost matching catcher at or above `floor`.
    ///
    /// On a match the catcher's frame resumes at its resume point with the
    /// handler's result on the stack. Otherwise every frame from `floor` up
    /// is discarded and the exception is returned.
    fn unwind(&mut self, err: RuntimeError, floor: usize) -> Result<(), RuntimeError> {
        let exception = self.error_value(err);
        let exception_ty = self.type_of(exception);

        while let Some(&catcher) = self.state.catchers.last() {
            if catcher.frame < floor {
                break;
            }
            self.state.catchers.pop();
            let matches = catcher.filter.is_nil()
                || lookup::is_subtype(&self.heap, exception_ty, catcher.filter);
            if !matches {
                continue;
            }

            debug!(
                "caught {} in frame {}",
                self.type_name(exception),
                catcher.frame
            );
            self.state.frames.truncate(catcher.frame + 1);
            self.state.stack.truncate(catcher.stack_height);
            let frame = self.frame_mut()?;
            frame.env = catcher.env;
            frame.ip = catcher.resume;

            let base = self.state.stack.len();
            self.push(catcher.handler);
            self.push(exception);
            return match self.invoke_with(catcher.handler, None, base, 1) {
                Ok(_) => Ok(()),
                Err(err) => self.unwind(err, floor),
            };
        }

        if let Some(base) = self.state.frames.get(floor).map(|f| f.stack_base) {
            self.state.stack.truncate(base);
        }
        self.state.frames.truncate(floor);
        Err(RuntimeError::Thrown(exception))
    }

    // ── variables ──────────────────────────────────────────────────

    fn find_binding(&self, name: Symbol) -> Result<Option<Value>, RuntimeError> {
        let mut env = Some(self.frame()?.env);
        while let Some(current) = env {
            let scope = self.heap.get::<Environment>(current);
            if scope.bindings.contains_key(&name) {
                return Ok(Some(current));
            }
            env = scope.parent;
        }
        Ok(None)
    }

    fn read_variable(&self, name: Symbol) -> Result<Value, RuntimeError> {
        match self.find_binding(name)? {
            Some(env) => Ok(self.heap.get::<Environment>(env).bindings[&name]),
            None => Err(RuntimeError::UnboundVariable(name)),
        }
    }

    fn write_variable(&mut self, name: Symbol, value: Value) -> Result<(), RuntimeError> {
        let env = self
            .find_binding(name)?
            .ok_or(RuntimeError::UnboundVariable(name))?;
        self.heap
            .get_mut::<Environment>(env)
            .bindings
            .insert(name, value);
        Ok(())
    }

    /// The nearest `self` binding on the scope chain.
    fn current_self(&self) -> Result<Option<Value>, RuntimeError> {
        let mut env = Some(self.frame()?.env);
        while let Some(current) = env {
            let scope = self.heap.get::<Environment>(current);
            if scope.self_value.is_some() {
                return Ok(scope.self_value);
            }
            env = scope.parent;
        }
        Ok(None)
    }

    // ── members ────────────────────────────────────────────────────

    /// Field value, or the method `name` bound to `object`.
    pub fn read_member(&mut self, object: Value, name: Symbol) -> Result<Value, RuntimeError> {
        let field = self
            .heap
            .try_get::<Instance>(object)
            .and_then(|instance| instance.fields.get(&name).copied());
        if let Some(field) = field {
            return Ok(field);
        }

        let ty = self.type_of(object);
        if let Some(method) = lookup::find_method(&self.heap, ty, name) {
            return Ok(self.bind_method(object, method));
        }
        // a type also exposes its own methods, unbound
        if object.kind() == ObjectKind::Type {
            if let Some(method) = lookup::find_method(&self.heap, object, name) {
                return Ok(method);
            }
        }

        Err(RuntimeError::NoSuchMember {
            receiver: self.type_name(object),
            member: name,
        })
    }

    pub fn bind_method(&mut self, receiver: Value, method: Value) -> Value {
        let ty = self.state.special.partial_function;
        self.alloc(
            ty,
            PartialFunction {
                callee: method,
                receiver: Some(receiver),
                bound: Vec::new(),
            },
        )
    }

    pub fn write_member(
        &mut self,
        object: Value,
        name: Symbol,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if let Some(instance) = self.heap.try_get_mut::<Instance>(object) {
            instance.fields.insert(name, value);
            return Ok(());
        }
        if let Some(ty) = self.heap.try_get_mut::<TypeObject>(object) {
            ty.methods.insert(name, value);
            return Ok(());
        }
        Err(RuntimeError::type_error(format!(
            "cannot set member {name} on {}",
            self.type_name(object)
        )))
    }

    // ── helpers for individual commands ────────────────────────────

    pub(crate) fn compile_regex(&mut self, source: &str) -> Result<Value, RuntimeError> {
        let ty = self.state.special.regex;
        self.compile_regex_as(ty, source)
    }

    pub(crate) fn compile_regex_as(&mut self, ty: Value, source: &str) -> Result<Value, RuntimeError> {
        let regex = regex::Regex::new(source)
            .map_err(|e| RuntimeError::type_error(format!("invalid regex /{source}/: {e}")))?;
        Ok(self.alloc(
            ty,
            Regex {
                source: source.to_string(),
                regex,
            },
        ))
    }

    /// Integer and float operands are computed in place; anything else is
    /// dispatched to the left operand's `add` / `sub` / `mul` / `div`.
    fn fast_arithmetic(&mut self, op: Op) -> Result<(), RuntimeError> {
        self.require(2)?;
        let len = self.state.stack.len();
        let (lhs, rhs) = (self.state.stack[len - 2], self.state.stack[len - 1]);
        let method = match op {
            Op::AddFast => "add",
            Op::SubFast => "sub",
            Op::MulFast => "mul",
            _ => "div",
        };

        if let (Some(a), Some(b)) = (self.number(lhs), self.number(rhs)) {
            let result = number::arithmetic(method, a, b)?;
            let value = match result {
                Number::Int(n) => self.alloc_integer(n),
                Number::Float(f) => self.alloc_float(f),
            };
            self.state.stack.truncate(len - 2);
            self.push(value);
            return Ok(());
        }

        let name = Symbol::intern(method);
        let ty = self.type_of(lhs);
        let callee = lookup::find_method(&self.heap, ty, name).ok_or_else(|| {
            RuntimeError::NoSuchMember {
                receiver: self.type_name(lhs),
                member: name,
            }
        })?;
        self.invoke_with(callee, Some(lhs), len - 2, 1)?;
        Ok(())
    }

    pub(crate) fn new_exception(&mut self, ty: Value, message: &str) -> Value {
        let message = self.alloc_string(message.to_string());
        self.alloc(
            ty,
            Exception {
                message,
                payload: Value::NIL,
            },
        )
    }

    pub(crate) fn new_array_of(&mut self, elements: Vec<Value>) -> Value {
        let ty = self.state.special.array;
        self.alloc(ty, Array { elements })
    }
}
