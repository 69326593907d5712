use std::rc::Rc;

use crate::{Command, FunctionBody, Op, Operand, Symbol, TypeDescriptor};

/// A forward jump whose offset has not yet been resolved.
///
/// Created by [`BytecodeBuilder::jump`], [`BytecodeBuilder::jump_if_true`],
/// [`BytecodeBuilder::jump_if_false`] and [`BytecodeBuilder::push_catcher`].
/// Resolve it with [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use = "an unbound label leaves a zero offset behind"]
pub struct Label {
    /// Index of the jump command in the stream.
    index: usize,
}

/// A position earlier in the stream that a backward jump can target.
#[derive(Debug, Clone, Copy)]
pub struct LoopTarget(usize);

/// Builds a command stream.
///
/// Offsets are stored relative to the command after the jump, so the
/// builder only needs the jump's own index to patch it.
#[derive(Default)]
pub struct BytecodeBuilder {
    code: Vec<Command>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Index the next emitted command will get.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.code
    }

    pub fn into_program(self) -> FunctionBody {
        FunctionBody::program(self.code)
    }

    pub fn into_function(self, name: &str, arity: usize, vararg: bool) -> FunctionBody {
        FunctionBody::new(Some(name), self.code, arity, vararg)
    }

    pub fn emit(&mut self, command: Command) -> &mut Self {
        self.code.push(command);
        self
    }

    fn emit_op(&mut self, op: Op) -> &mut Self {
        self.emit(Command::simple(op))
    }

    fn emit_symbol(&mut self, op: Op, name: &str) -> &mut Self {
        self.emit(Command::symbol(op, name))
    }

    // ── literals ───────────────────────────────────────────────────

    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.emit(Command::int(Op::PushInt, value))
    }

    pub fn push_float(&mut self, value: f64) -> &mut Self {
        self.emit(Command::new(Op::PushFloat, Operand::Float(value)))
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(Command::new(Op::PushBool, Operand::Bool(value)))
    }

    pub fn push_nil(&mut self) -> &mut Self {
        self.emit_op(Op::PushNil)
    }

    pub fn push_string(&mut self, value: &str) -> &mut Self {
        self.emit(Command::new(Op::PushString, Operand::Str(Rc::from(value))))
    }

    pub fn push_symbol(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::PushSymbol, name)
    }

    /// `PushRegex <source>`: compiled when executed.
    pub fn push_regex(&mut self, source: &str) -> &mut Self {
        self.emit(Command::new(Op::PushRegex, Operand::Str(Rc::from(source))))
    }

    /// `PushFunction <body>`: closes over the environment current at run time.
    pub fn push_function(&mut self, body: FunctionBody) -> &mut Self {
        self.emit(Command::new(Op::PushFunction, Operand::Function(Rc::new(body))))
    }

    pub fn push_type(
        &mut self,
        name: &str,
        parent: Option<&str>,
        methods: Vec<FunctionBody>,
    ) -> &mut Self {
        let methods = methods
            .into_iter()
            .map(|body| {
                let name = body.name.unwrap_or_else(|| Symbol::intern("<anonymous>"));
                (name, Rc::new(body))
            })
            .collect();
        let descriptor = TypeDescriptor {
            name: Symbol::intern(name),
            parent: parent.map(Symbol::intern),
            methods,
        };
        self.emit(Command::new(Op::PushType, Operand::Type(Rc::new(descriptor))))
    }

    pub fn make_array(&mut self, count: usize) -> &mut Self {
        self.emit(Command::int(Op::MakeArray, count as i64))
    }

    /// `MakeDict <pairs>`: expects key, value, key, value, ... on the stack.
    pub fn make_dict(&mut self, pairs: usize) -> &mut Self {
        self.emit(Command::int(Op::MakeDict, pairs as i64))
    }

    // ── variables and members ──────────────────────────────────────

    pub fn let_(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::Let, name)
    }

    pub fn read(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::Read, name)
    }

    pub fn write(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::Write, name)
    }

    pub fn read_self(&mut self) -> &mut Self {
        self.emit_op(Op::ReadSelf)
    }

    pub fn read_arg(&mut self, index: usize) -> &mut Self {
        self.emit(Command::int(Op::ReadArg, index as i64))
    }

    pub fn read_member(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::ReadMember, name)
    }

    /// `WriteMember <name>`: expects the object below the value.
    pub fn write_member(&mut self, name: &str) -> &mut Self {
        self.emit_symbol(Op::WriteMember, name)
    }

    // ── calls and scopes ───────────────────────────────────────────

    pub fn call(&mut self, argc: usize) -> &mut Self {
        self.emit(Command::int(Op::Call, argc as i64))
    }

    /// `New <argc>`: construct an instance of the type pushed before the arguments.
    pub fn construct(&mut self, argc: usize) -> &mut Self {
        self.emit(Command::int(Op::New, argc as i64))
    }

    /// Reads `method` off the value on top of the stack, then calls the
    /// bound method with the `argc` values emitted by `args`.
    pub fn send(
        &mut self,
        method: &str,
        argc: usize,
        args: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.read_member(method);
        args(self);
        self.call(argc)
    }

    pub fn enter_block(&mut self) -> &mut Self {
        self.emit_op(Op::EnterBlock)
    }

    pub fn leave_block(&mut self) -> &mut Self {
        self.emit_op(Op::LeaveBlock)
    }

    pub fn return_(&mut self) -> &mut Self {
        self.emit(Command::new(Op::Return, Operand::Bool(false)))
    }

    /// `Return true`: merge the frame's locals into the caller's scope.
    pub fn return_copy_locals(&mut self) -> &mut Self {
        self.emit(Command::new(Op::Return, Operand::Bool(true)))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit_op(Op::Pop)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.emit_op(Op::Dup)
    }

    // ── control flow ───────────────────────────────────────────────

    fn emit_label(&mut self, op: Op) -> Label {
        let index = self.code.len();
        self.emit(Command::int(op, 0));
        Label { index }
    }

    pub fn jump(&mut self) -> Label {
        self.emit_label(Op::Jump)
    }

    pub fn jump_if_false(&mut self) -> Label {
        self.emit_label(Op::JumpIfFalse)
    }

    pub fn jump_if_true(&mut self) -> Label {
        self.emit_label(Op::JumpIfTrue)
    }

    /// Emits a jump-family command with an explicit relative offset.
    pub fn jump_raw(&mut self, op: Op, offset: i64) -> &mut Self {
        debug_assert!(op.is_jump(), "{} does not take an offset", op.name());
        self.emit(Command::int(op, offset))
    }

    /// Resolves `label` so that it targets the next emitted command.
    pub fn bind(&mut self, label: Label) {
        let offset = self.code.len() as i64 - (label.index as i64 + 1);
        self.code[label.index].operand = Operand::Int(offset);
    }

    pub fn loop_target(&self) -> LoopTarget {
        LoopTarget(self.code.len())
    }

    /// Emits `op` jumping backward to `target`.
    pub fn jump_back(&mut self, op: Op, target: LoopTarget) -> &mut Self {
        let offset = target.0 as i64 - (self.code.len() as i64 + 1);
        self.jump_raw(op, offset)
    }

    // ── exceptions ─────────────────────────────────────────────────

    /// `PushCatcher <resume>`: expects the type filter and then the
    /// handler on the stack. Bind the label at the resume point.
    pub fn push_catcher(&mut self) -> Label {
        self.emit_label(Op::PushCatcher)
    }

    pub fn pop_catcher(&mut self) -> &mut Self {
        self.emit_op(Op::PopCatcher)
    }

    pub fn raise(&mut self) -> &mut Self {
        self.emit_op(Op::Raise)
    }

    // ── fast arithmetic ────────────────────────────────────────────

    pub fn add_fast(&mut self) -> &mut Self {
        self.emit_op(Op::AddFast)
    }

    pub fn sub_fast(&mut self) -> &mut Self {
        self.emit_op(Op::SubFast)
    }

    pub fn mul_fast(&mut self) -> &mut Self {
        self.emit_op(Op::MulFast)
    }

    pub fn div_fast(&mut self) -> &mut Self {
        self.emit_op(Op::DivFast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_at(code: &[Command], index: usize) -> i64 {
        match code[index].operand {
            Operand::Int(offset) => offset,
            ref other => panic!("expected offset, got {other:?}"),
        }
    }

    #[test]
    fn forward_label_skips_emitted_commands() {
        let mut b = BytecodeBuilder::new();
        b.push_bool(false);
        let skip = b.jump_if_false();
        b.push_int(1).pop();
        b.bind(skip);
        b.push_int(2);
        let code = b.into_commands();
        assert_eq!(offset_at(&code, 1), 2);
    }

    #[test]
    fn binding_immediately_gives_zero_offset() {
        let mut b = BytecodeBuilder::new();
        let label = b.jump();
        b.bind(label);
        assert_eq!(offset_at(&b.into_commands(), 0), 0);
    }

    #[test]
    fn backward_jump_targets_loop_head() {
        let mut b = BytecodeBuilder::new();
        b.push_nil();
        let head = b.loop_target();
        b.pop().push_nil();
        b.jump_back(Op::Jump, head);
        let code = b.into_commands();
        // after the jump ip = 4, head = 1
        assert_eq!(offset_at(&code, 3), -3);
        assert_eq!(code[3].to_string(), "Jump -3");
    }

    #[test]
    fn type_methods_are_keyed_by_function_name() {
        let mut method = BytecodeBuilder::new();
        method.read_self().return_();
        let mut b = BytecodeBuilder::new();
        b.push_type("Point", None, vec![method.into_function("me", 0, false)]);
        let code = b.into_commands();
        let Operand::Type(desc) = &code[0].operand else {
            panic!("expected type operand");
        };
        assert_eq!(&*desc.name.name(), "Point");
        assert_eq!(&*desc.methods[0].0.name(), "me");
        assert!(desc.parent.is_none());
    }
}
