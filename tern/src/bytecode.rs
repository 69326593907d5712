//! The compiler → VM contract.
//!
//! A runnable unit is a [`FunctionBody`]: a flat `Vec<Command>` plus its
//! declared arity and vararg flag. Jump offsets are relative, counted in
//! instructions from the command right after the jump, so streams can be
//! sliced and concatenated without relocation.
use std::{fmt, rc::Rc};

use crate::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    PushInt,
    PushFloat,
    PushBool,
    PushNil,
    PushString,
    PushSymbol,
    PushRegex,
    PushFunction,
    PushType,
    MakeArray,
    MakeDict,
    Let,
    Read,
    Write,
    ReadSelf,
    ReadArg,
    ReadMember,
    WriteMember,
    Call,
    New,
    EnterBlock,
    LeaveBlock,
    Return,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Pop,
    Dup,
    PushCatcher,
    PopCatcher,
    Raise,
    AddFast,
    SubFast,
    MulFast,
    DivFast,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Self::PushInt => "PushInt",
            Self::PushFloat => "PushFloat",
            Self::PushBool => "PushBool",
            Self::PushNil => "PushNil",
            Self::PushString => "PushString",
            Self::PushSymbol => "PushSymbol",
            Self::PushRegex => "PushRegex",
            Self::PushFunction => "PushFunction",
            Self::PushType => "PushType",
            Self::MakeArray => "MakeArray",
            Self::MakeDict => "MakeDict",
            Self::Let => "Let",
            Self::Read => "Read",
            Self::Write => "Write",
            Self::ReadSelf => "ReadSelf",
            Self::ReadArg => "ReadArg",
            Self::ReadMember => "ReadMember",
            Self::WriteMember => "WriteMember",
            Self::Call => "Call",
            Self::New => "New",
            Self::EnterBlock => "EnterBlock",
            Self::LeaveBlock => "LeaveBlock",
            Self::Return => "Return",
            Self::Jump => "Jump",
            Self::JumpIfFalse => "JumpIfFalse",
            Self::JumpIfTrue => "JumpIfTrue",
            Self::Pop => "Pop",
            Self::Dup => "Dup",
            Self::PushCatcher => "PushCatcher",
            Self::PopCatcher => "PopCatcher",
            Self::Raise => "Raise",
            Self::AddFast => "AddFast",
            Self::SubFast => "SubFast",
            Self::MulFast => "MulFast",
            Self::DivFast => "DivFast",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::JumpIfFalse | Self::JumpIfTrue | Self::PushCatcher
        )
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    None,
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(Rc<str>),
    Symbol(Symbol),
    Function(Rc<FunctionBody>),
    Type(Rc<TypeDescriptor>),
}

#[derive(Debug, Clone)]
pub struct Command {
    pub op: Op,
    pub operand: Operand,
}

/// A compiled function or top-level program.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub name: Option<Symbol>,
    pub code: Vec<Command>,
    pub arity: usize,
    pub vararg: bool,
}

/// A compiled `type` declaration. `parent` is resolved by name in the
/// environment that executes the `PushType`; `None` means `Object`.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: Symbol,
    pub parent: Option<Symbol>,
    pub methods: Vec<(Symbol, Rc<FunctionBody>)>,
}

impl Command {
    pub fn new(op: Op, operand: Operand) -> Self {
        Self { op, operand }
    }

    pub fn simple(op: Op) -> Self {
        Self::new(op, Operand::None)
    }

    pub fn int(op: Op, value: i64) -> Self {
        Self::new(op, Operand::Int(value))
    }

    pub fn symbol(op: Op, name: &str) -> Self {
        Self::new(op, Operand::Symbol(Symbol::intern(name)))
    }
}

impl FunctionBody {
    pub fn new(name: Option<&str>, code: Vec<Command>, arity: usize, vararg: bool) -> Self {
        Self {
            name: name.map(Symbol::intern),
            code,
            arity,
            vararg,
        }
    }

    /// A zero-argument body, the shape of a top-level program.
    pub fn program(code: Vec<Command>) -> Self {
        Self::new(None, code, 0, false)
    }

    pub fn display_name(&self) -> String {
        match self.name {
            Some(name) => name.to_string(),
            None => "<anonymous>".to_string(),
        }
    }

    fn write_listing(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(
            f,
            "{indent}fn {}/{}{}",
            self.display_name(),
            self.arity,
            if self.vararg { "+" } else { "" }
        )?;
        for (idx, command) in self.code.iter().enumerate() {
            writeln!(f, "{indent}  {idx:04} {command}")?;
            match &command.operand {
                Operand::Function(body) => body.write_listing(f, depth + 2)?,
                Operand::Type(desc) => {
                    for (_, body) in &desc.methods {
                        body.write_listing(f, depth + 2)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Symbol(symbol) => write!(f, ":{symbol}"),
            Self::Function(body) => {
                write!(f, "<fn {}/{}>", body.display_name(), body.arity)
            }
            Self::Type(desc) => match desc.parent {
                Some(parent) => write!(f, "<type {} < {}>", desc.name, parent),
                None => write!(f, "<type {}>", desc.name),
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.operand, self.op.is_jump()) {
            (Operand::None, _) => f.write_str(self.op.name()),
            (Operand::Int(offset), true) => write!(f, "{} {offset:+}", self.op.name()),
            (operand, _) => write!(f, "{} {operand}", self.op.name()),
        }
    }
}

impl fmt::Display for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_listing(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jumps_display_signed_offsets() {
        assert_eq!(Command::int(Op::Jump, 3).to_string(), "Jump +3");
        assert_eq!(Command::int(Op::JumpIfFalse, -4).to_string(), "JumpIfFalse -4");
        assert_eq!(Command::int(Op::Call, 2).to_string(), "Call 2");
    }

    #[test]
    fn listing_includes_nested_functions() {
        let inner = FunctionBody::new(
            Some("inner"),
            vec![Command::simple(Op::PushNil), Command::new(Op::Return, Operand::Bool(false))],
            0,
            false,
        );
        let outer = FunctionBody::program(vec![
            Command::new(Op::PushFunction, Operand::Function(Rc::new(inner))),
            Command::new(Op::Return, Operand::Bool(false)),
        ]);
        let listing = outer.to_string();
        assert!(listing.contains("PushFunction <fn inner/0>"));
        assert!(listing.contains("fn inner/0"));
        assert!(listing.contains("Return false"));
    }
}
