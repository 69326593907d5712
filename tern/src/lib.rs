//! Runtime core of the tern scripting language: tagged values, a chunked
//! mark-sweep heap, the type hierarchy and a bytecode interpreter.
mod builder;
mod bytecode;
mod error;
mod format;
mod header;
mod heap;
mod interning;
mod interpreter;
mod objects;
mod special;
mod value;
mod vm;

pub mod demos;
pub mod lookup;
pub mod native;
pub mod primitives;

pub use builder::{BytecodeBuilder, Label, LoopTarget};
pub use bytecode::{Command, FunctionBody, Op, Operand, TypeDescriptor};
pub use error::RuntimeError;
pub use header::{Header, HeaderFlags};
pub use heap::{GcStats, Heap, HeapCell, HeapSettings, NoRoots, RootProvider};
pub use interning::{Symbol, SymbolTable};
pub use interpreter::InterpreterState;
pub use native::{NativeApi, NativeFn, NativeHandle};
pub use objects::{
    Array, Blob, BuiltinFunction, Constructor, DictKey, Dictionary, Environment, Exception,
    Float, Function, HeapObject, Instance, Integer, IteratorObject, Object, PartialFunction,
    Range, Regex, RegexMatch, TypeObject, VMString,
};
pub use special::SpecialObjects;
pub use value::{MAX_CHUNK_SLOTS, ObjectKind, SMALL_INT_MAX, SMALL_INT_MIN, Value};
pub use vm::{ExceptionHandler, Outcome, VM, VMCreateInfo};
