//! Heap payloads.
//!
//! Every heap cell holds one [`Object`]: a closed sum type with one variant
//! per heap kind. Variable-length data (array elements, dictionary entries,
//! bindings) lives in an owned buffer reached from the fixed-size payload.
use std::{any::Any, fmt, rc::Rc};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::{
    FunctionBody, ObjectKind, Symbol, Value,
    primitives::{ConstructorFn, Primitive},
};

pub struct Integer {
    pub value: i64,
}

pub struct Float {
    pub value: f64,
}

pub struct VMString {
    pub value: String,
}

#[derive(Default)]
pub struct Array {
    pub elements: Vec<Value>,
}

/// Hashable identity of a dictionary key.
///
/// Numbers, strings, symbols, booleans and nil compare by value, everything
/// else by reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Box<str>),
    Symbol(Symbol),
    Identity(u64),
}

#[derive(Default)]
pub struct Dictionary {
    /// key → (key as inserted, value)
    pub entries: IndexMap<DictKey, (Value, Value), FxBuildHasher>,
}

/// Half-open integer range `start..end`.
pub struct Range {
    pub start: Value,
    pub end: Value,
}

pub struct Regex {
    pub source: String,
    pub regex: regex::Regex,
}

/// A successful match; group spans index into `subject`.
pub struct RegexMatch {
    pub subject: Value,
    pub groups: Vec<Option<(usize, usize)>>,
}

/// A closure: compiled body plus the environment it was created in.
pub struct Function {
    pub body: Rc<FunctionBody>,
    pub env: Value,
}

pub struct BuiltinFunction {
    pub name: Symbol,
    pub primitive: Primitive,
}

/// A callee with leading arguments and optionally `self` already bound.
/// Bound methods are partials with a receiver.
pub struct PartialFunction {
    pub callee: Value,
    pub receiver: Option<Value>,
    pub bound: Vec<Value>,
}

#[derive(Clone, Copy)]
pub enum Constructor {
    /// Use the nearest ancestor's constructor.
    Inherit,
    /// Allocate a field-holding instance, then run `init`.
    Instance,
    /// Native construction; the function receives the concrete type.
    Native(ConstructorFn),
    /// Values of this type only come from literals or builtins.
    Abstract,
}

pub struct TypeObject {
    pub name: Symbol,
    /// The root type is its own parent.
    pub parent: Value,
    pub methods: FxHashMap<Symbol, Value>,
    pub constructor: Constructor,
}

#[derive(Default)]
pub struct Environment {
    pub parent: Option<Value>,
    pub self_value: Option<Value>,
    pub bindings: FxHashMap<Symbol, Value>,
}

pub struct Exception {
    pub message: Value,
    pub payload: Value,
}

type Finalizer = Box<dyn FnOnce(&mut dyn Any)>;

/// Opaque foreign data with an optional finalizer that runs when the
/// collector reclaims the cell.
pub struct Blob {
    pub name: String,
    data: Box<dyn Any>,
    finalizer: Option<Finalizer>,
}

#[derive(Default)]
pub struct Instance {
    pub fields: IndexMap<Symbol, Value, FxBuildHasher>,
}

/// Position inside an iterable owner.
pub struct IteratorObject {
    pub owner: Value,
    pub position: i64,
}

pub enum Object {
    Free,
    Integer(Integer),
    Float(Float),
    String(VMString),
    Array(Array),
    Dictionary(Dictionary),
    Range(Range),
    Regex(Regex),
    RegexResult(RegexMatch),
    Function(Function),
    BuiltinFunction(BuiltinFunction),
    PartialFunction(PartialFunction),
    Type(TypeObject),
    Environment(Environment),
    Exception(Exception),
    Blob(Blob),
    Instance(Instance),
    Iterator(IteratorObject),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Free => ObjectKind::Nil,
            Self::Integer(_) => ObjectKind::Integer,
            Self::Float(_) => ObjectKind::Float,
            Self::String(_) => ObjectKind::String,
            Self::Array(_) => ObjectKind::Array,
            Self::Dictionary(_) => ObjectKind::Dictionary,
            Self::Range(_) => ObjectKind::Range,
            Self::Regex(_) => ObjectKind::Regex,
            Self::RegexResult(_) => ObjectKind::RegexResult,
            Self::Function(_) => ObjectKind::Function,
            Self::BuiltinFunction(_) => ObjectKind::BuiltinFunction,
            Self::PartialFunction(_) => ObjectKind::PartialFunction,
            Self::Type(_) => ObjectKind::Type,
            Self::Environment(_) => ObjectKind::Environment,
            Self::Exception(_) => ObjectKind::Exception,
            Self::Blob(_) => ObjectKind::Blob,
            Self::Instance(_) => ObjectKind::Instance,
            Self::Iterator(_) => ObjectKind::Iterator,
        }
    }

    /// Calls `visitor` for every value this object structurally contains.
    pub fn trace(&self, visitor: &mut dyn FnMut(Value)) {
        match self {
            Self::Free
            | Self::Integer(_)
            | Self::Float(_)
            | Self::String(_)
            | Self::Regex(_)
            | Self::BuiltinFunction(_)
            | Self::Blob(_) => {}
            Self::Array(array) => array.elements.iter().for_each(|&v| visitor(v)),
            Self::Dictionary(dict) => {
                for (key, value) in dict.entries.values() {
                    visitor(*key);
                    visitor(*value);
                }
            }
            Self::Range(range) => {
                visitor(range.start);
                visitor(range.end);
            }
            Self::RegexResult(result) => visitor(result.subject),
            Self::Function(function) => visitor(function.env),
            Self::PartialFunction(partial) => {
                visitor(partial.callee);
                if let Some(receiver) = partial.receiver {
                    visitor(receiver);
                }
                partial.bound.iter().for_each(|&v| visitor(v));
            }
            Self::Type(ty) => {
                visitor(ty.parent);
                ty.methods.values().for_each(|&v| visitor(v));
            }
            Self::Environment(env) => {
                if let Some(parent) = env.parent {
                    visitor(parent);
                }
                if let Some(self_value) = env.self_value {
                    visitor(self_value);
                }
                env.bindings.values().for_each(|&v| visitor(v));
            }
            Self::Exception(exception) => {
                visitor(exception.message);
                visitor(exception.payload);
            }
            Self::Instance(instance) => instance.fields.values().for_each(|&v| visitor(v)),
            Self::Iterator(iterator) => visitor(iterator.owner),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object::{}", self.kind().name())
    }
}

/// Typed access to a cell payload.
///
/// `from_object` returns `None` when the stored variant is not `Self`.
pub trait HeapObject: Sized {
    const KIND: ObjectKind;
    fn from_object(object: &Object) -> Option<&Self>;
    fn from_object_mut(object: &mut Object) -> Option<&mut Self>;
    fn into_object(self) -> Object;
}

macro_rules! heap_object {
    ($ty:ty, $variant:ident) => {
        impl HeapObject for $ty {
            const KIND: ObjectKind = ObjectKind::$variant;

            #[inline]
            fn from_object(object: &Object) -> Option<&Self> {
                match object {
                    Object::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            #[inline]
            fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
                match object {
                    Object::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            #[inline]
            fn into_object(self) -> Object {
                Object::$variant(self)
            }
        }
    };
}

heap_object!(Integer, Integer);
heap_object!(Float, Float);
heap_object!(VMString, String);
heap_object!(Array, Array);
heap_object!(Dictionary, Dictionary);
heap_object!(Range, Range);
heap_object!(Regex, Regex);
heap_object!(RegexMatch, RegexResult);
heap_object!(Function, Function);
heap_object!(BuiltinFunction, BuiltinFunction);
heap_object!(PartialFunction, PartialFunction);
heap_object!(TypeObject, Type);
heap_object!(Environment, Environment);
heap_object!(Exception, Exception);
heap_object!(Blob, Blob);
heap_object!(Instance, Instance);
heap_object!(IteratorObject, Iterator);

impl Environment {
    pub fn with_parent(parent: Value) -> Self {
        Self {
            parent: Some(parent),
            ..Default::default()
        }
    }
}

impl TypeObject {
    pub fn new(name: Symbol, parent: Value, constructor: Constructor) -> Self {
        Self {
            name,
            parent,
            methods: FxHashMap::default(),
            constructor,
        }
    }
}

impl Blob {
    pub fn new(name: impl Into<String>, data: Box<dyn Any>) -> Self {
        Self {
            name: name.into(),
            data,
            finalizer: None,
        }
    }

    pub fn with_finalizer(mut self, finalizer: impl FnOnce(&mut dyn Any) + 'static) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref()
    }

    pub fn data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(self.data.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn typed_access_matches_only_the_stored_variant() {
        let mut object = Array {
            elements: vec![Value::TRUE],
        }
        .into_object();
        assert_eq!(object.kind(), ObjectKind::Array);
        assert!(Array::from_object(&object).is_some());
        assert!(VMString::from_object(&object).is_none());
        Array::from_object_mut(&mut object)
            .expect("array")
            .elements
            .push(Value::FALSE);
        assert_eq!(Array::from_object(&object).expect("array").elements.len(), 2);
    }

    #[test]
    fn trace_reports_every_edge() {
        let a = Value::heap(ObjectKind::String, 0, 1);
        let b = Value::heap(ObjectKind::Array, 0, 2);
        let mut dict = Dictionary::default();
        dict.entries.insert(DictKey::Identity(a.raw()), (a, b));
        let object = dict.into_object();

        let mut seen = Vec::new();
        object.trace(&mut |v| seen.push(v));
        assert_eq!(seen, vec![a, b]);
    }

    #[test]
    fn partial_traces_callee_receiver_and_bound_arguments() {
        let callee = Value::heap(ObjectKind::Function, 1, 0);
        let receiver = Value::heap(ObjectKind::Instance, 1, 1);
        let partial = PartialFunction {
            callee,
            receiver: Some(receiver),
            bound: vec![Value::TRUE],
        }
        .into_object();
        let mut seen = Vec::new();
        partial.trace(&mut |v| seen.push(v));
        assert_eq!(seen, vec![callee, receiver, Value::TRUE]);
    }

    #[test]
    fn blob_finalizer_runs_on_drop() {
        thread_local! {
            static FINALIZED: Cell<u32> = const { Cell::new(0) };
        }
        let blob = Blob::new("counter", Box::new(41u32)).with_finalizer(|data| {
            let value = data.downcast_mut::<u32>().map(|v| *v).unwrap_or_default();
            FINALIZED.with(|f| f.set(value + 1));
        });
        assert_eq!(blob.data::<u32>(), Some(&41));
        drop(blob);
        assert_eq!(FINALIZED.with(Cell::get), 42);
    }
}
