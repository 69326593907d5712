//! Interface for native extensions.
//!
//! Extensions see values only as opaque [`NativeHandle`]s and go through
//! [`NativeApi`] for everything else. Accessors never fail loudly: a type
//! mismatch gives `None` or [`NativeHandle::NULL`], and a native function
//! that returns `NULL` raises a `TypeError` in the calling program.
use std::any::Any;

use log::{debug, warn};

use crate::{
    Array, Blob, Constructor, Instance, ObjectKind, RuntimeError, Symbol, TypeObject, VM, Value,
    primitives::Primitive,
};

/// `receiver` is `nil` for free functions.
pub type NativeFn = fn(&mut NativeApi<'_>, NativeHandle, &[NativeHandle]) -> NativeHandle;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(Value);

impl NativeHandle {
    /// Never a valid value: the immediate bit is set on a kind that has no
    /// immediates.
    pub const NULL: NativeHandle = NativeHandle(Value::from_raw(u64::MAX));

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    pub fn value(self) -> Option<Value> {
        (!self.is_null()).then_some(self.0)
    }
}

impl From<Value> for NativeHandle {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Access to a running VM for native code.
///
/// Handles created through the API stay alive until the API value is
/// dropped; for a native function that is when the call returns.
pub struct NativeApi<'vm> {
    vm: &'vm mut VM,
    mark: usize,
}

impl<'vm> NativeApi<'vm> {
    pub fn new(vm: &'vm mut VM) -> Self {
        let mark = vm.scratch_mark();
        Self { vm, mark }
    }

    fn keep(&mut self, value: Value) -> NativeHandle {
        self.vm.root(value);
        NativeHandle(value)
    }

    fn live(&self, handle: NativeHandle) -> Option<Value> {
        let value = handle.value()?;
        (value.is_immediate() || self.vm.heap.is_live(value)).then_some(value)
    }

    // ── constructors ───────────────────────────────────────────────

    pub fn nil(&self) -> NativeHandle {
        NativeHandle(Value::NIL)
    }

    pub fn boolean(&self, value: bool) -> NativeHandle {
        NativeHandle(Value::from_bool(value))
    }

    pub fn integer(&mut self, value: i64) -> NativeHandle {
        let v = self.vm.alloc_integer(value);
        self.keep(v)
    }

    pub fn float(&mut self, value: f64) -> NativeHandle {
        let v = self.vm.alloc_float(value);
        self.keep(v)
    }

    pub fn string(&mut self, value: &str) -> NativeHandle {
        let v = self.vm.alloc_string(value);
        self.keep(v)
    }

    pub fn symbol(&self, name: &str) -> NativeHandle {
        NativeHandle(Value::from_symbol(Symbol::intern(name)))
    }

    /// `NULL` if any element is `NULL`.
    pub fn array(&mut self, elements: &[NativeHandle]) -> NativeHandle {
        let Some(elements) = elements.iter().map(|&h| self.live(h)).collect::<Option<Vec<_>>>() else {
            return NativeHandle::NULL;
        };
        let v = self.vm.alloc_array(elements);
        self.keep(v)
    }

    pub fn dictionary(&mut self) -> NativeHandle {
        let v = self.vm.alloc_dictionary();
        self.keep(v)
    }

    // ── accessors ──────────────────────────────────────────────────

    pub fn kind(&self, handle: NativeHandle) -> Option<ObjectKind> {
        self.live(handle).map(Value::kind)
    }

    pub fn type_of(&self, handle: NativeHandle) -> NativeHandle {
        self.live(handle)
            .map_or(NativeHandle::NULL, |v| NativeHandle(self.vm.type_of(v)))
    }

    pub fn as_bool(&self, handle: NativeHandle) -> Option<bool> {
        self.live(handle)?.as_bool()
    }

    pub fn as_int(&self, handle: NativeHandle) -> Option<i64> {
        self.vm.int_value(self.live(handle)?)
    }

    /// Integers convert.
    pub fn as_float(&self, handle: NativeHandle) -> Option<f64> {
        self.vm.number(self.live(handle)?).map(|n| n.as_f64())
    }

    pub fn as_str(&self, handle: NativeHandle) -> Option<&str> {
        self.vm.string_value(self.live(handle)?)
    }

    pub fn as_symbol(&self, handle: NativeHandle) -> Option<String> {
        self.live(handle)?.as_symbol().map(|s| s.name().to_string())
    }

    pub fn array_len(&self, handle: NativeHandle) -> Option<usize> {
        self.vm.array_elements(self.live(handle)?).map(<[Value]>::len)
    }

    pub fn array_get(&self, handle: NativeHandle, index: usize) -> NativeHandle {
        self.live(handle)
            .and_then(|v| self.vm.array_elements(v))
            .and_then(|elements| elements.get(index))
            .map_or(NativeHandle::NULL, |&v| NativeHandle(v))
    }

    pub fn array_push(&mut self, handle: NativeHandle, item: NativeHandle) -> bool {
        let (Some(array), Some(item)) = (self.live(handle), self.live(item)) else {
            return false;
        };
        match self.vm.heap.try_get_mut::<Array>(array) {
            Some(array) => {
                array.elements.push(item);
                true
            }
            None => false,
        }
    }

    pub fn dict_get(&self, handle: NativeHandle, key: NativeHandle) -> NativeHandle {
        let (Some(dict), Some(key)) = (self.live(handle), self.live(key)) else {
            return NativeHandle::NULL;
        };
        self.vm
            .dict_get(dict, key)
            .map_or(NativeHandle::NULL, NativeHandle)
    }

    pub fn dict_set(&mut self, handle: NativeHandle, key: NativeHandle, value: NativeHandle) -> bool {
        match (self.live(handle), self.live(key), self.live(value)) {
            (Some(dict), Some(key), Some(value)) if dict.kind() == ObjectKind::Dictionary => {
                self.vm.dict_insert(dict, key, value);
                true
            }
            _ => false,
        }
    }

    /// Field or bound method, as member access in bytecode sees it.
    pub fn member(&mut self, handle: NativeHandle, name: &str) -> NativeHandle {
        let Some(object) = self.live(handle) else {
            return NativeHandle::NULL;
        };
        match self.vm.read_member(object, Symbol::intern(name)) {
            Ok(v) => self.keep(v),
            Err(_) => NativeHandle::NULL,
        }
    }

    pub fn set_member(&mut self, handle: NativeHandle, name: &str, value: NativeHandle) -> bool {
        let (Some(object), Some(value)) = (self.live(handle), self.live(value)) else {
            return false;
        };
        self.vm
            .write_member(object, Symbol::intern(name), value)
            .is_ok()
    }

    /// Calls any callable; `NULL` if it raised.
    pub fn call(&mut self, callee: NativeHandle, args: &[NativeHandle]) -> NativeHandle {
        let Some(callee) = self.live(callee) else {
            return NativeHandle::NULL;
        };
        let Some(args) = args.iter().map(|&h| self.live(h)).collect::<Option<Vec<_>>>() else {
            return NativeHandle::NULL;
        };
        match self.vm.call_value(callee, &args) {
            Ok(v) => self.keep(v),
            Err(err) => {
                debug!("native call raised: {err}");
                NativeHandle::NULL
            }
        }
    }

    // ── registration ───────────────────────────────────────────────

    /// Creates a type whose instances hold fields, binds it as a global and
    /// returns it. A `NULL` parent means `Object`.
    pub fn register_type(&mut self, name: &str, parent: NativeHandle) -> NativeHandle {
        let parent = if parent.is_null() {
            self.vm.special().object
        } else {
            match self.live(parent) {
                Some(p) if self.vm.heap.try_get::<TypeObject>(p).is_some() => p,
                _ => return NativeHandle::NULL,
            }
        };
        let meta = self.vm.special().type_;
        let ty = self.vm.alloc(
            meta,
            TypeObject::new(Symbol::intern(name), parent, Constructor::Inherit),
        );
        self.vm.define_global(name, ty);
        debug!("native type {name} registered");
        NativeHandle(ty)
    }

    pub fn register_method(&mut self, ty: NativeHandle, name: &str, f: NativeFn) -> bool {
        match self.live(ty) {
            Some(ty) if self.vm.heap.try_get::<TypeObject>(ty).is_some() => {
                self.vm.define_method(ty, name, Primitive::Native(f));
                true
            }
            _ => {
                warn!("cannot register {name}: not a type");
                false
            }
        }
    }

    pub fn register_function(&mut self, name: &str, f: NativeFn) {
        let function = self.vm.alloc_builtin(name, Primitive::Native(f));
        self.vm.define_global(name, function);
    }

    // ── blobs ──────────────────────────────────────────────────────

    /// Wraps foreign data. The finalizer runs when the collector reclaims
    /// the blob. A `NULL` type means `Blob`.
    pub fn new_blob<T: Any>(
        &mut self,
        ty: NativeHandle,
        name: &str,
        data: T,
        finalizer: Option<fn(&mut T)>,
    ) -> NativeHandle {
        let ty = if ty.is_null() {
            self.vm.special().blob
        } else {
            match self.live(ty) {
                Some(t) if self.vm.heap.try_get::<TypeObject>(t).is_some() => t,
                _ => return NativeHandle::NULL,
            }
        };
        let mut blob = Blob::new(name, Box::new(data));
        if let Some(finalize) = finalizer {
            blob = blob.with_finalizer(move |data| {
                if let Some(data) = data.downcast_mut::<T>() {
                    finalize(data);
                }
            });
        }
        let v = self.vm.alloc(ty, blob);
        self.keep(v)
    }

    pub fn blob_data<T: Any>(&mut self, handle: NativeHandle) -> Option<&mut T> {
        let value = self.live(handle)?;
        self.vm.heap.try_get_mut::<Blob>(value)?.data_mut::<T>()
    }

    /// Creates an instance of a registered type without running `init`.
    pub fn new_instance(&mut self, ty: NativeHandle) -> NativeHandle {
        match self.live(ty) {
            Some(t) if self.vm.heap.try_get::<TypeObject>(t).is_some() => {
                let v = self.vm.alloc(t, Instance::default());
                self.keep(v)
            }
            _ => NativeHandle::NULL,
        }
    }
}

impl Drop for NativeApi<'_> {
    fn drop(&mut self) {
        self.vm.release(self.mark);
    }
}

pub(crate) fn invoke(
    vm: &mut VM,
    name: Symbol,
    f: NativeFn,
    receiver: Option<Value>,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let receiver = NativeHandle(receiver.unwrap_or(Value::NIL));
    let args: Vec<NativeHandle> = args.iter().copied().map(NativeHandle).collect();
    let result = {
        let mut api = NativeApi::new(vm);
        f(&mut api, receiver, &args)
    };
    match result.value() {
        Some(value) => Ok(value),
        None => Err(RuntimeError::type_error(format!(
            "native function {name} failed"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::BytecodeBuilder;

    fn add_one(api: &mut NativeApi<'_>, _receiver: NativeHandle, args: &[NativeHandle]) -> NativeHandle {
        match args.first().and_then(|&h| api.as_int(h)) {
            Some(n) => api.integer(n + 1),
            None => NativeHandle::NULL,
        }
    }

    fn counter_value(api: &mut NativeApi<'_>, receiver: NativeHandle, _args: &[NativeHandle]) -> NativeHandle {
        match api.blob_data::<i64>(receiver) {
            Some(n) => {
                *n += 1;
                let n = *n;
                api.integer(n)
            }
            None => NativeHandle::NULL,
        }
    }

    #[test]
    fn registered_functions_are_callable_from_bytecode() {
        let mut vm = VM::default();
        NativeApi::new(&mut vm).register_function("add_one", add_one);

        let mut b = BytecodeBuilder::new();
        b.read("add_one").push_int(41).call(1).return_();
        let outcome = vm.execute(b.into_program());
        assert_eq!(outcome, crate::Outcome::Returned(Value::small_int(42).expect("cached")));
    }

    #[test]
    fn null_results_become_type_errors() {
        let mut vm = VM::default();
        NativeApi::new(&mut vm).register_function("add_one", add_one);

        let mut b = BytecodeBuilder::new();
        b.read("add_one").push_string("nope").call(1).return_();
        let outcome = vm.execute(b.into_program());
        assert!(!outcome.is_returned());
        assert_eq!(vm.type_of(outcome.value()), vm.special().type_error);
    }

    #[test]
    fn blob_methods_see_their_data_and_finalizers_run() {
        thread_local! {
            static FINALIZED: Cell<bool> = const { Cell::new(false) };
        }
        fn finalize(_: &mut i64) {
            FINALIZED.with(|f| f.set(true));
        }

        let mut vm = VM::default();
        let blob_type = vm.special().blob;
        let blob = {
            let mut api = NativeApi::new(&mut vm);
            let ty = api.register_type("Counter", blob_type.into());
            assert!(api.register_method(ty, "next", counter_value));
            let blob = api.new_blob(ty, "counter", 10_i64, Some(finalize));
            blob.value().expect("blob")
        };
        let mark = vm.scratch_mark();
        vm.root(blob);
        let next = vm.send(blob, "next", &[]).expect("next");
        assert_eq!(vm.int_value(next), Some(11));

        vm.release(mark);
        vm.collect_garbage();
        assert!(FINALIZED.with(Cell::get));
    }

    #[test]
    fn accessors_return_null_on_mismatch() {
        let mut vm = VM::default();
        let mut api = NativeApi::new(&mut vm);
        let s = api.string("text");
        assert_eq!(api.as_int(s), None);
        assert_eq!(api.as_str(s), Some("text"));
        assert!(api.array_get(s, 0).is_null());
        assert!(api.member(s, "missing").is_null());
        assert!(NativeHandle::NULL.value().is_none());
    }
}
