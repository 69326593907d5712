//! Chunked cell heap with a stop-the-world mark-sweep collector.
//!
//! Storage is a list of fixed-size chunks of [`HeapCell`]s. Allocation scans
//! for a free cell starting at a rotating cursor; when the scan reaches the
//! end of the last chunk a collection runs, and if that frees nothing the
//! heap grows. Handles are `(chunk, slot)` pairs, so cells never move.
use std::mem;

use log::{debug, trace, warn};

use crate::{Header, HeapObject, MAX_CHUNK_SLOTS, Object, Value};

/// Called by the collector to discover live roots from VM state (operand
/// stack, frames, catchers, globals). The visitor receives `&mut Value` so
/// providers can hand out the handles they store without copying them out.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value));
}

/// A provider with nothing to report.
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(&mut Value)) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSettings {
    /// Cells per chunk.
    pub chunk_size: usize,
    /// Chunks allocated up front.
    pub initial_chunks: usize,
    /// Growth stops here; running out after that is fatal.
    pub max_chunks: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            initial_chunks: 4,
            max_chunks: 4096,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.chunk_size == 0 || self.initial_chunks == 0 {
            return Err("chunk size and initial chunk count must be > 0");
        }
        if self.chunk_size > MAX_CHUNK_SLOTS {
            return Err("chunk size exceeds the addressable slot range");
        }
        if self.max_chunks < self.initial_chunks {
            return Err("max chunks must be >= initial chunks");
        }
        if self.max_chunks > u32::MAX as usize {
            return Err("max chunks exceeds the addressable chunk range");
        }
        Ok(())
    }
}

pub struct HeapCell {
    pub header: Header,
    pub object: Object,
}

impl HeapCell {
    fn free() -> Self {
        Self {
            header: Header::free(),
            object: Object::Free,
        }
    }
}

struct Chunk {
    cells: Box<[HeapCell]>,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self {
            cells: (0..size).map(|_| HeapCell::free()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub marked: usize,
    pub freed: usize,
    pub chunks: usize,
}

pub struct Heap {
    settings: HeapSettings,
    chunks: Vec<Chunk>,
    /// Next `(chunk, slot)` to inspect. Only moves forward between
    /// collections.
    cursor: (usize, usize),
    live: usize,
    collections: usize,
}

impl Heap {
    /// Panics on invalid settings; validate user input first.
    pub fn new(settings: HeapSettings) -> Self {
        if let Err(msg) = settings.validate() {
            panic!("invalid heap settings: {msg}");
        }
        let chunks = (0..settings.initial_chunks)
            .map(|_| Chunk::new(settings.chunk_size))
            .collect();
        Self {
            settings,
            chunks,
            cursor: (0, 0),
            live: 0,
            collections: 0,
        }
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.settings.chunk_size
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    // ── allocation ─────────────────────────────────────────────────

    /// Places `object` in a free cell with type `ty`.
    ///
    /// May run a collection first. Values referenced by `object` and `ty`
    /// are kept alive across that collection even if `roots` does not
    /// report them.
    pub fn allocate(&mut self, ty: Value, object: Object, roots: &mut dyn RootProvider) -> Value {
        debug_assert!(!matches!(object, Object::Free), "cannot allocate a free cell");

        if let Some(at) = self.find_free() {
            return self.place(at, ty, object);
        }

        let mut pending = vec![ty];
        object.trace(&mut |v| pending.push(v));
        self.collect_with(roots, &pending);
        if let Some(at) = self.find_free() {
            return self.place(at, ty, object);
        }

        self.grow();
        match self.find_free() {
            Some(at) => self.place(at, ty, object),
            None => panic!("out of memory"),
        }
    }

    /// Typed allocation convenience over [`Heap::allocate`].
    pub fn alloc<T: HeapObject>(&mut self, ty: Value, payload: T, roots: &mut dyn RootProvider) -> Value {
        self.allocate(ty, payload.into_object(), roots)
    }

    fn find_free(&mut self) -> Option<(usize, usize)> {
        let (mut chunk, mut slot) = self.cursor;
        while chunk < self.chunks.len() {
            let cells = &self.chunks[chunk].cells;
            while slot < cells.len() {
                if cells[slot].header.is_free() {
                    self.cursor = (chunk, slot + 1);
                    return Some((chunk, slot));
                }
                slot += 1;
            }
            chunk += 1;
            slot = 0;
        }
        self.cursor = (chunk, 0);
        None
    }

    fn place(&mut self, (chunk, slot): (usize, usize), ty: Value, object: Object) -> Value {
        let kind = object.kind();
        let cell = &mut self.chunks[chunk].cells[slot];
        cell.header = Header::new(kind, ty);
        cell.object = object;
        self.live += 1;
        Value::heap(kind, chunk, slot)
    }

    fn grow(&mut self) {
        let current = self.chunks.len();
        let target = (current * 2).min(self.settings.max_chunks);
        if target == current {
            return;
        }
        warn!("heap growing from {current} to {target} chunks");
        for _ in current..target {
            self.chunks.push(Chunk::new(self.settings.chunk_size));
        }
        trace!("heap capacity now {} cells", self.capacity());
        self.cursor = (current, 0);
    }

    // ── collection ─────────────────────────────────────────────────

    pub fn collect(&mut self, roots: &mut dyn RootProvider) -> GcStats {
        self.collect_with(roots, &[])
    }

    fn collect_with(&mut self, roots: &mut dyn RootProvider, extra: &[Value]) -> GcStats {
        let marked = self.mark(roots, extra);
        let freed = self.sweep();
        self.cursor = (0, 0);
        self.collections += 1;
        let stats = GcStats {
            marked,
            freed,
            chunks: self.chunks.len(),
        };
        debug!(
            "gc #{}: marked {}, freed {}, {} chunks",
            self.collections, stats.marked, stats.freed, stats.chunks
        );
        stats
    }

    fn mark(&mut self, roots: &mut dyn RootProvider, extra: &[Value]) -> usize {
        let mut worklist: Vec<Value> = extra.iter().copied().filter(|v| v.is_heap()).collect();
        roots.visit_roots(&mut |v| {
            if v.is_heap() {
                worklist.push(*v);
            }
        });

        let mut marked = 0;
        while let Some(value) = worklist.pop() {
            if value.is_immediate() {
                continue;
            }
            let Some(cell) = self
                .chunks
                .get_mut(value.chunk())
                .and_then(|c| c.cells.get_mut(value.slot()))
            else {
                debug_assert!(false, "handle outside the heap: {value:?}");
                continue;
            };
            if cell.header.is_marked() {
                continue;
            }
            if cell.header.is_free() {
                debug_assert!(false, "reachable handle to a free cell: {value:?}");
                continue;
            }
            cell.header.mark();
            marked += 1;
            worklist.push(cell.header.ty);
            cell.object.trace(&mut |v| {
                if v.is_heap() {
                    worklist.push(v);
                }
            });
        }
        marked
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for chunk in &mut self.chunks {
            for cell in chunk.cells.iter_mut() {
                if cell.header.is_marked() {
                    cell.header.unmark();
                } else if !cell.header.is_free() {
                    let dead = mem::replace(&mut cell.object, Object::Free);
                    cell.header = Header::free();
                    // runs blob finalizers and releases owned buffers
                    drop(dead);
                    freed += 1;
                }
            }
        }
        self.live -= freed;
        freed
    }

    // ── access ─────────────────────────────────────────────────────

    pub fn cell(&self, value: Value) -> Option<&HeapCell> {
        if value.is_immediate() {
            return None;
        }
        let cell = self.chunks.get(value.chunk())?.cells.get(value.slot())?;
        (!cell.header.is_free() && cell.header.kind() == value.kind()).then_some(cell)
    }

    fn cell_mut(&mut self, value: Value) -> Option<&mut HeapCell> {
        if value.is_immediate() {
            return None;
        }
        let cell = self
            .chunks
            .get_mut(value.chunk())?
            .cells
            .get_mut(value.slot())?;
        (!cell.header.is_free() && cell.header.kind() == value.kind()).then_some(cell)
    }

    /// Immediates are always live; heap handles are live until swept.
    pub fn is_live(&self, value: Value) -> bool {
        value.is_immediate() || self.cell(value).is_some()
    }

    pub fn header(&self, value: Value) -> Option<&Header> {
        self.cell(value).map(|c| &c.header)
    }

    pub fn object(&self, value: Value) -> Option<&Object> {
        self.cell(value).map(|c| &c.object)
    }

    pub fn object_mut(&mut self, value: Value) -> Option<&mut Object> {
        self.cell_mut(value).map(|c| &mut c.object)
    }

    /// Overwrites the type of a live cell. Used while bootstrapping types
    /// that refer to themselves.
    pub fn set_type(&mut self, value: Value, ty: Value) {
        if let Some(cell) = self.cell_mut(value) {
            cell.header.ty = ty;
        }
    }

    pub fn try_get<T: HeapObject>(&self, value: Value) -> Option<&T> {
        if value.kind() != T::KIND {
            return None;
        }
        self.object(value).and_then(T::from_object)
    }

    pub fn try_get_mut<T: HeapObject>(&mut self, value: Value) -> Option<&mut T> {
        if value.kind() != T::KIND {
            return None;
        }
        self.object_mut(value).and_then(T::from_object_mut)
    }

    /// Typed payload access.
    ///
    /// # Panics
    ///
    /// The caller guarantees `value` is a live handle of kind `T::KIND`;
    /// violating that is a VM bug and panics.
    pub fn get<T: HeapObject>(&self, value: Value) -> &T {
        self.try_get(value)
            .unwrap_or_else(|| panic!("expected live {}, got {value:?}", T::KIND.name()))
    }

    /// See [`Heap::get`].
    pub fn get_mut<T: HeapObject>(&mut self, value: Value) -> &mut T {
        self.try_get_mut(value)
            .unwrap_or_else(|| panic!("expected live {}, got {value:?}", T::KIND.name()))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{Array, Blob, Integer, ObjectKind, VMString};

    struct TestRoots {
        roots: Vec<Value>,
    }

    impl RootProvider for TestRoots {
        fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
            for root in self.roots.iter_mut() {
                visitor(root);
            }
        }
    }

    fn small_heap(chunk_size: usize, initial_chunks: usize, max_chunks: usize) -> Heap {
        Heap::new(HeapSettings {
            chunk_size,
            initial_chunks,
            max_chunks,
        })
    }

    fn string(heap: &mut Heap, roots: &mut TestRoots, s: &str) -> Value {
        heap.alloc(Value::NIL, VMString { value: s.into() }, roots)
    }

    #[test]
    fn settings_validation_rejects_inconsistent_limits() {
        assert!(HeapSettings::default().validate().is_ok());
        let bad = HeapSettings {
            chunk_size: 8,
            initial_chunks: 4,
            max_chunks: 2,
        };
        assert!(bad.validate().is_err());
        let empty = HeapSettings {
            chunk_size: 0,
            ..HeapSettings::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn allocated_cells_carry_kind_and_payload() {
        let mut heap = small_heap(8, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let s = string(&mut heap, &mut roots, "hello");
        assert_eq!(s.kind(), ObjectKind::String);
        assert_eq!(heap.get::<VMString>(s).value, "hello");
        assert!(heap.try_get::<Array>(s).is_none());
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn self_referencing_array_survives_while_rooted_and_is_reclaimed_after() {
        let mut heap = small_heap(8, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let a = heap.alloc(Value::NIL, Array::default(), &mut roots);
        heap.get_mut::<Array>(a).elements.push(a);
        roots.roots.push(a);

        let stats = heap.collect(&mut roots);
        assert_eq!(stats.marked, 1);
        assert_eq!(stats.freed, 0);
        assert!(heap.is_live(a));
        assert_eq!(heap.get::<Array>(a).elements, vec![a]);

        roots.roots.clear();
        let stats = heap.collect(&mut roots);
        assert_eq!(stats.freed, 1);
        assert!(!heap.is_live(a));
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn collection_keeps_transitively_reachable_cells() {
        let mut heap = small_heap(8, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let leaf = string(&mut heap, &mut roots, "leaf");
        let garbage = string(&mut heap, &mut roots, "garbage");
        let outer = heap.alloc(
            Value::NIL,
            Array {
                elements: vec![leaf],
            },
            &mut roots,
        );
        roots.roots.push(outer);
        heap.collect(&mut roots);
        assert!(heap.is_live(leaf));
        assert!(!heap.is_live(garbage));
    }

    #[test]
    fn cell_types_are_traced() {
        let mut heap = small_heap(8, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let ty = string(&mut heap, &mut roots, "stand-in type");
        let obj = heap.alloc(ty, Array::default(), &mut roots);
        roots.roots.push(obj);
        heap.collect(&mut roots);
        assert!(heap.is_live(ty));
    }

    #[test]
    fn pending_object_edges_survive_allocation_triggered_collection() {
        let mut heap = small_heap(2, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let kept = string(&mut heap, &mut roots, "kept");
        let dropped = string(&mut heap, &mut roots, "dropped");
        // heap is full; this allocation must collect
        let array = heap.alloc(
            Value::NIL,
            Array {
                elements: vec![kept],
            },
            &mut roots,
        );
        assert_eq!(heap.collections(), 1);
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(dropped));
        assert_eq!(heap.get::<Array>(array).elements, vec![kept]);
    }

    #[test]
    fn heap_grows_by_doubling_until_the_cap() {
        let mut heap = small_heap(4, 1, 4);
        let mut roots = TestRoots { roots: vec![] };
        for n in 0..10 {
            let v = heap.alloc(Value::NIL, Integer { value: 5000 + n }, &mut roots);
            roots.roots.push(v);
        }
        assert_eq!(heap.chunk_count(), 4);
        assert_eq!(heap.live_count(), 10);
        for (n, v) in roots.roots.iter().enumerate() {
            assert_eq!(heap.get::<Integer>(*v).value, 5000 + n as i64);
        }
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn exhausting_the_capped_heap_is_fatal() {
        let mut heap = small_heap(2, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        for n in 0..3 {
            let v = heap.alloc(Value::NIL, Integer { value: n }, &mut roots);
            roots.roots.push(v);
        }
    }

    #[test]
    fn sweeping_a_blob_runs_its_finalizer() {
        let finalized = Rc::new(Cell::new(false));
        let flag = finalized.clone();
        let mut heap = small_heap(4, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        let blob = Blob::new("file", Box::new(())).with_finalizer(move |_| flag.set(true));
        heap.alloc(Value::NIL, blob, &mut roots);
        assert!(!finalized.get());
        heap.collect(&mut roots);
        assert!(finalized.get());
    }

    #[test]
    fn freed_slots_are_reused_after_collection() {
        let mut heap = small_heap(2, 1, 1);
        let mut roots = TestRoots { roots: vec![] };
        string(&mut heap, &mut roots, "a");
        string(&mut heap, &mut roots, "b");
        heap.collect(&mut roots);
        string(&mut heap, &mut roots, "c");
        string(&mut heap, &mut roots, "d");
        assert_eq!(heap.chunk_count(), 1);
        assert_eq!(heap.live_count(), 2);
    }
}
