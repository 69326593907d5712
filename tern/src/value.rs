//! Value: the uniform handle for every runtime value.
//!
//! A `Value` is either an immediate (nil, booleans, small integers, symbols)
//! that needs no heap backing, or a reference to a heap cell identified by
//! chunk index and slot offset. The kind tag is carried in the handle itself
//! so `kind()` never touches the heap.
use std::fmt;

use crate::Symbol;

/// The closed set of value representations.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Nil = 0,
    Boolean,
    Integer,
    Float,
    String,
    Symbol,
    Array,
    Dictionary,
    Range,
    Regex,
    RegexResult,
    Function,
    BuiltinFunction,
    PartialFunction,
    Type,
    Environment,
    Exception,
    Blob,
    Instance,
    Iterator,
}

impl ObjectKind {
    pub const COUNT: usize = Self::Iterator as usize + 1;

    const ALL: [ObjectKind; Self::COUNT] = [
        Self::Nil,
        Self::Boolean,
        Self::Integer,
        Self::Float,
        Self::String,
        Self::Symbol,
        Self::Array,
        Self::Dictionary,
        Self::Range,
        Self::Regex,
        Self::RegexResult,
        Self::Function,
        Self::BuiltinFunction,
        Self::PartialFunction,
        Self::Type,
        Self::Environment,
        Self::Exception,
        Self::Blob,
        Self::Instance,
        Self::Iterator,
    ];

    #[inline]
    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::String => "String",
            Self::Symbol => "Symbol",
            Self::Array => "Array",
            Self::Dictionary => "Dictionary",
            Self::Range => "Range",
            Self::Regex => "Regex",
            Self::RegexResult => "RegexResult",
            Self::Function => "Function",
            Self::BuiltinFunction => "BuiltinFunction",
            Self::PartialFunction => "PartialFunction",
            Self::Type => "Type",
            Self::Environment => "Environment",
            Self::Exception => "Exception",
            Self::Blob => "Blob",
            Self::Instance => "Object",
            Self::Iterator => "Iterator",
        }
    }
}

const KIND_MASK: u64 = 0x3F;
const IMMEDIATE_BIT: u64 = 1 << 7;
const SLOT_SHIFT: u64 = 8;
const SLOT_MASK: u64 = 0xFF_FFFF;
const PAYLOAD_SHIFT: u64 = 32;

/// Largest slot offset a handle can address inside one chunk.
pub const MAX_CHUNK_SLOTS: usize = SLOT_MASK as usize + 1;

/// Integers in this range are immediates and therefore identity-equal.
pub const SMALL_INT_MIN: i64 = 0;
pub const SMALL_INT_MAX: i64 = 1023;

/// A tagged reference.
///
/// Layout:
/// - bits 0..=5:  kind tag
/// - bit 6:       unused
/// - bit 7:       immediate flag
/// - bits 8..32:  slot offset within the chunk (heap values)
/// - bits 32..64: chunk index (heap values) or payload (immediates)
///
/// Two values are equal iff they denote the same immediate or the same cell.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    pub const NIL: Value = Value(IMMEDIATE_BIT | ObjectKind::Nil as u64);
    pub const TRUE: Value =
        Value(IMMEDIATE_BIT | ObjectKind::Boolean as u64 | (1 << PAYLOAD_SHIFT));
    pub const FALSE: Value = Value(IMMEDIATE_BIT | ObjectKind::Boolean as u64);

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    const fn immediate(kind: ObjectKind, payload: u32) -> Self {
        Self(IMMEDIATE_BIT | kind as u64 | ((payload as u64) << PAYLOAD_SHIFT))
    }

    #[inline(always)]
    pub(crate) fn heap(kind: ObjectKind, chunk: usize, slot: usize) -> Self {
        debug_assert!(slot < MAX_CHUNK_SLOTS, "slot offset out of range");
        debug_assert!(chunk <= u32::MAX as usize, "chunk index out of range");
        Self(
            kind as u64
                | ((slot as u64 & SLOT_MASK) << SLOT_SHIFT)
                | ((chunk as u64) << PAYLOAD_SHIFT),
        )
    }

    /// O(1), never dereferences.
    #[inline(always)]
    pub fn kind(self) -> ObjectKind {
        // every handle is built from a valid kind
        ObjectKind::from_u8((self.0 & KIND_MASK) as u8).unwrap_or(ObjectKind::Nil)
    }

    #[inline(always)]
    pub const fn is_immediate(self) -> bool {
        self.0 & IMMEDIATE_BIT != 0
    }

    #[inline(always)]
    pub const fn is_heap(self) -> bool {
        !self.is_immediate()
    }

    #[inline(always)]
    pub(crate) const fn chunk(self) -> usize {
        (self.0 >> PAYLOAD_SHIFT) as usize
    }

    #[inline(always)]
    pub(crate) const fn slot(self) -> usize {
        ((self.0 >> SLOT_SHIFT) & SLOT_MASK) as usize
    }

    #[inline(always)]
    const fn payload(self) -> u32 {
        (self.0 >> PAYLOAD_SHIFT) as u32
    }

    // ── Nil / Boolean ──────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }

    #[inline(always)]
    pub const fn from_bool(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }

    #[inline(always)]
    pub const fn as_bool(self) -> Option<bool> {
        if self.0 == Self::TRUE.0 {
            Some(true)
        } else if self.0 == Self::FALSE.0 {
            Some(false)
        } else {
            None
        }
    }

    /// `nil` and `false` are falsey, everything else is truthy.
    #[inline(always)]
    pub const fn is_truthy(self) -> bool {
        !(self.0 == Self::NIL.0 || self.0 == Self::FALSE.0)
    }

    // ── Small integers ─────────────────────────────────────────────

    /// The cached handle for `n`, if `n` is inside the immediate range.
    #[inline(always)]
    pub fn small_int(n: i64) -> Option<Self> {
        if (SMALL_INT_MIN..=SMALL_INT_MAX).contains(&n) {
            Some(Self::immediate(ObjectKind::Integer, n as u32))
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn as_small_int(self) -> Option<i64> {
        if self.is_immediate() && self.kind() == ObjectKind::Integer {
            Some(self.payload() as i64)
        } else {
            None
        }
    }

    // ── Symbols ────────────────────────────────────────────────────

    #[inline(always)]
    pub fn from_symbol(symbol: Symbol) -> Self {
        Self::immediate(ObjectKind::Symbol, symbol.id())
    }

    #[inline(always)]
    pub fn as_symbol(self) -> Option<Symbol> {
        if self.is_immediate() && self.kind() == ObjectKind::Symbol {
            Some(Symbol::from_id(self.payload()))
        } else {
            None
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NIL
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Self::from_symbol(value)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return f.write_str("Nil");
        }
        if let Some(b) = self.as_bool() {
            return write!(f, "Boolean({b})");
        }
        if let Some(n) = self.as_small_int() {
            return write!(f, "Integer({n})");
        }
        if let Some(symbol) = self.as_symbol() {
            return write!(f, "Symbol({symbol})");
        }
        write!(
            f,
            "{}(@{}:{})",
            self.kind().name(),
            self.chunk(),
            self.slot()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_is_nil() {
        let v = Value::default();
        assert!(v.is_nil());
        assert_eq!(v.kind(), ObjectKind::Nil);
        assert!(v.is_immediate());
    }

    #[test]
    fn booleans_are_singletons() {
        assert_eq!(Value::from_bool(true), Value::TRUE);
        assert_eq!(Value::from_bool(false), Value::FALSE);
        assert_ne!(Value::TRUE, Value::FALSE);
        assert_eq!(Value::TRUE.kind(), ObjectKind::Boolean);
        assert_eq!(Value::FALSE.as_bool(), Some(false));
    }

    #[test]
    fn truthiness_only_rejects_nil_and_false() {
        assert!(!Value::NIL.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(Value::small_int(0).expect("cached").is_truthy());
    }

    #[test]
    fn small_ints_are_identical_inside_the_cached_range() {
        for n in [SMALL_INT_MIN, 5, 512, SMALL_INT_MAX] {
            let a = Value::small_int(n).expect("inside range");
            let b = Value::small_int(n).expect("inside range");
            assert_eq!(a, b);
            assert_eq!(a.as_small_int(), Some(n));
            assert_eq!(a.kind(), ObjectKind::Integer);
        }
        assert!(Value::small_int(SMALL_INT_MAX + 1).is_none());
        assert!(Value::small_int(-1).is_none());
    }

    #[test]
    fn heap_handles_round_trip_chunk_and_slot() {
        let v = Value::heap(ObjectKind::Array, 7, 1234);
        assert!(v.is_heap());
        assert_eq!(v.kind(), ObjectKind::Array);
        assert_eq!(v.chunk(), 7);
        assert_eq!(v.slot(), 1234);
        assert_ne!(v, Value::heap(ObjectKind::Array, 7, 1235));
    }

    #[test]
    fn heap_handles_never_collide_with_immediates() {
        let cached = Value::small_int(3).expect("cached");
        let heap = Value::heap(ObjectKind::Integer, 3, 0);
        assert_ne!(cached, heap);
        assert!(heap.as_small_int().is_none());
        assert!(!Value::heap(ObjectKind::Nil, 0, 0).is_nil());
    }

    #[test]
    fn symbols_round_trip() {
        let symbol = Symbol::intern("value-test-symbol");
        let v = Value::from_symbol(symbol);
        assert_eq!(v.kind(), ObjectKind::Symbol);
        assert_eq!(v.as_symbol(), Some(symbol));
        assert!(Value::NIL.as_symbol().is_none());
    }
}
