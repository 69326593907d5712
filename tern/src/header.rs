use std::fmt;

use crate::{ObjectKind, Value};

/// GC / bookkeeping flags stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    pub const NONE: Self = Self(0);
    pub const MARK: Self = Self(1 << 0);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

/// The fixed prefix of every heap cell.
///
/// `kind` is written once at construction. `ty` always names a `Type`
/// object, except for the few bootstrap types whose type is patched in
/// right after they are allocated.
#[derive(Clone, Copy)]
pub struct Header {
    kind: ObjectKind,
    flags: HeaderFlags,
    pub ty: Value,
}

impl Header {
    pub fn new(kind: ObjectKind, ty: Value) -> Self {
        Self {
            kind,
            flags: HeaderFlags::NONE,
            ty,
        }
    }

    /// The sentinel stored in reclaimed cells.
    pub const fn free() -> Self {
        Self {
            kind: ObjectKind::Nil,
            flags: HeaderFlags::NONE,
            ty: Value::NIL,
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Free iff the tag is the nil sentinel and the mark bit is clear.
    #[inline(always)]
    pub fn is_free(&self) -> bool {
        self.kind == ObjectKind::Nil && !self.is_marked()
    }

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[inline(always)]
    pub fn is_marked(&self) -> bool {
        self.flags.contains(HeaderFlags::MARK)
    }

    #[inline(always)]
    pub fn mark(&mut self) {
        self.flags = self.flags.with(HeaderFlags::MARK);
    }

    #[inline(always)]
    pub fn unmark(&mut self) {
        self.flags = self.flags.without(HeaderFlags::MARK);
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("type", &self.ty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_header_is_unmarked_nil() {
        let header = Header::free();
        assert!(header.is_free());
        assert_eq!(header.kind(), ObjectKind::Nil);
    }

    #[test]
    fn mark_and_unmark_toggle_only_the_mark_bit() {
        let mut header = Header::new(ObjectKind::Array, Value::NIL);
        assert!(!header.is_marked());
        header.mark();
        assert!(header.is_marked());
        assert!(!header.is_free());
        header.unmark();
        assert_eq!(header.flags(), HeaderFlags::NONE);
        assert_eq!(header.kind(), ObjectKind::Array);
    }
}
