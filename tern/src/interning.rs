use std::{fmt, sync::Arc, sync::LazyLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// An interned name.
///
/// Symbols are process-wide so a compiler can produce them without a VM.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

struct SymbolTableImpl {
    names: Vec<Arc<str>>,
    mappings: FxHashMap<Arc<str>, Symbol>,
}

pub struct SymbolTable(RwLock<SymbolTableImpl>);

static SYMBOLS: LazyLock<SymbolTable> = LazyLock::new(SymbolTable::new);

impl SymbolTableImpl {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            mappings: FxHashMap::default(),
        }
    }

    fn get_or_add(&mut self, value: &str) -> Symbol {
        if let Some(&symbol) = self.mappings.get(value) {
            return symbol;
        }
        let id = u32::try_from(self.names.len()).expect("symbol table overflow");
        let symbol = Symbol(id);
        let interned = Arc::<str>::from(value);
        self.names.push(interned.clone());
        self.mappings.insert(interned, symbol);
        symbol
    }

    fn get(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.names.get(symbol.0 as usize).cloned()
    }
}

impl SymbolTable {
    fn new() -> Self {
        Self(RwLock::new(SymbolTableImpl::new()))
    }

    pub fn add(&self, value: &str) -> Symbol {
        // most lookups hit an existing entry, only take the write lock on a miss
        if let Some(&symbol) = self.0.read().mappings.get(value) {
            return symbol;
        }
        self.0.write().get_or_add(value)
    }

    pub fn get(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.0.read().get(symbol)
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Symbol {
    pub fn intern(name: &str) -> Self {
        SYMBOLS.add(name)
    }

    pub fn name(self) -> Arc<str> {
        // ids are only handed out by the table and entries are never removed
        SYMBOLS
            .get(self)
            .unwrap_or_else(|| Arc::from("<unknown symbol>"))
    }

    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn from_id(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::intern(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_name_yields_same_symbol() {
        let a = Symbol::intern("append");
        let b = Symbol::intern("append");
        assert_eq!(a, b);
        assert_eq!(&*a.name(), "append");
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let a = Symbol::intern("interning-test-left");
        let b = Symbol::intern("interning-test-right");
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn symbols_are_shared_across_threads() {
        let here = Symbol::intern("shared-across-threads");
        let there = std::thread::spawn(|| Symbol::intern("shared-across-threads"))
            .join()
            .expect("thread panicked");
        assert_eq!(here, there);
    }
}
