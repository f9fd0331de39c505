//! Global string table backing [`Symbol`].
//!
//! The table is keyed by the string content itself, so lookups never need
//! collision probing. Interned strings are allocated once and leaked to
//! obtain `'static` lifetime references; this is safe because the table
//! lives for the whole process, entries are never removed, and the total
//! number of unique names in a compilation is bounded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, RwLock};

use ahash::RandomState;
use dashmap::DashMap;

use super::Symbol;

/// Keywords and primitive type names of the source language, pre-interned
/// so they are available without allocation during lexing.
const KNOWN_SYMBOLS: &[&str] = &[
    "fn", "const", "return", "true", "false", "nil", "bool", "i8", "i16", "i32", "i64", "u8",
    "u16", "u32", "u64", "main",
];

/// Global string table instance, initialized on first use.
pub(super) static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    for symbol in KNOWN_SYMBOLS {
        table.intern(symbol);
    }
    table
});

/// Thread-safe string table.
///
/// The hot path (interning an already-known string) is a single lock-free
/// map lookup. The miss path takes the `strings` write lock, which also
/// serializes index assignment so each unique string gets exactly one slot.
pub(super) struct StringTable {
    /// Content to index. The `&'static str` key is the same allocation the
    /// symbol resolves back to.
    map: DashMap<&'static str, u32, RandomState>,

    /// Index to content, for O(1) `Symbol::as_str`.
    strings: RwLock<Vec<&'static str>>,

    /// Number of interning calls that found an existing entry.
    hits: AtomicUsize,

    /// Number of interning calls that allocated a new entry.
    misses: AtomicUsize,
}

impl StringTable {
    fn new() -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher(256, RandomState::new()),
            strings: RwLock::new(Vec::with_capacity(256)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub(super) fn intern(&self, string: &str) -> Symbol {
        if let Some(entry) = self.map.get(string) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Symbol::from_index(*entry.value());
        }

        // Slow path. The write lock on `strings` doubles as the intern
        // mutex: re-check under it so two racing threads cannot both
        // allocate a slot for the same content.
        let mut strings = self.strings.write().unwrap();
        if let Some(entry) = self.map.get(string) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Symbol::from_index(*entry.value());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = u32::try_from(strings.len()).expect("string table overflow");
        strings.push(interned);
        self.map.insert(interned, index);
        Symbol::from_index(index)
    }

    pub(super) fn get(&self, symbol: Symbol) -> &'static str {
        self.strings.read().unwrap()[symbol.index() as usize]
    }

    #[allow(dead_code)]
    pub(super) fn stats(&self) -> InternerStats {
        InternerStats {
            count: self.strings.read().unwrap().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Interner statistics for profiling.
#[derive(Debug, Clone, Copy)]
pub struct InternerStats {
    /// Number of unique strings interned.
    pub count: usize,
    /// Interning calls that found an existing entry.
    pub hits: usize,
    /// Interning calls that allocated a new entry.
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_known_symbols_preinterned() {
        // keywords were interned at table initialization, so re-interning
        // them is a hit
        let before = STRING_TABLE.stats();
        let _ = Symbol::intern("fn");
        let _ = Symbol::intern("const");
        let after = STRING_TABLE.stats();
        assert_eq!(after.count, before.count);
        assert!(after.hits >= before.hits + 2);
    }

    #[test]
    fn test_concurrent_same_string() {
        let handles: Vec<_> = (0..10)
            .map(|_| thread::spawn(|| Symbol::intern("concurrent_same")))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbol in &results[1..] {
            assert_eq!(results[0], *symbol);
        }
    }

    #[test]
    fn test_concurrent_distinct_strings() {
        let handles: Vec<_> = (0..20)
            .map(|i| thread::spawn(move || (i, Symbol::intern(&format!("thread_{i}")))))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, symbol) in &results {
            assert_eq!(symbol.as_str(), format!("thread_{i}"));
        }
    }
}
