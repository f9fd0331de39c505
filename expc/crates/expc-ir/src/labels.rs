//! The label table.
//!
//! Global symbol names referenced from instructions are kept in an
//! append-with-dedup list, so a `LABEL` operand is a dense `u32` index
//! rather than an interned string carried inline.

use std::hash::BuildHasherDefault;

use indexmap::IndexSet;
use rustc_hash::FxHasher;

use expc_util::{define_idx, Symbol};

define_idx!(
    /// Index into the [`Labels`] table.
    LabelId
);

#[derive(Default)]
pub struct Labels {
    names: IndexSet<Symbol, BuildHasherDefault<FxHasher>>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: Symbol) -> LabelId {
        let (index, _) = self.names.insert_full(name);
        LabelId(index as u32)
    }

    pub fn get(&self, id: LabelId) -> Symbol {
        *self
            .names
            .get_index(id.0 as usize)
            .expect("label index out of bounds")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dedups() {
        let mut labels = Labels::new();
        let f = Symbol::intern("f");
        let g = Symbol::intern("g");
        let a = labels.insert(f);
        let b = labels.insert(g);
        let c = labels.insert(f);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(a), f);
    }
}
