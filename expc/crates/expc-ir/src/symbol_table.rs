//! The global symbol table.
//!
//! An open-addressed hash map with linear probing and tombstone deletion,
//! keyed by interned name. Globals are looked up by name from `LABEL`
//! operands, so the table sits on the hot path of call typechecking; it is
//! also how the driver detaches one function for analysis while the rest
//! of the context stays borrowable (`remove` then `insert`).

use std::hash::{BuildHasher, BuildHasherDefault};

use rustc_hash::FxHasher;

use expc_util::Symbol;

use crate::function::Function;
use crate::types::TypeId;

#[derive(Debug, Default)]
pub enum GlobalKind {
    /// Declared but not yet defined.
    #[default]
    Undefined,
    Function(Function),
}

/// One entry in the symbol table.
#[derive(Debug)]
pub struct Global {
    pub name: Symbol,
    pub ty: Option<TypeId>,
    pub kind: GlobalKind,
}

impl Global {
    pub fn function(name: Symbol, body: Function) -> Self {
        Self {
            name,
            ty: None,
            kind: GlobalKind::Function(body),
        }
    }
}

#[derive(Debug)]
enum Slot {
    Empty,
    /// A deleted entry. Probe sequences walk through tombstones; inserts
    /// may reuse them.
    Tombstone,
    Occupied(Global),
}

/// Grow when `(occupied + tombstones + 1) >= capacity * MAX_LOAD`.
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

const INITIAL_CAPACITY: usize = 8;

#[derive(Default)]
pub struct SymbolTable {
    slots: Vec<Slot>,
    /// Occupied slots.
    live: usize,
    /// Occupied plus tombstone slots, the load-factor measure.
    used: usize,
    hasher: BuildHasherDefault<FxHasher>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert `global`, returning `true` when this was the first insert of
    /// its name. An existing definition is left untouched so conflicting
    /// globals cannot silently replace each other.
    pub fn insert(&mut self, global: Global) -> bool {
        if self.slots.is_empty() || (self.used + 1) * MAX_LOAD_DEN >= self.capacity() * MAX_LOAD_NUM
        {
            self.grow();
        }

        let index = self.find(global.name);
        match self.slots[index] {
            Slot::Occupied(_) => false,
            Slot::Empty => {
                self.slots[index] = Slot::Occupied(global);
                self.live += 1;
                self.used += 1;
                true
            }
            Slot::Tombstone => {
                self.slots[index] = Slot::Occupied(global);
                self.live += 1;
                true
            }
        }
    }

    pub fn lookup(&self, name: Symbol) -> Option<&Global> {
        if self.slots.is_empty() {
            return None;
        }
        match &self.slots[self.find(name)] {
            Slot::Occupied(global) => Some(global),
            _ => None,
        }
    }

    pub fn lookup_mut(&mut self, name: Symbol) -> Option<&mut Global> {
        if self.slots.is_empty() {
            return None;
        }
        let index = self.find(name);
        match &mut self.slots[index] {
            Slot::Occupied(global) => Some(global),
            _ => None,
        }
    }

    /// Remove the entry for `name`, leaving a tombstone.
    pub fn remove(&mut self, name: Symbol) -> Option<Global> {
        if self.slots.is_empty() {
            return None;
        }
        let index = self.find(name);
        if matches!(self.slots[index], Slot::Occupied(_)) {
            let slot = std::mem::replace(&mut self.slots[index], Slot::Tombstone);
            self.live -= 1;
            match slot {
                Slot::Occupied(global) => Some(global),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    /// Iterate occupied entries, skipping holes and tombstones. Order is
    /// the probe layout, not insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(global) => Some(global),
            _ => None,
        })
    }

    /// The slot `name` occupies or would occupy: the matching occupied
    /// slot when present, otherwise the first tombstone on the probe path
    /// (for reuse) or the terminating empty slot.
    fn find(&self, name: Symbol) -> usize {
        debug_assert!(!self.slots.is_empty());
        let capacity = self.capacity();
        let mut index = self.hasher.hash_one(name.as_u32()) as usize % capacity;
        let mut tombstone = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied(global) => {
                    if global.name == name {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Double the capacity (power of two) and rehash. Tombstones are not
    /// carried over.
    fn grow(&mut self) {
        let capacity = (self.capacity().max(INITIAL_CAPACITY / 2) * 2).next_power_of_two();
        let old = std::mem::replace(
            &mut self.slots,
            (0..capacity).map(|_| Slot::Empty).collect(),
        );
        self.live = 0;
        self.used = 0;
        for slot in old {
            if let Slot::Occupied(global) = slot {
                let index = self.find(global.name);
                self.slots[index] = Slot::Occupied(global);
                self.live += 1;
                self.used += 1;
            }
        }
    }
}
