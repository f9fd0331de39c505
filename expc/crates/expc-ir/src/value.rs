//! Compile-time values and the constants pool.
//!
//! The pool is append-with-dedup: appending a value that is structurally
//! equal to an existing entry returns the existing index, so a `CONSTANT`
//! operand identifies its value uniquely and tuple constants shared by
//! several instructions are stored once.

use std::hash::BuildHasherDefault;

use indexmap::IndexSet;
use rustc_hash::FxHasher;

use expc_util::define_idx;

use crate::instruction::Operand;

define_idx!(
    /// Index into the [`Constants`] pool.
    ConstantId
);

/// A value in the constants pool. Equality is structural and recurses
/// into tuple elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Nil,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Tuple(Vec<Operand>),
}

#[derive(Default)]
pub struct Constants {
    values: IndexSet<Value, BuildHasherDefault<FxHasher>>,
}

impl Constants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value`, returning the index of the structurally equal entry
    /// that already exists or of the freshly inserted one.
    pub fn append(&mut self, value: Value) -> ConstantId {
        let (index, _) = self.values.insert_full(value);
        ConstantId(index as u32)
    }

    pub fn get(&self, id: ConstantId) -> &Value {
        self.values
            .get_index(id.0 as usize)
            .expect("constant index out of bounds")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Immediate;

    #[test]
    fn test_append_dedups() {
        let mut constants = Constants::new();
        let a = constants.append(Value::I32(42));
        let b = constants.append(Value::I32(42));
        let c = constants.append(Value::I32(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(constants.len(), 2);
    }

    #[test]
    fn test_tuple_append_idempotent() {
        let mut constants = Constants::new();
        let tuple = Value::Tuple(vec![
            Operand::Immediate(Immediate::I32(2)),
            Operand::Immediate(Immediate::I32(4)),
        ]);
        let a = constants.append(tuple.clone());
        let b = constants.append(tuple);
        assert_eq!(a, b);
        assert_eq!(constants.len(), 1);
    }

    #[test]
    fn test_get_roundtrip() {
        let mut constants = Constants::new();
        let id = constants.append(Value::I64(-7));
        assert_eq!(constants.get(id), &Value::I64(-7));
    }
}
