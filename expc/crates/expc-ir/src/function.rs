//! Function bodies: locals, lifetimes, blocks.

use expc_util::{define_idx, IndexVec, Symbol};

use crate::instruction::Instruction;
use crate::types::TypeId;

define_idx!(
    /// Dense SSA index of a local within its function.
    LocalId
);

/// The inclusive interval of block indices during which an SSA local holds
/// a live value.
///
/// Invariants after lifetime analysis: `first_use <= last_use`, and for a
/// local defined (position A) at block index `i`, `first_use == i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifetime {
    pub first_use: u32,
    pub last_use: u32,
}

impl Lifetime {
    pub fn new(first_use: u32, last_use: u32) -> Self {
        Self {
            first_use,
            last_use,
        }
    }
}

/// One SSA local. The SSA number is the local's index in
/// [`Function::locals`]; `type` is filled by type inference and `lifetime`
/// by lifetime analysis. Allocation decisions live in the backend's
/// allocator, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: Option<Symbol>,
    pub ty: Option<TypeId>,
    pub lifetime: Lifetime,
}

/// An ordered sequence of instructions. The index of an instruction is its
/// timestamp for lifetime purposes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Block {
    instructions: Vec<Instruction>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> u32 {
        self.instructions.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: u32) -> &Instruction {
        &self.instructions[index as usize]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

/// A parsed function body in SSA form.
#[derive(Debug, Default)]
pub struct Function {
    /// The formal arguments, in declaration order. Each entry indexes
    /// `locals`; arguments occupy the lowest SSA numbers.
    pub arguments: Vec<LocalId>,
    pub locals: IndexVec<LocalId, Local>,
    pub return_type: Option<TypeId>,
    pub block: Block,
}

impl Function {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh SSA local.
    pub fn new_local(&mut self, name: Option<Symbol>) -> LocalId {
        self.locals.push(Local {
            name,
            ty: None,
            lifetime: Lifetime::default(),
        })
    }

    /// Create a formal argument. Arguments must be created before any
    /// other local so their SSA numbers are the argument positions.
    pub fn new_argument(&mut self, name: Symbol, ty: TypeId) -> LocalId {
        debug_assert_eq!(self.locals.len(), self.arguments.len());
        let id = self.locals.push(Local {
            name: Some(name),
            ty: Some(ty),
            lifetime: Lifetime::default(),
        });
        self.arguments.push(id);
        id
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id]
    }

    pub fn local_mut(&mut self, id: LocalId) -> &mut Local {
        &mut self.locals[id]
    }

    pub fn is_argument(&self, id: LocalId) -> bool {
        self.arguments.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_ssa_numbering() {
        let mut function = Function::new();
        let a = function.new_local(None);
        let b = function.new_local(Some(Symbol::intern("x")));
        assert_eq!(a, LocalId(0));
        assert_eq!(b, LocalId(1));
        assert_eq!(function.local(b).name, Some(Symbol::intern("x")));
    }

    #[test]
    fn test_arguments_take_lowest_ssa() {
        let mut function = Function::new();
        let x = function.new_argument(Symbol::intern("x"), crate::TypeId(4));
        let y = function.new_argument(Symbol::intern("y"), crate::TypeId(4));
        let t = function.new_local(None);
        assert_eq!(x, LocalId(0));
        assert_eq!(y, LocalId(1));
        assert_eq!(t, LocalId(2));
        assert!(function.is_argument(y));
        assert!(!function.is_argument(t));
    }
}
