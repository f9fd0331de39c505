//! SSA instructions and operands.
//!
//! Every instruction writes at most one SSA local, always in position A;
//! positions B and C are source operands whose allowed formats are fixed
//! per opcode. The uniform A/B/C view ([`Instruction::dst`],
//! [`Instruction::b`], [`Instruction::c`]) is what the lifetime and
//! validation passes walk; the named fields are what the parser and
//! codegen read.

use crate::function::LocalId;
use crate::labels::LabelId;
use crate::types::{TypeId, TypeInterner};
use crate::value::ConstantId;

/// An inline immediate operand, tagged with its source-level type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl Immediate {
    /// The numeric value, widened for range checks and printing.
    pub fn value(self) -> i128 {
        match self {
            Immediate::I8(n) => n as i128,
            Immediate::I16(n) => n as i128,
            Immediate::I32(n) => n as i128,
            Immediate::I64(n) => n as i128,
            Immediate::U8(n) => n as i128,
            Immediate::U16(n) => n as i128,
            Immediate::U32(n) => n as i128,
            Immediate::U64(n) => n as i128,
        }
    }

    /// The type this immediate carries on its own.
    pub fn type_of(self, types: &TypeInterner) -> TypeId {
        match self {
            Immediate::I8(_) => types.i8(),
            Immediate::I16(_) => types.i16(),
            Immediate::I32(_) => types.i32(),
            Immediate::I64(_) => types.i64(),
            Immediate::U8(_) => types.u8(),
            Immediate::U16(_) => types.u16(),
            Immediate::U32(_) => types.u32(),
            Immediate::U64(_) => types.u64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// An SSA local of the current function.
    Ssa(LocalId),
    /// An entry in the context's constants pool.
    Constant(ConstantId),
    /// An inline immediate.
    Immediate(Immediate),
    /// An entry in the label table, naming a global symbol.
    Label(LabelId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Ret,
    Call,
    Load,
    Dot,
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ret => "ret",
            Opcode::Call => "call",
            Opcode::Load => "load",
            Opcode::Dot => "dot",
            Opcode::Neg => "neg",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Return `value` from the function. `result` is a synthesized local
    /// carrying the returned value's type, so position A is uniform across
    /// every opcode.
    Ret { result: LocalId, value: Operand },
    /// Call `callee` (a label operand) with `arguments` (a constant tuple
    /// operand), binding the result to `dst`.
    Call {
        dst: LocalId,
        callee: Operand,
        arguments: Operand,
    },
    /// Copy `src` into `dst`.
    Load { dst: LocalId, src: Operand },
    /// Subscript `tuple` with the immediate `index`, binding the element
    /// to `dst`.
    Dot {
        dst: LocalId,
        tuple: Operand,
        index: Operand,
    },
    Neg { dst: LocalId, operand: Operand },
    Add {
        dst: LocalId,
        lhs: Operand,
        rhs: Operand,
    },
    Sub {
        dst: LocalId,
        lhs: Operand,
        rhs: Operand,
    },
    Mul {
        dst: LocalId,
        lhs: Operand,
        rhs: Operand,
    },
    Div {
        dst: LocalId,
        lhs: Operand,
        rhs: Operand,
    },
    Mod {
        dst: LocalId,
        lhs: Operand,
        rhs: Operand,
    },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Ret { .. } => Opcode::Ret,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Dot { .. } => Opcode::Dot,
            Instruction::Neg { .. } => Opcode::Neg,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Div { .. } => Opcode::Div,
            Instruction::Mod { .. } => Opcode::Mod,
        }
    }

    /// The SSA local defined by this instruction (position A).
    pub fn dst(&self) -> LocalId {
        match *self {
            Instruction::Ret { result, .. } => result,
            Instruction::Call { dst, .. } => dst,
            Instruction::Load { dst, .. } => dst,
            Instruction::Dot { dst, .. } => dst,
            Instruction::Neg { dst, .. } => dst,
            Instruction::Add { dst, .. } => dst,
            Instruction::Sub { dst, .. } => dst,
            Instruction::Mul { dst, .. } => dst,
            Instruction::Div { dst, .. } => dst,
            Instruction::Mod { dst, .. } => dst,
        }
    }

    /// Position B, when the opcode has one.
    pub fn b(&self) -> Option<Operand> {
        match *self {
            Instruction::Ret { value, .. } => Some(value),
            Instruction::Call { callee, .. } => Some(callee),
            Instruction::Load { src, .. } => Some(src),
            Instruction::Dot { tuple, .. } => Some(tuple),
            Instruction::Neg { operand, .. } => Some(operand),
            Instruction::Add { lhs, .. }
            | Instruction::Sub { lhs, .. }
            | Instruction::Mul { lhs, .. }
            | Instruction::Div { lhs, .. }
            | Instruction::Mod { lhs, .. } => Some(lhs),
        }
    }

    /// Position C, when the opcode has one.
    pub fn c(&self) -> Option<Operand> {
        match *self {
            Instruction::Ret { .. } | Instruction::Load { .. } | Instruction::Neg { .. } => None,
            Instruction::Call { arguments, .. } => Some(arguments),
            Instruction::Dot { index, .. } => Some(index),
            Instruction::Add { rhs, .. }
            | Instruction::Sub { rhs, .. }
            | Instruction::Mul { rhs, .. }
            | Instruction::Div { rhs, .. }
            | Instruction::Mod { rhs, .. } => Some(rhs),
        }
    }
}
