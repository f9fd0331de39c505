//! The x86-64 instruction stream and its GNU `as` printer.
//!
//! Codegen builds a linear stream of these instructions per function and
//! the printer writes one AT&T syntax line each (source operand first,
//! destination last, `q` suffixed mnemonics). The function prologue is
//! prepended after the whole block is lowered, once the final stack size
//! is known.

use std::fmt::Write;

use expc_ir::{ConstantId, Context, Value};
use expc_util::Symbol;

use super::registers::{Gpr, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X64Operand {
    Gpr(Gpr),
    /// A base-relative memory operand, printed `offset(%base)`.
    Memory { base: Gpr, offset: i32 },
    Immediate(i64),
    /// A scalar entry in the constants pool, printed as an immediate.
    Constant(ConstantId),
    Label(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X64Instruction {
    Ret,
    Push(X64Operand),
    Pop(X64Operand),
    Mov { dst: X64Operand, src: X64Operand },
    Neg(X64Operand),
    Add { dst: X64Operand, src: X64Operand },
    Sub { dst: X64Operand, src: X64Operand },
    /// One-operand form: `RDX:RAX = RAX * operand`.
    Imul(X64Operand),
    /// One-operand form: `RAX = RDX:RAX / operand`, `RDX` the remainder.
    Idiv(X64Operand),
    Call(Symbol),
}

#[derive(Debug, Default)]
pub struct X64Bytecode {
    instructions: Vec<X64Instruction>,
}

impl X64Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, X64Instruction> {
        self.instructions.iter()
    }

    pub fn append(&mut self, instruction: X64Instruction) {
        self.instructions.push(instruction);
    }

    /// Insert `prologue` at the front, preserving its order.
    pub fn prepend(&mut self, prologue: impl IntoIterator<Item = X64Instruction>) {
        self.instructions.splice(0..0, prologue);
    }

    pub fn append_ret(&mut self) {
        self.append(X64Instruction::Ret);
    }

    pub fn append_push(&mut self, operand: X64Operand) {
        self.append(X64Instruction::Push(operand));
    }

    pub fn append_pop(&mut self, operand: X64Operand) {
        self.append(X64Instruction::Pop(operand));
    }

    pub fn append_mov(&mut self, dst: X64Operand, src: X64Operand) {
        self.append(X64Instruction::Mov { dst, src });
    }

    pub fn append_neg(&mut self, operand: X64Operand) {
        self.append(X64Instruction::Neg(operand));
    }

    pub fn append_add(&mut self, dst: X64Operand, src: X64Operand) {
        self.append(X64Instruction::Add { dst, src });
    }

    pub fn append_sub(&mut self, dst: X64Operand, src: X64Operand) {
        self.append(X64Instruction::Sub { dst, src });
    }

    pub fn append_imul(&mut self, operand: X64Operand) {
        self.append(X64Instruction::Imul(operand));
    }

    pub fn append_idiv(&mut self, operand: X64Operand) {
        self.append(X64Instruction::Idiv(operand));
    }

    pub fn append_call(&mut self, name: Symbol) {
        self.append(X64Instruction::Call(name));
    }

    /// Print every instruction, one tab-indented line each.
    pub fn print(&self, buffer: &mut String, context: &Context) {
        for instruction in &self.instructions {
            print_instruction(buffer, instruction, context);
        }
    }
}

fn print_instruction(buffer: &mut String, instruction: &X64Instruction, context: &Context) {
    match *instruction {
        X64Instruction::Ret => buffer.push_str("\tret\n"),
        X64Instruction::Push(operand) => {
            buffer.push_str("\tpushq ");
            print_operand(buffer, operand, context);
            buffer.push('\n');
        }
        X64Instruction::Pop(operand) => {
            buffer.push_str("\tpopq ");
            print_operand(buffer, operand, context);
            buffer.push('\n');
        }
        X64Instruction::Mov { dst, src } => {
            // a 64-bit immediate that does not sign-extend from 32 bits
            // needs the movabs encoding, which only targets a register
            let wide = matches!(immediate_value(src, context), Some(v) if i32::try_from(v).is_err());
            buffer.push_str(if wide { "\tmovabsq " } else { "\tmovq " });
            print_operand(buffer, src, context);
            buffer.push_str(", ");
            print_operand(buffer, dst, context);
            buffer.push('\n');
        }
        X64Instruction::Neg(operand) => {
            buffer.push_str("\tnegq ");
            print_operand(buffer, operand, context);
            buffer.push('\n');
        }
        X64Instruction::Add { dst, src } => {
            buffer.push_str("\taddq ");
            print_operand(buffer, src, context);
            buffer.push_str(", ");
            print_operand(buffer, dst, context);
            buffer.push('\n');
        }
        X64Instruction::Sub { dst, src } => {
            buffer.push_str("\tsubq ");
            print_operand(buffer, src, context);
            buffer.push_str(", ");
            print_operand(buffer, dst, context);
            buffer.push('\n');
        }
        X64Instruction::Imul(operand) => {
            buffer.push_str("\timulq ");
            print_operand(buffer, operand, context);
            buffer.push('\n');
        }
        X64Instruction::Idiv(operand) => {
            buffer.push_str("\tidivq ");
            print_operand(buffer, operand, context);
            buffer.push('\n');
        }
        X64Instruction::Call(name) => {
            let _ = writeln!(buffer, "\tcall {name}");
        }
    }
}

fn print_operand(buffer: &mut String, operand: X64Operand, context: &Context) {
    match operand {
        X64Operand::Gpr(gpr) => {
            buffer.push('%');
            buffer.push_str(gpr.name(Width::Qword));
        }
        X64Operand::Memory { base, offset } => {
            let _ = write!(buffer, "{offset}(%{})", base.name(Width::Qword));
        }
        X64Operand::Immediate(value) => {
            let _ = write!(buffer, "${value}");
        }
        X64Operand::Constant(id) => {
            let value = scalar_value(context.constants.get(id))
                .expect("tuple constants are lowered before printing");
            let _ = write!(buffer, "${value}");
        }
        X64Operand::Label(name) => {
            let _ = write!(buffer, "{name}");
        }
    }
}

/// The immediate payload of an operand, when it has one.
fn immediate_value(operand: X64Operand, context: &Context) -> Option<i64> {
    match operand {
        X64Operand::Immediate(value) => Some(value),
        X64Operand::Constant(id) => scalar_value(context.constants.get(id)),
        _ => None,
    }
}

/// The numeric payload of a scalar constant.
pub(crate) fn scalar_value(value: &Value) -> Option<i64> {
    match *value {
        Value::Nil => Some(0),
        Value::Bool(b) => Some(b as i64),
        Value::I8(n) => Some(n as i64),
        Value::I16(n) => Some(n as i64),
        Value::I32(n) => Some(n as i64),
        Value::I64(n) => Some(n),
        Value::U8(n) => Some(n as i64),
        Value::U16(n) => Some(n as i64),
        Value::U32(n) => Some(n as i64),
        Value::U64(n) => i64::try_from(n).ok(),
        Value::Tuple(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expc_ir::Options;
    use std::path::Path;

    fn context() -> Context {
        Context::new(Options::default(), Path::new("test.exp"), None)
    }

    #[test]
    fn test_att_operand_order() {
        let mut bc = X64Bytecode::new();
        bc.append_mov(X64Operand::Gpr(Gpr::Rax), X64Operand::Immediate(5));
        bc.append_add(
            X64Operand::Gpr(Gpr::Rax),
            X64Operand::Memory {
                base: Gpr::Rbp,
                offset: -8,
            },
        );
        let mut out = String::new();
        bc.print(&mut out, &context());
        assert_eq!(out, "\tmovq $5, %rax\n\taddq -8(%rbp), %rax\n");
    }

    #[test]
    fn test_prologue_prepend_order() {
        let mut bc = X64Bytecode::new();
        bc.append_ret();
        bc.prepend([
            X64Instruction::Push(X64Operand::Gpr(Gpr::Rbp)),
            X64Instruction::Mov {
                dst: X64Operand::Gpr(Gpr::Rbp),
                src: X64Operand::Gpr(Gpr::Rsp),
            },
        ]);
        let mut out = String::new();
        bc.print(&mut out, &context());
        assert_eq!(out, "\tpushq %rbp\n\tmovq %rsp, %rbp\n\tret\n");
    }

    #[test]
    fn test_wide_immediate_uses_movabs() {
        let mut bc = X64Bytecode::new();
        bc.append_mov(X64Operand::Gpr(Gpr::Rax), X64Operand::Immediate(3_000_000_000));
        let mut out = String::new();
        bc.print(&mut out, &context());
        assert_eq!(out, "\tmovabsq $3000000000, %rax\n");
    }

    #[test]
    fn test_constant_operand_prints_value() {
        let mut ctx = context();
        let id = ctx.constants.append(Value::I32(42));
        let mut bc = X64Bytecode::new();
        bc.append_mov(X64Operand::Gpr(Gpr::Rax), X64Operand::Constant(id));
        let mut out = String::new();
        bc.print(&mut out, &ctx);
        assert_eq!(out, "\tmovq $42, %rax\n");
    }

    #[test]
    fn test_division_sequence() {
        let mut bc = X64Bytecode::new();
        bc.append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
        bc.append_idiv(X64Operand::Gpr(Gpr::Rbx));
        let mut out = String::new();
        bc.print(&mut out, &context());
        assert_eq!(out, "\tmovq $0, %rdx\n\tidivq %rbx\n");
    }

    #[test]
    fn test_call_and_ret() {
        let mut bc = X64Bytecode::new();
        bc.append_call(Symbol::intern("f"));
        bc.append_ret();
        let mut out = String::new();
        bc.print(&mut out, &context());
        assert_eq!(out, "\tcall f\n\tret\n");
    }
}
