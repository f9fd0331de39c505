//! Instruction selection.
//!
//! One lowering routine per IR opcode. Each consults the allocator for
//! placements as it goes, so a spill's displacing `mov` lands in the
//! stream exactly where the values move. The general strategy is
//! memory-to-register coalescing: when a source operand already sits in
//! a register, the result is allocated into that register and a single
//! two-operand instruction is emitted; otherwise a register is acquired
//! (spilling if needed) and the first operand moved into it.

use expc_ir::{Context, Function, Immediate, Instruction, LocalId, Operand, Type, TypeId, Value};

use super::allocator::{Allocator, Location};
use super::bytecode::{scalar_value, X64Bytecode, X64Operand};
use super::registers::Gpr;
use crate::error::CodeGenError;

pub struct X64FunctionBody {
    pub bytecode: X64Bytecode,
    pub stack_size: u32,
}

pub fn codegen_function(
    function: &Function,
    context: &Context,
) -> Result<X64FunctionBody, CodeGenError> {
    let mut allocator = Allocator::new(function);
    allocator.allocate_formal_arguments(function);

    let mut bc = X64Bytecode::new();
    for index in 0..function.block.len() {
        allocator.expire_old_lifetimes(index);
        let instruction = *function.block.get(index);
        let mut lower = Lower {
            function,
            context,
            allocator: &mut allocator,
            bc: &mut bc,
        };
        lower.instruction(&instruction, index)?;
    }

    let stack_size = allocator.stack_size();
    let mut prologue = vec![
        super::bytecode::X64Instruction::Push(X64Operand::Gpr(Gpr::Rbp)),
        super::bytecode::X64Instruction::Mov {
            dst: X64Operand::Gpr(Gpr::Rbp),
            src: X64Operand::Gpr(Gpr::Rsp),
        },
    ];
    if stack_size > 0 {
        prologue.push(super::bytecode::X64Instruction::Sub {
            dst: X64Operand::Gpr(Gpr::Rsp),
            src: X64Operand::Immediate(stack_size as i64),
        });
    }
    bc.prepend(prologue);

    Ok(X64FunctionBody {
        bytecode: bc,
        stack_size,
    })
}

struct Lower<'a> {
    function: &'a Function,
    context: &'a Context,
    allocator: &'a mut Allocator,
    bc: &'a mut X64Bytecode,
}

fn unsupported(what: impl Into<String>) -> CodeGenError {
    CodeGenError::Unsupported(what.into())
}

fn immediate_i64(immediate: Immediate) -> Result<i64, CodeGenError> {
    i64::try_from(immediate.value()).map_err(|_| CodeGenError::ImmediateOutOfRange(immediate.value()))
}

impl Lower<'_> {
    fn instruction(&mut self, instruction: &Instruction, index: u32) -> Result<(), CodeGenError> {
        match *instruction {
            Instruction::Ret { value, .. } => self.ret(value),
            Instruction::Call {
                dst,
                callee,
                arguments,
            } => self.call(dst, callee, arguments),
            Instruction::Load { dst, src } => self.load(dst, src),
            Instruction::Dot { dst, tuple, index: element } => self.dot(dst, tuple, element),
            Instruction::Neg { dst, operand } => self.neg(dst, operand, index),
            Instruction::Add { dst, lhs, rhs } => self.add(dst, lhs, rhs, index),
            Instruction::Sub { dst, lhs, rhs } => self.sub(dst, lhs, rhs, index),
            Instruction::Mul { dst, lhs, rhs } => self.mul(dst, lhs, rhs, index),
            Instruction::Div { dst, lhs, rhs } => self.div(dst, lhs, rhs, index),
            Instruction::Mod { dst, lhs, rhs } => self.modulus(dst, lhs, rhs),
        }
    }

    // ------------------------------------------------------------------
    // shared plumbing

    fn type_of_local(&self, id: LocalId) -> TypeId {
        self.function
            .local(id)
            .ty
            .expect("codegen runs after validation")
    }

    fn is_tuple(&self, ty: TypeId) -> bool {
        matches!(self.context.types.get(ty), Type::Tuple(_))
    }

    /// Copy between two locations, routing through a scratch register
    /// when both are memory.
    fn copy(&mut self, dst: Location, src: Location) {
        if dst.is_stack() && src.is_stack() {
            let scratch = self.allocator.acquire_any_gpr(self.bc);
            self.bc.append_mov(X64Operand::Gpr(scratch), src.operand());
            self.bc.append_mov(dst.operand(), X64Operand::Gpr(scratch));
            self.allocator.release_gpr(scratch, self.bc);
        } else {
            self.bc.append_mov(dst.operand(), src.operand());
        }
    }

    /// Move an immediate into `dst`. Only `movabs`, which targets a
    /// register, carries a full 64-bit payload; a wide store goes
    /// through a scratch.
    fn move_immediate(&mut self, dst: Location, value: i64) {
        if dst.is_stack() && i32::try_from(value).is_err() {
            let scratch = self.allocator.acquire_any_gpr(self.bc);
            self.bc
                .append_mov(X64Operand::Gpr(scratch), X64Operand::Immediate(value));
            self.bc.append_mov(dst.operand(), X64Operand::Gpr(scratch));
            self.allocator.release_gpr(scratch, self.bc);
        } else {
            self.bc.append_mov(dst.operand(), X64Operand::Immediate(value));
        }
    }

    /// Move any scalar operand's value into `dst`.
    fn load_operand(&mut self, dst: Location, operand: Operand) -> Result<(), CodeGenError> {
        match operand {
            Operand::Ssa(id) => {
                let src = self.allocator.location_of(id);
                self.copy(dst, src);
                Ok(())
            }
            Operand::Immediate(immediate) => {
                let value = immediate_i64(immediate)?;
                self.move_immediate(dst, value);
                Ok(())
            }
            Operand::Constant(id) => match scalar_value(self.context.constants.get(id)) {
                Some(value) => {
                    self.move_immediate(dst, value);
                    Ok(())
                }
                None => Err(unsupported("aggregate constant in scalar position")),
            },
            Operand::Label(_) => Err(unsupported("label value")),
        }
    }

    /// A `B`/`C` position operand as an x86-64 source. Immediates wider
    /// than 32 bits are materialized into a scratch register, returned
    /// for release after the consuming instruction.
    fn arith_source(&mut self, operand: Operand) -> Result<(X64Operand, Option<Gpr>), CodeGenError> {
        let value = match operand {
            Operand::Ssa(id) => return Ok((self.allocator.location_of(id).operand(), None)),
            Operand::Immediate(immediate) => immediate_i64(immediate)?,
            Operand::Constant(id) => scalar_value(self.context.constants.get(id))
                .ok_or_else(|| unsupported("aggregate constant in arithmetic"))?,
            Operand::Label(_) => return Err(unsupported("label operand in arithmetic")),
        };
        if i32::try_from(value).is_ok() {
            Ok((X64Operand::Immediate(value), None))
        } else {
            let scratch = self.allocator.acquire_any_gpr(self.bc);
            self.bc
                .append_mov(X64Operand::Gpr(scratch), X64Operand::Immediate(value));
            Ok((X64Operand::Gpr(scratch), Some(scratch)))
        }
    }

    fn release_scratch(&mut self, scratch: Option<Gpr>) {
        if let Some(gpr) = scratch {
            self.allocator.release_gpr(gpr, self.bc);
        }
    }

    // ------------------------------------------------------------------
    // opcodes

    fn ret(&mut self, value: Operand) -> Result<(), CodeGenError> {
        let return_location = Location::Gpr(Gpr::RETURN);
        match value {
            Operand::Ssa(id) => {
                if self.is_tuple(self.type_of_local(id)) {
                    return Err(unsupported("aggregate return value"));
                }
                let source = self.allocator.location_of(id);
                if source != return_location {
                    self.copy(return_location, source);
                }
            }
            other => self.load_operand(return_location, other)?,
        }

        self.bc
            .append_mov(X64Operand::Gpr(Gpr::Rsp), X64Operand::Gpr(Gpr::Rbp));
        self.bc.append_pop(X64Operand::Gpr(Gpr::Rbp));
        self.bc.append_ret();
        Ok(())
    }

    fn call(&mut self, dst: LocalId, callee: Operand, arguments: Operand) -> Result<(), CodeGenError> {
        let Operand::Label(label) = callee else {
            return Err(unsupported("indirect call"));
        };
        let name = self.context.labels.get(label);

        let Operand::Constant(arguments) = arguments else {
            return Err(unsupported("non-constant argument list"));
        };
        let Value::Tuple(elements) = self.context.constants.get(arguments).clone() else {
            return Err(unsupported("non-tuple argument list"));
        };

        // move each argument into its System V register, pinning the
        // register so later relocations cannot reuse it
        for (position, element) in elements.iter().enumerate() {
            let Some(target) = Gpr::scalar_argument(position) else {
                return Err(unsupported("stack-passed call arguments"));
            };
            self.allocator.acquire_gpr(target, self.bc);
            self.load_operand(Location::Gpr(target), *element)?;
        }

        self.allocator.allocate_to_gpr(dst, Gpr::RETURN, self.bc);
        self.bc.append_call(name);

        // the callee consumed the argument registers
        for position in 0..elements.len() {
            let target = Gpr::scalar_argument(position).expect("checked above");
            self.allocator.release_gpr(target, self.bc);
        }
        Ok(())
    }

    fn load(&mut self, dst: LocalId, src: Operand) -> Result<(), CodeGenError> {
        let dst_type = self.type_of_local(dst);
        if self.is_tuple(dst_type) {
            return self.load_aggregate(dst, dst_type, src);
        }
        match src {
            Operand::Ssa(id) => {
                let source = self.allocator.location_of(id);
                let target = self.allocator.allocate(dst, self.bc);
                self.copy(target, source);
                Ok(())
            }
            other => {
                let target = self.allocator.allocate(dst, self.bc);
                self.load_operand(target, other)
            }
        }
    }

    /// Materialize a tuple into a stack region, element by element.
    fn load_aggregate(&mut self, dst: LocalId, dst_type: TypeId, src: Operand) -> Result<(), CodeGenError> {
        let size = self.context.types.size_of(dst_type);
        let Location::Stack { offset: base } = self.allocator.allocate_stack_region(dst, size)
        else {
            unreachable!("stack regions are stack located");
        };

        match src {
            Operand::Constant(id) => {
                let Value::Tuple(elements) = self.context.constants.get(id).clone() else {
                    return Err(unsupported("scalar constant loaded as aggregate"));
                };
                for (position, element) in elements.iter().enumerate() {
                    let offset =
                        base + self.context.types.tuple_offset(dst_type, position as u32) as i32;
                    self.load_operand(Location::Stack { offset }, *element)?;
                }
                Ok(())
            }
            Operand::Ssa(id) => {
                let Location::Stack { offset: source } = self.allocator.location_of(id) else {
                    return Err(unsupported("aggregate outside memory"));
                };
                let scratch = self.allocator.acquire_any_gpr(self.bc);
                let mut chunk = 0i32;
                while chunk < size as i32 {
                    self.bc.append_mov(
                        X64Operand::Gpr(scratch),
                        X64Operand::Memory {
                            base: Gpr::Rbp,
                            offset: source + chunk,
                        },
                    );
                    self.bc.append_mov(
                        X64Operand::Memory {
                            base: Gpr::Rbp,
                            offset: base + chunk,
                        },
                        X64Operand::Gpr(scratch),
                    );
                    chunk += 8;
                }
                self.allocator.release_gpr(scratch, self.bc);
                Ok(())
            }
            _ => Err(unsupported("aggregate load source")),
        }
    }

    fn dot(&mut self, dst: LocalId, tuple: Operand, index: Operand) -> Result<(), CodeGenError> {
        let Operand::Immediate(Immediate::I32(index)) = index else {
            return Err(unsupported("non-immediate tuple index"));
        };
        let index = index as u32;

        match tuple {
            Operand::Ssa(id) => {
                let tuple_type = self.type_of_local(id);
                let Type::Tuple(element_types) = self.context.types.get(tuple_type) else {
                    return Err(unsupported("subscript of non-tuple"));
                };
                let element_type = element_types[index as usize];
                if self.is_tuple(element_type) {
                    return Err(unsupported("nested aggregate element"));
                }
                let Location::Stack { offset: base } = self.allocator.location_of(id) else {
                    return Err(unsupported("aggregate outside memory"));
                };
                let element = Location::Stack {
                    offset: base + self.context.types.tuple_offset(tuple_type, index) as i32,
                };
                let target = self.allocator.allocate(dst, self.bc);
                self.copy(target, element);
                Ok(())
            }
            Operand::Constant(id) => {
                let Value::Tuple(elements) = self.context.constants.get(id).clone() else {
                    return Err(unsupported("subscript of scalar constant"));
                };
                let element = elements[index as usize];
                let target = self.allocator.allocate(dst, self.bc);
                self.load_operand(target, element)
            }
            _ => Err(unsupported("subscript of immediate")),
        }
    }

    fn neg(&mut self, dst: LocalId, operand: Operand, index: u32) -> Result<(), CodeGenError> {
        // foldable forms never reach the backend
        let Operand::Ssa(id) = operand else {
            return Err(unsupported("negation of immediate"));
        };
        let target = self.allocator.allocate_from_active(dst, id, index, self.bc);
        self.bc.append_neg(target.operand());
        Ok(())
    }

    fn add(&mut self, dst: LocalId, lhs: Operand, rhs: Operand, index: u32) -> Result<(), CodeGenError> {
        match (lhs, rhs) {
            (Operand::Ssa(b), Operand::Ssa(c)) => {
                let b_location = self.allocator.location_of(b);
                let c_location = self.allocator.location_of(c);
                // keep the result in a register when either source is in
                // one; addition commutes so either side may host it
                if b_location.is_gpr() {
                    let target = self.allocator.allocate_from_active(dst, b, index, self.bc);
                    // b's old home still holds its value when c aliases b
                    let source = if c == b {
                        target
                    } else {
                        self.allocator.location_of(c)
                    };
                    self.bc.append_add(target.operand(), source.operand());
                } else if c_location.is_gpr() {
                    let target = self.allocator.allocate_from_active(dst, c, index, self.bc);
                    let source = self.allocator.location_of(b);
                    self.bc.append_add(target.operand(), source.operand());
                } else {
                    // both in memory: acquire a register for the result
                    // and move the longer-lived operand into it
                    let gpr = self.allocator.acquire_any_gpr(self.bc);
                    let target = self.allocator.allocate_to_gpr(dst, gpr, self.bc);
                    let b_allocation = self.allocator.allocation_of(b);
                    let c_allocation = self.allocator.allocation_of(c);
                    if b_allocation.lifetime.last_use <= c_allocation.lifetime.last_use {
                        self.bc
                            .append_mov(target.operand(), c_allocation.location.operand());
                        self.bc
                            .append_add(target.operand(), b_allocation.location.operand());
                    } else {
                        self.bc
                            .append_mov(target.operand(), b_allocation.location.operand());
                        self.bc
                            .append_add(target.operand(), c_allocation.location.operand());
                    }
                }
                Ok(())
            }
            (Operand::Ssa(b), other) => {
                let target = self.allocator.allocate_from_active(dst, b, index, self.bc);
                let (source, scratch) = self.arith_source(other)?;
                self.bc.append_add(target.operand(), source);
                self.release_scratch(scratch);
                Ok(())
            }
            (other, Operand::Ssa(c)) => {
                let target = self.allocator.allocate_from_active(dst, c, index, self.bc);
                let (source, scratch) = self.arith_source(other)?;
                self.bc.append_add(target.operand(), source);
                self.release_scratch(scratch);
                Ok(())
            }
            _ => Err(unsupported("foldable addition")),
        }
    }

    fn sub(&mut self, dst: LocalId, lhs: Operand, rhs: Operand, index: u32) -> Result<(), CodeGenError> {
        match (lhs, rhs) {
            (Operand::Ssa(b), Operand::Ssa(c)) => {
                let b_location = self.allocator.location_of(b);
                let c_location = self.allocator.location_of(c);
                // subtraction does not commute: the result always hosts B
                if b_location.is_gpr() || c_location.is_gpr() {
                    let target = self.allocator.allocate_from_active(dst, b, index, self.bc);
                    let source = if c == b {
                        target
                    } else {
                        self.allocator.location_of(c)
                    };
                    self.bc.append_sub(target.operand(), source.operand());
                } else {
                    let gpr = self.allocator.acquire_any_gpr(self.bc);
                    let target = self.allocator.allocate_to_gpr(dst, gpr, self.bc);
                    let b_location = self.allocator.location_of(b);
                    self.bc.append_mov(target.operand(), b_location.operand());
                    let c_location = self.allocator.location_of(c);
                    self.bc.append_sub(target.operand(), c_location.operand());
                }
                Ok(())
            }
            (Operand::Ssa(b), other) => {
                let target = self.allocator.allocate_from_active(dst, b, index, self.bc);
                let (source, scratch) = self.arith_source(other)?;
                self.bc.append_sub(target.operand(), source);
                self.release_scratch(scratch);
                Ok(())
            }
            (other, Operand::Ssa(c)) => {
                // no subtract form takes an immediate minuend: move it
                // into the result's register first
                let gpr = self.allocator.acquire_any_gpr(self.bc);
                self.load_operand(Location::Gpr(gpr), other)?;
                let target = self.allocator.allocate_to_gpr(dst, gpr, self.bc);
                let source = self.allocator.location_of(c);
                self.bc.append_sub(target.operand(), source.operand());
                Ok(())
            }
            _ => Err(unsupported("foldable subtraction")),
        }
    }

    fn mul(&mut self, dst: LocalId, lhs: Operand, rhs: Operand, index: u32) -> Result<(), CodeGenError> {
        // imul's one-operand form multiplies by rax into rdx:rax, so one
        // multiplicand must reach rax and rdx must be vacated
        match (lhs, rhs) {
            (Operand::Ssa(b), Operand::Ssa(c)) => {
                let rax = Location::Gpr(Gpr::Rax);
                if self.allocator.location_of(b) == rax {
                    self.allocator.allocate_from_active(dst, b, index, self.bc);
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                    // when c aliases b its value is the one sitting in rax
                    let source = if c == b {
                        rax
                    } else {
                        self.allocator.location_of(c)
                    };
                    self.bc.append_imul(source.operand());
                } else if self.allocator.location_of(c) == rax {
                    self.allocator.allocate_from_active(dst, c, index, self.bc);
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                    let source = self.allocator.location_of(b);
                    self.bc.append_imul(source.operand());
                } else {
                    self.allocator.allocate_to_gpr(dst, Gpr::Rax, self.bc);
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                    let b_allocation = self.allocator.allocation_of(b);
                    let c_allocation = self.allocator.allocation_of(c);
                    if b_allocation.lifetime.last_use <= c_allocation.lifetime.last_use {
                        self.bc
                            .append_mov(X64Operand::Gpr(Gpr::Rax), b_allocation.location.operand());
                        self.bc.append_imul(c_allocation.location.operand());
                    } else {
                        self.bc
                            .append_mov(X64Operand::Gpr(Gpr::Rax), c_allocation.location.operand());
                        self.bc.append_imul(b_allocation.location.operand());
                    }
                }
                Ok(())
            }
            (Operand::Ssa(b), other) | (other, Operand::Ssa(b)) => {
                let value = self.operand_scalar(other)?;
                if self.allocator.location_of(b) == Location::Gpr(Gpr::Rax) {
                    self.allocator.allocate_from_active(dst, b, index, self.bc);
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(value));
                    self.bc.append_imul(X64Operand::Gpr(Gpr::Rdx));
                } else {
                    self.allocator.allocate_to_gpr(dst, Gpr::Rax, self.bc);
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rax), X64Operand::Immediate(value));
                    let source = self.allocator.location_of(b);
                    self.bc.append_imul(source.operand());
                }
                Ok(())
            }
            _ => Err(unsupported("foldable multiplication")),
        }
    }

    fn div(&mut self, dst: LocalId, lhs: Operand, rhs: Operand, index: u32) -> Result<(), CodeGenError> {
        // idiv divides rdx:rax by its operand, quotient in rax
        match (lhs, rhs) {
            (Operand::Ssa(b), Operand::Ssa(c)) => {
                let rax = Location::Gpr(Gpr::Rax);
                if self.allocator.location_of(b) == rax {
                    self.allocator.allocate_from_active(dst, b, index, self.bc);
                    self.allocator.acquire_gpr(Gpr::Rdx, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                    let source = if c == b {
                        rax
                    } else {
                        self.allocator.location_of(c)
                    };
                    self.bc.append_idiv(source.operand());
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                } else {
                    self.allocator.acquire_gpr(Gpr::Rdx, self.bc);
                    if self.allocator.location_of(c) == rax {
                        // the divisor may not sit in the dividend register
                        self.allocator.reallocate_active(c, self.bc);
                    }
                    self.allocator.allocate_to_gpr(dst, Gpr::Rax, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                    let b_location = self.allocator.location_of(b);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rax), b_location.operand());
                    let c_location = self.allocator.location_of(c);
                    self.bc.append_idiv(c_location.operand());
                    self.allocator.release_gpr(Gpr::Rdx, self.bc);
                }
                Ok(())
            }
            (Operand::Ssa(b), other) => {
                // the divisor may not be immediate: stage it in a
                // register, before rax is bound so the staging spill can
                // never displace the result
                let divisor = self.allocator.acquire_any_gpr(self.bc);
                self.load_operand(Location::Gpr(divisor), other)?;
                self.allocator.allocate_to_gpr(dst, Gpr::Rax, self.bc);
                let b_location = self.allocator.location_of(b);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rax), b_location.operand());
                self.allocator.acquire_gpr(Gpr::Rdx, self.bc);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                self.bc.append_idiv(X64Operand::Gpr(divisor));
                self.allocator.release_gpr(divisor, self.bc);
                self.allocator.release_gpr(Gpr::Rdx, self.bc);
                Ok(())
            }
            (other, Operand::Ssa(c)) => {
                self.allocator.acquire_gpr(Gpr::Rdx, self.bc);
                if self.allocator.location_of(c) == Location::Gpr(Gpr::Rax) {
                    self.allocator.reallocate_active(c, self.bc);
                }
                self.allocator.allocate_to_gpr(dst, Gpr::Rax, self.bc);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                self.load_operand(Location::Gpr(Gpr::Rax), other)?;
                let c_location = self.allocator.location_of(c);
                self.bc.append_idiv(c_location.operand());
                self.allocator.release_gpr(Gpr::Rdx, self.bc);
                Ok(())
            }
            _ => Err(unsupported("foldable division")),
        }
    }

    fn modulus(&mut self, dst: LocalId, lhs: Operand, rhs: Operand) -> Result<(), CodeGenError> {
        // as div, but the remainder lands in rdx, so the result is bound
        // there and rax becomes the staging register for the dividend
        match (lhs, rhs) {
            (Operand::Ssa(b), Operand::Ssa(c)) => {
                let rax = Location::Gpr(Gpr::Rax);
                if self.allocator.location_of(b) == rax {
                    self.allocator.allocate_to_gpr(dst, Gpr::Rdx, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                    let source = self.allocator.location_of(c);
                    self.bc.append_idiv(source.operand());
                } else {
                    self.allocator.allocate_to_gpr(dst, Gpr::Rdx, self.bc);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                    if self.allocator.location_of(c) == rax {
                        self.allocator.reallocate_active(c, self.bc);
                    }
                    self.allocator.acquire_gpr(Gpr::Rax, self.bc);
                    let b_location = self.allocator.location_of(b);
                    self.bc
                        .append_mov(X64Operand::Gpr(Gpr::Rax), b_location.operand());
                    let c_location = self.allocator.location_of(c);
                    self.bc.append_idiv(c_location.operand());
                    self.allocator.release_gpr(Gpr::Rax, self.bc);
                }
                Ok(())
            }
            (Operand::Ssa(b), other) => {
                let divisor = self.allocator.acquire_any_gpr(self.bc);
                self.load_operand(Location::Gpr(divisor), other)?;
                self.allocator.allocate_to_gpr(dst, Gpr::Rdx, self.bc);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                self.allocator.acquire_gpr(Gpr::Rax, self.bc);
                let b_location = self.allocator.location_of(b);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rax), b_location.operand());
                self.bc.append_idiv(X64Operand::Gpr(divisor));
                self.allocator.release_gpr(divisor, self.bc);
                self.allocator.release_gpr(Gpr::Rax, self.bc);
                Ok(())
            }
            (other, Operand::Ssa(c)) => {
                self.allocator.allocate_to_gpr(dst, Gpr::Rdx, self.bc);
                self.bc
                    .append_mov(X64Operand::Gpr(Gpr::Rdx), X64Operand::Immediate(0));
                if self.allocator.location_of(c) == Location::Gpr(Gpr::Rax) {
                    self.allocator.reallocate_active(c, self.bc);
                }
                self.allocator.acquire_gpr(Gpr::Rax, self.bc);
                self.load_operand(Location::Gpr(Gpr::Rax), other)?;
                let c_location = self.allocator.location_of(c);
                self.bc.append_idiv(c_location.operand());
                self.allocator.release_gpr(Gpr::Rax, self.bc);
                Ok(())
            }
            _ => Err(unsupported("foldable remainder")),
        }
    }

    /// The numeric payload of an immediate or scalar constant operand.
    fn operand_scalar(&self, operand: Operand) -> Result<i64, CodeGenError> {
        match operand {
            Operand::Immediate(immediate) => immediate_i64(immediate),
            Operand::Constant(id) => scalar_value(self.context.constants.get(id))
                .ok_or_else(|| unsupported("aggregate constant in arithmetic")),
            _ => Err(unsupported("non-scalar operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expc_ir::{GlobalKind, Options};
    use expc_par::parse_source;
    use expc_sem::{analyze_lifetimes_of_locals, infer_types_of_locals, validate_function};
    use std::path::Path;

    /// Parse, analyze and lower every function, returning the printed
    /// assembly of all of them in declaration order.
    fn lower(source: &str) -> String {
        let mut context = Context::new(Options::default(), Path::new("test.exp"), None);
        parse_source(source, &mut context).expect("parse failure");
        let mut printed = String::new();
        for name in context.declaration_order.clone() {
            let mut global = context.symbols.remove(name).expect("global");
            let GlobalKind::Function(function) = &mut global.kind else {
                panic!("not a function");
            };
            infer_types_of_locals(function, &mut context).expect("inference failure");
            analyze_lifetimes_of_locals(function, &context);
            validate_function(function, &mut context).expect("validation failure");
            global.ty = Some(expc_sem::function_type(function, &mut context));
            let body = codegen_function(function, &context).expect("codegen failure");
            body.bytecode.print(&mut printed, &context);
            context.symbols.insert(global);
        }
        printed
    }

    #[test]
    fn test_return_immediate() {
        let asm = lower("fn main() { return 0; }");
        assert_eq!(
            asm,
            "\tpushq %rbp\n\tmovq %rsp, %rbp\n\tmovq $0, %rax\n\tmovq %rbp, %rsp\n\tpopq %rbp\n\tret\n"
        );
    }

    #[test]
    fn test_addition_coalesces_into_register() {
        let asm = lower("fn main() { const x = 1; const y = 1; return x + y; }");
        // x and y land in rax/rbx; the add reuses x's register and the
        // result is already in rax at the return
        assert!(asm.contains("movq $1, %rax"));
        assert!(asm.contains("movq $1, %rbx"));
        assert!(asm.contains("addq %rbx, %rax"));
        let epilogue = asm.find("movq %rbp, %rsp").unwrap();
        assert!(!asm[..epilogue].contains("movq %rax, %rax"));
    }

    #[test]
    fn test_division_discipline() {
        let asm = lower("fn main() { const x = 9; const y = 3; return x / y; }");
        // dividend in rax, rdx zeroed, divisor untouched
        assert!(asm.contains("movq $0, %rdx"));
        assert!(asm.contains("idivq %rbx"));
    }

    #[test]
    fn test_division_by_immediate_stages_divisor() {
        let asm = lower("fn main() { const x = 18; return x / 3; }");
        // the immediate divisor must first reach a register
        assert!(asm.contains("movq $3, %"));
        assert!(asm.contains("idivq %"));
        assert!(!asm.contains("idivq $"));
    }

    #[test]
    fn test_modulus_result_from_rdx() {
        let asm = lower("fn main() { const x = 7; const y = 3; return x % y; }");
        assert!(asm.contains("idivq"));
        // the remainder is returned, so rdx flows to rax at the return
        assert!(asm.contains("movq %rdx, %rax"));
    }

    #[test]
    fn test_multiplication_binds_rax() {
        let asm = lower("fn main() { const x = 2; const y = 4; return x * y; }");
        assert!(asm.contains("imulq"));
        // one multiplicand is staged into rax before the imul when
        // neither already lives there
        assert!(asm.contains("movq $2, %rax") || asm.contains("imulq %rbx"));
    }

    #[test]
    fn test_subtraction_order() {
        let asm = lower("fn main() { const x = 9; const y = 3; return x - y; }");
        // x - y: y is subtracted from x's home
        assert!(asm.contains("subq %rbx, %rax"));
    }

    #[test]
    fn test_immediate_minuend_staged() {
        let asm = lower("fn main() { const y = 3; return 10 - y; }");
        // no subtract form takes an immediate minuend
        assert!(asm.contains("movq $10, %"));
        assert!(asm.contains("subq %rax, %"));
    }

    #[test]
    fn test_call_sequence() {
        let asm = lower("fn f() { return 25; } fn main() { return f() + f(); }");
        assert_eq!(asm.matches("call f").count(), 2);
        // the first result is moved out of rax before the second call
        assert!(asm.contains("movq %rax, %rbx"));
        assert!(asm.contains("addq %rax, %rbx") || asm.contains("addq %rbx, %rax"));
    }

    #[test]
    fn test_call_arguments_in_sysv_registers() {
        let asm = lower("fn f(x: i64, y: i64) { return x + y; } fn main() { return f(1, 2); }");
        assert!(asm.contains("movq $1, %rdi"));
        assert!(asm.contains("movq $2, %rsi"));
        assert!(asm.contains("call f"));
    }

    #[test]
    fn test_tuple_load_and_subscript() {
        let asm = lower("fn main() { const x = (2, 4); return x.0 * x.1; }");
        // the tuple is materialized element by element below rbp
        assert!(asm.contains("movq $2, -16(%rbp)"));
        assert!(asm.contains("movq $4, -8(%rbp)"));
        // elements are read back from memory
        assert!(asm.contains("movq -16(%rbp), %"));
        assert!(asm.contains("movq -8(%rbp), %"));
        assert!(asm.contains("imulq"));
        // the frame reserves the tuple region
        assert!(asm.contains("subq $16, %rsp"));
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let asm = lower("fn main() { return 255; }");
        assert!(asm.starts_with("\tpushq %rbp\n\tmovq %rsp, %rbp\n"));
        assert!(asm.ends_with("\tmovq %rbp, %rsp\n\tpopq %rbp\n\tret\n"));
    }

    #[test]
    fn test_frame_size_only_when_needed() {
        let asm = lower("fn main() { return 0; }");
        assert!(!asm.contains("subq $"));
    }

    #[test]
    fn test_spill_when_registers_exhausted() {
        // fifteen simultaneously live locals overflow the fourteen
        // allocatable registers
        let mut source = String::from("fn main() { ");
        for i in 0..15 {
            source.push_str(&format!("const x{i} = {i}; "));
        }
        source.push_str("return x0 + x1 + x2 + x3 + x4 + x5 + x6 + x7");
        source.push_str(" + x8 + x9 + x10 + x11 + x12 + x13 + x14; }");
        let asm = lower(&source);
        assert!(asm.contains("(%rbp)"));
        assert!(asm.contains("subq $8, %rsp"));
    }

    #[test]
    fn test_argument_preserved_across_negation() {
        let asm = lower("fn f(x: i32) { return -x; } fn main() { return f(5); }");
        // x lives in rdi for the whole function, so the negation works
        // on a copy
        assert!(asm.contains("negq"));
    }
}
