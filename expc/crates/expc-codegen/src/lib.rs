//! expc-codegen - x86-64 backend
//!
//! Takes validated SSA functions and produces GNU `as` (AT&T syntax)
//! assembly for a System V AMD64 target, then drives the external
//! assembler and linker. Register allocation is not a separate pass:
//! the linear-scan allocator is consulted instruction by instruction
//! while code is selected, so allocation decisions and the emitted
//! instruction stream are always consistent.

mod assemble;
mod emit;
mod error;
mod x64;

pub use assemble::{Assembler, Linker};
pub use emit::{directives, emit_x86_64_assembly, VERSION_STRING};
pub use error::CodeGenError;
pub use x64::allocator::{ActiveAllocation, Allocator, Location};
pub use x64::bytecode::{X64Bytecode, X64Instruction, X64Operand};
pub use x64::codegen::{codegen_function, X64FunctionBody};
pub use x64::gprp::GprPool;
pub use x64::registers::{Gpr, Width};
