//! expc-ir - SSA intermediate representation and compilation environment
//!
//! The data model every phase of the compiler works against:
//!
//! - interned [`Type`]s behind [`TypeId`] handles,
//! - the deduplicating [`Constants`] pool and [`Labels`] table,
//! - the function-level SSA IR ([`Operand`], [`Instruction`], [`Block`],
//!   [`Local`], [`Lifetime`], [`Function`]),
//! - the open-addressed [`SymbolTable`] of [`Global`]s,
//! - the [`Context`] that owns all of the above for one compilation,
//! - the [`CompileError`]/[`ErrorCode`] channel semantic analysis reports
//!   through.
//!
//! The parser produces this IR; type inference, lifetime analysis and the
//! validator annotate and check it; codegen consumes it. SSA numbering is
//! dense from zero within each function, and a block index doubles as the
//! timestamp lifetimes are measured in.

mod context;
mod emit;
mod error;
mod function;
mod instruction;
mod labels;
mod symbol_table;
mod types;
mod value;

pub use context::{Context, Options};
pub use emit::emit_ir;
pub use error::{CompileError, ErrorCode};
pub use function::{Block, Function, Lifetime, Local, LocalId};
pub use instruction::{Immediate, Instruction, Opcode, Operand};
pub use labels::{LabelId, Labels};
pub use symbol_table::{Global, GlobalKind, SymbolTable};
pub use types::{Type, TypeId, TypeInterner};
pub use value::{ConstantId, Constants, Value};
