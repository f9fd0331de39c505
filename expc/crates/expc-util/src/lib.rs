//! expc-util - Foundation types for the exp compiler
//!
//! This crate holds the small, dependency-light building blocks every other
//! phase leans on:
//!
//! - [`Symbol`]: a 4-byte handle to an interned string. Identifiers, keywords
//!   and global names are interned once in a process-wide table, so equality
//!   is an integer comparison and every phase can pass names around by value.
//! - [`IndexVec`] and [`Idx`]: vectors with typed indices. The compiler works
//!   with several dense index spaces (SSA locals, types, constants, labels)
//!   and the newtype indices keep them from being mixed up.
//! - [`Bitset16`]: a fixed 16-bit bitset, one bit per x86-64 general purpose
//!   register.
//! - [`int`]: range predicates for the sized integer types of the source
//!   language.

mod bitset;
mod index_vec;
pub mod int;
mod symbol;

pub use bitset::Bitset16;
pub use index_vec::{Idx, IndexVec};
pub use symbol::{InternerStats, Symbol};
