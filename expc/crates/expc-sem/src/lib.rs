//! expc-sem - Semantic analysis
//!
//! Three passes run over each parsed function, in order:
//!
//! 1. [`infer_types_of_locals`] assigns a type to every SSA local and to
//!    the function's return type.
//! 2. [`analyze_lifetimes_of_locals`] computes `first_use`/`last_use` for
//!    every SSA local by a single forward walk of the block.
//! 3. [`validate_function`] rejects malformed IR before it reaches the
//!    backend.
//!
//! The driver detaches the function from the symbol table while a pass
//! runs, so the passes can borrow the rest of the context freely (the
//! symbol table is still consulted for callee types).

mod infer;
mod lifetimes;
mod type_of;
mod validate;

pub use infer::infer_types_of_locals;
pub use lifetimes::analyze_lifetimes_of_locals;
pub use validate::validate_function;

use expc_ir::{Context, Function, TypeId};

/// The interned function type of an analyzed function, for its symbol
/// table entry.
///
/// # Panics
///
/// Panics when called before type inference has run.
pub fn function_type(function: &Function, context: &mut Context) -> TypeId {
    let return_type = function
        .return_type
        .expect("function type requested before inference");
    let arguments = function
        .arguments
        .iter()
        .map(|&argument| {
            function
                .local(argument)
                .ty
                .expect("argument untyped after inference")
        })
        .collect();
    context.types.function(return_type, arguments)
}
