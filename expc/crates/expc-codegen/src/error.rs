//! Backend error type.

use thiserror::Error;

use expc_ir::{CompileError, ErrorCode};

#[derive(Debug, Error)]
pub enum CodeGenError {
    /// Well-typed IR the backend cannot lower yet (aggregate returns,
    /// stack-passed arguments, nested aggregates).
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// An immediate too wide for any target encoding.
    #[error("immediate {0} out of range for the target encoding")]
    ImmediateOutOfRange(i128),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The external assembler or linker reported failure.
    #[error("{tool} failed with status {status}")]
    ToolFailed { tool: &'static str, status: i32 },

    /// The external assembler or linker is not installed.
    #[error("{tool} not found in PATH")]
    ToolMissing { tool: &'static str },
}

impl CodeGenError {
    /// The diagnostic form of the failures the pipeline reports through
    /// the context's current-error slot. Range errors are compile
    /// failures; tool and io failures stay outside the slot.
    pub fn diagnostic(&self) -> Option<CompileError> {
        match self {
            CodeGenError::ImmediateOutOfRange(value) => Some(CompileError::new(
                ErrorCode::ImmediateOutOfRange,
                format!("Immediate: [{value}]"),
            )),
            _ => None,
        }
    }
}
