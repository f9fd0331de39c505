//! Semantic error reporting.
//!
//! Analysis failures carry one of a closed set of codes plus a rendered
//! message. The context holds a single `current_error` slot; a later
//! write overwrites an earlier one, which loses nothing because the
//! pipeline stops at the first failing stage.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("TYPECHECK_TYPE_MISMATCH")]
    TypeMismatch,
    #[error("TYPECHECK_TYPE_NOT_CALLABLE")]
    TypeNotCallable,
    #[error("TYPECHECK_TYPE_NOT_INDEXABLE")]
    TypeNotIndexable,
    #[error("TYPECHECK_TUPLE_INDEX_NOT_IMMEDIATE")]
    TupleIndexNotImmediate,
    #[error("TYPECHECK_TUPLE_INDEX_OUT_OF_BOUNDS")]
    TupleIndexOutOfBounds,
    #[error("TYPECHECK_RETURN_TYPE_UNKNOWN")]
    ReturnTypeUnknown,
    #[error("TYPECHECK_UNDEFINED_SYMBOL")]
    UndefinedSymbol,
    #[error("EVAL_INTEGER_OVERFLOW")]
    IntegerOverflow,
    #[error("EVAL_DIVISION_BY_ZERO")]
    DivisionByZero,
    #[error("CODEGEN_IMMEDIATE_OUT_OF_RANGE")]
    ImmediateOutOfRange,
    #[error("VALIDATE_MALFORMED_IR")]
    MalformedIr,
    #[error("PARSE_ERROR")]
    Parse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CompileError {
    pub code: ErrorCode,
    pub message: String,
}

impl CompileError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorCode::TypeMismatch,
            format!("Expected type: [{expected}] Actual type: [{actual}]"),
        )
    }

    pub fn undefined_symbol(name: &str) -> Self {
        Self::new(ErrorCode::UndefinedSymbol, format!("Name: [{name}]"))
    }
}
