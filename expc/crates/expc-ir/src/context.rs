//! The compilation context.
//!
//! One `Context` per compilation, owning the type interner, constants
//! pool, label table and symbol table, plus the option flags and the
//! single current-error slot. Interners are destroyed last, so everything
//! that borrows an interned type or name outlives its users.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

use expc_util::Symbol;

use crate::error::CompileError;
use crate::labels::Labels;
use crate::symbol_table::SymbolTable;
use crate::types::TypeInterner;
use crate::value::Constants;

bitflags! {
    /// What the driver asked the pipeline to produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Options: u8 {
        const EMIT_IR_ASSEMBLY      = 1 << 0;
        const EMIT_X86_64_ASSEMBLY  = 1 << 1;
        const CREATE_ELF_OBJECT     = 1 << 2;
        const CREATE_ELF_EXECUTABLE = 1 << 3;
        /// Remove the intermediate `.s` once the object exists.
        const CLEANUP_ASSEMBLY      = 1 << 4;
        /// Remove the intermediate `.o` once the executable exists.
        const CLEANUP_OBJECT        = 1 << 5;
    }
}

pub struct Context {
    pub options: Options,
    pub current_error: Option<CompileError>,
    pub types: TypeInterner,
    pub constants: Constants,
    pub labels: Labels,
    pub symbols: SymbolTable,
    /// Global names in source order. The symbol table iterates in probe
    /// order, which would make emitted assembly depend on hash layout;
    /// every walk that reaches the output goes through this list instead.
    pub declaration_order: Vec<Symbol>,
    source_path: PathBuf,
    output_path: PathBuf,
}

impl Context {
    pub fn new(options: Options, source_path: &Path, output_path: Option<&Path>) -> Self {
        let output_path = match output_path {
            Some(path) => path.to_path_buf(),
            // default output path: the source path with its extension
            // stripped
            None => source_path.with_extension(""),
        };
        Self {
            options,
            current_error: None,
            types: TypeInterner::new(),
            constants: Constants::new(),
            labels: Labels::new(),
            symbols: SymbolTable::new(),
            declaration_order: Vec::new(),
            source_path: source_path.to_path_buf(),
            output_path,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn ir_path(&self) -> PathBuf {
        self.output_path.with_extension("ir")
    }

    pub fn assembly_path(&self) -> PathBuf {
        self.output_path.with_extension("s")
    }

    pub fn object_path(&self) -> PathBuf {
        self.output_path.with_extension("o")
    }

    /// Record `error` as the current error. Later writes overwrite
    /// earlier ones.
    pub fn record_error(&mut self, error: CompileError) {
        self.current_error = Some(error);
    }

    pub fn has_error(&self) -> bool {
        self.current_error.is_some()
    }
}
