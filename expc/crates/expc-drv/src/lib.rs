//! expc-drv - Compiler driver
//!
//! Orchestrates the pipeline: read source, parse into the context, run
//! the analysis passes per function in declaration order, then emit
//! whatever the option flags ask for (IR text, assembly, object,
//! executable), invoking the external assembler and linker for the
//! later stages. Intermediate files are removed on success unless they
//! were requested explicitly.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Parser};

use expc_codegen::{emit_x86_64_assembly, Assembler, Linker};
use expc_ir::{emit_ir, CompileError, Context, GlobalKind, Options};
use expc_par::parse_source;
use expc_sem::{analyze_lifetimes_of_locals, function_type, infer_types_of_locals, validate_function};

/// Directory holding the `exp` runtime libraries, when installed.
pub const RUNTIME_DIR_VAR: &str = "EXPC_RUNTIME_DIR";

#[derive(Parser, Debug)]
#[command(
    name = "expc",
    version = expc_codegen::VERSION_STRING,
    disable_version_flag = true,
    about = "compiler for the exp language"
)]
pub struct Config {
    /// Source file to compile
    pub source: PathBuf,

    /// Output path; derived from the source path when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit the IR form only
    #[arg(short = 'i', long = "emit-ir")]
    pub emit_ir: bool,

    /// Emit x86-64 assembly
    #[arg(short = 's', long = "emit-assembly")]
    pub emit_assembly: bool,

    /// Produce an ELF object
    #[arg(short = 'c', long = "object")]
    pub create_object: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,
}

impl Config {
    /// The context option set this invocation asks for. Producing an
    /// executable is the default, and implies cleaning up whichever
    /// intermediates were not requested for their own sake.
    pub fn options(&self) -> Options {
        let mut options = Options::empty();
        if self.emit_ir {
            options |= Options::EMIT_IR_ASSEMBLY;
        }
        if self.emit_assembly {
            options |= Options::EMIT_X86_64_ASSEMBLY;
        }
        if self.create_object {
            options |= Options::CREATE_ELF_OBJECT;
        }
        if !(self.emit_ir || self.emit_assembly || self.create_object) {
            options |= Options::CREATE_ELF_EXECUTABLE | Options::CLEANUP_OBJECT;
        }
        if options.intersects(Options::CREATE_ELF_OBJECT | Options::CREATE_ELF_EXECUTABLE)
            && !self.emit_assembly
        {
            options |= Options::CLEANUP_ASSEMBLY;
        }
        options
    }
}

/// Parse the command line and compile.
pub fn main() -> Result<()> {
    let config = Config::parse();
    run(&config)
}

pub fn run(config: &Config) -> Result<()> {
    let mut session = Session::new(config);
    let result = session.compile();
    if let Err(error) = result {
        // compile failures land in the context's single current-error
        // slot; report from there so the diagnostic code reaches the
        // user. Failures outside the slot (io, missing tools) pass
        // through unchanged.
        return Err(match session.context.current_error.take() {
            Some(diagnostic) => anyhow::Error::new(diagnostic),
            None => error,
        });
    }
    Ok(())
}

pub struct Session {
    pub context: Context,
    linker: Linker,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let context = Context::new(config.options(), &config.source, config.output.as_deref());
        let runtime_dir = std::env::var_os(RUNTIME_DIR_VAR).map(PathBuf::from);
        Self {
            context,
            linker: Linker::new(runtime_dir),
        }
    }

    pub fn compile(&mut self) -> Result<()> {
        let source_path = self.context.source_path().to_path_buf();
        let source = fs::read_to_string(&source_path)
            .with_context(|| format!("reading {}", source_path.display()))?;

        if let Err(error) = parse_source(&source, &mut self.context) {
            return self.fail(error);
        }
        self.analyze()?;

        let options = self.context.options;
        if options.contains(Options::EMIT_IR_ASSEMBLY) {
            fs::write(self.context.ir_path(), emit_ir(&self.context))?;
        }

        let needs_assembly = options.intersects(
            Options::EMIT_X86_64_ASSEMBLY
                | Options::CREATE_ELF_OBJECT
                | Options::CREATE_ELF_EXECUTABLE,
        );
        if !needs_assembly {
            return Ok(());
        }

        let start_stub =
            options.contains(Options::CREATE_ELF_EXECUTABLE) && !self.linker.has_runtime();
        let assembly = match emit_x86_64_assembly(&self.context, start_stub) {
            Ok(assembly) => assembly,
            // range errors are compile failures and travel through the
            // error slot like any semantic failure
            Err(error) => match error.diagnostic() {
                Some(diagnostic) => return self.fail(diagnostic),
                None => return Err(error.into()),
            },
        };
        fs::write(self.context.assembly_path(), assembly)?;

        if options.intersects(Options::CREATE_ELF_OBJECT | Options::CREATE_ELF_EXECUTABLE) {
            Assembler::new().assemble(&self.context.assembly_path(), &self.context.object_path())?;
        }
        if options.contains(Options::CREATE_ELF_EXECUTABLE) {
            self.linker
                .link(&self.context.object_path(), self.context.output_path())?;
        }

        if options.contains(Options::CLEANUP_ASSEMBLY) {
            let _ = fs::remove_file(self.context.assembly_path());
        }
        if options.contains(Options::CLEANUP_OBJECT) {
            let _ = fs::remove_file(self.context.object_path());
        }
        Ok(())
    }

    /// Run inference, lifetime analysis and validation over every
    /// function, in declaration order. Each function is detached from
    /// the symbol table while its passes borrow the context.
    fn analyze(&mut self) -> Result<()> {
        for name in self.context.declaration_order.clone() {
            let mut global = self
                .context
                .symbols
                .remove(name)
                .expect("declared global missing from symbol table");
            if let GlobalKind::Function(function) = &mut global.kind {
                let analysis = infer_types_of_locals(function, &mut self.context).and_then(|()| {
                    analyze_lifetimes_of_locals(function, &self.context);
                    validate_function(function, &mut self.context)
                });
                match analysis {
                    Ok(()) => global.ty = Some(function_type(function, &mut self.context)),
                    Err(error) => {
                        self.context.symbols.insert(global);
                        return self.fail(error);
                    }
                }
            }
            self.context.symbols.insert(global);
        }
        Ok(())
    }

    fn fail(&mut self, error: CompileError) -> Result<()> {
        self.context.record_error(error.clone());
        bail!("{error}");
    }
}
