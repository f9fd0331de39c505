//! Assembly file emission.
//!
//! Renders every defined function, in declaration order, as GNU `as`
//! (AT&T) text: file prologue, per-symbol directives and instructions,
//! file epilogue. When the driver is producing an executable without an
//! installed runtime, a minimal `_start` is appended that calls `main`
//! and feeds its result to the exit syscall.

use expc_ir::{Context, GlobalKind};

use crate::error::CodeGenError;
use crate::x64::codegen::codegen_function;

pub const VERSION_STRING: &str = concat!("expc ", env!("CARGO_PKG_VERSION"));

/// GAS directive printers.
pub mod directives {
    use std::fmt::Write;

    pub fn file(buffer: &mut String, path: &str) {
        let _ = writeln!(buffer, "\t.file \"{path}\"");
    }

    pub fn arch(buffer: &mut String, cpu_type: &str) {
        let _ = writeln!(buffer, "\t.arch {cpu_type}");
    }

    pub fn ident(buffer: &mut String, comment: &str) {
        let _ = writeln!(buffer, "\t.ident \"{comment}\"");
    }

    /// Marks the stack non-executable in the resulting object.
    pub fn noexecstack(buffer: &mut String) {
        buffer.push_str("\t.section .note.GNU-stack,\"\",@progbits\n");
    }

    pub fn text(buffer: &mut String) {
        buffer.push_str("\t.text\n");
    }

    pub fn globl(buffer: &mut String, name: &str) {
        let _ = writeln!(buffer, "\t.globl {name}");
    }

    pub fn type_function(buffer: &mut String, name: &str) {
        let _ = writeln!(buffer, "\t.type {name}, @function");
    }

    pub fn type_object(buffer: &mut String, name: &str) {
        let _ = writeln!(buffer, "\t.type {name}, @object");
    }

    pub fn label(buffer: &mut String, name: &str) {
        let _ = writeln!(buffer, "{name}:");
    }

    /// `.size name, .-name`: the distance from the label to here.
    pub fn size_label_relative(buffer: &mut String, name: &str) {
        let _ = writeln!(buffer, "\t.size {name}, .-{name}");
    }

    pub fn balign(buffer: &mut String, alignment: u64) {
        let _ = writeln!(buffer, "\t.balign {alignment}");
    }

    pub fn quad(buffer: &mut String, value: i64) {
        let _ = writeln!(buffer, "\t.quad {value}");
    }

    pub fn byte(buffer: &mut String, value: u8) {
        let _ = writeln!(buffer, "\t.byte {value}");
    }

    pub fn zero(buffer: &mut String, bytes: u64) {
        let _ = writeln!(buffer, "\t.zero {bytes}");
    }

    pub fn string(buffer: &mut String, value: &str) {
        let _ = writeln!(buffer, "\t.string \"{value}\"");
    }
}

/// Lower and print every defined global.
///
/// `start_stub` appends the `_start` entry point; the driver sets it
/// when linking an executable without the runtime libraries.
pub fn emit_x86_64_assembly(context: &Context, start_stub: bool) -> Result<String, CodeGenError> {
    let mut buffer = String::new();
    directives::file(&mut buffer, &context.source_path().display().to_string());
    buffer.push('\n');

    for &name in &context.declaration_order {
        let Some(global) = context.symbols.lookup(name) else {
            continue;
        };
        let GlobalKind::Function(function) = &global.kind else {
            continue;
        };
        let body = codegen_function(function, context)?;

        directives::text(&mut buffer);
        directives::globl(&mut buffer, name.as_str());
        directives::type_function(&mut buffer, name.as_str());
        directives::label(&mut buffer, name.as_str());
        body.bytecode.print(&mut buffer, context);
        directives::size_label_relative(&mut buffer, name.as_str());
        buffer.push('\n');
    }

    if start_stub {
        emit_start_stub(&mut buffer);
    }

    directives::ident(&mut buffer, VERSION_STRING);
    directives::noexecstack(&mut buffer);
    Ok(buffer)
}

/// The process entry point: call `main`, pass its result to `exit(2)`.
fn emit_start_stub(buffer: &mut String) {
    directives::text(buffer);
    directives::globl(buffer, "_start");
    directives::type_function(buffer, "_start");
    directives::label(buffer, "_start");
    buffer.push_str("\tcall main\n");
    buffer.push_str("\tmovq %rax, %rdi\n");
    buffer.push_str("\tmovq $60, %rax\n");
    buffer.push_str("\tsyscall\n");
    directives::size_label_relative(buffer, "_start");
    buffer.push('\n');
}
