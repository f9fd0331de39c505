//! Textual IR emitter, behind the driver's `-i` flag.

use std::fmt::Write;

use crate::context::Context;
use crate::function::Function;
use crate::instruction::{Instruction, Operand};
use crate::symbol_table::GlobalKind;
use crate::value::Value;

/// Render every defined global in declaration order.
pub fn emit_ir(context: &Context) -> String {
    let mut out = String::new();
    for &name in &context.declaration_order {
        let Some(global) = context.symbols.lookup(name) else {
            continue;
        };
        let GlobalKind::Function(function) = &global.kind else {
            continue;
        };
        emit_function(&mut out, name.as_str(), function, context);
        out.push('\n');
    }
    out
}

fn emit_function(out: &mut String, name: &str, function: &Function, context: &Context) {
    let _ = write!(out, "fn {name}(");
    for (position, &argument) in function.arguments.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        let local = function.local(argument);
        let _ = write!(out, "%{}", argument.0);
        if let Some(ty) = local.ty {
            let _ = write!(out, ": {}", context.types.display(ty));
        }
    }
    out.push(')');
    if let Some(return_type) = function.return_type {
        let _ = write!(out, " -> {}", context.types.display(return_type));
    }
    out.push_str(" {\n");
    for instruction in function.block.iter() {
        out.push_str("    ");
        emit_instruction(out, instruction, context);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn emit_instruction(out: &mut String, instruction: &Instruction, context: &Context) {
    match instruction {
        Instruction::Ret { value, .. } => {
            out.push_str("ret ");
            emit_operand(out, *value, context);
        }
        other => {
            let _ = write!(out, "%{} = {}", other.dst().0, other.opcode().mnemonic());
            if let Some(b) = other.b() {
                out.push(' ');
                emit_operand(out, b, context);
            }
            if let Some(c) = other.c() {
                out.push_str(", ");
                emit_operand(out, c, context);
            }
        }
    }
}

fn emit_operand(out: &mut String, operand: Operand, context: &Context) {
    match operand {
        Operand::Ssa(id) => {
            let _ = write!(out, "%{}", id.0);
        }
        Operand::Immediate(immediate) => {
            let _ = write!(out, "{}", immediate.value());
        }
        Operand::Label(id) => {
            let _ = write!(out, "@{}", context.labels.get(id));
        }
        Operand::Constant(id) => emit_value(out, context.constants.get(id), context),
    }
}

fn emit_value(out: &mut String, value: &Value, context: &Context) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::I8(n) => {
            let _ = write!(out, "{n}");
        }
        Value::I16(n) => {
            let _ = write!(out, "{n}");
        }
        Value::I32(n) => {
            let _ = write!(out, "{n}");
        }
        Value::I64(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U8(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U16(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U32(n) => {
            let _ = write!(out, "{n}");
        }
        Value::U64(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Tuple(elements) => {
            out.push('(');
            for (position, element) in elements.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                emit_operand(out, *element, context);
            }
            out.push(')');
        }
    }
}
