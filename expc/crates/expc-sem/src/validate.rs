//! IR validation.
//!
//! Runs after inference and lifetime analysis, before anything reaches
//! the backend. Checks, in order: every local is fully annotated and its
//! lifetime is inside the block; every instruction defines its SSA local
//! exactly at its own index (which also catches duplicate definitions)
//! and only reads locals inside their lifetimes; and every instruction
//! satisfies its opcode's type contract.

use expc_ir::{
    CompileError, Context, ErrorCode, Function, Immediate, Instruction, LocalId, Operand, Type,
    Value,
};
use expc_util::Idx;

use crate::type_of::{mismatch, type_of_operand};

fn malformed(message: String) -> CompileError {
    CompileError::new(ErrorCode::MalformedIr, message)
}

pub fn validate_function(function: &Function, context: &mut Context) -> Result<(), CompileError> {
    for id in function.locals.indices() {
        validate_local(id, function)?;
    }

    for index in 0..function.block.len() {
        let instruction = *function.block.get(index);
        validate_positions(&instruction, index, function, context)?;
        validate_types(&instruction, function, context)?;
    }
    Ok(())
}

fn validate_local(id: LocalId, function: &Function) -> Result<(), CompileError> {
    let local = function.local(id);
    if local.ty.is_none() {
        return Err(malformed(format!("local %{} has no type", id.index())));
    }
    let lifetime = local.lifetime;
    if lifetime.last_use < lifetime.first_use {
        return Err(malformed(format!(
            "local %{} has lifetime [{}, {}]",
            id.index(),
            lifetime.first_use,
            lifetime.last_use
        )));
    }
    if lifetime.last_use >= function.block.len() {
        return Err(malformed(format!(
            "local %{} outlives the block",
            id.index()
        )));
    }
    Ok(())
}

fn validate_positions(
    instruction: &Instruction,
    index: u32,
    function: &Function,
    context: &Context,
) -> Result<(), CompileError> {
    // position A: defined exactly here. A second definition of the same
    // local would see first_use != index, as would stale lifetime
    // metadata.
    let dst = instruction.dst();
    if function.local(dst).lifetime.first_use != index {
        return Err(malformed(format!(
            "local %{} is not defined at index {index}",
            dst.index()
        )));
    }

    for operand in [instruction.b(), instruction.c()].into_iter().flatten() {
        validate_operand(operand, index, function, context)?;
    }
    Ok(())
}

fn validate_operand(
    operand: Operand,
    index: u32,
    function: &Function,
    context: &Context,
) -> Result<(), CompileError> {
    match operand {
        Operand::Ssa(id) => {
            let lifetime = function.local(id).lifetime;
            if lifetime.first_use > index || index > lifetime.last_use {
                return Err(malformed(format!(
                    "local %{} read at index {index} outside lifetime [{}, {}]",
                    id.index(),
                    lifetime.first_use,
                    lifetime.last_use
                )));
            }
        }
        Operand::Label(id) => {
            let name = context.labels.get(id);
            let typed = context
                .symbols
                .lookup(name)
                .is_some_and(|global| global.ty.is_some());
            if !typed {
                return Err(CompileError::undefined_symbol(name.as_str()));
            }
        }
        Operand::Constant(id) => {
            if let Value::Tuple(elements) = context.constants.get(id) {
                for element in elements.clone() {
                    validate_operand(element, index, function, context)?;
                }
            }
        }
        Operand::Immediate(_) => {}
    }
    Ok(())
}

fn local_type(id: LocalId, function: &Function) -> expc_ir::TypeId {
    function.local(id).ty.expect("validated above")
}

fn validate_types(
    instruction: &Instruction,
    function: &Function,
    context: &mut Context,
) -> Result<(), CompileError> {
    match *instruction {
        Instruction::Ret { result, value } => {
            let return_type = function
                .return_type
                .ok_or_else(|| malformed("function has no return type".into()))?;
            let result_type = local_type(result, function);
            let value_type = type_of_operand(value, Some(return_type), function, context)?;
            if result_type != value_type {
                return Err(mismatch(result_type, value_type, context));
            }
            if result_type != return_type {
                return Err(mismatch(return_type, result_type, context));
            }
            Ok(())
        }

        Instruction::Call {
            dst,
            callee,
            arguments,
        } => {
            let callee_type = type_of_operand(callee, None, function, context)?;
            let Type::Function {
                return_type,
                arguments: formal_types,
            } = context.types.get(callee_type)
            else {
                return Err(CompileError::new(
                    ErrorCode::TypeNotCallable,
                    format!("Type: [{}]", context.types.display(callee_type)),
                ));
            };
            let (return_type, formal_types) = (*return_type, formal_types.clone());

            let Operand::Constant(arguments) = arguments else {
                return Err(malformed("call arguments are not a constant".into()));
            };
            let Value::Tuple(actual_arguments) = context.constants.get(arguments).clone() else {
                return Err(malformed("call arguments are not a tuple".into()));
            };
            if formal_types.len() != actual_arguments.len() {
                return Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!(
                        "Expected [{}] arguments. Have [{}] arguments.",
                        formal_types.len(),
                        actual_arguments.len()
                    ),
                ));
            }
            for (&formal_type, &actual) in formal_types.iter().zip(actual_arguments.iter()) {
                let actual_type = type_of_operand(actual, Some(formal_type), function, context)?;
                if actual_type != formal_type {
                    return Err(mismatch(formal_type, actual_type, context));
                }
            }
            let dst_type = local_type(dst, function);
            if dst_type != return_type {
                return Err(mismatch(return_type, dst_type, context));
            }
            Ok(())
        }

        Instruction::Load { dst, src } => {
            let dst_type = local_type(dst, function);
            let src_type = type_of_operand(src, Some(dst_type), function, context)?;
            if dst_type != src_type {
                return Err(mismatch(dst_type, src_type, context));
            }
            Ok(())
        }

        Instruction::Dot { dst, tuple, index } => {
            let tuple_type = type_of_operand(tuple, None, function, context)?;
            let Type::Tuple(element_types) = context.types.get(tuple_type) else {
                return Err(CompileError::new(
                    ErrorCode::TypeNotIndexable,
                    format!("Type: [{}]", context.types.display(tuple_type)),
                ));
            };
            let element_types = element_types.clone();
            let Operand::Immediate(Immediate::I32(index)) = index else {
                return Err(CompileError::new(
                    ErrorCode::TupleIndexNotImmediate,
                    "tuple index must be an i32 immediate",
                ));
            };
            if index < 0 || index as usize >= element_types.len() {
                return Err(CompileError::new(
                    ErrorCode::TupleIndexOutOfBounds,
                    format!("Index: [{index}] Bounds: [0..{}]", element_types.len()),
                ));
            }
            let dst_type = local_type(dst, function);
            if dst_type != element_types[index as usize] {
                return Err(mismatch(element_types[index as usize], dst_type, context));
            }
            Ok(())
        }

        Instruction::Neg { dst, operand } => {
            let dst_type = local_type(dst, function);
            let operand_type = type_of_operand(operand, Some(dst_type), function, context)?;
            if !context.types.get(operand_type).is_signed_integer() {
                return Err(mismatch(context.types.i32(), operand_type, context));
            }
            if dst_type != operand_type {
                return Err(mismatch(operand_type, dst_type, context));
            }
            Ok(())
        }

        Instruction::Add { dst, lhs, rhs }
        | Instruction::Sub { dst, lhs, rhs }
        | Instruction::Mul { dst, lhs, rhs }
        | Instruction::Div { dst, lhs, rhs }
        | Instruction::Mod { dst, lhs, rhs } => {
            let dst_type = local_type(dst, function);
            if !context.types.get(dst_type).is_signed_integer() {
                return Err(mismatch(context.types.i32(), dst_type, context));
            }
            let lhs_type = type_of_operand(lhs, Some(dst_type), function, context)?;
            if lhs_type != dst_type {
                return Err(mismatch(dst_type, lhs_type, context));
            }
            let rhs_type = type_of_operand(rhs, Some(dst_type), function, context)?;
            if rhs_type != dst_type {
                return Err(mismatch(dst_type, rhs_type, context));
            }
            Ok(())
        }
    }
}
