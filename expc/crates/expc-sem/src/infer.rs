//! Type inference.
//!
//! A single in-order walk of the block. Each instruction's contract
//! assigns a type to the SSA local it defines; a use of an SSA local
//! always sees the type its definition assigned, because definitions
//! dominate uses in a straight-line block.

use expc_ir::{
    CompileError, Context, ErrorCode, Function, Instruction, Operand, Type, TypeId, Value,
};

use crate::type_of::{mismatch, type_of_operand};

pub fn infer_types_of_locals(
    function: &mut Function,
    context: &mut Context,
) -> Result<(), CompileError> {
    for index in 0..function.block.len() {
        let instruction = *function.block.get(index);
        infer_instruction(&instruction, function, context)?;
    }

    if function.return_type.is_none() {
        return Err(CompileError::new(
            ErrorCode::ReturnTypeUnknown,
            "function never returns",
        ));
    }
    Ok(())
}

fn infer_instruction(
    instruction: &Instruction,
    function: &mut Function,
    context: &mut Context,
) -> Result<(), CompileError> {
    match *instruction {
        Instruction::Ret { result, value } => {
            let value_type = type_of_operand(value, function.return_type, function, context)?;
            match function.return_type {
                None => function.return_type = Some(value_type),
                Some(return_type) => {
                    if return_type != value_type {
                        return Err(mismatch(return_type, value_type, context));
                    }
                }
            }
            function.local_mut(result).ty = function.return_type;
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
                unreachable!("call arguments must be a constant tuple");
            };
            let Value::Tuple(actual_arguments) = context.constants.get(arguments).clone() else {
                unreachable!("call arguments must be a constant tuple");
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

            function.local_mut(dst).ty = Some(return_type);
            Ok(())
        }

        Instruction::Load { dst, src } => {
            let src_type = type_of_operand(src, None, function, context)?;
            function.local_mut(dst).ty = Some(src_type);
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

            let Operand::Immediate(expc_ir::Immediate::I32(index)) = index else {
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

            function.local_mut(dst).ty = Some(element_types[index as usize]);
            Ok(())
        }

        Instruction::Neg { dst, operand } => {
            let i32_type = context.types.i32();
            let operand_type = type_of_operand(operand, Some(i32_type), function, context)?;
            if !context.types.get(operand_type).is_signed_integer() {
                return Err(mismatch(i32_type, operand_type, context));
            }
            function.local_mut(dst).ty = Some(operand_type);
            Ok(())
        }

        Instruction::Add { dst, lhs, rhs }
        | Instruction::Sub { dst, lhs, rhs }
        | Instruction::Mul { dst, lhs, rhs }
        | Instruction::Div { dst, lhs, rhs }
        | Instruction::Mod { dst, lhs, rhs } => {
            let result_type = infer_binop(lhs, rhs, function, context)?;
            function.local_mut(dst).ty = Some(result_type);
            Ok(())
        }
    }
}

/// Both operands must agree on a signed integer scalar type; an immediate
/// adapts to the other side. The result takes the operand type.
fn infer_binop(
    lhs: Operand,
    rhs: Operand,
    function: &Function,
    context: &mut Context,
) -> Result<TypeId, CompileError> {
    let i32_type = context.types.i32();
    // type the non-immediate side first so a literal can adapt to it
    let (lhs_type, rhs_type) = if matches!(lhs, Operand::Immediate(_))
        && !matches!(rhs, Operand::Immediate(_))
    {
        let rhs_type = type_of_operand(rhs, Some(i32_type), function, context)?;
        let lhs_type = type_of_operand(lhs, Some(rhs_type), function, context)?;
        (lhs_type, rhs_type)
    } else {
        let lhs_type = type_of_operand(lhs, Some(i32_type), function, context)?;
        let rhs_type = type_of_operand(rhs, Some(lhs_type), function, context)?;
        (lhs_type, rhs_type)
    };

    if !context.types.get(lhs_type).is_signed_integer() {
        return Err(mismatch(i32_type, lhs_type, context));
    }
    if lhs_type != rhs_type {
        return Err(mismatch(lhs_type, rhs_type, context));
    }
    Ok(lhs_type)
}
