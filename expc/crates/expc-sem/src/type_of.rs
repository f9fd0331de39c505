//! Operand and value typing shared by inference and validation.

use expc_ir::{
    CompileError, Context, Function, Immediate, Operand, Type, TypeId, Value,
};

/// The type of `operand`.
///
/// An immediate is an untyped literal at heart: when `hint` names an
/// integer type and the value is in range, the immediate adopts the hint.
/// This is what lets a literal argument satisfy an `i64` formal and a
/// literal operand join an `i64` addition while the canonical literal
/// type stays `i32`.
pub(crate) fn type_of_operand(
    operand: Operand,
    hint: Option<TypeId>,
    function: &Function,
    context: &mut Context,
) -> Result<TypeId, CompileError> {
    match operand {
        Operand::Ssa(id) => Ok(function
            .local(id)
            .ty
            .expect("ssa local used before its defining instruction was typed")),
        Operand::Constant(id) => {
            let value = context.constants.get(id).clone();
            type_of_value(&value, function, context)
        }
        Operand::Immediate(immediate) => {
            if let Some(hint) = hint {
                if immediate_fits(immediate, hint, context) {
                    return Ok(hint);
                }
            }
            Ok(immediate.type_of(&context.types))
        }
        Operand::Label(id) => {
            let name = context.labels.get(id);
            match context.symbols.lookup(name).and_then(|global| global.ty) {
                Some(ty) => Ok(ty),
                None => Err(CompileError::undefined_symbol(name.as_str())),
            }
        }
    }
}

pub(crate) fn type_of_value(
    value: &Value,
    function: &Function,
    context: &mut Context,
) -> Result<TypeId, CompileError> {
    match value {
        Value::Nil => Ok(context.types.nil()),
        Value::Bool(_) => Ok(context.types.boolean()),
        Value::I8(_) => Ok(context.types.i8()),
        Value::I16(_) => Ok(context.types.i16()),
        Value::I32(_) => Ok(context.types.i32()),
        Value::I64(_) => Ok(context.types.i64()),
        Value::U8(_) => Ok(context.types.u8()),
        Value::U16(_) => Ok(context.types.u16()),
        Value::U32(_) => Ok(context.types.u32()),
        Value::U64(_) => Ok(context.types.u64()),
        Value::Tuple(elements) => {
            let mut element_types = Vec::with_capacity(elements.len());
            for element in elements {
                element_types.push(type_of_operand(*element, None, function, context)?);
            }
            Ok(context.types.tuple(element_types))
        }
    }
}

/// Can `immediate` inhabit integer type `ty`?
pub(crate) fn immediate_fits(immediate: Immediate, ty: TypeId, context: &Context) -> bool {
    use expc_util::int;
    let value = immediate.value();
    let Ok(narrow) = i64::try_from(value) else {
        // only a u64 immediate exceeds i64, and then only u64 holds it
        return matches!(context.types.get(ty), Type::U64);
    };
    match context.types.get(ty) {
        Type::I8 => int::fits_i8(narrow),
        Type::I16 => int::fits_i16(narrow),
        Type::I32 => int::fits_i32(narrow),
        Type::I64 => true,
        Type::U8 => int::fits_u8(narrow),
        Type::U16 => int::fits_u16(narrow),
        Type::U32 => int::fits_u32(narrow),
        Type::U64 => int::fits_u64(narrow),
        _ => false,
    }
}

pub(crate) fn mismatch(expected: TypeId, actual: TypeId, context: &Context) -> CompileError {
    CompileError::type_mismatch(
        &context.types.display(expected),
        &context.types.display(actual),
    )
}
