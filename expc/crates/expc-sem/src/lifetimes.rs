//! Lifetime analysis.
//!
//! A single forward walk over the block. The instruction defining an SSA
//! local stamps its `first_use`; every later appearance in a source
//! position pushes `last_use` forward. A constant tuple operand counts as
//! a use of every SSA local appearing among its elements, recursively, so
//! call arguments keep their values alive up to the call.

use expc_ir::{Context, Function, Operand, Value};

pub fn analyze_lifetimes_of_locals(function: &mut Function, context: &Context) {
    for index in 0..function.block.len() {
        let instruction = *function.block.get(index);

        let lifetime = &mut function.local_mut(instruction.dst()).lifetime;
        lifetime.first_use = index;
        if lifetime.last_use < index {
            lifetime.last_use = index;
        }

        if let Some(b) = instruction.b() {
            analyze_operand(b, index, function, context);
        }
        if let Some(c) = instruction.c() {
            analyze_operand(c, index, function, context);
        }
    }
}

fn analyze_operand(operand: Operand, index: u32, function: &mut Function, context: &Context) {
    match operand {
        Operand::Ssa(id) => {
            let lifetime = &mut function.local_mut(id).lifetime;
            if index > lifetime.last_use {
                lifetime.last_use = index;
            }
        }
        Operand::Constant(id) => {
            if let Value::Tuple(elements) = context.constants.get(id) {
                for element in elements.clone() {
                    analyze_operand(element, index, function, context);
                }
            }
        }
        // immediates and labels are not locals, nothing to track
        Operand::Immediate(_) | Operand::Label(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer_types_of_locals;
    use expc_ir::{GlobalKind, Instruction, LocalId, Options};
    use expc_par::parse_source;
    use expc_util::Symbol;
    use std::path::Path;

    fn analyzed(source: &str) -> (Context, Function) {
        let mut context = Context::new(Options::default(), Path::new("test.exp"), None);
        parse_source(source, &mut context).expect("parse failure");
        let name = *context.declaration_order.first().expect("one function");
        let mut global = context.symbols.remove(name).expect("global");
        let GlobalKind::Function(mut function) = std::mem::take(&mut global.kind) else {
            panic!("not a function");
        };
        infer_types_of_locals(&mut function, &mut context).expect("inference failure");
        analyze_lifetimes_of_locals(&mut function, &context);
        (context, function)
    }

    #[test]
    fn test_first_use_is_definition_index() {
        let (_, function) = analyzed("fn main() { const x = 1; const y = 2; return x + y; }");
        // block: 0 load x, 1 load y, 2 add, 3 ret
        for (index, instruction) in function.block.iter().enumerate() {
            let lifetime = function.local(instruction.dst()).lifetime;
            assert_eq!(lifetime.first_use, index as u32);
        }
    }

    #[test]
    fn test_last_use_extends_to_final_read() {
        let (_, function) = analyzed("fn main() { const x = 1; const y = 2; return x + y; }");
        // x (ssa 0) and y (ssa 1) are both read by the add at index 2
        assert_eq!(function.local(LocalId(0)).lifetime.last_use, 2);
        assert_eq!(function.local(LocalId(1)).lifetime.last_use, 2);
        // the sum (ssa 2) is read by the ret at index 3
        assert_eq!(function.local(LocalId(2)).lifetime.last_use, 3);
    }

    #[test]
    fn test_uses_inside_b_and_c_positions() {
        let (_, function) = analyzed("fn main() { const x = 6; const y = 2; return x / y; }");
        for instruction in function.block.iter() {
            let index = function
                .block
                .iter()
                .position(|i| i == instruction)
                .unwrap() as u32;
            for operand in [instruction.b(), instruction.c()].into_iter().flatten() {
                if let Operand::Ssa(id) = operand {
                    let lifetime = function.local(id).lifetime;
                    assert!(lifetime.first_use <= index && index <= lifetime.last_use);
                }
            }
        }
    }

    #[test]
    fn test_bound_expression_reads_extend_lifetimes() {
        let (_, function) = analyzed(
            "fn main() { const x = 1; const y = 2; const z = x + y; return z; }",
        );
        // z's add reads x and y at index 2
        assert_eq!(function.local(LocalId(0)).lifetime.last_use, 2);
        assert_eq!(function.local(LocalId(1)).lifetime.last_use, 2);
    }

    #[test]
    fn test_call_arguments_kept_alive() {
        let mut context = Context::new(Options::default(), Path::new("test.exp"), None);
        parse_source(
            "fn f(a: i32, b: i32) { return a + b; } fn main() { const x = 1; const y = 2; return f(x, y); }",
            &mut context,
        )
        .expect("parse failure");
        // analyze f first so main's call typechecks
        for name in context.declaration_order.clone() {
            let mut global = context.symbols.remove(name).expect("global");
            let GlobalKind::Function(function) = &mut global.kind else {
                panic!("not a function");
            };
            infer_types_of_locals(function, &mut context).expect("inference failure");
            analyze_lifetimes_of_locals(function, &context);
            global.ty = Some(crate::function_type(function, &mut context));
            if name == Symbol::intern("main") {
                let GlobalKind::Function(main) = &global.kind else {
                    unreachable!();
                };
                // x and y flow through the call's argument tuple at index 2
                let call_index = main
                    .block
                    .iter()
                    .position(|i| matches!(i, Instruction::Call { .. }))
                    .unwrap() as u32;
                assert_eq!(main.local(LocalId(0)).lifetime.last_use, call_index);
                assert_eq!(main.local(LocalId(1)).lifetime.last_use, call_index);
            }
            context.symbols.insert(global);
        }
    }
}
