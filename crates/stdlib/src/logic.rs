//! `and`, `or`, `not` (spec.md §4.5 "Logic" — "`and`/`or` short-circuit").

use loom_interpreter::{evaluate, ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

fn op_and(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut last = Var::bool(true);
    for a in args {
        last = evaluate(a, ctx)?;
        if !last.truthy() {
            return Ok(last);
        }
    }
    Ok(last)
}

fn op_or(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut last = Var::bool(false);
    for a in args {
        last = evaluate(a, ctx)?;
        if last.truthy() {
            return Ok(last);
        }
    }
    Ok(last)
}

fn op_not(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::bool(!args[0].truthy()))
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "and",
            label: "And",
            category: "logic",
            description: "short-circuiting conjunction, returns the first falsy or last value",
            arity: Arity::AtLeast(1),
            params: &[SlotType::Any],
            returns: SlotType::Any,
            lazy: true,
        },
        op_and,
    );
    registry.register(
        OpcodeMeta {
            name: "or",
            label: "Or",
            category: "logic",
            description: "short-circuiting disjunction, returns the first truthy or last value",
            arity: Arity::AtLeast(1),
            params: &[SlotType::Any],
            returns: SlotType::Any,
            lazy: true,
        },
        op_or,
    );
    registry.register(
        OpcodeMeta {
            name: "not",
            label: "Not",
            category: "logic",
            description: "logical negation",
            arity: Arity::Exact(1),
            params: &[SlotType::Any],
            returns: SlotType::Bool,
            lazy: false,
        },
        op_not,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::{eval_json, fresh_ctx, parse};

    #[test]
    fn and_short_circuits_without_evaluating_the_rest() {
        // An unknown opcode in the second branch would error if evaluated; `and` must never
        // reach it once the first operand is falsy.
        let mut ctx = fresh_ctx();
        let expr = parse(r#"["and", false, ["nonexistent_opcode"]]"#);
        let result = loom_interpreter::evaluate(&expr, &mut ctx).unwrap();
        assert_eq!(result.as_bool(), Some(false));
    }

    #[test]
    fn or_returns_first_truthy() {
        assert_eq!(eval_json(r#"["or", false, 7, ["nonexistent"]]"#).as_number(), Some(7.0));
    }

    #[test]
    fn not_negates() {
        assert_eq!(eval_json(r#"["not", false]"#).as_bool(), Some(true));
    }
}
