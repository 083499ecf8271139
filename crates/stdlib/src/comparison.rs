//! `== != < <= > >=` (spec.md §4.5 "Comparison" — "chained n-ary; `==` is strict equality on
//! primitives").

use crate::shared::require_number;
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

fn chained(args: &[Var], pred: impl Fn(&Var, &Var) -> bool) -> Var {
    Var::bool(args.windows(2).all(|w| pred(&w[0], &w[1])))
}

fn chained_numeric(
    opcode: &str,
    args: &[Var],
    pred: impl Fn(f64, f64) -> bool,
) -> Result<Var, ScriptError> {
    let nums: Vec<f64> = args
        .iter()
        .map(|a| require_number(opcode, a))
        .collect::<Result<_, _>>()?;
    Ok(Var::bool(nums.windows(2).all(|w| pred(w[0], w[1]))))
}

fn op_eq(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(chained(args, |a, b| a == b))
}

fn op_ne(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::bool(args.windows(2).any(|w| w[0] != w[1])))
}

fn op_lt(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    chained_numeric("<", args, |a, b| a < b)
}

fn op_le(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    chained_numeric("<=", args, |a, b| a <= b)
}

fn op_gt(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    chained_numeric(">", args, |a, b| a > b)
}

fn op_ge(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    chained_numeric(">=", args, |a, b| a >= b)
}

pub fn install(registry: &mut OpcodeRegistry) {
    let meta = |name: &'static str, label: &'static str, description: &'static str| OpcodeMeta {
        name,
        label,
        category: "comparison",
        description,
        arity: Arity::AtLeast(2),
        params: &[SlotType::Any],
        returns: SlotType::Bool,
        lazy: false,
    };
    registry.register(meta("==", "Equal", "strict equality, chained"), op_eq);
    registry.register(meta("!=", "Not equal", "any adjacent pair differs"), op_ne);
    registry.register(meta("<", "Less than", "strictly increasing, chained"), op_lt);
    registry.register(meta("<=", "Less or equal", "non-decreasing, chained"), op_le);
    registry.register(meta(">", "Greater than", "strictly decreasing, chained"), op_gt);
    registry.register(meta(">=", "Greater or equal", "non-increasing, chained"), op_ge);
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn chained_less_than() {
        assert_eq!(eval_json(r#"["<",1,2,3]"#).as_bool(), Some(true));
        assert_eq!(eval_json(r#"["<",1,3,2]"#).as_bool(), Some(false));
    }

    #[test]
    fn equality_is_strict_on_primitives() {
        assert_eq!(eval_json(r#"["==",1,1,1]"#).as_bool(), Some(true));
        assert_eq!(eval_json(r#"["==","a","a"]"#).as_bool(), Some(true));
        assert_eq!(eval_json(r#"["==",1,"1"]"#).as_bool(), Some(false));
    }
}
