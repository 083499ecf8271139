//! `random.*` (spec.md §4.5 "Random").

use crate::shared::{require_list, require_number, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;
use rand::Rng;

fn op_number(_args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::number(rand::rng().random::<f64>()))
}

fn op_between(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let lo = require_number("random.between", &args[0])?;
    let hi = require_number("random.between", &args[1])?;
    if lo > hi {
        return Err(type_error("random.between", "lower bound exceeds upper bound"));
    }
    Ok(Var::number(rand::rng().random_range(lo..=hi)))
}

fn op_choice(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("random.choice", &args[0])?;
    if list.is_empty() {
        return Err(type_error("random.choice", "cannot choose from an empty list"));
    }
    let i = rand::rng().random_range(0..list.len());
    Ok(list.get(i).cloned().unwrap())
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "random.number",
            label: "Random number",
            category: "random",
            description: "uniform random float in [0, 1)",
            arity: Arity::Exact(0),
            params: &[],
            returns: SlotType::Number,
            lazy: false,
        },
        op_number,
    );
    registry.register(
        OpcodeMeta {
            name: "random.between",
            label: "Random between",
            category: "random",
            description: "uniform random float in [lo, hi]",
            arity: Arity::Exact(2),
            params: &[SlotType::Number, SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_between,
    );
    registry.register(
        OpcodeMeta {
            name: "random.choice",
            label: "Random choice",
            category: "random",
            description: "uniform random element of a list",
            arity: Arity::Exact(1),
            params: &[SlotType::List],
            returns: SlotType::Any,
            lazy: false,
        },
        op_choice,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn between_stays_in_bounds() {
        for _ in 0..20 {
            let v = eval_json(r#"["random.between", 3, 5]"#).as_number().unwrap();
            assert!((3.0..=5.0).contains(&v));
        }
    }

    #[test]
    fn choice_returns_a_member() {
        let v = eval_json(r#"["random.choice", ["list.new", 1, 2, 3]]"#).as_number().unwrap();
        assert!([1.0, 2.0, 3.0].contains(&v));
    }
}
