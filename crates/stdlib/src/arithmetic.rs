//! `+ - * / % ^` (spec.md §4.5 "Arithmetic").

use crate::shared::{require_number, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

fn numbers(opcode: &str, args: &[Var]) -> Result<Vec<f64>, ScriptError> {
    args.iter().map(|a| require_number(opcode, a)).collect()
}

fn op_add(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::number(numbers("+", args)?.into_iter().sum()))
}

fn op_sub(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let nums = numbers("-", args)?;
    let mut it = nums.into_iter();
    let first = it.next().unwrap();
    Ok(Var::number(it.fold(first, |acc, n| acc - n)))
}

fn op_mul(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::number(numbers("*", args)?.into_iter().product()))
}

fn op_div(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let nums = numbers("/", args)?;
    let mut it = nums.into_iter();
    let first = it.next().unwrap();
    let mut acc = first;
    for n in it {
        if n == 0.0 {
            return Err(type_error("/", "division by zero"));
        }
        acc /= n;
    }
    Ok(Var::number(acc))
}

fn op_mod(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let a = require_number("%", &args[0])?;
    let b = require_number("%", &args[1])?;
    if b == 0.0 {
        return Err(type_error("%", "modulo by zero"));
    }
    Ok(Var::number(a % b))
}

fn op_pow(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let nums = numbers("^", args)?;
    // Right-associative power tower: a^b^c = a^(b^c).
    let mut it = nums.into_iter().rev();
    let mut acc = it.next().unwrap();
    for n in it {
        acc = n.powf(acc);
    }
    Ok(Var::number(acc))
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "+",
            label: "Add",
            category: "arithmetic",
            description: "sum of two or more numbers",
            arity: Arity::AtLeast(2),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_add,
    );
    registry.register(
        OpcodeMeta {
            name: "-",
            label: "Subtract",
            category: "arithmetic",
            description: "left-associative subtraction",
            arity: Arity::AtLeast(2),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_sub,
    );
    registry.register(
        OpcodeMeta {
            name: "*",
            label: "Multiply",
            category: "arithmetic",
            description: "product of two or more numbers",
            arity: Arity::AtLeast(2),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_mul,
    );
    registry.register(
        OpcodeMeta {
            name: "/",
            label: "Divide",
            category: "arithmetic",
            description: "left-associative division",
            arity: Arity::AtLeast(2),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_div,
    );
    registry.register(
        OpcodeMeta {
            name: "%",
            label: "Modulo",
            category: "arithmetic",
            description: "remainder of a / b",
            arity: Arity::Exact(2),
            params: &[SlotType::Number, SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_mod,
    );
    registry.register(
        OpcodeMeta {
            name: "^",
            label: "Power",
            category: "arithmetic",
            description: "right-associative power tower",
            arity: Arity::AtLeast(2),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_pow,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::eval_json;

    #[test]
    fn s1_arithmetic_chain() {
        let v = eval_json(r#"["+",1,2,3,["*",4,5]]"#);
        assert_eq!(v.as_number(), Some(26.0));
    }

    #[test]
    fn power_tower_is_right_associative() {
        // 2^(3^2) = 2^9 = 512, not (2^3)^2 = 64.
        let v = eval_json(r#"["^",2,3,2]"#);
        assert_eq!(v.as_number(), Some(512.0));
    }

    #[test]
    fn division_by_zero_is_a_type_error() {
        let result = crate::test_support::try_eval_json(r#"["/",1,0]"#);
        assert!(matches!(result, Err(ScriptError::TypeError { .. })));
    }
}
