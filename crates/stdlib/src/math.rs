//! `abs, ceil, floor, round, trunc, sign, min, max, clamp, sqrt, pow, log/log2/log10,
//! sin/cos/tan/asin/acos/atan/atan2, exp` (spec.md §4.5 "Math").
//!
//! Grounded on the teacher's `math_fn!`/`math_fn_with_validation!` macros
//! (`crates/kernel/src/vm/builtins/bf_num.rs`) for the one-line-per-function registration
//! shape, adapted to this crate's opcode/arity/lazy contract.

use crate::shared::require_number;
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

macro_rules! unary_math_fn {
    ($fn_name:ident, $opcode:expr, $label:expr, $op:expr) => {
        fn $fn_name(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
            let x = require_number($opcode, &args[0])?;
            let f: fn(f64) -> f64 = $op;
            Ok(Var::number(f(x)))
        }
    };
}

unary_math_fn!(op_abs, "abs", "Abs", f64::abs);
unary_math_fn!(op_ceil, "ceil", "Ceil", f64::ceil);
unary_math_fn!(op_floor, "floor", "Floor", f64::floor);
unary_math_fn!(op_round, "round", "Round", f64::round);
unary_math_fn!(op_trunc, "trunc", "Trunc", f64::trunc);
unary_math_fn!(op_sqrt, "sqrt", "Sqrt", f64::sqrt);
unary_math_fn!(op_sin, "sin", "Sin", f64::sin);
unary_math_fn!(op_cos, "cos", "Cos", f64::cos);
unary_math_fn!(op_tan, "tan", "Tan", f64::tan);
unary_math_fn!(op_asin, "asin", "Asin", f64::asin);
unary_math_fn!(op_acos, "acos", "Acos", f64::acos);
unary_math_fn!(op_atan, "atan", "Atan", f64::atan);
unary_math_fn!(op_exp, "exp", "Exp", f64::exp);
unary_math_fn!(op_log, "log", "Log", f64::ln);
unary_math_fn!(op_log2, "log2", "Log2", f64::log2);
unary_math_fn!(op_log10, "log10", "Log10", f64::log10);

fn op_sign(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let x = require_number("sign", &args[0])?;
    Ok(Var::number(if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }))
}

fn op_min(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut best = require_number("min", &args[0])?;
    for a in &args[1..] {
        best = best.min(require_number("min", a)?);
    }
    Ok(Var::number(best))
}

fn op_max(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut best = require_number("max", &args[0])?;
    for a in &args[1..] {
        best = best.max(require_number("max", a)?);
    }
    Ok(Var::number(best))
}

fn op_clamp(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let x = require_number("clamp", &args[0])?;
    let lo = require_number("clamp", &args[1])?;
    let hi = require_number("clamp", &args[2])?;
    Ok(Var::number(x.clamp(lo, hi)))
}

fn op_pow(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let base = require_number("pow", &args[0])?;
    let exp = require_number("pow", &args[1])?;
    Ok(Var::number(base.powf(exp)))
}

fn op_atan2(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let y = require_number("atan2", &args[0])?;
    let x = require_number("atan2", &args[1])?;
    Ok(Var::number(y.atan2(x)))
}

pub fn install(registry: &mut OpcodeRegistry) {
    let unary = |name: &'static str, label: &'static str| OpcodeMeta {
        name,
        label,
        category: "math",
        description: "",
        arity: Arity::Exact(1),
        params: &[SlotType::Number],
        returns: SlotType::Number,
        lazy: false,
    };
    registry.register(unary("abs", "Abs"), op_abs);
    registry.register(unary("ceil", "Ceil"), op_ceil);
    registry.register(unary("floor", "Floor"), op_floor);
    registry.register(unary("round", "Round"), op_round);
    registry.register(unary("trunc", "Trunc"), op_trunc);
    registry.register(unary("sign", "Sign"), op_sign);
    registry.register(unary("sqrt", "Sqrt"), op_sqrt);
    registry.register(unary("sin", "Sin"), op_sin);
    registry.register(unary("cos", "Cos"), op_cos);
    registry.register(unary("tan", "Tan"), op_tan);
    registry.register(unary("asin", "Asin"), op_asin);
    registry.register(unary("acos", "Acos"), op_acos);
    registry.register(unary("atan", "Atan"), op_atan);
    registry.register(unary("exp", "Exp"), op_exp);
    registry.register(unary("log", "Log"), op_log);
    registry.register(unary("log2", "Log2"), op_log2);
    registry.register(unary("log10", "Log10"), op_log10);
    registry.register(
        OpcodeMeta {
            name: "min",
            label: "Min",
            category: "math",
            description: "smallest of two or more numbers",
            arity: Arity::AtLeast(1),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_min,
    );
    registry.register(
        OpcodeMeta {
            name: "max",
            label: "Max",
            category: "math",
            description: "largest of two or more numbers",
            arity: Arity::AtLeast(1),
            params: &[SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_max,
    );
    registry.register(
        OpcodeMeta {
            name: "clamp",
            label: "Clamp",
            category: "math",
            description: "restrict a number to [lo, hi]",
            arity: Arity::Exact(3),
            params: &[SlotType::Number, SlotType::Number, SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_clamp,
    );
    registry.register(
        OpcodeMeta {
            name: "pow",
            label: "Pow",
            category: "math",
            description: "base raised to exp",
            arity: Arity::Exact(2),
            params: &[SlotType::Number, SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_pow,
    );
    registry.register(
        OpcodeMeta {
            name: "atan2",
            label: "Atan2",
            category: "math",
            description: "four-quadrant arctangent",
            arity: Arity::Exact(2),
            params: &[SlotType::Number, SlotType::Number],
            returns: SlotType::Number,
            lazy: false,
        },
        op_atan2,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn clamp_restricts_range() {
        assert_eq!(eval_json(r#"["clamp", 15, 0, 10]"#).as_number(), Some(10.0));
        assert_eq!(eval_json(r#"["clamp", -5, 0, 10]"#).as_number(), Some(0.0));
    }

    #[test]
    fn sqrt_and_pow_are_inverse() {
        let v = eval_json(r#"["sqrt", ["pow", 3, 2]]"#);
        assert!((v.as_number().unwrap() - 3.0).abs() < 1e-9);
    }
}
