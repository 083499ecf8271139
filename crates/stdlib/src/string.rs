//! `str.*` (spec.md §4.5 "String").

use crate::shared::{require_number, require_str, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

/// A human-readable rendering of any value, used where a non-string operand needs a display
/// form (e.g. `list.join` on a mixed list).
pub fn display(v: &Var) -> String {
    match v.variant() {
        loom_values::Variant::None => "null".to_string(),
        loom_values::Variant::Bool(b) => b.to_string(),
        loom_values::Variant::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{n}")
            } else {
                n.to_string()
            }
        }
        loom_values::Variant::Str(s) => s.to_string(),
        loom_values::Variant::Entity(id) => id.to_string(),
        _ => serde_json::to_string(v).unwrap_or_else(|_| "<?>".to_string()),
    }
}

fn op_len(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::number(require_str("str.len", &args[0])?.chars().count() as f64))
}

fn op_concat(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = String::new();
    for a in args {
        out.push_str(require_str("str.concat", a)?);
    }
    Ok(Var::str(out))
}

fn op_split(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("str.split", &args[0])?;
    let sep = require_str("str.split", &args[1])?;
    let parts: Vec<Var> = if sep.is_empty() {
        s.chars().map(|c| Var::str(c.to_string())).collect()
    } else {
        s.split(sep).map(Var::str).collect()
    };
    Ok(Var::list_from(parts))
}

fn op_slice(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("str.slice", &args[0])?;
    let chars: Vec<char> = s.chars().collect();
    let start = require_number("str.slice", &args[1])?;
    if start < 0.0 {
        return Err(type_error("str.slice", "start must be non-negative"));
    }
    let start = (start as usize).min(chars.len());
    let end = if args.len() > 2 {
        (require_number("str.slice", &args[2])? as usize).min(chars.len())
    } else {
        chars.len()
    };
    if start > end {
        return Err(type_error("str.slice", "start must not exceed end"));
    }
    Ok(Var::str(chars[start..end].iter().collect::<String>()))
}

fn op_upper(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::str(require_str("str.upper", &args[0])?.to_uppercase()))
}

fn op_lower(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::str(require_str("str.lower", &args[0])?.to_lowercase()))
}

fn op_trim(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::str(require_str("str.trim", &args[0])?.trim().to_string()))
}

fn op_replace(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("str.replace", &args[0])?;
    let from = require_str("str.replace", &args[1])?;
    let to = require_str("str.replace", &args[2])?;
    Ok(Var::str(s.replace(from, to)))
}

fn op_includes(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("str.includes", &args[0])?;
    let needle = require_str("str.includes", &args[1])?;
    Ok(Var::bool(s.contains(needle)))
}

fn op_join(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = args[0].as_list().ok_or_else(|| type_error("str.join", "first argument must be a list"))?;
    let sep = require_str("str.join", &args[1])?;
    let parts: Vec<String> = list.iter().map(display).collect();
    Ok(Var::str(parts.join(sep)))
}

pub fn install(registry: &mut OpcodeRegistry) {
    let meta = |name: &'static str, label: &'static str, description: &'static str, arity: Arity, returns: SlotType| OpcodeMeta {
        name,
        label,
        category: "string",
        description,
        arity,
        params: &[SlotType::String],
        returns,
        lazy: false,
    };
    registry.register(meta("str.len", "Length", "number of characters", Arity::Exact(1), SlotType::Number), op_len);
    registry.register(meta("str.concat", "Concat", "concatenate strings", Arity::AtLeast(1), SlotType::String), op_concat);
    registry.register(meta("str.split", "Split", "split on a separator", Arity::Exact(2), SlotType::List), op_split);
    registry.register(meta("str.slice", "Slice", "substring [start, end)", Arity::Range(2, 3), SlotType::String), op_slice);
    registry.register(meta("str.upper", "Upper", "uppercase", Arity::Exact(1), SlotType::String), op_upper);
    registry.register(meta("str.lower", "Lower", "lowercase", Arity::Exact(1), SlotType::String), op_lower);
    registry.register(meta("str.trim", "Trim", "strip leading/trailing whitespace", Arity::Exact(1), SlotType::String), op_trim);
    registry.register(meta("str.replace", "Replace", "replace all occurrences", Arity::Exact(3), SlotType::String), op_replace);
    registry.register(meta("str.includes", "Includes", "substring test", Arity::Exact(2), SlotType::Bool), op_includes);
    registry.register(meta("str.join", "Join", "join a list of values with a separator", Arity::Exact(2), SlotType::String), op_join);
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn split_and_join_round_trip() {
        let split = eval_json(r#"["str.split", "a,b,c", ","]"#);
        assert_eq!(split.as_list().unwrap().len(), 3);
        let joined = eval_json(r#"["str.join", ["str.split", "a,b,c", ","], "-"]"#);
        assert_eq!(joined.as_str(), Some("a-b-c"));
    }

    #[test]
    fn slice_is_char_based() {
        let v = eval_json(r#"["str.slice", "hello", 1, 3]"#);
        assert_eq!(v.as_str(), Some("el"));
    }
}
