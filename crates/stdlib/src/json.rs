//! `json.parse`, `json.stringify` (spec.md §4.5 "JSON"). Round-trips through [`Var`]'s own
//! serde implementation (spec.md §6 "the wire/storage format is exactly the serde
//! representation of `Var`").

use crate::shared::{require_str, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

fn op_parse(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("json.parse", &args[0])?;
    serde_json::from_str(s).map_err(|e| type_error("json.parse", format!("{e}")))
}

fn op_stringify(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let pretty = args.get(1).map(|v| v.truthy()).unwrap_or(false);
    let out = if pretty {
        serde_json::to_string_pretty(&args[0])
    } else {
        serde_json::to_string(&args[0])
    };
    out.map(Var::str).map_err(|e| type_error("json.stringify", format!("{e}")))
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "json.parse",
            label: "Parse",
            category: "json",
            description: "parse a JSON string into a value",
            arity: Arity::Exact(1),
            params: &[SlotType::String],
            returns: SlotType::Any,
            lazy: false,
        },
        op_parse,
    );
    registry.register(
        OpcodeMeta {
            name: "json.stringify",
            label: "Stringify",
            category: "json",
            description: "render a value as a JSON string, optionally pretty-printed",
            arity: Arity::Range(1, 2),
            params: &[SlotType::Any, SlotType::Bool],
            returns: SlotType::String,
            lazy: false,
        },
        op_stringify,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn round_trips_a_list() {
        let stringified = eval_json(r#"["json.stringify", ["list.new", 1, 2, 3]]"#);
        let back = eval_json(&format!(r#"["json.parse", {}]"#, serde_json::to_string(stringified.as_str().unwrap()).unwrap()));
        assert_eq!(back.as_list().unwrap().len(), 3);
    }
}
