//! `obj.*` (spec.md §4.5 "Object" — "key writes reject the identifiers `__proto__`,
//! `constructor`, `prototype` to prevent sandbox escape via host-object pollution").

use crate::shared::{invoke_lambda, require_lambda, require_str, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::{Map, Var};

const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

fn require_key(opcode: &str, v: &Var) -> Result<arcstr::ArcStr, ScriptError> {
    let s = require_str(opcode, v)?;
    if FORBIDDEN_KEYS.contains(&s) {
        return Err(type_error(opcode, format!("key {s:?} is reserved")));
    }
    Ok(arcstr::ArcStr::from(s))
}

fn require_map<'a>(opcode: &str, v: &'a Var) -> Result<&'a Map, ScriptError> {
    v.as_map().ok_or_else(|| type_error(opcode, format!("expected an object, got {}", v.type_name())))
}

fn op_new(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut m = Map::new();
    for pair in args.chunks(2) {
        if pair.len() != 2 {
            return Err(type_error("obj.new", "expects key/value pairs"));
        }
        m.insert(require_key("obj.new", &pair[0])?, pair[1].clone());
    }
    Ok(Var::map(m))
}

fn op_keys(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.keys", &args[0])?;
    Ok(Var::list_from(m.keys().map(|k| Var::str(k.clone()))))
}

fn op_values(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.values", &args[0])?;
    Ok(Var::list_from(m.values().cloned()))
}

fn op_entries(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.entries", &args[0])?;
    Ok(Var::list_from(
        m.iter().map(|(k, v)| Var::list_from(vec![Var::str(k.clone()), v.clone()])),
    ))
}

fn op_get(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.get", &args[0])?;
    let key = require_str("obj.get", &args[1])?;
    Ok(m.get(key).cloned().unwrap_or_else(Var::none))
}

fn op_set(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.set", &args[0])?;
    let key = require_key("obj.set", &args[1])?;
    let mut out = m.clone();
    out.insert(key, args[2].clone());
    Ok(Var::map(out))
}

fn op_has(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.has", &args[0])?;
    let key = require_str("obj.has", &args[1])?;
    Ok(Var::bool(m.contains_key(key)))
}

fn op_del(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.del", &args[0])?;
    let key = require_str("obj.del", &args[1])?;
    let mut out = m.clone();
    out.remove(key);
    Ok(Var::map(out))
}

fn op_merge(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = Map::new();
    for a in args {
        for (k, v) in require_map("obj.merge", a)?.iter() {
            if FORBIDDEN_KEYS.contains(&k.as_str()) {
                return Err(type_error("obj.merge", format!("key {k:?} is reserved")));
            }
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Var::map(out))
}

fn op_map(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.map", &args[0])?.clone();
    let lambda = require_lambda("obj.map", &args[1])?.clone();
    let mut out = Map::new();
    for (k, v) in m.iter() {
        let mapped = invoke_lambda(&lambda, vec![Var::str(k.clone()), v.clone()], ctx)?;
        out.insert(k.clone(), mapped);
    }
    Ok(Var::map(out))
}

fn op_filter(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.filter", &args[0])?.clone();
    let lambda = require_lambda("obj.filter", &args[1])?.clone();
    let mut out = Map::new();
    for (k, v) in m.iter() {
        if invoke_lambda(&lambda, vec![Var::str(k.clone()), v.clone()], ctx)?.truthy() {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Var::map(out))
}

fn op_reduce(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.reduce", &args[0])?.clone();
    let lambda = require_lambda("obj.reduce", &args[1])?.clone();
    let mut acc = args[2].clone();
    for (k, v) in m.iter() {
        acc = invoke_lambda(&lambda, vec![acc, Var::str(k.clone()), v.clone()], ctx)?;
    }
    Ok(acc)
}

fn op_flat_map(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = require_map("obj.flatMap", &args[0])?.clone();
    let lambda = require_lambda("obj.flatMap", &args[1])?.clone();
    let mut out = Map::new();
    for (k, v) in m.iter() {
        let mapped = invoke_lambda(&lambda, vec![Var::str(k.clone()), v.clone()], ctx)?;
        if let Some(sub) = mapped.as_map() {
            for (sk, sv) in sub.iter() {
                out.insert(sk.clone(), sv.clone());
            }
        }
    }
    Ok(Var::map(out))
}

pub fn install(registry: &mut OpcodeRegistry) {
    let meta = |name: &'static str, label: &'static str, description: &'static str, arity: Arity, returns: SlotType| OpcodeMeta {
        name,
        label,
        category: "object",
        description,
        arity,
        params: &[SlotType::Object],
        returns,
        lazy: false,
    };
    registry.register(meta("obj.new", "New object", "construct from key/value pairs", Arity::AtLeast(0), SlotType::Object), op_new);
    registry.register(meta("obj.keys", "Keys", "list of keys", Arity::Exact(1), SlotType::List), op_keys);
    registry.register(meta("obj.values", "Values", "list of values", Arity::Exact(1), SlotType::List), op_values);
    registry.register(meta("obj.entries", "Entries", "list of [key, value] pairs", Arity::Exact(1), SlotType::List), op_entries);
    registry.register(meta("obj.get", "Get", "value at key, or null", Arity::Exact(2), SlotType::Any), op_get);
    registry.register(meta("obj.set", "Set", "new object with one key set", Arity::Exact(3), SlotType::Object), op_set);
    registry.register(meta("obj.has", "Has", "key membership test", Arity::Exact(2), SlotType::Bool), op_has);
    registry.register(meta("obj.del", "Delete", "new object with one key removed", Arity::Exact(2), SlotType::Object), op_del);
    registry.register(meta("obj.merge", "Merge", "shallow-merge objects left to right", Arity::AtLeast(1), SlotType::Object), op_merge);
    registry.register(meta("obj.map", "Map", "apply a lambda to each (key, value)", Arity::Exact(2), SlotType::Object), op_map);
    registry.register(meta("obj.filter", "Filter", "keep (key, value) pairs the predicate accepts", Arity::Exact(2), SlotType::Object), op_filter);
    registry.register(meta("obj.reduce", "Reduce", "fold (acc, key, value)", Arity::Exact(3), SlotType::Any), op_reduce);
    registry.register(meta("obj.flatMap", "FlatMap", "map each pair to an object, merge the results", Arity::Exact(2), SlotType::Object), op_flat_map);
}

#[cfg(test)]
mod tests {
    use crate::test_support::{eval_json, try_eval_json};

    #[test]
    fn set_rejects_proto_pollution_keys() {
        let result = try_eval_json(r#"["obj.set", ["obj.new"], "__proto__", 1]"#);
        assert!(result.is_err());
    }

    #[test]
    fn get_and_set_round_trip() {
        let v = eval_json(r#"["obj.get", ["obj.set", ["obj.new"], "a", 1], "a"]"#);
        assert_eq!(v.as_number(), Some(1.0));
    }

    #[test]
    fn keys_and_values_agree_in_length() {
        let obj = eval_json(r#"["obj.new", "a", 1, "b", 2]"#);
        assert_eq!(obj.as_map().unwrap().len(), 2);
    }
}
