//! `list.*` (spec.md §4.5 "List" — "semantics mirror common sequence operations;
//! higher-order variants take a lambda and invoke it via apply").
//!
//! Lists are persistent values, not mutable references (spec.md §3 "Dynamic values"): every
//! opcode here that "modifies" a list returns a new one rather than mutating in place. The
//! caller is expected to rebind with `set` (e.g. `set("xs", list.push(var("xs"), v))`).

use crate::shared::{invoke_lambda, require_lambda, require_list, require_number, type_error};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

fn index(opcode: &str, len: usize, v: &Var) -> Result<usize, ScriptError> {
    let n = require_number(opcode, v)?;
    if n < 0.0 || n as usize > len {
        return Err(type_error(opcode, format!("index {n} out of bounds (len {len})")));
    }
    Ok(n as usize)
}

fn op_new(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::list_from(args.iter().cloned()))
}

fn op_len(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::number(require_list("list.len", &args[0])?.len() as f64))
}

fn op_empty(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Ok(Var::bool(require_list("list.empty", &args[0])?.is_empty()))
}

fn op_get(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.get", &args[0])?;
    let n = require_number("list.get", &args[1])?;
    if n < 0.0 || n as usize >= list.len() {
        return Err(type_error("list.get", format!("index out of bounds (len {})", list.len())));
    }
    Ok(list.get(n as usize).cloned().unwrap())
}

fn op_set(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.set", &args[0])?;
    let n = require_number("list.set", &args[1])?;
    if n < 0.0 || n as usize >= list.len() {
        return Err(type_error("list.set", format!("index out of bounds (len {})", list.len())));
    }
    let mut out = list.clone();
    out.set(n as usize, args[2].clone());
    Ok(Var::list(out))
}

fn op_push(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = require_list("list.push", &args[0])?.clone();
    out.push_back(args[1].clone());
    Ok(Var::list(out))
}

fn op_pop(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = require_list("list.pop", &args[0])?.clone();
    out.pop_back();
    Ok(Var::list(out))
}

fn op_shift(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = require_list("list.shift", &args[0])?.clone();
    out.pop_front();
    Ok(Var::list(out))
}

fn op_unshift(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out = require_list("list.unshift", &args[0])?.clone();
    out.push_front(args[1].clone());
    Ok(Var::list(out))
}

fn op_slice(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.slice", &args[0])?;
    let start = index("list.slice", list.len(), &args[1])?;
    let end = if args.len() > 2 {
        index("list.slice", list.len(), &args[2])?
    } else {
        list.len()
    };
    if start > end {
        return Err(type_error("list.slice", "start must not exceed end"));
    }
    Ok(Var::list_from(list.iter().skip(start).take(end - start).cloned()))
}

fn op_splice(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.splice", &args[0])?;
    let start = index("list.splice", list.len(), &args[1])?;
    let delete_count = require_number("list.splice", &args[2])?.max(0.0) as usize;
    let end = (start + delete_count).min(list.len());
    let mut out: imbl::Vector<Var> = list.iter().take(start).cloned().collect();
    for item in args[3..].iter() {
        out.push_back(item.clone());
    }
    out.extend(list.iter().skip(end).cloned());
    Ok(Var::list(out))
}

fn op_concat(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut out: imbl::Vector<Var> = imbl::Vector::new();
    for a in args {
        out.extend(require_list("list.concat", a)?.iter().cloned());
    }
    Ok(Var::list(out))
}

fn op_includes(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.includes", &args[0])?;
    Ok(Var::bool(list.iter().any(|v| v == &args[1])))
}

fn op_reverse(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.reverse", &args[0])?;
    Ok(Var::list_from(list.iter().rev().cloned()))
}

fn op_sort(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.sort", &args[0])?.clone();
    let mut items: Vec<Var> = list.into_iter().collect();
    if let Some(cmp) = args.get(1) {
        let lambda = require_lambda("list.sort", cmp)?.clone();
        let mut err = None;
        items.sort_by(|a, b| {
            if err.is_some() {
                return std::cmp::Ordering::Equal;
            }
            match invoke_lambda(&lambda, vec![a.clone(), b.clone()], ctx) {
                Ok(v) => v
                    .as_number()
                    .unwrap_or(0.0)
                    .partial_cmp(&0.0)
                    .unwrap_or(std::cmp::Ordering::Equal),
                Err(e) => {
                    err = Some(e);
                    std::cmp::Ordering::Equal
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
    } else {
        items.sort_by(|a, b| match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => a
                .as_str()
                .unwrap_or_default()
                .cmp(b.as_str().unwrap_or_default()),
        });
    }
    Ok(Var::list_from(items))
}

fn op_find(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.find", &args[0])?.clone();
    let lambda = require_lambda("list.find", &args[1])?.clone();
    for item in list.iter() {
        if invoke_lambda(&lambda, vec![item.clone()], ctx)?.truthy() {
            return Ok(item.clone());
        }
    }
    Ok(Var::none())
}

fn op_map(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.map", &args[0])?.clone();
    let lambda = require_lambda("list.map", &args[1])?.clone();
    let mut out = imbl::Vector::new();
    for item in list.iter() {
        out.push_back(invoke_lambda(&lambda, vec![item.clone()], ctx)?);
    }
    Ok(Var::list(out))
}

fn op_filter(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.filter", &args[0])?.clone();
    let lambda = require_lambda("list.filter", &args[1])?.clone();
    let mut out = imbl::Vector::new();
    for item in list.iter() {
        if invoke_lambda(&lambda, vec![item.clone()], ctx)?.truthy() {
            out.push_back(item.clone());
        }
    }
    Ok(Var::list(out))
}

fn op_reduce(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.reduce", &args[0])?.clone();
    let lambda = require_lambda("list.reduce", &args[1])?.clone();
    let mut acc = args[2].clone();
    for item in list.iter() {
        acc = invoke_lambda(&lambda, vec![acc, item.clone()], ctx)?;
    }
    Ok(acc)
}

fn op_flat_map(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.flatMap", &args[0])?.clone();
    let lambda = require_lambda("list.flatMap", &args[1])?.clone();
    let mut out = imbl::Vector::new();
    for item in list.iter() {
        let mapped = invoke_lambda(&lambda, vec![item.clone()], ctx)?;
        match mapped.as_list() {
            Some(sub) => out.extend(sub.iter().cloned()),
            None => out.push_back(mapped),
        }
    }
    Ok(Var::list(out))
}

fn op_join(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let list = require_list("list.join", &args[0])?;
    let sep = args[1].as_str().unwrap_or("");
    let parts: Vec<String> = list
        .iter()
        .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| crate::string::display(v)))
        .collect();
    Ok(Var::str(parts.join(sep)))
}

pub fn install(registry: &mut OpcodeRegistry) {
    let meta = |name: &'static str,
                label: &'static str,
                description: &'static str,
                arity: Arity,
                returns: SlotType| OpcodeMeta {
        name,
        label,
        category: "list",
        description,
        arity,
        params: &[SlotType::List],
        returns,
        lazy: false,
    };
    registry.register(meta("list.new", "New list", "construct a list from arguments", Arity::AtLeast(0), SlotType::List), op_new);
    registry.register(meta("list.len", "Length", "number of elements", Arity::Exact(1), SlotType::Number), op_len);
    registry.register(meta("list.empty", "Empty?", "true if the list has no elements", Arity::Exact(1), SlotType::Bool), op_empty);
    registry.register(meta("list.get", "Get", "element at index", Arity::Exact(2), SlotType::Any), op_get);
    registry.register(meta("list.set", "Set", "new list with one element replaced", Arity::Exact(3), SlotType::List), op_set);
    registry.register(meta("list.push", "Push", "new list with a value appended", Arity::Exact(2), SlotType::List), op_push);
    registry.register(meta("list.pop", "Pop", "new list without its last element", Arity::Exact(1), SlotType::List), op_pop);
    registry.register(meta("list.shift", "Shift", "new list without its first element", Arity::Exact(1), SlotType::List), op_shift);
    registry.register(meta("list.unshift", "Unshift", "new list with a value prepended", Arity::Exact(2), SlotType::List), op_unshift);
    registry.register(meta("list.slice", "Slice", "sub-list [start, end)", Arity::Range(2, 3), SlotType::List), op_slice);
    registry.register(meta("list.splice", "Splice", "remove and insert elements at an index", Arity::AtLeast(3), SlotType::List), op_splice);
    registry.register(meta("list.concat", "Concat", "concatenate lists", Arity::AtLeast(1), SlotType::List), op_concat);
    registry.register(meta("list.includes", "Includes", "membership test", Arity::Exact(2), SlotType::Bool), op_includes);
    registry.register(meta("list.reverse", "Reverse", "new list in reverse order", Arity::Exact(1), SlotType::List), op_reverse);
    registry.register(meta("list.sort", "Sort", "sort, optionally by a comparator lambda", Arity::Range(1, 2), SlotType::List), op_sort);
    registry.register(meta("list.find", "Find", "first element for which the predicate is truthy", Arity::Exact(2), SlotType::Any), op_find);
    registry.register(meta("list.map", "Map", "apply a lambda to each element", Arity::Exact(2), SlotType::List), op_map);
    registry.register(meta("list.filter", "Filter", "keep elements for which the predicate is truthy", Arity::Exact(2), SlotType::List), op_filter);
    registry.register(meta("list.reduce", "Reduce", "fold the list with an accumulator", Arity::Exact(3), SlotType::Any), op_reduce);
    registry.register(meta("list.flatMap", "FlatMap", "map then flatten one level", Arity::Exact(2), SlotType::List), op_flat_map);
    registry.register(meta("list.join", "Join", "join elements with a separator string", Arity::Exact(2), SlotType::String), op_join);
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn push_pop_are_pure() {
        let v = eval_json(r#"["list.push", ["list.new", 1, 2], 3]"#);
        assert_eq!(v.as_list().unwrap().len(), 3);
    }

    #[test]
    fn map_applies_lambda_to_each_element() {
        let v = eval_json(r#"["list.map", ["list.new", 1, 2, 3], ["lambda", ["x"], ["*", ["var", "x"], 2]]]"#);
        let items: Vec<f64> = v.as_list().unwrap().iter().map(|x| x.as_number().unwrap()).collect();
        assert_eq!(items, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn reduce_sums_a_list() {
        let v = eval_json(
            r#"["list.reduce", ["list.new", 1, 2, 3, 4], ["lambda", ["acc", "x"], ["+", ["var", "acc"], ["var", "x"]]], 0]"#,
        );
        assert_eq!(v.as_number(), Some(10.0));
    }

    #[test]
    fn slice_excludes_end_index() {
        let v = eval_json(r#"["list.slice", ["list.new", 1, 2, 3, 4], 1, 3]"#);
        let items: Vec<f64> = v.as_list().unwrap().iter().map(|x| x.as_number().unwrap()).collect();
        assert_eq!(items, vec![2.0, 3.0]);
    }

    #[test]
    fn get_out_of_bounds_is_type_error() {
        let result = crate::test_support::try_eval_json(r#"["list.get", ["list.new", 1], 5]"#);
        assert!(result.is_err());
    }
}
