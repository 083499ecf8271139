//! The opcodes that belong to the interpreter itself rather than to the standard library
//! (spec.md §4.4 "Scoping", "Control flow", "Lambdas", "Call/sub-call"): `let`/`set`/`var`,
//! `seq`/`if`/`while`/`for`/`try`/`throw`/`return`, `lambda`/`apply`, and `call`. These are
//! registered by [`crate::register_core_opcodes`] directly into the shared
//! [`crate::OpcodeRegistry`] — the standard library's families (spec.md §4.5) are registered
//! into the same registry by `loom-stdlib`, one layer up.
//!
//! Grounded on the teacher's opcode dispatch in `crates/kernel/src/vm/moo_execute.rs` for the
//! control-flow shape, and `activation.rs`/`vm_call.rs` for the verb-call boundary (catching
//! the equivalent of a function return at the call site).

use crate::context::ExecutionContext;
use crate::error::ScriptError;
use crate::evaluate;
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::{Lambda, Var};

fn arg_name<'a>(opcode: &str, v: &'a Var) -> Result<&'a str, ScriptError> {
    v.as_str().ok_or_else(|| ScriptError::TypeError {
        opcode: opcode.to_string(),
        message: "expected a variable name string".to_string(),
    })
}

fn op_let(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let name = arg_name("let", &args[0])?.to_string();
    let value = evaluate(&args[1], ctx)?;
    ctx.scope.bind(name, value.clone());
    Ok(value)
}

fn op_set(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let name = arg_name("set", &args[0])?.to_string();
    let value = evaluate(&args[1], ctx)?;
    if !ctx.scope.assign(&name, value.clone()) {
        return Err(ScriptError::UnknownVariable(name));
    }
    Ok(value)
}

fn op_var(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let name = arg_name("var", &args[0])?;
    Ok(ctx.scope.get(name).cloned().unwrap_or_else(Var::none))
}

fn op_seq(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut result = Var::none();
    for a in args {
        result = evaluate(a, ctx)?;
    }
    Ok(result)
}

fn op_if(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cond = evaluate(&args[0], ctx)?;
    if cond.truthy() {
        evaluate(&args[1], ctx)
    } else if args.len() > 2 {
        evaluate(&args[2], ctx)
    } else {
        Ok(Var::none())
    }
}

fn op_while(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut result = Var::none();
    loop {
        let cond = evaluate(&args[0], ctx)?;
        if !cond.truthy() {
            break;
        }
        result = evaluate(&args[1], ctx)?;
    }
    Ok(result)
}

fn op_for(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let name = arg_name("for", &args[0])?.to_string();
    let list_val = evaluate(&args[1], ctx)?;
    let items = list_val
        .as_list()
        .ok_or_else(|| ScriptError::TypeError {
            opcode: "for".to_string(),
            message: "second argument must evaluate to a list".to_string(),
        })?
        .clone();
    let mut result = Var::none();
    ctx.scope.push_layer();
    for item in items.iter() {
        ctx.scope.bind(name.clone(), item.clone());
        match evaluate(&args[2], ctx) {
            Ok(v) => result = v,
            Err(e) => {
                ctx.scope.pop_layer();
                return Err(e);
            }
        }
    }
    ctx.scope.pop_layer();
    Ok(result)
}

fn op_try(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    match evaluate(&args[0], ctx) {
        Ok(v) => Ok(v),
        Err(e) if !e.is_catchable() => Err(e),
        Err(e) => {
            let name = arg_name("try", &args[1])?.to_string();
            ctx.scope.push_layer();
            ctx.scope.bind(name, Var::str(e.to_string()));
            let result = evaluate(&args[2], ctx);
            ctx.scope.pop_layer();
            result
        }
    }
}

fn op_throw(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let v = &args[0];
    let msg = v
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{v:?}"));
    Err(ScriptError::UserError(msg))
}

fn op_return(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    Err(ScriptError::Return(args.first().cloned().unwrap_or_else(Var::none)))
}

fn op_lambda(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let names = args[0].as_list().ok_or_else(|| ScriptError::TypeError {
        opcode: "lambda".to_string(),
        message: "first argument must be a list of parameter names".to_string(),
    })?;
    let mut params = Vec::with_capacity(names.len());
    for n in names.iter() {
        let s = n.as_str().ok_or_else(|| ScriptError::TypeError {
            opcode: "lambda".to_string(),
            message: "parameter names must be strings".to_string(),
        })?;
        params.push(arcstr::ArcStr::from(s));
    }
    let captured = ctx.scope.snapshot();
    Ok(Var::lambda(Lambda::new(params, args[1].clone(), captured)))
}

fn op_apply(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let lambda = args[0]
        .as_lambda()
        .ok_or_else(|| ScriptError::TypeError {
            opcode: "apply".to_string(),
            message: "first argument must be a lambda".to_string(),
        })?
        .clone();
    let call_args = &args[1..];

    let mut scope = crate::scope::Scope::from_captured(&lambda.captured);
    scope.push_layer();
    for (i, name) in lambda.params.iter().enumerate() {
        let value = call_args.get(i).cloned().unwrap_or_else(Var::none);
        scope.bind(name.clone(), value);
    }

    let saved_scope = std::mem::replace(&mut ctx.scope, scope);
    let result = evaluate(&lambda.body, ctx);
    ctx.scope = saved_scope;
    result
}

fn op_call(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let target = args[0].as_entity().ok_or_else(|| ScriptError::TypeError {
        opcode: "call".to_string(),
        message: "first argument must be an entity".to_string(),
    })?;
    let verb_name = args[1].as_str().ok_or_else(|| ScriptError::TypeError {
        opcode: "call".to_string(),
        message: "second argument must be a verb name string".to_string(),
    })?;
    let call_args: Vec<Var> = args[2..].to_vec();

    let verb = ctx
        .repository
        .get_verb(target, verb_name)?
        .ok_or_else(|| ScriptError::NotFound(format!("verb {verb_name} on {target}")))?;
    if !verb.callable_by(ctx.caller) {
        return Err(ScriptError::PermissionDenied(format!(
            "{} may not call {verb_name} on {target}",
            ctx.caller
        )));
    }

    let mut sub_ctx = ctx.sub_context_for_call(target, call_args, verb_name)?;
    let result = crate::evaluate_verb_body(&verb.code, &mut sub_ctx);
    ctx.merge_sub_result(sub_ctx);
    result
}

macro_rules! meta {
    ($name:expr, $label:expr, $category:expr, $description:expr, $arity:expr, $params:expr, $returns:expr, $lazy:expr) => {
        OpcodeMeta {
            name: $name,
            label: $label,
            category: $category,
            description: $description,
            arity: $arity,
            params: $params,
            returns: $returns,
            lazy: $lazy,
        }
    };
}

/// Registers every opcode owned by the interpreter layer itself (spec.md §4.4). Standard
/// library families (spec.md §4.5) are registered separately by `loom-stdlib` into the same
/// registry instance.
pub fn register_core_opcodes(registry: &mut crate::OpcodeRegistry) {
    registry.register(
        meta!(
            "let",
            "Let",
            "scope",
            "bind a name in the innermost scope",
            Arity::Exact(2),
            &[SlotType::String, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_let,
    );
    registry.register(
        meta!(
            "set",
            "Set",
            "scope",
            "reassign an existing binding",
            Arity::Exact(2),
            &[SlotType::String, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_set,
    );
    registry.register(
        meta!(
            "var",
            "Var",
            "scope",
            "read the nearest binding, or null",
            Arity::Exact(1),
            &[SlotType::String],
            SlotType::Any,
            true
        ),
        op_var,
    );
    registry.register(
        meta!(
            "seq",
            "Sequence",
            "control",
            "evaluate each argument in order, return the last",
            Arity::AtLeast(0),
            &[],
            SlotType::Any,
            true
        ),
        op_seq,
    );
    registry.register(
        meta!(
            "if",
            "If",
            "control",
            "evaluate cond, then one branch",
            Arity::Range(2, 3),
            &[SlotType::Any, SlotType::Any, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_if,
    );
    registry.register(
        meta!(
            "while",
            "While",
            "control",
            "evaluate cond/body repeatedly",
            Arity::Exact(2),
            &[SlotType::Any, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_while,
    );
    registry.register(
        meta!(
            "for",
            "For",
            "control",
            "bind name to each element of list in order",
            Arity::Exact(3),
            &[SlotType::String, SlotType::List, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_for,
    );
    registry.register(
        meta!(
            "try",
            "Try",
            "control",
            "catch a ScriptError from body and run handler",
            Arity::Exact(3),
            &[SlotType::Any, SlotType::String, SlotType::Any],
            SlotType::Any,
            true
        ),
        op_try,
    );
    registry.register(
        meta!(
            "throw",
            "Throw",
            "control",
            "raise a UserError",
            Arity::Exact(1),
            &[SlotType::Any],
            SlotType::Any,
            false
        ),
        op_throw,
    );
    registry.register(
        meta!(
            "return",
            "Return",
            "control",
            "non-error early exit from the enclosing verb",
            Arity::Range(0, 1),
            &[SlotType::Any],
            SlotType::Any,
            false
        ),
        op_return,
    );
    registry.register(
        meta!(
            "lambda",
            "Lambda",
            "functions",
            "construct a closure over the current scope",
            Arity::Exact(2),
            &[SlotType::List, SlotType::Any],
            SlotType::Lambda,
            true
        ),
        op_lambda,
    );
    registry.register(
        meta!(
            "apply",
            "Apply",
            "functions",
            "invoke a lambda with positional arguments",
            Arity::AtLeast(1),
            &[SlotType::Lambda],
            SlotType::Any,
            false
        ),
        op_apply,
    );
    registry.register(
        meta!(
            "call",
            "Call",
            "verbs",
            "resolve and invoke a verb on another entity",
            Arity::AtLeast(2),
            &[SlotType::Entity, SlotType::String],
            SlotType::Any,
            false
        ),
        op_call,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NullSink, RecordingSink};
    use crate::{evaluate, OpcodeRegistry};
    use loom_capability::CapabilityStore;
    use loom_repository::memory::MemoryRepository;
    use loom_repository::VerbPermissions;
    use loom_values::{EntityId, EntityKind, Map};
    use std::sync::Arc;

    fn registry() -> Arc<OpcodeRegistry> {
        let mut r = OpcodeRegistry::new();
        register_core_opcodes(&mut r);
        Arc::new(r)
    }

    fn ctx() -> ExecutionContext {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        ExecutionContext::new(
            EntityId::new(1),
            EntityId::new(1),
            vec![],
            10_000,
            512,
            repo,
            caps,
            registry(),
            Arc::new(NullSink),
            None,
        )
    }

    fn parse(json: &str) -> Var {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn s1_arithmetic_chain_needs_stdlib_but_core_seq_works() {
        let mut c = ctx();
        let expr = parse(r#"["seq", ["let","x",1], ["let","y",2], ["var","x"]]"#);
        let result = evaluate(&expr, &mut c).unwrap();
        assert_eq!(result.as_number(), Some(1.0));
    }

    #[test]
    fn s2_closure_capture() {
        let mut c = ctx();
        let expr = parse(
            r#"["seq",
                ["let","x",10],
                ["let","addX",["lambda",["y"],["var","x"]]],
                ["apply",["var","addX"],5]
            ]"#,
        );
        let result = evaluate(&expr, &mut c).unwrap();
        assert_eq!(result.as_number(), Some(10.0));
    }

    #[test]
    fn lambda_closure_survives_outer_rebind() {
        let mut c = ctx();
        // x=10 captured; outer x later rebound to 99; the lambda still sees 10.
        let expr = parse(
            r#"["seq",
                ["let","x",10],
                ["let","f",["lambda",[],["var","x"]]],
                ["set","x",99],
                ["apply",["var","f"]]
            ]"#,
        );
        let result = evaluate(&expr, &mut c).unwrap();
        assert_eq!(result.as_number(), Some(10.0));
    }

    #[test]
    fn s5_gas_exhaustion_on_infinite_while() {
        let mut c = ctx();
        c.gas = 100;
        let expr = parse(r#"["while", true, ["seq"]]"#);
        let err = evaluate(&expr, &mut c).unwrap_err();
        assert_eq!(err, ScriptError::GasExhausted);
    }

    #[test]
    fn set_on_unbound_name_is_unknown_variable() {
        let mut c = ctx();
        let expr = parse(r#"["set", "never_let", 1]"#);
        let err = evaluate(&expr, &mut c).unwrap_err();
        assert_eq!(err, ScriptError::UnknownVariable("never_let".to_string()));
    }

    #[test]
    fn try_catches_throw_and_binds_message() {
        let mut c = ctx();
        let expr = parse(r#"["try", ["throw", "boom"], "e", ["var", "e"]]"#);
        let result = evaluate(&expr, &mut c).unwrap();
        assert_eq!(result.as_str(), Some("boom"));
    }

    #[test]
    fn return_is_caught_only_at_verb_boundary_not_by_try() {
        let mut c = ctx();
        // `try` must not catch `return` — it should propagate straight through.
        let expr = parse(r#"["try", ["return", 42], "e", ["var", "e"]]"#);
        let err = evaluate(&expr, &mut c).unwrap_err();
        assert_eq!(err, ScriptError::Return(Var::number(42.0)));
    }

    #[test]
    fn call_resolves_verb_by_prototype_walk_and_catches_return() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let proto = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        let child = repo
            .create_entity(Some(proto.id), None, None, EntityKind::Item, Map::new())
            .unwrap();
        repo.add_verb(
            proto.id,
            "greet",
            parse(r#"["return", "hi"]"#),
            VerbPermissions::Public,
            vec![],
            proto.id,
        )
        .unwrap();

        let mut c = ExecutionContext::new(
            EntityId::new(1),
            EntityId::new(1),
            vec![],
            10_000,
            512,
            repo,
            caps,
            registry(),
            Arc::new(RecordingSink::new()),
            None,
        );
        let expr = Var::list_from(vec![Var::str("call"), Var::entity(child.id), Var::str("greet")]);
        let result = evaluate(&expr, &mut c).unwrap();
        assert_eq!(result.as_str(), Some("hi"));
    }
}
