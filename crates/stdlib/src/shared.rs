//! Small helpers shared across opcode families.

use loom_interpreter::{evaluate, ExecutionContext, Scope, ScriptError};
use loom_values::{Lambda, Var};

/// Applies a lambda to `args` under `ctx`, used by every higher-order list/object opcode
/// (spec.md §4.5 "higher-order variants take a lambda and invoke it via apply"). Mirrors the
/// `apply` opcode's own semantics (parameters bound by position, extra args ignored, missing
/// args bound to null) without going through the registry, since these are native-to-native
/// calls made from inside another handler.
pub fn invoke_lambda(lambda: &Lambda, args: Vec<Var>, ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let mut scope = Scope::from_captured(&lambda.captured);
    scope.push_layer();
    for (i, name) in lambda.params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or_else(Var::none);
        scope.bind(name.clone(), value);
    }
    let saved = std::mem::replace(&mut ctx.scope, scope);
    let result = evaluate(&lambda.body, ctx);
    ctx.scope = saved;
    result
}

pub fn type_error(opcode: &str, message: impl Into<String>) -> ScriptError {
    ScriptError::TypeError {
        opcode: opcode.to_string(),
        message: message.into(),
    }
}

pub fn require_number(opcode: &str, v: &Var) -> Result<f64, ScriptError> {
    v.as_number().ok_or_else(|| type_error(opcode, format!("expected a number, got {}", v.type_name())))
}

pub fn require_str<'a>(opcode: &str, v: &'a Var) -> Result<&'a str, ScriptError> {
    v.as_str().ok_or_else(|| type_error(opcode, format!("expected a string, got {}", v.type_name())))
}

pub fn require_list<'a>(opcode: &str, v: &'a Var) -> Result<&'a imbl::Vector<Var>, ScriptError> {
    v.as_list().ok_or_else(|| type_error(opcode, format!("expected a list, got {}", v.type_name())))
}

pub fn require_lambda<'a>(opcode: &str, v: &'a Var) -> Result<&'a Lambda, ScriptError> {
    v.as_lambda()
        .map(|l| l.as_ref())
        .ok_or_else(|| type_error(opcode, format!("expected a lambda, got {}", v.type_name())))
}
