//! The tree-walking interpreter (spec.md §4.4): turns a `Var` expression tree into a value,
//! charging gas and dispatching to opcodes registered in a shared [`OpcodeRegistry`].
//!
//! Grounded on the teacher's `vm_execute.rs` dispatch loop (`crates/kernel/src/vm/
//! vm_execute.rs`) for the evaluate-one-step shape, collapsed from a bytecode fetch/decode/
//! execute cycle onto a direct recursive walk of the expression tree, since loom has no
//! compiler or bytecode format (spec.md §1 Non-goals).

pub mod context;
pub mod core_ops;
pub mod error;
pub mod scope;

pub use context::{ExecutionContext, NullSink, OutboundSink, RecordingSink, SchedulerHandle, StackFrame};
pub use core_ops::register_core_opcodes;
pub use error::ScriptError;
pub use scope::Scope;

use loom_values::{Var, Variant};

/// The opcode registry specialized to this interpreter's context and error type (spec.md
/// §4.3). Standard library opcode families (spec.md §4.5) are registered into the same
/// instance, one layer up, by `loom-stdlib`.
pub type OpcodeRegistry = loom_opcodes::Registry<ExecutionContext, ScriptError>;

/// Evaluates one expression (spec.md §4.4, the six numbered steps):
///
/// 1. Charge 1 gas; fail with `GasExhausted` if exhausted.
/// 2. A map is literal data and self-evaluates to itself.
/// 3. A non-empty list headed by a string is a call: look the name up in the registry.
/// 4. Unknown opcode -> `UnknownOpcode`. Arity mismatch -> `ArityError`.
/// 5. A lazy opcode receives its argument expressions unevaluated; otherwise every argument
///    is evaluated left-to-right first.
/// 6. Every other shape (numbers, strings, bools, null, entities, lambdas, capabilities, and
///    the empty list) is literal data and self-evaluates. A non-empty list whose head is not a
///    string opcode name is not a valid call expression and raises `TypeError` — it never
///    legitimately occurs in a well-formed script tree.
pub fn evaluate(expr: &Var, ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    ctx.charge_gas()?;

    if let Some((name, items)) = expr.as_call() {
        let tail: Vec<Var> = items.iter().skip(1).cloned().collect();
        let Some((meta, handler)) = ctx.registry.lookup(name) else {
            return Err(ScriptError::UnknownOpcode(name.to_string()));
        };
        if !meta.arity.accepts(tail.len()) {
            return Err(ScriptError::ArityError {
                opcode: name.to_string(),
                expected: format!("{:?}", meta.arity),
                got: tail.len(),
            });
        }
        if meta.lazy {
            return handler(&tail, ctx);
        }
        let mut evaluated = Vec::with_capacity(tail.len());
        for a in &tail {
            evaluated.push(evaluate(a, ctx)?);
        }
        return handler(&evaluated, ctx);
    }

    match expr.variant() {
        // A non-empty list whose head is not a string is not a valid call expression and
        // never legitimately occurs in a well-formed script tree.
        Variant::List(items) if !items.is_empty() => Err(ScriptError::TypeError {
            opcode: "<call>".to_string(),
            message: "call expression head must be a string opcode name".to_string(),
        }),
        _ => Ok(expr.clone()),
    }
}

/// Evaluates a verb body at the call boundary (spec.md §4.4 "Call/sub-call" — "a `return`
/// anywhere in the body's evaluation aborts evaluation... and supplies the verb's result").
/// `return` surfaces as `ScriptError::Return` from [`evaluate`]; this is the one place that
/// turns it back into a normal value instead of letting it propagate as an error.
pub fn evaluate_verb_body(body: &Var, ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    match evaluate(body, ctx) {
        Err(ScriptError::Return(v)) => Ok(v),
        other => other,
    }
}
