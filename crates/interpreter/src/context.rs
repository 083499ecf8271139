//! The execution context described in spec.md §3 "Execution context": everything one
//! `evaluate` call tree shares — caller/this/args, the gas meter, warnings, the scope stack,
//! a diagnostic call stack, and the handles an opcode handler needs to reach the repository,
//! capability store, opcode registry, and outbound message channel.
//!
//! Grounded on the teacher's `VMExecState`/`Activation` split (`crates/kernel/src/vm/
//! exec_state.rs`, `activation.rs`) — kept the "one struct carries the whole per-call-frame
//! state, cloned-and-narrowed for a sub-call" shape, collapsed onto a single `ExecutionContext`
//! since loom has no bytecode frame/fork machinery to track separately (spec.md §1 Non-goals).

use crate::error::ScriptError;
use crate::scope::Scope;
use crate::OpcodeRegistry;
use arcstr::ArcStr;
use loom_capability::CapabilityStore;
use loom_repository::Repository;
use loom_values::{EntityId, Var};
use std::sync::Arc;

/// One frame of `ctx.stack` (spec.md §3 "stack (name+arg frames for diagnostics)").
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub verb_name: ArcStr,
    pub this: EntityId,
    pub args: Vec<Var>,
}

/// The outbound channel toward a client (spec.md §3 "an outbound `send` channel"). The
/// dispatcher crate provides the concrete implementation; the interpreter only needs to be
/// able to hand a message to *something* without knowing about connections or transport
/// framing (spec.md §4.7 "scripts never see the transport directly").
pub trait OutboundSink: Send + Sync {
    fn send(&self, channel: &str, payload: &Var);
}

/// A no-op sink, useful for tests and for scripts run outside any live connection (e.g. the
/// scheduler, which has no client attached — spec.md §4.6).
#[derive(Default)]
pub struct NullSink;

impl OutboundSink for NullSink {
    fn send(&self, _channel: &str, _payload: &Var) {}
}

/// A sink that records every send for test assertions.
#[derive(Default)]
pub struct RecordingSink(std::sync::Mutex<Vec<(String, Var)>>);

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Var)> {
        self.0.lock().unwrap().clone()
    }
}

impl OutboundSink for RecordingSink {
    fn send(&self, channel: &str, payload: &Var) {
        self.0.lock().unwrap().push((channel.to_string(), payload.clone()));
    }
}

/// What the `schedule` opcode (spec.md §4.5 "Meta") enqueues onto. Implemented by the
/// scheduler crate, which sits above this one in the dependency graph (spec.md §2); the trait
/// lives here so `ExecutionContext` can hold an optional handle without the interpreter crate
/// depending on the scheduler crate.
pub trait SchedulerHandle: Send + Sync {
    fn schedule(&self, entity: EntityId, verb_name: String, args: Vec<Var>, delay_ms: i64);
}

/// Everything one `evaluate` call tree shares (spec.md §3 "Execution context").
pub struct ExecutionContext {
    pub caller: EntityId,
    pub this: EntityId,
    pub args: Vec<Var>,
    pub gas: i64,
    pub warnings: Vec<String>,
    pub scope: Scope,
    pub stack: Vec<StackFrame>,
    pub depth: usize,
    pub max_stack_depth: usize,
    pub repository: Arc<dyn Repository>,
    pub capabilities: Arc<CapabilityStore>,
    pub registry: Arc<OpcodeRegistry>,
    pub sink: Arc<dyn OutboundSink>,
    pub scheduler: Option<Arc<dyn SchedulerHandle>>,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        caller: EntityId,
        this: EntityId,
        args: Vec<Var>,
        gas: i64,
        max_stack_depth: usize,
        repository: Arc<dyn Repository>,
        capabilities: Arc<CapabilityStore>,
        registry: Arc<OpcodeRegistry>,
        sink: Arc<dyn OutboundSink>,
        scheduler: Option<Arc<dyn SchedulerHandle>>,
    ) -> Self {
        ExecutionContext {
            caller,
            this,
            args,
            gas,
            warnings: Vec::new(),
            scope: Scope::new(),
            stack: Vec::new(),
            depth: 0,
            max_stack_depth,
            repository,
            capabilities,
            registry,
            sink,
            scheduler,
        }
    }

    /// Every `evaluate` step costs 1 gas (spec.md §4.4 step 1, §9 "the gas cost of a
    /// successful `evaluate` on a bare literal is 1... do not optimize... to 0 cost").
    pub fn charge_gas(&mut self) -> Result<(), ScriptError> {
        self.gas -= 1;
        if self.gas < 0 {
            return Err(ScriptError::GasExhausted);
        }
        Ok(())
    }

    /// Builds the fresh context for a direct verb `call` (spec.md §4.4 "Call/sub-call"):
    /// same `caller` (authority flows through), a fresh scope, gas *inherited* rather than a
    /// new budget (spec.md §9 "a sub-call inherits remaining gas, not a fresh budget").
    pub fn sub_context_for_call(
        &self,
        target: EntityId,
        args: Vec<Var>,
        verb_name: &str,
    ) -> Result<ExecutionContext, ScriptError> {
        self.sub_context(target, args, verb_name, self.gas)
    }

    /// Builds the fresh context for a scheduler- or broadcast-triggered event invocation,
    /// capped at `min(remaining, cap)` rather than fully inherited (spec.md §9 "the 500-gas
    /// sub-budgets... appear to be an optimization for externally-triggered events").
    pub fn sub_context_for_event(
        &self,
        target: EntityId,
        args: Vec<Var>,
        verb_name: &str,
        cap: i64,
    ) -> Result<ExecutionContext, ScriptError> {
        self.sub_context(target, args, verb_name, self.gas.min(cap))
    }

    fn sub_context(
        &self,
        target: EntityId,
        args: Vec<Var>,
        verb_name: &str,
        gas: i64,
    ) -> Result<ExecutionContext, ScriptError> {
        if self.depth + 1 >= self.max_stack_depth {
            return Err(ScriptError::StackDepthExceeded);
        }
        let mut stack = self.stack.clone();
        stack.push(StackFrame {
            verb_name: ArcStr::from(verb_name),
            this: target,
            args: args.clone(),
        });
        Ok(ExecutionContext {
            caller: self.caller,
            this: target,
            args,
            gas,
            warnings: Vec::new(),
            scope: Scope::new(),
            stack,
            depth: self.depth + 1,
            max_stack_depth: self.max_stack_depth,
            repository: self.repository.clone(),
            capabilities: self.capabilities.clone(),
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            scheduler: self.scheduler.clone(),
        })
    }

    /// Folds a returned sub-context's gas consumption and warnings back into `self` (spec.md
    /// §4.4 "same `warnings` list" — approximated here by appending on return, since the two
    /// contexts run strictly nested within one native call stack rather than concurrently).
    pub fn merge_sub_result(&mut self, sub: ExecutionContext) {
        self.gas = sub.gas;
        self.warnings.extend(sub.warnings);
    }
}
