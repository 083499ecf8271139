//! Test-only harness: a fully wired [`ExecutionContext`] (core opcodes + every stdlib family)
//! plus small JSON-literal evaluation helpers, shared by every family's unit tests.

use crate::install_all;
use loom_capability::CapabilityStore;
use loom_interpreter::{register_core_opcodes, ExecutionContext, NullSink, OpcodeRegistry, ScriptError};
use loom_repository::memory::MemoryRepository;
use loom_values::{EntityId, Var};
use std::sync::Arc;

pub fn registry() -> Arc<OpcodeRegistry> {
    let mut r = OpcodeRegistry::new();
    register_core_opcodes(&mut r);
    install_all(&mut r);
    Arc::new(r)
}

pub fn fresh_ctx() -> ExecutionContext {
    let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
    let caps = Arc::new(CapabilityStore::new(repo.clone()));
    ExecutionContext::new(
        EntityId::new(1),
        EntityId::new(1),
        vec![],
        100_000,
        512,
        repo,
        caps,
        registry(),
        Arc::new(NullSink),
        None,
    )
}

pub fn parse(json: &str) -> Var {
    serde_json::from_str(json).expect("valid script literal JSON")
}

pub fn eval_json(json: &str) -> Var {
    try_eval_json(json).expect("expected evaluation to succeed")
}

pub fn try_eval_json(json: &str) -> Result<Var, ScriptError> {
    let mut ctx = fresh_ctx();
    loom_interpreter::evaluate(&parse(json), &mut ctx)
}
