use loom_repository::RepositoryError;
use thiserror::Error;

/// Failures in the dispatcher's own plumbing — verb resolution and the `look` snapshot —
/// distinct from a [`loom_interpreter::ScriptError`], which is a sandboxed script failure
/// rather than a host failure (SPEC_FULL.md §7 "preserving the boundary between sandboxed
/// script failure and host failure").
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
