use loom_values::{CapabilityId, EntityId};
use thiserror::Error;

/// Every error kind a script can raise and `try` can catch (spec.md §7), plus the
/// `Return` control signal (spec.md §4.4 "a non-error early exit... caught by the enclosing
/// verb invocation"). `Return` is folded into this type rather than kept as a parallel
/// channel so that a single `Result<Var, ScriptError>` suffices throughout `evaluate` and its
/// handlers; `try` is the one place that must remember *not* to catch it (spec.md §4.4 `try`
/// only catches `ScriptError` proper).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("wrong number of arguments to {opcode}: expected {expected}, got {got}")]
    ArityError {
        opcode: String,
        expected: String,
        got: usize,
    },
    #[error("type error in {opcode}: {message}")]
    TypeError { opcode: String, message: String },
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cyclic containment: moving {0} into {1} would create a cycle")]
    CyclicContainment(EntityId, EntityId),
    #[error("gas exhausted")]
    GasExhausted,
    #[error("{0}")]
    UserError(String),
    #[error("stack depth exceeded")]
    StackDepthExceeded,
    /// Not a catchable error: the `return` opcode's early-exit signal (spec.md §4.4).
    #[error("return signal escaped its verb invocation")]
    Return(loom_values::Var),
}

impl ScriptError {
    /// Whether `try` should catch this (spec.md §4.4 `try` — `Return` passes through
    /// untouched to the enclosing verb invocation instead).
    pub fn is_catchable(&self) -> bool {
        !matches!(self, ScriptError::Return(_))
    }

    pub fn permission_denied_for_capability(id: CapabilityId) -> Self {
        ScriptError::PermissionDenied(format!("capability {id} does not grant this operation"))
    }
}

impl From<loom_repository::RepositoryError> for ScriptError {
    fn from(e: loom_repository::RepositoryError) -> Self {
        use loom_repository::RepositoryError as R;
        match e {
            R::EntityNotFound(id) => ScriptError::NotFound(format!("entity {id}")),
            R::VerbNotFound(id, name) => ScriptError::NotFound(format!("verb {name} on {id}")),
            R::CapabilityNotFound(id) => ScriptError::NotFound(format!("capability {id}")),
            R::CyclicContainment(a, b) => ScriptError::CyclicContainment(a, b),
            R::CyclicPrototype(a, b) => {
                ScriptError::TypeError {
                    opcode: "set_prototype".to_string(),
                    message: format!("{a} -> {b} would create a prototype cycle"),
                }
            }
            R::DuplicateVerb(id, name) => ScriptError::TypeError {
                opcode: "add_verb".to_string(),
                message: format!("verb {name} already exists on {id}"),
            },
            R::IntegrityError(msg) => ScriptError::TypeError {
                opcode: "<repository>".to_string(),
                message: msg,
            },
        }
    }
}

impl From<loom_capability::CapabilityError> for ScriptError {
    fn from(e: loom_capability::CapabilityError) -> Self {
        use loom_capability::CapabilityError as C;
        match e {
            C::NotFound(id) => ScriptError::NotFound(format!("capability {id}")),
            C::PermissionDenied(id) => ScriptError::permission_denied_for_capability(id),
            C::NotAuthority(id) => ScriptError::permission_denied_for_capability(id),
            C::Repository(re) => ScriptError::from(re),
        }
    }
}
