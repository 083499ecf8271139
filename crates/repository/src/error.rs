use loom_values::{CapabilityId, EntityId};
use thiserror::Error;

/// Failure modes named in spec.md §4.1.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RepositoryError {
    #[error("no such entity: {0}")]
    EntityNotFound(EntityId),
    #[error("no such verb: {1} on {0}")]
    VerbNotFound(EntityId, String),
    #[error("no such capability: {0}")]
    CapabilityNotFound(CapabilityId),
    #[error("move of {0} into {1} would create a cycle")]
    CyclicContainment(EntityId, EntityId),
    #[error("setting prototype of {0} to {1} would create a cycle")]
    CyclicPrototype(EntityId, EntityId),
    #[error("verb {1} already exists on {0}")]
    DuplicateVerb(EntityId, String),
    #[error("storage integrity error: {0}")]
    IntegrityError(String),
}
