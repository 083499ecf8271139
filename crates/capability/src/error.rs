use loom_values::CapabilityId;
use thiserror::Error;

/// Failure modes for capability operations (spec.md §4.2, §7 "PermissionDenied").
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CapabilityError {
    #[error("no such capability: {0}")]
    NotFound(CapabilityId),
    #[error("capability {0} does not grant the requested operation")]
    PermissionDenied(CapabilityId),
    #[error("capability {0} is not of the required authority type")]
    NotAuthority(CapabilityId),
    #[error("repository error: {0}")]
    Repository(#[from] loom_repository::RepositoryError),
}
