//! The durable store of entities, verbs, and capabilities (spec.md §4.1). Two
//! [`Repository`] implementations are provided: [`memory::MemoryRepository`] for tests and
//! throwaway worlds, and [`fjall_backend::FjallRepository`] for the daemon's durable default
//! (SPEC_FULL.md §4.1).

pub mod error;
pub mod fjall_backend;
pub mod memory;
pub mod model;
pub mod repository_trait;

pub use error::RepositoryError;
pub use model::{CapabilityRow, Entity, Verb, VerbPermissions};
pub use repository_trait::Repository;
