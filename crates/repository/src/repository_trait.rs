//! The abstract repository interface (spec.md §4.1). Two implementations are provided:
//! [`crate::memory::MemoryRepository`] (for tests and throwaway worlds) and
//! [`crate::fjall_backend::FjallRepository`] (the durable, embedded-KV-store-backed default).

use crate::error::RepositoryError;
use crate::model::{CapabilityRow, Entity, Verb, VerbPermissions};
use loom_values::{CapabilityId, EntityId, EntityKind, Map, Var};

pub trait Repository: Send + Sync {
    // -- Entities ---------------------------------------------------------------------------

    fn create_entity(
        &self,
        prototype: Option<EntityId>,
        location: Option<EntityId>,
        owner: Option<EntityId>,
        kind: EntityKind,
        properties: Map,
    ) -> Result<Entity, RepositoryError>;

    fn fetch_entity(&self, id: EntityId) -> Result<Entity, RepositoryError>;

    /// Merges `updates` into the entity's instance properties (spec.md §3 "writes always land
    /// on the instance, never the prototype").
    fn set_entity_properties(&self, id: EntityId, updates: Map) -> Result<Entity, RepositoryError>;

    fn set_owner(&self, id: EntityId, owner: Option<EntityId>) -> Result<(), RepositoryError>;

    /// Walks the ancestor chain of `proto` looking for `id`; fails with `CyclicPrototype` if
    /// found (mirrors the cycle check `move` performs, spec.md §4.1).
    fn set_prototype(&self, id: EntityId, proto: Option<EntityId>) -> Result<(), RepositoryError>;

    /// Deletes the entity, all verbs it owns, and all capabilities it holds, atomically.
    /// Capabilities naming it via `target_id` are also swept (spec.md §4.1 "Deletion").
    fn delete_entity(&self, id: EntityId) -> Result<(), RepositoryError>;

    /// Walks the ancestor chain of `new_container` looking for `thing`; fails with
    /// `CyclicContainment` if found, otherwise atomically updates `location` (spec.md §4.1
    /// "Move semantics").
    fn move_entity(&self, thing: EntityId, new_container: EntityId) -> Result<(), RepositoryError>;

    fn list_contents(&self, container: EntityId) -> Result<Vec<EntityId>, RepositoryError>;

    /// Resolved-property read: walks the prototype chain child→parent, returns the first
    /// occurrence (spec.md §3 "Resolved properties").
    fn resolve_property(&self, id: EntityId, key: &str) -> Result<Option<Var>, RepositoryError>;

    // -- Verbs --------------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn add_verb(
        &self,
        entity: EntityId,
        name: &str,
        code: Var,
        permissions: VerbPermissions,
        explicit_callers: Vec<EntityId>,
        owner: EntityId,
    ) -> Result<(), RepositoryError>;

    /// Prototype walk for `get_verb`: start at `entity`; if a verb named `name` exists, return
    /// it; else step to the prototype; stop at null or on a visited-set-detected cycle
    /// (spec.md §4.1, §9 "Prototype walk").
    fn get_verb(&self, entity: EntityId, name: &str) -> Result<Option<Verb>, RepositoryError>;

    /// Union across the prototype chain, nearest-wins on name collision (spec.md §4.1).
    fn list_verbs(&self, entity: EntityId) -> Result<Vec<Verb>, RepositoryError>;

    // -- Capabilities -------------------------------------------------------------------------

    fn create_capability(
        &self,
        holder: EntityId,
        parent: Option<CapabilityId>,
        cap_type: &str,
        params: Map,
    ) -> Result<CapabilityRow, RepositoryError>;

    fn get_capability(&self, id: CapabilityId) -> Result<Option<CapabilityRow>, RepositoryError>;

    fn list_capabilities(&self, holder: EntityId) -> Result<Vec<CapabilityRow>, RepositoryError>;

    fn give_capability(&self, id: CapabilityId, new_holder: EntityId) -> Result<(), RepositoryError>;

    /// Revokes `id` and, transitively, every capability whose `parent` chain passes through it
    /// (spec.md §4.2 "delegate" — "revocation of the parent invalidates descendants").
    fn revoke_capability(&self, id: CapabilityId) -> Result<(), RepositoryError>;
}
