//! The data model described in spec.md §3 and persisted per spec.md §6.

use loom_values::{CapabilityId, EntityId, EntityKind, Map, Var};
use serde::{Deserialize, Serialize};

/// An entity row (spec.md §3 "Entities").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub prototype: Option<EntityId>,
    pub location: Option<EntityId>,
    pub owner: Option<EntityId>,
    pub kind: EntityKind,
    pub properties: Map,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Call-scope for a verb (spec.md §3 "Verbs").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VerbPermissions {
    Public,
    Owner,
    /// An explicit allow-list of caller entities (serialized separately to keep this variant
    /// unit-like would lose the list; kept as a tuple variant instead).
    Explicit,
}

/// The explicit-list form of `VerbPermissions`, split out because spec.md §3 describes the
/// call-scope as "public / owner / explicit list" — the list only exists in the third case.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Verb {
    pub entity: EntityId,
    pub name: String,
    pub code: Var,
    pub permissions: VerbPermissions,
    pub explicit_callers: Vec<EntityId>,
    pub owner: EntityId,
}

impl Verb {
    pub fn callable_by(&self, caller: EntityId) -> bool {
        match self.permissions {
            VerbPermissions::Public => true,
            VerbPermissions::Owner => caller == self.owner,
            VerbPermissions::Explicit => {
                caller == self.owner || self.explicit_callers.contains(&caller)
            }
        }
    }
}

/// A capability row (spec.md §3 "Capabilities").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityRow {
    pub id: CapabilityId,
    pub holder: EntityId,
    pub parent: Option<CapabilityId>,
    pub cap_type: String,
    pub params: Map,
}
