use std::fmt;

/// The unique, monotonically assigned id of an entity (spec.md §3).
///
/// Ids are never reused once assigned (`Repository` invariant); entity #0 is the system
/// object from which the world's first capabilities are bootstrapped (SPEC_FULL.md §4.2).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    pub const SYSTEM: EntityId = EntityId(0);

    pub fn new(id: i64) -> Self {
        EntityId(id)
    }

    pub fn id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// The kind tag named in spec.md §3. Used by conventions, never by the interpreter.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Zone,
    Room,
    Actor,
    Item,
    Part,
    Exit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Zone => "zone",
            EntityKind::Room => "room",
            EntityKind::Actor => "actor",
            EntityKind::Item => "item",
            EntityKind::Part => "part",
            EntityKind::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

/// The unforgeable id of a capability (spec.md §3 "Capabilities").
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct CapabilityId(pub uuid::Uuid);

impl CapabilityId {
    pub fn new_random() -> Self {
        CapabilityId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap:{}", self.0)
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({})", self.0)
    }
}
