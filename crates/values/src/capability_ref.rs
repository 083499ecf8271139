use crate::obj::{CapabilityId, EntityId};
use arcstr::ArcStr;

/// The `capability-ref(id+type+holder)` value described in spec.md §9 "Dynamic values".
///
/// This is a *value*, carried around by scripts like any other `Var`; it is not itself
/// authoritative. Every privileged operation re-resolves the id against the capability store
/// before trusting `cap_type`/`holder` (spec.md §4.2 `validate`), so a stale or forged-looking
/// `CapabilityRef` can never grant authority it doesn't actually have in the store.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CapabilityRef {
    pub id: CapabilityId,
    pub cap_type: ArcStr,
    pub holder: EntityId,
}

impl CapabilityRef {
    pub fn new(id: CapabilityId, cap_type: impl Into<ArcStr>, holder: EntityId) -> Self {
        CapabilityRef {
            id,
            cap_type: cap_type.into(),
            holder,
        }
    }
}
