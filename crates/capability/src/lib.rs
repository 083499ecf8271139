//! Capability minting, validation, delegation, and revocation (spec.md §4.2).
//!
//! Generalizes the teacher's fixed wizard/owner/programmer permission bits
//! (`crates/common/src/model/permissions.rs`'s `Perms::check_*`) into loom's open-ended
//! type+params capability model — the capability-gated form is the intended direction named
//! in spec.md §9's open questions over the superseded `checkPermission(view/edit)` form.

pub mod error;

pub use error::CapabilityError;

use arcstr::ArcStr;
use loom_repository::{CapabilityRow, Repository};
use loom_values::{CapabilityId, CapabilityRef, EntityId, Map, Var};
use std::sync::Arc;

/// The authority type that mediates `mint` (SPEC_FULL.md §4.2 "seed `sys.sudo`").
pub const MINT_AUTHORITY_TYPE: &str = "sys.mint";

/// What a presented capability must cover for `validate` to succeed (spec.md §4.2 "covers").
#[derive(Clone, Debug)]
pub enum RequiredOp {
    /// The capability must cover operations on this specific entity: either a wildcard
    /// (`*:true`) or an exact `target_id` match.
    OnEntity(EntityId),
    /// The capability must be a `sys.mint` authority whose namespace covers this type
    /// (`namespace:N` covers `N` or `N.*`).
    MintsType(String),
    /// No coverage requirement beyond existence and holder identity — used by operations
    /// (like `give`) that only need to confirm the caller currently possesses the token.
    Any,
}

/// Mediates every restricted operation named in spec.md §4.2 against a backing
/// [`Repository`].
pub struct CapabilityStore {
    repository: Arc<dyn Repository>,
}

impl CapabilityStore {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        CapabilityStore { repository }
    }

    /// Mints a capability bound to `holder` without requiring an authority token. Reserved
    /// for trusted seed code (world genesis) — never reachable from a script, which must go
    /// through [`Self::mint`] instead (spec.md §4.2 "create... unless performed by trusted
    /// seed code").
    pub fn create_trusted(
        &self,
        holder: EntityId,
        cap_type: &str,
        params: Map,
    ) -> Result<CapabilityRow, CapabilityError> {
        Ok(self
            .repository
            .create_capability(holder, None, cap_type, params)?)
    }

    /// Returns a capability held by `holder` of `cap_type` whose params satisfy `filter`
    /// (spec.md §4.2 "lookup" — "never returns another holder's tokens").
    pub fn lookup(
        &self,
        holder: EntityId,
        cap_type: &str,
        filter: &Map,
    ) -> Result<Option<CapabilityRef>, CapabilityError> {
        for row in self.repository.list_capabilities(holder)? {
            if row.cap_type != cap_type {
                continue;
            }
            if filter_satisfied(&row.params, filter) {
                return Ok(Some(CapabilityRef::new(row.id, row.cap_type, row.holder)));
            }
        }
        Ok(None)
    }

    /// Verifies existence, holder identity, and parameter coverage (spec.md §4.2 "validate").
    pub fn validate(
        &self,
        cap: &CapabilityRef,
        caller: EntityId,
        op: &RequiredOp,
    ) -> Result<CapabilityRow, CapabilityError> {
        let row = self
            .repository
            .get_capability(cap.id)?
            .ok_or(CapabilityError::NotFound(cap.id))?;
        if row.holder != caller {
            return Err(CapabilityError::PermissionDenied(cap.id));
        }
        if !covers(&row.params, op) {
            return Err(CapabilityError::PermissionDenied(cap.id));
        }
        if let RequiredOp::MintsType(_) = op {
            if row.cap_type != MINT_AUTHORITY_TYPE {
                return Err(CapabilityError::NotAuthority(cap.id));
            }
        }
        Ok(row)
    }

    /// Creates a new capability with the parent's type, `holder = caller`, and parameters
    /// equal to `intersection(parent.params, restrictions)` (spec.md §4.2 "delegate"). The
    /// parent id is recorded so revoking `parent` invalidates this capability and any further
    /// descendants transitively (spec.md §4.2, `Repository::revoke_capability`).
    pub fn delegate(
        &self,
        parent: &CapabilityRef,
        caller: EntityId,
        restrictions: Map,
    ) -> Result<CapabilityRow, CapabilityError> {
        let parent_row = self.validate(parent, caller, &RequiredOp::Any)?;
        let params = intersect_params(&parent_row.params, &restrictions);
        Ok(self.repository.create_capability(
            caller,
            Some(parent_row.id),
            &parent_row.cap_type,
            params,
        )?)
    }

    /// Transfers holder (spec.md §4.2 "give" — "Requires validate(cap)").
    pub fn give(
        &self,
        cap: &CapabilityRef,
        caller: EntityId,
        new_holder: EntityId,
    ) -> Result<(), CapabilityError> {
        self.validate(cap, caller, &RequiredOp::Any)?;
        Ok(self.repository.give_capability(cap.id, new_holder)?)
    }

    /// Mints a capability of `cap_type` under the authority of a `sys.mint` capability
    /// (spec.md §4.2 "mint" — "fails unless authority is `sys.mint` and its namespace...
    /// covers `type`"). The minted capability's holder is `caller` — the entity on whose
    /// behalf the script that presented `authority` is running.
    pub fn mint(
        &self,
        authority: &CapabilityRef,
        caller: EntityId,
        cap_type: &str,
        params: Map,
    ) -> Result<CapabilityRow, CapabilityError> {
        self.validate(authority, caller, &RequiredOp::MintsType(cap_type.to_string()))?;
        Ok(self
            .repository
            .create_capability(caller, None, cap_type, params)?)
    }

    /// Revokes `cap`, requiring that `caller` currently holds it (spec.md §4.2 "delegate" —
    /// revocation cascades to descendants via [`Repository::revoke_capability`]).
    pub fn revoke(&self, cap: &CapabilityRef, caller: EntityId) -> Result<(), CapabilityError> {
        self.validate(cap, caller, &RequiredOp::Any)?;
        Ok(self.repository.revoke_capability(cap.id)?)
    }

    pub fn capability_id_exists(&self, id: CapabilityId) -> Result<bool, CapabilityError> {
        Ok(self.repository.get_capability(id)?.is_some())
    }
}

/// "Covers" as defined in spec.md §4.2: wildcard covers everything; `target_id:X` covers
/// operations on X only; `namespace:N` covers types matching `N` or `N.*`.
fn covers(params: &Map, op: &RequiredOp) -> bool {
    if is_wildcard(params) {
        return true;
    }
    match op {
        RequiredOp::Any => true,
        RequiredOp::OnEntity(target) => params
            .get(&ArcStr::from("target_id"))
            .and_then(|v| v.as_entity())
            == Some(*target),
        RequiredOp::MintsType(ty) => match params.get(&ArcStr::from("namespace")).and_then(|v| v.as_str()) {
            Some(ns) => ns == ty || ty.starts_with(&format!("{ns}.")),
            None => false,
        },
    }
}

fn is_wildcard(params: &Map) -> bool {
    params
        .get(&ArcStr::from("*"))
        .map(|v| v.truthy())
        .unwrap_or(false)
}

/// A capability of `holder` of `cap_type` whose params satisfy `filter` is "satisfied" when
/// every key present in `filter` has an equal value in `params`, or `params` is a wildcard
/// (spec.md §4.2 "lookup").
fn filter_satisfied(params: &Map, filter: &Map) -> bool {
    if is_wildcard(params) {
        return true;
    }
    filter.iter().all(|(k, v)| params.get(k) == Some(v))
}

/// Intersection of a parent capability's params with a delegation's narrowing restrictions
/// (spec.md §4.2 "delegate"). A wildcard parent is narrowed to exactly `restrictions`.
/// Otherwise, restrictions that agree with the parent pass through; restrictions that
/// conflict with an existing parent value drop that key entirely (the intersection of two
/// disjoint single-valued sets is empty, so neither value covers anything once delegated);
/// restrictions naming a key the parent didn't constrain are added as new narrowing.
fn intersect_params(parent: &Map, restrictions: &Map) -> Map {
    if is_wildcard(parent) {
        return restrictions.clone();
    }
    let mut result = parent.clone();
    for (k, v) in restrictions.iter() {
        match parent.get(k) {
            Some(existing) if existing == v => {
                result.insert(k.clone(), v.clone());
            }
            Some(_) => {
                result.remove(k);
            }
            None => {
                result.insert(k.clone(), v.clone());
            }
        }
    }
    result
}

/// Convenience used by the interpreter's `get_capability` opcode (spec.md §4.5) to turn a
/// resolved row into the `Var` value scripts pass around.
pub fn row_to_var(row: &CapabilityRow) -> Var {
    Var::capability(CapabilityRef::new(row.id, row.cap_type.clone(), row.holder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_repository::memory::MemoryRepository;
    use loom_values::EntityKind;

    fn store() -> (CapabilityStore, EntityId, EntityId) {
        let repo = Arc::new(MemoryRepository::new());
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let target = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        (CapabilityStore::new(repo), owner.id, target.id)
    }

    #[test]
    fn validate_rejects_wrong_holder() {
        let (store, owner, target) = store();
        let mut params = Map::new();
        params.insert("target_id".into(), Var::entity(target));
        let row = store
            .create_trusted(owner, "entity.control", params)
            .unwrap();
        let cap = CapabilityRef::new(row.id, row.cap_type, row.holder);
        let intruder = EntityId::new(999);
        let err = store
            .validate(&cap, intruder, &RequiredOp::OnEntity(target))
            .unwrap_err();
        assert_eq!(err, CapabilityError::PermissionDenied(cap.id));
    }

    #[test]
    fn delegate_narrows_wildcard_to_restriction() {
        let (store, owner, target) = store();
        let mut wildcard = Map::new();
        wildcard.insert("*".into(), Var::bool(true));
        let row = store.create_trusted(owner, "entity.control", wildcard).unwrap();
        let cap = CapabilityRef::new(row.id, row.cap_type, row.holder);

        let mut restriction = Map::new();
        restriction.insert("target_id".into(), Var::entity(target));
        let delegated = store.delegate(&cap, owner, restriction).unwrap();

        assert!(!is_wildcard(&delegated.params));
        assert_eq!(
            delegated.params.get(&ArcStr::from("target_id")),
            Some(&Var::entity(target))
        );
    }

    #[test]
    fn revoke_cascades_to_delegated_child() {
        let (store, owner, target) = store();
        let mut params = Map::new();
        params.insert("target_id".into(), Var::entity(target));
        let parent_row = store
            .create_trusted(owner, "entity.control", params)
            .unwrap();
        let parent_cap = CapabilityRef::new(parent_row.id, parent_row.cap_type.clone(), parent_row.holder);
        let child_row = store.delegate(&parent_cap, owner, Map::new()).unwrap();

        store.revoke(&parent_cap, owner).unwrap();
        assert!(!store.capability_id_exists(child_row.id).unwrap());
    }

    #[test]
    fn mint_requires_namespace_coverage() {
        let (store, owner, _target) = store();
        let mut params = Map::new();
        params.insert("namespace".into(), Var::str("user.1"));
        let authority_row = store.create_trusted(owner, MINT_AUTHORITY_TYPE, params).unwrap();
        let authority = CapabilityRef::new(authority_row.id, authority_row.cap_type, authority_row.holder);

        let minted = store
            .mint(&authority, owner, "user.1.widget", Map::new())
            .unwrap();
        assert_eq!(minted.cap_type, "user.1.widget");

        let err = store
            .mint(&authority, owner, "user.2.widget", Map::new())
            .unwrap_err();
        assert_eq!(err, CapabilityError::PermissionDenied(authority.id));
    }
}
