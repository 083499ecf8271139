//! The durable `Repository` backend: an embedded LSM KV store (`fjall`), matching the
//! "embedded KV store with manual cascades" option named in spec.md §6
//! (SPEC_FULL.md §4.1).
//!
//! Layout mirrors the teacher's "one relation per concern, whole-value-per-key" convention
//! (`crates/db/src/moor_db.rs`'s `object_verbdefs: R<Obj, VerbDefs>`), simplified to a single
//! row per entity holding its full verb list, since loom has no transactional-isolation
//! requirement across verbs (spec.md §1 Non-goals) and so needs none of the teacher's MVCC
//! working-set machinery.
//!
//! Four partitions: `entities` (id -> Entity), `verbs` (entity id -> Vec<Verb>),
//! `capabilities` (capability id -> CapabilityRow), `capability_index` (holder id ->
//! Vec<CapabilityId>, a hand-maintained secondary index). Multi-step mutations
//! (create-with-verbs, delete-with-cascade, move-with-cycle-check) commit as one `fjall`
//! batch (spec.md §5 "Shared resource policy").

use crate::error::RepositoryError;
use crate::model::{CapabilityRow, Entity, Verb, VerbPermissions};
use crate::repository_trait::Repository;
use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use loom_values::{CapabilityId, EntityId, EntityKind, Map, Var};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

fn entity_key(id: EntityId) -> [u8; 8] {
    id.id().to_be_bytes()
}

fn cap_key(id: CapabilityId) -> [u8; 16] {
    *id.0.as_bytes()
}

pub struct FjallRepository {
    keyspace: Keyspace,
    entities: PartitionHandle,
    verbs: PartitionHandle,
    capabilities: PartitionHandle,
    capability_index: PartitionHandle,
    meta: PartitionHandle,
    // Guards the read-check-write sequences (cycle checks, duplicate-verb checks) that must
    // observe a consistent snapshot across partitions; fjall itself only guarantees a single
    // batch is atomic, not that two reads plus a batch are serializable against each other.
    guard: Mutex<()>,
    next_id: AtomicI64,
}

impl FjallRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let keyspace = Config::new(path.as_ref())
            .open()
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let opts = PartitionCreateOptions::default();
        let entities = keyspace
            .open_partition("entities", opts.clone())
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let verbs = keyspace
            .open_partition("verbs", opts.clone())
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let capabilities = keyspace
            .open_partition("capabilities", opts.clone())
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let capability_index = keyspace
            .open_partition("capability_index", opts.clone())
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let meta = keyspace
            .open_partition("meta", opts)
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;

        let next_id = match meta
            .get("next_id")
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?
        {
            Some(bytes) => i64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0; 8])),
            None => 0,
        };

        Ok(FjallRepository {
            keyspace,
            entities,
            verbs,
            capabilities,
            capability_index,
            meta,
            guard: Mutex::new(()),
            next_id: AtomicI64::new(next_id),
        })
    }

    fn persist_next_id(&self, batch: &mut Batch, id: i64) {
        batch.insert(&self.meta, "next_id", id.to_be_bytes());
    }

    fn load_entity(&self, id: EntityId) -> Result<Entity, RepositoryError> {
        let bytes = self
            .entities
            .get(entity_key(id))
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?
            .ok_or(RepositoryError::EntityNotFound(id))?;
        serde_json::from_slice(&bytes).map_err(|e| RepositoryError::IntegrityError(e.to_string()))
    }

    fn entity_exists(&self, id: EntityId) -> Result<bool, RepositoryError> {
        Ok(self
            .entities
            .contains_key(entity_key(id))
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?)
    }

    fn load_verbs(&self, entity: EntityId) -> Result<Vec<Verb>, RepositoryError> {
        match self
            .verbs
            .get(entity_key(entity))
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?
        {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| RepositoryError::IntegrityError(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn write_verbs(&self, batch: &mut Batch, entity: EntityId, verbs: &[Verb]) -> Result<(), RepositoryError> {
        let bytes =
            serde_json::to_vec(verbs).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        batch.insert(&self.verbs, entity_key(entity), bytes);
        Ok(())
    }

    fn load_capability(&self, id: CapabilityId) -> Result<Option<CapabilityRow>, RepositoryError> {
        match self
            .capabilities
            .get(cap_key(id))
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn load_capability_index(&self, holder: EntityId) -> Result<Vec<CapabilityId>, RepositoryError> {
        match self
            .capability_index
            .get(entity_key(holder))
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?
        {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| RepositoryError::IntegrityError(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn write_capability_index(
        &self,
        batch: &mut Batch,
        holder: EntityId,
        ids: &[CapabilityId],
    ) -> Result<(), RepositoryError> {
        let bytes =
            serde_json::to_vec(ids).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        batch.insert(&self.capability_index, entity_key(holder), bytes);
        Ok(())
    }

    fn commit(&self, batch: Batch) -> Result<(), RepositoryError> {
        batch
            .commit()
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        self.keyspace
            .persist(PersistMode::Buffer)
            .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        Ok(())
    }

    fn chain_contains(
        &self,
        start: EntityId,
        needle: EntityId,
        field: impl Fn(&Entity) -> Option<EntityId>,
    ) -> Result<bool, RepositoryError> {
        let mut current = Some(start);
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = current {
            if id == needle {
                return Ok(true);
            }
            if !visited.insert(id) {
                break;
            }
            current = match self.entities.get(entity_key(id)) {
                Ok(Some(bytes)) => {
                    let entity: Entity = serde_json::from_slice(&bytes)
                        .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
                    field(&entity)
                }
                Ok(None) => None,
                Err(e) => return Err(RepositoryError::IntegrityError(e.to_string())),
            };
        }
        Ok(false)
    }
}

impl Repository for FjallRepository {
    fn create_entity(
        &self,
        prototype: Option<EntityId>,
        location: Option<EntityId>,
        owner: Option<EntityId>,
        kind: EntityKind,
        properties: Map,
    ) -> Result<Entity, RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let id = EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = now_millis();
        let entity = Entity {
            id,
            prototype,
            location,
            owner,
            kind,
            properties,
            created_at: now,
            updated_at: now,
        };
        let bytes =
            serde_json::to_vec(&entity).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.entities, entity_key(id), bytes);
        self.persist_next_id(&mut batch, id.id() + 1);
        self.commit(batch)?;
        Ok(entity)
    }

    fn fetch_entity(&self, id: EntityId) -> Result<Entity, RepositoryError> {
        self.load_entity(id)
    }

    fn set_entity_properties(&self, id: EntityId, updates: Map) -> Result<Entity, RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let mut entity = self.load_entity(id)?;
        for (k, v) in updates.iter() {
            entity.properties.insert(k.clone(), v.clone());
        }
        entity.updated_at = now_millis();
        let bytes =
            serde_json::to_vec(&entity).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.entities, entity_key(id), bytes);
        self.commit(batch)?;
        Ok(entity)
    }

    fn set_owner(&self, id: EntityId, owner: Option<EntityId>) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let mut entity = self.load_entity(id)?;
        entity.owner = owner;
        entity.updated_at = now_millis();
        let bytes =
            serde_json::to_vec(&entity).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.entities, entity_key(id), bytes);
        self.commit(batch)
    }

    fn set_prototype(&self, id: EntityId, proto: Option<EntityId>) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let mut entity = self.load_entity(id)?;
        if let Some(proto_id) = proto {
            if !self.entity_exists(proto_id)? {
                return Err(RepositoryError::EntityNotFound(proto_id));
            }
            if self.chain_contains(proto_id, id, |e| e.prototype)? {
                return Err(RepositoryError::CyclicPrototype(id, proto_id));
            }
        }
        entity.prototype = proto;
        let bytes =
            serde_json::to_vec(&entity).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.entities, entity_key(id), bytes);
        self.commit(batch)
    }

    fn delete_entity(&self, id: EntityId) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        if !self.entity_exists(id)? {
            return Err(RepositoryError::EntityNotFound(id));
        }
        let mut batch = self.keyspace.batch();
        batch.remove(&self.entities, entity_key(id));
        batch.remove(&self.verbs, entity_key(id));

        // Sweep capabilities held by `id`.
        for cap_id in self.load_capability_index(id)? {
            batch.remove(&self.capabilities, cap_key(cap_id));
        }
        batch.remove(&self.capability_index, entity_key(id));

        // Sweep capabilities naming `id` via target_id, regardless of holder.
        for entry in self.capabilities.iter() {
            let (key, value) = entry.map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
            let row: CapabilityRow = serde_json::from_slice(&value)
                .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
            let targets_deleted = row
                .params
                .get(&arcstr::ArcStr::from("target_id"))
                .and_then(|v| v.as_entity())
                == Some(id);
            if targets_deleted {
                batch.remove(&self.capabilities, key);
                let mut holder_ids = self.load_capability_index(row.holder)?;
                holder_ids.retain(|c| *c != row.id);
                self.write_capability_index(&mut batch, row.holder, &holder_ids)?;
            }
        }

        self.commit(batch)
    }

    fn move_entity(&self, thing: EntityId, new_container: EntityId) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let mut entity = self.load_entity(thing)?;
        if !self.entity_exists(new_container)? {
            return Err(RepositoryError::EntityNotFound(new_container));
        }
        if self.chain_contains(new_container, thing, |e| e.location)? {
            return Err(RepositoryError::CyclicContainment(thing, new_container));
        }
        entity.location = Some(new_container);
        let bytes =
            serde_json::to_vec(&entity).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.entities, entity_key(thing), bytes);
        self.commit(batch)
    }

    fn list_contents(&self, container: EntityId) -> Result<Vec<EntityId>, RepositoryError> {
        let mut out = Vec::new();
        for entry in self.entities.iter() {
            let (_, value) = entry.map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
            let entity: Entity = serde_json::from_slice(&value)
                .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
            if entity.location == Some(container) {
                out.push(entity.id);
            }
        }
        Ok(out)
    }

    fn resolve_property(&self, id: EntityId, key: &str) -> Result<Option<Var>, RepositoryError> {
        let mut current = Some(id);
        let mut visited = std::collections::HashSet::new();
        while let Some(cur) = current {
            if !visited.insert(cur) {
                return Ok(None);
            }
            let entity = self.load_entity(cur).map_err(|e| match e {
                RepositoryError::EntityNotFound(_) => RepositoryError::EntityNotFound(id),
                other => other,
            })?;
            if let Some(v) = entity.properties.get(&arcstr::ArcStr::from(key)) {
                return Ok(Some(v.clone()));
            }
            current = entity.prototype;
        }
        Ok(None)
    }

    fn add_verb(
        &self,
        entity: EntityId,
        name: &str,
        code: Var,
        permissions: VerbPermissions,
        explicit_callers: Vec<EntityId>,
        owner: EntityId,
    ) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        if !self.entity_exists(entity)? {
            return Err(RepositoryError::EntityNotFound(entity));
        }
        let mut verbs = self.load_verbs(entity)?;
        if verbs.iter().any(|v| v.name == name) {
            return Err(RepositoryError::DuplicateVerb(entity, name.to_string()));
        }
        verbs.push(Verb {
            entity,
            name: name.to_string(),
            code,
            permissions,
            explicit_callers,
            owner,
        });
        let mut batch = self.keyspace.batch();
        self.write_verbs(&mut batch, entity, &verbs)?;
        self.commit(batch)
    }

    fn get_verb(&self, entity: EntityId, name: &str) -> Result<Option<Verb>, RepositoryError> {
        let mut current = Some(entity);
        let mut visited = std::collections::HashSet::new();
        while let Some(cur) = current {
            if !visited.insert(cur) {
                return Ok(None);
            }
            let verbs = self.load_verbs(cur)?;
            if let Some(v) = verbs.into_iter().find(|v| v.name == name) {
                return Ok(Some(v));
            }
            current = match self.entities.get(entity_key(cur)) {
                Ok(Some(bytes)) => {
                    let entity: Entity = serde_json::from_slice(&bytes)
                        .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
                    entity.prototype
                }
                Ok(None) => None,
                Err(e) => return Err(RepositoryError::IntegrityError(e.to_string())),
            };
        }
        Ok(None)
    }

    fn list_verbs(&self, entity: EntityId) -> Result<Vec<Verb>, RepositoryError> {
        let mut seen = std::collections::HashSet::new();
        let mut visited_entities = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut current = Some(entity);
        while let Some(cur) = current {
            if !visited_entities.insert(cur) {
                break;
            }
            for v in self.load_verbs(cur)? {
                if seen.insert(v.name.clone()) {
                    out.push(v);
                }
            }
            current = match self.entities.get(entity_key(cur)) {
                Ok(Some(bytes)) => {
                    let entity: Entity = serde_json::from_slice(&bytes)
                        .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
                    entity.prototype
                }
                Ok(None) => None,
                Err(e) => return Err(RepositoryError::IntegrityError(e.to_string())),
            };
        }
        Ok(out)
    }

    fn create_capability(
        &self,
        holder: EntityId,
        parent: Option<CapabilityId>,
        cap_type: &str,
        params: Map,
    ) -> Result<CapabilityRow, RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let id = CapabilityId::new_random();
        let row = CapabilityRow {
            id,
            holder,
            parent,
            cap_type: cap_type.to_string(),
            params,
        };
        let bytes =
            serde_json::to_vec(&row).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.capabilities, cap_key(id), bytes);
        let mut index = self.load_capability_index(holder)?;
        index.push(id);
        self.write_capability_index(&mut batch, holder, &index)?;
        self.commit(batch)?;
        Ok(row)
    }

    fn get_capability(&self, id: CapabilityId) -> Result<Option<CapabilityRow>, RepositoryError> {
        self.load_capability(id)
    }

    fn list_capabilities(&self, holder: EntityId) -> Result<Vec<CapabilityRow>, RepositoryError> {
        let mut out = Vec::new();
        for id in self.load_capability_index(holder)? {
            if let Some(row) = self.load_capability(id)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn give_capability(&self, id: CapabilityId, new_holder: EntityId) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let mut row = self
            .load_capability(id)?
            .ok_or(RepositoryError::CapabilityNotFound(id))?;
        let old_holder = row.holder;
        row.holder = new_holder;
        let bytes =
            serde_json::to_vec(&row).map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
        let mut batch = self.keyspace.batch();
        batch.insert(&self.capabilities, cap_key(id), bytes);

        let mut old_index = self.load_capability_index(old_holder)?;
        old_index.retain(|c| *c != id);
        self.write_capability_index(&mut batch, old_holder, &old_index)?;

        let mut new_index = self.load_capability_index(new_holder)?;
        new_index.push(id);
        self.write_capability_index(&mut batch, new_holder, &new_index)?;

        self.commit(batch)
    }

    fn revoke_capability(&self, id: CapabilityId) -> Result<(), RepositoryError> {
        let _lock = self.guard.lock().unwrap();
        let root = self
            .load_capability(id)?
            .ok_or(RepositoryError::CapabilityNotFound(id))?;
        let mut to_remove = vec![root];
        let mut frontier_idx = 0;
        while frontier_idx < to_remove.len() {
            let cur = to_remove[frontier_idx].id;
            frontier_idx += 1;
            for entry in self.capabilities.iter() {
                let (_, value) = entry.map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
                let row: CapabilityRow = serde_json::from_slice(&value)
                    .map_err(|e| RepositoryError::IntegrityError(e.to_string()))?;
                if row.parent == Some(cur) {
                    to_remove.push(row);
                }
            }
        }

        let mut batch = self.keyspace.batch();
        let mut by_holder: std::collections::HashMap<EntityId, Vec<CapabilityId>> =
            std::collections::HashMap::new();
        for row in &to_remove {
            batch.remove(&self.capabilities, cap_key(row.id));
            by_holder.entry(row.holder).or_default().push(row.id);
        }
        for (holder, removed_ids) in by_holder {
            let mut index = self.load_capability_index(holder)?;
            index.retain(|c| !removed_ids.contains(c));
            self.write_capability_index(&mut batch, holder, &index)?;
        }
        self.commit(batch)
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (FjallRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FjallRepository::open(dir.path()).unwrap();
        (repo, dir)
    }

    #[test]
    fn create_and_fetch_round_trips() {
        let (r, _dir) = repo();
        let e = r
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        let fetched = r.fetch_entity(e.id).unwrap();
        assert_eq!(fetched.id, e.id);
        assert_eq!(fetched.kind, EntityKind::Item);
    }

    #[test]
    fn move_into_descendant_is_rejected() {
        let (r, _dir) = repo();
        let room = r
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let box1 = r
            .create_entity(None, Some(room.id), None, EntityKind::Item, Map::new())
            .unwrap();
        let box2 = r
            .create_entity(None, Some(box1.id), None, EntityKind::Item, Map::new())
            .unwrap();
        let err = r.move_entity(box1.id, box2.id).unwrap_err();
        assert_eq!(err, RepositoryError::CyclicContainment(box1.id, box2.id));
        assert_eq!(r.fetch_entity(box1.id).unwrap().location, Some(room.id));
    }

    #[test]
    fn reopen_preserves_next_id_monotonicity() {
        let dir = tempfile::tempdir().unwrap();
        let first_id = {
            let r = FjallRepository::open(dir.path()).unwrap();
            r.create_entity(None, None, None, EntityKind::Item, Map::new())
                .unwrap()
                .id
        };
        let r2 = FjallRepository::open(dir.path()).unwrap();
        let second = r2
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        assert!(second.id.id() > first_id.id());
    }

    #[test]
    fn delete_sweeps_target_id_capabilities_from_other_holders() {
        let (r, _dir) = repo();
        let target = r
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        let owner = r
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let mut params = Map::new();
        params.insert("target_id".into(), Var::entity(target.id));
        r.create_capability(owner.id, None, "entity.control", params)
            .unwrap();
        r.delete_entity(target.id).unwrap();
        assert!(r.list_capabilities(owner.id).unwrap().is_empty());
    }
}
