//! An in-memory `Repository`, used by unit/integration tests and by tooling that wants a
//! throwaway world (SPEC_FULL.md §4.1). No persistence; state lives only as long as the
//! process.

use crate::error::RepositoryError;
use crate::model::{CapabilityRow, Entity, Verb, VerbPermissions};
use crate::repository_trait::Repository;
use ahash::AHashMap;
use loom_values::{CapabilityId, EntityId, EntityKind, Map, Var};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

struct World {
    entities: AHashMap<EntityId, Entity>,
    verbs: AHashMap<EntityId, Vec<Verb>>,
    capabilities: AHashMap<CapabilityId, CapabilityRow>,
}

pub struct MemoryRepository {
    world: Mutex<World>,
    next_id: AtomicI64,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        MemoryRepository {
            world: Mutex::new(World {
                entities: AHashMap::new(),
                verbs: AHashMap::new(),
                capabilities: AHashMap::new(),
            }),
            next_id: AtomicI64::new(0),
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// True if `ancestor` appears anywhere in `start`'s location/prototype chain, per the
    /// `field` accessor. Stops at a visited-set-detected cycle rather than spinning
    /// (spec.md §9 "Prototype walk").
    fn chain_contains(
        entities: &AHashMap<EntityId, Entity>,
        start: EntityId,
        needle: EntityId,
        field: impl Fn(&Entity) -> Option<EntityId>,
    ) -> bool {
        let mut current = Some(start);
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = current {
            if id == needle {
                return true;
            }
            if !visited.insert(id) {
                break;
            }
            current = entities.get(&id).and_then(&field);
        }
        false
    }
}

impl Repository for MemoryRepository {
    fn create_entity(
        &self,
        prototype: Option<EntityId>,
        location: Option<EntityId>,
        owner: Option<EntityId>,
        kind: EntityKind,
        properties: Map,
    ) -> Result<Entity, RepositoryError> {
        let mut world = self.world.lock().unwrap();
        let id = EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Self::now();
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
        world.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn fetch_entity(&self, id: EntityId) -> Result<Entity, RepositoryError> {
        let world = self.world.lock().unwrap();
        world
            .entities
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::EntityNotFound(id))
    }

    fn set_entity_properties(&self, id: EntityId, updates: Map) -> Result<Entity, RepositoryError> {
        let mut world = self.world.lock().unwrap();
        let now = Self::now();
        let entity = world
            .entities
            .get_mut(&id)
            .ok_or(RepositoryError::EntityNotFound(id))?;
        for (k, v) in updates.iter() {
            entity.properties.insert(k.clone(), v.clone());
        }
        entity.updated_at = now;
        Ok(entity.clone())
    }

    fn set_owner(&self, id: EntityId, owner: Option<EntityId>) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        let entity = world
            .entities
            .get_mut(&id)
            .ok_or(RepositoryError::EntityNotFound(id))?;
        entity.owner = owner;
        Ok(())
    }

    fn set_prototype(&self, id: EntityId, proto: Option<EntityId>) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        if !world.entities.contains_key(&id) {
            return Err(RepositoryError::EntityNotFound(id));
        }
        if let Some(proto_id) = proto {
            if !world.entities.contains_key(&proto_id) {
                return Err(RepositoryError::EntityNotFound(proto_id));
            }
            if Self::chain_contains(&world.entities, proto_id, id, |e| e.prototype) {
                return Err(RepositoryError::CyclicPrototype(id, proto_id));
            }
        }
        world.entities.get_mut(&id).unwrap().prototype = proto;
        Ok(())
    }

    fn delete_entity(&self, id: EntityId) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        if world.entities.remove(&id).is_none() {
            return Err(RepositoryError::EntityNotFound(id));
        }
        world.verbs.remove(&id);
        world.capabilities.retain(|_, cap| {
            cap.holder != id && cap.params.get(&arcstr::ArcStr::from("target_id")).map(|v| v.as_entity()) != Some(Some(id))
        });
        Ok(())
    }

    fn move_entity(&self, thing: EntityId, new_container: EntityId) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        if !world.entities.contains_key(&thing) {
            return Err(RepositoryError::EntityNotFound(thing));
        }
        if !world.entities.contains_key(&new_container) {
            return Err(RepositoryError::EntityNotFound(new_container));
        }
        if Self::chain_contains(&world.entities, new_container, thing, |e| e.location) {
            return Err(RepositoryError::CyclicContainment(thing, new_container));
        }
        world.entities.get_mut(&thing).unwrap().location = Some(new_container);
        Ok(())
    }

    fn list_contents(&self, container: EntityId) -> Result<Vec<EntityId>, RepositoryError> {
        let world = self.world.lock().unwrap();
        Ok(world
            .entities
            .values()
            .filter(|e| e.location == Some(container))
            .map(|e| e.id)
            .collect())
    }

    fn resolve_property(&self, id: EntityId, key: &str) -> Result<Option<Var>, RepositoryError> {
        let world = self.world.lock().unwrap();
        let mut current = Some(id);
        let mut visited = std::collections::HashSet::new();
        while let Some(cur) = current {
            if !visited.insert(cur) {
                return Ok(None);
            }
            let entity = world
                .entities
                .get(&cur)
                .ok_or(RepositoryError::EntityNotFound(id))?;
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
        let mut world = self.world.lock().unwrap();
        if !world.entities.contains_key(&entity) {
            return Err(RepositoryError::EntityNotFound(entity));
        }
        let verbs = world.verbs.entry(entity).or_default();
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
        Ok(())
    }

    fn get_verb(&self, entity: EntityId, name: &str) -> Result<Option<Verb>, RepositoryError> {
        let world = self.world.lock().unwrap();
        let mut current = Some(entity);
        let mut visited = std::collections::HashSet::new();
        while let Some(cur) = current {
            if !visited.insert(cur) {
                return Ok(None);
            }
            if let Some(verbs) = world.verbs.get(&cur) {
                if let Some(v) = verbs.iter().find(|v| v.name == name) {
                    return Ok(Some(v.clone()));
                }
            }
            current = world.entities.get(&cur).and_then(|e| e.prototype);
        }
        Ok(None)
    }

    fn list_verbs(&self, entity: EntityId) -> Result<Vec<Verb>, RepositoryError> {
        let world = self.world.lock().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut visited_entities = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut current = Some(entity);
        while let Some(cur) = current {
            if !visited_entities.insert(cur) {
                break;
            }
            if let Some(verbs) = world.verbs.get(&cur) {
                for v in verbs {
                    if seen.insert(v.name.clone()) {
                        out.push(v.clone());
                    }
                }
            }
            current = world.entities.get(&cur).and_then(|e| e.prototype);
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
        let mut world = self.world.lock().unwrap();
        let id = CapabilityId::new_random();
        let row = CapabilityRow {
            id,
            holder,
            parent,
            cap_type: cap_type.to_string(),
            params,
        };
        world.capabilities.insert(id, row.clone());
        Ok(row)
    }

    fn get_capability(&self, id: CapabilityId) -> Result<Option<CapabilityRow>, RepositoryError> {
        let world = self.world.lock().unwrap();
        Ok(world.capabilities.get(&id).cloned())
    }

    fn list_capabilities(&self, holder: EntityId) -> Result<Vec<CapabilityRow>, RepositoryError> {
        let world = self.world.lock().unwrap();
        Ok(world
            .capabilities
            .values()
            .filter(|c| c.holder == holder)
            .cloned()
            .collect())
    }

    fn give_capability(&self, id: CapabilityId, new_holder: EntityId) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        let cap = world
            .capabilities
            .get_mut(&id)
            .ok_or(RepositoryError::CapabilityNotFound(id))?;
        cap.holder = new_holder;
        Ok(())
    }

    fn revoke_capability(&self, id: CapabilityId) -> Result<(), RepositoryError> {
        let mut world = self.world.lock().unwrap();
        if !world.capabilities.contains_key(&id) {
            return Err(RepositoryError::CapabilityNotFound(id));
        }
        let mut to_remove = vec![id];
        let mut frontier = vec![id];
        while let Some(cur) = frontier.pop() {
            let children: Vec<CapabilityId> = world
                .capabilities
                .values()
                .filter(|c| c.parent == Some(cur))
                .map(|c| c.id)
                .collect();
            for child in children {
                to_remove.push(child);
                frontier.push(child);
            }
        }
        for cap_id in to_remove {
            world.capabilities.remove(&cap_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MemoryRepository {
        MemoryRepository::new()
    }

    #[test]
    fn move_into_descendant_is_rejected() {
        let r = repo();
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
        // State unchanged.
        assert_eq!(r.fetch_entity(box1.id).unwrap().location, Some(room.id));
    }

    #[test]
    fn prototype_override_nearest_wins() {
        let r = repo();
        let proto = r
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        let child = r
            .create_entity(Some(proto.id), None, None, EntityKind::Item, Map::new())
            .unwrap();
        let code_a = Var::str("A");
        let code_b = Var::str("B");
        r.add_verb(proto.id, "v", code_a, VerbPermissions::Public, vec![], proto.id)
            .unwrap();
        r.add_verb(child.id, "v", code_b.clone(), VerbPermissions::Public, vec![], child.id)
            .unwrap();
        let found = r.get_verb(child.id, "v").unwrap().unwrap();
        assert_eq!(found.code, code_b);
    }

    #[test]
    fn delete_cascades_verbs_and_capabilities() {
        let r = repo();
        let e = r
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        r.add_verb(e.id, "v", Var::none(), VerbPermissions::Public, vec![], e.id)
            .unwrap();
        r.create_capability(e.id, None, "entity.control", Map::new())
            .unwrap();
        r.delete_entity(e.id).unwrap();
        assert!(r.get_verb(e.id, "v").unwrap().is_none());
        assert!(r.list_capabilities(e.id).unwrap().is_empty());
    }

    #[test]
    fn revoke_invalidates_delegated_descendants() {
        let r = repo();
        let owner = r
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let parent_cap = r
            .create_capability(owner.id, None, "entity.control", Map::new())
            .unwrap();
        let child_cap = r
            .create_capability(owner.id, Some(parent_cap.id), "entity.control", Map::new())
            .unwrap();
        r.revoke_capability(parent_cap.id).unwrap();
        assert!(r.get_capability(parent_cap.id).unwrap().is_none());
        assert!(r.get_capability(child_cap.id).unwrap().is_none());
    }
}
