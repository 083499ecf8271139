//! World genesis and the optional JSON "worlddump" seed file (SPEC_FULL.md §3 "Seed/bootstrap
//! data"), loaded once at daemon startup if the repository is empty — the spiritual analogue of
//! the original system's textdump loader, without carrying over its line-oriented text format.

use color_eyre::eyre::{Context, Result};
use loom_capability::CapabilityStore;
use loom_repository::{Repository, VerbPermissions};
use loom_values::{EntityId, EntityKind, Map, Var};
use serde::Deserialize;
use std::path::Path;

/// Ensures entity #0 (the system/"wizard" object, spec.md §4.2's `EntityId::SYSTEM`) exists and
/// holds a wildcard `sys.sudo{"*":true}` capability (SPEC_FULL.md §4.2 "A seed `sys.sudo`
/// capability is minted once, at world genesis... from which all other authority is
/// bootstrapped"). A no-op if the repository already has entity #0. Returns `true` if genesis
/// was just performed, i.e. this is a brand-new repository.
pub fn ensure_genesis(repository: &dyn Repository, capabilities: &CapabilityStore) -> Result<bool> {
    if repository.fetch_entity(EntityId::SYSTEM).is_ok() {
        return Ok(false);
    }

    let system = repository
        .create_entity(None, None, None, EntityKind::Actor, Map::new())
        .context("creating the system entity")?;
    if system.id != EntityId::SYSTEM {
        // The repository's id allocator must hand out 0 to the very first entity created; if it
        // doesn't, genesis has nothing stable to bootstrap other authority from.
        return Err(color_eyre::eyre::eyre!(
            "expected the first entity created to be {}, got {}",
            EntityId::SYSTEM,
            system.id
        ));
    }

    let mut wildcard = Map::new();
    wildcard.insert("*".into(), Var::bool(true));
    capabilities
        .create_trusted(system.id, "sys.sudo", wildcard)
        .context("minting the root sys.sudo capability")?;

    tracing::info!("performed world genesis: created entity #0 and its sys.sudo capability");
    Ok(true)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum SeedPermissions {
    #[default]
    Public,
    Owner,
    Explicit,
}

impl From<SeedPermissions> for VerbPermissions {
    fn from(p: SeedPermissions) -> Self {
        match p {
            SeedPermissions::Public => VerbPermissions::Public,
            SeedPermissions::Owner => VerbPermissions::Owner,
            SeedPermissions::Explicit => VerbPermissions::Explicit,
        }
    }
}

/// One entity row in a worldseed file. `prototype`/`location`/`owner` are indices into the
/// seed's own `entities` array rather than live entity ids, since the repository assigns ids on
/// creation — a seed can only reference entities it has already declared earlier in the list.
#[derive(Deserialize)]
struct SeedEntity {
    #[serde(default)]
    prototype: Option<usize>,
    #[serde(default)]
    location: Option<usize>,
    #[serde(default)]
    owner: Option<usize>,
    kind: EntityKind,
    #[serde(default)]
    properties: Map,
}

#[derive(Deserialize)]
struct SeedVerb {
    entity: usize,
    name: String,
    code: Var,
    #[serde(default)]
    permissions: SeedPermissions,
    #[serde(default)]
    explicit_callers: Vec<usize>,
    owner: usize,
}

#[derive(Deserialize, Default)]
struct WorldSeed {
    #[serde(default)]
    entities: Vec<SeedEntity>,
    #[serde(default)]
    verbs: Vec<SeedVerb>,
}

/// Loads `path` into `repository`, only ever called right after a fresh [`ensure_genesis`]
/// (see `main.rs`) so indices always resolve — entity #0 from genesis is not part of the seed
/// file's own `entities` list and is never referenced by it.
pub fn load_world_seed(repository: &dyn Repository, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading world seed file {}", path.display()))?;
    let seed: WorldSeed =
        serde_json::from_str(&text).with_context(|| format!("parsing world seed file {}", path.display()))?;

    let mut ids = Vec::with_capacity(seed.entities.len());
    for entity in &seed.entities {
        let prototype = entity.prototype.map(|i| ids[i]);
        let location = entity.location.map(|i| ids[i]);
        let owner = entity.owner.map(|i| ids[i]);
        let created = repository.create_entity(prototype, location, owner, entity.kind, entity.properties.clone())?;
        ids.push(created.id);
    }
    for verb in seed.verbs {
        let explicit_callers: Vec<EntityId> = verb.explicit_callers.iter().map(|i| ids[*i]).collect();
        repository.add_verb(
            ids[verb.entity],
            &verb.name,
            verb.code,
            verb.permissions.into(),
            explicit_callers,
            ids[verb.owner],
        )?;
    }

    tracing::info!(
        entities = ids.len(),
        verbs_file = %path.display(),
        "loaded world seed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_repository::memory::MemoryRepository;

    #[test]
    fn genesis_is_idempotent() {
        let repo: std::sync::Arc<dyn Repository> = std::sync::Arc::new(MemoryRepository::new());
        let caps = CapabilityStore::new(repo.clone());

        assert!(ensure_genesis(repo.as_ref(), &caps).unwrap());
        assert!(!ensure_genesis(repo.as_ref(), &caps).unwrap());

        let system_caps = repo.list_capabilities(EntityId::SYSTEM).unwrap();
        assert_eq!(system_caps.len(), 1);
        assert_eq!(system_caps[0].cap_type, "sys.sudo");
    }

    #[test]
    fn load_world_seed_resolves_index_references() {
        let repo: std::sync::Arc<dyn Repository> = std::sync::Arc::new(MemoryRepository::new());
        let caps = CapabilityStore::new(repo.clone());
        ensure_genesis(repo.as_ref(), &caps).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{
                "entities": [
                    {"kind": "Room", "properties": {"name": "Foyer"}},
                    {"kind": "Actor", "location": 0, "properties": {"name": "Guest"}}
                ],
                "verbs": [
                    {"entity": 0, "name": "look", "code": ["seq"], "owner": 0}
                ]
            }"#,
        )
        .unwrap();

        load_world_seed(repo.as_ref(), &path).unwrap();

        let contents = repo.list_contents(EntityId::new(1)).unwrap();
        assert_eq!(contents, vec![EntityId::new(2)]);
        assert!(repo.get_verb(EntityId::new(1), "look").unwrap().is_some());
    }
}
