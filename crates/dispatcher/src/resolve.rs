//! Verb resolution by search order (spec.md §4.7): the player's own verbs, then its location's
//! verbs, then items in the location, then items in the player's inventory. First match wins.

use crate::error::DispatchError;
use loom_repository::{Repository, Verb};
use loom_values::EntityId;

/// A verb found during resolution, plus the entity it was found *on* — distinct from the
/// player when the verb belongs to the room or an item (spec.md §4.7 "`this` = found-on-entity
/// per §4.4").
pub struct Resolved {
    pub entity: EntityId,
    pub verb: Verb,
}

pub fn resolve_verb(
    repository: &dyn Repository,
    player: EntityId,
    name: &str,
) -> Result<Option<Resolved>, DispatchError> {
    if let Some(verb) = repository.get_verb(player, name)? {
        return Ok(Some(Resolved {
            entity: player,
            verb,
        }));
    }

    let player_entity = repository.fetch_entity(player)?;
    if let Some(location) = player_entity.location {
        if let Some(verb) = repository.get_verb(location, name)? {
            return Ok(Some(Resolved {
                entity: location,
                verb,
            }));
        }
        for item in repository.list_contents(location)? {
            if let Some(verb) = repository.get_verb(item, name)? {
                return Ok(Some(Resolved { entity: item, verb }));
            }
        }
    }

    for item in repository.list_contents(player)? {
        if let Some(verb) = repository.get_verb(item, name)? {
            return Ok(Some(Resolved { entity: item, verb }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_repository::{memory::MemoryRepository, VerbPermissions};
    use loom_values::{EntityKind, Map, Var};

    fn verb_body() -> Var {
        Var::list_from(vec![Var::str("seq")])
    }

    #[test]
    fn own_verb_wins_over_location_verb() {
        let repo = MemoryRepository::new();
        let room = repo
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let player = repo
            .create_entity(None, Some(room.id), None, EntityKind::Actor, Map::new())
            .unwrap();
        repo.add_verb(
            room.id,
            "look",
            verb_body(),
            VerbPermissions::Public,
            vec![],
            room.id,
        )
        .unwrap();
        repo.add_verb(
            player.id,
            "look",
            verb_body(),
            VerbPermissions::Public,
            vec![],
            player.id,
        )
        .unwrap();

        let found = resolve_verb(&repo, player.id, "look").unwrap().unwrap();
        assert_eq!(found.entity, player.id);
    }

    #[test]
    fn falls_through_to_an_item_in_the_room() {
        let repo = MemoryRepository::new();
        let room = repo
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let player = repo
            .create_entity(None, Some(room.id), None, EntityKind::Actor, Map::new())
            .unwrap();
        let lamp = repo
            .create_entity(None, Some(room.id), None, EntityKind::Item, Map::new())
            .unwrap();
        repo.add_verb(
            lamp.id,
            "rub",
            verb_body(),
            VerbPermissions::Public,
            vec![],
            lamp.id,
        )
        .unwrap();

        let found = resolve_verb(&repo, player.id, "rub").unwrap().unwrap();
        assert_eq!(found.entity, lamp.id);
    }

    #[test]
    fn falls_through_to_inventory_last() {
        let repo = MemoryRepository::new();
        let room = repo
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let player = repo
            .create_entity(None, Some(room.id), None, EntityKind::Actor, Map::new())
            .unwrap();
        let key = repo
            .create_entity(None, Some(player.id), None, EntityKind::Item, Map::new())
            .unwrap();
        repo.add_verb(
            key.id,
            "jingle",
            verb_body(),
            VerbPermissions::Public,
            vec![],
            key.id,
        )
        .unwrap();

        let found = resolve_verb(&repo, player.id, "jingle").unwrap().unwrap();
        assert_eq!(found.entity, key.id);
    }

    #[test]
    fn no_match_anywhere_is_none() {
        let repo = MemoryRepository::new();
        let player = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        assert!(resolve_verb(&repo, player.id, "nonexistent")
            .unwrap()
            .is_none());
    }
}
