//! Entity/capability operations (spec.md §4.4 "Privileged entity operations" and §4.2). Reads
//! (`entity`, `verbs`, `get_prototype`, `get_property`) are not capability-gated (spec.md §4.4
//! "readability is not capability-gated at this layer"); writes validate a presented
//! capability first and fail with `PermissionDenied` on any mismatch.

use crate::shared::{require_str, type_error};
use loom_capability::RequiredOp;
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_repository::{Entity, VerbPermissions};
use loom_values::{CapabilityRef, EntityId, EntityKind, Map, Var};

fn require_entity(opcode: &str, v: &Var) -> Result<EntityId, ScriptError> {
    v.as_entity().ok_or_else(|| type_error(opcode, format!("expected an entity, got {}", v.type_name())))
}

/// A missing capability (e.g. `get_capability` returning null on a lookup miss) is the
/// "missing" case of spec.md §7 `PermissionDenied` ("missing, invalid, or insufficient"), not a
/// `TypeError` — a script that presents no capability at all must be denied the same way one
/// presenting an invalid capability is. Genuinely wrong-typed, non-null arguments still raise
/// `TypeError`.
fn require_capability<'a>(opcode: &str, v: &'a Var) -> Result<&'a CapabilityRef, ScriptError> {
    if v.is_none() {
        return Err(ScriptError::PermissionDenied(format!("{opcode}: no capability presented")));
    }
    v.as_capability().ok_or_else(|| type_error(opcode, format!("expected a capability, got {}", v.type_name())))
}

fn entity_to_var(e: &Entity) -> Var {
    let mut m = Map::new();
    m.insert("id".into(), Var::entity(e.id));
    m.insert("prototype".into(), e.prototype.map(Var::entity).unwrap_or_else(Var::none));
    m.insert("location".into(), e.location.map(Var::entity).unwrap_or_else(Var::none));
    m.insert("owner".into(), e.owner.map(Var::entity).unwrap_or_else(Var::none));
    m.insert("kind".into(), Var::str(e.kind.to_string()));
    m.insert("properties".into(), Var::map(e.properties.clone()));
    m.insert("created_at".into(), Var::number(e.created_at as f64));
    m.insert("updated_at".into(), Var::number(e.updated_at as f64));
    Var::map(m)
}

fn kind_from_str(opcode: &str, s: &str) -> Result<EntityKind, ScriptError> {
    Ok(match s {
        "zone" => EntityKind::Zone,
        "room" => EntityKind::Room,
        "actor" => EntityKind::Actor,
        "item" => EntityKind::Item,
        "part" => EntityKind::Part,
        "exit" => EntityKind::Exit,
        other => return Err(type_error(opcode, format!("unknown entity kind {other:?}"))),
    })
}

// -- Reads (unguarded) ------------------------------------------------------------------------

fn op_entity(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let id = require_entity("entity", &args[0])?;
    Ok(entity_to_var(&ctx.repository.fetch_entity(id)?))
}

fn op_verbs(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let id = require_entity("verbs", &args[0])?;
    Ok(Var::list_from(ctx.repository.list_verbs(id)?.into_iter().map(|v| Var::str(v.name))))
}

fn op_get_prototype(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let id = require_entity("get_prototype", &args[0])?;
    Ok(ctx
        .repository
        .fetch_entity(id)?
        .prototype
        .map(Var::entity)
        .unwrap_or_else(Var::none))
}

fn op_get_property(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let id = require_entity("get_property", &args[0])?;
    let key = require_str("get_property", &args[1])?;
    Ok(ctx.repository.resolve_property(id, key)?.unwrap_or_else(Var::none))
}

// -- Capability-mediated writes ----------------------------------------------------------------

fn op_set_entity(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("set_entity", &args[0])?;
    let target = require_entity("set_entity", &args[1])?;
    let updates = args[2].as_map().ok_or_else(|| type_error("set_entity", "updates must be an object"))?;
    ctx.capabilities.validate(cap, ctx.caller, &RequiredOp::OnEntity(target))?;
    Ok(entity_to_var(&ctx.repository.set_entity_properties(target, updates.clone())?))
}

fn op_destroy(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("destroy", &args[0])?;
    let target = require_entity("destroy", &args[1])?;
    ctx.capabilities.validate(cap, ctx.caller, &RequiredOp::OnEntity(target))?;
    ctx.repository.delete_entity(target)?;
    Ok(Var::bool(true))
}

fn op_set_prototype(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("set_prototype", &args[0])?;
    let target = require_entity("set_prototype", &args[1])?;
    let proto = args[2].as_entity();
    ctx.capabilities.validate(cap, ctx.caller, &RequiredOp::OnEntity(target))?;
    ctx.repository.set_prototype(target, proto)?;
    Ok(Var::bool(true))
}

fn op_create(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("create", &args[0])?;
    let data = args[1].as_map().ok_or_else(|| type_error("create", "data must be an object"))?;
    ctx.capabilities.validate(cap, ctx.caller, &RequiredOp::Any)?;
    let prototype = data.get("prototype").and_then(|v| v.as_entity());
    let location = data.get("location").and_then(|v| v.as_entity());
    let owner = data.get("owner").and_then(|v| v.as_entity()).or(Some(ctx.caller));
    let kind = match data.get("kind").and_then(|v| v.as_str()) {
        Some(s) => kind_from_str("create", s)?,
        None => EntityKind::Item,
    };
    let properties = data.get("properties").and_then(|v| v.as_map()).cloned().unwrap_or_default();
    let entity = ctx.repository.create_entity(prototype, location, owner, kind, properties)?;
    Ok(entity_to_var(&entity))
}

fn op_mint(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("mint", &args[0])?;
    let cap_type = require_str("mint", &args[1])?;
    let params = args[2].as_map().cloned().unwrap_or_default();
    let row = ctx.capabilities.mint(cap, ctx.caller, cap_type, params)?;
    Ok(loom_capability::row_to_var(&row))
}

fn op_give_capability(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("give_capability", &args[0])?;
    let recipient = require_entity("give_capability", &args[1])?;
    ctx.capabilities.give(cap, ctx.caller, recipient)?;
    Ok(Var::bool(true))
}

fn op_revoke_capability(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("revoke_capability", &args[0])?;
    ctx.capabilities.revoke(cap, ctx.caller)?;
    Ok(Var::bool(true))
}

fn op_sudo(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap = require_capability("sudo", &args[0])?;
    let target = require_entity("sudo", &args[1])?;
    let verb_name = require_str("sudo", &args[2])?.to_string();
    let call_args: Vec<Var> = args[3..].to_vec();
    ctx.capabilities.validate(cap, ctx.caller, &RequiredOp::OnEntity(target))?;

    let verb = ctx
        .repository
        .get_verb(target, &verb_name)?
        .ok_or_else(|| ScriptError::NotFound(format!("verb {verb_name} on {target}")))?;
    let _ = verb.permissions; // sudo bypasses normal callable_by checks by design.
    let mut sub_ctx = ctx.sub_context_for_call(target, call_args, &verb_name)?;
    let result = loom_interpreter::evaluate_verb_body(&verb.code, &mut sub_ctx);
    ctx.merge_sub_result(sub_ctx);
    result
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "entity",
            label: "Entity",
            category: "entity",
            description: "fetch an entity's row as an object",
            arity: Arity::Exact(1),
            params: &[SlotType::Entity],
            returns: SlotType::Object,
            lazy: false,
        },
        op_entity,
    );
    registry.register(
        OpcodeMeta {
            name: "verbs",
            label: "Verbs",
            category: "entity",
            description: "verb names visible on an entity via prototype walk",
            arity: Arity::Exact(1),
            params: &[SlotType::Entity],
            returns: SlotType::List,
            lazy: false,
        },
        op_verbs,
    );
    registry.register(
        OpcodeMeta {
            name: "get_prototype",
            label: "Get prototype",
            category: "entity",
            description: "an entity's prototype, or null",
            arity: Arity::Exact(1),
            params: &[SlotType::Entity],
            returns: SlotType::Entity,
            lazy: false,
        },
        op_get_prototype,
    );
    registry.register(
        OpcodeMeta {
            name: "get_property",
            label: "Get property",
            category: "entity",
            description: "resolved property read via prototype walk",
            arity: Arity::Exact(2),
            params: &[SlotType::Entity, SlotType::String],
            returns: SlotType::Any,
            lazy: false,
        },
        op_get_property,
    );
    registry.register(
        OpcodeMeta {
            name: "set_entity",
            label: "Set entity",
            category: "entity",
            description: "merge updates into an entity's instance properties",
            arity: Arity::Exact(3),
            params: &[SlotType::Capability, SlotType::Entity, SlotType::Object],
            returns: SlotType::Object,
            lazy: false,
        },
        op_set_entity,
    );
    registry.register(
        OpcodeMeta {
            name: "destroy",
            label: "Destroy",
            category: "entity",
            description: "delete an entity, its verbs, and its capabilities",
            arity: Arity::Exact(2),
            params: &[SlotType::Capability, SlotType::Entity],
            returns: SlotType::Bool,
            lazy: false,
        },
        op_destroy,
    );
    registry.register(
        OpcodeMeta {
            name: "set_prototype",
            label: "Set prototype",
            category: "entity",
            description: "change an entity's prototype",
            arity: Arity::Exact(3),
            params: &[SlotType::Capability, SlotType::Entity, SlotType::Entity],
            returns: SlotType::Bool,
            lazy: false,
        },
        op_set_prototype,
    );
    registry.register(
        OpcodeMeta {
            name: "create",
            label: "Create",
            category: "entity",
            description: "create a new entity from a descriptor object",
            arity: Arity::Exact(2),
            params: &[SlotType::Capability, SlotType::Object],
            returns: SlotType::Object,
            lazy: false,
        },
        op_create,
    );
    registry.register(
        OpcodeMeta {
            name: "mint",
            label: "Mint",
            category: "entity",
            description: "mint a new capability under a sys.mint authority",
            arity: Arity::Exact(3),
            params: &[SlotType::Capability, SlotType::String, SlotType::Object],
            returns: SlotType::Capability,
            lazy: false,
        },
        op_mint,
    );
    registry.register(
        OpcodeMeta {
            name: "give_capability",
            label: "Give capability",
            category: "entity",
            description: "transfer a capability to another entity",
            arity: Arity::Exact(2),
            params: &[SlotType::Capability, SlotType::Entity],
            returns: SlotType::Bool,
            lazy: false,
        },
        op_give_capability,
    );
    registry.register(
        OpcodeMeta {
            name: "revoke_capability",
            label: "Revoke capability",
            category: "entity",
            description: "revoke a capability and its descendants",
            arity: Arity::Exact(1),
            params: &[SlotType::Capability],
            returns: SlotType::Bool,
            lazy: false,
        },
        op_revoke_capability,
    );
    registry.register(
        OpcodeMeta {
            name: "sudo",
            label: "Sudo",
            category: "entity",
            description: "invoke a verb bypassing its normal call-permission check",
            arity: Arity::AtLeast(3),
            params: &[SlotType::Capability, SlotType::Entity, SlotType::String],
            returns: SlotType::Any,
            lazy: false,
        },
        op_sudo,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::{fresh_ctx, parse, try_eval_json};
    use loom_capability::{CapabilityStore, MINT_AUTHORITY_TYPE};
    use loom_interpreter::evaluate;
    use loom_repository::memory::MemoryRepository;
    use loom_values::{EntityId, EntityKind, Map, Var};
    use std::sync::Arc;

    #[test]
    fn set_entity_without_capability_fails() {
        let result = try_eval_json(r#"["set_entity", 1, {"$entity": 1}, {}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn s3_privileged_operation_denied_without_valid_capability() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let target = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        let mut ctx = fresh_ctx();
        ctx.repository = repo;
        ctx.capabilities = caps;
        let expr = parse(&format!(
            r#"["destroy", {{"$capability": {{"id": "00000000-0000-0000-0000-000000000000", "cap_type": "entity.control", "holder": 1}}}}, {{"$entity": {}}}]"#,
            target.id.0
        ));
        let err = evaluate(&expr, &mut ctx).unwrap_err();
        assert!(matches!(err, loom_interpreter::ScriptError::NotFound(_)));
    }

    /// S3 from spec.md §8, literal script: entity 10 owned by entity 1, caller entity 2 holds
    /// no `entity.control` capability for it, so `get_capability` returns null and the
    /// `set_entity` it's presented to must fail `PermissionDenied` rather than `TypeError` —
    /// entity 10's properties must be unchanged.
    #[test]
    fn s3_null_capability_from_lookup_miss_is_permission_denied() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let mut props = Map::new();
        props.insert("name".into(), Var::str("unchanged"));
        let target = repo
            .create_entity(None, None, Some(owner.id), EntityKind::Item, props)
            .unwrap();
        let caller = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();

        let mut ctx = fresh_ctx();
        ctx.repository = repo.clone();
        ctx.capabilities = caps;
        ctx.caller = caller.id;
        ctx.this = caller.id;

        let script = parse(&format!(
            r#"["set_entity",
                 ["get_capability", "entity.control", {{"target_id": {{"$entity": {target}}}}}],
                 ["entity", {{"$entity": {target}}}],
                 {{"name": "hacked"}}]"#,
            target = target.id.0
        ));
        let err = evaluate(&script, &mut ctx).unwrap_err();
        assert!(matches!(err, loom_interpreter::ScriptError::PermissionDenied(_)));

        let unchanged = repo.fetch_entity(target.id).unwrap();
        assert_eq!(
            unchanged.properties.get(&arcstr::ArcStr::from("name")).and_then(|v| v.as_str()),
            Some("unchanged")
        );
    }

    #[test]
    fn s4_delegation_then_give_capability() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let recipient = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let mut wildcard = Map::new();
        wildcard.insert("namespace".into(), Var::str("user"));
        let authority = caps.create_trusted(owner.id, MINT_AUTHORITY_TYPE, wildcard).unwrap();

        let mut ctx = fresh_ctx();
        ctx.repository = repo;
        ctx.capabilities = caps;
        ctx.caller = owner.id;
        ctx.this = owner.id;

        let minted_expr = parse(&format!(
            r#"["mint", {{"$capability": {{"id": "{}", "cap_type": "{}", "holder": {{"$entity": {}}}}}}}, "user.widget", {{}}]"#,
            authority.id.0, authority.cap_type, owner.id.0
        ));
        let minted = evaluate(&minted_expr, &mut ctx).unwrap();
        let minted_cap = minted.as_capability().unwrap().clone();

        let give_expr = Var::list_from(vec![
            Var::str("give_capability"),
            Var::capability(minted_cap),
            Var::entity(recipient.id),
        ]);
        let result = evaluate(&give_expr, &mut ctx).unwrap();
        assert_eq!(result.as_bool(), Some(true));
    }

    #[test]
    fn reads_need_no_capability() {
        let v = try_eval_json(r#"["entity", {"$entity": 1}]"#);
        // Entity 1 doesn't exist in the fresh test repository; the point is that this fails
        // with NotFound rather than PermissionDenied.
        assert!(matches!(v, Err(loom_interpreter::ScriptError::NotFound(_))));
    }
}
