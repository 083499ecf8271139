//! `get_capability` and `delegate` (spec.md §4.2 "lookup"/"delegate", surfaced to scripts).
//! These are the opcodes the S3–S5 end-to-end scenarios (spec.md §8) drive directly: a script
//! fetches its own holder's capability with `get_capability`, optionally narrows it with
//! `delegate`, then presents the result to a capability-mediated opcode in `entity.rs`.

use crate::shared::type_error;
use loom_capability::CapabilityRef;
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::Var;

/// See the identical helper in `entity.rs`: a null capability (e.g. a `get_capability` lookup
/// miss) is the "missing" case of spec.md §7 `PermissionDenied`, not a `TypeError`.
fn require_capability<'a>(opcode: &str, v: &'a Var) -> Result<&'a CapabilityRef, ScriptError> {
    if v.is_none() {
        return Err(ScriptError::PermissionDenied(format!("{opcode}: no capability presented")));
    }
    v.as_capability()
        .ok_or_else(|| type_error(opcode, format!("expected a capability, got {}", v.type_name())))
}

/// `get_capability(type, filter)` — returns a capability held by `ctx.caller` of `type` whose
/// params satisfy `filter`, or null (spec.md §4.2 "lookup" — "never returns another holder's
/// tokens", enforced here by always looking up under `ctx.caller` rather than a caller-supplied
/// holder argument).
fn op_get_capability(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let cap_type = args[0]
        .as_str()
        .ok_or_else(|| type_error("get_capability", "first argument must be a type string"))?;
    let filter = args
        .get(1)
        .and_then(|v| v.as_map())
        .cloned()
        .unwrap_or_default();
    match ctx.capabilities.lookup(ctx.caller, cap_type, &filter)? {
        Some(cap_ref) => Ok(Var::capability(cap_ref)),
        None => Ok(Var::none()),
    }
}

/// `delegate(cap, restrictions)` — derives a new capability held by `ctx.caller` with the
/// parent's type and params narrowed by `restrictions` (spec.md §4.2 "delegate").
fn op_delegate(args: &[Var], ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let parent = require_capability("delegate", &args[0])?;
    let restrictions = args
        .get(1)
        .and_then(|v| v.as_map())
        .cloned()
        .unwrap_or_default();
    let row = ctx.capabilities.delegate(parent, ctx.caller, restrictions)?;
    Ok(loom_capability::row_to_var(&row))
}

pub fn install(registry: &mut OpcodeRegistry) {
    registry.register(
        OpcodeMeta {
            name: "get_capability",
            label: "Get capability",
            category: "capability",
            description: "a capability held by the caller matching type and filter, or null",
            arity: Arity::Range(1, 2),
            params: &[SlotType::String, SlotType::Object],
            returns: SlotType::Capability,
            lazy: false,
        },
        op_get_capability,
    );
    registry.register(
        OpcodeMeta {
            name: "delegate",
            label: "Delegate",
            category: "capability",
            description: "derive a narrowed capability from a held parent capability",
            arity: Arity::Range(1, 2),
            params: &[SlotType::Capability, SlotType::Object],
            returns: SlotType::Capability,
            lazy: false,
        },
        op_delegate,
    );
}

#[cfg(test)]
mod tests {
    use crate::test_support::{fresh_ctx, parse};
    use loom_capability::{CapabilityStore, MINT_AUTHORITY_TYPE};
    use loom_interpreter::evaluate;
    use loom_repository::memory::MemoryRepository;
    use loom_values::{EntityId, EntityKind, Map, Var};
    use std::sync::Arc;

    #[test]
    fn get_capability_finds_only_own_holdings() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let mut params = Map::new();
        params.insert("target_id".into(), Var::entity(EntityId::new(10)));
        caps.create_trusted(owner.id, "entity.control", params).unwrap();

        let mut ctx = fresh_ctx();
        ctx.repository = repo;
        ctx.capabilities = caps;
        ctx.caller = owner.id;

        let found = evaluate(
            &parse(r#"["get_capability", "entity.control", {"target_id": {"$entity": 10}}]"#),
            &mut ctx,
        )
        .unwrap();
        assert!(found.as_capability().is_some());

        let other = EntityId::new(999);
        ctx.caller = other;
        let missing = evaluate(
            &parse(r#"["get_capability", "entity.control", {"target_id": {"$entity": 10}}]"#),
            &mut ctx,
        )
        .unwrap();
        assert!(missing.is_none());
    }

    /// S4 from spec.md §8: owner delegates its `entity.control{target_id:10}` capability and
    /// gives the result to another entity, which can then act on entity 10.
    #[test]
    fn s4_delegate_then_give_then_act() {
        let repo: Arc<dyn loom_repository::Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let recipient = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let target = repo
            .create_entity(None, None, Some(owner.id), EntityKind::Item, Map::new())
            .unwrap();
        let mut params = Map::new();
        params.insert("target_id".into(), Var::entity(target.id));
        caps.create_trusted(owner.id, "entity.control", params).unwrap();

        let mut ctx = fresh_ctx();
        ctx.repository = repo.clone();
        ctx.capabilities = caps.clone();
        ctx.caller = owner.id;
        ctx.this = owner.id;

        let script = parse(&format!(
            r#"["seq",
                 ["let", "c", ["get_capability", "entity.control", {{"target_id": {{"$entity": {target}}}}}]],
                 ["let", "d", ["delegate", ["var", "c"], {{}}]],
                 ["give_capability", ["var", "d"], {{"$entity": {recipient}}}]]"#,
            target = target.id.0,
            recipient = recipient.id.0
        ));
        let gave = evaluate(&script, &mut ctx).unwrap();
        assert_eq!(gave.as_bool(), Some(true));

        // Recipient can now present the delegated capability to act on the target.
        ctx.caller = recipient.id;
        let act = parse(&format!(
            r#"["set_entity", ["get_capability", "entity.control", {{"target_id": {{"$entity": {target}}}}}], {{"$entity": {target}}}, {{"name": "retitled"}}]"#,
            target = target.id.0
        ));
        let result = evaluate(&act, &mut ctx).unwrap();
        assert_eq!(
            result.as_map().unwrap().get(&arcstr::ArcStr::from("properties")).unwrap().as_map().unwrap().get(&arcstr::ArcStr::from("name")).unwrap().as_str(),
            Some("retitled")
        );
        let _ = MINT_AUTHORITY_TYPE;
    }
}
