//! The session dispatcher (spec.md §4.7): the single place where transport messages become
//! script invocations. Scripts never see the transport directly — they talk to a connection's
//! outbound queue through `ctx.send`, which this crate wraps into wire-protocol frames.
//!
//! Grounded on the teacher's session/RPC-call shape (`crates/kernel/src/tasks/sessions.rs`,
//! `crates/daemon/src/rpc_session.rs`, `crates/telnet-host/src/connection.rs`), collapsed onto a
//! single in-process dispatcher since loom's spec does not call for splitting host and daemon
//! into separate zmq-connected processes the way the teacher does.

pub mod error;
pub mod resolve;

use error::DispatchError;
use loom_capability::CapabilityStore;
use loom_common::wire::{error_codes, Inbound, Notification, Outbound, Request, Response};
use loom_interpreter::{
    evaluate_verb_body, ExecutionContext, OpcodeRegistry, OutboundSink, SchedulerHandle,
    ScriptError,
};
use loom_repository::Repository;
use loom_values::{EntityId, Map, Var};
use resolve::resolve_verb;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Maps a [`ScriptError`] to the wire error code spec.md §7 assigns each catchable kind.
fn code_for(err: &ScriptError) -> i64 {
    match err {
        ScriptError::ArityError { .. } => error_codes::ARITY_ERROR,
        ScriptError::TypeError { .. } => error_codes::TYPE_ERROR,
        ScriptError::UnknownOpcode(_) => error_codes::UNKNOWN_OPCODE,
        ScriptError::UnknownVariable(_) => error_codes::UNKNOWN_VARIABLE,
        ScriptError::PermissionDenied(_) => error_codes::PERMISSION_DENIED,
        ScriptError::NotFound(_) => error_codes::NOT_FOUND,
        ScriptError::CyclicContainment(_, _) => error_codes::CYCLIC_CONTAINMENT,
        ScriptError::GasExhausted => error_codes::GAS_EXHAUSTED,
        ScriptError::UserError(_) => error_codes::USER_ERROR,
        ScriptError::StackDepthExceeded => error_codes::STACK_DEPTH_EXCEEDED,
        // `evaluate_verb_body` folds `Return` into `Ok`; it should never reach here.
        ScriptError::Return(_) => error_codes::INTERNAL_ERROR,
    }
}

/// Delivers `ctx.send` calls onto a connection's bounded outbound queue (spec.md §4.7 "scripts
/// never see the transport directly"; §5 "the outbound message queue per connection is
/// bounded; when full, `ctx.send` blocks the current verb until space is available"). Verb
/// evaluation runs inside [`tokio::task::spawn_blocking`] (see [`Connection::execute`]), which
/// is exactly the context `Sender::blocking_send` is meant for.
struct ConnectionSink {
    outbound: mpsc::Sender<Outbound>,
}

impl OutboundSink for ConnectionSink {
    fn send(&self, channel: &str, payload: &Var) {
        let notification = Outbound::Notification(Notification {
            method: channel.to_string(),
            params: payload.clone(),
        });
        if self.outbound.blocking_send(notification).is_err() {
            tracing::warn!(channel, "dropped outbound message: connection closed");
        }
    }
}

/// Everything connections share: the repository, capability store, opcode registry, optional
/// scheduler handle, and the gas/stack budgets a fresh per-request context is built with.
pub struct Dispatcher {
    repository: Arc<dyn Repository>,
    capabilities: Arc<CapabilityStore>,
    registry: Arc<OpcodeRegistry>,
    scheduler: Option<Arc<dyn SchedulerHandle>>,
    default_gas: i64,
    max_stack_depth: usize,
    outbound_queue_capacity: usize,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn Repository>,
        capabilities: Arc<CapabilityStore>,
        registry: Arc<OpcodeRegistry>,
        scheduler: Option<Arc<dyn SchedulerHandle>>,
        default_gas: i64,
        max_stack_depth: usize,
        outbound_queue_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Dispatcher {
            repository,
            capabilities,
            registry,
            scheduler,
            default_gas,
            max_stack_depth,
            outbound_queue_capacity,
        })
    }

    /// Opens a new session for `player`. Returns the [`Connection`] the transport layer should
    /// feed inbound messages to, and the receiving half of its outbound queue — the transport
    /// layer's job is to pump that receiver onto the wire (e.g. a WebSocket send loop).
    pub fn connect(self: &Arc<Self>, player: EntityId) -> (Connection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.outbound_queue_capacity.max(1));
        // Initial handshake notification (spec.md §6 "player_id (initial handshake)"). The
        // channel is freshly created so this can never exceed capacity.
        let _ = tx.try_send(Outbound::Notification(Notification {
            method: "player_id".to_string(),
            params: Var::entity(player),
        }));
        (
            Connection {
                dispatcher: self.clone(),
                player,
                outbound: tx,
            },
            rx,
        )
    }
}

/// Per-connection session state (spec.md §4.7 "the acting `player` entity id, an output
/// channel").
pub struct Connection {
    dispatcher: Arc<Dispatcher>,
    player: EntityId,
    outbound: mpsc::Sender<Outbound>,
}

impl Connection {
    pub fn player(&self) -> EntityId {
        self.player
    }

    /// Feeds one inbound message through the dispatcher. Client-to-server notifications have
    /// no recognized methods in spec.md §6 (notifications flow server→client); any arrive here
    /// silently ignored rather than rejected, since a no-op is the more forward-compatible
    /// response to an unrecognized-but-harmless message shape.
    pub async fn handle_inbound(&self, inbound: Inbound) {
        match inbound {
            Inbound::Request(request) => self.handle_request(request).await,
            Inbound::Notification(_) => {}
        }
    }

    async fn handle_request(&self, request: Request) {
        match request.method.as_str() {
            "execute" => self.execute(request).await,
            "look" => self.look(request.id).await,
            "ping" => self.ping(request.id).await,
            other => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("unknown method: {other}"),
                )))
                .await;
            }
        }
    }

    /// `execute(verb_name, ...args)` (spec.md §4.7 step 1): resolve the verb by search order,
    /// check its call-scope against `ctx.caller`, run it, and translate the outcome to a
    /// response (plus a warnings notification if any accrued).
    async fn execute(&self, request: Request) {
        let mut params = request.params.into_iter();
        let verb_name = match params.next().and_then(|v| v.as_str().map(str::to_string)) {
            Some(name) => name,
            None => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    error_codes::TYPE_ERROR,
                    "execute requires a verb name as its first parameter",
                )))
                .await;
                return;
            }
        };
        let call_args: Vec<Var> = params.collect();

        let resolved = match resolve_verb(self.dispatcher.repository.as_ref(), self.player, &verb_name) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    error_codes::NOT_FOUND,
                    format!("no verb named {verb_name} found on you, your location, or anything nearby"),
                )))
                .await;
                return;
            }
            Err(e) => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    error_codes::INTERNAL_ERROR,
                    e.to_string(),
                )))
                .await;
                return;
            }
        };

        // Checked again here, not only inside the `call` opcode, since a dispatcher-initiated
        // invocation never goes through `call` (DESIGN.md, verb-permission open question).
        if !resolved.verb.callable_by(self.player) {
            self.push(Outbound::Response(Response::err(
                request.id,
                error_codes::PERMISSION_DENIED,
                format!("{} may not call {verb_name} on {}", self.player, resolved.entity),
            )))
            .await;
            return;
        }

        let sink = Arc::new(ConnectionSink {
            outbound: self.outbound.clone(),
        });
        let mut ctx = ExecutionContext::new(
            self.player,
            resolved.entity,
            call_args,
            self.dispatcher.default_gas,
            self.dispatcher.max_stack_depth,
            self.dispatcher.repository.clone(),
            self.dispatcher.capabilities.clone(),
            self.dispatcher.registry.clone(),
            sink,
            self.dispatcher.scheduler.clone(),
        );
        let code = resolved.verb.code.clone();
        // Evaluation is synchronous CPU work that may also block on `ctx.send` backpressure
        // (spec.md §5); spawn_blocking keeps it off the async executor's worker threads.
        let outcome = tokio::task::spawn_blocking(move || {
            let result = evaluate_verb_body(&code, &mut ctx);
            (result, ctx.warnings)
        })
        .await;

        let (result, warnings) = match outcome {
            Ok(pair) => pair,
            Err(join_error) => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    error_codes::INTERNAL_ERROR,
                    format!("verb task did not complete: {join_error}"),
                )))
                .await;
                return;
            }
        };

        if !warnings.is_empty() {
            self.push(Outbound::Notification(Notification {
                method: "warnings".to_string(),
                params: Var::list_from(warnings.into_iter().map(Var::str)),
            }))
            .await;
        }

        match result {
            Ok(value) => {
                self.push(Outbound::Response(Response::ok(request.id, value)))
                    .await;
            }
            Err(e) => {
                self.push(Outbound::Response(Response::err(
                    request.id,
                    code_for(&e),
                    e.to_string(),
                )))
                .await;
            }
        }
    }

    /// `look` (SPEC_FULL.md §4.7): re-sends the current room and inventory notifications
    /// without involving a verb, since it predates any particular world content.
    async fn look(&self, request_id: i64) {
        match self.room_and_inventory() {
            Ok((room, inventory)) => {
                self.push(Outbound::Notification(Notification {
                    method: "room".to_string(),
                    params: room,
                }))
                .await;
                self.push(Outbound::Notification(Notification {
                    method: "inventory".to_string(),
                    params: inventory,
                }))
                .await;
                self.push(Outbound::Response(Response::ok(request_id, Var::bool(true))))
                    .await;
            }
            Err(e) => {
                self.push(Outbound::Response(Response::err(
                    request_id,
                    error_codes::INTERNAL_ERROR,
                    e.to_string(),
                )))
                .await;
            }
        }
    }

    /// `ping` (SPEC_FULL.md §4.7): liveness check, answered without touching the repository.
    async fn ping(&self, request_id: i64) {
        self.push(Outbound::Response(Response::ok(request_id, Var::bool(true))))
            .await;
    }

    fn room_and_inventory(&self) -> Result<(Var, Var), DispatchError> {
        let repository = self.dispatcher.repository.as_ref();
        let player_entity = repository.fetch_entity(self.player)?;
        let room = match player_entity.location {
            Some(location) => entity_summary(repository, location)?,
            None => Var::none(),
        };
        let inventory = repository
            .list_contents(self.player)?
            .into_iter()
            .map(Var::entity);
        Ok((room, Var::list_from(inventory)))
    }

    async fn push(&self, message: Outbound) {
        if self.outbound.send(message).await.is_err() {
            tracing::warn!(player = %self.player, "outbound channel closed, dropping message");
        }
    }
}

fn entity_summary(repository: &dyn Repository, id: EntityId) -> Result<Var, DispatchError> {
    let entity = repository.fetch_entity(id)?;
    let mut fields = Map::new();
    fields.insert("id".into(), Var::entity(entity.id));
    fields.insert("properties".into(), Var::map(entity.properties));
    Ok(Var::map(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_capability::CapabilityStore;
    use loom_interpreter::register_core_opcodes;
    use loom_repository::{memory::MemoryRepository, VerbPermissions};
    use loom_values::EntityKind;

    fn fresh() -> (Arc<Dispatcher>, Arc<dyn Repository>) {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let mut registry = OpcodeRegistry::new();
        register_core_opcodes(&mut registry);
        loom_stdlib::install_all(&mut registry);
        let dispatcher = Dispatcher::new(repo.clone(), caps, Arc::new(registry), None, 10_000, 64, 8);
        (dispatcher, repo)
    }

    #[tokio::test]
    async fn unknown_method_reports_method_not_found() {
        let (dispatcher, repo) = fresh();
        let player = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let (conn, mut rx) = dispatcher.connect(player.id);
        // Drain the initial player_id handshake notification.
        assert!(matches!(rx.recv().await, Some(Outbound::Notification(_))));

        conn.handle_inbound(Inbound::Request(Request {
            id: 1,
            method: "nonsense".to_string(),
            params: vec![],
        }))
        .await;

        match rx.recv().await.unwrap() {
            Outbound::Response(Response::Failure { id, error }) => {
                assert_eq!(id, 1);
                assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
            }
            other => panic!("expected a failure response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_resolves_and_runs_a_verb_in_the_room() {
        let (dispatcher, repo) = fresh();
        let room = repo
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let player = repo
            .create_entity(None, Some(room.id), None, EntityKind::Actor, Map::new())
            .unwrap();
        repo.add_verb(
            room.id,
            "echo",
            Var::list_from(vec![Var::str("arg"), Var::number(0.0)]),
            VerbPermissions::Public,
            vec![],
            room.id,
        )
        .unwrap();

        let (conn, mut rx) = dispatcher.connect(player.id);
        let _ = rx.recv().await; // player_id handshake

        conn.handle_inbound(Inbound::Request(Request {
            id: 7,
            method: "execute".to_string(),
            params: vec![Var::str("echo"), Var::str("hello")],
        }))
        .await;

        match rx.recv().await.unwrap() {
            Outbound::Response(Response::Success { id, result }) => {
                assert_eq!(id, 7);
                assert_eq!(result.as_str(), Some("hello"));
            }
            other => panic!("expected a success response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_reports_permission_denied_for_an_owner_only_verb() {
        let (dispatcher, repo) = fresh();
        let owner = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let caller = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();

        let (conn, mut rx) = dispatcher.connect(caller.id);
        let _ = rx.recv().await;

        // The verb resolves on the caller's own entity (first in search order) but is owned by
        // someone else, so `callable_by` must reject it.
        repo.add_verb(
            caller.id,
            "private",
            Var::list_from(vec![Var::str("seq")]),
            VerbPermissions::Owner,
            vec![],
            owner.id,
        )
        .unwrap();

        conn.handle_inbound(Inbound::Request(Request {
            id: 3,
            method: "execute".to_string(),
            params: vec![Var::str("private")],
        }))
        .await;

        match rx.recv().await.unwrap() {
            Outbound::Response(Response::Failure { id, error }) => {
                assert_eq!(id, 3);
                assert_eq!(error.code, error_codes::PERMISSION_DENIED);
            }
            other => panic!("expected a failure response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_answers_without_touching_the_repository() {
        let (dispatcher, repo) = fresh();
        let player = repo
            .create_entity(None, None, None, EntityKind::Actor, Map::new())
            .unwrap();
        let (conn, mut rx) = dispatcher.connect(player.id);
        let _ = rx.recv().await;

        conn.handle_inbound(Inbound::Request(Request {
            id: 9,
            method: "ping".to_string(),
            params: vec![],
        }))
        .await;

        match rx.recv().await.unwrap() {
            Outbound::Response(Response::Success { id, result }) => {
                assert_eq!(id, 9);
                assert_eq!(result.as_bool(), Some(true));
            }
            other => panic!("expected a success response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn look_reports_room_and_inventory_notifications() {
        let (dispatcher, repo) = fresh();
        let room = repo
            .create_entity(None, None, None, EntityKind::Room, Map::new())
            .unwrap();
        let player = repo
            .create_entity(None, Some(room.id), None, EntityKind::Actor, Map::new())
            .unwrap();
        repo.create_entity(None, Some(player.id), None, EntityKind::Item, Map::new())
            .unwrap();

        let (conn, mut rx) = dispatcher.connect(player.id);
        let _ = rx.recv().await;

        conn.handle_inbound(Inbound::Request(Request {
            id: 2,
            method: "look".to_string(),
            params: vec![],
        }))
        .await;

        match rx.recv().await.unwrap() {
            Outbound::Notification(n) => assert_eq!(n.method, "room"),
            other => panic!("expected a room notification, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Outbound::Notification(n) => {
                assert_eq!(n.method, "inventory");
                assert_eq!(n.params.as_list().unwrap().len(), 1);
            }
            other => panic!("expected an inventory notification, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), Outbound::Response(Response::Success { id: 2, .. })));
    }
}
