//! End-to-end smoke test wiring the same stack `main.rs` does (repository, capability store,
//! opcode registry, dispatcher) minus the `fjall`/`axum` transport, driving it through
//! [`loom_dispatcher::Dispatcher`] exactly as a WebSocket connection would.

use loom_capability::CapabilityStore;
use loom_common::wire::{Inbound, Outbound, Request, Response};
use loom_dispatcher::Dispatcher;
use loom_interpreter::{register_core_opcodes, OpcodeRegistry};
use loom_repository::memory::MemoryRepository;
use loom_repository::{Repository, VerbPermissions};
use loom_values::{EntityKind, Map, Var};
use std::sync::Arc;

fn wired_dispatcher() -> (Arc<Dispatcher>, Arc<dyn Repository>) {
    let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let capabilities = Arc::new(CapabilityStore::new(repository.clone()));
    let mut registry = OpcodeRegistry::new();
    register_core_opcodes(&mut registry);
    loom_stdlib::install_all(&mut registry);
    let dispatcher = Dispatcher::new(
        repository.clone(),
        capabilities,
        Arc::new(registry),
        None,
        10_000,
        64,
        16,
    );
    (dispatcher, repository)
}

/// spec.md §8 S1 — "Arithmetic chain": `["+", 1, 2, 3, ["*", 4, 5]]` evaluates to `26`.
#[tokio::test]
async fn execute_runs_a_verb_end_to_end() {
    let (dispatcher, repository) = wired_dispatcher();
    let player = repository
        .create_entity(None, None, None, EntityKind::Actor, Map::new())
        .unwrap();
    repository
        .add_verb(
            player.id,
            "arithmetic",
            Var::list_from(vec![
                Var::str("+"),
                Var::number(1.0),
                Var::number(2.0),
                Var::number(3.0),
                Var::list_from(vec![Var::str("*"), Var::number(4.0), Var::number(5.0)]),
            ]),
            VerbPermissions::Public,
            vec![],
            player.id,
        )
        .unwrap();

    let (connection, mut outbound) = dispatcher.connect(player.id);
    let _handshake = outbound.recv().await; // player_id

    connection
        .handle_inbound(Inbound::Request(Request {
            id: 1,
            method: "execute".to_string(),
            params: vec![Var::str("arithmetic")],
        }))
        .await;

    match outbound.recv().await.unwrap() {
        Outbound::Response(Response::Success { id, result }) => {
            assert_eq!(id, 1);
            assert_eq!(result.as_number(), Some(26.0));
        }
        other => panic!("expected a success response, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_verb_reports_not_found() {
    let (dispatcher, repository) = wired_dispatcher();
    let player = repository
        .create_entity(None, None, None, EntityKind::Actor, Map::new())
        .unwrap();

    let (connection, mut outbound) = dispatcher.connect(player.id);
    let _handshake = outbound.recv().await;

    connection
        .handle_inbound(Inbound::Request(Request {
            id: 2,
            method: "execute".to_string(),
            params: vec![Var::str("nonexistent")],
        }))
        .await;

    match outbound.recv().await.unwrap() {
        Outbound::Response(Response::Failure { id, error }) => {
            assert_eq!(id, 2);
            assert_eq!(error.code, loom_common::wire::error_codes::NOT_FOUND);
        }
        other => panic!("expected a failure response, got {other:?}"),
    }
}
