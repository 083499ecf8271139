//! The WebSocket transport (SPEC_FULL.md §6 "a WebSocket listener... each connection exchanging
//! the JSON envelope as text frames"). Grounded on the teacher's `web-host` crate's
//! split-sink-and-receiver connection loop (`crates/web-host/src/host/ws_connection.rs`), minus
//! its zmq-backed RPC/pubsub plumbing — loom's dispatcher lives in the same process, so a
//! connection talks to it directly rather than over a socket to a separate daemon.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use loom_common::wire::Inbound;
use loom_dispatcher::Dispatcher;
use loom_repository::Repository;
use loom_values::{EntityId, EntityKind, Map};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub repository: Arc<dyn Repository>,
}

/// `?player=<id>` reconnects to an existing entity; omitted, a fresh actor is created. loom's
/// spec has no authentication model (a client UI is an explicit non-goal, SPEC_FULL.md), so
/// this is the whole of connection bootstrap.
#[derive(Deserialize)]
pub struct ConnectParams {
    player: Option<i64>,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

fn resolve_or_create_player(
    repository: &dyn Repository,
    requested: Option<i64>,
) -> Result<EntityId, loom_repository::RepositoryError> {
    if let Some(id) = requested {
        let id = EntityId::new(id);
        repository.fetch_entity(id)?;
        return Ok(id);
    }
    let created = repository.create_entity(None, None, None, EntityKind::Actor, Map::new())?;
    Ok(created.id)
}

async fn handle_socket(socket: WebSocket, state: AppState, params: ConnectParams) {
    let player = match resolve_or_create_player(state.repository.as_ref(), params.player) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting connection: could not resolve a player entity");
            return;
        }
    };

    let (connection, mut outbound_rx) = state.dispatcher.connect(player);
    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            continue;
        };
        match serde_json::from_str::<Inbound>(&text) {
            Ok(inbound) => connection.handle_inbound(inbound).await,
            Err(e) => tracing::warn!(player = %player, error = %e, "dropping malformed inbound message"),
        }
    }

    send_task.abort();
    tracing::info!(player = %player, "connection closed");
}
