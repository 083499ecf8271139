//! The wire protocol envelope (spec.md §6 "Wire protocol"): length-delimited JSON objects
//! exchanged over a bidirectional message channel. Framing itself is the transport's job
//! (SPEC_FULL.md §6 picks WebSocket, whose frames already delimit messages); this module only
//! describes the JSON shapes.

use loom_values::Var;
use serde::{Deserialize, Serialize};

/// `{ "id": <number>, "method": <string>, "params": <array> }` — client→server, expects a
/// response with the same id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Var>,
}

/// `{ "method": <string>, "params": <object|array> }` — either direction, no response expected.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Var,
}

/// Anything a client may send us.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Inbound {
    Request(Request),
    Notification(Notification),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// `{ "id": <number>, "result": <any> }` on success, or
/// `{ "id": <number>, "error": { "code": <number>, "message": <string> } }` on failure.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    Success { id: i64, result: Var },
    Failure { id: i64, error: RpcError },
}

impl Response {
    pub fn ok(id: i64, result: Var) -> Self {
        Response::Success { id, result }
    }

    pub fn err(id: i64, code: i64, message: impl Into<String>) -> Self {
        Response::Failure {
            id,
            error: RpcError {
                code,
                message: message.into(),
            },
        }
    }
}

/// Anything the server may send to a client: a `Response` to a prior `Request`, or an
/// unsolicited `Notification` (`message`, `room`, `inventory`, `item`, `update`, `player_id`,
/// per spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Outbound {
    Response(Response),
    Notification(Notification),
}

/// Standard error codes used by the dispatcher (method-not-found) and by the interpreter's
/// `ScriptError` kinds when converted to a wire `RpcError` (spec.md §7).
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const ARITY_ERROR: i64 = 1;
    pub const TYPE_ERROR: i64 = 2;
    pub const UNKNOWN_OPCODE: i64 = 3;
    pub const UNKNOWN_VARIABLE: i64 = 4;
    pub const PERMISSION_DENIED: i64 = 5;
    pub const NOT_FOUND: i64 = 6;
    pub const CYCLIC_CONTAINMENT: i64 = 7;
    pub const GAS_EXHAUSTED: i64 = 8;
    pub const USER_ERROR: i64 = 9;
    pub const STACK_DEPTH_EXCEEDED: i64 = 10;
    pub const INTERNAL_ERROR: i64 = 99;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = Request {
            id: 1,
            method: "execute".to_string(),
            params: vec![Var::str("look")],
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Inbound = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Inbound::Request(req));
    }

    #[test]
    fn error_response_shape() {
        let resp = Response::err(7, error_codes::NOT_FOUND, "no such entity");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], 6);
        assert_eq!(json["id"], 7);
    }
}
