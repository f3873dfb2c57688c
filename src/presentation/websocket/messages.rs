//! Realtime Message Types
//!
//! Frames exchanged on the `/api/v1/realtime` socket.

use serde::{Deserialize, Serialize};

use crate::application::dto::response::UserResponse;

/// Protocol version reported in READY.
pub const PROTOCOL_VERSION: u8 = 1;

/// Realtime opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch (server -> client)
    Dispatch = 0,
    /// Heartbeat (client -> server)
    Heartbeat = 1,
    /// Identify with an access token (client -> server)
    Identify = 2,
    /// Session rejected; the client should re-authenticate
    InvalidSession = 9,
    /// First frame on every connection
    Hello = 10,
    /// Heartbeat acknowledged
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(OpCode::Dispatch),
            1 => Some(OpCode::Heartbeat),
            2 => Some(OpCode::Identify),
            9 => Some(OpCode::InvalidSession),
            10 => Some(OpCode::Hello),
            11 => Some(OpCode::HeartbeatAck),
            _ => None,
        }
    }
}

/// Incoming frame
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u8,
    #[serde(default)]
    pub d: Option<serde_json::Value>,
}

/// Outgoing frame
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewaySend {
    fn control(op: OpCode, d: Option<serde_json::Value>) -> Self {
        Self {
            op: op as u8,
            d,
            s: None,
            t: None,
        }
    }

    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::control(
            OpCode::Hello,
            serde_json::to_value(HelloPayload { heartbeat_interval }).ok(),
        )
    }

    pub fn heartbeat_ack() -> Self {
        Self::control(OpCode::HeartbeatAck, None)
    }

    pub fn invalid_session() -> Self {
        Self::control(OpCode::InvalidSession, Some(serde_json::Value::Bool(false)))
    }

    pub fn dispatch(name: &str, sequence: u64, payload: serde_json::Value) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: Some(payload),
            s: Some(sequence),
            t: Some(name.to_string()),
        }
    }
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub v: u8,
    pub user: UserResponse,
    pub session_id: String,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hello_frame() {
        let json = serde_json::to_value(GatewaySend::hello(45000)).unwrap();
        assert_eq!(json, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 45000}}));
    }

    #[test]
    fn test_dispatch_frame_carries_sequence() {
        let frame = GatewaySend::dispatch("ORDER_UPDATE", 3, serde_json::json!({"id": "1"}));
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["s"], 3);
        assert_eq!(json["t"], "ORDER_UPDATE");
    }

    #[test]
    fn test_identify_parses() {
        let frame: GatewayReceive =
            serde_json::from_str(r#"{"op":2,"d":{"token":"abc"}}"#).unwrap();
        assert_eq!(OpCode::from_u8(frame.op), Some(OpCode::Identify));
        let identify: IdentifyPayload = serde_json::from_value(frame.d.unwrap()).unwrap();
        assert_eq!(identify.token, "abc");
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(OpCode::from_u8(4), None);
    }
}
