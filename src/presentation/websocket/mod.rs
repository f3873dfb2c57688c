//! Realtime Gateway
//!
//! WebSocket sessions and the hub that routes marketplace events to them.

pub mod handler;
pub mod hub;
pub mod messages;
pub mod session;

pub use handler::ws_handler;
pub use hub::{Dispatch, Hub};
pub use messages::{GatewayReceive, GatewaySend, OpCode};
pub use session::SessionState;
