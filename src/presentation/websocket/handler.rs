//! Realtime Connection Handler
//!
//! Protocol: the server sends Hello, the client must Identify with an
//! access token within `websocket.identify_timeout_secs`, the server answers
//! with a READY dispatch, and from then on the client heartbeats while the
//! server pushes dispatches addressed to that user.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use super::hub::Dispatch;
use super::messages::{
    GatewayReceive, GatewaySend, IdentifyPayload, OpCode, ReadyPayload, PROTOCOL_VERSION,
};
use super::session::SessionState;
use crate::application::dto::response::UserResponse;
use crate::application::services::AuthService;
use crate::domain::User;
use crate::startup::AppState;

/// Extra time on top of the heartbeat interval before a silent client is
/// dropped.
const HEARTBEAT_GRACE: Duration = Duration::from_secs(10);

/// Time given to the writer to flush a final frame before the socket drops.
const CLOSE_FLUSH: Duration = Duration::from_millis(100);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    tracing::debug!(session_id = %session_id, "New realtime connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewaySend>();

    let hello = GatewaySend::hello(state.hub.heartbeat_interval());
    let Ok(hello) = serde_json::to_string(&hello) else {
        return;
    };
    if let Err(e) = sender.send(Message::Text(hello.into())).await {
        tracing::debug!(error = %e, "Failed to send Hello");
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let identify = match timeout(identify_timeout, wait_for_identify(&mut receiver)).await {
        Ok(Some(identify)) => identify,
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "Connection closed before Identify");
            writer.abort();
            return;
        }
        Err(_) => {
            tracing::debug!(session_id = %session_id, "Identify timeout");
            reject(&tx, writer).await;
            return;
        }
    };

    let user = match authenticate(&state, &identify.token).await {
        Some(user) => user,
        None => {
            tracing::debug!(session_id = %session_id, "Identify rejected");
            reject(&tx, writer).await;
            return;
        }
    };

    let mut session = SessionState::new(session_id.clone(), user.id);
    let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<Dispatch>();
    state
        .hub
        .register_session(session_id.clone(), user.id, dispatch_tx);

    let ready = ReadyPayload {
        v: PROTOCOL_VERSION,
        user: UserResponse::from_user(user, true),
        session_id: session_id.clone(),
    };
    let sent = serde_json::to_value(ready)
        .ok()
        .map(|d| tx.send(GatewaySend::dispatch("READY", session.next_sequence(), d)).is_ok())
        .unwrap_or(false);
    if !sent {
        state.hub.unregister_session(&session_id);
        writer.abort();
        return;
    }

    tracing::info!(user_id = session.user_id, session_id = %session_id, "Realtime session ready");

    let liveness = Duration::from_millis(state.hub.heartbeat_interval()) + HEARTBEAT_GRACE;
    let mut heartbeat_check = interval(liveness);
    heartbeat_check.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(text.as_str(), &mut session, &tx);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "Connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            Some(dispatch) = dispatch_rx.recv() => {
                let frame = GatewaySend::dispatch(dispatch.name, session.next_sequence(), dispatch.payload);
                if tx.send(frame).is_err() {
                    break;
                }
            }

            _ = heartbeat_check.tick() => {
                if !session.is_alive(liveness) {
                    tracing::info!(session_id = %session_id, "Heartbeat timeout, closing connection");
                    break;
                }
            }
        }
    }

    state.hub.unregister_session(&session_id);
    writer.abort();
    tracing::info!(user_id = session.user_id, session_id = %session_id, "Realtime session closed");
}

/// Read frames until an Identify arrives. Other frames are ignored.
async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>) -> Option<IdentifyPayload> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(frame) = serde_json::from_str::<GatewayReceive>(text.as_str()) else {
                    continue;
                };
                if OpCode::from_u8(frame.op) != Some(OpCode::Identify) {
                    continue;
                }
                if let Some(identify) = frame
                    .d
                    .and_then(|d| serde_json::from_value::<IdentifyPayload>(d).ok())
                {
                    return Some(identify);
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn authenticate(state: &AppState, token: &str) -> Option<User> {
    match state.auth_service().authenticate_token(token).await {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!(error = %e, "Realtime token rejected");
            None
        }
    }
}

async fn reject(tx: &mpsc::UnboundedSender<GatewaySend>, writer: tokio::task::JoinHandle<()>) {
    let _ = tx.send(GatewaySend::invalid_session());
    tokio::time::sleep(CLOSE_FLUSH).await;
    writer.abort();
}

fn handle_frame(text: &str, session: &mut SessionState, tx: &mpsc::UnboundedSender<GatewaySend>) {
    let frame = match serde_json::from_str::<GatewayReceive>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(session_id = %session.session_id, error = %e, "Invalid frame");
            return;
        }
    };

    match OpCode::from_u8(frame.op) {
        Some(OpCode::Heartbeat) => {
            session.heartbeat();
            let _ = tx.send(GatewaySend::heartbeat_ack());
            tracing::trace!(session_id = %session.session_id, "Heartbeat received");
        }
        Some(OpCode::Identify) => {
            tracing::debug!(session_id = %session.session_id, "Ignoring repeated Identify");
        }
        _ => {
            tracing::debug!(session_id = %session.session_id, op = frame.op, "Unexpected opcode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_is_acknowledged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = SessionState::new("s".into(), 1);
        handle_frame(r#"{"op":1}"#, &mut session, &tx);
        let ack = rx.try_recv().unwrap();
        assert_eq!(ack.op, OpCode::HeartbeatAck as u8);
    }

    #[test]
    fn test_garbage_frame_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = SessionState::new("s".into(), 1);
        handle_frame("not json", &mut session, &tx);
        handle_frame(r#"{"op":42}"#, &mut session, &tx);
        assert!(rx.try_recv().is_err());
    }
}
