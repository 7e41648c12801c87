//! Peer signaling WebSocket.
//!
//! Each socket is one viewer connection. Requests are handled in arrival
//! order and answered with a reply carrying the client's `requestId`;
//! candidates and state changes for the viewer's peers are pushed as they
//! happen. A viewer can only address peers created over its own socket;
//! any other peer id is reported as not found. Closing the socket closes
//! every peer created over it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use retrocast_engine::Engine;
use retrocast_ipc::{
    ErrorBody, ErrorKind, SignalingEnvelope, SignalingEvent, SignalingReply, SignalingRequest,
    ViewerId,
};

use crate::error::ApiError;
use crate::AppState;

pub async fn signaling_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

async fn handle_socket(mut socket: WebSocket, engine: Engine) {
    let viewer_id = ViewerId::generate();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<SignalingEvent>();
    info!(viewer_id = %viewer_id, "Signaling client connected");

    loop {
        tokio::select! {
            Some(event) = outbox_rx.recv() => {
                if !send_json(&mut socket, &event).await {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = dispatch(&engine, &viewer_id, &outbox_tx, &text).await;
                        if !send_json(&mut socket, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Signaling socket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let closed = engine.peers().close_for_viewer(&viewer_id).await;
    info!(viewer_id = %viewer_id, closed_peers = closed, "Signaling client disconnected");
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize signaling message: {}", e);
            true
        }
    }
}

/// Handle one signaling request and build its reply.
pub(crate) async fn dispatch(
    engine: &Engine,
    viewer_id: &ViewerId,
    outbox: &mpsc::UnboundedSender<SignalingEvent>,
    text: &str,
) -> SignalingReply {
    let envelope: SignalingEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Malformed signaling message: {}", e);
            return SignalingReply::failed(
                request_id_of(text),
                ErrorBody::new(ErrorKind::MalformedMessage, e.to_string()),
            );
        }
    };

    let request_id = envelope.request_id;
    let result: Result<SignalingReply, ApiError> = match envelope.request {
        SignalingRequest::CreateSession { game_session_id } => engine
            .create_peer_session(&game_session_id, viewer_id, outbox.clone())
            .await
            .map(|(session_id, offer)| SignalingReply::created(request_id, session_id, offer))
            .map_err(ApiError::from),
        SignalingRequest::Answer { session_id, answer } => {
            let applied = match engine.peers().ensure_owner(&session_id, viewer_id) {
                Ok(()) => engine.peers().apply_answer(&session_id, answer).await,
                Err(e) => Err(e),
            };
            applied
                .map(|()| SignalingReply::ok(request_id))
                .map_err(ApiError::from)
        }
        SignalingRequest::IceCandidate {
            session_id,
            candidate,
        } => {
            let added = match engine.peers().ensure_owner(&session_id, viewer_id) {
                Ok(()) => {
                    engine
                        .peers()
                        .add_remote_candidate(&session_id, candidate)
                        .await
                }
                Err(e) => Err(e),
            };
            added
                .map(|()| SignalingReply::ok(request_id))
                .map_err(ApiError::from)
        }
        SignalingRequest::CloseSession { session_id } => {
            let closed = match engine.peers().ensure_owner(&session_id, viewer_id) {
                Ok(()) => engine.peers().close(&session_id).await,
                Err(e) => Err(e),
            };
            closed
                .map(|()| SignalingReply::ok(request_id))
                .map_err(ApiError::from)
        }
    };

    result.unwrap_or_else(|e| {
        debug!(kind = e.kind().as_str(), "Signaling request failed: {}", e.0.message);
        SignalingReply::failed(request_id, e.0)
    })
}

/// Best-effort correlation id from a message that failed to parse.
fn request_id_of(text: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("requestId")?
        .as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrocast_ipc::{EngineConfig, PeerState};

    fn engine() -> Engine {
        let config = EngineConfig {
            core_path: "/nonexistent/core.so".into(),
            ice_servers: Vec::new(),
            ..Default::default()
        };
        Engine::new(config).unwrap()
    }

    fn source() -> String {
        format!("{}/Cargo.toml", env!("CARGO_MANIFEST_DIR"))
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let engine = engine();
        let (outbox, _rx) = mpsc::unbounded_channel();
        let reply = dispatch(
            &engine,
            &ViewerId::generate(),
            &outbox,
            r#"{"requestId": 7, "type": "teleport"}"#,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.request_id, Some(7));
        assert_eq!(reply.error.unwrap().kind, ErrorKind::MalformedMessage);
    }

    #[tokio::test]
    async fn test_create_for_unknown_game_session() {
        let engine = engine();
        let (outbox, _rx) = mpsc::unbounded_channel();
        let reply = dispatch(
            &engine,
            &ViewerId::generate(),
            &outbox,
            r#"{"requestId": 1, "type": "create-session", "gameSessionId": "nope"}"#,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_then_close() {
        let engine = engine();
        let game = engine.create(source(), None).unwrap().id;
        let viewer = ViewerId::generate();
        let (outbox, mut rx) = mpsc::unbounded_channel();

        let request = serde_json::json!({
            "requestId": 1,
            "type": "create-session",
            "gameSessionId": game,
        });
        let reply = dispatch(&engine, &viewer, &outbox, &request.to_string()).await;
        assert!(reply.success, "{:?}", reply.error);
        assert_eq!(reply.request_id, Some(1));
        let offer = reply.offer.unwrap();
        assert_eq!(offer.kind, "offer");
        let peer_id = reply.session_id.unwrap();

        let early_candidate = serde_json::json!({
            "requestId": 2,
            "type": "ice-candidate",
            "sessionId": peer_id,
            "candidate": {
                "candidate": "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            },
        });
        let reply = dispatch(&engine, &viewer, &outbox, &early_candidate.to_string()).await;
        assert!(reply.success);

        let close = serde_json::json!({ "requestId": 3, "type": "close-session", "sessionId": peer_id });
        let reply = dispatch(&engine, &viewer, &outbox, &close.to_string()).await;
        assert!(reply.success);
        assert_eq!(engine.peers().peer_count(), 0);

        let mut saw_closed = false;
        while let Ok(event) = rx.try_recv() {
            if let SignalingEvent::PeerState { state, .. } = event {
                saw_closed |= state == PeerState::Closed;
            }
        }
        assert!(saw_closed);

        let reply = dispatch(&engine, &viewer, &outbox, &close.to_string()).await;
        assert!(!reply.success);
        assert_eq!(reply.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_viewer_cannot_touch_another_viewers_peer() {
        let engine = engine();
        let game = engine.create(source(), None).unwrap().id;
        let owner = ViewerId::generate();
        let intruder = ViewerId::generate();
        let (outbox, _rx) = mpsc::unbounded_channel();

        let request = serde_json::json!({
            "requestId": 1,
            "type": "create-session",
            "gameSessionId": game,
        });
        let reply = dispatch(&engine, &owner, &outbox, &request.to_string()).await;
        assert!(reply.success, "{:?}", reply.error);
        let peer_id = reply.session_id.unwrap();

        let close = serde_json::json!({ "requestId": 2, "type": "close-session", "sessionId": peer_id });
        let reply = dispatch(&engine, &intruder, &outbox, &close.to_string()).await;
        assert!(!reply.success);
        assert_eq!(reply.request_id, Some(2));
        assert_eq!(reply.error.unwrap().kind, ErrorKind::NotFound);

        let candidate = serde_json::json!({
            "requestId": 3,
            "type": "ice-candidate",
            "sessionId": peer_id,
            "candidate": { "candidate": "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host" },
        });
        let reply = dispatch(&engine, &intruder, &outbox, &candidate.to_string()).await;
        assert_eq!(reply.error.unwrap().kind, ErrorKind::NotFound);

        let answer = serde_json::json!({
            "requestId": 4,
            "type": "answer",
            "sessionId": peer_id,
            "answer": { "type": "answer", "sdp": "v=0" },
        });
        let reply = dispatch(&engine, &intruder, &outbox, &answer.to_string()).await;
        assert_eq!(reply.error.unwrap().kind, ErrorKind::NotFound);

        assert_eq!(engine.peers().state(&peer_id), Some(PeerState::AwaitingAnswer));

        let reply = dispatch(&engine, &owner, &outbox, &close.to_string()).await;
        assert!(reply.success);
        assert_eq!(engine.peers().peer_count(), 0);
    }
}
