//! Pub/sub media WebSocket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, trace, warn};

use retrocast_engine::Engine;
use retrocast_ipc::{SessionId, StreamEvent, ViewerMessage};
use retrocast_transport::{audio_event, frame_event, SinkItem, SinkKind};

use crate::error::ApiError;
use crate::AppState;

pub async fn stream_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Response {
    if state.engine.get(&id).is_none() {
        return ApiError::new(
            retrocast_ipc::ErrorKind::NotFound,
            format!("Session not found: {id}"),
        )
        .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine, id))
}

async fn handle_socket(mut socket: WebSocket, engine: Engine, session_id: SessionId) {
    let sink = match engine.subscribe_media(&session_id, SinkKind::PubSub) {
        Ok(sink) => sink,
        Err(e) => {
            debug!(session_id = %session_id, "Session gone before subscribing: {}", e);
            close(&mut socket, &session_id).await;
            return;
        }
    };
    info!(session_id = %session_id, sink = sink.id(), "Stream subscriber connected");

    loop {
        tokio::select! {
            item = sink.recv() => {
                let Some(item) = item else {
                    debug!(session_id = %session_id, "Session ended, closing stream");
                    close(&mut socket, &session_id).await;
                    break;
                };
                let Some(event) = encode(item).await else {
                    continue;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to serialize stream event: {}", e),
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_message(&engine, &session_id, &text),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    engine
        .broadcaster()
        .unregister_sink(&session_id, sink.id());
    info!(
        session_id = %session_id,
        dropped = sink.dropped(),
        "Stream subscriber disconnected"
    );
}

async fn close(socket: &mut WebSocket, session_id: &SessionId) {
    if let Err(e) = socket.send(Message::Close(None)).await {
        debug!(session_id = %session_id, "Failed to send close frame: {}", e);
    }
}

/// PNG encoding happens off the runtime threads.
async fn encode(item: SinkItem) -> Option<StreamEvent> {
    match item {
        SinkItem::Frame(frame) => {
            match tokio::task::spawn_blocking(move || frame_event(&frame)).await {
                Ok(Ok(event)) => Some(event),
                Ok(Err(e)) => {
                    warn!("Failed to encode frame: {}", e);
                    None
                }
                Err(e) => {
                    warn!("Frame encoder task failed: {}", e);
                    None
                }
            }
        }
        SinkItem::Audio(chunk) => Some(audio_event(&chunk)),
    }
}

fn handle_message(engine: &Engine, session_id: &SessionId, text: &str) {
    match serde_json::from_str::<ViewerMessage>(text) {
        Ok(ViewerMessage::Input(payload)) => match payload.into_event() {
            Some(event) => {
                let outcome = engine.route_input(session_id, &event);
                trace!(session_id = %session_id, outcome = outcome.name(), "Stream input");
            }
            None => debug!(session_id = %session_id, "Input without a state"),
        },
        Ok(ViewerMessage::Other) => {}
        Err(e) => debug!(session_id = %session_id, "Malformed stream message: {}", e),
    }
}
