//! REST handlers for session control.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use retrocast_ipc::{InputPayload, SessionId, SessionSnapshot, StreamMode};

use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "sessions": state.engine.list().len(),
        "peers": state.engine.peers().peer_count(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub source: String,
    #[serde(default)]
    pub stream_mode: Option<StreamMode>,
}

pub async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let Json(body) = body?;
    let snapshot = state.engine.create(&body.source, body.stream_mode)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.engine.list())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<SessionSnapshot>> {
    state
        .engine
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.engine.start(&id).await?))
}

pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<StatusCode> {
    state.engine.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamModeBody {
    pub stream_mode: StreamMode,
}

pub async fn get_stream_mode(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<StreamModeBody>> {
    let stream_mode = state.engine.stream_mode(&id)?;
    Ok(Json(StreamModeBody { stream_mode }))
}

pub async fn set_stream_mode(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    body: Result<Json<StreamModeBody>, JsonRejection>,
) -> ApiResult<Json<StreamModeBody>> {
    let Json(body) = body?;
    state.engine.set_stream_mode(&id, body.stream_mode)?;
    Ok(Json(body))
}

pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    body: Result<Json<InputPayload>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(payload) = body?;
    if state.engine.get(&id).is_none() {
        return Err(not_found(&id));
    }

    let event = payload
        .into_event()
        .ok_or_else(|| ApiError::malformed("input needs a state or pressed field"))?;
    let outcome = state.engine.route_input(&id, &event);
    debug!(session_id = %id, button = %event.button, outcome = outcome.name(), "HTTP input");

    Ok(Json(json!({ "outcome": outcome.name() })))
}

fn not_found(id: &SessionId) -> ApiError {
    ApiError::new(
        retrocast_ipc::ErrorKind::NotFound,
        format!("Session not found: {id}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use retrocast_engine::Engine;
    use retrocast_ipc::EngineConfig;
    use tower::ServiceExt;

    use crate::build_router;

    fn app() -> Router {
        let config = EngineConfig {
            core_path: "/nonexistent/core.so".into(),
            ice_servers: Vec::new(),
            ..Default::default()
        };
        build_router(AppState::new(Engine::new(config).unwrap()))
    }

    fn source() -> String {
        format!("{}/Cargo.toml", env!("CARGO_MANIFEST_DIR"))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn test_missing_source_is_unprocessable() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "source": "/no/such/rom.gba" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "source_unavailable");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "rom": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "malformed_message");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = app();

        let (status, created) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "source": source(), "streamMode": "websocket" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"]["status"], "created");
        assert_eq!(created["streamMode"], "websocket");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, running) = call(&app, "POST", &format!("/api/sessions/{id}/start"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(running["state"]["status"], "running");

        let (status, body) = call(&app, "POST", &format!("/api/sessions/{id}/start"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_running");

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/sessions/{id}/stream-mode"),
            Some(json!({ "streamMode": "both" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["streamMode"], "both");

        let (_, body) = call(&app, "GET", &format!("/api/sessions/{id}/stream-mode"), None).await;
        assert_eq!(body["streamMode"], "both");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/input"),
            Some(json!({ "button": "start", "state": "down" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "delivered");

        let (_, list) = call(&app, "GET", "/api/sessions", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_session_stream_mode() {
        let app = app();
        let (status, body) = call(
            &app,
            "PUT",
            "/api/sessions/missing/stream-mode",
            Some(json!({ "streamMode": "webrtc" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }
}
