//! HTTP and WebSocket surface for retrocast.
//!
//! A thin routing layer over [`Engine`]: REST control under
//! `/api/sessions`, pub/sub media under `/ws/sessions/:id/stream` and peer
//! signaling under `/ws/signaling`.

mod config;
mod error;
mod routes;
mod signaling;
mod stream;

pub use config::Args;
pub use error::ApiError;

use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retrocast_engine::Engine;

/// State shared with every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

/// Initialize logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "retrocast=debug,retrocast_server=debug,retrocast_engine=debug,retrocast_core=debug,retrocast_audio=debug,retrocast_encoder=debug,retrocast_transport=debug,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        // Sessions
        .route(
            "/api/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route(
            "/api/sessions/:id",
            get(routes::get_session).delete(routes::stop_session),
        )
        .route("/api/sessions/:id/start", post(routes::start_session))
        .route(
            "/api/sessions/:id/stream-mode",
            get(routes::get_stream_mode).put(routes::set_stream_mode),
        )
        .route("/api/sessions/:id/input", post(routes::send_input))
        // WebSockets
        .route("/ws/sessions/:id/stream", get(stream::stream_ws))
        .route("/ws/signaling", get(signaling::signaling_ws))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
