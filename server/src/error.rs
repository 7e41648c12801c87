//! API error rendering.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use retrocast_engine::EngineError;
use retrocast_ipc::{ErrorBody, ErrorKind};
use retrocast_transport::TransportError;

/// An error rendered as `{kind, message}` with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub ErrorBody);

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self(ErrorBody::new(kind, message))
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedMessage, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyRunning => StatusCode::CONFLICT,
        ErrorKind::SourceUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::MalformedMessage | ErrorKind::NegotiationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::CoreLoadFailed
        | ErrorKind::GameLoadFailed
        | ErrorKind::TickFailure
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::malformed(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::SourceUnavailable),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::GameLoadFailed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(ErrorKind::MalformedMessage),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_engine_error_conversion() {
        let err = ApiError::from(EngineError::AlreadyRunning("abc".into()));
        assert_eq!(err.kind(), ErrorKind::AlreadyRunning);
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.0.message.contains("abc"));
    }
}
