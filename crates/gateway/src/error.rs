//! Error taxonomy for workspace operations and its HTTP mapping.
//!
//! Every variant carries enough context for the server log (operation, path,
//! underlying cause). Response bodies stay generic so that no filesystem
//! detail leaks to the caller.

use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{ErrorBody, ProtocolError};
use thiserror::Error;
use tracing::{error, warn};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while serving a workspace request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The target lies outside the workspace root, or the operation is refused.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The target does not exist or has the wrong kind.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The request itself is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeds the configured upload cap.
    #[error("upload exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: u64,
    },

    /// A filesystem operation failed.
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        /// Name of the failed operation.
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

impl GatewayError {
    /// Wrap an IO error with its operation and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        GatewayError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Like [`GatewayError::io`], but a missing path becomes `NotFound`.
    pub fn from_io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            GatewayError::NotFound(path)
        } else {
            GatewayError::Io { op, path, source }
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProtocolError> for GatewayError {
    fn from(err: ProtocolError) -> Self {
        GatewayError::BadRequest(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Workspace request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Workspace request rejected");
        }

        let message = match self {
            GatewayError::NotFound(_) => return (status, "Not found").into_response(),
            GatewayError::Unauthorized(_) => "Unauthorized".to_string(),
            GatewayError::Forbidden(_) => "Access denied".to_string(),
            GatewayError::BadRequest(message) => message,
            GatewayError::PayloadTooLarge { .. } => "Upload too large".to_string(),
            GatewayError::Io { .. } => "Internal server error".to_string(),
        };

        (status, Json(ErrorBody::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_from_io_maps_missing_to_not_found() {
        let err = GatewayError::from_io(
            "open",
            "/ws/missing.txt",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(err, GatewayError::NotFound(_)));

        let err = GatewayError::from_io(
            "open",
            "/ws/locked.txt",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, GatewayError::Io { op: "open", .. }));
    }

    #[test]
    fn test_io_display_includes_context() {
        let err = GatewayError::io("rename", "/ws/a.txt", io::Error::other("disk full"));
        assert_eq!(err.to_string(), "rename failed for /ws/a.txt: disk full");
    }

    #[test]
    fn test_protocol_error_is_bad_request() {
        let err: GatewayError = ProtocolError::MissingBoundary.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forbidden_body_does_not_echo_path() {
        let response = GatewayError::Forbidden("../../etc/passwd escapes root".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, r#"{"error":"Access denied"}"#);
    }

    #[tokio::test]
    async fn test_not_found_is_plain_text() {
        let response = GatewayError::NotFound(PathBuf::from("/ws/gone")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not found");
    }

    #[tokio::test]
    async fn test_io_body_is_generic() {
        let response =
            GatewayError::io("read", "/ws/secret", io::Error::other("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, r#"{"error":"Internal server error"}"#);
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let response = GatewayError::PayloadTooLarge { limit: 10 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_text(response).await, r#"{"error":"Upload too large"}"#);
    }
}
