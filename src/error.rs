use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// All failure modes of the live simulator.
#[derive(Debug, Error)]
pub enum SimError {
    /// The URL carried contradictory or malformed simulation options.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested resource is not yet available on the live timeline.
    /// Carries the exact wait until it becomes available.
    #[error("{remaining_ms}ms too early")]
    TooEarly { remaining_ms: u64 },

    /// Unknown asset, unmatched segment path, or expired segment.
    #[error("not found: {0}")]
    NotFound(String),

    /// The VoD input cannot be converted (bad manifest metadata, malformed
    /// mp4 boxes, serialization failure).
    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Unexpected(String),
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;

impl SimError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SimError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            SimError::TooEarly { .. } => StatusCode::TOO_EARLY,
            SimError::NotFound(_) => StatusCode::NOT_FOUND,
            SimError::Conversion(_) | SimError::Storage(_) | SimError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            SimError::InvalidConfiguration("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SimError::TooEarly { remaining_ms: 1 }.status_code(),
            StatusCode::TOO_EARLY
        );
        assert_eq!(
            SimError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SimError::Conversion("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn too_early_message_carries_the_wait() {
        let e = SimError::TooEarly { remaining_ms: 3000 };
        assert_eq!(e.to_string(), "3000ms too early");
    }

    #[test]
    fn io_not_found_maps_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e: SimError = io.into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
