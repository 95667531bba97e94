//! Error types for the HTTP front.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docstore_core::StoreError;
use serde::Serialize;
use tracing::{error, warn};

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Wrong password")]
    InvalidPassword,

    #[error("Authentication required")]
    Unauthorized,

    #[error("No file uploaded")]
    NoFile,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Failed to read the database (remote and local)")]
    ReadFailed(#[source] StoreError),

    #[error("Document changed since it was read, reload and try again")]
    SaveConflict(#[source] StoreError),

    #[error("Failed to save to the remote store")]
    SaveFailed(#[source] StoreError),

    #[error("Upload failed: {0}")]
    Relay(String),
}

impl ApiError {
    /// Classify a failed write.
    pub fn from_save(err: StoreError) -> Self {
        if err.is_conflict() {
            ApiError::SaveConflict(err)
        } else {
            ApiError::SaveFailed(err)
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidPassword => (StatusCode::UNAUTHORIZED, "INVALID_PASSWORD"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "NO_FILE"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::ReadFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "READ_FAILED"),
            ApiError::SaveConflict(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SAVE_CONFLICT"),
            ApiError::SaveFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SAVE_FAILED"),
            ApiError::Relay(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RELAY_FAILED"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            status: &'static str,
            message: String,
            code: &'static str,
        }

        let (status, code) = self.status_and_code();

        match &self {
            ApiError::ReadFailed(source) | ApiError::SaveFailed(source) => {
                error!("{}: {}", self, source);
            }
            ApiError::SaveConflict(source) => warn!("{}: {}", self, source),
            ApiError::Relay(_) => error!("{}", self),
            _ => {}
        }

        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
            code,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_errors_are_classified() {
        let conflict = ApiError::from_save(StoreError::Conflict("sha mismatch".into()));
        assert_eq!(
            conflict.status_and_code(),
            (StatusCode::INTERNAL_SERVER_ERROR, "SAVE_CONFLICT")
        );

        let unavailable = ApiError::from_save(StoreError::RemoteUnavailable("timeout".into()));
        assert_eq!(
            unavailable.status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let auth = ApiError::from_save(StoreError::Auth("bad credentials".into()));
        assert_eq!(auth.status_and_code().1, "SAVE_FAILED");
    }
}
