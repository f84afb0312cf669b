use crate::error::StageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error body returned by every failing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A classified staging error on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub StageError);

impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StageError::NotStaged { .. }
            | StageError::TagKeyNotStaged { .. }
            | StageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StageError::InvalidService(_)
            | StageError::InvalidScope(_)
            | StageError::InvalidName { .. }
            | StageError::InvalidOperation(_)
            | StageError::InvalidDeleteOptions(_) => StatusCode::BAD_REQUEST,
            StageError::Conflict { .. }
            | StageError::AlreadyExists { .. }
            | StageError::DrainCollision { .. } => StatusCode::CONFLICT,
            StageError::DecryptionFailed | StageError::PassphraseRequired => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            StageError::RemoteOperationFailed(_) => StatusCode::BAD_GATEWAY,
            StageError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            StageError::CorruptState(_)
            | StageError::Encryption(_)
            | StageError::Io(_)
            | StageError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
