use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use habitat_shared::IssueError;
use habitat_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media not found: {0}")]
    MediaNotFound(Uuid),

    #[error("Image too large: {size} bytes (max {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Media storage error: {0}")]
    MediaStorage(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Issue(err) => match err {
                IssueError::IssueNotFound(_) => StatusCode::NOT_FOUND,
                IssueError::AlreadyConfirmed(_) | IssueError::AlreadyClosed(_) => {
                    StatusCode::CONFLICT
                }
                IssueError::NotConfirmed(_) => StatusCode::PRECONDITION_FAILED,
                IssueError::UploadFailure(_) => StatusCode::BAD_GATEWAY,
                IssueError::InvalidContent => StatusCode::BAD_REQUEST,
                IssueError::Forbidden(_) => StatusCode::FORBIDDEN,
            },
            ServerError::MediaNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Store(_) | ServerError::MediaStorage(_) | ServerError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Store(_) | ServerError::Blocking(_) => {
                tracing::error!(error = %self, "store failure");
                "Internal server error".to_string()
            }
            ServerError::MediaStorage(_) => {
                tracing::error!(error = %self, "media storage failure");
                "Media storage error".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
