use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::ConvertError;

/// Relay failure, always rendered as `{ "success": false, "error": ... }`
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Input the relay refuses without calling upstream
    #[error("{0}")]
    BadRequest(String),

    /// Failure raised by the conversion backend
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Upstream answered the download proxy with a failure
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Convert(ConvertError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            RelayError::Convert(ConvertError::Cancelled) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Convert(_) | RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Relay request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Relay request rejected");
        }

        let message = match &self {
            RelayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
