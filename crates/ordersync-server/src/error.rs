use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ordersync_core::ReconcileError;

/// Carries an explicit 400 through the `anyhow::Error` chain.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct BadRequest(String);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct NotFound(String);

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequest(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFound(msg.into()).into())
    }
}

fn status_for(err: &ReconcileError) -> StatusCode {
    match err {
        ReconcileError::SourceUnavailable { .. } | ReconcileError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ReconcileError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        ReconcileError::NotConfigured(_)
        | ReconcileError::InvalidConfig(_)
        | ReconcileError::Io(_)
        | ReconcileError::Yaml(_)
        | ReconcileError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequest>().is_some() {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<NotFound>().is_some() {
            StatusCode::NOT_FOUND
        } else if let Some(e) = self.0.downcast_ref::<ReconcileError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
