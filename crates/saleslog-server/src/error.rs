use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saleslog_shared::ErrorBody;
use thiserror::Error;

pub const SAVE_FAILED: &str = "Unable to save task";
pub const FETCH_FAILED: &str = "Failed to fetch tasks";
pub const UPDATE_FAILED: &str = "Failed to update task";
pub const NOTE_FAILED: &str = "Failed to update task note";
pub const STATUS_FAILED: &str = "Failed to update task status";

/// Every failure leaves the server as `{ "error": <message> }`.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Task not found")]
    NotFound,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound => StatusCode::NOT_FOUND,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
