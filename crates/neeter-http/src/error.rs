//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use neeter_core::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::AlreadySubscribed(_))
            | ApiError::Session(SessionError::Closed(_)) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::Factory(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
