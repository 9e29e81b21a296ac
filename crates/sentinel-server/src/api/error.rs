//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sentinel_core::{ConfigReloadRejected, LinkError};
use serde_json::json;
use thiserror::Error;

use crate::state::CoordinatorUnavailable;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unavailable(#[from] CoordinatorUnavailable),

    #[error("{0}")]
    BadRequest(String),

    /// Valid request the current mission state refuses
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Reload(#[from] ConfigReloadRejected),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable(_) | ApiError::Link(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Reload(ConfigReloadRejected::InvalidGeometry(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Reload(
                ConfigReloadRejected::UnsafeState { .. } | ConfigReloadRejected::DuplicateZone { .. },
            ) => StatusCode::CONFLICT,
            ApiError::Reload(ConfigReloadRejected::UnknownZone { .. }) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
