//! Structured errors for the admin routes.
//!
//! The request path never surfaces errors to clients (a failed lookup is a
//! miss), so only the `/_prerender` routes answer with these.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use prerender_client::UrlError;

/// Errors returned by the admin routes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The given URL cannot be canonicalized.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// The cache backend failed.
    #[error(transparent)]
    Cache(#[from] prerender_core::Error),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::InvalidUrl(_) => "INVALID_URL",
            ApiError::Cache(e) => e.code(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::Cache(prerender_core::Error::InvalidInput(_) | prerender_core::Error::InvalidUrl(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), "admin request failed: {self}");
        }

        let message = match &self {
            ApiError::InvalidInput(msg) => msg.clone(),
            ApiError::InvalidUrl(e) => e.to_string(),
            ApiError::Cache(e) => e.to_string(),
        };
        (status, Json(ApiErrorBody { code: self.code(), message })).into_response()
    }
}
