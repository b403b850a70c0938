//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, ApiError>`; every error renders as
//! `{"error": message, "code": code}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::images::ImageError;
use crate::services::import::ImportError;

#[derive(Debug)]
pub enum ApiError {
    Import(ImportError),
    Image(ImageError),
    Database(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized,
}

impl ApiError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{} {} not found", kind, id))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Import(e) => match e {
                ImportError::Configuration => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
                ImportError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
                ImportError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
                ImportError::MissingTitle => (StatusCode::UNPROCESSABLE_ENTITY, "missing_title"),
                ImportError::Unauthorized => (StatusCode::BAD_GATEWAY, "upstream_unauthorized"),
                ImportError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                ImportError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
                ImportError::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
                ImportError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            ApiError::Image(e) => match e {
                ImageError::Decode(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "image_error"),
            },
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Import(e) => e.to_string(),
            ApiError::Image(e) => e.to_string(),
            ApiError::Database(e) => format!("Database error: {}", e),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Unauthorized => "Missing or invalid admin token".to_string(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        Self::Import(e)
    }
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Server error in API handler");
        } else {
            tracing::debug!(status = %status, error = %message, "Request failed");
        }

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
