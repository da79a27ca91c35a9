use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Transport-level failure; transient ones have already been retried by the client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response other than 429. Never retried.
    #[error("Basecamp API error {status} for {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    /// An entity payload that could not be decoded into its expected shape.
    #[error("Invalid payload: {0}")]
    DataIntegrity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Http { status, url } => {
                error!("upstream error {} for {}", status, url);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Basecamp responded with {}", status),
                )
            }
            AppError::Network(e) => {
                error!("network error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Basecamp is unreachable".to_string(),
                )
            }
            AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Sync cancelled".to_string(),
            ),
            other @ (AppError::Migration(_)
            | AppError::DataIntegrity(_)
            | AppError::Config(_)) => {
                error!("internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
