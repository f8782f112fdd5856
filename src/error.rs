use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::model::UnknownStatus;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

/// Failure body. Mirrors the `{ok: false, error}` shape every form action returns.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Machine-readable code carried next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Upload(_) => "upload_failed",
            Self::Database(_) => "database_error",
            Self::Storage(_) => "storage_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Faults of the infrastructure rather than of the caller's input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Upload(_) | Self::Database(_) | Self::Storage(_) | Self::Io(_) | Self::Internal(_)
        )
    }
}

impl From<UnknownStatus> for AppError {
    fn from(err: UnknownStatus) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hashing failed: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code().to_string();
        let (status, message) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Database(err) => match &err {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    (StatusCode::CONFLICT, "resource already exists".to_string())
                }
                _ => {
                    tracing::error!(error = %err, "database operation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database operation failed".to_string(),
                    )
                }
            },
            Self::Io(err) => {
                tracing::error!(error = %err, "i/o operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "i/o operation failed".to_string(),
                )
            }
            Self::Upload(msg) | Self::Storage(msg) | Self::Internal(msg) => {
                tracing::error!(code = %code, error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            ok: false,
            error: message,
            code,
        });

        (status, body).into_response()
    }
}
