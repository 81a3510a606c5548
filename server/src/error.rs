// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::registry::RegistryError;
use crate::share::ShareError;

/// Application error taxonomy.
///
/// Every handler returns `Result<_, AppError>`; the `IntoResponse` impl
/// below converts each variant into the JSON error envelope
/// `{ "error": "<message>" }` with the matching HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    Validation(String),

    /// Unknown id or identifier (404).
    #[error("{0}")]
    NotFound(String),

    /// Unique-constraint violation or duplicate link (400).
    #[error("{0}")]
    Conflict(String),

    /// The remote registry was unreachable or answered with a non-404
    /// error (500).
    #[error("{0}")]
    Upstream(String),

    /// A file-share operation failed (500).
    #[error("{0}")]
    Storage(String),

    /// A computed relative path tried to escape the share base (400).
    /// Raised before any share call is attempted.
    #[error("Invalid path")]
    PathTraversal,

    /// Anything unexpected, mostly database failures surfaced through
    /// `anyhow` from the store layer (500). The cause is logged at the
    /// conversion site; the envelope stays generic.
    #[error("An internal error occurred.")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) | Self::PathTraversal => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Converts an `anyhow::Error` coming from the store layer. A unique
/// constraint violation anywhere in the chain becomes a `Conflict` so
/// duplicate case numbers / customer codes answer 400 like any other
/// rejected write.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(sqlx::Error::Database(db_err)) = cause.downcast_ref::<sqlx::Error>() {
                if db_err.is_unique_violation() {
                    return Self::Conflict(db_err.message().to_string());
                }
            }
        }
        tracing::error!("Internal server error: {:?}", err);
        Self::Internal(err)
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<ShareError> for AppError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::Traversal => Self::PathTraversal,
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status();
        let message = self.to_string();
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            code.as_u16(),
            message
        );
        (code, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
