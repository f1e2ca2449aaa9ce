use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use zkb_core::types::ErrorBody;

use crate::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reading proof store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("proof store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("writing proof store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("encoding proof store: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Every non-2xx answer of the API. Rendered as `{ "error": "..." }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("not found")]
    NotFound,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            ApiError::Store(e) => {
                tracing::error!(error = %e, "proof store failure");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
