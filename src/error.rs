//! Error types for store operations and HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// The store refused to create the index.
    #[error("index creation failed: {0}")]
    IndexCreation(String),

    /// The store rejected a document write.
    #[error("write rejected: {0}")]
    Write(String),

    /// The store rejected or failed a search.
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreation(msg.into())
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }
}

/// Per-request failures, rendered as an HTTP status with a plain-text message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client sent a body or parameters that could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::MalformedPayload("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::unavailable("down")).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StoreError::write("rejected")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(StoreError::query("bad query")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
