use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::BODY_PREVIEW_CHARS;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream status {status}; body preview: {preview}")]
    Status {
        status: reqwest::StatusCode,
        preview: String,
    },

    #[error("failed to decode status payload: {source}; body preview: {preview}")]
    Decode {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("no status sources configured")]
    NoSources,
}

impl FetchError {
    /// Transport failures, timeouts, 429 and 5xx are worth another attempt
    /// against the same source. Anything else moves on to the next source.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_builder() && !e.is_decode(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::Decode { .. } | Self::NoSources => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("roster upstream status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed roster csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read roster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed roster file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unknown shift filter: {0}")]
    UnknownShift(String),

    #[error("no snapshot available yet")]
    NoSnapshot,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownShift(_) => StatusCode::BAD_REQUEST,
            ApiError::NoSnapshot => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn body_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect()
}
