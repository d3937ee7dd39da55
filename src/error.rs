//! Error types and JSON error responses for the control surface

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure writing the gateway configuration document
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error codes for control surface errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminErrorCode {
    /// Missing or wrong credentials
    Unauthorized,
    /// Request body is not valid JSON
    InvalidJson,
    /// Request body is JSON but not an acceptable document
    InvalidPayload,
    /// Unknown route
    NotFound,
    /// Internal error (e.g. the config file could not be written)
    InternalError,
}

impl AdminErrorCode {
    /// Get the default HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminErrorCode::InvalidJson => StatusCode::BAD_REQUEST,
            AdminErrorCode::InvalidPayload => StatusCode::BAD_REQUEST,
            AdminErrorCode::NotFound => StatusCode::NOT_FOUND,
            AdminErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminErrorCode::Unauthorized => "UNAUTHORIZED",
            AdminErrorCode::InvalidJson => "INVALID_JSON",
            AdminErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            AdminErrorCode::NotFound => "NOT_FOUND",
            AdminErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// The error code
    pub code: AdminErrorCode,
    /// Human-readable error message
    pub error: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(code: AdminErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","error":"{}","status":{}}}"#,
                self.code.as_str(),
                self.error.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response
pub fn json_error(code: AdminErrorCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let body = ErrorResponse::new(code, message).to_json();

    let mut builder = Response::builder()
        .status(code.status_code())
        .header(CONTENT_TYPE, "application/json");
    if code == AdminErrorCode::Unauthorized {
        builder = builder.header(WWW_AUTHENTICATE, r#"Basic realm="picoclaw""#);
    }

    builder
        .body(Full::new(Bytes::from(body)))
        .expect("valid response with StatusCode enum and static headers")
}
