//! Unified application error model and mapping helpers.
//! This module provides the common error enum used across the HTTP surface
//! and the authorization pipeline, along with the fixed HTTP status mapping.
//! Every kind carries a stable reason code returned verbatim to callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    MalformedCredential { message: String },
    Unauthenticated { message: String },
    ExpiredCredential { message: String },
    InvalidSignature { message: String },
    ResourceNotFound { message: String },
    Denied { message: String },
    Persistence { message: String },
    Upload { message: String },
    UserInput { message: String },
    Conflict { message: String },
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::MalformedCredential { .. } => "malformed_credential",
            AppError::Unauthenticated { .. } => "unauthenticated",
            AppError::ExpiredCredential { .. } => "expired_credential",
            AppError::InvalidSignature { .. } => "invalid_signature",
            AppError::ResourceNotFound { .. } => "resource_not_found",
            AppError::Denied { .. } => "denied",
            AppError::Persistence { .. } => "persistence_error",
            AppError::Upload { .. } => "upload_error",
            AppError::UserInput { .. } => "invalid_input",
            AppError::Conflict { .. } => "conflict",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MalformedCredential { message }
            | AppError::Unauthenticated { message }
            | AppError::ExpiredCredential { message }
            | AppError::InvalidSignature { message }
            | AppError::ResourceNotFound { message }
            | AppError::Denied { message }
            | AppError::Persistence { message }
            | AppError::Upload { message }
            | AppError::UserInput { message }
            | AppError::Conflict { message } => message.as_str(),
        }
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self { AppError::MalformedCredential { message: msg.into() } }
    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self { AppError::Unauthenticated { message: msg.into() } }
    pub fn expired<S: Into<String>>(msg: S) -> Self { AppError::ExpiredCredential { message: msg.into() } }
    pub fn invalid_signature<S: Into<String>>(msg: S) -> Self { AppError::InvalidSignature { message: msg.into() } }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::ResourceNotFound { message: msg.into() } }
    pub fn denied<S: Into<String>>(msg: S) -> Self { AppError::Denied { message: msg.into() } }
    pub fn persistence<S: Into<String>>(msg: S) -> Self { AppError::Persistence { message: msg.into() } }
    pub fn upload<S: Into<String>>(msg: S) -> Self { AppError::Upload { message: msg.into() } }
    pub fn user_input<S: Into<String>>(msg: S) -> Self { AppError::UserInput { message: msg.into() } }
    pub fn conflict<S: Into<String>>(msg: S) -> Self { AppError::Conflict { message: msg.into() } }

    /// Map to HTTP status code. The mapping is fixed: callers never override it.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::MalformedCredential { .. }
            | AppError::Unauthenticated { .. }
            | AppError::ExpiredCredential { .. }
            | AppError::InvalidSignature { .. } => 401,
            AppError::Denied { .. } => 403,
            AppError::ResourceNotFound { .. } => 404,
            AppError::Persistence { .. } => 502,
            AppError::Upload { .. } => 500,
            AppError::UserInput { .. } => 400,
            AppError::Conflict { .. } => 409,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Storage internals report through anyhow; surface the message verbatim.
        AppError::Persistence { message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.code_str(), "message": self.message() }));
        (status, body).into_response()
    }
}
