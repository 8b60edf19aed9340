//! Error types for the authorization server.
//!
//! OAuth errors are answered with `400 {"error": "<code>"}` (RFC 6749 §5.2).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Unknown client or wrong client secret.
    #[error("Invalid client")]
    InvalidClient,

    /// `redirect_uri` missing or not the client's registered URI.
    #[error("Invalid redirect URI")]
    InvalidRedirectUri,

    /// `response_type` not declared by the client.
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Missing or malformed request parameter.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Code or refresh token unknown, expired, used, or bound to other values.
    #[error("Invalid grant")]
    InvalidGrant,

    /// `grant_type` not supported by this server.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The OAuth `error` code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidClient => "invalid_client",
            ServerError::InvalidRedirectUri => "invalid_redirect_uri",
            ServerError::UnsupportedResponseType(_) => "unsupported_response_type",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::InvalidGrant => "invalid_grant",
            ServerError::UnsupportedGrantType(_) => "unsupported_grant_type",
            ServerError::Config(_) | ServerError::Internal(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::Config(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// OAuth error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            error: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
