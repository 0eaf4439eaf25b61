use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Errors raised while loading or selecting signing keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("No active signing key")]
    NoActiveKey,
    #[error("Signing keys have not been loaded")]
    NotLoaded,
    #[error("More than one signing key is marked active ({0} and {1})")]
    MultipleActiveKeys(String, String),
    #[error("Private key parse failed (kid={kid}): {reason}")]
    InvalidPrivateKey { kid: String, reason: String },
    #[error("Public key parse failed (kid={kid}): {reason}")]
    InvalidPublicKey { kid: String, reason: String },
    #[error("Key mismatch for kid={0}")]
    Mismatch(String),
    #[error("Key storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

/// Protocol-level failures of the authorization and token endpoints.
///
/// Each variant maps onto an OAuth2 error code and HTTP status in
/// [`OAuthError::status_code`] and [`OAuthError::error_code`].
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid client: {0}")]
    InvalidClient(String),
    #[error("Invalid or expired authorization code")]
    InvalidOrExpiredCode,
    #[error("Authorization code was issued to another client")]
    ClientMismatch,
    #[error("PKCE verification failed")]
    PkceFailed,
    #[error("Invalid refresh token")]
    RefreshRejected,
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    #[error("Signing unavailable: {0}")]
    SigningUnavailable(#[from] KeyError),
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("User lookup failed for {0}")]
    UserLookupFailed(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Random generator failure: {0}")]
    Entropy(#[from] getrandom::Error),
    #[error("Operation timed out")]
    Timeout,
}

impl OAuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidRequest(_)
            | OAuthError::InvalidClient(_)
            | OAuthError::InvalidOrExpiredCode
            | OAuthError::ClientMismatch
            | OAuthError::PkceFailed
            | OAuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            OAuthError::RefreshRejected => StatusCode::UNAUTHORIZED,
            OAuthError::SigningUnavailable(_)
            | OAuthError::Signing(_)
            | OAuthError::UserLookupFailed(_)
            | OAuthError::Database(_)
            | OAuthError::Entropy(_)
            | OAuthError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The OAuth2 `error` value (RFC 6749 section 5.2).
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidOrExpiredCode
            | OAuthError::ClientMismatch
            | OAuthError::PkceFailed
            | OAuthError::RefreshRejected => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            _ => "server_error",
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Client-facing description. Server-side failures never expose details.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidRequest(reason) | OAuthError::InvalidClient(reason) => {
                Some(reason.clone())
            }
            OAuthError::InvalidOrExpiredCode => Some("invalid code".to_string()),
            OAuthError::ClientMismatch => Some("client mismatch".to_string()),
            OAuthError::PkceFailed => Some("pkce verification failed".to_string()),
            OAuthError::RefreshRejected => Some("invalid refresh token".to_string()),
            OAuthError::UnsupportedGrantType(_) => Some("unsupported grant type".to_string()),
            _ => None,
        }
    }
}

/// JSON error body returned by every OAuth2 endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl From<&OAuthError> for ErrorResponse {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: err.description(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            tracing::error!(error = %self, "OAuth2 request failed");
        } else {
            tracing::debug!(error = %self, "OAuth2 request rejected");
        }
        (self.status_code(), Json(ErrorResponse::from(&self))).into_response()
    }
}
