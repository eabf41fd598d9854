use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by authentication and token management routines.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("authorization state mismatch; restart authorization")]
    StateMismatch,
    #[error("token exchange rejected ({status}): {body}")]
    TokenExchange { status: StatusCode, body: String },
    #[error("token refresh rejected ({status}): {body}; please re-authenticate")]
    TokenRefresh { status: StatusCode, body: String },
    #[error("token revocation rejected ({status}): {body}")]
    Revocation { status: StatusCode, body: String },
    #[error("no refresh token available; please re-authenticate")]
    NoRefreshToken,
    #[error("not authenticated; please authorize first")]
    NotAuthenticated,
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("authorization response missing code parameter")]
    MissingAuthorizationCode,
    #[error("invalid authorization response: {0}")]
    InvalidAuthorizationResponse(String),
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
    #[error("authorization flow cancelled")]
    Cancelled,
}

impl AuthError {
    /// Whether recovering from this error requires the user to authorize again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::StateMismatch
                | AuthError::TokenExchange { .. }
                | AuthError::TokenRefresh { .. }
                | AuthError::NoRefreshToken
                | AuthError::NotAuthenticated
        )
    }
}
