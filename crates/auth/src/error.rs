//! Error types for credential handling.

/// Errors produced while wrapping or resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unsupported credential kind: {0}")]
    UnsupportedCredentialKind(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("could not find a valid token")]
    NoValidToken,

    #[error("token provider error: {0}")]
    Provider(String),

    #[error("token callback error: {0}")]
    Callback(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token validation failed: {0}")]
    Validation(String),
}

impl AuthError {
    /// Returns `true` if the token itself was rejected or has expired.
    ///
    /// Only these failures trigger a provider refresh.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, AuthError::InvalidToken(_))
    }
}
