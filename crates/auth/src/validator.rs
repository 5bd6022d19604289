//! Token liveness validation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;
use crate::source::AuthFuture;

/// Validation endpoint of the feed's identity service.
pub const DEFAULT_VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Information the identity service returns for a live token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Checks whether a token is still accepted.
///
/// Implementations return [`AuthError::InvalidToken`] when the token is
/// rejected, and any other error for transport or service failures.
pub trait TokenValidator: Send + Sync {
    fn validate<'a>(&'a self, token: &'a str) -> AuthFuture<'a, TokenInfo>;
}

/// Validates tokens against the identity service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenValidator {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenValidator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn request(&self, token: &str) -> Result<TokenInfo, AuthError> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {token}"))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidToken(
                "rejected by validation endpoint".into(),
            ));
        }
        if !status.is_success() {
            return Err(AuthError::Validation(format!("unexpected status {status}")));
        }

        let info: TokenInfo = resp.json().await?;
        debug!(
            client_id = %info.client_id,
            scopes = info.scopes.len(),
            expires_in = ?info.expires_in,
            "token validated"
        );
        Ok(info)
    }
}

impl Default for HttpTokenValidator {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATE_URL)
    }
}

impl TokenValidator for HttpTokenValidator {
    fn validate<'a>(&'a self, token: &'a str) -> AuthFuture<'a, TokenInfo> {
        Box::pin(self.request(token))
    }
}
