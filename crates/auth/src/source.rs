//! Credential sources and the provider seam.
//!
//! A [`CredentialSource`] is immutable once built. Grouping during resend
//! compares sources by identity ([`CredentialSource::identity`]), not by
//! value: two sources built from equal strings or from the same provider in
//! separate `wrap` calls are distinct.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::AuthError;

/// Boxed future returned by provider, callback and validator methods.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + Send + 'a>>;

/// Callback producing a token on demand.
pub type TokenCallback = Arc<dyn Fn() -> AuthFuture<'static, String> + Send + Sync>;

/// A bearer token handed out by a [`TokenProvider`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// External capability that hands out (and optionally refreshes) tokens.
///
/// Implemented by the application on top of whatever token storage it uses.
pub trait TokenProvider: Send + Sync {
    /// Returns a token carrying the given scopes, or `None` if the provider
    /// has nothing for them.
    fn access_token<'a>(&'a self, scopes: &'a [String]) -> AuthFuture<'a, Option<AccessToken>>;

    /// Obtains a fresh token. `None` means the provider cannot refresh.
    fn refresh(&self) -> Option<AuthFuture<'_, Option<AccessToken>>> {
        None
    }
}

/// A provider together with the scopes requested from it.
pub struct ProviderCredential {
    pub provider: Arc<dyn TokenProvider>,
    pub scopes: Vec<String>,
}

/// Identity of a credential source, used to resolve each distinct source
/// only once when resending subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(usize);

/// Normalized representation of how to obtain a token for a topic.
#[derive(Clone)]
pub enum CredentialSource {
    /// No token; requests carry no `auth_token`.
    None,
    /// A fixed token.
    Static(Arc<str>),
    /// A callback invoked on every resolution.
    Callback(TokenCallback),
    /// A provider with refresh support.
    Provider(Arc<ProviderCredential>),
}

impl CredentialSource {
    /// Normalizes a caller-supplied credential.
    ///
    /// `scope` is only used for providers and becomes the single requested
    /// scope. Fails with [`AuthError::UnsupportedCredentialKind`] for JSON
    /// inputs that are neither `null` nor a string.
    pub fn wrap(input: impl Into<CredentialInput>, scope: Option<&str>) -> Result<Self, AuthError> {
        match input.into() {
            CredentialInput::None => Ok(CredentialSource::None),
            CredentialInput::Token(token) => Ok(CredentialSource::Static(token.into())),
            CredentialInput::Callback(cb) => Ok(CredentialSource::Callback(cb)),
            CredentialInput::Provider(provider) => {
                Ok(CredentialSource::Provider(Arc::new(ProviderCredential {
                    provider,
                    scopes: scope.map(|s| vec![s.to_string()]).unwrap_or_default(),
                })))
            }
            CredentialInput::Source(source) => Ok(source),
            CredentialInput::Json(value) => match value {
                serde_json::Value::Null => Ok(CredentialSource::None),
                serde_json::Value::String(token) => Ok(CredentialSource::Static(token.into())),
                other => Err(AuthError::UnsupportedCredentialKind(
                    json_kind(&other).to_string(),
                )),
            },
        }
    }

    /// Identity of the underlying allocation. All `None` sources share one.
    pub fn identity(&self) -> SourceId {
        let ptr = match self {
            CredentialSource::None => 0,
            CredentialSource::Static(token) => Arc::as_ptr(token) as *const u8 as usize,
            CredentialSource::Callback(cb) => Arc::as_ptr(cb) as *const () as usize,
            CredentialSource::Provider(p) => Arc::as_ptr(p) as usize,
        };
        SourceId(ptr)
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSource::None => "none",
            CredentialSource::Static(_) => "static",
            CredentialSource::Callback(_) => "callback",
            CredentialSource::Provider(_) => "provider",
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Provider(p) => f
                .debug_struct("Provider")
                .field("scopes", &p.scopes)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Anything a caller may pass as a credential to `listen`.
pub enum CredentialInput {
    None,
    Token(String),
    Callback(TokenCallback),
    Provider(Arc<dyn TokenProvider>),
    /// An already-wrapped source; its identity is preserved.
    Source(CredentialSource),
    /// A dynamically shaped value, e.g. read from a config file.
    Json(serde_json::Value),
}

impl CredentialInput {
    /// Wraps a synchronous callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        CredentialInput::Callback(Arc::new(move || -> AuthFuture<'static, String> {
            let token = f();
            Box::pin(async move { Ok::<_, AuthError>(token) })
        }))
    }

    /// Wraps a deferred callback.
    pub fn callback_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, AuthError>> + Send + 'static,
    {
        CredentialInput::Callback(Arc::new(move || -> AuthFuture<'static, String> {
            Box::pin(f())
        }))
    }
}

impl From<()> for CredentialInput {
    fn from(_: ()) -> Self {
        CredentialInput::None
    }
}

impl From<&str> for CredentialInput {
    fn from(token: &str) -> Self {
        CredentialInput::Token(token.to_string())
    }
}

impl From<String> for CredentialInput {
    fn from(token: String) -> Self {
        CredentialInput::Token(token)
    }
}

impl From<Option<String>> for CredentialInput {
    fn from(token: Option<String>) -> Self {
        match token {
            Some(token) => CredentialInput::Token(token),
            None => CredentialInput::None,
        }
    }
}

impl From<CredentialSource> for CredentialInput {
    fn from(source: CredentialSource) -> Self {
        CredentialInput::Source(source)
    }
}

impl From<Arc<dyn TokenProvider>> for CredentialInput {
    fn from(provider: Arc<dyn TokenProvider>) -> Self {
        CredentialInput::Provider(provider)
    }
}

impl From<serde_json::Value> for CredentialInput {
    fn from(value: serde_json::Value) -> Self {
        CredentialInput::Json(value)
    }
}
