//! Credential handling for topic subscriptions.
//!
//! Normalizes the ways a caller can supply a bearer token (nothing, a
//! static string, a callback, or a refreshable provider) into a single
//! [`CredentialSource`], and resolves any of them to a concrete token.

pub mod error;
pub mod resolver;
pub mod source;
pub mod validator;

pub use error::AuthError;
pub use resolver::TokenResolver;
pub use source::{
    AccessToken, AuthFuture, CredentialInput, CredentialSource, ProviderCredential, SourceId,
    TokenCallback, TokenProvider,
};
pub use validator::{DEFAULT_VALIDATE_URL, HttpTokenValidator, TokenInfo, TokenValidator};
