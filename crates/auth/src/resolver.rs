//! Resolves credential sources to concrete bearer tokens.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::AuthError;
use crate::source::{AccessToken, AuthFuture, CredentialSource, ProviderCredential};
use crate::validator::{HttpTokenValidator, TokenValidator};

/// Turns a [`CredentialSource`] into the token sent with a subscription.
#[derive(Clone)]
pub struct TokenResolver {
    validator: Arc<dyn TokenValidator>,
}

impl TokenResolver {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    /// Resolves a source. `Ok(None)` means "send without a token".
    ///
    /// Provider tokens are validated before use. If the provider's current
    /// token is missing or rejected, a refresh is attempted once. When both
    /// fail, the most recent invalid-token failure is returned, or
    /// [`AuthError::NoValidToken`] if none was observed.
    pub async fn resolve(&self, source: &CredentialSource) -> Result<Option<String>, AuthError> {
        match source {
            CredentialSource::None => Ok(None),
            CredentialSource::Static(token) => Ok(Some(token.to_string())),
            CredentialSource::Callback(cb) => cb().await.map(Some),
            CredentialSource::Provider(cred) => self.resolve_provider(cred).await.map(Some),
        }
    }

    async fn resolve_provider(&self, cred: &ProviderCredential) -> Result<String, AuthError> {
        let mut last_invalid: Option<AuthError> = None;

        match self
            .fetch_validated(cred.provider.access_token(&cred.scopes))
            .await
        {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => debug!(scopes = ?cred.scopes, "provider has no token for scopes"),
            Err(e) if e.is_invalid_token() => last_invalid = Some(e),
            Err(e) => error!(error = %e, "retrieving an access token failed"),
        }

        warn!("no valid token available, trying to refresh");

        if let Some(refresh) = cred.provider.refresh() {
            match self.fetch_validated(refresh).await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => debug!("provider refresh returned no token"),
                Err(e) if e.is_invalid_token() => last_invalid = Some(e),
                Err(e) => error!(error = %e, "refreshing the access token failed"),
            }
        }

        Err(last_invalid.unwrap_or(AuthError::NoValidToken))
    }

    async fn fetch_validated(
        &self,
        fetch: AuthFuture<'_, Option<AccessToken>>,
    ) -> Result<Option<String>, AuthError> {
        let Some(token) = fetch.await? else {
            return Ok(None);
        };
        self.validator.validate(&token.access_token).await?;
        Ok(Some(token.access_token))
    }
}

impl Default for TokenResolver {
    fn default() -> Self {
        Self::new(Arc::new(HttpTokenValidator::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::source::{CredentialInput, TokenProvider};
    use crate::validator::TokenInfo;

    /// Accepts every token except the listed ones.
    struct DenyList(HashSet<&'static str>);

    impl TokenValidator for DenyList {
        fn validate<'a>(&'a self, token: &'a str) -> AuthFuture<'a, TokenInfo> {
            Box::pin(async move {
                if self.0.contains(token) {
                    return Err(AuthError::InvalidToken(format!("{token} expired")));
                }
                Ok(TokenInfo {
                    client_id: "cid".into(),
                    login: None,
                    user_id: None,
                    scopes: vec![],
                    expires_in: None,
                })
            })
        }
    }

    fn resolver(denied: &[&'static str]) -> TokenResolver {
        TokenResolver::new(Arc::new(DenyList(denied.iter().copied().collect())))
    }

    /// Outcome of a scripted provider call.
    #[derive(Clone)]
    enum Step {
        Token(&'static str),
        Nothing,
        Invalid,
        Network,
    }

    impl Step {
        fn run(&self) -> Result<Option<AccessToken>, AuthError> {
            match self {
                Step::Token(t) => Ok(Some(AccessToken::new(*t))),
                Step::Nothing => Ok(None),
                Step::Invalid => Err(AuthError::InvalidToken("provider says expired".into())),
                Step::Network => Err(AuthError::Provider("connection reset".into())),
            }
        }
    }

    struct ScriptedProvider {
        current: Step,
        refresh: Option<Step>,
        seen_scopes: Mutex<Vec<String>>,
        refreshes: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(current: Step, refresh: Option<Step>) -> Arc<Self> {
            Arc::new(Self {
                current,
                refresh,
                seen_scopes: Mutex::new(Vec::new()),
                refreshes: AtomicUsize::new(0),
            })
        }
    }

    impl TokenProvider for ScriptedProvider {
        fn access_token<'a>(
            &'a self,
            scopes: &'a [String],
        ) -> AuthFuture<'a, Option<AccessToken>> {
            self.seen_scopes.lock().unwrap().extend_from_slice(scopes);
            let result = self.current.run();
            Box::pin(async move { result })
        }

        fn refresh(&self) -> Option<AuthFuture<'_, Option<AccessToken>>> {
            let step = self.refresh.clone()?;
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let result = step.run();
            Some(Box::pin(async move { result }))
        }
    }

    fn provider_source(provider: Arc<ScriptedProvider>, scope: Option<&str>) -> CredentialSource {
        let provider: Arc<dyn TokenProvider> = provider;
        CredentialSource::wrap(provider, scope).unwrap()
    }

    #[tokio::test]
    async fn none_resolves_to_absent() {
        let token = resolver(&[]).resolve(&CredentialSource::None).await.unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn static_always_resolves_unvalidated() {
        let source = CredentialSource::wrap("abc", None).unwrap();
        let token = resolver(&["abc"]).resolve(&source).await.unwrap();
        assert_eq!(token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn sync_and_async_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let source = CredentialSource::wrap(
            CredentialInput::callback(move || {
                c.fetch_add(1, Ordering::SeqCst);
                "from-callback".to_string()
            }),
            None,
        )
        .unwrap();

        let r = resolver(&[]);
        assert_eq!(r.resolve(&source).await.unwrap().as_deref(), Some("from-callback"));
        assert_eq!(r.resolve(&source).await.unwrap().as_deref(), Some("from-callback"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let deferred = CredentialSource::wrap(
            CredentialInput::callback_async(|| async {
                tokio::task::yield_now().await;
                Ok("deferred".to_string())
            }),
            None,
        )
        .unwrap();
        assert_eq!(r.resolve(&deferred).await.unwrap().as_deref(), Some("deferred"));
    }

    #[tokio::test]
    async fn failing_callback_propagates() {
        let source = CredentialSource::wrap(
            CredentialInput::callback_async(|| async {
                Err(AuthError::Callback("vault locked".into()))
            }),
            None,
        )
        .unwrap();
        let err = resolver(&[]).resolve(&source).await.unwrap_err();
        assert!(matches!(err, AuthError::Callback(_)));
    }

    #[tokio::test]
    async fn provider_valid_token_skips_refresh() {
        let provider = ScriptedProvider::new(Step::Token("good"), Some(Step::Token("fresh")));
        let source = provider_source(provider.clone(), Some("chat:read"));

        let token = resolver(&[]).resolve(&source).await.unwrap();
        assert_eq!(token.as_deref(), Some("good"));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(*provider.seen_scopes.lock().unwrap(), vec!["chat:read"]);
    }

    #[tokio::test]
    async fn provider_rejected_token_is_refreshed() {
        let provider = ScriptedProvider::new(Step::Token("stale"), Some(Step::Token("fresh")));
        let source = provider_source(provider.clone(), None);

        let token = resolver(&["stale"]).resolve(&source).await.unwrap();
        assert_eq!(token.as_deref(), Some("fresh"));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_without_token_is_refreshed() {
        let provider = ScriptedProvider::new(Step::Nothing, Some(Step::Token("fresh")));
        let token = resolver(&[])
            .resolve(&provider_source(provider, None))
            .await
            .unwrap();
        assert_eq!(token.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn provider_both_invalid_surfaces_latest_invalid_token() {
        let provider = ScriptedProvider::new(Step::Token("stale"), Some(Step::Token("also-stale")));
        let err = resolver(&["stale", "also-stale"])
            .resolve(&provider_source(provider, None))
            .await
            .unwrap_err();
        match err {
            AuthError::InvalidToken(msg) => assert!(msg.contains("also-stale")),
            other => panic!("expected invalid token, got {other}"),
        }
    }

    #[tokio::test]
    async fn provider_invalid_then_network_keeps_invalid_failure() {
        let provider = ScriptedProvider::new(Step::Invalid, Some(Step::Network));
        let err = resolver(&[])
            .resolve(&provider_source(provider, None))
            .await
            .unwrap_err();
        assert!(err.is_invalid_token());
    }

    #[tokio::test]
    async fn provider_network_failures_only_give_no_valid_token() {
        let provider = ScriptedProvider::new(Step::Network, Some(Step::Network));
        let err = resolver(&[])
            .resolve(&provider_source(provider, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoValidToken));
    }

    #[tokio::test]
    async fn provider_without_refresh_support() {
        let provider = ScriptedProvider::new(Step::Token("stale"), None);
        let err = resolver(&["stale"])
            .resolve(&provider_source(provider.clone(), None))
            .await
            .unwrap_err();
        assert!(err.is_invalid_token());
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }
}
