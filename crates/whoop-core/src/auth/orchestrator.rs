use chrono::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::utils::{random_state, verify_state};
use super::{AuthError, OAuthClient, TokenSet, TokenStore};

/// Remaining lifetime below which a token is renewed before being handed out.
pub const DEFAULT_REFRESH_WINDOW_MINUTES: i64 = 5;

/// A pending authorization attempt. `state` must be kept by the caller until the
/// redirect arrives and then discarded, whatever the outcome.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

/// Owns the application's token set and is the only writer of its persisted form.
pub struct AuthManager<S> {
    store: S,
    oauth: OAuthClient,
    tokens: Mutex<Option<TokenSet>>,
    refresh_window: Duration,
}

impl<S> AuthManager<S>
where
    S: TokenStore + Send + Sync,
{
    /// Create a manager seeded from whatever `store` currently holds.
    pub fn load(store: S, oauth: OAuthClient) -> Result<Self, AuthError> {
        let tokens = store.load()?;
        Ok(Self {
            store,
            oauth,
            tokens: Mutex::new(tokens),
            refresh_window: Duration::minutes(DEFAULT_REFRESH_WINDOW_MINUTES),
        })
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Snapshot of the current token set, if any.
    pub async fn current_tokens(&self) -> Option<TokenSet> {
        self.tokens.lock().await.clone()
    }

    /// Build the provider authorization URL with a fresh CSRF state. Does not touch stored tokens.
    pub fn begin_authorization(&self) -> AuthorizationRequest {
        let state = random_state();
        let url = self.oauth.authorization_url(&state);
        AuthorizationRequest { url, state }
    }

    /// Verify the returned state and exchange `code`, replacing any prior tokens.
    pub async fn complete_authorization(
        &self,
        code: &str,
        returned_state: &str,
        expected_state: &str,
    ) -> Result<TokenSet, AuthError> {
        verify_state(returned_state, expected_state)?;

        let fresh = self.oauth.exchange_code(code).await?;
        let mut guard = self.tokens.lock().await;
        self.store.save(&fresh)?;
        *guard = Some(fresh.clone());
        tracing::info!(expires_at = %fresh.expires_at, "authorization completed");
        Ok(fresh)
    }

    /// Renew the access token. On failure the current token set is left untouched.
    pub async fn refresh(&self) -> Result<TokenSet, AuthError> {
        let mut guard = self.tokens.lock().await;
        self.refresh_locked(&mut guard).await
    }

    /// Access token valid for at least the refresh window, renewing it first if needed.
    pub async fn valid_access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.tokens.lock().await;
        let needs_refresh = match guard.as_ref() {
            None => return Err(AuthError::NotAuthenticated),
            Some(tokens) => tokens.will_expire_within(self.refresh_window),
        };

        if needs_refresh {
            tracing::info!("access token expired or expiring soon; refreshing");
            let renewed = self.refresh_locked(&mut guard).await?;
            return Ok(renewed.access_token);
        }

        guard
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Liveness check: both an access and a refresh token are held. Says nothing about expiry.
    pub async fn is_authenticated(&self) -> bool {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(TokenSet::can_refresh)
            .unwrap_or(false)
    }

    /// Revoke at the provider on a best-effort basis, then always erase local tokens.
    pub async fn revoke(&self) -> Result<(), AuthError> {
        let mut guard = self.tokens.lock().await;
        if let Some(tokens) = guard.as_ref() {
            if let Err(err) = self.oauth.revoke(&tokens.access_token).await {
                tracing::warn!(error = %err, "token revocation failed; clearing local tokens anyway");
            }
        }
        *guard = None;
        self.store.clear()
    }

    async fn refresh_locked(&self, slot: &mut Option<TokenSet>) -> Result<TokenSet, AuthError> {
        let current = slot.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if !current.can_refresh() {
            return Err(AuthError::NoRefreshToken);
        }

        let renewed = self.oauth.refresh(current).await?;
        self.store.save(&renewed)?;
        *slot = Some(renewed.clone());
        tracing::debug!(expires_at = %renewed.expires_at, "access token refreshed");
        Ok(renewed)
    }
}
