use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::tokens::DEFAULT_TOKEN_TYPE;
use super::{AuthError, TokenSet};

pub const DEFAULT_SCOPES: &[&str; 7] = &[
    "read:recovery",
    "read:cycles",
    "read:workout",
    "read:sleep",
    "read:profile",
    "read:body_measurement",
    "offline",
];

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

pub(crate) const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);
pub(crate) const USER_AGENT: &str = "whoop-sync/0.1.0";

/// Application registration with the provider.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(client_id: S, client_secret: S, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// Provider endpoints for authorization, token grants and revocation.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorization_url: Url,
    pub token_url: Url,
    pub revocation_url: Url,
}

impl OAuthEndpoints {
    pub fn whoop() -> Result<Self, AuthError> {
        Ok(Self {
            authorization_url: Url::parse("https://api.prod.whoop.com/oauth/oauth2/auth")?,
            token_url: Url::parse("https://api.prod.whoop.com/oauth/oauth2/token")?,
            revocation_url: Url::parse("https://api.prod.whoop.com/developer/v2/user/access")?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

/// Performs OAuth requests against the provider. Holds no token state.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(config, OAuthEndpoints::whoop()?)
    }

    pub fn with_endpoints(
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config,
            endpoints,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.endpoints.authorization_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &self.config.client_id);
            pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
            pairs.append_pair("response_type", "code");
            pairs.append_pair("scope", &self.config.scopes.join(" "));
            pairs.append_pair("state", state);
        }
        url
    }

    /// Exchange an authorization code for a fresh token set.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form[..])
            .send()
            .await?;

        let payload = Self::handle_token_response(response, Grant::AuthorizationCode).await?;
        payload.into_token_set(Grant::AuthorizationCode, Utc::now(), None)
    }

    /// Renew `existing` with its refresh token. A refresh token omitted by the
    /// provider is carried over from `existing`.
    pub async fn refresh(&self, existing: &TokenSet) -> Result<TokenSet, AuthError> {
        let refresh_token = existing
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NoRefreshToken)?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form[..])
            .send()
            .await?;

        let payload = Self::handle_token_response(response, Grant::RefreshToken).await?;
        payload.into_token_set(
            Grant::RefreshToken,
            Utc::now(),
            existing.refresh_token.clone(),
        )
    }

    /// Ask the provider to revoke access for `access_token`.
    pub async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .delete(self.endpoints.revocation_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Revocation { status, body });
        }
        Ok(())
    }

    async fn handle_token_response(
        response: reqwest::Response,
        grant: Grant,
    ) -> Result<TokenResponse, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(endpoint_error(grant, status, body));
        }
        Ok(response.json::<TokenResponse>().await?)
    }
}

fn endpoint_error(grant: Grant, status: StatusCode, body: String) -> AuthError {
    match grant {
        Grant::AuthorizationCode => AuthError::TokenExchange { status, body },
        Grant::RefreshToken => AuthError::TokenRefresh { status, body },
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_token_set(
        self,
        grant: Grant,
        received_at: DateTime<Utc>,
        fallback_refresh: Option<String>,
    ) -> Result<TokenSet, AuthError> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| received_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                endpoint_error(
                    grant,
                    StatusCode::OK,
                    format!("expires_in {expires_in} is out of range"),
                )
            })?;
        Ok(TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh),
            expires_at,
            token_type: self
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn endpoints(server: &MockServer) -> OAuthEndpoints {
        OAuthEndpoints {
            authorization_url: Url::parse("https://auth.example.com/oauth2/auth").unwrap(),
            token_url: Url::parse(&server.url("/oauth2/token")).unwrap(),
            revocation_url: Url::parse(&server.url("/v2/user/access")).unwrap(),
        }
    }

    fn client(server: &MockServer) -> OAuthClient {
        let config = OAuthConfig::new(
            "client-id",
            "client-secret",
            Url::parse("http://localhost:8501").unwrap(),
        );
        OAuthClient::with_endpoints(config, endpoints(server)).unwrap()
    }

    fn existing(refresh: Option<&str>) -> TokenSet {
        TokenSet::new(
            "old-access".into(),
            refresh.map(str::to_owned),
            Utc::now(),
            "Bearer".into(),
        )
    }

    #[test]
    fn authorization_url_carries_required_parameters() {
        let server = MockServer::start();
        let url = client(&server).authorization_url("state-123");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("client-id"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:8501/"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("state"), Some("state-123"));
        let scope = get("scope").unwrap();
        assert!(scope.split(' ').any(|s| s == "offline"));
        assert!(scope.split(' ').any(|s| s == "read:profile"));
    }

    #[tokio::test]
    async fn exchange_code_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=code123")
                .body_contains("client_secret=client-secret");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc123",
                "refresh_token": "refresh456",
                "token_type": "bearer",
                "expires_in": 3600
            }));
        });

        let before = Utc::now();
        let tokens = client(&server).exchange_code("code123").await.unwrap();
        let after = Utc::now();
        mock.assert();
        assert_eq!(tokens.access_token, "abc123");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh456"));
        assert_eq!(tokens.token_type, "bearer");
        assert!(tokens.expires_at >= before + Duration::seconds(3599));
        assert!(tokens.expires_at <= after + Duration::seconds(3601));
    }

    #[tokio::test]
    async fn exchange_defaults_lifetime_and_token_type() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200)
                .json_body_obj(&serde_json::json!({ "access_token": "only-access" }));
        });

        let before = Utc::now();
        let tokens = client(&server).exchange_code("code").await.unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.expires_at >= before + Duration::seconds(DEFAULT_EXPIRES_IN_SECS - 1));
    }

    #[tokio::test]
    async fn exchange_failure_carries_provider_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(400).body("{\"error\":\"invalid_grant\"}");
        });

        let err = client(&server).exchange_code("bad").await.unwrap_err();
        mock.assert();
        match err {
            AuthError::TokenExchange { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_range_lifetime_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 9_000_000_000_000_000i64
            }));
        });

        let client = client(&server);
        let err = client.exchange_code("code").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchange { .. }));

        let err = client
            .refresh(&existing(Some("refresh456")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRefresh { .. }));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token() {
        let server = MockServer::start();
        let err = client(&server).refresh(&existing(None)).await.unwrap_err();
        assert!(matches!(err, AuthError::NoRefreshToken));
    }

    #[tokio::test]
    async fn refresh_keeps_existing_refresh_token_when_not_returned() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("refresh_token=refresh456");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 7200
            }));
        });

        let tokens = client(&server)
            .refresh(&existing(Some("refresh456")))
            .await
            .unwrap();
        mock.assert();
        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh456"));
    }

    #[tokio::test]
    async fn refresh_replaces_rotated_refresh_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "rotated",
                "expires_in": 3600
            }));
        });

        let tokens = client(&server)
            .refresh(&existing(Some("refresh456")))
            .await
            .unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn refresh_failure_is_refresh_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(401).body("unauthorized");
        });

        let err = client(&server)
            .refresh(&existing(Some("refresh456")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::TokenRefresh { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[tokio::test]
    async fn revoke_sends_bearer_delete() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/v2/user/access")
                .header("authorization", "Bearer old-access");
            then.status(204);
        });

        client(&server).revoke("old-access").await.unwrap();
        mock.assert();
    }
}
