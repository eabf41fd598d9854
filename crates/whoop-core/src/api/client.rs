use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::{AuthError, AuthManager, TokenStore, HTTP_TIMEOUT, USER_AGENT};

use super::models::{
    BodyMeasurement, DateRange, HealthData, RateLimitStatus, ResourceKind, UserProfile,
};
use super::page::Page;

const DEFAULT_BASE_URL: &str = "https://api.prod.whoop.com/developer";

/// Largest page the provider will serve.
pub const MAX_PAGE_SIZE: usize = 25;

/// Errors returned by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::HttpStatus { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Authenticated client for the WHOOP developer API.
pub struct ApiClient<S> {
    http: Client,
    base_url: String,
    auth: Arc<AuthManager<S>>,
    rate_limit: Mutex<RateLimitStatus>,
}

impl<S> ApiClient<S>
where
    S: TokenStore + Send + Sync,
{
    pub fn new(auth: Arc<AuthManager<S>>) -> ApiResult<Self> {
        Self::with_base_url(auth, DEFAULT_BASE_URL)
    }

    /// Build a client against a custom base URL (useful for testing).
    pub fn with_base_url(auth: Arc<AuthManager<S>>, base_url: &str) -> ApiResult<Self> {
        Url::parse(base_url)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth,
            rate_limit: Mutex::new(RateLimitStatus::default()),
        })
    }

    pub fn auth(&self) -> &AuthManager<S> {
        &self.auth
    }

    /// Rate-limit headers seen on the most recent response.
    pub async fn rate_limit(&self) -> RateLimitStatus {
        self.rate_limit.lock().await.clone()
    }

    /// Issue one authenticated GET. Non-2xx responses are errors; nothing is retried.
    pub async fn request(&self, endpoint: &str, query: &[(&str, String)]) -> ApiResult<Value> {
        let token = self.auth.valid_access_token().await?;
        let url = Url::parse(&format!("{}{}", self.base_url, endpoint))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let limits = RateLimitStatus::from_headers(response.headers());
        if limits.is_exhausted() {
            tracing::warn!(reset = ?limits.reset, "rate limit exhausted");
        }
        *self.rate_limit.lock().await = limits.clone();

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(endpoint, reset = ?limits.reset, "rate limited by provider");
            } else {
                tracing::warn!(endpoint, %status, %body, "request failed");
            }
            return Err(ApiError::HttpStatus { status, body });
        }

        Ok(response.json::<Value>().await?)
    }

    /// Follow continuation cursors until exhausted, returning records in arrival order.
    pub async fn paginate(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        page_size: usize,
    ) -> ApiResult<Vec<Value>> {
        let mut params: Vec<(&str, String)> = query
            .iter()
            .filter(|(key, _)| *key != "limit" && *key != "nextToken")
            .cloned()
            .collect();
        params.push(("limit", page_size.clamp(1, MAX_PAGE_SIZE).to_string()));

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut page_params = params.clone();
            if let Some(token) = &cursor {
                page_params.push(("nextToken", token.clone()));
            }

            let page = Page::decode(self.request(endpoint, &page_params).await?)?;
            records.extend(page.records);

            match page.next_token {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(ApiError::UnexpectedShape(format!(
                        "next_token {next:?} repeated"
                    )));
                }
                Some(next) => {
                    tracing::debug!(endpoint, fetched = records.len(), "continuing pagination");
                    cursor = Some(next);
                }
                None => break,
            }
        }
        Ok(records)
    }

    /// Every record of `kind` within `range`.
    pub async fn records(&self, kind: ResourceKind, range: &DateRange) -> ApiResult<Vec<Value>> {
        self.paginate(kind.path(), &range.query(), MAX_PAGE_SIZE)
            .await
    }

    /// Fetch all resource kinds for `range`. A kind that fails is logged and left
    /// empty; the others are still returned. Authentication failures abort the
    /// whole fetch.
    pub async fn all_health_data(&self, range: &DateRange) -> ApiResult<HealthData> {
        tracing::info!(start = %range.start(), end = %range.end(), "fetching health data");
        let mut data = HealthData::default();
        for kind in ResourceKind::ALL {
            match self.records(kind, range).await {
                Ok(records) => {
                    tracing::info!(%kind, count = records.len(), "retrieved records");
                    data.set(kind, records);
                }
                Err(err @ ApiError::Auth(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(%kind, error = %err, "failed to fetch records");
                    data.failures.push((kind, err.to_string()));
                }
            }
        }
        Ok(data)
    }

    pub async fn user_profile(&self) -> ApiResult<UserProfile> {
        self.get_typed("/v2/user/profile/basic").await
    }

    pub async fn body_measurements(&self) -> ApiResult<BodyMeasurement> {
        self.get_typed("/v2/user/measurement/body").await
    }

    async fn get_typed<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        let value = self.request(endpoint, &[]).await?;
        Ok(serde_json::from_value(value)?)
    }
}
