//! HTTP transport for the upstream GraphQL API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use super::envelope::GraphEnvelope;
use super::error::ApiError;
use crate::limits::ScopePacer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("inflow/", env!("CARGO_PKG_VERSION"));

/// How many characters of an error response body to keep for diagnostics.
const ERROR_BODY_LIMIT: usize = 300;

/// Resolves the bearer token to use for a given scope.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns `ApiError::Suspended` when the scope has no usable credential.
    async fn bearer_token(&self, scope: Uuid) -> Result<String, ApiError>;
}

/// In-memory credential table, typically built from configuration.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    tokens: HashMap<Uuid, String>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(tokens: HashMap<Uuid, String>) -> Self {
        Self { tokens }
    }

    pub fn insert(&mut self, scope: Uuid, token: impl Into<String>) {
        self.tokens.insert(scope, token.into());
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self, scope: Uuid) -> Result<String, ApiError> {
        self.tokens
            .get(&scope)
            .cloned()
            .ok_or(ApiError::Suspended { scope })
    }
}

/// Executes GraphQL documents against the upstream API.
///
/// The pagination engine depends on this trait rather than a concrete
/// client so tests can script response sequences.
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn execute(
        &self,
        scope: Uuid,
        query: &str,
        variables: Value,
    ) -> Result<GraphEnvelope, ApiError>;
}

/// Production client: reqwest POST to a single GraphQL endpoint, with
/// per-scope token resolution and optional request pacing.
pub struct HttpGraphClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    pacer: Option<ScopePacer>,
}

impl HttpGraphClient {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            credentials,
            pacer: None,
        })
    }

    /// Pace outgoing requests per scope.
    #[must_use]
    pub fn with_pacer(mut self, pacer: ScopePacer) -> Self {
        self.pacer = Some(pacer);
        self
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn execute(
        &self,
        scope: Uuid,
        query: &str,
        variables: Value,
    ) -> Result<GraphEnvelope, ApiError> {
        let token = self.credentials.bearer_token(scope).await?;

        if let Some(pacer) = &self.pacer {
            pacer.wait(scope).await;
        }

        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
                retry_after: header_u64(&headers, "retry-after"),
                rate_limit_remaining: header_i64(&headers, "x-ratelimit-remaining"),
                rate_limit_reset: header_i64(&headers, "x-ratelimit-reset"),
            });
        }

        // Body reads stay inside the retried fetch so mid-stream connection
        // failures surface here as Transport errors.
        let envelope = response.json::<GraphEnvelope>().await?;
        Ok(envelope)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
