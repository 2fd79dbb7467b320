//! Gateway-routed Azure OpenAI client.
//!
//! Requests carry an OAuth2 bearer acquired by [`TokenProvider`] and are
//! posted to the deployment-scoped chat-completions route behind the
//! gateway:
//!
//! ```text
//! {APIGEE_ENDPOINT}/openai/deployments/{deployment}/chat/completions?api-version={v}
//! ```
//!
//! A 401/403 from the gateway surfaces as
//! [`ClientError::AuthRejected`]; the single reset-and-retry answer to it is
//! owned by the model adapter, which calls [`GatewayClient::reset`] and
//! replays the request once.
//!
//! # Security
//!
//! Bearer tokens and the client secret are held in
//! [`secrecy::SecretString`], which keeps them out of `Debug` output and
//! zeroes memory on drop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};

use apigate_common::client::{ChatRequest, ChatResponse, RetryConfig};
use apigate_common::config::GatewayConfig;

use crate::auth::{TimeSource, TokenProvider};
use crate::error::ClientError;
use crate::transport::{build_clients, execute_chat, open_chat_stream};
use crate::wire::{ChatCompletionRequest, convert_response};
use crate::{ChatStream, CompletionClient};

/// Client for an Azure OpenAI deployment behind an enterprise gateway.
pub struct GatewayClient {
    http: ClientWithMiddleware,
    streaming_http: reqwest::Client,
    tokens: TokenProvider,
    config: Arc<GatewayConfig>,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("endpoint", &self.config.endpoint.as_str())
            .field("deployment", &self.config.deployment)
            .field("api_version", &self.config.api_version)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Creates a client with default retry (none) and no request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        Self::with_options(config, &RetryConfig::default(), None)
    }

    /// Creates a client with explicit transient-retry and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn with_options(
        config: GatewayConfig,
        retry: &RetryConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let (http, streaming_http) = build_clients(retry, timeout)?;
        let tokens = TokenProvider::new(config.credentials.clone())?;
        Ok(Self {
            http,
            streaming_http,
            tokens,
            config: Arc::new(config),
        })
    }

    /// Creates a client whose token provider reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn with_time_source(
        config: GatewayConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ClientError> {
        let (http, streaming_http) = build_clients(&RetryConfig::default(), None)?;
        let tokens = TokenProvider::with_time_source(config.credentials.clone(), clock)?;
        Ok(Self {
            http,
            streaming_http,
            tokens,
            config: Arc::new(config),
        })
    }

    /// Discards the cached bearer token; the next request re-authenticates.
    pub async fn reset(&self) {
        self.tokens.invalidate().await;
    }

    /// The routing configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.as_str().trim_end_matches('/'),
            deployment,
            self.config.api_version
        )
    }

    async fn bearer(&self) -> Result<SecretString, ClientError> {
        Ok(self.tokens.bearer().await?)
    }
}

#[async_trait]
impl CompletionClient for GatewayClient {
    fn default_model(&self) -> &str {
        &self.config.deployment
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let bearer = self.bearer().await?;
        let mut wire = ChatCompletionRequest::from_request(request, self.default_model());
        wire.stream = Some(false);

        let url = self.completions_url(&wire.model);
        let response = execute_chat(&self.http, &url, &bearer, &wire).await?;
        Ok(convert_response(response)?)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        self.validate_request(request)?;

        let bearer = self.bearer().await?;
        let mut wire = ChatCompletionRequest::from_request(request, self.default_model());
        wire.stream = Some(true);
        wire.stream_options = Some(serde_json::json!({ "include_usage": true }));

        let url = self.completions_url(&wire.model);
        reqwest::Url::parse(&url)
            .map_err(|e| ClientError::Configuration(format!("Invalid URL '{url}': {e}")))?;

        let builder = self
            .streaming_http
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", bearer.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&wire);

        Ok(open_chat_stream(builder).await?)
    }
}
