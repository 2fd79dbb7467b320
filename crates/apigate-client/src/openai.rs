//! Direct OpenAI-compatible client.
//!
//! The non-gateway path: a plain API-key bearer against any
//! OpenAI-compatible chat-completions endpoint. The model adapter uses this
//! client for the process lifetime whenever the gateway environment is not
//! fully configured.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};

use apigate_common::client::{ChatRequest, ChatResponse, RetryConfig};
use apigate_common::config::DirectConfig;

use crate::error::ClientError;
use crate::transport::{build_clients, execute_chat, open_chat_stream};
use crate::wire::{ChatCompletionRequest, convert_response};
use crate::{ChatStream, CompletionClient};

/// Client for an OpenAI-compatible API authenticated with a static key.
pub struct OpenAIClient {
    http: ClientWithMiddleware,
    streaming_http: reqwest::Client,
    api_key: Arc<SecretString>,
    base_url: String,
    model: String,
}

// Manual Debug to keep the API key out of logs.
impl fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    /// Creates a client for `model` with default retry (none) and no
    /// request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP clients
    /// cannot be built.
    pub fn new(config: DirectConfig, model: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(config, model, &RetryConfig::default(), None)
    }

    /// Creates a client with explicit transient-retry and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP clients
    /// cannot be built.
    pub fn with_options(
        config: DirectConfig,
        model: impl Into<String>,
        retry: &RetryConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .ok_or_else(|| ClientError::Configuration("API key is required".to_string()))?;
        let (http, streaming_http) = build_clients(retry, timeout)?;
        Ok(Self {
            http,
            streaming_http,
            api_key: Arc::new(api_key),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let mut wire = ChatCompletionRequest::from_request(request, self.default_model());
        wire.stream = Some(false);

        let url = self.completions_url();
        let response = execute_chat(&self.http, &url, &self.api_key, &wire).await?;
        Ok(convert_response(response)?)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        self.validate_request(request)?;

        let mut wire = ChatCompletionRequest::from_request(request, self.default_model());
        wire.stream = Some(true);
        wire.stream_options = Some(serde_json::json!({ "include_usage": true }));

        let url = self.completions_url();
        reqwest::Url::parse(&url)
            .map_err(|e| ClientError::Configuration(format!("Invalid URL '{url}': {e}")))?;

        let builder = self
            .streaming_http
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&wire);

        Ok(open_chat_stream(builder).await?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use apigate_common::Message;
    use apigate_common::client::FinishReason;

    fn direct_config(server: &MockServer) -> DirectConfig {
        DirectConfig {
            api_key: Some(SecretString::new("sk-test".to_string().into())),
            base_url: server.uri(),
        }
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let config = DirectConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
        };
        let err = OpenAIClient::new(config, "gpt-4o").unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_chat_sends_api_key_bearer() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi!"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new(direct_config(&server), "gpt-4o").unwrap();
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let response = client.chat(&request).await.unwrap();

        assert_eq!(response.message.content, "Hi!");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_chat_with_tool_calls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-2",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "get_weather",
                                "arguments": "{\"location\":\"Tokyo\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(direct_config(&server), "gpt-4o").unwrap();
        let request = ChatRequest::new(vec![Message::user("weather?")]);
        let response = client.chat(&request).await.unwrap();

        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.message.tool_calls.len(), 1);
        assert_eq!(response.message.tool_calls[0].function.name, "get_weather");
    }

    #[tokio::test]
    async fn test_401_maps_to_auth_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid API key"}
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(direct_config(&server), "gpt-4o").unwrap();
        let request = ChatRequest::new(vec![Message::user("hi")]);
        let err = client.chat(&request).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }
}
