//! # apigate-client
//!
//! Client library for chat completions behind an enterprise API gateway.
//!
//! Two clients implement the [`CompletionClient`] trait:
//!
//! - [`GatewayClient`] authenticates with an OAuth2 client-credentials
//!   bearer token (acquired and cached by [`auth::TokenProvider`]) and
//!   routes requests to an Azure OpenAI deployment behind an APIGEE-style
//!   gateway.
//! - [`OpenAIClient`] is the direct path: a plain API-key client for any
//!   OpenAI-compatible endpoint, used when gateway credentials are absent.
//!
//! ## Example
//!
//! ```no_run
//! use apigate_client::{CompletionClient, GatewayClient};
//! use apigate_common::config::AuthMode;
//! use apigate_common::{ChatRequest, Message};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let AuthMode::Configured(config) = AuthMode::from_env()? else {
//!     anyhow::bail!("gateway credentials not configured");
//! };
//!
//! let client = GatewayClient::new(*config)?;
//! let request = ChatRequest::new(vec![Message::user("Hello!")]);
//! let response = client.chat(&request).await?;
//! println!("{}", response.message.content);
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::Stream;

use apigate_common::client::{ChatChunk, ChatRequest, ChatResponse};

/// OAuth2 client-credentials token acquisition and caching.
pub mod auth;
/// Error taxonomy.
pub mod error;
/// The gateway-routed Azure OpenAI client.
pub mod gateway;
/// The direct OpenAI-compatible client.
pub mod openai;
mod transport;
/// Chat-completions wire types.
pub mod wire;

pub use auth::{AuthError, TimeSource, TokenProvider};
pub use error::ClientError;
pub use gateway::GatewayClient;
pub use openai::OpenAIClient;

/// A stream of incremental completion chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Trait for chat completion clients.
///
/// Implementations must be thread-safe; completion requests may be issued
/// concurrently from multiple tasks.
#[must_use = "CompletionClient must be used to make requests"]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// The model or deployment used when a request names none.
    fn default_model(&self) -> &str;

    /// Sends a non-streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails validation, authentication
    /// fails, transport fails, or the API answers with an error status.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Opens a streaming chat completion.
    ///
    /// The returned stream yields incremental [`ChatChunk`]s; an
    /// authentication rejection surfaces from this call itself, before any
    /// chunk is yielded, so callers can apply their reset-and-retry policy
    /// at initiation time.
    ///
    /// # Errors
    ///
    /// Same conditions as [`chat`](Self::chat).
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream>;

    /// Validates a request before sending.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] when the request is empty or
    /// carries out-of-range parameters.
    fn validate_request(&self, request: &ChatRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        Ok(())
    }
}
