//! The model adapter: a facade over the gateway and direct clients.
//!
//! The adapter is constructed once from the tagged configuration variant
//! and never changes path afterwards:
//!
//! - [`AuthMode::Configured`] selects the gateway path (`CompanyAuth`);
//! - [`AuthMode::Unconfigured`] selects the direct API-key path for the
//!   process lifetime (`Unconfigured`).
//!
//! On an authentication rejection from the gateway the adapter resets the
//! token session exactly once and replays the original request; a second
//! rejection is fatal and moves the adapter to `Failed`, where every
//! subsequent call fails fast. All other failures (rate limits, network
//! errors, upstream errors) pass through unmodified.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use apigate_client::{
    AuthError, ChatStream, ClientError, CompletionClient, GatewayClient, OpenAIClient,
};
use apigate_common::client::{ChatRequest, ChatResponse, Fingerprint, ToolChoice};
use apigate_common::config::{AuthMode, DirectConfig};
use apigate_common::features::{ModelTier, ReasoningEffort, is_reasoning_deployment};
use apigate_common::tools::{Function, Tool};
use apigate_common::Message;

use crate::error::AdapterError;

/// Completion-token cap applied when a reasoning effort is in play and the
/// caller set none.
const DEFAULT_REASONING_MAX_TOKENS: u32 = 800;

/// Model used on the direct path when none is named.
const DEFAULT_DIRECT_MODEL: &str = "gpt-4o";

/// The adapter's position in its fallback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Gateway credentials absent; requests use the direct path.
    Unconfigured,
    /// Gateway session active.
    CompanyAuth,
    /// Unrecoverable auth failure after the single reset-and-retry.
    Failed,
}

enum Backend {
    Gateway(GatewayClient),
    Direct(OpenAIClient),
}

/// Tracks the single reset-and-retry permitted per request.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

/// Facade presenting a uniform completion operation over whichever client
/// the configuration selected.
pub struct ModelAdapter {
    backend: Backend,
    model: String,
    reasoning_effort: Option<ReasoningEffort>,
    verbose: bool,
    failed: AtomicBool,
}

impl ModelAdapter {
    /// Builds an adapter from the tagged configuration variant.
    ///
    /// `model` overrides the deployment/model used per request; when absent
    /// the gateway path uses its configured deployment and the direct path
    /// a conventional default.
    ///
    /// # Errors
    ///
    /// Returns an error when the selected client cannot be constructed
    /// (e.g. the direct path without an API key).
    pub fn new(
        mode: AuthMode,
        direct: DirectConfig,
        model: Option<String>,
    ) -> Result<Self, AdapterError> {
        match mode {
            AuthMode::Configured(config) => {
                let model = model.unwrap_or_else(|| config.deployment.clone());
                let client =
                    GatewayClient::new(*config).map_err(|e| AdapterError::Other(e.into()))?;
                debug!("gateway authentication configured, deployment {model}");
                Ok(Self::with_gateway_client(client, model))
            }
            AuthMode::Unconfigured => {
                let model = model.unwrap_or_else(|| DEFAULT_DIRECT_MODEL.to_string());
                debug!("gateway credentials absent, using direct path with model {model}");
                let client = OpenAIClient::new(direct, model.clone())
                    .map_err(|e| AdapterError::Other(e.into()))?;
                Ok(Self {
                    backend: Backend::Direct(client),
                    model,
                    reasoning_effort: None,
                    verbose: false,
                    failed: AtomicBool::new(false),
                })
            }
            _ => Err(AdapterError::Other(anyhow::anyhow!(
                "unsupported auth mode variant"
            ))),
        }
    }

    /// Builds an adapter from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] for malformed required variables and
    /// client construction errors otherwise.
    pub fn from_env(model: Option<String>) -> Result<Self, AdapterError> {
        Self::new(AuthMode::from_env()?, DirectConfig::from_env(), model)
    }

    /// Builds an adapter around an existing gateway client.
    ///
    /// This is the injection seam: tests construct the client with a fake
    /// time source and mock endpoints, then hand it to the adapter.
    #[must_use]
    pub fn with_gateway_client(client: GatewayClient, model: impl Into<String>) -> Self {
        Self {
            backend: Backend::Gateway(client),
            model: model.into(),
            reasoning_effort: None,
            verbose: false,
            failed: AtomicBool::new(false),
        }
    }

    /// Sets the reasoning effort applied to every request.
    #[must_use]
    pub const fn with_reasoning_effort(mut self, effort: Option<ReasoningEffort>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    /// Enables verbose logging of authentication attempts, resets, and
    /// retry decisions. Secret values are never logged.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The adapter's current state.
    #[must_use]
    pub fn state(&self) -> AdapterState {
        if self.failed.load(Ordering::Acquire) {
            AdapterState::Failed
        } else {
            match self.backend {
                Backend::Gateway(_) => AdapterState::CompanyAuth,
                Backend::Direct(_) => AdapterState::Unconfigured,
            }
        }
    }

    /// The model or deployment requests run against.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends a completion request and returns the request fingerprint with
    /// the response.
    ///
    /// `functions`, when present, is exposed to the model as a forced call
    /// to the first function, mirroring the completion API's function-call
    /// contract.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Auth`] after a failed reset-and-retry; all
    /// other failures pass through unmodified.
    pub async fn send_completion(
        &self,
        messages: Vec<Message>,
        functions: Option<Vec<Function>>,
        temperature: Option<f32>,
    ) -> Result<(Fingerprint, ChatResponse), AdapterError> {
        let (request, fingerprint) = self.build_request(messages, functions, temperature, false);
        let response = self.execute(&request).await?;
        Ok((fingerprint, response))
    }

    /// Streaming variant of [`send_completion`](Self::send_completion).
    ///
    /// The single reset-and-retry applies to opening the stream; an
    /// authentication rejection surfaces before the first chunk.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send_completion`](Self::send_completion).
    pub async fn send_completion_stream(
        &self,
        messages: Vec<Message>,
        functions: Option<Vec<Function>>,
        temperature: Option<f32>,
    ) -> Result<(Fingerprint, ChatStream), AdapterError> {
        let (request, fingerprint) = self.build_request(messages, functions, temperature, true);
        let stream = self.execute_stream(&request).await?;
        Ok((fingerprint, stream))
    }

    /// One-shot convenience call: temperature zero, no functions, returns
    /// the reply content.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send_completion`](Self::send_completion).
    pub async fn simple_send(&self, messages: Vec<Message>) -> Result<String, AdapterError> {
        let (_, response) = self.send_completion(messages, None, Some(0.0)).await?;
        Ok(response.message.content)
    }

    fn client(&self) -> &dyn CompletionClient {
        match &self.backend {
            Backend::Gateway(client) => client,
            Backend::Direct(client) => client,
        }
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        functions: Option<Vec<Function>>,
        temperature: Option<f32>,
        stream: bool,
    ) -> (ChatRequest, Fingerprint) {
        let mut request = ChatRequest::new(messages)
            .with_model(self.model.clone())
            .with_streaming(stream);

        if let Some(temperature) = temperature {
            request = request.with_temperature(temperature);
        }

        if let Some(functions) = functions
            && let Some(first) = functions.first()
        {
            let name = first.name.clone();
            request = request
                .with_tools(functions.into_iter().map(Tool::from).collect())
                .with_tool_choice(ToolChoice::Function { name });
        }

        let effort = self.reasoning_effort.or_else(|| {
            is_reasoning_deployment(&self.model)
                .then(|| ModelTier::of(&self.model).default_effort())
        });
        if let Some(effort) = effort {
            request = request.with_reasoning_effort(effort);
            if request.max_tokens.is_none() {
                request = request.with_max_tokens(DEFAULT_REASONING_MAX_TOKENS);
            }
        }

        let fingerprint = fingerprint_of(&request);
        if self.verbose {
            debug!(
                "completion request against {} (fingerprint {fingerprint})",
                self.model
            );
        }
        (request, fingerprint)
    }

    /// Non-streaming request with the single reset-and-retry transition.
    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        self.ensure_usable()?;

        let mut attempt = Attempt::First;
        loop {
            match self.client().chat(request).await {
                Ok(response) => return Ok(response),
                Err(error) => attempt = self.transition(error, attempt).await?,
            }
        }
    }

    /// Streaming request with the single reset-and-retry transition.
    async fn execute_stream(&self, request: &ChatRequest) -> Result<ChatStream, AdapterError> {
        self.ensure_usable()?;

        let mut attempt = Attempt::First;
        loop {
            match self.client().chat_stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(error) => attempt = self.transition(error, attempt).await?,
            }
        }
    }

    fn ensure_usable(&self) -> Result<(), AdapterError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(AdapterError::Auth(AuthError::RejectedByGateway));
        }
        Ok(())
    }

    /// Maps a request failure to the next attempt state, or to the error
    /// surfaced to the caller.
    ///
    /// Only a gateway auth rejection on the first attempt yields a retry;
    /// everything else terminates the request.
    async fn transition(
        &self,
        error: anyhow::Error,
        attempt: Attempt,
    ) -> Result<Attempt, AdapterError> {
        let client_error = match error.downcast::<ClientError>() {
            Ok(client_error) => client_error,
            Err(other) => return Err(AdapterError::Other(other)),
        };

        match client_error {
            // Token acquisition itself failed; no retry to offer.
            ClientError::Auth(auth_error) => Err(AdapterError::Auth(auth_error)),
            rejection @ ClientError::AuthRejected { .. } => match (&self.backend, attempt) {
                (Backend::Gateway(gateway), Attempt::First) => {
                    if self.verbose {
                        info!("gateway rejected bearer token; resetting session and retrying once");
                    } else {
                        debug!("gateway rejected bearer token; resetting session and retrying once");
                    }
                    gateway.reset().await;
                    Ok(Attempt::Retried)
                }
                (Backend::Gateway(_), Attempt::Retried) => {
                    warn!("gateway rejected token after re-authentication; session failed");
                    self.failed.store(true, Ordering::Release);
                    Err(AdapterError::Auth(AuthError::RejectedByGateway))
                }
                // The direct path owns no token session; surface as-is.
                (Backend::Direct(_), _) => Err(AdapterError::Other(rejection.into())),
            },
            other => Err(AdapterError::Other(other.into())),
        }
    }
}

/// Fingerprint of everything that shapes the request except its messages.
fn fingerprint_of(request: &ChatRequest) -> Fingerprint {
    let params = serde_json::json!({
        "model": &request.model,
        "stream": request.stream,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "top_p": request.top_p,
        "reasoning_effort": request.reasoning_effort,
        "tools": &request.tools,
        "tool_choice": &request.tool_choice,
    });
    Fingerprint::of_params(&params)
}
