//! Completion request/response types and client-side configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chat::{Message, MessageRole};
use crate::features::ReasoningEffort;
use crate::tools::{Tool, ToolCall};

/// Controls how the model selects which tool to call, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum ToolChoice {
    /// The model decides whether and which tool to call.
    #[serde(rename = "auto")]
    Auto,
    /// Disable tool calling for this request.
    #[serde(rename = "none")]
    None,
    /// The model must call at least one tool.
    #[serde(rename = "required")]
    Required,
    /// Force a call to a specific function by name.
    Function {
        /// The name of the function to call.
        name: String,
    },
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::None => write!(f, "none"),
            Self::Required => write!(f, "required"),
            Self::Function { name } => write!(f, "{name}"),
        }
    }
}

impl From<ToolChoice> for serde_json::Value {
    fn from(tool_choice: ToolChoice) -> Self {
        match tool_choice {
            ToolChoice::Auto => Self::String("auto".to_string()),
            ToolChoice::None => Self::String("none".to_string()),
            ToolChoice::Required => Self::String("required".to_string()),
            ToolChoice::Function { name } => {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": name
                    }
                })
            }
        }
    }
}

/// Why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FinishReason {
    /// Generation completed naturally.
    #[serde(rename = "stop")]
    Stop,
    /// Generation was truncated at the token limit.
    #[serde(rename = "length")]
    Length,
    /// The model requested tool calls.
    #[serde(rename = "tool_calls")]
    ToolCalls,
    /// The content filter stopped generation.
    #[serde(rename = "content_filter")]
    ContentFilter,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
        }
    }
}

impl FromStr for FinishReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "length" => Ok(Self::Length),
            "tool_calls" => Ok(Self::ToolCalls),
            "content_filter" => Ok(Self::ContentFilter),
            _ => anyhow::bail!("Unknown finish reason: {s}"),
        }
    }
}

/// Retry behavior for transient completion failures.
///
/// Defaults to zero retries: network errors and rate limits surface to the
/// caller unmodified unless the caller opts in. The single
/// reset-and-retry on an authentication rejection is separate policy owned
/// by the model adapter and is not affected by this configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum transient retry attempts before failing.
    pub max_retries: u32,
    /// Initial delay before the first retry attempt.
    pub initial_delay: Duration,
    /// Maximum delay between retry attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Token usage statistics for a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the input prompt.
    #[serde(alias = "input_tokens")]
    pub prompt_tokens: u32,
    /// Tokens generated in the completion, reasoning included.
    #[serde(alias = "output_tokens")]
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
    /// Detailed breakdown of output tokens, when the API reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

/// Detailed breakdown of output token usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    /// Tokens spent on internal reasoning, not part of the visible reply.
    pub reasoning_tokens: u32,
}

/// A request for a chat completion.
///
/// # Examples
///
/// ```
/// use apigate_common::{ChatRequest, Message};
///
/// let request = ChatRequest::new(vec![Message::user("Hello!")])
///     .with_model("gpt5")
///     .with_temperature(0.7)
///     .with_max_tokens(1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Arc<[Message]>,
    /// The deployment/model identifier; defaults from client config when unset.
    pub model: Option<String>,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: Option<f32>,
    /// Maximum completion tokens to generate.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold (0.0 to 1.0).
    pub top_p: Option<f32>,
    /// Sequences that stop generation.
    pub stop: Option<Vec<String>>,
    /// Tools available for the model to call.
    pub tools: Option<Vec<Tool>>,
    /// Tool selection strategy.
    pub tool_choice: Option<ToolChoice>,
    /// Reasoning effort for deployments that support it.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Whether to stream the response incrementally.
    pub stream: bool,
    /// End-user identifier for tracking.
    pub user: Option<String>,
}

impl ChatRequest {
    /// Creates a request with the given messages and no overrides.
    pub fn new(messages: impl Into<Arc<[Message]>>) -> Self {
        Self {
            messages: messages.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
            tools: None,
            tool_choice: None,
            reasoning_effort: None,
            stream: false,
            user: None,
        }
    }

    /// Sets the deployment/model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature (0.0 to 2.0).
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the maximum completion tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the nucleus sampling threshold (0.0 to 1.0).
    #[must_use]
    pub const fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets stop sequences.
    #[must_use]
    pub fn with_stop_sequences(
        mut self,
        stop_sequences: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.stop = Some(stop_sequences.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the tools available to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets the tool selection strategy.
    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Sets the reasoning effort.
    #[must_use]
    pub const fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Enables or disables streaming.
    #[must_use]
    pub const fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Validates that the request carries at least one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the messages slice is empty.
    pub fn validate_has_messages(&self) -> anyhow::Result<()> {
        if self.messages.is_empty() {
            anyhow::bail!("Chat request must have at least one message");
        }
        Ok(())
    }

    /// Validates message presence and parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns an error on empty messages or out-of-range `temperature`
    /// or `top_p`.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_has_messages()?;

        if let Some(temp) = self.temperature
            && !(0.0..=2.0).contains(&temp)
        {
            anyhow::bail!("Temperature must be between 0.0 and 2.0, got {temp}");
        }

        if let Some(top_p) = self.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            anyhow::bail!("top_p must be between 0.0 and 1.0, got {top_p}");
        }

        Ok(())
    }

    /// Whether the request has any tools configured.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Whether this request uses streaming.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.stream
    }
}

/// A response from a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message.
    pub message: Message,
    /// The model that produced this response.
    pub model: String,
    /// Token usage statistics, when reported.
    pub usage: Option<Usage>,
    /// Why generation stopped.
    pub finish_reason: Option<FinishReason>,
    /// When the response was created, per the API.
    pub created_at: DateTime<Utc>,
    /// The provider's id for this response.
    pub response_id: Option<String>,
}

/// An incremental chunk from a streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// The model generating this stream.
    pub model: String,
    /// Content added in this chunk.
    pub delta_content: Option<String>,
    /// The message role, present only in the first chunk.
    pub delta_role: Option<MessageRole>,
    /// Tool calls being assembled incrementally.
    pub delta_tool_calls: Option<Vec<ToolCall>>,
    /// Why generation stopped, present only in the final chunk.
    pub finish_reason: Option<FinishReason>,
    /// Usage statistics, present only in the final chunk for some providers.
    pub usage: Option<Usage>,
    /// The provider's id for this stream.
    pub response_id: Option<String>,
    /// When this chunk was created.
    pub created_at: DateTime<Utc>,
}

/// Digest identifying the non-message parameters of a completion request.
///
/// Two requests with the same model, sampling settings, tools, and effort
/// share a fingerprint regardless of their messages, which makes it usable
/// as a cache key for response handling downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints the canonical JSON encoding of the request parameters.
    ///
    /// `serde_json` maps serialize with sorted keys, so the encoding is
    /// stable across runs for the same parameters.
    #[must_use]
    pub fn of_params(params: &serde_json::Value) -> Self {
        use std::fmt::Write as _;

        let canonical = params.to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            // Writing to a String is infallible.
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// The hex-encoded digest.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::chat::Message;

    #[test]
    fn test_validate_empty_messages() {
        let request = ChatRequest::new(Vec::<Message>::new());
        assert!(request.validate().is_err());
        assert!(request.validate_has_messages().is_err());
    }

    #[test]
    fn test_tool_choice_json_forms() {
        let auto: serde_json::Value = ToolChoice::Auto.into();
        assert_eq!(auto, serde_json::json!("auto"));

        let forced: serde_json::Value = ToolChoice::Function {
            name: "get_weather".to_string(),
        }
        .into();
        assert_eq!(forced["function"]["name"], "get_weather");
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(
            "tool_calls".parse::<FinishReason>().unwrap(),
            FinishReason::ToolCalls
        );
        assert!("unknown_reason".parse::<FinishReason>().is_err());
    }

    #[test]
    fn test_retry_config_defaults_to_no_retries() {
        assert_eq!(RetryConfig::default().max_retries, 0);
    }

    #[test]
    fn test_fingerprint_stable_and_parameter_sensitive() {
        let a = Fingerprint::of_params(&serde_json::json!({"model": "gpt5", "temperature": 0.0}));
        let b = Fingerprint::of_params(&serde_json::json!({"model": "gpt5", "temperature": 0.0}));
        let c = Fingerprint::of_params(&serde_json::json!({"model": "gpt5", "temperature": 1.0}));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_hex().len(), 64);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn temperature_validation(temp in -10.0f32..10.0f32) {
                let request = ChatRequest::new(vec![Message::user("hi")])
                    .with_temperature(temp);
                let is_valid = (0.0..=2.0).contains(&temp);
                prop_assert_eq!(request.validate().is_ok(), is_valid);
            }

            #[test]
            fn top_p_validation(top_p in -5.0f32..5.0f32) {
                let request = ChatRequest::new(vec![Message::user("hi")])
                    .with_top_p(top_p);
                let is_valid = (0.0..=1.0).contains(&top_p);
                prop_assert_eq!(request.validate().is_ok(), is_valid);
            }

            #[test]
            fn fingerprint_ignores_nothing_it_is_given(
                model in "[a-z0-9-]{1,16}",
                max_tokens in 1u32..10000,
            ) {
                let params = serde_json::json!({"model": model, "max_tokens": max_tokens});
                let first = Fingerprint::of_params(&params);
                let second = Fingerprint::of_params(&params);
                prop_assert_eq!(first, second);
            }
        }
    }
}
