//! Chat-completions wire types.
//!
//! These types serialize to the chat-completions JSON format spoken both by
//! the gateway-fronted Azure deployment and by the direct OpenAI-compatible
//! endpoint; only the URL shape and the auth header differ between the two
//! clients.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;

use apigate_common::chat::{Message, MessageRole};
use apigate_common::client::{ChatChunk, ChatRequest, ChatResponse, Usage};
use apigate_common::features::ReasoningEffort;
use apigate_common::tools::{FunctionCall, Tool, ToolCall};

use crate::error::ClientError;

/// A single choice from a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The index of this choice in the response array.
    pub index: u32,
    /// The generated message for this choice.
    pub message: WireMessage,
    /// Why generation stopped for this choice.
    pub finish_reason: Option<String>,
}

/// Message content in the wire format: a plain string, or content parts
/// when a message mixes text and inline images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    /// Plain text content.
    Text(String),
    /// Mixed content parts.
    Parts(Vec<ContentPart>),
}

/// One part of a mixed-content message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment.
    Text {
        /// The text.
        text: String,
    },
    /// An inline image, referenced by `data:` URL.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
}

/// Image reference inside a content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// The image URL, typically a base64 `data:` URL.
    pub url: String,
}

/// Message in the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct WireMessage {
    /// The author role.
    pub role: MessageRole,
    /// Content; absent for assistant messages that only carry tool calls.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,
    /// Optional author name.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by the assistant.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[WireToolCall; 2]>>,
    /// For tool messages, the id of the call being answered.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(message.tool_calls.iter().map(WireToolCall::from).collect())
        };

        let content = if message.images.is_empty() {
            // Content is omitted only when empty and tool calls carry the
            // payload.
            if message.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(WireContent::Text(message.content.clone()))
            }
        } else {
            let mut parts = Vec::with_capacity(message.images.len() + 1);
            if !message.content.is_empty() {
                parts.push(ContentPart::Text {
                    text: message.content.clone(),
                });
            }
            for image in &message.images {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_url(),
                    },
                });
            }
            Some(WireContent::Parts(parts))
        };

        WireMessage::builder()
            .role(message.role)
            .content(content)
            .name(message.name.clone())
            .tool_calls(tool_calls)
            .tool_call_id(message.tool_call_id.clone())
            .build()
    }
}

impl WireMessage {
    /// Converts a response message into the shared [`Message`] type.
    ///
    /// Mixed-content parts are flattened to their text fragments; models do
    /// not return images.
    #[must_use]
    pub fn into_message(self) -> Message {
        let tool_calls = self
            .tool_calls
            .map(|calls| calls.into_iter().map(WireToolCall::into_tool_call).collect())
            .unwrap_or_default();

        let content = match self.content {
            Some(WireContent::Text(text)) => text,
            Some(WireContent::Parts(parts)) => parts
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        };

        Message {
            role: self.role,
            content,
            name: self.name,
            tool_calls,
            tool_call_id: self.tool_call_id,
            images: Vec::new(),
        }
    }
}

/// Tool call in the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Call type, typically `"function"`.
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub r#type: String,
    /// The function to call with its arguments.
    pub function: WireFunction,
}

impl From<&ToolCall> for WireToolCall {
    fn from(tool_call: &ToolCall) -> Self {
        Self {
            id: tool_call.id.clone(),
            r#type: tool_call.call_type.clone(),
            function: WireFunction {
                name: tool_call.function.name.clone(),
                arguments: tool_call.function.arguments.clone(),
            },
        }
    }
}

impl WireToolCall {
    fn into_tool_call(self) -> ToolCall {
        ToolCall {
            id: self.id,
            call_type: self.r#type,
            function: FunctionCall {
                name: self.function.name,
                arguments: self.function.arguments,
            },
        }
    }
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

/// Function call in the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    /// The name of the function to call.
    pub name: String,
    /// The arguments as a JSON-serialized string.
    pub arguments: String,
}

/// Request body for the chat completions endpoint.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ChatCompletionRequest {
    /// The model or deployment identifier.
    pub model: String,
    /// The conversation messages in wire format.
    pub messages: Vec<WireMessage>,
    /// Maximum tokens to generate (non-reasoning deployments).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Maximum completion tokens (reasoning deployments count reasoning
    /// tokens here too).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Sampling temperature.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Stop sequences.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// End-user identifier.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Whether to stream the response.
    #[builder(default = Some(false))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Stream options (usage reporting).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<serde_json::Value>,
    /// Tools available for function calling.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool selection strategy.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Reasoning effort for deployments that support it.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl ChatCompletionRequest {
    /// Builds the wire request from a [`ChatRequest`], falling back to
    /// `default_model` when the request names none.
    ///
    /// When a reasoning effort is present the token cap is sent as
    /// `max_completion_tokens`; otherwise as `max_tokens`.
    #[must_use]
    pub fn from_request(request: &ChatRequest, default_model: &str) -> Self {
        let messages: Vec<WireMessage> = request.messages.iter().map(WireMessage::from).collect();

        let (max_tokens, max_completion_tokens) = if request.reasoning_effort.is_some() {
            (None, request.max_tokens)
        } else {
            (request.max_tokens, None)
        };

        ChatCompletionRequest::builder()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| default_model.to_string()),
            )
            .messages(messages)
            .max_tokens(max_tokens)
            .max_completion_tokens(max_completion_tokens)
            .temperature(request.temperature)
            .top_p(request.top_p)
            .stop(request.stop.clone())
            .user(request.user.clone())
            .stream(Some(request.stream))
            .tools(request.tools.clone())
            .tool_choice(request.tool_choice.as_ref().map(|tc| tc.clone().into()))
            .reasoning_effort(request.reasoning_effort)
            .build()
    }
}

/// Response body from the chat completions endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    pub id: String,
    /// Unix timestamp of creation.
    pub created: u64,
    /// The model that generated this completion.
    pub model: String,
    /// Generated completions.
    pub choices: Vec<ChatChoice>,
    /// Token usage statistics, when reported.
    pub usage: Option<Usage>,
}

/// A single choice from a streaming chunk.
#[derive(Debug, Deserialize)]
pub struct ChatStreamChoice {
    /// The index of this choice.
    pub index: u32,
    /// Incremental message delta.
    pub delta: WireMessageDelta,
    /// Why generation stopped, present only in the final chunk.
    pub finish_reason: Option<String>,
}

/// Incremental changes to a message in a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessageDelta {
    /// The role, present only in the first chunk.
    pub role: Option<MessageRole>,
    /// Content added in this chunk.
    pub content: Option<String>,
    /// Incremental tool calls.
    pub tool_calls: Option<SmallVec<[WireToolCallDelta; 2]>>,
}

/// Incremental changes to a tool call in a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireToolCallDelta {
    /// Index of this tool call.
    pub index: u32,
    /// Identifier, present only in the first chunk for this call.
    pub id: Option<String>,
    /// Call type, present only in the first chunk.
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    /// Incremental function data.
    pub function: Option<WireFunctionDelta>,
}

/// Incremental changes to a function call.
#[derive(Debug, Clone, Deserialize)]
pub struct WireFunctionDelta {
    /// Function name, present only in the first chunk.
    pub name: Option<String>,
    /// Argument fragment added in this chunk.
    pub arguments: Option<String>,
}

/// A chunk from a streaming chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    /// Unique identifier for this stream.
    pub id: String,
    /// Unix timestamp of creation.
    pub created: u64,
    /// The model generating this stream.
    pub model: String,
    /// Delta choices.
    pub choices: Vec<ChatStreamChoice>,
    /// Usage, present only in the final chunk for some providers.
    pub usage: Option<Usage>,
}

/// Converts a wire response into the shared [`ChatResponse`] type.
///
/// # Errors
///
/// Returns [`ClientError::InvalidResponse`] when the response carries no
/// choices.
pub fn convert_response(response: ChatCompletionResponse) -> Result<ChatResponse, ClientError> {
    let created_at = timestamp(response.created);
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        warn!(
            "Received empty choices array from API. Response ID: {}, Model: {}",
            response.id, response.model
        );
        ClientError::InvalidResponse("API returned no choices in response".to_string())
    })?;

    let finish_reason = choice
        .finish_reason
        .as_ref()
        .and_then(|reason| reason.parse().ok());

    Ok(ChatResponse {
        message: choice.message.into_message(),
        model: response.model,
        usage: response.usage,
        finish_reason,
        created_at,
        response_id: Some(response.id),
    })
}

/// Converts a streaming wire chunk into the shared [`ChatChunk`] type.
#[must_use]
pub fn convert_chunk(chunk: &ChatCompletionChunk) -> ChatChunk {
    let choice = chunk.choices.first();

    let delta_content = choice.and_then(|c| c.delta.content.clone());
    let delta_role = choice.and_then(|c| c.delta.role);
    let finish_reason = choice
        .and_then(|c| c.finish_reason.as_ref())
        .and_then(|reason| reason.parse().ok());

    let delta_tool_calls = choice
        .and_then(|c| c.delta.tool_calls.as_ref())
        .map(|deltas| {
            let mut result = Vec::with_capacity(deltas.len());
            for delta in deltas {
                let Some(id) = delta.id.clone() else {
                    // Continuation deltas omit the id; keyed merging happens
                    // upstream via ToolCall::merge_deltas, which needs one.
                    continue;
                };
                let call_type = delta
                    .r#type
                    .clone()
                    .unwrap_or_else(|| "function".to_string());
                if let Some(function) = delta.function.as_ref() {
                    result.push(ToolCall {
                        id,
                        call_type,
                        function: FunctionCall {
                            name: function.name.clone().unwrap_or_default(),
                            arguments: function.arguments.clone().unwrap_or_default(),
                        },
                    });
                }
            }
            result
        });

    ChatChunk {
        model: chunk.model.clone(),
        delta_content,
        delta_role,
        delta_tool_calls,
        finish_reason,
        usage: chunk.usage.clone(),
        response_id: Some(chunk.id.clone()),
        created_at: timestamp(chunk.created),
    }
}

/// Converts an API `created` timestamp, falling back to now on overflow.
#[must_use]
pub fn timestamp(created: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::try_from(created).unwrap_or(0), 0).unwrap_or_else(Utc::now)
}
