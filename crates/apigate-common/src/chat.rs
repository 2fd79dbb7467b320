//! Chat message types for completion requests.
//!
//! Messages here are transient request/response payloads: they carry exactly
//! what the chat-completions wire format needs (role, content, tool linkage)
//! and are not persisted anywhere.
//!
//! # Message Roles
//!
//! Four roles via [`MessageRole`]:
//!
//! - **System**: instructions and context for the model
//! - **User**: input from the end user
//! - **Assistant**: model output, possibly carrying tool calls
//! - **Tool**: results from executing a tool, linked back by `tool_call_id`
//!
//! # Examples
//!
//! ```
//! use apigate_common::chat::{Message, MessageRole};
//!
//! let msg = Message::user("What changed in this file?");
//! assert_eq!(msg.role, MessageRole::User);
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::tools::ToolCall;

/// The role of a message author.
///
/// Serialized to the lowercase strings the chat-completions API expects:
/// `"system"`, `"user"`, `"assistant"`, `"tool"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions or context.
    #[serde(rename = "system")]
    System,
    /// Input from the end user.
    #[serde(rename = "user")]
    User,
    /// Output from the model, possibly including tool call requests.
    #[serde(rename = "assistant")]
    Assistant,
    /// The result of a tool execution, responding to an assistant tool call.
    #[serde(rename = "tool")]
    Tool,
}

/// An image attached to a user message, carried inline as base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Media type, e.g. `image/png` or `image/jpeg`.
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl ImageAttachment {
    /// Encodes raw image bytes.
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    /// The `data:` URL form the completion API expects.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// A single message in a completion request or response.
///
/// Tool calls may only appear on assistant messages; tool messages must name
/// the call they respond to. Both invariants are enforced by the
/// constructors rather than by the type system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The author role.
    pub role: MessageRole,
    /// The text content. May be empty for assistant messages that only
    /// carry tool calls.
    pub content: String,
    /// Optional author name; for tool messages, the function name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub tool_calls: SmallVec<[ToolCall; 2]>,
    /// For tool messages, the id of the call this message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Images attached to a user message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl Message {
    /// Creates a message with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            images: Vec::new(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates a user message carrying an inline image.
    pub fn user_with_image(content: impl Into<String>, image: ImageAttachment) -> Self {
        let mut message = Self::new(MessageRole::User, content);
        message.images.push(image);
        message
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Creates a tool-result message answering `tool_call_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `name` is empty.
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let tool_call_id = tool_call_id.into();
        let name = name.into();
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool messages must reference a tool_call_id");
        }
        if name.is_empty() {
            anyhow::bail!("Tool messages must carry the function name");
        }
        Ok(Self {
            role: MessageRole::Tool,
            content: content.into(),
            name: Some(name),
            tool_calls: SmallVec::new(),
            tool_call_id: Some(tool_call_id),
            images: Vec::new(),
        })
    }

    /// Attaches tool calls to an assistant message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl IntoIterator<Item = ToolCall>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!("Tool calls are only valid on assistant messages");
        }
        self.tool_calls = tool_calls.into_iter().collect();
        Ok(self)
    }

    /// Sets the author name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::tools::ToolCall;

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::User).unwrap(),
            "\"user\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Tool).unwrap(),
            "\"tool\""
        );
    }

    #[test]
    fn test_constructors_set_roles() {
        assert_eq!(Message::system("s").role, MessageRole::System);
        assert_eq!(Message::user("u").role, MessageRole::User);
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn test_tool_message_requires_linkage() {
        assert!(Message::tool("result", "", "get_time").is_err());
        assert!(Message::tool("result", "call_1", "").is_err());

        let msg = Message::tool("result", "call_1", "get_time").unwrap();
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("get_time"));
    }

    #[test]
    fn test_tool_calls_only_on_assistant() {
        let call = ToolCall::new("lookup", r#"{"q":"x"}"#);

        let err = Message::user("hi").with_tool_calls(vec![call.clone()]);
        assert!(err.is_err());

        let ok = Message::assistant("").with_tool_calls(vec![call]).unwrap();
        assert_eq!(ok.tool_calls.len(), 1);
    }

    #[test]
    fn test_empty_tool_calls_not_serialized() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("images"));
    }

    #[test]
    fn test_image_attachment_data_url() {
        let attachment = ImageAttachment::from_bytes("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(attachment.to_data_url(), "data:image/png;base64,iVBORw==");

        let msg = Message::user_with_image("What is in this image?", attachment);
        assert_eq!(msg.images.len(), 1);
    }
}
