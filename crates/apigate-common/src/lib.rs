//! # apigate-common
//!
//! Common types for gateway-authenticated chat completion clients.
//!
//! This crate provides the foundational types shared by the token provider,
//! the gateway client, and the model adapter:
//! - Chat messages and completion request/response types
//! - Configuration loaded from the process environment (with an explicit
//!   configured/unconfigured split)
//! - Model tier and reasoning-effort abstractions
//! - Tool/function calling support
//!
//! ## Example
//!
//! ```
//! use apigate_common::{ChatRequest, Message, ReasoningEffort};
//!
//! let request = ChatRequest::new(vec![Message::user("Summarize this diff")])
//!     .with_model("gpt5mini")
//!     .with_temperature(0.2)
//!     .with_reasoning_effort(ReasoningEffort::Medium);
//! assert!(request.validate().is_ok());
//! ```

/// Chat message types and roles.
pub mod chat;
/// Completion request/response types and client-side configuration.
pub mod client;
/// Environment-driven configuration with the configured/unconfigured split.
pub mod config;
/// Model tier and reasoning-effort abstractions.
pub mod features;
/// Tool calling types.
pub mod tools;

pub use chat::{ImageAttachment, Message, MessageRole};
pub use client::{
    ChatChunk, ChatRequest, ChatResponse, Fingerprint, FinishReason, RetryConfig, ToolChoice,
    Usage,
};
pub use config::{AuthMode, ConfigError, DirectConfig, GatewayConfig, GatewayCredentials};
pub use features::{ModelTier, ReasoningEffort};
pub use tools::{Function, FunctionCall, Tool, ToolCall};
