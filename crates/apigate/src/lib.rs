//! # apigate
//!
//! Company-authenticated chat completions for an Azure OpenAI deployment
//! behind an enterprise gateway.
//!
//! The crate wires three pieces together:
//!
//! 1. a token provider acquiring OAuth2 client-credentials bearer tokens,
//! 2. a gateway client injecting the cached bearer into completion calls,
//! 3. the [`ModelAdapter`], which picks the gateway path when the
//!    environment is fully configured and falls back to a direct
//!    OpenAI-compatible client otherwise.
//!
//! ## Quick Start
//!
//! ```no_run
//! use apigate::{Message, ModelAdapter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let adapter = ModelAdapter::from_env(None)?;
//!
//! let messages = vec![
//!     Message::system("You are a helpful assistant."),
//!     Message::user("Summarize the last release."),
//! ];
//!
//! let (fingerprint, response) = adapter.send_completion(messages, None, None).await?;
//! println!("[{fingerprint}] {}", response.message.content);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;

pub use apigate_client::*;
pub use apigate_common::*;

pub use adapter::{AdapterState, ModelAdapter};
pub use error::AdapterError;
