use thiserror::Error;

use apigate_client::AuthError;
use apigate_common::config::ConfigError;

/// Errors surfaced by the model adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// A required configuration value was present but malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication failed fatally: the identity endpoint rejected the
    /// credentials, or the gateway rejected the token twice.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Any other failure (rate limit, network, upstream error), passed
    /// through unmodified.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
