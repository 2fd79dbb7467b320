//! Environment-driven configuration.
//!
//! The gateway path activates only when every required variable is present;
//! anything less yields [`AuthMode::Unconfigured`] and the caller falls back
//! to the direct API-key path. Parsing is pure: constructors take a
//! key/value map and [`AuthMode::from_env`] is a thin wrapper, so tests
//! never have to mutate the process environment.

use std::collections::HashMap;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::features::ModelTier;

/// Identity endpoint issuing client-credentials tokens.
pub const ENV_OIDC_ENDPOINT: &str = "OIDC_ENDPOINT";
/// OAuth2 client identifier.
pub const ENV_OIDC_CLIENT_ID: &str = "OIDC_CLIENT_ID";
/// OAuth2 client secret.
pub const ENV_OIDC_CLIENT_SECRET: &str = "OIDC_CLIENT_SECRET";
/// OAuth2 scope string.
pub const ENV_OIDC_SCOPE: &str = "OIDC_SCOPE";
/// Gateway base URL fronting the model deployment.
pub const ENV_APIGEE_ENDPOINT: &str = "APIGEE_ENDPOINT";
/// Azure OpenAI API version.
pub const ENV_AOAI_API_VERSION: &str = "AZURE_AOAI_API_VERSION";
/// Standard-tier deployment name.
pub const ENV_AOAI_DEPLOYMENT: &str = "AZURE_AOAI_DEPLOYMENT";
/// Mini-tier deployment name (optional).
pub const ENV_AOAI_DEPLOYMENT_MINI: &str = "AZURE_AOAI_DEPLOYMENT_MINI";
/// Nano-tier deployment name (optional).
pub const ENV_AOAI_DEPLOYMENT_NANO: &str = "AZURE_AOAI_DEPLOYMENT_NANO";

/// API key for the direct (non-gateway) path.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Base URL override for the direct path.
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";

/// The variables that must all be present for the gateway path to activate.
pub const REQUIRED_VARS: [&str; 7] = [
    ENV_OIDC_ENDPOINT,
    ENV_OIDC_CLIENT_ID,
    ENV_OIDC_CLIENT_SECRET,
    ENV_OIDC_SCOPE,
    ENV_APIGEE_ENDPOINT,
    ENV_AOAI_API_VERSION,
    ENV_AOAI_DEPLOYMENT,
];

const DEFAULT_DEPLOYMENT_MINI: &str = "gpt5mini";
const DEFAULT_DEPLOYMENT_NANO: &str = "gpt5nano";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A malformed configuration value.
///
/// Raised only when the gateway path was attempted (all required variables
/// present) and one of them does not parse; missing variables are not an
/// error, they select the fallback path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable that must hold a URL does not parse as one.
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        /// The offending variable name.
        var: &'static str,
        /// The underlying parse failure.
        source: url::ParseError,
    },
}

/// Static OAuth2 client-credentials material.
///
/// The secret is wrapped in [`SecretString`], so `Debug` output and logs
/// never contain it.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    /// Identity endpoint for the client-credentials grant.
    pub token_endpoint: Url,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
    /// Scope requested with each token.
    pub scope: String,
}

/// Complete gateway-path configuration: credentials plus routing.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// OAuth2 client-credentials material.
    pub credentials: GatewayCredentials,
    /// Gateway base URL.
    pub endpoint: Url,
    /// Azure OpenAI API version sent as the `api-version` query parameter.
    pub api_version: String,
    /// Standard-tier deployment name.
    pub deployment: String,
    /// Mini-tier deployment name.
    pub deployment_mini: String,
    /// Nano-tier deployment name.
    pub deployment_nano: String,
}

impl GatewayConfig {
    /// The configured deployment name for a tier.
    #[must_use]
    pub fn deployment_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Mini => &self.deployment_mini,
            ModelTier::Nano => &self.deployment_nano,
            _ => &self.deployment,
        }
    }
}

/// The configuration outcome decided once at startup.
///
/// `Unconfigured` is permanent for the process lifetime; there is no
/// retransition to the gateway path after construction.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AuthMode {
    /// Gateway credentials absent; use the direct API-key path.
    Unconfigured,
    /// Gateway credentials present and well formed.
    Configured(Box<GatewayConfig>),
}

impl AuthMode {
    /// Decides the auth mode from an explicit key/value map.
    ///
    /// Any required variable that is absent or empty selects
    /// [`AuthMode::Unconfigured`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when all required variables are present but
    /// one of the URLs does not parse.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let Some(present) = required_values(vars) else {
            return Ok(Self::Unconfigured);
        };
        let [token_endpoint, client_id, client_secret, scope, endpoint, api_version, deployment] =
            present;

        let token_endpoint = Url::parse(token_endpoint).map_err(|source| {
            ConfigError::InvalidUrl {
                var: ENV_OIDC_ENDPOINT,
                source,
            }
        })?;
        let endpoint = Url::parse(endpoint).map_err(|source| ConfigError::InvalidUrl {
            var: ENV_APIGEE_ENDPOINT,
            source,
        })?;

        Ok(Self::Configured(Box::new(GatewayConfig {
            credentials: GatewayCredentials {
                token_endpoint,
                client_id: client_id.to_string(),
                client_secret: SecretString::new(client_secret.into()),
                scope: scope.to_string(),
            },
            endpoint,
            api_version: api_version.to_string(),
            deployment: deployment.to_string(),
            deployment_mini: non_empty(vars, ENV_AOAI_DEPLOYMENT_MINI)
                .unwrap_or(DEFAULT_DEPLOYMENT_MINI)
                .to_string(),
            deployment_nano: non_empty(vars, ENV_AOAI_DEPLOYMENT_NANO)
                .unwrap_or(DEFAULT_DEPLOYMENT_NANO)
                .to_string(),
        })))
    }

    /// Decides the auth mode from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when all required variables are present but
    /// one of the URLs does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Whether the gateway path is active.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }

    /// The required variables absent or empty in the given map.
    ///
    /// Useful for verbose startup logging when falling back.
    #[must_use]
    pub fn missing_vars(vars: &HashMap<String, String>) -> Vec<&'static str> {
        REQUIRED_VARS
            .iter()
            .filter(|var| non_empty(vars, var).is_none())
            .copied()
            .collect()
    }
}

/// Configuration for the direct (non-gateway) path.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    /// Bearer API key, when one is set.
    pub api_key: Option<SecretString>,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
}

impl DirectConfig {
    /// Reads the direct-path settings from an explicit key/value map.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        Self {
            api_key: non_empty(vars, ENV_OPENAI_API_KEY)
                .map(|key| SecretString::new(key.to_string().into())),
            base_url: non_empty(vars, ENV_OPENAI_BASE_URL)
                .unwrap_or(DEFAULT_OPENAI_BASE_URL)
                .to_string(),
        }
    }

    /// Reads the direct-path settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn required_values(vars: &HashMap<String, String>) -> Option<[&str; 7]> {
    let mut values = [""; 7];
    for (slot, var) in values.iter_mut().zip(REQUIRED_VARS) {
        *slot = non_empty(vars, var)?;
    }
    Some(values)
}
