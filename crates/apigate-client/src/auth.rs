//! OAuth2 client-credentials token acquisition and caching.
//!
//! [`TokenProvider`] owns the single logical token for the process. It
//! fetches a bearer token from the identity endpoint on first use, caches it
//! until expiry minus a safety margin, and supports forced invalidation when
//! the gateway rejects a token. Acquisition is guarded by an async mutex
//! held across the fetch, so concurrent requests racing on an expired token
//! produce exactly one identity-endpoint call and all observe the same
//! refreshed token.
//!
//! The provider makes a single attempt per acquisition; retry policy belongs
//! to the caller.
//!
//! # Example
//!
//! ```no_run
//! use apigate_client::auth::TokenProvider;
//! use apigate_common::config::GatewayCredentials;
//! use secrecy::SecretString;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let credentials = GatewayCredentials {
//!     token_endpoint: "https://login.example.com/oauth2/token".parse()?,
//!     client_id: "svc-client".to_string(),
//!     client_secret: SecretString::new("s3cret".to_string().into()),
//!     scope: "aoai/.default".to_string(),
//! };
//!
//! let provider = TokenProvider::new(credentials)?;
//! let bearer = provider.bearer().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use apigate_common::config::GatewayCredentials;

/// Safety margin subtracted from the advertised token lifetime.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

/// Bound on a single identity-endpoint call.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while acquiring a bearer token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The identity endpoint could not be reached (DNS, connect, timeout).
    #[error("Identity endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The identity endpoint rejected the credentials or the request.
    #[error("Identity endpoint rejected the request ({status}): {message}")]
    Rejected {
        /// The rejecting status code.
        status: u16,
        /// The response body, as returned.
        message: String,
    },

    /// The token response parsed but carried no usable access token.
    #[error("Token response is missing an access token")]
    MissingAccessToken,

    /// The token response body was not valid JSON.
    #[error("Token response could not be parsed: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// The gateway rejected the bearer twice in a row; the session is dead.
    #[error("Gateway rejected the bearer token again after re-authentication")]
    RejectedByGateway,
}

/// Source of monotonic time, injectable so tests can drive token expiry
/// without sleeping.
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

struct CachedToken {
    bearer: SecretString,
    expires_at: Instant,
}

/// Acquires and caches a client-credentials bearer token.
///
/// At most one valid token exists per provider. Tokens never persist across
/// process restarts.
pub struct TokenProvider {
    http: reqwest::Client,
    credentials: GatewayCredentials,
    clock: Arc<dyn TimeSource>,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("token_endpoint", &self.credentials.token_endpoint.as_str())
            .field("client_id", &self.credentials.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Creates a provider using the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(credentials: GatewayCredentials) -> Result<Self, AuthError> {
        Self::with_time_source(credentials, Arc::new(SystemClock))
    }

    /// Creates a provider reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_time_source(
        credentials: GatewayCredentials,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(ACQUIRE_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            clock,
            cached: Mutex::new(None),
        })
    }

    /// Returns the current bearer token, fetching a fresh one when the cache
    /// is empty or the cached token has passed its safety deadline.
    ///
    /// The cache lock is held across the fetch: concurrent callers racing on
    /// an expired token wait for one acquisition and share its result.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the identity endpoint is unreachable,
    /// rejects the credentials, or answers without an access token.
    pub async fn bearer(&self) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && self.clock.now() < token.expires_at
        {
            return Ok(token.bearer.clone());
        }

        debug!(
            "acquiring access token from {} (client_id={})",
            self.credentials.token_endpoint, self.credentials.client_id
        );
        let fresh = self.fetch().await?;
        let bearer = fresh.bearer.clone();
        *cached = Some(fresh);
        Ok(bearer)
    }

    /// Discards the cached token; the next [`bearer`](Self::bearer) call
    /// re-authenticates.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if cached.take().is_some() {
            debug!("cached access token invalidated");
        }
    }

    /// Single-attempt client-credentials grant against the identity endpoint.
    async fn fetch(&self) -> Result<CachedToken, AuthError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            (
                "client_secret",
                self.credentials.client_secret.expose_secret(),
            ),
            ("scope", self.credentials.scope.as_str()),
        ];

        let response = self
            .http
            .post(self.credentials.token_endpoint.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("identity endpoint rejected token request with {status}");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingAccessToken)?;

        let advertised = parsed.expires_in.map_or(DEFAULT_LIFETIME, Duration::from_secs);
        let usable = advertised.saturating_sub(EXPIRY_MARGIN);
        debug!(
            "access token acquired, usable for {}s (advertised {}s)",
            usable.as_secs(),
            advertised.as_secs()
        );

        Ok(CachedToken {
            bearer: SecretString::new(access_token.into()),
            expires_at: self.clock.now() + usable,
        })
    }
}
