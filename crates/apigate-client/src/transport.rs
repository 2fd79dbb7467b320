//! Shared HTTP plumbing for the gateway and direct clients.
//!
//! Both clients speak the same chat-completions protocol; this module owns
//! request execution, status-to-error mapping, and SSE stream setup so the
//! clients only differ in URL shape and how they obtain their bearer.

use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, warn};
use reqwest_eventsource::{Event, EventSource};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::{ExposeSecret, SecretString};

use apigate_common::client::RetryConfig;

use crate::ChatStream;
use crate::error::{ClientError, ErrorResponse};
use crate::wire::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, convert_chunk};

/// Builds the middleware-wrapped client used for non-streaming requests and
/// the bare client used for SSE.
///
/// `RetryAfterMiddleware` is added before `RetryTransientMiddleware` so that
/// `Retry-After` headers are respected before exponential backoff kicks in.
/// With the default `RetryConfig` the transient policy allows zero retries,
/// leaving transient failures to surface unmodified.
pub(crate) fn build_clients(
    retry: &RetryConfig,
    timeout: Option<Duration>,
) -> Result<(ClientWithMiddleware, reqwest::Client), ClientError> {
    let builder = reqwest::Client::builder();
    let reqwest_client = match timeout {
        Some(timeout) => builder.timeout(timeout).build()?,
        None => builder.build()?,
    };

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(retry.initial_delay, retry.max_delay)
        .build_with_max_retries(retry.max_retries);

    let client = reqwest_middleware::ClientBuilder::new(reqwest_client.clone())
        .with(RetryAfterMiddleware::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    Ok((client, reqwest_client))
}

/// Executes a non-streaming completion request and maps error statuses.
pub(crate) async fn execute_chat(
    client: &ClientWithMiddleware,
    url: &str,
    bearer: &SecretString,
    body: &ChatCompletionRequest,
) -> Result<ChatCompletionResponse, ClientError> {
    reqwest::Url::parse(url)
        .map_err(|e| ClientError::Configuration(format!("Invalid URL '{url}': {e}")))?;

    let response = client
        .post(url)
        .header(
            "Authorization",
            format!("Bearer {}", bearer.expose_secret()),
        )
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(body)?)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let error_text = response.text().await.map_err(|e| {
            warn!("Failed to read error response body: {e}");
            ClientError::Network(e)
        })?;
        let message = extract_error_message(&error_text);
        error!(
            "Completion request failed with status {}: {message}",
            status.as_u16()
        );
        return Err(status_error(status.as_u16(), message, retry_after));
    }

    let response_text = response.text().await?;
    let parsed: ChatCompletionResponse = serde_json::from_str(&response_text)?;
    Ok(parsed)
}

/// Opens an SSE stream for a streaming completion request.
///
/// The event source is driven until the connection is open, so an error
/// status (including an auth rejection) surfaces here rather than as the
/// first stream item. Automatic EventSource reconnects are disabled; retry
/// policy is owned by the caller.
pub(crate) async fn open_chat_stream(
    builder: reqwest::RequestBuilder,
) -> Result<ChatStream, ClientError> {
    let mut event_source = EventSource::new(builder)
        .map_err(|e| ClientError::Configuration(format!("Failed to create event source: {e}")))?;
    event_source.set_retry_policy(Box::new(NoRetryPolicy));

    // Early messages would only arrive if the server skipped the open
    // handshake; keep them rather than dropping data.
    let mut pending = Vec::new();
    match event_source.next().await {
        Some(Ok(Event::Open)) => debug!("Stream connection opened"),
        Some(Ok(Event::Message(message))) => pending.push(message),
        Some(Err(e)) => return Err(map_stream_open_error(e).await),
        None => {
            return Err(ClientError::InvalidResponse(
                "stream closed before opening".to_string(),
            ));
        }
    }

    let pending_chunks: Vec<anyhow::Result<apigate_common::client::ChatChunk>> = pending
        .into_iter()
        .filter_map(|message| convert_sse_message(&message.data))
        .collect();

    let stream = event_source.filter_map(|event| async move {
        match event {
            Ok(Event::Open) => None,
            Ok(Event::Message(message)) => convert_sse_message(&message.data),
            Err(e) => match e {
                reqwest_eventsource::Error::StreamEnded => {
                    debug!("Stream ended");
                    None
                }
                other => {
                    error!("Stream error: {other}");
                    Some(Err(ClientError::EventSource(other).into()))
                }
            },
        }
    });

    Ok(Box::pin(futures::stream::iter(pending_chunks).chain(stream)))
}

/// Parses one SSE data payload; `[DONE]` terminates the stream.
fn convert_sse_message(data: &str) -> Option<anyhow::Result<apigate_common::client::ChatChunk>> {
    if data == "[DONE]" {
        debug!("Stream completed with [DONE] marker");
        return None;
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => Some(Ok(convert_chunk(&chunk))),
        Err(e) => {
            warn!("Failed to parse streaming chunk: {e}");
            Some(Err(ClientError::Serialization(e).into()))
        }
    }
}

/// Maps an error raised while opening the SSE connection.
async fn map_stream_open_error(error: reqwest_eventsource::Error) -> ClientError {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let retry_after = parse_retry_after(response.headers());
            let message = extract_error_message(&response.text().await.unwrap_or_default());
            status_error(status.as_u16(), message, retry_after)
        }
        reqwest_eventsource::Error::Transport(e) => ClientError::Network(e),
        other => ClientError::EventSource(other),
    }
}

/// Maps an error HTTP status to the client error taxonomy.
fn status_error(status: u16, message: String, retry_after: Option<Duration>) -> ClientError {
    match status {
        401 | 403 => ClientError::AuthRejected { status, message },
        429 => ClientError::RateLimit { retry_after },
        _ => ClientError::Upstream { status, message },
    }
}

/// Extracts the message from a structured API error body, falling back to
/// the raw text.
fn extract_error_message(error_text: &str) -> String {
    serde_json::from_str::<ErrorResponse>(error_text).map_or_else(
        |_| error_text.to_string(),
        |parsed| parsed.error.message,
    )
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Retry policy that never reconnects; stream retries are owned above.
struct NoRetryPolicy;

impl reqwest_eventsource::retry::RetryPolicy for NoRetryPolicy {
    fn retry(
        &self,
        _error: &reqwest_eventsource::Error,
        _last_retry: Option<(usize, Duration)>,
    ) -> Option<Duration> {
        None
    }

    fn set_reconnection_time(&mut self, _duration: Duration) {}
}
