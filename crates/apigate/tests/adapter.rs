//! End-to-end adapter behavior against mock identity and gateway endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use secrecy::SecretString;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apigate::adapter::{AdapterState, ModelAdapter};
use apigate::auth::TimeSource;
use apigate::config::{AuthMode, DirectConfig, GatewayConfig, GatewayCredentials};
use apigate::error::AdapterError;
use apigate::{GatewayClient, Message};

/// Clock starting at a fixed instant, advanced manually by tests.
#[derive(Debug)]
struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl FakeClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl TimeSource for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

fn gateway_config(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        credentials: GatewayCredentials {
            token_endpoint: format!("{}/oauth2/token", server.uri()).parse().unwrap(),
            client_id: "svc-client".to_string(),
            client_secret: SecretString::new("s3cret".to_string().into()),
            scope: "aoai/.default".to_string(),
        },
        endpoint: server.uri().parse().unwrap(),
        api_version: "2025-04-01-preview".to_string(),
        deployment: "gpt5".to_string(),
        deployment_mini: "gpt5mini".to_string(),
        deployment_nano: "gpt5nano".to_string(),
    }
}

async fn mount_token(server: &MockServer, expected_calls: u64, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-abc",
            "token_type": "Bearer",
            "expires_in": expires_in
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn completion_body() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt5",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "done"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn auth_rejection_body() -> serde_json::Value {
    serde_json::json!({"error": {"message": "token expired"}})
}

fn gateway_adapter(server: &MockServer) -> ModelAdapter {
    let client = GatewayClient::new(gateway_config(server)).unwrap();
    ModelAdapter::with_gateway_client(client, "gpt5")
}

#[tokio::test]
async fn cached_token_reused_across_sequential_requests() {
    let server = MockServer::start().await;
    mount_token(&server, 1, 3600).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(3)
        .mount(&server)
        .await;

    let adapter = gateway_adapter(&server);
    for _ in 0..3 {
        let (_, response) = adapter
            .send_completion(vec![Message::user("hi")], None, None)
            .await
            .unwrap();
        assert_eq!(response.message.content, "done");
    }
    assert_eq!(adapter.state(), AdapterState::CompanyAuth);
}

#[tokio::test]
async fn single_auth_rejection_resets_and_retries_once() {
    let server = MockServer::start().await;
    // One fetch for the first attempt, one after the reset.
    mount_token(&server, 2, 3600).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_rejection_body()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = gateway_adapter(&server);
    let (_, response) = adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap();

    assert_eq!(response.message.content, "done");
    assert_eq!(adapter.state(), AdapterState::CompanyAuth);
}

#[tokio::test]
async fn double_auth_rejection_is_fatal_and_sticky() {
    let server = MockServer::start().await;
    mount_token(&server, 2, 3600).await;

    // Exactly two gateway hits: the original attempt and the single retry.
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_rejection_body()))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = gateway_adapter(&server);
    let err = adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Auth(_)));
    assert_eq!(adapter.state(), AdapterState::Failed);

    // Subsequent calls fail fast without touching the gateway again.
    let err = adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Auth(_)));
}

#[tokio::test]
async fn rate_limit_passes_through_without_retry() {
    let server = MockServer::start().await;
    mount_token(&server, 1, 3600).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "9")
                .set_body_json(serde_json::json!({"error": {"message": "slow down"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = gateway_adapter(&server);
    let err = adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Other(_)));
    assert_eq!(adapter.state(), AdapterState::CompanyAuth);
}

#[tokio::test]
async fn missing_variable_falls_back_and_never_calls_identity_endpoint() {
    let identity = MockServer::start().await;
    let openai = MockServer::start().await;

    // The identity endpoint must never be contacted on the fallback path.
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&identity)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "fallback"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&openai)
        .await;

    // All gateway variables except the client secret.
    let vars: HashMap<String, String> = [
        ("OIDC_ENDPOINT", format!("{}/oauth2/token", identity.uri())),
        ("OIDC_CLIENT_ID", "svc-client".to_string()),
        ("OIDC_SCOPE", "aoai/.default".to_string()),
        ("APIGEE_ENDPOINT", identity.uri()),
        ("AZURE_AOAI_API_VERSION", "2025-04-01-preview".to_string()),
        ("AZURE_AOAI_DEPLOYMENT", "gpt5".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mode = AuthMode::from_vars(&vars).unwrap();
    assert!(!mode.is_configured());

    let direct = DirectConfig {
        api_key: Some(SecretString::new("sk-test".to_string().into())),
        base_url: openai.uri(),
    };
    let adapter = ModelAdapter::new(mode, direct, Some("gpt-4o".to_string())).unwrap();
    assert_eq!(adapter.state(), AdapterState::Unconfigured);

    let (_, response) = adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap();
    assert_eq!(response.message.content, "fallback");
}

#[tokio::test]
async fn concurrent_requests_racing_on_cold_cache_share_one_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "tok-abc",
                    "expires_in": 3600
                }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(8)
        .mount(&server)
        .await;

    let adapter = Arc::new(gateway_adapter(&server));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let adapter = Arc::clone(&adapter);
        handles.push(tokio::spawn(async move {
            adapter
                .send_completion(vec![Message::user("hi")], None, None)
                .await
        }));
    }

    for handle in handles {
        let (_, response) = handle.await.unwrap().unwrap();
        assert_eq!(response.message.content, "done");
    }
}

#[tokio::test]
async fn expired_token_refreshed_before_next_request() {
    let server = MockServer::start().await;
    // t=0 and t=61s: exactly two fetches for three requests.
    mount_token(&server, 2, 60).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(3)
        .mount(&server)
        .await;

    let clock = FakeClock::new();
    let client = GatewayClient::with_time_source(gateway_config(&server), clock.clone()).unwrap();
    let adapter = ModelAdapter::with_gateway_client(client, "gpt5");

    adapter
        .send_completion(vec![Message::user("first")], None, None)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(5));
    adapter
        .send_completion(vec![Message::user("second")], None, None)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(56));
    adapter
        .send_completion(vec![Message::user("third")], None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn streaming_rejection_resets_and_retries_once() {
    let server = MockServer::start().await;
    mount_token(&server, 2, 3600).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_rejection_body()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let sse_body = concat!(
        "data: {\"id\":\"s-1\",\"object\":\"chat.completion.chunk\",\"created\":1700000000,",
        "\"model\":\"gpt5\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",",
        "\"content\":\"streamed\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = gateway_adapter(&server);
    let (_, mut stream) = adapter
        .send_completion_stream(vec![Message::user("hi")], None, None)
        .await
        .unwrap();

    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        if let Some(delta) = chunk.unwrap().delta_content {
            content.push_str(&delta);
        }
    }
    assert_eq!(content, "streamed");
}

#[tokio::test]
async fn reasoning_defaults_reach_the_wire() {
    let server = MockServer::start().await;
    mount_token(&server, 1, 3600).await;

    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt5nano/chat/completions"))
        .and(body_string_contains("\"reasoning_effort\":\"low\""))
        .and(body_string_contains("\"max_completion_tokens\":800"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(gateway_config(&server)).unwrap();
    let adapter = ModelAdapter::with_gateway_client(client, "gpt5nano");
    adapter
        .send_completion(vec![Message::user("hi")], None, None)
        .await
        .unwrap();
}
