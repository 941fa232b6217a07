//! End-to-end tests for the session event channel
//!
//! Opens a real SSE connection, registers subscriptions against it, and
//! injects plugin events through the broker.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use devhub_api::{create_router, AppState};
use devhub_auth::{OriginPolicy, TokenAuthority};
use devhub_gateway::{EventBroker, PluginRegistry, RegistryListener, RequestRouter, RouterConfig};

const TEST_ORIGIN: &str = "http://app.test.example.com";

struct TestGateway {
    base_url: String,
    client: reqwest::Client,
    broker: Arc<EventBroker>,
    authority: Arc<TokenAuthority>,
    server: JoinHandle<()>,
}

impl TestGateway {
    async fn start() -> Self {
        let policy = Arc::new(OriginPolicy::new(false));
        let authority = Arc::new(TokenAuthority::default());
        let registry = Arc::new(PluginRegistry::new());
        let router = Arc::new(RequestRouter::new(RouterConfig::default()));
        let broker = Arc::new(EventBroker::new(Arc::clone(&authority)));
        registry.add_listener(Arc::clone(&broker) as Arc<dyn RegistryListener>);

        let state = AppState::new(registry, router, Arc::clone(&broker), Arc::clone(&authority), policy);
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            broker,
            authority,
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn issue_token(&self, capabilities: &[&str]) -> String {
        let client_id = self.authority.register_client(TEST_ORIGIN);
        let caps: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
        self.authority
            .issue_or_extend(&client_id, &caps)
            .unwrap()
            .token
    }

    /// POST a subscription, retrying until the SSE handler has attached the
    /// session (the GET and the POST race at startup)
    async fn subscribe(&self, session_id: &str, body: Value) {
        for _ in 0..50 {
            let resp = self
                .client
                .post(self.url(&format!("/gateway/v1/events/{session_id}/subscriptions")))
                .json(&body)
                .send()
                .await
                .unwrap();
            if resp.status() == 201 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("subscription was never accepted");
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Read SSE chunks until a `data:` payload satisfies the predicate
async fn read_event(resp: reqwest::Response, want: impl Fn(&Value) -> bool) -> Value {
    let mut stream = resp.bytes_stream();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut buffer = String::new();
    loop {
        let chunk = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("timed out waiting for SSE event")
            .expect("SSE stream ended")
            .expect("SSE stream errored");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        for line in buffer.clone().lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if let Ok(value) = serde_json::from_str::<Value>(data) {
                    if want(&value) {
                        return value;
                    }
                }
            }
        }
    }
}

#[tokio::test]
async fn subscribed_session_receives_its_event() {
    let gw = TestGateway::start().await;
    let token = gw.issue_token(&["battery"]);

    let resp = gw
        .client
        .get(gw.url("/gateway/v1/events/session-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    gw.subscribe(
        "session-1",
        json!({ "capability": "battery", "access_token": token }),
    )
    .await;

    gw.broker
        .on_plugin_event("p1", "battery", Some("level"), json!({ "level": 42 }));

    let event = read_event(resp, |v| v["capability"] == "battery").await;
    assert_eq!(event["session_id"], "session-1");
    assert_eq!(event["service_id"], "p1");
    assert_eq!(event["payload"]["level"], 42);
    // Tagged with the session's own credential
    assert_eq!(event["access_token"], token.as_str());
}

#[tokio::test]
async fn subscription_with_bad_token_is_rejected() {
    let gw = TestGateway::start().await;

    let _resp = gw
        .client
        .get(gw.url("/gateway/v1/events/session-2"))
        .send()
        .await
        .unwrap();

    // Wait for attachment, then expect a clean 403
    let mut status = None;
    for _ in 0..50 {
        let resp = gw
            .client
            .post(gw.url("/gateway/v1/events/session-2/subscriptions"))
            .json(&json!({ "capability": "battery", "access_token": "bogus" }))
            .send()
            .await
            .unwrap();
        if resp.status() != 400 {
            status = Some(resp.status());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, Some(reqwest::StatusCode::FORBIDDEN));
}

#[tokio::test]
async fn plugin_bound_subscription_ignores_other_plugins() {
    let gw = TestGateway::start().await;
    let token = gw.issue_token(&["battery"]);

    let resp = gw
        .client
        .get(gw.url("/gateway/v1/events/session-3"))
        .send()
        .await
        .unwrap();

    gw.subscribe(
        "session-3",
        json!({ "capability": "battery", "plugin_id": "p1", "access_token": token }),
    )
    .await;

    // An event from a different plugin must not be misdelivered; the
    // following p1 event is the first thing the session sees.
    gw.broker
        .on_plugin_event("p2", "battery", Some("level"), json!({ "from": "p2" }));
    gw.broker
        .on_plugin_event("p1", "battery", Some("level"), json!({ "from": "p1" }));

    let event = read_event(resp, |v| v["capability"] == "battery").await;
    assert_eq!(event["service_id"], "p1");
    assert_eq!(event["payload"]["from"], "p1");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let gw = TestGateway::start().await;
    let token = gw.issue_token(&["battery", "echo"]);

    let resp = gw
        .client
        .get(gw.url("/gateway/v1/events/session-4"))
        .send()
        .await
        .unwrap();

    gw.subscribe(
        "session-4",
        json!({ "capability": "battery", "access_token": token }),
    )
    .await;
    gw.subscribe(
        "session-4",
        json!({ "capability": "echo", "access_token": token }),
    )
    .await;

    let del = gw
        .client
        .delete(gw.url("/gateway/v1/events/session-4/subscriptions"))
        .json(&json!({ "capability": "battery" }))
        .send()
        .await
        .unwrap();
    assert_eq!(del.status(), 204);

    // The battery event is skipped; the echo event arrives first
    gw.broker
        .on_plugin_event("p1", "battery", None, json!({ "n": 1 }));
    gw.broker.on_plugin_event("p1", "echo", None, json!({ "n": 2 }));

    let event = read_event(resp, |v| v["capability"] != "").await;
    assert_eq!(event["capability"], "echo");
}
