//! End-to-end tests for the gateway and the downstream services.
//!
//! Each test spawns real servers on ephemeral loopback ports and drives them
//! over HTTP, so routing, proxying, breaker behavior and header stamping are
//! all exercised through the same code paths the binaries use.
//!
//! Run with: `cargo test --test cluster_integration`

use dqa_backend::config::Settings;
use dqa_backend::gateway;
use dqa_backend::metrics::Metrics;
use dqa_backend::response::{error_json, BoxBody};
use dqa_backend::server::{self, GatewayState};
use dqa_backend::services::user;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// The global metrics recorder can only be installed once per process, so all
/// tests share one handle.
fn metrics() -> Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(Metrics::install).clone()
}

/// Reserve an ephemeral loopback port and return its address.
fn free_listen_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").to_string()
}

/// Poll until the server at `base_url` answers anything at all.
async fn wait_ready(client: &reqwest::Client, base_url: &str) {
    for _ in 0..50 {
        if client
            .get(format!("{}/health", base_url))
            .send()
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("server at {} never became ready", base_url);
}

fn test_settings(user_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings
        .services
        .insert("user".to_string(), user_url.to_string());
    // Nothing listens on port 1; connections are refused immediately.
    settings
        .services
        .insert("auth".to_string(), "http://127.0.0.1:1".to_string());
    settings
        .services
        .insert("data".to_string(), "http://127.0.0.1:1".to_string());
    settings.circuit_breaker.failure_threshold = 2;
    settings.proxy.timeout_secs = 2;
    settings.proxy.health_timeout_secs = 1;
    settings
}

async fn spawn_gateway(settings: Settings) -> String {
    let addr = free_listen_addr();
    let state = GatewayState::new(settings, metrics());
    let shutdown = Arc::new(Notify::new());

    tokio::spawn({
        let addr = addr.clone();
        async move {
            server::run_server("gateway", &addr, state, shutdown, gateway::handle_request).await
        }
    });

    let base_url = format!("http://{}", addr);
    wait_ready(&reqwest::Client::new(), &base_url).await;
    base_url
}

async fn spawn_user_service() -> String {
    let addr = free_listen_addr();
    let state = user::UserServiceState::new();
    let shutdown = Arc::new(Notify::new());

    tokio::spawn({
        let addr = addr.clone();
        async move { server::run_server("user-service", &addr, state, shutdown, user::handle).await }
    });

    let base_url = format!("http://{}", addr);
    wait_ready(&reqwest::Client::new(), &base_url).await;
    base_url
}

async fn failing_handler(
    _req: Request<Incoming>,
    hits: Arc<AtomicUsize>,
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    hits.fetch_add(1, Ordering::SeqCst);
    Ok(error_json(StatusCode::INTERNAL_SERVER_ERROR, "boom"))
}

/// A downstream that answers 500 to everything and counts arrivals.
async fn spawn_failing_service() -> (String, Arc<AtomicUsize>) {
    let addr = free_listen_addr();
    let hits = Arc::new(AtomicUsize::new(0));
    let shutdown = Arc::new(Notify::new());

    tokio::spawn({
        let addr = addr.clone();
        let hits = hits.clone();
        async move {
            server::run_server("failing-service", &addr, hits, shutdown, failing_handler).await
        }
    });

    let base_url = format!("http://{}", addr);
    wait_ready(&reqwest::Client::new(), &base_url).await;
    // The readiness probe itself hit the handler once.
    hits.store(0, Ordering::SeqCst);
    (base_url, hits)
}

#[tokio::test]
async fn unknown_route_returns_404_with_json_detail() {
    let gw = spawn_gateway(test_settings("http://127.0.0.1:1")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/definitely/not/a/route", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Not Found");
}

#[tokio::test]
async fn wrong_method_is_rejected_before_any_network_call() {
    let (svc, hits) = spawn_failing_service().await;
    let gw = spawn_gateway(test_settings(&svc)).await;
    let client = reqwest::Client::new();

    // Known path, unsupported verb for it.
    let resp = client
        .get(format!("{}/api/users", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Verb the gateway never forwards.
    let resp = client
        .patch(format!("{}/api/users/1", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn proxies_requests_through_to_the_user_service() {
    let svc = spawn_user_service().await;
    let gw = spawn_gateway(test_settings(&svc)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/users", gw))
        .json(&serde_json::json!({
            "username": "alice",
            "email": "alice@example.com",
            "full_name": "Alice Example",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["username"], "alice");

    let resp = client
        .get(format!("{}/api/users/1", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(fetched["email"], "alice@example.com");

    // A downstream 404 passes through with its status.
    let resp = client
        .get(format!("{}/api/users/999", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_service_is_404_before_any_network_call() {
    // The downstream exists and is reachable, but the gateway's registry no
    // longer knows the "user" service it resolves to.
    let (svc, hits) = spawn_failing_service().await;
    let mut settings = test_settings(&svc);
    settings.services.remove("user");
    let gw = spawn_gateway(settings).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/users/1", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Service 'user' not found");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures_and_short_circuits() {
    let (svc, hits) = spawn_failing_service().await;
    let gw = spawn_gateway(test_settings(&svc)).await;
    let client = reqwest::Client::new();

    // Threshold is 2: both calls reach the downstream and fail.
    for _ in 0..2 {
        let resp = client
            .get(format!("{}/api/users/1", gw))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // Breaker is open now: rejected locally, downstream untouched.
    let resp = client
        .get(format!("{}/api/users/1", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("circuit breaker open"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connect_failures_surface_as_service_unavailable() {
    let gw = spawn_gateway(test_settings("http://127.0.0.1:1")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/users/1", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Cannot connect to user service");
}

#[tokio::test]
async fn health_aggregation_reports_per_service_status() {
    let svc = spawn_user_service().await;
    let gw = spawn_gateway(test_settings(&svc)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health/services", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["gateway"], "healthy");
    assert_eq!(body["services"]["user"]["status"], "healthy");
    assert_eq!(body["services"]["auth"]["status"], "unreachable");
    assert_eq!(body["services"]["data"]["status"], "unreachable");
}

#[tokio::test]
async fn responses_carry_cors_and_request_id_headers() {
    let gw = spawn_gateway(test_settings("http://127.0.0.1:1")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", gw))
        .header("x-request-id", "test-req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "test-req-42");

    // Preflights are answered locally.
    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{}/api/users", gw))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(resp.headers().get("access-control-allow-methods").is_some());
}
