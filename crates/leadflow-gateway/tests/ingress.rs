// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for POST /v1/leads against a temp store and mock scorer.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::RETRY_AFTER},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use leadflow_config::model::{GatewayConfig, LeadflowConfig};
use leadflow_connector::dispatch::DEFAULT_SOURCE;
use leadflow_connector::{Adapters, Runtime};
use leadflow_core::{LeadStatus, LeadStore};
use leadflow_gateway::{GatewayState, build_router};
use leadflow_test_utils::{
    MemoryCredentialStore, MockConnector, MockNotifier, MockScorer, TestStore,
};

struct App {
    ts: TestStore,
    scorer: Arc<MockScorer>,
    _runtime: Runtime,
    router: Router,
}

async fn app(gateway: GatewayConfig) -> App {
    let ts = TestStore::new().await.unwrap();
    let scorer = Arc::new(MockScorer::new(77, "budget confirmed"));
    let runtime = Runtime::start(
        &LeadflowConfig::default(),
        Adapters {
            store: ts.store.clone(),
            credentials: Arc::new(MemoryCredentialStore::new()),
            connector: Arc::new(MockConnector::new()),
            scorer: scorer.clone(),
            notifier: Arc::new(MockNotifier::new()),
        },
    );
    let state = GatewayState::new(runtime.store().clone(), runtime.dispatcher().clone(), &gateway);
    App {
        ts,
        scorer,
        router: build_router(state),
        _runtime: runtime,
    }
}

fn post(uri: &str, api_key: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &App, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, retry_after, serde_json::from_slice(&bytes).unwrap())
}

// ---- Test 1: a valid submission is scored and stored ----

#[tokio::test]
async fn test_valid_lead_is_created() {
    let app = app(GatewayConfig::default()).await;
    let body = json!({
        "name": "Ana Souza",
        "email": "ana@example.com",
        "phone": "+55 11 98888-7777",
        "company": "",
        "budget": "5k"
    });

    let (status, _, json) = send(&app, post("/v1/leads", Some("key-acme"), &body.to_string())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);

    let leads = app.ts.store.list_leads(&TestStore::tenant_id()).await.unwrap();
    assert_eq!(leads.len(), 1);
    let lead = &leads[0];
    assert_eq!(json["leadId"], lead.id.0);
    assert_eq!(lead.name, "Ana Souza");
    assert_eq!(lead.source, DEFAULT_SOURCE);
    assert_eq!(DEFAULT_SOURCE, "Webhook");
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.score, 77);
    assert!(lead.company.is_none());
    assert!(lead.instance_id.is_none());

    // Unknown fields reach the scorer and the stored payload.
    let stored: Value = serde_json::from_str(&lead.raw_payload).unwrap();
    assert_eq!(stored["budget"], "5k");
    let calls = app.scorer.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0["budget"], "5k");
}

// ---- Test 2: source precedence is query, then body, then default ----

#[tokio::test]
async fn test_source_precedence() {
    let app = app(GatewayConfig::default()).await;
    let body = r#"{"name":"Bo","source":"Landing page"}"#;

    let (status, _, _) = send(&app, post("/v1/leads", Some("key-acme"), body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, _) = send(
        &app,
        post("/v1/leads?source=Typeform", Some("key-acme"), body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut sources: Vec<String> = app
        .ts
        .store
        .list_leads(&TestStore::tenant_id())
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.source)
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["Landing page", "Typeform"]);
}

// ---- Test 3: API key checks ----

#[tokio::test]
async fn test_missing_and_unknown_keys() {
    let app = app(GatewayConfig::default()).await;

    let (status, _, json) = send(&app, post("/v1/leads", None, r#"{"name":"A"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, json!({"success": false, "error": "Missing API Key"}));

    let (status, _, json) = send(&app, post("/v1/leads", Some("nope"), r#"{"name":"A"}"#)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Invalid API Key");

    let (status, _, _) = send(
        &app,
        post("/v1/leads?apiKey=key-acme", None, r#"{"name":"A"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ---- Test 4: validation failures list every bad field ----

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    let app = app(GatewayConfig::default()).await;

    let (status, _, json) = send(
        &app,
        post("/v1/leads", Some("key-acme"), r#"{"email":"nope","city":3}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Validation Error");
    let fields: Vec<&str> = json["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "email", "city"]);

    let (status, _, json) = send(&app, post("/v1/leads", Some("key-acme"), "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"][0]["field"], "body");

    assert!(app.ts.store.list_leads(&TestStore::tenant_id()).await.unwrap().is_empty());
    assert_eq!(app.scorer.call_count().await, 0);
}

// ---- Test 5: rate limit applies before authentication ----

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let app = app(GatewayConfig {
        rate_limit_requests: 2,
        ..GatewayConfig::default()
    })
    .await;

    for _ in 0..2 {
        let (status, _, _) = send(&app, post("/v1/leads", None, "{}")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, retry_after, json) =
        send(&app, post("/v1/leads", Some("key-acme"), r#"{"name":"A"}"#)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "Too many requests");
    let secs: u64 = retry_after.unwrap().parse().unwrap();
    assert!((1..=60).contains(&secs));
}

// ---- Test 6: health needs no key ----

#[tokio::test]
async fn test_health_is_public() {
    let app = app(GatewayConfig::default()).await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
