// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /records/{kind}
// - GET /feed (server-sent events)

use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use activity_feed::api::{self, AppState};
use activity_feed::FeedConfig;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app() -> (AppState, Router) {
    let state = AppState::new(FeedConfig::default());
    (state.clone(), api::router(state))
}

fn post_record(kind: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/records/{kind}"))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /records")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (_, app) = test_app();
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "OK");
}

#[tokio::test]
async fn api_put_record_is_accepted_and_stored() {
    let (state, app) = test_app();
    let req = post_record(
        "fault",
        json!({ "tenant_id": "acme", "id": "f1", "data": { "title": "Inverter trip" } }),
    );

    let resp = app.oneshot(req).await.expect("oneshot /records");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["key"], "fault_f1");
    assert_eq!(state.store.len("faults"), 1);
}

#[tokio::test]
async fn api_put_record_rejects_unknown_kind_and_missing_ids() {
    let (_, app) = test_app();
    let resp = app
        .clone()
        .oneshot(post_record("invoices", json!({ "tenant_id": "acme", "id": "1" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(post_record("fault", json!({ "tenant_id": " ", "id": "1" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_feed_streams_filtered_snapshots() {
    let (state, app) = test_app();
    state.store.put_record(
        activity_feed::SourceKind::Fault,
        "acme",
        "mine",
        json!({ "title": "North inverter", "site_id": "north" }),
    );
    state.store.put_record(
        activity_feed::SourceKind::Fault,
        "acme",
        "theirs",
        json!({ "title": "South inverter", "site_id": "south" }),
    );

    let req = Request::builder()
        .uri("/feed?tenant=acme&role=technician&sites=north&limit=10")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.expect("oneshot /feed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream")));

    let mut frames = resp.into_body().into_data_stream();
    let text = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let chunk = frames.next().await.expect("stream open").expect("chunk");
            let s = String::from_utf8(chunk.to_vec()).unwrap();
            if s.contains("North inverter") {
                return s;
            }
        }
    })
    .await
    .expect("feed event delivered");

    assert!(text.contains("event: feed"));
    assert!(!text.contains("South inverter"));
}

#[tokio::test]
async fn api_feed_requires_tenant_and_role() {
    let (_, app) = test_app();
    let req = Request::builder().uri("/feed?role=owner").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
