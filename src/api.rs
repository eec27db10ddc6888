// src/api.rs
//! HTTP surface over an in-process store: record writes in, live feed out
//! as server-sent events.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{future, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tower_http::cors::CorsLayer;

use crate::feed::config::FeedConfig;
use crate::feed::memory::MemoryStore;
use crate::feed::session::FeedSession;
use crate::feed::types::{ActivityItem, CompositeKey, SourceKind};
use crate::feed::visibility::{Role, Viewer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub config: Arc<FeedConfig>,
}

impl AppState {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/records/{kind}", post(put_record))
        .route("/feed", get(feed))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct PutRecordReq {
    tenant_id: String,
    id: String,
    #[serde(default)]
    data: Value,
}

async fn put_record(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<PutRecordReq>,
) -> Response {
    let Some(kind) = SourceKind::parse(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown source kind: {kind}") })),
        )
            .into_response();
    };
    if body.tenant_id.trim().is_empty() || body.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tenant_id and id are required" })),
        )
            .into_response();
    }

    let data = if body.data.is_null() { json!({}) } else { body.data };
    state.store.put_record(kind, &body.tenant_id, &body.id, data);
    let key = CompositeKey::new(kind, body.id);
    (StatusCode::ACCEPTED, Json(json!({ "key": key.to_string() }))).into_response()
}

#[derive(Deserialize)]
struct FeedParams {
    tenant: String,
    role: String,
    /// Comma separated.
    #[serde(default)]
    sites: Option<String>,
    #[serde(default)]
    plants: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn feed(
    State(state): State<AppState>,
    Query(p): Query<FeedParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    let mut viewer = Viewer::new(Role::parse(&p.role))
        .with_sites(split_csv(p.sites))
        .with_plants(split_csv(p.plants));
    if let Some(user) = p.user {
        viewer = viewer.with_user_id(user);
    }

    let session = FeedSession::new(
        state.store.clone(),
        p.tenant,
        viewer,
        p.limit,
        state.config.clone(),
    );

    // latest snapshot only; a slow client skips intermediate views
    let (tx, rx) = watch::channel(None::<Vec<ActivityItem>>);
    session
        .on_update(move |items| {
            tx.send_replace(Some(items));
        })
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let stream = WatchStream::new(rx)
        .filter_map(future::ready)
        .map(move |items| {
            // the session lives exactly as long as the client stream
            let _session = &session;
            Event::default().event("feed").json_data(items)
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
