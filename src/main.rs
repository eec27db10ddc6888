//! Activity feed service: binary entrypoint.
//! Boots the Axum HTTP server over an in-process record store, wiring the
//! feed routes and the Prometheus endpoint.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use activity_feed::api::{self, AppState};
use activity_feed::feed::config::load_config_default;
use activity_feed::metrics::Metrics;

/// Compact logs by default, JSON lines when FEED_LOG_JSON=1.
/// `try_init` because the hosting runtime may already own a subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("activity_feed=info,feed=info,warn"));
    let json = std::env::var("FEED_LOG_JSON").ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = load_config_default().context("loading activity feed config")?;
    let metrics = Metrics::init(config.per_source_cap)?;
    tracing::info!(
        per_source_cap = config.per_source_cap,
        max_limit = config.max_limit,
        "activity feed config loaded"
    );

    let router = api::router(AppState::new(config)).merge(metrics.router());

    Ok(router.into())
}
