//! Demo that opens a restricted feed over an in-memory store, writes a few
//! records across sources and prints every delivered view.

use std::sync::Arc;
use std::time::Duration;

use activity_feed::feed::config::load_config_default;
use activity_feed::{FeedSession, MemoryStore, Role, SourceKind, Viewer};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let config = Arc::new(load_config_default()?);
    let store = Arc::new(MemoryStore::new());
    store.put_record(
        SourceKind::Fault,
        "acme",
        "f1",
        json!({ "title": "Inverter 2 offline", "site_id": "north", "created_at": "2025-06-01T08:00:00Z" }),
    );

    let viewer = Viewer::new(Role::Technician)
        .with_sites(["north"])
        .with_user_id("tech-17");
    let session = FeedSession::new(store.clone(), "acme", viewer, Some(10), config);
    session.on_update(|items| {
        println!("--- {} item(s)", items.len());
        for it in items {
            println!("{}  {:<24} {}", it.occurred_at.to_rfc3339(), it.key().to_string(), it.title);
        }
    })?;

    let writes = [
        (SourceKind::StockMovement, "m1", json!({ "movement_type": "out", "site_id": "north", "moved_at": "2025-06-01T09:00:00Z" })),
        (SourceKind::ShiftHandoff, "h1", json!({ "status": "urgent", "created_at": "2025-06-01T09:30:00Z" })),
        (SourceKind::Fault, "f2", json!({ "title": "Fence alarm", "site_id": "south", "created_at": "2025-06-01T10:00:00Z" })),
        (SourceKind::Fault, "f1", json!({ "title": "Inverter 2 restored", "site_id": "north", "created_at": "2025-06-01T08:00:00Z" })),
    ];
    for (kind, id, data) in writes {
        tokio::time::sleep(Duration::from_millis(300)).await;
        store.put_record(kind, "acme", id, data);
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    session.close();
    println!("feed-demo done ({} deliveries)", session.stats().deliveries);
    Ok(())
}
