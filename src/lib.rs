// src/lib.rs
// Public library surface for the service binary, the demo and integration tests.

pub mod api;
pub mod feed;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::feed::config::FeedConfig;
pub use crate::feed::error::FeedError;
pub use crate::feed::memory::MemoryStore;
pub use crate::feed::open_feed;
pub use crate::feed::session::{FeedSession, FeedStats, SessionState};
pub use crate::feed::source::{ChangeSource, SourceQuery};
pub use crate::feed::types::{ActivityItem, CompositeKey, Scope, SourceKind};
pub use crate::feed::visibility::{Role, RolePolicy, Viewer, VisibilityPolicy};
