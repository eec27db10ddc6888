// src/feed/source.rs
//! Inbound seam: the managed backend's "subscribe to the recent records of
//! tenant X, newest first, capped at N" primitive.

use futures::stream::BoxStream;
use serde_json::Value;

use crate::feed::error::FeedError;
use crate::feed::types::SourceKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub kind: SourceKind,
    pub collection: &'static str,
    pub tenant_id: String,
    pub order_by: &'static str,
    pub limit: usize,
}

impl SourceQuery {
    pub fn recent(kind: SourceKind, tenant_id: impl Into<String>, limit: usize) -> Self {
        Self {
            kind,
            collection: kind.collection(),
            tenant_id: tenant_id.into(),
            order_by: kind.order_field(),
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub change: ChangeType,
    pub id: String,
    pub data: Value,
}

/// One change notification: the initial snapshot or an incremental update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub changes: Vec<RecordChange>,
}

/// Live change notifications; dropping the stream unsubscribes.
pub type ChangeStream = BoxStream<'static, Result<ChangeBatch, FeedError>>;

#[async_trait::async_trait]
pub trait ChangeSource: Send + Sync {
    async fn subscribe(&self, query: SourceQuery) -> Result<ChangeStream, FeedError>;

    fn name(&self) -> &'static str;
}
