// src/feed/adapter.rs
//! One adapter per source kind: subscribe, map every changed record, report
//! one upsert per record. Failures stay here (fail open per source).

use futures::StreamExt;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::feed::error::FeedError;
use crate::feed::source::{ChangeSource, ChangeType, SourceQuery};
use crate::feed::sources::map_record;
use crate::feed::types::{ActivityItem, SourceKind};

/// What an adapter tells the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Upsert(ActivityItem),
    /// A whole change notification has been reported (it may have been empty).
    BatchDone(SourceKind),
}

pub struct SourceAdapter {
    source: Arc<dyn ChangeSource>,
    query: SourceQuery,
}

impl SourceAdapter {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        kind: SourceKind,
        tenant_id: impl Into<String>,
        window: usize,
    ) -> Self {
        Self {
            source,
            query: SourceQuery::recent(kind, tenant_id, window),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.query.kind
    }

    /// Spawns the subscription task; events go to `on_upsert` in arrival order.
    pub fn start(self, on_upsert: mpsc::Sender<AdapterEvent>) -> AdapterHandle {
        let kind = self.query.kind;
        let task = tokio::spawn(run(self.source, self.query, on_upsert));
        AdapterHandle { kind, task }
    }
}

pub struct AdapterHandle {
    kind: SourceKind,
    task: JoinHandle<()>,
}

impl AdapterHandle {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Aborts the subscription task; dropping its stream unsubscribes.
    pub fn stop(self) {
        self.task.abort();
        tracing::debug!(target: "feed", source = self.kind.as_str(), "adapter stopped");
    }
}

async fn run(source: Arc<dyn ChangeSource>, query: SourceQuery, tx: mpsc::Sender<AdapterEvent>) {
    let kind = query.kind;
    let mut stream = match source.subscribe(query).await {
        Ok(s) => s,
        Err(e) => {
            report_source_error(kind, &e);
            return;
        }
    };

    while let Some(batch) = stream.next().await {
        let batch = match batch {
            Ok(b) => b,
            Err(e) => {
                report_source_error(kind, &e);
                return;
            }
        };

        for change in batch.changes {
            if change.change == ChangeType::Removed {
                tracing::trace!(target: "feed", source = kind.as_str(), id = %change.id, "removal ignored");
                continue;
            }
            match map_record(kind, &change.id, &change.data) {
                Ok(item) => {
                    if tx.send(AdapterEvent::Upsert(item)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "feed", error = %e, source = kind.as_str(), "record skipped");
                    counter!("feed_mapping_errors_total", "source" => kind.as_str()).increment(1);
                }
            }
        }

        if tx.send(AdapterEvent::BatchDone(kind)).await.is_err() {
            return;
        }
    }

    tracing::debug!(target: "feed", source = kind.as_str(), "change stream ended");
}

fn report_source_error(kind: SourceKind, e: &FeedError) {
    tracing::warn!(target: "feed", error = %e, source = kind.as_str(), "source unavailable; adapter silent");
    counter!("feed_source_errors_total", "source" => kind.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::source::{ChangeBatch, ChangeStream, RecordChange};
    use futures::stream;
    use serde_json::json;

    struct Scripted {
        batches: Vec<Result<ChangeBatch, FeedError>>,
    }

    #[async_trait::async_trait]
    impl ChangeSource for Scripted {
        async fn subscribe(&self, _query: SourceQuery) -> Result<ChangeStream, FeedError> {
            Ok(stream::iter(self.batches.clone()).boxed())
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn change(change: ChangeType, id: &str, data: serde_json::Value) -> RecordChange {
        RecordChange {
            change,
            id: id.into(),
            data,
        }
    }

    async fn collect(batches: Vec<Result<ChangeBatch, FeedError>>) -> Vec<AdapterEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        let adapter = SourceAdapter::new(Arc::new(Scripted { batches }), SourceKind::Fault, "t1", 50);
        let _handle = adapter.start(tx);
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn one_upsert_per_record_then_batch_marker() {
        let events = collect(vec![Ok(ChangeBatch {
            changes: vec![
                change(ChangeType::Added, "a", json!({ "title": "A" })),
                change(ChangeType::Removed, "gone", json!({})),
                change(ChangeType::Added, "bad", json!(7)),
                change(ChangeType::Modified, "b", json!({ "title": "B" })),
            ],
        })])
        .await;

        let ids: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Upsert(i) => Some(i.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(events.last(), Some(&AdapterEvent::BatchDone(SourceKind::Fault)));
    }

    #[tokio::test]
    async fn mid_stream_error_stops_emitting() {
        let events = collect(vec![
            Ok(ChangeBatch {
                changes: vec![change(ChangeType::Added, "a", json!({}))],
            }),
            Err(FeedError::unavailable(SourceKind::Fault, "connection reset")),
            Ok(ChangeBatch {
                changes: vec![change(ChangeType::Added, "never", json!({}))],
            }),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AdapterEvent::Upsert(i) if i.id == "a"));
    }
}
