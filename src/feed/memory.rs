// src/feed/memory.rs
//! In-process `ChangeSource`: tenant-scoped collections with a live change
//! broadcast. Backs the demo binary, the HTTP service and the tests, and can
//! be told to fail per collection.

use futures::{future, stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::feed::error::FeedError;
use crate::feed::source::{ChangeBatch, ChangeSource, ChangeStream, ChangeType, RecordChange, SourceQuery};
use crate::feed::sources::{tenant_of, time_field};
use crate::feed::types::SourceKind;

const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum StoreEvent {
    Change {
        collection: String,
        tenant: Option<String>,
        change: RecordChange,
    },
    Break {
        collection: String,
        reason: String,
    },
}

#[derive(Default)]
struct Collections {
    records: HashMap<String, BTreeMap<String, Value>>,
    refused: HashSet<String>,
}

pub struct MemoryStore {
    inner: Mutex<Collections>,
    events: broadcast::Sender<StoreEvent>,
    active: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// `capacity` bounds how far a slow subscriber may lag before it skips.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Collections::default()),
            events,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Writes a raw record; subscribers of its tenant see Added or Modified.
    pub fn put(&self, collection: &str, id: &str, data: Value) {
        let mut inner = self.inner.lock();
        let tenant = tenant_of(&data);
        let previous = inner
            .records
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data.clone());
        let change = RecordChange {
            change: if previous.is_some() {
                ChangeType::Modified
            } else {
                ChangeType::Added
            },
            id: id.to_string(),
            data,
        };
        // no receivers is fine
        let _ = self.events.send(StoreEvent::Change {
            collection: collection.to_string(),
            tenant,
            change,
        });
    }

    /// Convenience: stamps `company_id` and writes into the kind's collection.
    pub fn put_record(&self, kind: SourceKind, tenant_id: &str, id: &str, mut data: Value) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("company_id".to_string(), Value::String(tenant_id.to_string()));
        }
        self.put(kind.collection(), id, data);
    }

    pub fn remove(&self, collection: &str, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(data) = inner.records.get_mut(collection).and_then(|c| c.remove(id)) else {
            return false;
        };
        let _ = self.events.send(StoreEvent::Change {
            collection: collection.to_string(),
            tenant: tenant_of(&data),
            change: RecordChange {
                change: ChangeType::Removed,
                id: id.to_string(),
                data,
            },
        });
        true
    }

    /// New subscriptions to `collection` fail until `accept_subscriptions`.
    pub fn refuse_subscriptions(&self, collection: &str) {
        self.inner.lock().refused.insert(collection.to_string());
    }

    pub fn accept_subscriptions(&self, collection: &str) {
        self.inner.lock().refused.remove(collection);
    }

    /// Every live stream on `collection` yields an error and goes quiet.
    pub fn break_streams(&self, collection: &str, reason: &str) {
        let _ = self.events.send(StoreEvent::Break {
            collection: collection.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Live change streams not yet dropped.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .records
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    // Newest-first window of one tenant's records.
    fn initial_window(records: Option<&BTreeMap<String, Value>>, query: &SourceQuery) -> ChangeBatch {
        let mut rows: Vec<(&String, &Value)> = records
            .into_iter()
            .flatten()
            .filter(|(_, v)| tenant_of(v).as_deref() == Some(query.tenant_id.as_str()))
            .collect();
        // same fallback chain the mapping uses, so the window matches `occurred_at`
        let fields = query.kind.time_fields();
        rows.sort_by_cached_key(|(id, v)| {
            let at = v.as_object().map(|f| time_field(f, fields)).unwrap_or_default();
            (std::cmp::Reverse(at), (*id).clone())
        });
        ChangeBatch {
            changes: rows
                .into_iter()
                .take(query.limit)
                .map(|(id, v)| RecordChange {
                    change: ChangeType::Added,
                    id: id.clone(),
                    data: v.clone(),
                })
                .collect(),
        }
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ChangeSource for MemoryStore {
    async fn subscribe(&self, query: SourceQuery) -> Result<ChangeStream, FeedError> {
        // snapshot and receiver are taken under one lock so no write slips between them
        let (initial, rx) = {
            let inner = self.inner.lock();
            if inner.refused.contains(query.collection) {
                return Err(FeedError::unavailable(
                    query.kind,
                    format!("subscription to {} refused", query.collection),
                ));
            }
            let rx = self.events.subscribe();
            (Self::initial_window(inner.records.get(query.collection), &query), rx)
        };

        let guard = ActiveGuard::new(self.active.clone());
        let kind = query.kind;
        let collection = query.collection;
        let tenant = query.tenant_id;

        let live = BroadcastStream::new(rx).filter_map(move |msg| {
            let out = match msg {
                Ok(StoreEvent::Change {
                    collection: c,
                    tenant: t,
                    change,
                }) if c == collection && t.as_deref() == Some(tenant.as_str()) => {
                    Some(Ok(ChangeBatch {
                        changes: vec![change],
                    }))
                }
                Ok(StoreEvent::Break { collection: c, reason }) if c == collection => {
                    Some(Err(FeedError::unavailable(kind, reason)))
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(target: "feed", source = kind.as_str(), skipped = n, "memory subscriber lagged");
                    None
                }
            };
            future::ready(out)
        });

        let stream = stream::once(future::ready(Ok(initial)))
            .chain(live)
            .map(move |batch| {
                let _alive = &guard;
                batch
            });
        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
