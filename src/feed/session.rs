// src/feed/session.rs
//! Feed session lifecycle: `Created → Running → Closed`.
//!
//! ```text
//! adapter ×5 ──mpsc──► aggregator actor ──watch(sorted snapshot)──► delivery task ──► callback
//!                        (single writer)                            (filter, cap, gate)
//! ```
//!
//! The watch channel only keeps the newest snapshot, so a slow callback makes
//! the delivery task skip intermediate views instead of blocking adapters.

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::feed::adapter::{AdapterEvent, AdapterHandle, SourceAdapter};
use crate::feed::aggregator::{AggregatorCore, UpsertOutcome};
use crate::feed::config::FeedConfig;
use crate::feed::error::FeedError;
use crate::feed::source::ChangeSource;
use crate::feed::types::{ActivityItem, SourceKind};
use crate::feed::visibility::{self, Viewer, VisibilityPolicy};
use crate::feed::{anon_hash, ensure_metrics_described};

pub type UpdateCallback = Box<dyn FnMut(Vec<ActivityItem>) + Send + 'static>;

type Snapshot = Arc<Vec<ActivityItem>>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Session whose callback is running on this thread, 0 if none.
    static DELIVERING: Cell<u64> = const { Cell::new(0) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    /// Entries in the merged state after the last recompute.
    pub entries: usize,
    pub deliveries: u64,
}

#[derive(Default)]
struct Counters {
    entries: AtomicUsize,
    deliveries: AtomicU64,
}

enum Lifecycle {
    Created,
    Running {
        adapters: Vec<AdapterHandle>,
        aggregator: JoinHandle<()>,
        delivery: JoinHandle<()>,
    },
    Closed,
}

pub struct FeedSession {
    id: u64,
    source: Arc<dyn ChangeSource>,
    tenant_id: String,
    viewer: Viewer,
    limit: usize,
    config: Arc<FeedConfig>,
    lifecycle: Mutex<Lifecycle>,
    gate: Arc<Mutex<Option<UpdateCallback>>>,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl FeedSession {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        tenant_id: impl Into<String>,
        viewer: Viewer,
        limit: Option<usize>,
        config: Arc<FeedConfig>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            source,
            tenant_id: tenant_id.into(),
            limit: config.effective_limit(limit),
            viewer,
            config,
            lifecycle: Mutex::new(Lifecycle::Created),
            gate: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        match &*self.lifecycle.lock() {
            Lifecycle::Created => SessionState::Created,
            Lifecycle::Running { .. } => SessionState::Running,
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// Output cap after clamping.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            entries: self.counters.entries.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
        }
    }

    /// Registers the subscriber and starts all five adapters.
    ///
    /// Each delivered vector is a full replacement of the previous one. Must
    /// be called from within a Tokio runtime.
    pub fn on_update<F>(&self, callback: F) -> Result<(), FeedError>
    where
        F: FnMut(Vec<ActivityItem>) + Send + 'static,
    {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Running { .. } => return Err(FeedError::AlreadyRunning),
            Lifecycle::Closed => return Err(FeedError::Closed),
            Lifecycle::Created => {}
        }

        *self.gate.lock() = Some(Box::new(callback));

        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity);
        let (view_tx, view_rx) = watch::channel(Snapshot::default());

        let adapters = SourceKind::ALL
            .into_iter()
            .map(|kind| {
                SourceAdapter::new(
                    self.source.clone(),
                    kind,
                    self.tenant_id.clone(),
                    self.config.per_source_cap,
                )
                .start(events_tx.clone())
            })
            .collect();
        drop(events_tx);

        let aggregator = tokio::spawn(run_aggregator(
            events_rx,
            self.config.per_source_cap,
            view_tx,
            self.counters.clone(),
        ));
        let delivery = tokio::spawn(run_delivery(Delivery {
            session_id: self.id,
            view_rx,
            viewer: self.viewer.clone(),
            policy: self.config.visibility.clone(),
            limit: self.limit,
            gate: self.gate.clone(),
            closed: self.closed.clone(),
            counters: self.counters.clone(),
        }));

        *lifecycle = Lifecycle::Running {
            adapters,
            aggregator,
            delivery,
        };
        gauge!("feed_sessions_active").increment(1.0);
        tracing::info!(
            target: "feed",
            session = self.id,
            tenant = %self.tenant_id,
            role = %self.viewer.role,
            viewer = %self.viewer.user_id.as_deref().map(anon_hash).unwrap_or_default(),
            limit = self.limit,
            source = self.source.name(),
            "feed session started"
        );
        Ok(())
    }

    /// Stops every adapter once; no callback runs after this returns.
    /// Calling it again is a no-op.
    ///
    /// Blocks until a callback already running on another thread returns, so
    /// a callback that never returns makes `close` (and `Drop`) hang. Called
    /// from inside the callback it returns at once.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Closed);

        // Waits out a delivery in progress, unless we are inside it.
        if DELIVERING.with(Cell::get) != self.id {
            let _ = self.gate.lock().take();
        }

        if let Lifecycle::Running {
            adapters,
            aggregator,
            delivery,
        } = previous
        {
            for adapter in adapters {
                adapter.stop();
            }
            aggregator.abort();
            delivery.abort();
            gauge!("feed_sessions_active").decrement(1.0);
            tracing::info!(
                target: "feed",
                session = self.id,
                deliveries = self.counters.deliveries.load(Ordering::Relaxed),
                "feed session closed"
            );
        }
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_aggregator(
    mut events: mpsc::Receiver<AdapterEvent>,
    per_source_cap: usize,
    view_tx: watch::Sender<Snapshot>,
    counters: Arc<Counters>,
) {
    let mut core = AggregatorCore::new(per_source_cap);
    let mut published = false;

    while let Some(first) = events.recv().await {
        let mut changed = apply(&mut core, first);
        // coalesce whatever is already queued into one recompute
        while let Ok(next) = events.try_recv() {
            changed |= apply(&mut core, next);
        }
        if !changed && published {
            continue;
        }

        let t0 = Instant::now();
        let snapshot = core.snapshot();
        histogram!("feed_recompute_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counters.entries.store(core.len(), Ordering::Relaxed);

        if view_tx.send(Arc::new(snapshot)).is_err() {
            break;
        }
        published = true;
    }
}

fn apply(core: &mut AggregatorCore, event: AdapterEvent) -> bool {
    match event {
        AdapterEvent::Upsert(item) => {
            let kind = item.source_kind;
            counter!("feed_upserts_total", "source" => kind.as_str()).increment(1);
            if core.upsert(item) == UpsertOutcome::InsertedWithEviction {
                counter!("feed_evictions_total", "source" => kind.as_str()).increment(1);
            }
            true
        }
        AdapterEvent::BatchDone(_) => false,
    }
}

struct Delivery {
    session_id: u64,
    view_rx: watch::Receiver<Snapshot>,
    viewer: Viewer,
    policy: VisibilityPolicy,
    limit: usize,
    gate: Arc<Mutex<Option<UpdateCallback>>>,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

async fn run_delivery(mut d: Delivery) {
    while d.view_rx.changed().await.is_ok() {
        let snapshot = d.view_rx.borrow_and_update().clone();

        let visible = visibility::visible_window(&snapshot, &d.viewer, &d.policy, d.limit);

        let mut gate = d.gate.lock();
        if d.closed.load(Ordering::SeqCst) {
            break;
        }
        let Some(callback) = gate.as_mut() else {
            break;
        };
        DELIVERING.with(|c| c.set(d.session_id));
        callback(visible);
        DELIVERING.with(|c| c.set(0));
        drop(gate);

        d.counters.deliveries.fetch_add(1, Ordering::Relaxed);
        counter!("feed_deliveries_total").increment(1);
    }
}
