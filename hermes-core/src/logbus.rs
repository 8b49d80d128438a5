//! Log batcher, real-time event bus, and in-memory metrics (§4.10).
//!
//! [`LogBatcher`] only knows how to queue and flush; actually persisting a
//! batch goes through [`LogWriter`], implemented by `hermes-db`. [`LogBus`]
//! ties the batcher, [`EventBus`], and [`Metrics`] together and is the single
//! type the rest of `hermes-core` reports outcomes to, via the proxy's
//! [`crate::proxy::OutcomeSink`] and the catalog's [`crate::catalog::SyncLogSink`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermes_types::Event;
use serde_json::json;
use tokio::sync::{mpsc, Notify};
use tokio::time::interval;

use crate::catalog::{SyncLogEvent, SyncLogSink};
use crate::proxy::{Outcome, OutcomeSink};

const QUEUE_CAPACITY: usize = 2000;
const DEFAULT_BATCH_SIZE: usize = 50;
/// Default interval the background flush loop runs on (§4.10).
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const SUBSCRIBER_CAPACITY: usize = 100;
const LATENCY_RING_CAPACITY: usize = 200;
/// Heartbeat cadence for SSE subscribers with no traffic to report.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// One request-log row, pre-persistence (id is assigned by the writer).
#[derive(Debug, Clone)]
pub struct RequestLogEvent {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Requested model name, if applicable.
    pub model: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Request duration in milliseconds.
    pub duration_ms: i64,
    /// Caller IP address, if known.
    pub ip: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Persistence seam for a flushed batch, implemented by `hermes-db`.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Persist one flushed batch as two multi-row inserts in one transaction.
    async fn write_batch(&self, request_logs: Vec<RequestLogEvent>, sync_logs: Vec<SyncLogEvent>);
}

struct BatchQueues {
    request_logs: VecDeque<RequestLogEvent>,
    sync_logs: VecDeque<SyncLogEvent>,
}

impl BatchQueues {
    fn len(&self) -> usize {
        self.request_logs.len() + self.sync_logs.len()
    }
}

/// Bounded in-memory log queue, flushed on a timer or as soon as it fills a batch.
pub struct LogBatcher {
    writer: Arc<dyn LogWriter>,
    queues: Mutex<BatchQueues>,
    capacity: usize,
    batch_size: usize,
    flush_notify: Notify,
}

impl LogBatcher {
    /// Build a batcher with the spec's documented defaults (capacity 2000, batch size 50).
    #[must_use]
    pub fn new(writer: Arc<dyn LogWriter>) -> Self {
        Self::with_config(writer, QUEUE_CAPACITY, DEFAULT_BATCH_SIZE)
    }

    /// Build a batcher with explicit capacity/batch-size, for tests and tuning.
    #[must_use]
    pub fn with_config(writer: Arc<dyn LogWriter>, capacity: usize, batch_size: usize) -> Self {
        Self {
            writer,
            queues: Mutex::new(BatchQueues {
                request_logs: VecDeque::new(),
                sync_logs: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            batch_size: batch_size.max(1),
            flush_notify: Notify::new(),
        }
    }

    /// Queue a request-log row, evicting the oldest entry if the queue is full.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn add_request_log(&self, event: RequestLogEvent) {
        let due = {
            let mut queues = self.queues.lock().expect("mutex poisoned");
            if queues.len() >= self.capacity {
                queues.request_logs.pop_front();
            }
            queues.request_logs.push_back(event);
            queues.len() >= self.batch_size
        };
        if due {
            self.flush_notify.notify_one();
        }
    }

    /// Queue a sync-log row, evicting the oldest entry if the queue is full.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn add_sync_log(&self, event: SyncLogEvent) {
        let due = {
            let mut queues = self.queues.lock().expect("mutex poisoned");
            if queues.len() >= self.capacity {
                queues.sync_logs.pop_front();
            }
            queues.sync_logs.push_back(event);
            queues.len() >= self.batch_size
        };
        if due {
            self.flush_notify.notify_one();
        }
    }

    /// Drain both queues and hand them to the writer as one flush.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub async fn flush(&self) {
        let (request_logs, sync_logs) = {
            let mut queues = self.queues.lock().expect("mutex poisoned");
            (
                std::mem::take(&mut queues.request_logs).into_iter().collect::<Vec<_>>(),
                std::mem::take(&mut queues.sync_logs).into_iter().collect::<Vec<_>>(),
            )
        };
        if request_logs.is_empty() && sync_logs.is_empty() {
            return;
        }
        self.writer.write_batch(request_logs, sync_logs).await;
    }

    /// Runs forever: flushes on `flush_interval`, or immediately whenever a
    /// batch fills. Intended to be spawned once at startup.
    pub async fn run(self: Arc<Self>, flush_interval: Duration) {
        let mut ticker = interval(flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                () = self.flush_notify.notified() => self.flush().await,
            }
        }
    }
}

/// Bounded per-subscriber broadcast bus backing `GET /admin/events`.
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Build an empty event bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber with a bounded mailbox.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().expect("mutex poisoned").push(tx);
        rx
    }

    /// Broadcast one event to every live subscriber. A full subscriber
    /// mailbox silently drops the event rather than blocking; a closed one
    /// is dropped from the subscriber set.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn broadcast(&self, kind: &str, data: serde_json::Value) {
        let event = Event::new(kind, data);
        let mut subscribers = self.subscribers.lock().expect("mutex poisoned");
        subscribers.retain(|tx| !matches!(tx.try_send(event.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }
}

/// Point-in-time metrics snapshot, for `/health` and the admin surface.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Total non-success proxy outcomes observed.
    pub upstream_errors: u64,
    /// Requests currently in flight.
    pub active_requests: u64,
    /// Total requests observed since startup.
    pub total_requests: u64,
    /// 50th percentile latency in milliseconds.
    pub p50: u64,
    /// 90th percentile latency in milliseconds.
    pub p90: u64,
    /// 99th percentile latency in milliseconds.
    pub p99: u64,
}

/// In-memory request counters and a bounded latency ring.
pub struct Metrics {
    upstream_errors: AtomicU64,
    active_requests: AtomicI64,
    total_requests: AtomicU64,
    latencies: Mutex<VecDeque<u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Build a zeroed metrics tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            upstream_errors: AtomicU64::new(0),
            active_requests: AtomicI64::new(0),
            total_requests: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_RING_CAPACITY)),
        }
    }

    /// Mark one request as started.
    pub fn request_started(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark one request as finished (success or failure).
    pub fn request_finished(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record one proxy outcome's latency and, on failure, bump the error counter.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_outcome(&self, success: bool, duration_ms: u64) {
        if !success {
            self.upstream_errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut ring = self.latencies.lock().expect("mutex poisoned");
        if ring.len() >= LATENCY_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(duration_ms);
    }

    /// Snapshot counters and compute p50/p90/p99 via sorted-index truncation
    /// (not interpolation).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let ring = self.latencies.lock().expect("mutex poisoned");
        let mut sorted: Vec<u64> = ring.iter().copied().collect();
        sorted.sort_unstable();
        let percentile = |p: f64| -> u64 {
            if sorted.is_empty() {
                return 0;
            }
            let idx = (((sorted.len() - 1) as f64) * p).floor() as usize;
            sorted[idx]
        };
        MetricsSnapshot {
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed).max(0) as u64,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            p50: percentile(0.50),
            p90: percentile(0.90),
            p99: percentile(0.99),
        }
    }
}

/// Ties the batcher, event bus, and metrics together as the one sink the
/// rest of `hermes-core` reports into.
pub struct LogBus {
    /// The flush-batched log queue.
    pub batcher: Arc<LogBatcher>,
    /// The live SSE broadcast bus.
    pub events: Arc<EventBus>,
    /// In-memory counters and latency ring.
    pub metrics: Arc<Metrics>,
}

impl LogBus {
    /// Build a log bus over the given persistence seam.
    #[must_use]
    pub fn new(writer: Arc<dyn LogWriter>) -> Self {
        Self {
            batcher: Arc::new(LogBatcher::new(writer)),
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Record and broadcast one inbound HTTP request log row.
    pub fn record_request_log(&self, event: RequestLogEvent) {
        self.events.broadcast(
            "request",
            json!({
                "method": event.method,
                "path": event.path,
                "model": event.model,
                "status": event.status,
                "duration_ms": event.duration_ms,
            }),
        );
        self.batcher.add_request_log(event);
    }
}

impl OutcomeSink for LogBus {
    fn record(&self, outcome: Outcome) {
        self.metrics.record_outcome(outcome.success, outcome.duration_ms);
        self.events.broadcast(
            "metrics_update",
            json!({
                "provider_id": outcome.provider_id,
                "provider": outcome.provider_name,
                "model": outcome.model,
                "success": outcome.success,
                "status": outcome.status,
                "duration_ms": outcome.duration_ms,
                "error": outcome.error,
            }),
        );
    }
}

impl SyncLogSink for LogBus {
    fn record(&self, event: SyncLogEvent) {
        self.events.broadcast(
            "sync",
            json!({
                "provider_id": event.provider_id,
                "provider": event.provider_name,
                "model": event.model,
                "result": format!("{:?}", event.result).to_lowercase(),
                "message": event.message,
            }),
        );
        self.batcher.add_sync_log(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_types::SyncResult;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct RecordingWriter {
        batches: StdMutex<Vec<(Vec<RequestLogEvent>, Vec<SyncLogEvent>)>>,
    }

    #[async_trait]
    impl LogWriter for RecordingWriter {
        async fn write_batch(&self, request_logs: Vec<RequestLogEvent>, sync_logs: Vec<SyncLogEvent>) {
            self.batches.lock().unwrap().push((request_logs, sync_logs));
        }
    }

    fn sample_request_log() -> RequestLogEvent {
        RequestLogEvent {
            method: "POST".to_string(),
            path: "/v1/chat/completions".to_string(),
            model: Some("gpt-4o".to_string()),
            status: 200,
            duration_ms: 42,
            ip: Some("127.0.0.1".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn flush_drains_both_queues_in_one_batch() {
        let writer = Arc::new(RecordingWriter {
            batches: StdMutex::new(Vec::new()),
        });
        let batcher = LogBatcher::with_config(writer.clone(), 2000, 50);
        batcher.add_request_log(sample_request_log());
        batcher.add_sync_log(SyncLogEvent {
            provider_id: Uuid::new_v4(),
            provider_name: "acme".to_string(),
            model: "gpt-4o-mini".to_string(),
            result: SyncResult::Success,
            message: "verified".to_string(),
        });
        batcher.flush().await;
        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0.len(), 1);
        assert_eq!(batches[0].1.len(), 1);
    }

    #[tokio::test]
    async fn flush_is_a_noop_when_empty() {
        let writer = Arc::new(RecordingWriter {
            batches: StdMutex::new(Vec::new()),
        });
        let batcher = LogBatcher::new(writer.clone());
        batcher.flush().await;
        assert!(writer.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oldest_entry_is_evicted_once_capacity_is_reached() {
        let writer = Arc::new(RecordingWriter {
            batches: StdMutex::new(Vec::new()),
        });
        let batcher = LogBatcher::with_config(writer, 2, 100);
        for i in 0..3u16 {
            let mut log = sample_request_log();
            log.status = 200 + i;
            batcher.add_request_log(log);
        }
        let queues = batcher.queues.lock().unwrap();
        assert_eq!(queues.request_logs.len(), 2);
        assert_eq!(queues.request_logs.front().unwrap().status, 201);
    }

    #[test]
    fn metrics_percentiles_use_sorted_index_truncation() {
        let metrics = Metrics::new();
        for ms in [10, 20, 30, 40, 100] {
            metrics.record_outcome(true, ms);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.p50, 30);
        assert_eq!(snap.p99, 100);
    }

    #[test]
    fn metrics_count_only_failures_as_upstream_errors() {
        let metrics = Metrics::new();
        metrics.record_outcome(true, 10);
        metrics.record_outcome(false, 20);
        let snap = metrics.snapshot();
        assert_eq!(snap.upstream_errors, 1);
        assert_eq!(snap.total_requests, 0); // request_started/finished are separate from outcomes
    }

    #[tokio::test]
    async fn event_bus_drops_closed_subscribers() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.broadcast("request", json!({}));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 0);
    }
}
