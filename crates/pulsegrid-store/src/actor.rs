//! Single-owner actor backend.
//!
//! One worker task exclusively owns the [`Snapshot`]; it is the only code
//! path permitted to mutate it. Callers hold a cloneable [`MemoryStore`]
//! handle, send a request through a bounded inbox, and wait on a private
//! reply slot. Requests are serviced strictly one at a time in dequeue
//! order, which is the only ordering guarantee made.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use pulse_core::error::MetricError;
use pulse_core::storage::MetricStorage;
use pulse_core::types::{MetricRecord, MetricValue, Snapshot};

use crate::file::SnapshotSink;

/// Inbox capacity; senders back-pressure when the owner falls this far
/// behind.
const INBOX_CAPACITY: usize = 1024;

/// Reply deadline for liveness probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Requests serviced by the owning worker.
enum Request {
    Apply {
        id: String,
        value: MetricValue,
        reply: oneshot::Sender<()>,
    },
    /// All records land inside one owner turn, so a batch is atomic with
    /// respect to concurrent snapshot reads.
    ApplyBatch {
        records: Vec<MetricRecord>,
        reply: oneshot::Sender<()>,
    },
    ReadGauge {
        id: String,
        reply: oneshot::Sender<Option<f64>>,
    },
    ReadCounter {
        id: String,
        reply: oneshot::Sender<Option<u64>>,
    },
    ReadAll {
        reply: oneshot::Sender<Snapshot>,
    },
    Ping {
        reply: oneshot::Sender<()>,
    },
}

/// Exclusive owner of the snapshot state.
struct Worker {
    inbox: mpsc::Receiver<Request>,
    data: Snapshot,
    sink: Option<SnapshotSink>,
}

impl Worker {
    /// Drain the inbox until the shutdown signal fires.
    async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("storage worker started");
        let mut ticker = self
            .sink
            .as_ref()
            .and_then(|s| s.timed)
            .map(|every| time::interval_at(Instant::now() + every, every));
        loop {
            tokio::select! {
                Some(request) = self.inbox.recv() => self.handle(request),
                _ = next_tick(&mut ticker) => self.persist("timer"),
                _ = shutdown.changed() => break,
            }
        }
        // Final write so mutations since the last tick survive shutdown.
        self.persist("shutdown");
        info!("storage worker stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Apply { id, value, reply } => {
                self.apply(&id, value);
                self.persist_synchronous();
                let _ = reply.send(());
            }
            Request::ApplyBatch { records, reply } => {
                for record in &records {
                    self.apply(&record.id, record.value);
                }
                self.persist_synchronous();
                let _ = reply.send(());
            }
            Request::ReadGauge { id, reply } => {
                let _ = reply.send(self.data.gauges.get(&id).copied());
            }
            Request::ReadCounter { id, reply } => {
                let _ = reply.send(self.data.counters.get(&id).copied());
            }
            Request::ReadAll { reply } => {
                let _ = reply.send(self.data.clone());
            }
            Request::Ping { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn apply(&mut self, id: &str, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => {
                self.data.gauges.insert(id.to_string(), v);
                debug!(%id, value = v, "gauge stored");
            }
            MetricValue::Counter(d) => {
                let total = self.data.counters.entry(id.to_string()).or_insert(0);
                *total = total.saturating_add(d);
                debug!(%id, delta = d, total = *total, "counter accumulated");
            }
        }
    }

    fn persist_synchronous(&mut self) {
        if self.sink.as_ref().is_some_and(|s| s.synchronous) {
            self.persist("update");
        }
    }

    /// Write the snapshot through the sink, if one is configured. Persist
    /// failures are logged and swallowed: the in-memory mutation already
    /// succeeded.
    fn persist(&mut self, trigger: &str) {
        let Some(sink) = &self.sink else { return };
        self.data.stored_at = epoch_secs();
        match sink.write(&self.data) {
            Ok(()) => debug!(trigger, path = ?sink.path, "snapshot persisted"),
            Err(e) => warn!(error = %e, path = ?sink.path, "snapshot persist failed"),
        }
    }
}

/// Cloneable handle to the owning worker.
#[derive(Clone)]
pub struct MemoryStore {
    tx: mpsc::Sender<Request>,
    key: String,
    worker: Arc<Mutex<Option<Worker>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Volatile backend: empty state, no durability.
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self::with_state(Snapshot::default(), None, signing_key.into())
    }

    pub(crate) fn with_state(data: Snapshot, sink: Option<SnapshotSink>, key: String) -> Self {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let worker = Worker { inbox, data, sink };
        Self {
            tx,
            key,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, MetricError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| MetricError::Unavailable("storage worker stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| MetricError::Unavailable("storage worker dropped the request".to_string()))
    }
}

#[async_trait]
impl MetricStorage for MemoryStore {
    fn signing_key(&self) -> &str {
        &self.key
    }

    async fn apply_records(&self, mut records: Vec<MetricRecord>) -> Result<(), MetricError> {
        if records.is_empty() {
            return Ok(());
        }
        if records.len() == 1 {
            let record = records.remove(0);
            return self
                .request(|reply| Request::Apply {
                    id: record.id,
                    value: record.value,
                    reply,
                })
                .await;
        }
        self.request(|reply| Request::ApplyBatch { records, reply })
            .await
    }

    async fn gauge(&self, id: &str) -> Result<f64, MetricError> {
        let name = id.to_string();
        self.request(|reply| Request::ReadGauge { id: name, reply })
            .await?
            .ok_or_else(|| MetricError::NotFound(id.to_string()))
    }

    async fn counter(&self, id: &str) -> Result<u64, MetricError> {
        let name = id.to_string();
        self.request(|reply| Request::ReadCounter { id: name, reply })
            .await?
            .ok_or_else(|| MetricError::NotFound(id.to_string()))
    }

    async fn snapshot(&self) -> Result<Snapshot, MetricError> {
        self.request(|reply| Request::ReadAll { reply }).await
    }

    async fn probe(&self) -> bool {
        match time::timeout(PROBE_TIMEOUT, self.request(|reply| Request::Ping { reply })).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "storage probe failed");
                false
            }
            Err(_) => {
                warn!("storage probe timed out");
                false
            }
        }
    }

    async fn run(&self, shutdown: watch::Receiver<bool>) {
        let Some(mut worker) = self.worker.lock().await.take() else {
            warn!("storage worker already running");
            return;
        };
        worker.run(shutdown).await;
    }
}

async fn next_tick(ticker: &mut Option<time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
