//! File-snapshot backend.
//!
//! Wraps the in-memory actor and adds durability: the full snapshot is
//! JSON-serialized to a single file, fully overwriting it. Writes happen on
//! a timed tick, after every update in synchronous mode, and once at
//! shutdown. Restore runs at construction; a missing or empty file starts
//! clean, anything else that fails to decode is fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use pulse_core::config::PersistMode;
use pulse_core::error::{MetricError, StartupError};
use pulse_core::storage::MetricStorage;
use pulse_core::types::{MetricRecord, Snapshot};

use crate::actor::MemoryStore;

/// Owner-side persistence settings. Held by the worker and used only
/// inside its turn, so the file has exactly one writer.
pub(crate) struct SnapshotSink {
    pub(crate) path: PathBuf,
    pub(crate) timed: Option<Duration>,
    pub(crate) synchronous: bool,
}

impl SnapshotSink {
    pub(crate) fn write(&self, snapshot: &Snapshot) -> io::Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(&self.path, bytes)
    }
}

/// Durable file-backed storage.
pub struct FileStore {
    inner: MemoryStore,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").finish_non_exhaustive()
    }
}

impl FileStore {
    /// Construct the backend, restoring the previous snapshot when both
    /// durability and restore-on-start are enabled.
    pub fn new(
        path: impl Into<PathBuf>,
        persist: PersistMode,
        restore: bool,
        signing_key: impl Into<String>,
    ) -> Result<Self, StartupError> {
        let path = path.into();
        let data = if restore && persist != PersistMode::Disabled {
            restore_snapshot(&path)?
        } else {
            debug!("snapshot restore skipped");
            Snapshot::default()
        };
        let sink = match persist {
            PersistMode::Disabled => None,
            PersistMode::Timed(every) => {
                if every.is_zero() {
                    return Err(StartupError::Config(
                        "timed persist interval must be non-zero".to_string(),
                    ));
                }
                Some(SnapshotSink {
                    path,
                    timed: Some(every),
                    synchronous: false,
                })
            }
            PersistMode::Synchronous => Some(SnapshotSink {
                path,
                timed: None,
                synchronous: true,
            }),
        };
        Ok(Self {
            inner: MemoryStore::with_state(data, sink, signing_key.into()),
        })
    }
}

/// Read and decode the snapshot file. Missing or empty files yield an
/// empty snapshot.
fn restore_snapshot(path: &Path) -> Result<Snapshot, StartupError> {
    info!(?path, "restoring snapshot");
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(StartupError::Open(e.to_string())),
    };
    if bytes.is_empty() {
        info!("snapshot file missing or empty, starting clean");
        return Ok(Snapshot::default());
    }
    let snapshot: Snapshot =
        serde_json::from_slice(&bytes).map_err(|e| StartupError::Restore(e.to_string()))?;
    info!(
        gauges = snapshot.gauges.len(),
        counters = snapshot.counters.len(),
        "snapshot restored"
    );
    Ok(snapshot)
}

#[async_trait]
impl MetricStorage for FileStore {
    fn signing_key(&self) -> &str {
        self.inner.signing_key()
    }

    async fn apply_records(&self, records: Vec<MetricRecord>) -> Result<(), MetricError> {
        self.inner.apply_records(records).await
    }

    async fn gauge(&self, id: &str) -> Result<f64, MetricError> {
        self.inner.gauge(id).await
    }

    async fn counter(&self, id: &str) -> Result<u64, MetricError> {
        self.inner.counter(id).await
    }

    async fn snapshot(&self) -> Result<Snapshot, MetricError> {
        self.inner.snapshot().await
    }

    async fn probe(&self) -> bool {
        self.inner.probe().await
    }

    async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.inner.run(shutdown).await;
    }
}
