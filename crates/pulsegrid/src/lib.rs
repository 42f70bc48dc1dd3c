//! pulsegrid — storage engine facade for the PulseGrid collector.
//!
//! The collector process picks exactly one storage backend at start-up:
//! relational when a database DSN is configured, file-snapshotted when a
//! snapshot path is configured, volatile otherwise. The two durable
//! backends are mutually exclusive; configuring both is rejected.
//!
//! The HTTP routing layer, CLI/environment configuration loading, signal
//! handling, and the sampling agent are external collaborators: they hand
//! validated tuples and raw signed payloads to the selected
//! [`MetricStorage`] and drive its run loop.

use tracing::info;

pub use pulse_core::{
    MetricError, MetricKind, MetricRecord, MetricStorage, MetricValue, PersistMode, Snapshot,
    StartupError, StoreConfig,
};
pub use pulsegrid_sql::SqlStore;
pub use pulsegrid_store::{FileStore, MemoryStore};

/// Build the configured storage backend.
///
/// Fails fast on configuration, restore, or connection errors; the caller
/// owns spawning [`MetricStorage::run`] and signalling shutdown.
pub async fn select_backend(cfg: &StoreConfig) -> Result<Box<dyn MetricStorage>, StartupError> {
    match (&cfg.database_url, &cfg.snapshot_path) {
        (Some(_), Some(_)) => Err(StartupError::Config(
            "database_url and snapshot_path are mutually exclusive".to_string(),
        )),
        (Some(url), None) => {
            info!("selecting relational backend");
            Ok(Box::new(
                SqlStore::connect(url, cfg.signing_key.as_str()).await?,
            ))
        }
        (None, Some(path)) => {
            info!(?path, "selecting file-snapshot backend");
            Ok(Box::new(FileStore::new(
                path.clone(),
                cfg.persist,
                cfg.restore,
                cfg.signing_key.as_str(),
            )?))
        }
        (None, None) => {
            info!("selecting in-memory backend");
            Ok(Box::new(MemoryStore::new(cfg.signing_key.as_str())))
        }
    }
}
