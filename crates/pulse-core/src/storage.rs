//! The capability contract every storage backend satisfies.
//!
//! Exactly one implementation is selected at collector start-up and driven
//! until shutdown. The boundary glue (token parsing, payload decoding,
//! signature verification, response re-signing) is identical for all
//! backends and lives in the provided methods; backends supply the
//! record-level apply, the reads, the probe, and the service loop.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::codec;
use crate::error::MetricError;
use crate::types::{MetricKind, MetricRecord, MetricValue, Snapshot};

/// Unified storage contract.
#[async_trait]
pub trait MetricStorage: Send + Sync + std::fmt::Debug {
    /// The configured signing key; empty when signing is disabled.
    fn signing_key(&self) -> &str;

    /// Apply a batch of already-validated records atomically: either every
    /// record lands or none do.
    async fn apply_records(&self, records: Vec<MetricRecord>) -> Result<(), MetricError>;

    /// Current gauge value.
    async fn gauge(&self, id: &str) -> Result<f64, MetricError>;

    /// Current accumulated counter total.
    async fn counter(&self, id: &str) -> Result<u64, MetricError>;

    /// Atomic copy of the full state, never a torn read.
    async fn snapshot(&self) -> Result<Snapshot, MetricError>;

    /// Liveness check, bounded by a short timeout. Never mutates state.
    async fn probe(&self) -> bool;

    /// Long-lived service loop; returns once the shutdown signal fires,
    /// releasing file handles and connections on the way out.
    async fn run(&self, shutdown: watch::Receiver<bool>);

    /// Parse and apply one path-style update.
    async fn apply_update(&self, kind: &str, id: &str, value: &str) -> Result<(), MetricError> {
        let record = codec::parse(kind, id, value)?;
        self.apply_records(vec![record]).await
    }

    /// Decode, verify, and apply one signed JSON record. Verification
    /// failure rejects the update before any mutation.
    async fn apply_signed_update(&self, payload: &[u8]) -> Result<(), MetricError> {
        let record = codec::decode_verified(payload, self.signing_key())?;
        self.apply_records(vec![record]).await
    }

    /// Decode an ordered JSON array, verify every signature, then apply the
    /// whole batch atomically. Returns the re-signed encoding of the first
    /// record.
    async fn apply_signed_batch(&self, payload: &[u8]) -> Result<Vec<u8>, MetricError> {
        let records = codec::decode_verified_batch(payload, self.signing_key())?;
        let first = records
            .first()
            .cloned()
            .ok_or_else(|| MetricError::InvalidPayload("empty batch".to_string()))?;
        self.apply_records(records).await?;
        codec::encode(&first, self.signing_key())
    }

    /// Decode a JSON query record, fill in the stored value, and return the
    /// re-signed encoding.
    async fn read_signed(&self, payload: &[u8]) -> Result<Vec<u8>, MetricError> {
        let (id, kind) = codec::decode_query(payload)?;
        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(self.gauge(&id).await?),
            MetricKind::Counter => MetricValue::Counter(self.counter(&id).await?),
        };
        codec::encode(&MetricRecord::new(id, value), self.signing_key())
    }
}
