//! sqlx-backed metric storage.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use pulse_core::error::{MetricError, StartupError};
use pulse_core::storage::MetricStorage;
use pulse_core::types::{COUNTER_KIND, GAUGE_KIND, MetricRecord, MetricValue, Snapshot};

/// Upper bound on a liveness probe round-trip.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// `$N` placeholders work for both Postgres and SQLite, so one statement
/// set serves every driver the pool can open.
const ENSURE_TABLE: &str = "CREATE TABLE IF NOT EXISTS metrics ( \
     id TEXT NOT NULL, \
     kind TEXT NOT NULL, \
     delta BIGINT NOT NULL DEFAULT 0, \
     value DOUBLE PRECISION NOT NULL DEFAULT 0, \
     PRIMARY KEY (id, kind) )";

const UPSERT_GAUGE: &str = "INSERT INTO metrics (id, kind, delta, value) \
     VALUES ($1, 'gauge', 0, $2) \
     ON CONFLICT (id, kind) DO UPDATE SET value = excluded.value";

const UPSERT_COUNTER: &str = "INSERT INTO metrics (id, kind, delta, value) \
     VALUES ($1, 'counter', $2, 0) \
     ON CONFLICT (id, kind) DO UPDATE SET delta = metrics.delta + excluded.delta";

const SELECT_VALUE: &str = "SELECT value FROM metrics WHERE id = $1 AND kind = 'gauge'";
const SELECT_DELTA: &str = "SELECT delta FROM metrics WHERE id = $1 AND kind = 'counter'";
const SELECT_ALL: &str = "SELECT id, kind, delta, value FROM metrics";

fn unavailable(e: sqlx::Error) -> MetricError {
    MetricError::Unavailable(e.to_string())
}

/// Relational storage behind a connection pool.
pub struct SqlStore {
    pool: AnyPool,
    key: String,
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore").finish_non_exhaustive()
    }
}

impl SqlStore {
    /// Connect to the DSN and ensure the schema. Connection or schema
    /// failures are fatal at start-up.
    pub async fn connect(url: &str, signing_key: impl Into<String>) -> Result<Self, StartupError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StartupError::Connect(e.to_string()))?;
        sqlx::query(ENSURE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StartupError::Schema(e.to_string()))?;
        info!("relational store connected, schema ensured");
        Ok(Self {
            pool,
            key: signing_key.into(),
        })
    }
}

#[async_trait]
impl MetricStorage for SqlStore {
    fn signing_key(&self) -> &str {
        &self.key
    }

    async fn apply_records(&self, records: Vec<MetricRecord>) -> Result<(), MetricError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for record in &records {
            let query = match record.value {
                MetricValue::Gauge(v) => sqlx::query(UPSERT_GAUGE).bind(record.id.as_str()).bind(v),
                MetricValue::Counter(d) => sqlx::query(UPSERT_COUNTER)
                    .bind(record.id.as_str())
                    .bind(d as i64),
            };
            // Any row failure rolls the whole batch back on drop.
            query.execute(&mut *tx).await.map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;
        debug!(records = records.len(), "upsert batch committed");
        Ok(())
    }

    async fn gauge(&self, id: &str) -> Result<f64, MetricError> {
        let row = sqlx::query(SELECT_VALUE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        match row {
            Some(row) => row.try_get("value").map_err(unavailable),
            None => Err(MetricError::NotFound(id.to_string())),
        }
    }

    async fn counter(&self, id: &str) -> Result<u64, MetricError> {
        let row = sqlx::query(SELECT_DELTA)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        match row {
            Some(row) => {
                let delta: i64 = row.try_get("delta").map_err(unavailable)?;
                Ok(delta as u64)
            }
            None => Err(MetricError::NotFound(id.to_string())),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot, MetricError> {
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        let mut snapshot = Snapshot::default();
        for row in rows {
            let id: String = row.try_get("id").map_err(unavailable)?;
            let kind: String = row.try_get("kind").map_err(unavailable)?;
            match kind.as_str() {
                GAUGE_KIND => {
                    let value: f64 = row.try_get("value").map_err(unavailable)?;
                    snapshot.gauges.insert(id, value);
                }
                COUNTER_KIND => {
                    let delta: i64 = row.try_get("delta").map_err(unavailable)?;
                    snapshot.counters.insert(id, delta as u64);
                }
                other => warn!(%id, kind = %other, "skipping row with unknown kind"),
            }
        }
        Ok(snapshot)
    }

    async fn probe(&self) -> bool {
        let check = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(PROBE_TIMEOUT, check).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "database probe failed");
                false
            }
            Err(_) => {
                warn!("database probe timed out");
                false
            }
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        // Idempotent; the table normally already exists from connect.
        if let Err(e) = sqlx::query(ENSURE_TABLE).execute(&self.pool).await {
            warn!(error = %e, "schema ensure failed");
        }
        info!("relational store running");
        let _ = shutdown.changed().await;
        self.pool.close().await;
        info!("relational store stopped, pool closed");
    }
}
