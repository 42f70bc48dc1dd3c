//! Storage engine configuration.
//!
//! Assembled by the out-of-scope CLI/environment loading layer and handed
//! to the backend selection once at collector start-up.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When the file backend writes its snapshot.
///
/// An explicit tri-state: the interval and the "write on every update"
/// signal are separate, so "no persistence at all" is representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Never write a snapshot.
    #[default]
    Disabled,
    /// Write on a periodic tick.
    Timed(Duration),
    /// Write after every successful update, before it is acknowledged.
    Synchronous,
}

/// Storage engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Shared secret for keyed-hash signing. Empty disables signing.
    #[serde(default)]
    pub signing_key: String,

    /// DSN for the relational backend (`postgres://…` or `sqlite://…`).
    /// Selects the relational backend when set.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Snapshot file for the file backend. Selects the file backend when
    /// set. Mutually exclusive with `database_url`.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Snapshot write trigger for the file backend.
    #[serde(default)]
    pub persist: PersistMode,

    /// Restore the snapshot file at start-up.
    #[serde(default)]
    pub restore: bool,
}

impl StoreConfig {
    /// Volatile in-memory backend.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-snapshot backend at the given path.
    pub fn file_backed(path: impl Into<PathBuf>, persist: PersistMode, restore: bool) -> Self {
        Self {
            snapshot_path: Some(path.into()),
            persist,
            restore,
            ..Self::default()
        }
    }

    /// Relational backend at the given DSN.
    pub fn relational(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set the signing key.
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = key.into();
        self
    }
}
