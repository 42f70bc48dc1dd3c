//! pulse-core — shared contract for the PulseGrid metrics engine.
//!
//! Defines the metric record and its codecs, the keyed-hash integrity
//! layer, the error taxonomy, storage configuration, and the
//! [`MetricStorage`] trait implemented by every backend.
//!
//! # Architecture
//!
//! ```text
//! boundary (HTTP / agent, external)
//!   ├── codec::parse()           ← path-style (kind, id, value) triples
//!   ├── codec::decode_verified() ← signed JSON payloads
//!   └── MetricStorage            ← one backend selected at start-up
//!         ├── MemoryStore   (pulsegrid-store)
//!         ├── FileStore     (pulsegrid-store)
//!         └── SqlStore      (pulsegrid-sql)
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod sign;
pub mod storage;
pub mod types;

pub use config::{PersistMode, StoreConfig};
pub use error::{MetricError, StartupError};
pub use storage::MetricStorage;
pub use types::{MetricKind, MetricRecord, MetricValue, Snapshot};
