//! pulsegrid-store — the in-process storage backends.
//!
//! # Architecture
//!
//! ```text
//! MemoryStore (Clone handle)
//!   └── bounded inbox ──► Worker (exclusive owner of the Snapshot)
//!                           ├── apply / read, one request per turn
//!                           └── persist tick ──► snapshot file
//! FileStore
//!   └── wraps a MemoryStore whose worker carries a snapshot sink
//! ```
//!
//! All mutation is confined to the worker task, which gives every request a
//! total order without locks. The file backend restores the snapshot at
//! construction and rewrites the whole file on a timed tick, after each
//! update in synchronous mode, and once at shutdown.

pub mod actor;
pub mod file;

pub use actor::MemoryStore;
pub use file::FileStore;
