//! Error taxonomy for the metrics storage engine.

use thiserror::Error;

/// Request-scoped errors.
///
/// Returned to the immediate caller and never fatal to the backend. A
/// request that fails with one of these carries no partial mutation:
/// single updates apply or reject atomically, batches are all-or-nothing.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric name must not be empty")]
    InvalidIdentifier,

    #[error("unsupported metric kind: {0}, valid kinds: gauge, counter")]
    UnsupportedKind(String),

    #[error("invalid {kind} value: {token:?}")]
    InvalidValue { kind: &'static str, token: String },

    #[error("signature mismatch for metric {0:?}")]
    AuthenticationFailure(String),

    #[error("metric not found: {0:?}")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    InvalidPayload(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Construction-time failures.
///
/// These abort collector start-up; they are never returned from a request
/// path.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("failed to open snapshot file: {0}")]
    Open(String),

    #[error("failed to decode snapshot file: {0}")]
    Restore(String),

    #[error("failed to connect to database: {0}")]
    Connect(String),

    #[error("failed to initialize schema: {0}")]
    Schema(String),
}
