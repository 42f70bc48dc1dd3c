//! Domain types for the PulseGrid metrics pipeline.
//!
//! A [`MetricRecord`] is transient: constructed at the boundary from a
//! request, consumed by exactly one apply, then discarded. The
//! [`Snapshot`] is the only long-lived entity and is owned exclusively by
//! its backend; callers always receive copies.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MetricError;

/// Wire token for the gauge kind.
pub const GAUGE_KIND: &str = "gauge";
/// Wire token for the counter kind.
pub const COUNTER_KIND: &str = "counter";

/// The two scalar measurement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Latest reported value replaces the previous one.
    Gauge,
    /// Reported deltas accumulate into a running total.
    Counter,
}

impl MetricKind {
    /// Parse a wire token into a kind.
    pub fn parse(token: &str) -> Result<Self, MetricError> {
        match token {
            GAUGE_KIND => Ok(Self::Gauge),
            COUNTER_KIND => Ok(Self::Counter),
            other => Err(MetricError::UnsupportedKind(other.to_string())),
        }
    }

    /// The wire token for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => GAUGE_KIND,
            Self::Counter => COUNTER_KIND,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measurement value, tagged by kind.
///
/// Carrying the numeric inside the kind makes the inapplicable field
/// unrepresentable: a counter record cannot hold a gauge reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(u64),
}

impl MetricValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
        }
    }

    /// Decimal token form, the inverse of [`crate::codec::parse`].
    pub fn to_token(&self) -> String {
        match self {
            Self::Gauge(v) => v.to_string(),
            Self::Counter(d) => d.to_string(),
        }
    }
}

/// One named measurement in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Non-empty name, unique within its kind.
    pub id: String,
    /// The measurement.
    pub value: MetricValue,
    /// Keyed-hash signature, present only when a signing key is configured.
    pub signature: Option<String>,
}

impl MetricRecord {
    /// Build an unsigned record.
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
            signature: None,
        }
    }

    /// The record's kind.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Full materialized state of one backend.
///
/// Gauges and counters live in disjoint maps, so a gauge and a counter may
/// share a name without collision. `stored_at` is the unix-seconds
/// timestamp of the last durable persist (0 = never persisted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub gauges: HashMap<String, f64>,
    pub counters: HashMap<String, u64>,
    #[serde(default)]
    pub stored_at: u64,
}
