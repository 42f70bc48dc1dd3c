//! Keyed-hash integrity layer.
//!
//! Signatures are HMAC-SHA256 over the canonical string
//! `<id>:<kind>:<numeric-value>`, hex-encoded. Signing is opt-in: with an
//! empty key, [`sign`] returns an empty signature and [`verify`] accepts
//! everything.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::{MetricRecord, MetricValue};

type HmacSha256 = Hmac<Sha256>;

/// Canonical string the signature is computed over.
///
/// Gauge values are formatted with fixed six-digit precision so the same
/// reading always hashes identically.
pub fn canonical(record: &MetricRecord) -> String {
    match record.value {
        MetricValue::Gauge(v) => format!("{}:gauge:{:.6}", record.id, v),
        MetricValue::Counter(d) => format!("{}:counter:{}", record.id, d),
    }
}

/// Compute the hex signature for a record. An empty key yields an empty
/// signature.
pub fn sign(record: &MetricRecord, key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(canonical(record).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute the signature and compare against the one the record carries.
/// With an empty key verification always succeeds.
pub fn verify(record: &MetricRecord, key: &str) -> bool {
    if key.is_empty() {
        return true;
    }
    match &record.signature {
        Some(signature) => *signature == sign(record, key),
        None => false,
    }
}
