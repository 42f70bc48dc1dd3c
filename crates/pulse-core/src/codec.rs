//! Wire codec for metric records.
//!
//! Two boundary forms feed the storage engine: path-style token triples
//! (`kind/name/value`) and self-describing signed JSON payloads. The JSON
//! form carries only the numeric field relevant to the declared kind:
//!
//! ```json
//! {"id": "Alloc", "type": "gauge", "value": 234.1, "hash": "..."}
//! {"id": "PollCount", "type": "counter", "delta": 7}
//! ```
//!
//! The inapplicable field is omitted rather than defaulted, so a counter
//! payload can never be mistaken for a legitimate zero gauge reading.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MetricError;
use crate::sign;
use crate::types::{COUNTER_KIND, GAUGE_KIND, MetricKind, MetricRecord, MetricValue};

/// JSON wire form of one record.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

/// Parse a path-style `(kind, id, value)` token triple.
pub fn parse(kind_token: &str, id: &str, value_token: &str) -> Result<MetricRecord, MetricError> {
    if id.is_empty() {
        return Err(MetricError::InvalidIdentifier);
    }
    let value = match MetricKind::parse(kind_token)? {
        MetricKind::Gauge => {
            let v: f64 = value_token.parse().map_err(|_| MetricError::InvalidValue {
                kind: GAUGE_KIND,
                token: value_token.to_string(),
            })?;
            MetricValue::Gauge(v)
        }
        MetricKind::Counter => {
            let d: u64 = value_token.parse().map_err(|_| MetricError::InvalidValue {
                kind: COUNTER_KIND,
                token: value_token.to_string(),
            })?;
            MetricValue::Counter(d)
        }
    };
    Ok(MetricRecord::new(id, value))
}

fn from_wire(wire: WireRecord) -> Result<MetricRecord, MetricError> {
    if wire.id.is_empty() {
        return Err(MetricError::InvalidIdentifier);
    }
    let value = match MetricKind::parse(&wire.kind)? {
        MetricKind::Gauge => MetricValue::Gauge(wire.value.ok_or_else(|| {
            MetricError::InvalidPayload(format!("gauge {:?} carries no value field", wire.id))
        })?),
        MetricKind::Counter => MetricValue::Counter(wire.delta.ok_or_else(|| {
            MetricError::InvalidPayload(format!("counter {:?} carries no delta field", wire.id))
        })?),
    };
    Ok(MetricRecord {
        id: wire.id,
        value,
        signature: wire.hash,
    })
}

fn to_wire(record: &MetricRecord, signature: Option<String>) -> WireRecord {
    let (delta, value) = match record.value {
        MetricValue::Gauge(v) => (None, Some(v)),
        MetricValue::Counter(d) => (Some(d), None),
    };
    WireRecord {
        id: record.id.clone(),
        kind: record.kind().as_str().to_string(),
        delta,
        value,
        hash: signature,
    }
}

/// Decode one JSON record.
pub fn decode(payload: &[u8]) -> Result<MetricRecord, MetricError> {
    let wire: WireRecord = serde_json::from_slice(payload)
        .map_err(|e| MetricError::InvalidPayload(e.to_string()))?;
    from_wire(wire)
}

/// Decode an ordered JSON array of records.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<MetricRecord>, MetricError> {
    let wires: Vec<WireRecord> = serde_json::from_slice(payload)
        .map_err(|e| MetricError::InvalidPayload(e.to_string()))?;
    wires.into_iter().map(from_wire).collect()
}

/// Decode a query record: only the id and kind matter, numerics are
/// ignored.
pub fn decode_query(payload: &[u8]) -> Result<(String, MetricKind), MetricError> {
    let wire: WireRecord = serde_json::from_slice(payload)
        .map_err(|e| MetricError::InvalidPayload(e.to_string()))?;
    if wire.id.is_empty() {
        return Err(MetricError::InvalidIdentifier);
    }
    let kind = MetricKind::parse(&wire.kind)?;
    Ok((wire.id, kind))
}

/// Decode one record and verify its signature against the configured key.
pub fn decode_verified(payload: &[u8], key: &str) -> Result<MetricRecord, MetricError> {
    let record = decode(payload)?;
    if !sign::verify(&record, key) {
        warn!(id = %record.id, "inbound record failed signature verification");
        return Err(MetricError::AuthenticationFailure(record.id));
    }
    Ok(record)
}

/// Decode a batch and verify every signature before any record is applied.
/// One mismatch rejects the whole batch.
pub fn decode_verified_batch(payload: &[u8], key: &str) -> Result<Vec<MetricRecord>, MetricError> {
    let records = decode_batch(payload)?;
    for record in &records {
        if !sign::verify(record, key) {
            warn!(id = %record.id, "batch record failed signature verification");
            return Err(MetricError::AuthenticationFailure(record.id.clone()));
        }
    }
    Ok(records)
}

/// Encode a record, re-signing it with the current key. Only the fields
/// relevant to the record's kind are emitted.
pub fn encode(record: &MetricRecord, key: &str) -> Result<Vec<u8>, MetricError> {
    let signature = (!key.is_empty()).then(|| sign::sign(record, key));
    serde_json::to_vec(&to_wire(record, signature))
        .map_err(|e| MetricError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signing-key";

    #[test]
    fn parse_gauge() {
        let record = parse("gauge", "Alloc", "234.1").unwrap();
        assert_eq!(record.id, "Alloc");
        assert_eq!(record.value, MetricValue::Gauge(234.1));
    }

    #[test]
    fn parse_counter() {
        let record = parse("counter", "PollCount", "3").unwrap();
        assert_eq!(record.value, MetricValue::Counter(3));
    }

    #[test]
    fn parse_rejects_empty_id() {
        assert!(matches!(
            parse("gauge", "", "1.0"),
            Err(MetricError::InvalidIdentifier)
        ));
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        assert!(matches!(
            parse("histogram", "x", "1"),
            Err(MetricError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_numerics() {
        assert!(matches!(
            parse("gauge", "x", "not-a-float"),
            Err(MetricError::InvalidValue { kind: "gauge", .. })
        ));
        assert!(matches!(
            parse("counter", "x", "-3"),
            Err(MetricError::InvalidValue { kind: "counter", .. })
        ));
        assert!(matches!(
            parse("counter", "x", "3.5"),
            Err(MetricError::InvalidValue { kind: "counter", .. })
        ));
    }

    #[test]
    fn decode_gauge_payload() {
        let record = decode(br#"{"id":"Alloc","type":"gauge","value":234.1}"#).unwrap();
        assert_eq!(record.value, MetricValue::Gauge(234.1));
        assert_eq!(record.signature, None);
    }

    #[test]
    fn decode_counter_payload() {
        let record = decode(br#"{"id":"PollCount","type":"counter","delta":7}"#).unwrap();
        assert_eq!(record.value, MetricValue::Counter(7));
    }

    #[test]
    fn decode_rejects_missing_numeric_field() {
        // A counter payload must not fall back to a zero gauge reading.
        let err = decode(br#"{"id":"PollCount","type":"counter","value":1.0}"#).unwrap_err();
        assert!(matches!(err, MetricError::InvalidPayload(_)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode(b"not json"),
            Err(MetricError::InvalidPayload(_))
        ));
    }

    #[test]
    fn encode_omits_inapplicable_fields() {
        let payload = encode(&MetricRecord::new("Alloc", MetricValue::Gauge(1.5)), "").unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"value\""));
        assert!(!text.contains("\"delta\""));
        assert!(!text.contains("\"hash\""));

        let payload = encode(&MetricRecord::new("n", MetricValue::Counter(2)), "").unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"delta\""));
        assert!(!text.contains("\"value\""));
    }

    #[test]
    fn encode_decode_round_trip_preserves_signature() {
        let record = MetricRecord::new("Alloc", MetricValue::Gauge(234.1));
        let payload = encode(&record, KEY).unwrap();
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.value, record.value);
        assert!(sign::verify(&decoded, KEY));
    }

    #[test]
    fn decode_verified_accepts_valid_signature() {
        let payload = encode(&MetricRecord::new("x", MetricValue::Counter(1)), KEY).unwrap();
        assert!(decode_verified(&payload, KEY).is_ok());
    }

    #[test]
    fn decode_verified_rejects_tampered_payload() {
        let payload = encode(&MetricRecord::new("x", MetricValue::Counter(1)), KEY).unwrap();
        let tampered = String::from_utf8(payload).unwrap().replace(r#""delta":1"#, r#""delta":2"#);
        assert!(matches!(
            decode_verified(tampered.as_bytes(), KEY),
            Err(MetricError::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn decode_verified_without_key_accepts_unsigned() {
        let payload = br#"{"id":"x","type":"gauge","value":1.0}"#;
        assert!(decode_verified(payload, "").is_ok());
    }

    #[test]
    fn batch_verification_is_all_or_nothing() {
        let mut records: Vec<_> = (0..3)
            .map(|i| MetricRecord::new(format!("m{i}"), MetricValue::Counter(i)))
            .collect();
        for record in &mut records {
            record.signature = Some(sign::sign(record, KEY));
        }
        // Corrupt one signature.
        records[1].signature = Some("deadbeef".to_string());

        let payload = serde_json::to_vec(
            &records
                .iter()
                .map(|r| to_wire(r, r.signature.clone()))
                .collect::<Vec<_>>(),
        )
        .unwrap();

        assert!(matches!(
            decode_verified_batch(&payload, KEY),
            Err(MetricError::AuthenticationFailure(id)) if id == "m1"
        ));
    }

    #[test]
    fn decode_query_ignores_numerics() {
        let (id, kind) = decode_query(br#"{"id":"Alloc","type":"gauge"}"#).unwrap();
        assert_eq!(id, "Alloc");
        assert_eq!(kind, MetricKind::Gauge);
    }

    #[test]
    fn decode_batch_preserves_order() {
        let payload = br#"[
            {"id":"a","type":"counter","delta":1},
            {"id":"b","type":"gauge","value":2.0}
        ]"#;
        let records = decode_batch(payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
    }
}
