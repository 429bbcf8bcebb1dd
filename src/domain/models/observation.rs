//! Observation and aggregate value types.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// One keyed numeric event as it arrives on the log, and the shape of an
/// aggregate when it is served back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    pub id: String,
    pub value: f64,
}

impl Observation {
    pub fn new(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    /// Decode a log payload.
    ///
    /// The payload must be a JSON object with exactly a non-empty string `id`
    /// and a finite numeric `value`.
    pub fn from_payload(payload: &[u8]) -> DomainResult<Self> {
        let observation: Self = serde_json::from_slice(payload)?;
        observation.validate()?;
        Ok(observation)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_empty() {
            return Err(DomainError::Decode("observation id must not be empty".to_string()));
        }
        if !self.value.is_finite() {
            return Err(DomainError::Decode(format!(
                "observation value for '{}' is not finite",
                self.id
            )));
        }
        Ok(())
    }
}

/// Running sums are persisted with this many decimal places.
pub const AGGREGATE_PRECISION: usize = 2;

/// Encode a running sum as its persisted decimal string.
///
/// Sums that round to zero are written as `0.00`, never `-0.00`.
pub fn encode_sum(sum: f64) -> Vec<u8> {
    let text = format!("{:.*}", AGGREGATE_PRECISION, sum);
    match text.strip_prefix('-') {
        Some(magnitude) if magnitude.bytes().all(|b| b == b'0' || b == b'.') => {
            magnitude.as_bytes().to_vec()
        }
        _ => text.into_bytes(),
    }
}

/// Decode a persisted decimal string back into a running sum.
pub fn decode_sum(key: &str, raw: &[u8]) -> DomainResult<f64> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        DomainError::Decode(format!("stored value for '{key}' is not UTF-8: {e}"))
    })?;
    let value: f64 = text.trim().parse().map_err(|e| {
        DomainError::Decode(format!("stored value for '{key}' is not a decimal ({text:?}): {e}"))
    })?;
    // A stored "-0.00" parses as -0.0; adding positive zero yields 0.0.
    let value = value + 0.0;
    if !value.is_finite() {
        return Err(DomainError::Decode(format!(
            "stored value for '{key}' is not finite ({text:?})"
        )));
    }
    Ok(value)
}
