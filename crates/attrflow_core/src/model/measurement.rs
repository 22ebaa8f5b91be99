//! Measurement records.

use super::{AttributeId, Timestamp};
use serde::{Deserialize, Serialize};

/// One `(attribute, timestamp, value)` data point.
///
/// A record with `value == None` is value-absent: it occupies the key but the
/// formula engine treats the attribute as missing at that timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub attribute_id: AttributeId,
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

impl MeasurementRecord {
    pub fn new(attribute_id: AttributeId, timestamp: Timestamp, value: Option<f64>) -> Self {
        Self {
            attribute_id,
            timestamp,
            value,
        }
    }
}

/// Inclusive timestamp window for archive reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}
