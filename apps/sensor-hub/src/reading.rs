use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Device id recorded when a payload does not identify its sender.
pub const UNKNOWN_DEVICE_ID: &str = "unknown";

/// Metric name to value. Open-ended: device classes only pin down which
/// names must be present.
pub type Metrics = BTreeMap<String, f64>;

/// One admitted sensor sample.
///
/// Serialises flat, the same shape for `GET /api/data`, history responses and
/// live `new-data` events:
///
/// ```json
/// {"id": 7, "device_id": "greenhouse-1", "humidity": 55.2, "light": 300.0,
///  "temperature": 21.5, "timestamp": 1718000000000,
///  "created_at": "2024-06-10T06:13:20.000Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub device_id: String,
    #[serde(flatten)]
    pub metrics: Metrics,
    /// Device-reported capture time, milliseconds since the epoch.
    pub timestamp: i64,
    /// Server admission time.
    #[serde(with = "created_at_format")]
    pub created_at: DateTime<Utc>,
}

impl Reading {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// A validated reading that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub metrics: Metrics,
    pub timestamp: i64,
    pub received_at: DateTime<Utc>,
}

impl NewReading {
    pub(crate) fn into_reading(self, id: i64) -> Reading {
        Reading {
            id,
            device_id: self.device_id,
            metrics: self.metrics,
            timestamp: self.timestamp,
            created_at: self.received_at,
        }
    }
}

pub(crate) mod created_at_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub(crate) fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
