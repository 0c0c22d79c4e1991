use serde_json::{Map, Value};

use crate::device_class::DeviceClass;
use crate::error::ValidationError;
use crate::reading::Metrics;

const FIELD_DEVICE_ID: &str = "device_id";
const FIELD_DEVICE_CLASS: &str = "device_class";
const FIELD_TIMESTAMP: &str = "timestamp";
/// Server-assigned on admission; ignored when a device sends them.
const SERVER_FIELDS: [&str; 2] = ["id", "created_at"];

/// A device posting split into envelope fields and numeric metrics.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ReadingPayload {
    pub(super) device_id: Option<String>,
    pub(super) device_class: Option<String>,
    pub(super) timestamp: Option<i64>,
    pub(super) metrics: Metrics,
    /// Fields that carried a non-null, non-numeric value.
    pub(super) non_numeric: Vec<String>,
}

impl ReadingPayload {
    pub(super) fn from_json(body: Value) -> Result<Self, ValidationError> {
        let Value::Object(fields) = body else {
            return Err(ValidationError::NotAnObject);
        };
        Self::from_fields(fields)
    }

    fn from_fields(fields: Map<String, Value>) -> Result<Self, ValidationError> {
        let mut payload = Self {
            device_id: None,
            device_class: None,
            timestamp: None,
            metrics: Metrics::new(),
            non_numeric: Vec::new(),
        };

        for (name, value) in fields {
            match name.as_str() {
                FIELD_DEVICE_ID => payload.device_id = optional_text(FIELD_DEVICE_ID, value)?,
                FIELD_DEVICE_CLASS => {
                    payload.device_class = optional_text(FIELD_DEVICE_CLASS, value)?
                }
                FIELD_TIMESTAMP => payload.timestamp = optional_timestamp(value)?,
                "" => {}
                other if SERVER_FIELDS.contains(&other) => {
                    tracing::debug!(field = other, "ignoring server-assigned field in payload");
                }
                _ => match value {
                    Value::Number(number) => match number.as_f64() {
                        Some(v) if v.is_finite() => {
                            payload.metrics.insert(name, v);
                        }
                        _ => payload.non_numeric.push(name),
                    },
                    Value::Null => {}
                    _ => {
                        tracing::debug!(field = %name, "ignoring non-numeric payload field");
                        payload.non_numeric.push(name);
                    }
                },
            }
        }
        Ok(payload)
    }

    /// Every metric the class requires must be present and numeric.
    pub(super) fn check_required(&self, class: &DeviceClass) -> Result<(), ValidationError> {
        for metric in &class.required {
            if self.metrics.contains_key(metric) {
                continue;
            }
            if self.non_numeric.iter().any(|name| name == metric) {
                return Err(ValidationError::NonNumericMetric(metric.clone()));
            }
            return Err(ValidationError::MissingMetric(metric.clone()));
        }
        Ok(())
    }
}

fn optional_text(field: &'static str, value: Value) -> Result<Option<String>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => {
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        other => Err(ValidationError::InvalidField {
            field,
            reason: format!("expected a string, got {}", json_kind(&other)),
        }),
    }
}

/// Milliseconds since the epoch. `0` counts as absent.
fn optional_timestamp(value: Value) -> Result<Option<i64>, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidField {
        field: FIELD_TIMESTAMP,
        reason,
    };
    let millis = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => {
            if let Some(v) = number.as_i64() {
                v
            } else {
                match number.as_f64() {
                    Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 => v as i64,
                    _ => return Err(invalid(format!("{number} is not whole milliseconds"))),
                }
            }
        }
        other => {
            return Err(invalid(format!(
                "expected milliseconds since epoch, got {}",
                json_kind(&other)
            )))
        }
    };
    match millis {
        0 => Ok(None),
        v if v < 0 => Err(invalid(format!("{v} is before the epoch"))),
        v => Ok(Some(v)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
