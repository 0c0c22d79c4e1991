//! Admission of device postings: validate, commit, hand off.
//!
//! A posting is checked against its device class before anything is
//! written; a rejected posting leaves no trace. Committed readings reach live
//! viewers through the store's commit feed, which the store fills before the
//! insert returns, so the device is only acknowledged after the hand-off.

mod payload;

use serde_json::Value;
use std::sync::Arc;

use crate::device_class::DeviceClasses;
use crate::error::IngestError;
use crate::reading::{NewReading, Reading, UNKNOWN_DEVICE_ID};
use crate::store::StoreHandle;
use crate::time::now_millis;
use payload::ReadingPayload;

pub struct IngestService {
    store: StoreHandle,
    classes: Arc<DeviceClasses>,
}

impl IngestService {
    pub fn new(store: StoreHandle, classes: Arc<DeviceClasses>) -> Self {
        Self { store, classes }
    }

    pub async fn admit(&self, body: Value) -> Result<Reading, IngestError> {
        let payload = ReadingPayload::from_json(body)?;
        let class = self.classes.resolve(payload.device_class.as_deref())?;
        payload.check_required(class)?;

        let received_at = now_millis();
        let reading = NewReading {
            device_id: payload
                .device_id
                .unwrap_or_else(|| UNKNOWN_DEVICE_ID.to_string()),
            timestamp: payload
                .timestamp
                .unwrap_or_else(|| received_at.timestamp_millis()),
            received_at,
            metrics: payload.metrics,
        };

        let stored = self.store.insert(reading).await?;
        tracing::debug!(
            id = stored.id,
            device_id = %stored.device_id,
            device_class = %class.name,
            "reading admitted"
        );
        Ok(stored)
    }
}
