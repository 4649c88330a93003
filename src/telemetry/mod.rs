//! Raw sensor telemetry and its time-bucketed aggregation.

pub mod aggregator;

pub use aggregator::*;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{SensorReading, SensorType};

/// Append-only store of raw readings, owned by the ingestion pipeline.
#[async_trait]
pub trait TelemetryReadingsStore: Send + Sync {
    /// Readings of one sensor type with `start <= timestamp <= end`.
    async fn readings(
        &self,
        device_id: Uuid,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>>;
}

#[derive(Default)]
pub struct InMemoryReadingsStore {
    readings: RwLock<Vec<SensorReading>>,
}

impl InMemoryReadingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reading: SensorReading) {
        self.readings.write().push(reading);
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = SensorReading>) {
        self.readings.write().extend(readings);
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }
}

#[async_trait]
impl TelemetryReadingsStore for InMemoryReadingsStore {
    async fn readings(
        &self,
        device_id: Uuid,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        let readings = self.readings.read();
        Ok(readings
            .iter()
            .filter(|r| {
                r.device_id == device_id
                    && r.sensor_type == sensor_type
                    && r.timestamp >= start
                    && r.timestamp <= end
            })
            .cloned()
            .collect())
    }
}
