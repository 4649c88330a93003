#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{SensorReading, SensorType};
use crate::telemetry::TelemetryReadingsStore;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReadingRow {
    value: f64,
    recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgReadingsStore {
    pool: PgPool,
}

impl PgReadingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryReadingsStore for PgReadingsStore {
    async fn readings(
        &self,
        device_id: Uuid,
        sensor_type: SensorType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT value, recorded_at
            FROM sensor_readings
            WHERE device_id = $1
              AND sensor_type = $2
              AND recorded_at BETWEEN $3 AND $4
            ORDER BY recorded_at
            "#,
        )
        .bind(device_id)
        .bind(sensor_type.as_ref())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("{sensor_type} readings query failed"))?;

        Ok(rows
            .into_iter()
            .map(|r| SensorReading {
                device_id,
                sensor_type,
                value: r.value,
                timestamp: r.recorded_at,
            })
            .collect())
    }
}
