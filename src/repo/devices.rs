#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::directory::{DeviceDirectory, ZoneOccupancyProvider};
use crate::domain::{Device, DeviceStatus, GeoLocation, SpeciesMoisture};

#[derive(Debug, Clone, sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    name: String,
    latitude: f64,
    longitude: f64,
    zone_id: i64,
    status: String,
}

impl TryFrom<DeviceRow> for Device {
    type Error = anyhow::Error;

    fn try_from(row: DeviceRow) -> Result<Self> {
        let status = DeviceStatus::from_str(&row.status)
            .with_context(|| format!("device {} has unknown status {:?}", row.id, row.status))?;
        Ok(Device {
            id: row.id,
            name: row.name,
            location: GeoLocation {
                latitude: row.latitude,
                longitude: row.longitude,
            },
            zone_id: row.zone_id,
            status,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SpeciesRow {
    species_id: i64,
    name: String,
    ideal_soil_moisture: f64,
}

/// Devices and zone occupancy read from the park database.
#[derive(Clone)]
pub struct PgDeviceDirectory {
    pool: PgPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn device(&self, id: Uuid) -> Result<Option<Device>> {
        let row: Option<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, name, latitude, longitude, zone_id, status
            FROM devices
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("device lookup failed")?;

        row.map(Device::try_from).transpose()
    }
}

#[async_trait]
impl ZoneOccupancyProvider for PgDeviceDirectory {
    async fn species_in_zone(&self, zone_id: i64) -> Result<Vec<SpeciesMoisture>> {
        let rows: Vec<SpeciesRow> = sqlx::query_as(
            r#"
            SELECT species_id, name, ideal_soil_moisture
            FROM zone_species
            WHERE zone_id = $1
            ORDER BY species_id
            "#,
        )
        .bind(zone_id)
        .fetch_all(&self.pool)
        .await
        .context("zone species lookup failed")?;

        Ok(rows
            .into_iter()
            .map(|r| SpeciesMoisture {
                species_id: r.species_id,
                name: r.name,
                ideal_soil_moisture: r.ideal_soil_moisture,
            })
            .collect())
    }
}
