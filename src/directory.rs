//! Device and zone lookups owned by the surrounding park system.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{Device, SpeciesMoisture};

#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn device(&self, id: Uuid) -> Result<Option<Device>>;
}

#[async_trait]
pub trait ZoneOccupancyProvider: Send + Sync {
    async fn species_in_zone(&self, zone_id: i64) -> Result<Vec<SpeciesMoisture>>;
}

/// Mean ideal soil moisture over the species of a zone.
pub fn target_soil_moisture(species: &[SpeciesMoisture]) -> Option<f64> {
    if species.is_empty() {
        return None;
    }
    let sum: f64 = species.iter().map(|s| s.ideal_soil_moisture).sum();
    Some(sum / species.len() as f64)
}

#[derive(Default)]
pub struct InMemoryDirectory {
    devices: RwLock<HashMap<Uuid, Device>>,
    zones: RwLock<HashMap<i64, Vec<SpeciesMoisture>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_device(&self, device: Device) {
        self.devices.write().insert(device.id, device);
    }

    pub fn set_zone_species(&self, zone_id: i64, species: Vec<SpeciesMoisture>) {
        self.zones.write().insert(zone_id, species);
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDirectory {
    async fn device(&self, id: Uuid) -> Result<Option<Device>> {
        Ok(self.devices.read().get(&id).cloned())
    }
}

#[async_trait]
impl ZoneOccupancyProvider for InMemoryDirectory {
    async fn species_in_zone(&self, zone_id: i64) -> Result<Vec<SpeciesMoisture>> {
        Ok(self.zones.read().get(&zone_id).cloned().unwrap_or_default())
    }
}
