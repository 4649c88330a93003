//! Demo zone with one irrigation hub and hourly sensor history.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SimulatedWeather;
use crate::directory::InMemoryDirectory;
use crate::domain::{
    day_start, Device, DeviceStatus, GeoLocation, SensorReading, SensorType, SpeciesMoisture,
};
use crate::telemetry::InMemoryReadingsStore;

pub const DEMO_DEVICE_ID: Uuid = Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0001);
pub const DEMO_ZONE_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenSimulatorConfig {
    pub random_seed: u64,
    /// Days of hourly history ending at the current hour
    pub history_days: u32,
    pub location: GeoLocation,
    /// Fraction of soil moisture lost per day without rain
    pub daily_drying: f64,
    /// Soil moisture gained per mm of rain
    pub rain_uptake: f64,
}

impl Default for GardenSimulatorConfig {
    fn default() -> Self {
        Self {
            random_seed: 7,
            history_days: 35,
            location: GeoLocation {
                latitude: 1.3521,
                longitude: 103.8198,
            },
            daily_drying: 0.12,
            rain_uptake: 1.5,
        }
    }
}

pub struct GardenSimulator {
    config: GardenSimulatorConfig,
    rng: StdRng,
}

impl GardenSimulator {
    pub fn new(config: GardenSimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.random_seed);
        Self { config, rng }
    }

    pub fn device(&self) -> Device {
        Device {
            id: DEMO_DEVICE_ID,
            name: "Demo Hub".to_string(),
            location: self.config.location,
            zone_id: DEMO_ZONE_ID,
            status: DeviceStatus::Active,
        }
    }

    pub fn species(&self) -> Vec<SpeciesMoisture> {
        vec![
            SpeciesMoisture {
                species_id: 1,
                name: "Bird's nest fern".to_string(),
                ideal_soil_moisture: 65.0,
            },
            SpeciesMoisture {
                species_id: 2,
                name: "Heliconia".to_string(),
                ideal_soil_moisture: 55.0,
            },
        ]
    }

    /// Hourly readings of all four sensors from `history_days` days before
    /// `now` up to the hour containing `now`.
    pub fn readings(&mut self, weather: &SimulatedWeather, now: DateTime<Utc>) -> Vec<SensorReading> {
        let end = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let start = day_start(now.date_naive()) - Duration::days(i64::from(self.config.history_days));

        let mut readings = Vec::new();
        let mut moisture = 50.0;
        let mut ts = start;
        while ts <= end {
            let day = weather.day(ts.date_naive());
            let hour = f64::from(ts.hour());

            moisture *= 1.0 - self.config.daily_drying / 24.0;
            moisture += day.rainfall_mm * self.config.rain_uptake / 24.0;
            moisture = (moisture + self.rng.gen_range(-0.3..0.3)).clamp(15.0, 90.0);

            // warmest mid-afternoon, coolest before dawn
            let diurnal = ((hour - 9.0) / 24.0 * std::f64::consts::TAU).sin();
            let temperature = day.temperature_c + 3.0 * diurnal + self.rng.gen_range(-0.5..0.5);
            let humidity = (85.0 - 12.0 * diurnal + day.rainfall_mm * 0.4).clamp(40.0, 100.0);
            let light = if (7.0..19.0).contains(&hour) {
                let sun = ((hour - 7.0) / 12.0 * std::f64::consts::PI).sin();
                let cloud = if day.rainfall_mm > 0.0 { 0.5 } else { 1.0 };
                60_000.0 * sun * cloud
            } else {
                0.0
            };

            for (sensor_type, value) in [
                (SensorType::Temperature, temperature),
                (SensorType::Humidity, humidity),
                (SensorType::SoilMoisture, moisture),
                (SensorType::Light, light),
            ] {
                readings.push(SensorReading {
                    device_id: DEMO_DEVICE_ID,
                    sensor_type,
                    value,
                    timestamp: ts,
                });
            }
            ts += Duration::hours(1);
        }
        readings
    }

    /// Registers the demo device and zone and fills the readings store.
    pub fn seed(
        &mut self,
        directory: &InMemoryDirectory,
        store: &InMemoryReadingsStore,
        weather: &SimulatedWeather,
        now: DateTime<Utc>,
    ) -> Device {
        let device = self.device();
        directory.upsert_device(device.clone());
        directory.set_zone_species(DEMO_ZONE_ID, self.species());
        store.extend(self.readings(weather, now));
        device
    }
}
