//! # Garden Simulation
//!
//! Stand-ins for the park systems the engine consumes, so the service can run
//! locally without a telemetry pipeline or a weather provider.
//!
//! - **Weather**: seeded per-day rainfall and temperature, served through
//!   [`WeatherService`](crate::forecast::WeatherService)
//! - **Garden**: one demo zone and hub with hourly readings driven by that
//!   weather (soil dries out, rain recharges it)

pub mod garden;
pub mod weather;

pub use garden::{GardenSimulator, GardenSimulatorConfig, DEMO_DEVICE_ID, DEMO_ZONE_ID};
pub use weather::{SimulatedWeather, WeatherSimulatorConfig};
