//! Predictive irrigation engine
//!
//! Learns per-device water deficits from sensor telemetry and weather history
//! and turns forecasts into watering schedules and same-day recommendations.

pub mod api;
pub mod config;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod logging;
pub mod ml;
pub mod repo;
#[cfg(feature = "sim")]
pub mod simulation;
pub mod state;
pub mod telemetry;

pub use error::{IrrigationError, IrrigationResult};
