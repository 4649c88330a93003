//! Water-deficit regression
//!
//! Every model is trained and queried on the same named, versioned feature
//! layout. Changing [`FEATURE_NAMES`] requires bumping
//! [`FEATURE_SCHEMA_VERSION`]; persisted models of an older version are
//! rejected on load and have to be retrained.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod models;
pub mod smartcore;
pub mod store;
pub mod training;

pub use models::Predictor;
pub use self::smartcore::{ForestModel, ForestParams};
pub use store::{FileModelRepository, InMemoryModelRepository, ModelRepository, ModelStore};
pub use training::{calculate_metrics, ModelTrainer, TrainingConfig};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FEATURE_COUNT: usize = 15;

/// Number of leading features that are sensor aggregates.
pub const SENSOR_FEATURE_COUNT: usize = 12;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temperature_1h",
    "humidity_1h",
    "soil_moisture_1h",
    "light_1h",
    "temperature_1d",
    "humidity_1d",
    "soil_moisture_1d",
    "light_1d",
    "temperature_1w",
    "humidity_1w",
    "soil_moisture_1w",
    "light_1w",
    "forecast_rainfall_mm",
    "forecast_temperature_c",
    "target_soil_moisture",
];

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Model input laid out in [`FEATURE_NAMES`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    /// Names of sensor features substituted with 0 for lack of data
    pub zero_filled: Vec<String>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>, zero_filled: Vec<String>) -> Result<Self> {
        if features.len() != FEATURE_COUNT {
            anyhow::bail!(
                "feature count mismatch: expected {FEATURE_COUNT}, got {}",
                features.len()
            );
        }
        if let Some(unknown) = zero_filled.iter().find(|n| feature_index(n).is_none()) {
            anyhow::bail!("unknown feature name {unknown}");
        }
        Ok(Self {
            features,
            zero_filled,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).and_then(|idx| self.features.get(idx).copied())
    }

    pub fn is_degraded(&self) -> bool {
        !self.zero_filled.is_empty()
    }

    /// Share of sensor aggregates backed by real readings.
    pub fn real_sensor_fraction(&self) -> f64 {
        let filled = self.zero_filled.len().min(SENSOR_FEATURE_COUNT);
        (SENSOR_FEATURE_COUNT - filled) as f64 / SENSOR_FEATURE_COUNT as f64
    }
}

/// One labelled day of history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub date: NaiveDate,
    pub features: FeatureVector,
    /// Water deficit in percentage points of soil moisture
    pub label: f64,
}

/// In-sample fit quality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: Uuid,
    pub device_id: Uuid,
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub metrics: ValidationMetrics,
    pub params: ForestParams,
    pub feature_names: Vec<String>,
}
