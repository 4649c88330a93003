use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::engine::{EngineSettings, JobRetention};
use crate::ml::{ForestParams, TrainingConfig as TrainerConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub weather: WeatherConfig,
    pub telemetry: TelemetryConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub models: ModelsConfig,
    pub db: DbConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".into(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub store_timeout_secs: u64,
    pub inference_lookback_hours: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            store_timeout_secs: 5,
            inference_lookback_hours: 24,
        }
    }
}

impl TelemetryConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub window_days: u32,
    pub min_samples: usize,
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub features_per_split: Option<usize>,
    pub seed: u64,
    pub max_concurrent_jobs: usize,
    /// Finished jobs stay pollable for this long
    pub job_ttl_secs: u64,
    pub max_tracked_jobs: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let forest = ForestParams::default();
        Self {
            window_days: 30,
            min_samples: 10,
            n_trees: forest.n_trees,
            max_depth: forest.max_depth,
            min_samples_split: forest.min_samples_split,
            min_samples_leaf: forest.min_samples_leaf,
            features_per_split: forest.features_per_split,
            seed: forest.seed,
            max_concurrent_jobs: 2,
            job_ttl_secs: 3600,
            max_tracked_jobs: 1000,
        }
    }
}

impl TrainingConfig {
    pub fn trainer(&self) -> TrainerConfig {
        TrainerConfig {
            params: ForestParams {
                n_trees: self.n_trees,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                min_samples_leaf: self.min_samples_leaf,
                features_per_split: self.features_per_split,
                seed: self.seed,
            },
            min_samples: self.min_samples,
        }
    }

    pub fn job_retention(&self) -> JobRetention {
        JobRetention {
            ttl: Duration::from_secs(self.job_ttl_secs),
            max_jobs: self.max_tracked_jobs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub irrigate_threshold: f64,
    pub placeholder_confidence: f64,
    pub max_schedule_days: u32,
    /// Longest date range served by the history endpoint
    pub max_history_days: u32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            irrigate_threshold: 1.0,
            placeholder_confidence: 0.7,
            max_schedule_days: 14,
            max_history_days: 366,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory of persisted models when no database is configured
    pub dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/models"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed a demo zone, device and readings into the in-memory stores
    pub enabled: bool,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 7,
        }
    }
}

impl Config {
    /// Defaults, then `config/default.toml`, then `IRRIGATION__*` env vars.
    pub fn load() -> Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("IRRIGATION__").split("__")),
        )
    }

    pub fn extract(figment: Figment) -> Result<Self> {
        figment.extract().context("invalid configuration")
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            training_window_days: self.training.window_days,
            inference_lookback_hours: self.telemetry.inference_lookback_hours,
            irrigate_threshold: self.prediction.irrigate_threshold,
            placeholder_confidence: self.prediction.placeholder_confidence,
            max_schedule_days: self.prediction.max_schedule_days,
            max_history_days: self.prediction.max_history_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.training.trainer().params, ForestParams::default());
        assert_eq!(cfg.training.trainer().min_samples, 10);

        let settings = cfg.engine_settings();
        let expected = EngineSettings::default();
        assert_eq!(settings.training_window_days, expected.training_window_days);
        assert_eq!(settings.placeholder_confidence, expected.placeholder_confidence);
        assert_eq!(settings.irrigate_threshold, expected.irrigate_threshold);
        assert_eq!(settings.max_history_days, expected.max_history_days);
        assert_eq!(cfg.training.job_retention().max_jobs, JobRetention::default().max_jobs);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
            r#"
            [server]
            port = 9000

            [training]
            n_trees = 25
            window_days = 45

            [weather]
            base_url = "https://weather.example"
            api_key = "k"
            "#,
        ));

        let cfg = Config::extract(figment).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.training.n_trees, 25);
        assert_eq!(cfg.training.max_depth, 10);
        assert_eq!(cfg.engine_settings().training_window_days, 45);
        assert_eq!(cfg.weather.api_key.as_deref(), Some("k"));
        assert_eq!(cfg.server.socket_addr().unwrap().port(), 9000);
    }
}
