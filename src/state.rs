use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::config::Config;
use crate::directory::{DeviceDirectory, InMemoryDirectory, ZoneOccupancyProvider};
use crate::engine::{IrrigationEngine, TrainingWorker};
use crate::forecast::{FeatureBuilder, HttpWeatherClient, WeatherService};
use crate::ml::{FileModelRepository, ModelRepository, ModelStore, ModelTrainer};
use crate::repo::{InMemoryScheduleRepository, ScheduleRepository};
use crate::telemetry::{InMemoryReadingsStore, TelemetryAggregator, TelemetryReadingsStore};

/// Shared handles for the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<IrrigationEngine>,
    pub worker: TrainingWorker,
}

/// Storage and directory implementations the engine is wired against
pub struct Collaborators {
    pub devices: Arc<dyn DeviceDirectory>,
    pub zones: Arc<dyn ZoneOccupancyProvider>,
    pub readings: Arc<dyn TelemetryReadingsStore>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub models: Arc<dyn ModelRepository>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let (weather, collaborators) = Self::wire(&cfg).await?;
        Self::from_parts(cfg, weather, collaborators).await
    }

    /// Builds the engine over already constructed collaborators and loads
    /// every persisted model into the cache.
    pub async fn from_parts(
        cfg: Config,
        weather: Arc<dyn WeatherService>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let features = FeatureBuilder::new(
            TelemetryAggregator::new(collaborators.readings, cfg.telemetry.store_timeout()),
            weather.clone(),
            collaborators.zones,
        );

        let models = Arc::new(ModelStore::new(collaborators.models));
        let loaded = models.load_all().await.context("failed to load models")?;
        info!(models = loaded, "model cache populated");

        let engine = Arc::new(IrrigationEngine::new(
            collaborators.devices,
            weather,
            features,
            ModelTrainer::new(cfg.training.trainer()),
            models,
            collaborators.schedules,
            cfg.engine_settings(),
        ));
        let worker = TrainingWorker::new(
            engine.clone(),
            cfg.training.max_concurrent_jobs,
            cfg.training.job_retention(),
        );

        Ok(Self {
            cfg: Arc::new(cfg),
            engine,
            worker,
        })
    }

    async fn wire(cfg: &Config) -> Result<(Arc<dyn WeatherService>, Collaborators)> {
        #[cfg(feature = "sim")]
        let simulated = cfg
            .simulation
            .enabled
            .then(|| crate::simulation::SimulatedWeather::with_seed(cfg.simulation.seed));

        #[cfg(feature = "sim")]
        let weather: Arc<dyn WeatherService> = match &simulated {
            Some(sim) => {
                info!("using simulated weather");
                Arc::new(sim.clone())
            }
            None => http_weather(cfg)?,
        };
        #[cfg(not(feature = "sim"))]
        let weather = http_weather(cfg)?;

        #[cfg(feature = "db")]
        if let Some(url) = cfg.db.url.as_deref() {
            let pg = crate::repo::PgRepo::connect(url, cfg.db.max_connections).await?;
            pg.migrate().await?;
            info!("using postgres storage");
            let directory = Arc::new(pg.devices());
            return Ok((
                weather,
                Collaborators {
                    devices: directory.clone(),
                    zones: directory,
                    readings: Arc::new(pg.readings()),
                    schedules: Arc::new(pg.schedules()),
                    models: Arc::new(pg.models()),
                },
            ));
        }

        let directory = Arc::new(InMemoryDirectory::new());
        let readings = Arc::new(InMemoryReadingsStore::new());

        #[cfg(feature = "sim")]
        if let Some(sim) = &simulated {
            use crate::simulation::{GardenSimulator, GardenSimulatorConfig};

            let mut garden = GardenSimulator::new(GardenSimulatorConfig {
                random_seed: cfg.simulation.seed,
                ..Default::default()
            });
            let device = garden.seed(&directory, &readings, sim, chrono::Utc::now());
            info!(device_id = %device.id, readings = readings.len(), "seeded demo garden");
        }

        info!(dir = %cfg.models.dir.display(), "using in-memory storage");
        Ok((
            weather,
            Collaborators {
                devices: directory.clone(),
                zones: directory,
                readings,
                schedules: Arc::new(InMemoryScheduleRepository::new()),
                models: Arc::new(FileModelRepository::new(cfg.models.dir.clone())),
            },
        ))
    }
}

fn http_weather(cfg: &Config) -> Result<Arc<dyn WeatherService>> {
    let client = HttpWeatherClient::new(
        cfg.weather.base_url.clone(),
        cfg.weather.api_key.clone(),
        Duration::from_secs(cfg.weather.timeout_secs),
    )?;
    Ok(Arc::new(client))
}
