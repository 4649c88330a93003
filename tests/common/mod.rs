#![allow(dead_code)]
//! Shared fixtures: a zone with one hub, hourly telemetry and
//! deterministic weather.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use uuid::Uuid;

use predictive_irrigation::directory::InMemoryDirectory;
use predictive_irrigation::domain::{
    day_start, DailyWeather, Device, DeviceStatus, GeoLocation, SensorReading, SensorType,
    SpeciesMoisture, TodayForecast, ValueRange, Wind,
};
use predictive_irrigation::engine::{EngineSettings, IrrigationEngine};
use predictive_irrigation::error::{IrrigationError, IrrigationResult};
use predictive_irrigation::forecast::{FeatureBuilder, WeatherService};
use predictive_irrigation::ml::{
    ForestParams, InMemoryModelRepository, ModelStore, ModelTrainer, TrainingConfig,
};
use predictive_irrigation::repo::InMemoryScheduleRepository;
use predictive_irrigation::state::Collaborators;
use predictive_irrigation::telemetry::{InMemoryReadingsStore, TelemetryAggregator};

pub const ZONE: i64 = 1;
pub const TARGET: f64 = 60.0;

pub const HERE: GeoLocation = GeoLocation {
    latitude: 1.3521,
    longitude: 103.8198,
};

/// Rainfall cycles 0, 2, 4, 6, 8 mm by day of month.
pub struct StubWeather;

impl StubWeather {
    pub fn day(date: NaiveDate) -> DailyWeather {
        DailyWeather {
            date,
            rainfall_mm: f64::from(date.day() % 5) * 2.0,
            temperature_c: 27.0 + f64::from(date.day() % 3),
            station_count: 2,
        }
    }
}

#[async_trait]
impl WeatherService for StubWeather {
    async fn daily_forecast(
        &self,
        _location: &GeoLocation,
        start: NaiveDate,
        days: u32,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        if days == 0 {
            return Err(IrrigationError::ForecastUnavailable("zero days".into()));
        }
        Ok(start.iter_days().take(days as usize).map(Self::day).collect())
    }

    async fn today_forecast(&self, _location: &GeoLocation) -> IrrigationResult<TodayForecast> {
        let from = day_start(Utc::now().date_naive());
        Ok(TodayForecast {
            valid_from: from,
            valid_to: from + Duration::days(1),
            temperature: ValueRange { low: 25.0, high: 31.0 },
            relative_humidity: ValueRange { low: 60.0, high: 90.0 },
            forecast_text: "Light Rain".into(),
            wind: Wind {
                speed: ValueRange { low: 10.0, high: 20.0 },
                direction: "NE".into(),
            },
        })
    }

    async fn historical_daily(
        &self,
        _location: &GeoLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<DailyWeather>> {
        Ok(start.iter_days().take_while(|d| *d <= end).map(Self::day).collect())
    }
}

pub struct Garden {
    pub directory: Arc<InMemoryDirectory>,
    pub readings: Arc<InMemoryReadingsStore>,
    pub schedules: Arc<InMemoryScheduleRepository>,
    pub models: Arc<InMemoryModelRepository>,
}

impl Garden {
    pub fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.set_zone_species(
            ZONE,
            vec![
                SpeciesMoisture {
                    species_id: 1,
                    name: "fern".into(),
                    ideal_soil_moisture: 55.0,
                },
                SpeciesMoisture {
                    species_id: 2,
                    name: "orchid".into(),
                    ideal_soil_moisture: 65.0,
                },
            ],
        );
        Self {
            directory,
            readings: Arc::new(InMemoryReadingsStore::new()),
            schedules: Arc::new(InMemoryScheduleRepository::new()),
            models: Arc::new(InMemoryModelRepository::new()),
        }
    }

    pub fn add_device(&self, status: DeviceStatus) -> Uuid {
        let id = Uuid::new_v4();
        self.directory.upsert_device(Device {
            id,
            name: format!("hub-{}", &id.to_string()[..8]),
            location: HERE,
            zone_id: ZONE,
            status,
        });
        id
    }

    /// Hourly readings of every sensor from `days` days before `now` up to
    /// the hour containing `now`. Soil moisture is constant within a day
    /// and cycles between 30 and 54 across days.
    pub fn record_history(&self, device_id: Uuid, days: i64, now: DateTime<Utc>) {
        let mut ts = day_start(now.date_naive()) - Duration::days(days);
        while ts <= now {
            let hour = f64::from(ts.hour());
            let soil = 30.0 + f64::from(ts.day() % 7) * 4.0;
            for (sensor_type, value) in [
                (SensorType::SoilMoisture, soil),
                (SensorType::Temperature, 24.0 + hour / 4.0),
                (SensorType::Humidity, 90.0 - hour),
                (SensorType::Light, if (7.0..19.0).contains(&hour) { 40_000.0 } else { 0.0 }),
            ] {
                self.readings.push(SensorReading {
                    device_id,
                    sensor_type,
                    value,
                    timestamp: ts,
                });
            }
            ts += Duration::hours(1);
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            devices: self.directory.clone(),
            zones: self.directory.clone(),
            readings: self.readings.clone(),
            schedules: self.schedules.clone(),
            models: self.models.clone(),
        }
    }

    pub fn engine(&self) -> IrrigationEngine {
        let weather: Arc<dyn WeatherService> = Arc::new(StubWeather);
        let features = FeatureBuilder::new(
            TelemetryAggregator::new(self.readings.clone(), std::time::Duration::from_secs(2)),
            weather.clone(),
            self.directory.clone(),
        );
        IrrigationEngine::new(
            self.directory.clone(),
            weather,
            features,
            ModelTrainer::new(small_forest()),
            Arc::new(ModelStore::new(self.models.clone())),
            self.schedules.clone(),
            EngineSettings::default(),
        )
    }
}

pub fn small_forest() -> TrainingConfig {
    TrainingConfig {
        params: ForestParams {
            n_trees: 25,
            ..Default::default()
        },
        min_samples: 10,
    }
}
