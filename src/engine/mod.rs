//! Schedule generation, training and same-day recommendations

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub mod worker;

pub use worker::{JobHandle, JobRetention, JobStatus, TrainingJob, TrainingWorker};

use crate::directory::DeviceDirectory;
use crate::domain::{
    DailyWeather, Device, NewSchedule, PredictedWaterSchedule, SchedulePatch, TodayForecast,
};
use crate::error::{IrrigationError, IrrigationResult};
use crate::forecast::{DeviceHistory, FeatureBuilder, SensorSnapshot, WeatherService};
use crate::ml::{FeatureVector, ModelMetadata, ModelStore, ModelTrainer};
use crate::repo::ScheduleRepository;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub training_window_days: u32,
    /// Hourly periods in the snapshot used for multi-day schedules
    pub inference_lookback_hours: u32,
    pub irrigate_threshold: f64,
    /// Confidence of a prediction built only from real sensor aggregates
    pub placeholder_confidence: f64,
    pub max_schedule_days: u32,
    pub max_history_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            training_window_days: 30,
            inference_lookback_hours: 24,
            irrigate_threshold: 1.0,
            placeholder_confidence: 0.7,
            max_schedule_days: 14,
            max_history_days: 366,
        }
    }
}

/// Same-day watering recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodayRecommendation {
    pub device_id: Uuid,
    pub date: NaiveDate,
    pub irrigate: bool,
    /// Predicted water deficit
    pub score: f64,
    pub confidence: f64,
    pub degraded: bool,
    pub zero_filled: Vec<String>,
    pub sensor_snapshot: SensorSnapshot,
    pub forecast_snapshot: TodayForecast,
}

pub struct IrrigationEngine {
    devices: Arc<dyn DeviceDirectory>,
    weather: Arc<dyn WeatherService>,
    features: FeatureBuilder,
    trainer: ModelTrainer,
    models: Arc<ModelStore>,
    schedules: Arc<dyn ScheduleRepository>,
    settings: EngineSettings,
}

impl IrrigationEngine {
    pub fn new(
        devices: Arc<dyn DeviceDirectory>,
        weather: Arc<dyn WeatherService>,
        features: FeatureBuilder,
        trainer: ModelTrainer,
        models: Arc<ModelStore>,
        schedules: Arc<dyn ScheduleRepository>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            devices,
            weather,
            features,
            trainer,
            models,
            schedules,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn device(&self, device_id: Uuid) -> IrrigationResult<Device> {
        self.devices
            .device(device_id)
            .await
            .map_err(|e| IrrigationError::storage(e.context(format!("device {device_id} lookup"))))?
            .ok_or_else(|| IrrigationError::device_not_found(device_id))
    }

    fn check_days(&self, days: u32) -> IrrigationResult<()> {
        if days == 0 || days > self.settings.max_schedule_days {
            return Err(IrrigationError::InvalidSchedule(format!(
                "days must be between 1 and {}, got {days}",
                self.settings.max_schedule_days
            )));
        }
        Ok(())
    }

    fn confidence(&self, features: &FeatureVector) -> f64 {
        (self.settings.placeholder_confidence * features.real_sensor_fraction()).clamp(0.0, 1.0)
    }

    pub async fn generate_schedule(
        &self,
        device_id: Uuid,
        days: u32,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        self.generate_schedule_at(device_id, days, Utc::now()).await
    }

    /// Predicts and stores one row per day for `days` days starting on
    /// `now`'s date. Nothing is stored unless every day succeeds.
    pub async fn generate_schedule_at(
        &self,
        device_id: Uuid,
        days: u32,
        now: DateTime<Utc>,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        self.check_days(days)?;
        let device = self.device(device_id).await?;
        let model = self.models.get(device_id)?;

        let today = now.date_naive();
        let (forecast, snapshot) = tokio::try_join!(
            self.weather.daily_forecast(&device.location, today, days),
            self.features
                .snapshot(&device, self.settings.inference_lookback_hours, now),
        )?;
        if forecast.len() != days as usize {
            return Err(IrrigationError::ForecastUnavailable(format!(
                "expected {days} forecast days, got {}",
                forecast.len()
            )));
        }
        for (expected, day) in today.iter_days().zip(&forecast) {
            if day.date != expected {
                return Err(IrrigationError::ForecastUnavailable(format!(
                    "forecast day {} does not line up with {expected}",
                    day.date
                )));
            }
        }

        let rows = forecast
            .iter()
            .map(|day| -> IrrigationResult<NewSchedule> {
                let features = snapshot.features(day.rainfall_mm, day.temperature_c);
                let amount = model.predict(&features).map_err(IrrigationError::model)?;
                Ok(NewSchedule {
                    device_id,
                    scheduled_date: day.date,
                    water_amount: amount.max(0.0),
                    confidence: self.confidence(&features),
                })
            })
            .collect::<IrrigationResult<Vec<_>>>()?;

        let created = self.schedules.create_many(rows, now).await?;
        info!(%device_id, days, rows = created.len(), "schedule generated");
        Ok(created)
    }

    pub async fn schedules_by_device(&self, device_id: Uuid) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        self.schedules.list_by_device(device_id).await
    }

    pub async fn schedules_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        self.schedules.list_by_date_range(start, end).await
    }

    pub async fn update_schedule(
        &self,
        id: Uuid,
        patch: &SchedulePatch,
    ) -> IrrigationResult<PredictedWaterSchedule> {
        self.schedules.update(id, patch).await
    }

    pub async fn delete_schedule(&self, id: Uuid) -> IrrigationResult<()> {
        self.schedules.delete(id).await
    }

    pub async fn train_model(&self, device_id: Uuid) -> IrrigationResult<ModelMetadata> {
        self.train_model_at(device_id, Utc::now()).await
    }

    /// Retrains the device's model on the window ending the day before
    /// `now` and replaces the current one.
    pub async fn train_model_at(
        &self,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> IrrigationResult<ModelMetadata> {
        let device = self.device(device_id).await?;
        if !device.is_active() {
            return Err(IrrigationError::DeviceInactive(device_id));
        }

        let training = self
            .features
            .training_set(&device, self.settings.training_window_days, now)
            .await?;

        let trainer = self.trainer.clone();
        let samples = training.samples;
        let model = tokio::task::spawn_blocking(move || trainer.train(device_id, &samples, now))
            .await
            .map_err(|e| IrrigationError::Model(format!("training task failed: {e}")))??;

        let handle = self.models.save(device_id, model).await?;
        Ok(handle.metadata().clone())
    }

    pub async fn predict_today(&self, device_id: Uuid) -> IrrigationResult<TodayRecommendation> {
        self.predict_today_at(device_id, Utc::now()).await
    }

    /// Recommendation from today's telemetry (since 00:00 UTC) and the
    /// 24-hour forecast.
    pub async fn predict_today_at(
        &self,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> IrrigationResult<TodayRecommendation> {
        let device = self.device(device_id).await?;
        let model = self.models.get(device_id)?;

        let hours_today = now.hour() + 1;
        let (forecast, snapshot) = tokio::try_join!(
            self.weather.today_forecast(&device.location),
            self.features.snapshot(&device, hours_today, now),
        )?;

        let features = snapshot.features(forecast.expected_rainfall_mm(), forecast.temperature_c());
        let score = model.predict(&features).map_err(IrrigationError::model)?;
        let irrigate = score > self.settings.irrigate_threshold;

        info!(%device_id, score, irrigate, degraded = features.is_degraded(), "same-day prediction");
        Ok(TodayRecommendation {
            device_id,
            date: now.date_naive(),
            irrigate,
            score,
            confidence: self.confidence(&features),
            degraded: features.is_degraded(),
            zero_filled: features.zero_filled,
            sensor_snapshot: snapshot,
            forecast_snapshot: forecast,
        })
    }

    pub fn model_metadata(&self, device_id: Uuid) -> IrrigationResult<ModelMetadata> {
        self.models.metadata(device_id)
    }

    pub fn trained_devices(&self) -> usize {
        self.models.len()
    }

    /// Daily sensor averages and observed weather of a device for every day
    /// of `start..=end`.
    pub async fn training_history(
        &self,
        device_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<DeviceHistory> {
        if end < start {
            return Err(IrrigationError::InvalidScheduleRange { start, end });
        }
        let span = (end - start).num_days() + 1;
        if span > i64::from(self.settings.max_history_days) {
            return Err(IrrigationError::InvalidSchedule(format!(
                "history spans {span} days, at most {} allowed",
                self.settings.max_history_days
            )));
        }
        let device = self.device(device_id).await?;
        self.features.history(&device, start, end).await
    }

    /// Daily forecast for the device's location, starting today.
    pub async fn forecast_outlook(&self, device_id: Uuid, days: u32) -> IrrigationResult<Vec<DailyWeather>> {
        self.check_days(days)?;
        let device = self.device(device_id).await?;
        self.weather
            .daily_forecast(&device.location, Utc::now().date_naive(), days)
            .await
    }
}
