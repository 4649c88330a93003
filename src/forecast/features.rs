//! Feature engineering for the water-deficit model
//!
//! Sensor aggregates at three granularities are combined with the day's
//! weather and the zone's target soil moisture into one
//! [`FeatureVector`](crate::ml::FeatureVector).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

use super::WeatherService;
use crate::directory::{target_soil_moisture, ZoneOccupancyProvider};
use crate::domain::{day_start, DailyWeather, Device, Granularity, SensorType};
use crate::error::{IrrigationError, IrrigationResult};
use crate::ml::{FeatureVector, TrainingSample, FEATURE_COUNT, FEATURE_NAMES};
use crate::telemetry::{AggregateSet, Lookbacks, TelemetryAggregator};

/// Water still needed after the expected rain, never negative.
pub fn water_deficit(target: f64, soil_moisture: f64, rainfall_mm: f64) -> f64 {
    (target - soil_moisture - rainfall_mm).max(0.0)
}

/// One value per sensor type, `None` where no reading backs it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorValues {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub light: Option<f64>,
}

impl SensorValues {
    pub fn get(&self, sensor: SensorType) -> Option<f64> {
        match sensor {
            SensorType::Temperature => self.temperature,
            SensorType::Humidity => self.humidity,
            SensorType::SoilMoisture => self.soil_moisture,
            SensorType::Light => self.light,
        }
    }

    fn collect(mut pick: impl FnMut(SensorType) -> Option<f64>) -> Self {
        Self {
            temperature: pick(SensorType::Temperature),
            humidity: pick(SensorType::Humidity),
            soil_moisture: pick(SensorType::SoilMoisture),
            light: pick(SensorType::Light),
        }
    }

    pub fn is_empty(&self) -> bool {
        SensorType::ALL.iter().all(|s| self.get(*s).is_none())
    }
}

/// Latest aggregates of a device and its zone's moisture target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub taken_at: DateTime<Utc>,
    pub hour: SensorValues,
    pub day: SensorValues,
    pub week: SensorValues,
    pub target_soil_moisture: f64,
}

impl SensorSnapshot {
    /// Inference vector for a day with the given weather.
    pub fn features(&self, rainfall_mm: f64, temperature_c: f64) -> FeatureVector {
        assemble(
            [&self.hour, &self.day, &self.week],
            rainfall_mm,
            temperature_c,
            self.target_soil_moisture,
        )
    }
}

/// Labelled history of one device
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub samples: Vec<TrainingSample>,
    /// Days of the window left out for lack of soil moisture or weather data
    pub skipped_days: Vec<NaiveDate>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One calendar day of a device's past conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    /// Daily sensor averages
    pub sensors: SensorValues,
    pub rainfall_mm: Option<f64>,
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHistory {
    pub device_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<HistoryDay>,
}

fn assemble(
    levels: [&SensorValues; 3],
    rainfall_mm: f64,
    temperature_c: f64,
    target: f64,
) -> FeatureVector {
    let mut features = Vec::with_capacity(FEATURE_COUNT);
    let mut zero_filled = Vec::new();
    for values in levels {
        for sensor in SensorType::ALL {
            let value = values.get(sensor).unwrap_or_else(|| {
                zero_filled.push(FEATURE_NAMES[features.len()].to_string());
                0.0
            });
            features.push(value);
        }
    }
    features.extend([rainfall_mm, temperature_c, target]);

    FeatureVector {
        features,
        zero_filled,
    }
}

pub struct FeatureBuilder {
    aggregator: TelemetryAggregator,
    weather: Arc<dyn WeatherService>,
    zones: Arc<dyn ZoneOccupancyProvider>,
}

impl FeatureBuilder {
    pub fn new(
        aggregator: TelemetryAggregator,
        weather: Arc<dyn WeatherService>,
        zones: Arc<dyn ZoneOccupancyProvider>,
    ) -> Self {
        Self {
            aggregator,
            weather,
            zones,
        }
    }

    async fn target_for_zone(&self, device: &Device) -> IrrigationResult<f64> {
        let species = self
            .zones
            .species_in_zone(device.zone_id)
            .await
            .map_err(|e| {
                IrrigationError::data_unavailable(e.context(format!("species of zone {}", device.zone_id)))
            })?;
        target_soil_moisture(&species).ok_or_else(|| {
            IrrigationError::DataUnavailable(format!(
                "zone {} has no species with a soil moisture requirement",
                device.zone_id
            ))
        })
    }

    /// Latest aggregates up to `now`, with `hour_lookback` hourly periods.
    /// Fails with `NoSensorData` when no sensor has an hourly aggregate.
    pub async fn snapshot(
        &self,
        device: &Device,
        hour_lookback: u32,
        now: DateTime<Utc>,
    ) -> IrrigationResult<SensorSnapshot> {
        let lookbacks = Lookbacks {
            hours: hour_lookback,
            days: 2,
            weeks: 2,
        };
        let (set, target) = tokio::try_join!(
            self.aggregator.aggregate_all(device.id, lookbacks, now),
            self.target_for_zone(device),
        )?;

        let latest = |g: Granularity| SensorValues::collect(|s| set.latest(s, g));
        let snapshot = SensorSnapshot {
            taken_at: now,
            hour: latest(Granularity::Hour),
            day: latest(Granularity::Day),
            week: latest(Granularity::Week),
            target_soil_moisture: target,
        };

        if snapshot.hour.is_empty() {
            return Err(IrrigationError::NoSensorData {
                device_id: device.id,
                date: now.date_naive(),
            });
        }

        let missing = snapshot.features(0.0, 0.0).zero_filled;
        if !missing.is_empty() {
            warn!(device_id = %device.id, missing = ?missing, "sensor aggregates missing; zero-filled");
        }
        Ok(snapshot)
    }

    /// Daily sensor averages and observed weather for `start..=end`. Days
    /// without data keep `None` fields.
    pub async fn history(
        &self,
        device: &Device,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<DeviceHistory> {
        let span = u32::try_from((end - start).num_days() + 1).unwrap_or(0);
        let reference = day_start(end + Duration::days(1)) - Duration::nanoseconds(1);
        let lookbacks = Lookbacks {
            hours: 0,
            days: span,
            weeks: 0,
        };
        let (set, observed) = tokio::try_join!(
            self.aggregator.aggregate_all(device.id, lookbacks, reference),
            self.weather.historical_daily(&device.location, start, end),
        )?;

        let weather: HashMap<NaiveDate, DailyWeather> =
            observed.into_iter().map(|w| (w.date, w)).collect();
        let days = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| {
                let midnight = day_start(date);
                let observed = weather.get(&date);
                HistoryDay {
                    date,
                    sensors: SensorValues::collect(|s| set.at(s, Granularity::Day, midnight)),
                    rainfall_mm: observed.map(|w| w.rainfall_mm),
                    temperature_c: observed.map(|w| w.temperature_c),
                }
            })
            .collect();

        Ok(DeviceHistory {
            device_id: device.id,
            start,
            end,
            days,
        })
    }

    /// Labelled samples for the `window_days` calendar days before `now`'s
    /// date.
    pub async fn training_set(
        &self,
        device: &Device,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> IrrigationResult<TrainingSet> {
        let window_days = window_days.max(1);
        let today = now.date_naive();
        let end = today - Duration::days(1);
        let start = end - Duration::days(i64::from(window_days) - 1);
        let reference = day_start(today) - Duration::nanoseconds(1);

        let lookbacks = Lookbacks {
            hours: window_days * 24,
            days: window_days,
            weeks: window_days / 7 + 2,
        };
        let (set, history, target) = tokio::try_join!(
            self.aggregator.aggregate_all(device.id, lookbacks, reference),
            self.weather.historical_daily(&device.location, start, end),
            self.target_for_zone(device),
        )?;

        let weather: HashMap<NaiveDate, DailyWeather> =
            history.into_iter().map(|w| (w.date, w)).collect();

        let mut training = TrainingSet::default();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match labelled_day(&set, weather.get(&date), target, date) {
                Some(sample) => training.samples.push(sample),
                None => training.skipped_days.push(date),
            }
        }

        if !training.skipped_days.is_empty() {
            warn!(
                device_id = %device.id,
                skipped = training.skipped_days.len(),
                "days without soil moisture or weather left out of training"
            );
        }
        info!(
            device_id = %device.id,
            samples = training.len(),
            %start,
            %end,
            "training set built"
        );
        Ok(training)
    }
}

fn labelled_day(
    set: &AggregateSet,
    weather: Option<&DailyWeather>,
    target: f64,
    date: NaiveDate,
) -> Option<TrainingSample> {
    let weather = weather?;
    let midnight = day_start(date);
    let week_start = Granularity::Week.period_start(midnight);

    let hour = SensorValues::collect(|s| set.last_on(s, Granularity::Hour, date));
    let soil_moisture = hour.soil_moisture?;
    let day = SensorValues::collect(|s| set.at(s, Granularity::Day, midnight));
    let week = SensorValues::collect(|s| set.at(s, Granularity::Week, week_start));

    Some(TrainingSample {
        date,
        features: assemble(
            [&hour, &day, &week],
            weather.rainfall_mm,
            weather.temperature_c,
            target,
        ),
        label: water_deficit(target, soil_moisture, weather.rainfall_mm),
    })
}
