use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tracing::debug;
use uuid::Uuid;

use super::TelemetryReadingsStore;
use crate::domain::{AggregateWindow, Granularity, SensorReading, SensorType};
use crate::error::{IrrigationError, IrrigationResult};

/// Number of trailing periods to aggregate per granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookbacks {
    pub hours: u32,
    pub days: u32,
    pub weeks: u32,
}

impl Lookbacks {
    pub fn get(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Hour => self.hours,
            Granularity::Day => self.days,
            Granularity::Week => self.weeks,
        }
    }
}

/// Averages of every (sensor type, granularity) pair for one device
#[derive(Debug, Clone, Default)]
pub struct AggregateSet {
    series: HashMap<(SensorType, Granularity), Vec<AggregateWindow>>,
}

impl AggregateSet {
    pub fn series(&self, sensor: SensorType, granularity: Granularity) -> &[AggregateWindow] {
        self.series
            .get(&(sensor, granularity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn latest(&self, sensor: SensorType, granularity: Granularity) -> Option<f64> {
        self.series(sensor, granularity).last().map(|w| w.average)
    }

    /// Average of the period starting exactly at `period_start`.
    pub fn at(
        &self,
        sensor: SensorType,
        granularity: Granularity,
        period_start: DateTime<Utc>,
    ) -> Option<f64> {
        let series = self.series(sensor, granularity);
        series
            .binary_search_by_key(&period_start, |w| w.period_start)
            .ok()
            .map(|idx| series[idx].average)
    }

    /// Most recent window whose period starts on `date`.
    pub fn last_on(
        &self,
        sensor: SensorType,
        granularity: Granularity,
        date: NaiveDate,
    ) -> Option<f64> {
        self.series(sensor, granularity)
            .iter()
            .rev()
            .find(|w| w.period_start.date_naive() == date)
            .map(|w| w.average)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }
}

/// Computes per-period sensor averages from the raw readings store.
#[derive(Clone)]
pub struct TelemetryAggregator {
    store: Arc<dyn TelemetryReadingsStore>,
    timeout: Duration,
}

impl TelemetryAggregator {
    pub fn new(store: Arc<dyn TelemetryReadingsStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Ascending averages of the `lookback` periods ending with the one that
    /// contains `reference`. Periods without readings are omitted.
    pub async fn aggregate(
        &self,
        device_id: Uuid,
        sensor_type: SensorType,
        granularity: Granularity,
        lookback: u32,
        reference: DateTime<Utc>,
    ) -> IrrigationResult<Vec<AggregateWindow>> {
        if lookback == 0 {
            return Ok(Vec::new());
        }

        let start = granularity.window_start(reference, lookback);
        let readings = tokio::time::timeout(
            self.timeout,
            self.store.readings(device_id, sensor_type, start, reference),
        )
        .await
        .map_err(|_| {
            IrrigationError::DataUnavailable(format!(
                "{sensor_type} readings for device {device_id} timed out after {:?}",
                self.timeout
            ))
        })?
        .map_err(|e| {
            IrrigationError::data_unavailable(
                e.context(format!("{sensor_type} readings for device {device_id}")),
            )
        })?;

        let windows = bucket_averages(&readings, granularity);
        debug!(
            %device_id,
            sensor = %sensor_type,
            %granularity,
            readings = readings.len(),
            periods = windows.len(),
            "aggregated telemetry"
        );
        Ok(windows)
    }

    /// Aggregates every sensor type at every granularity concurrently.
    pub async fn aggregate_all(
        &self,
        device_id: Uuid,
        lookbacks: Lookbacks,
        reference: DateTime<Utc>,
    ) -> IrrigationResult<AggregateSet> {
        let pairs = Granularity::ALL
            .into_iter()
            .flat_map(|g| SensorType::ALL.into_iter().map(move |s| (s, g)));

        let calls = pairs.map(|(sensor, granularity)| async move {
            let windows = self
                .aggregate(
                    device_id,
                    sensor,
                    granularity,
                    lookbacks.get(granularity),
                    reference,
                )
                .await?;
            Ok::<_, IrrigationError>(((sensor, granularity), windows))
        });

        let series = try_join_all(calls).await?.into_iter().collect();
        Ok(AggregateSet { series })
    }
}

/// Groups readings by period and averages each non-empty period.
pub fn bucket_averages(readings: &[SensorReading], granularity: Granularity) -> Vec<AggregateWindow> {
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for reading in readings {
        let bucket = buckets
            .entry(granularity.period_start(reading.timestamp))
            .or_insert((0.0, 0));
        bucket.0 += reading.value;
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(period_start, (sum, count))| AggregateWindow {
            period_start,
            average: sum / count as f64,
            sample_count: count,
        })
        .collect()
}
