use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sensor types that feed the irrigation model
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Humidity,
    SoilMoisture,
    Light,
}

impl SensorType {
    /// Sensor order used by the feature schema.
    pub const ALL: [SensorType; 4] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::SoilMoisture,
        SensorType::Light,
    ];
}

/// Aggregation window size
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
}

impl Granularity {
    /// Granularity order used by the feature schema.
    pub const ALL: [Granularity; 3] = [Granularity::Hour, Granularity::Day, Granularity::Week];

    pub fn step(&self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
            Self::Week => Duration::days(7),
        }
    }

    /// Start of the period containing `ts` (hours on the hour, days at
    /// midnight UTC, weeks on Monday midnight UTC).
    pub fn period_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            Self::Hour => midnight + Duration::hours(ts.hour() as i64),
            Self::Day => midnight,
            Self::Week => {
                midnight - Duration::days(ts.weekday().num_days_from_monday() as i64)
            }
        }
    }

    /// First instant covered by a trailing window of `lookback` periods that
    /// ends with the period containing `reference`.
    pub fn window_start(&self, reference: DateTime<Utc>, lookback: u32) -> DateTime<Utc> {
        let back = lookback.saturating_sub(1) as i32;
        self.period_start(reference) - self.step() * back
    }
}

/// Start of the day in UTC
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Operational status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Inactive,
    UnderMaintenance,
    Decommissioned,
}

/// Geographic location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Irrigation hub: a controller aggregating the sensors of one zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub location: GeoLocation,
    pub zone_id: i64,
    pub status: DeviceStatus,
}

impl Device {
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }
}

/// Raw sensor reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: Uuid,
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Average of the readings of one period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub period_start: DateTime<Utc>,
    pub average: f64,
    pub sample_count: usize,
}

/// Soil moisture requirement of a species occupying a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesMoisture {
    pub species_id: i64,
    pub name: String,
    pub ideal_soil_moisture: f64,
}
