use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

pub type IrrigationResult<T> = std::result::Result<T, IrrigationError>;

/// Failure kinds surfaced by the irrigation engine.
///
/// Collaborator failures keep the kind of the collaborator that failed
/// (telemetry store, weather provider, schedule storage) and carry the full
/// context chain of the underlying error in their message.
#[derive(Debug, Error)]
pub enum IrrigationError {
    #[error("telemetry data unavailable: {0}")]
    DataUnavailable(String),

    #[error("weather forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("no trained model for device {0}")]
    ModelNotFound(Uuid),

    #[error(
        "insufficient training data for device {device_id}: {available} samples, at least {required} required"
    )]
    InsufficientTrainingData {
        device_id: Uuid,
        available: usize,
        required: usize,
    },

    #[error("invalid schedule range: end {end} is before start {start}")]
    InvalidScheduleRange { start: NaiveDate, end: NaiveDate },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("no usable sensor data for device {device_id} on {date}")]
    NoSensorData { device_id: Uuid, date: NaiveDate },

    #[error("device {0} is not active")]
    DeviceInactive(Uuid),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl IrrigationError {
    pub fn data_unavailable(err: anyhow::Error) -> Self {
        Self::DataUnavailable(format!("{err:#}"))
    }

    pub fn forecast_unavailable(err: anyhow::Error) -> Self {
        Self::ForecastUnavailable(format!("{err:#}"))
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn model(err: anyhow::Error) -> Self {
        Self::Model(format!("{err:#}"))
    }

    pub fn device_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "device", id }
    }

    pub fn schedule_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "schedule",
            id,
        }
    }

    /// Stable name of the error kind, used in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable(_) => "DataUnavailable",
            Self::ForecastUnavailable(_) => "ForecastUnavailable",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::InsufficientTrainingData { .. } => "InsufficientTrainingData",
            Self::InvalidScheduleRange { .. } => "InvalidScheduleRange",
            Self::NotFound { .. } => "NotFound",
            Self::NoSensorData { .. } => "NoSensorData",
            Self::DeviceInactive(_) => "DeviceInactive",
            Self::InvalidSchedule(_) => "InvalidSchedule",
            Self::Model(_) => "ModelError",
            Self::Storage(_) => "StorageError",
        }
    }
}

impl From<validator::ValidationErrors> for IrrigationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        IrrigationError::InvalidSchedule(errors.to_string())
    }
}
