use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{IrrigationError, IrrigationResult};

/// Predicted watering for one device on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedWaterSchedule {
    pub id: Uuid,
    pub device_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub water_amount: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl PredictedWaterSchedule {
    pub fn apply(&mut self, patch: &SchedulePatch) {
        if let Some(date) = patch.scheduled_date {
            self.scheduled_date = date;
        }
        if let Some(amount) = patch.water_amount {
            self.water_amount = amount;
        }
        if let Some(confidence) = patch.confidence {
            self.confidence = confidence;
        }
    }
}

/// Schedule row to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewSchedule {
    pub device_id: Uuid,
    pub scheduled_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub water_amount: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

impl NewSchedule {
    pub fn check(&self) -> IrrigationResult<()> {
        self.validate()?;
        ensure_finite("water_amount", Some(self.water_amount))?;
        ensure_finite("confidence", Some(self.confidence))
    }

    pub fn into_row(self, created_at: DateTime<Utc>) -> PredictedWaterSchedule {
        PredictedWaterSchedule {
            id: Uuid::new_v4(),
            device_id: self.device_id,
            scheduled_date: self.scheduled_date,
            water_amount: self.water_amount,
            confidence: self.confidence,
            created_at,
        }
    }
}

/// Partial update of a schedule row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SchedulePatch {
    pub scheduled_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub water_amount: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: Option<f64>,
}

impl SchedulePatch {
    pub fn check(&self) -> IrrigationResult<()> {
        self.validate()?;
        ensure_finite("water_amount", self.water_amount)?;
        ensure_finite("confidence", self.confidence)
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled_date.is_none() && self.water_amount.is_none() && self.confidence.is_none()
    }
}

// range() lets NaN through
fn ensure_finite(field: &str, value: Option<f64>) -> IrrigationResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(IrrigationError::InvalidSchedule(format!(
            "{field} must be a finite number"
        ))),
        _ => Ok(()),
    }
}
