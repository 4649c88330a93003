use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{NewSchedule, PredictedWaterSchedule, SchedulePatch};
use crate::error::{IrrigationError, IrrigationResult};

pub mod devices;
pub mod models;
pub mod pg;
pub mod readings;
pub mod schedules;

#[cfg(feature = "db")]
pub use self::{
    devices::PgDeviceDirectory, models::PgModelRepository, pg::PgRepo,
    readings::PgReadingsStore, schedules::PgScheduleRepository,
};

/// Persistence of predicted water schedules
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Inserts all rows or none. Rows for an already scheduled
    /// (device, date) pair are appended, not merged.
    async fn create_many(
        &self,
        rows: Vec<NewSchedule>,
        created_at: DateTime<Utc>,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>>;

    async fn get(&self, id: Uuid) -> IrrigationResult<PredictedWaterSchedule>;

    /// Rows of a device ordered by date.
    async fn list_by_device(&self, device_id: Uuid) -> IrrigationResult<Vec<PredictedWaterSchedule>>;

    /// Rows with `start <= scheduled_date <= end`, ordered by date.
    async fn list_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>>;

    async fn update(&self, id: Uuid, patch: &SchedulePatch) -> IrrigationResult<PredictedWaterSchedule>;

    async fn delete(&self, id: Uuid) -> IrrigationResult<()>;
}

pub fn check_range(start: NaiveDate, end: NaiveDate) -> IrrigationResult<()> {
    if end < start {
        return Err(IrrigationError::InvalidScheduleRange { start, end });
    }
    Ok(())
}

fn sort_rows(rows: &mut [PredictedWaterSchedule]) {
    rows.sort_by(|a, b| {
        a.scheduled_date
            .cmp(&b.scheduled_date)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    rows: RwLock<HashMap<Uuid, PredictedWaterSchedule>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, keep: impl Fn(&PredictedWaterSchedule) -> bool) -> Vec<PredictedWaterSchedule> {
        let mut rows: Vec<_> = self.rows.read().values().filter(|r| keep(r)).cloned().collect();
        sort_rows(&mut rows);
        rows
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn create_many(
        &self,
        rows: Vec<NewSchedule>,
        created_at: DateTime<Utc>,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        for row in &rows {
            row.check()?;
        }
        let created: Vec<_> = rows.into_iter().map(|r| r.into_row(created_at)).collect();

        let mut stored = self.rows.write();
        for row in &created {
            stored.insert(row.id, row.clone());
        }
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> IrrigationResult<PredictedWaterSchedule> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| IrrigationError::schedule_not_found(id))
    }

    async fn list_by_device(&self, device_id: Uuid) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        Ok(self.collect(|r| r.device_id == device_id))
    }

    async fn list_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        check_range(start, end)?;
        Ok(self.collect(|r| r.scheduled_date >= start && r.scheduled_date <= end))
    }

    async fn update(&self, id: Uuid, patch: &SchedulePatch) -> IrrigationResult<PredictedWaterSchedule> {
        patch.check()?;
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| IrrigationError::schedule_not_found(id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid) -> IrrigationResult<()> {
        self.rows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| IrrigationError::schedule_not_found(id))
    }
}
