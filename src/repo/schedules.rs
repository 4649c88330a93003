#![cfg(feature = "db")]

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{check_range, ScheduleRepository};
use crate::domain::{NewSchedule, PredictedWaterSchedule, SchedulePatch};
use crate::error::{IrrigationError, IrrigationResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    device_id: Uuid,
    scheduled_date: NaiveDate,
    water_amount: f64,
    confidence: f64,
    created_at: DateTime<Utc>,
}

impl From<ScheduleRow> for PredictedWaterSchedule {
    fn from(row: ScheduleRow) -> Self {
        PredictedWaterSchedule {
            id: row.id,
            device_id: row.device_id,
            scheduled_date: row.scheduled_date,
            water_amount: row.water_amount,
            confidence: row.confidence,
            created_at: row.created_at,
        }
    }
}

const COLUMNS: &str = "id, device_id, scheduled_date, water_amount, confidence, created_at";

fn storage(err: sqlx::Error, what: &str) -> IrrigationError {
    IrrigationError::storage(anyhow::Error::new(err).context(what.to_string()))
}

#[derive(Clone)]
pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn create_many(
        &self,
        rows: Vec<NewSchedule>,
        created_at: DateTime<Utc>,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        for row in &rows {
            row.check()?;
        }
        let created: Vec<_> = rows.into_iter().map(|r| r.into_row(created_at)).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage(e, "schedule insert: begin"))?;
        for row in &created {
            sqlx::query(
                r#"
                INSERT INTO predicted_water_schedules (id, device_id, scheduled_date, water_amount, confidence, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(row.id)
            .bind(row.device_id)
            .bind(row.scheduled_date)
            .bind(row.water_amount)
            .bind(row.confidence)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage(e, "schedule insert"))?;
        }
        tx.commit()
            .await
            .map_err(|e| storage(e, "schedule insert: commit"))?;

        Ok(created)
    }

    async fn get(&self, id: Uuid) -> IrrigationResult<PredictedWaterSchedule> {
        let row: Option<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM predicted_water_schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage(e, "schedule lookup"))?;

        row.map(Into::into)
            .ok_or_else(|| IrrigationError::schedule_not_found(id))
    }

    async fn list_by_device(&self, device_id: Uuid) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM predicted_water_schedules
             WHERE device_id = $1
             ORDER BY scheduled_date, created_at, id"
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage(e, "schedules by device"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IrrigationResult<Vec<PredictedWaterSchedule>> {
        check_range(start, end)?;
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM predicted_water_schedules
             WHERE scheduled_date BETWEEN $1 AND $2
             ORDER BY scheduled_date, created_at, id"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage(e, "schedules by date range"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update(&self, id: Uuid, patch: &SchedulePatch) -> IrrigationResult<PredictedWaterSchedule> {
        patch.check()?;
        let row: Option<ScheduleRow> = sqlx::query_as(&format!(
            "UPDATE predicted_water_schedules
             SET scheduled_date = COALESCE($2, scheduled_date),
                 water_amount = COALESCE($3, water_amount),
                 confidence = COALESCE($4, confidence)
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(patch.scheduled_date)
        .bind(patch.water_amount)
        .bind(patch.confidence)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage(e, "schedule update"))?;

        row.map(Into::into)
            .ok_or_else(|| IrrigationError::schedule_not_found(id))
    }

    async fn delete(&self, id: Uuid) -> IrrigationResult<()> {
        let result = sqlx::query("DELETE FROM predicted_water_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("schedule delete")
            .map_err(IrrigationError::storage)?;

        if result.rows_affected() == 0 {
            return Err(IrrigationError::schedule_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::PgRepo;

    async fn repo() -> PgScheduleRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let pg = PgRepo::connect(&url, 2).await.unwrap();
        pg.migrate().await.unwrap();
        pg.schedules()
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_pg_schedule_lifecycle() {
        let repo = repo().await;
        let device_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();

        let created = repo
            .create_many(
                vec![NewSchedule {
                    device_id,
                    scheduled_date: date,
                    water_amount: 3.0,
                    confidence: 0.7,
                }],
                Utc::now(),
            )
            .await
            .unwrap();
        let id = created[0].id;

        let patch = SchedulePatch {
            water_amount: Some(5.0),
            ..SchedulePatch::default()
        };
        assert_eq!(repo.update(id, &patch).await.unwrap().water_amount, 5.0);
        assert_eq!(repo.list_by_device(device_id).await.unwrap().len(), 1);

        repo.delete(id).await.unwrap();
        assert!(matches!(
            repo.get(id).await,
            Err(IrrigationError::NotFound { .. })
        ));
    }
}
