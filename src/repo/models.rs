#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ml::ModelRepository;

#[derive(Clone)]
pub struct PgModelRepository {
    pool: PgPool,
}

impl PgModelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelRepository for PgModelRepository {
    async fn save(&self, device_id: Uuid, blob: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_models (device_id, model, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (device_id) DO UPDATE SET
              model = excluded.model,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(device_id)
        .bind(blob)
        .execute(&self.pool)
        .await
        .context("model upsert failed")?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(Uuid, Vec<u8>)>> {
        let rows: Vec<(Uuid, Vec<u8>)> = sqlx::query_as("SELECT device_id, model FROM device_models")
            .fetch_all(&self.pool)
            .await
            .context("model load failed")?;
        Ok(rows)
    }
}
