#![cfg(feature = "db")]

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::{PgDeviceDirectory, PgModelRepository, PgReadingsStore, PgScheduleRepository};

#[derive(Clone)]
pub struct PgRepo {
    pub pool: PgPool,
}

impl PgRepo {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    pub fn devices(&self) -> PgDeviceDirectory {
        PgDeviceDirectory::new(self.pool.clone())
    }

    pub fn readings(&self) -> PgReadingsStore {
        PgReadingsStore::new(self.pool.clone())
    }

    pub fn schedules(&self) -> PgScheduleRepository {
        PgScheduleRepository::new(self.pool.clone())
    }

    pub fn models(&self) -> PgModelRepository {
        PgModelRepository::new(self.pool.clone())
    }
}
