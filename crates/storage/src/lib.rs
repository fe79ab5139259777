use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use a11yscan_core::RepositoryError;

mod batches;
mod checkpoints;
mod discoveries;
mod reports;
mod scans;
mod usage;

pub use discoveries::NewDiscovery;
pub use scans::NewScan;

pub(crate) fn db_err(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            RepositoryError::Conflict(e.to_string())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

pub(crate) fn bad_enum(column: &str, value: &str) -> RepositoryError {
    RepositoryError::Query(format!("unexpected {column} value: {value}"))
}

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self, RepositoryError> {
        Self::with_pool_size(database_url, 20).await
    }

    pub async fn with_pool_size(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    /// The queue crate shares this pool so jobs and domain rows commit
    /// against the same database.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Migration(e.to_string()))?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn check_connectivity(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
