use crate::DedupStore;
use async_trait::async_trait;
use reposter_core::{CoreError, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::ConnectionFailed {
                reason: format!("{}: {}", url, e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                reason: e.to_string(),
            })?;

        info!("Opened dedup store at {}", url);
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let row = sqlx::query("SELECT value FROM dedup_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let value = match row {
            Some(row) => Some(row.try_get::<String, _>("value").map_err(StoreError::from)?),
            None => None,
        };
        debug!("GET {} -> {:?}", key, value);
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        debug!("SET {} = {}", key, value);
        sqlx::query(
            "INSERT INTO dedup_entries (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("INSERT OR IGNORE INTO dedup_entries (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let written = result.rows_affected() == 1;
        debug!("SETNX {} = {} ({})", key, value, if written { "written" } else { "kept" });
        Ok(written)
    }
}
