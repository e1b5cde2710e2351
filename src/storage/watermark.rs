//! Watermark store
//!
//! A two-column table `(table_name, unix_time)` mapping each series to the
//! last persisted bar time. Writes are append-only; uniqueness is restored
//! by `compact`, which keeps the maximum-time row per series. Compaction
//! assumes the current run's appends are already visible (sequential awaits
//! on one pool) and that no concurrent run shares the store.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Watermark store errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One watermark row: the most recent bar time already persisted for a
/// series.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Watermark {
    pub table_name: String,
    pub unix_time: i64,
}

impl Watermark {
    pub fn new(table_name: impl Into<String>, unix_time: i64) -> Self {
        Self {
            table_name: table_name.into(),
            unix_time,
        }
    }
}

/// Durable watermark table operations.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Full current snapshot, ordered by `unix_time` descending (secondary
    /// order by key, so snapshots are stable for deterministic tests). The
    /// physical table may hold duplicates between compactions.
    async fn load_all(&self) -> StoreResult<Vec<Watermark>>;

    /// Durably append rows. Uniqueness is not enforced here.
    async fn append(&self, rows: &[Watermark]) -> StoreResult<()>;

    /// Rewrite the table to one row per series, keeping the maximum
    /// `unix_time`. Ties are broken latest-inserted-wins.
    async fn compact(&self) -> StoreResult<()>;
}

/// SQLite-backed watermark store.
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
}

impl SqliteWatermarkStore {
    /// Open (creating if missing) the store at the given sqlite URL.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Configuration(format!("invalid store url {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watermarks (
                table_name TEXT NOT NULL,
                unix_time  BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn load_all(&self) -> StoreResult<Vec<Watermark>> {
        let rows = sqlx::query_as::<_, Watermark>(
            r#"
            SELECT table_name, unix_time
            FROM watermarks
            ORDER BY unix_time DESC, table_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(rows = rows.len(), "loaded watermark snapshot");
        Ok(rows)
    }

    async fn append(&self, rows: &[Watermark]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query("INSERT INTO watermarks (table_name, unix_time) VALUES (?1, ?2)")
                .bind(&row.table_name)
                .bind(row.unix_time)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(rows = rows.len(), "appended watermark rows");
        Ok(())
    }

    async fn compact(&self) -> StoreResult<()> {
        // Rank rows per series by unix_time descending and keep rank 1.
        // rowid DESC makes equal-time ties deterministic: the row inserted
        // last wins.
        let result = sqlx::query(
            r#"
            DELETE FROM watermarks
            WHERE rowid NOT IN (
                SELECT rowid FROM (
                    SELECT
                        rowid,
                        ROW_NUMBER() OVER (
                            PARTITION BY table_name
                            ORDER BY unix_time DESC, rowid DESC
                        ) AS row_rank
                    FROM watermarks
                )
                WHERE row_rank = 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!(removed = result.rows_affected(), "compacted watermark table");
        Ok(())
    }
}
