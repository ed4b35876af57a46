//! PostgreSQL adapter for swarm storage.
//!
//! Tables are created on connect. Both record sets are insert-only; batch
//! inserts run in a single transaction so a failed batch writes nothing.

use crate::model::{ensure_source_ids, Kernel, NewKernel, Platform, RawTrend};
use crate::traits::{KernelStore, QueryWindow, TrendStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresSwarmStorage {
    pool: PgPool,
}

impl PostgresSwarmStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 5, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS raw_trends (
                id BIGSERIAL PRIMARY KEY,
                platform TEXT NOT NULL,
                source_id TEXT NOT NULL,
                text TEXT NOT NULL,
                meta JSONB NOT NULL,
                collected_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS raw_trends_collected_at_idx
                ON raw_trends (collected_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS kernels (
                id UUID PRIMARY KEY,
                text TEXT NOT NULL,
                generation INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TrendStore for PostgresSwarmStorage {
    async fn insert_trends(&self, trends: Vec<RawTrend>) -> StorageResult<usize> {
        ensure_source_ids(&trends)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let written = trends.len();
        for trend in trends {
            sqlx::query(
                r#"
                INSERT INTO raw_trends (platform, source_id, text, meta, collected_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(trend.platform.as_str())
            .bind(trend.source_id)
            .bind(trend.text)
            .bind(Value::Object(trend.meta))
            .bind(trend.collected_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(written)
    }

    async fn recent_trend_texts(&self, limit: usize) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT text
              FROM raw_trends
             ORDER BY collected_at DESC, id DESC
             LIMIT $1
            "#,
        )
        .bind(to_i64(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("text")
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn list_trends(&self, window: QueryWindow) -> StorageResult<Vec<RawTrend>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT platform, source_id, text, meta, collected_at
                  FROM raw_trends
                 ORDER BY collected_at DESC, id DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT platform, source_id, text, meta, collected_at
                  FROM raw_trends
                 ORDER BY collected_at DESC, id DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(trend_row_to_record).collect()
    }

    async fn count_trends(&self) -> StorageResult<u64> {
        count(&self.pool, "SELECT COUNT(*) AS n FROM raw_trends").await
    }
}

#[async_trait]
impl KernelStore for PostgresSwarmStorage {
    async fn insert_kernels(&self, kernels: Vec<NewKernel>) -> StorageResult<Vec<Kernel>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut stored = Vec::with_capacity(kernels.len());
        for kernel in kernels {
            let row = sqlx::query(
                r#"
                INSERT INTO kernels (id, text, generation)
                VALUES ($1, $2, $3)
                RETURNING id, text, generation, created_at
                "#,
            )
            .bind(kernel.id)
            .bind(kernel.text)
            .bind(kernel.generation)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_conflict)?;
            stored.push(kernel_row_to_record(row)?);
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(stored)
    }

    async fn list_kernels(&self, window: QueryWindow) -> StorageResult<Vec<Kernel>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, text, generation, created_at
                  FROM kernels
                 ORDER BY created_at DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, text, generation, created_at
                  FROM kernels
                 ORDER BY created_at DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(kernel_row_to_record).collect()
    }

    async fn count_kernels(&self) -> StorageResult<u64> {
        count(&self.pool, "SELECT COUNT(*) AS n FROM kernels").await
    }
}

async fn count(pool: &PgPool, sql: &str) -> StorageResult<u64> {
    let row = sqlx::query(sql)
        .fetch_one(pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let n: i64 = row
        .try_get("n")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(n.max(0) as u64)
}

fn trend_row_to_record(row: PgRow) -> StorageResult<RawTrend> {
    let platform: String = row
        .try_get("platform")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let meta: Value = row
        .try_get("meta")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let meta = match meta {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::Serialization(format!(
                "trend meta is not an object: {other}"
            )))
        }
    };

    Ok(RawTrend {
        platform: platform.parse::<Platform>()?,
        source_id: row
            .try_get("source_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        text: row
            .try_get("text")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        meta,
        collected_at: row
            .try_get::<DateTime<Utc>, _>("collected_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn kernel_row_to_record(row: PgRow) -> StorageResult<Kernel> {
    Ok(Kernel {
        id: row
            .try_get::<Uuid, _>("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        text: row
            .try_get("text")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        generation: row
            .try_get("generation")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
