//! SQLite-backed [`CheckpointStore`].
//!
//! Each `put` runs in its own transaction that bumps the persistent sequence
//! counter and upserts the record; the commit is durable (`synchronous =
//! FULL`) before `put` returns. Writers are additionally serialized through
//! an async mutex so sequence assignment never interleaves.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::CheckpointStore;
use crate::db;
use crate::migrate;
use crate::models::{CheckpointRecord, CheckpointStatus, ClassificationResult, FailureDetail};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteCheckpointStore {
    /// Open the store at `path`, verify its integrity, and apply migrations.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened as a SQLite database or the
    /// integrity check reports anything but `ok`. Callers treat this as
    /// fatal: without a trustworthy store a run cannot be resumed safely.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await.context("checkpoint store unreadable")?;

        let check: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await
            .context("checkpoint store unreadable")?;
        if check != "ok" {
            pool.close().await;
            bail!("checkpoint store unreadable: integrity check reported '{}'", check);
        }

        migrate::run_migrations(&pool)
            .await
            .context("checkpoint store unreadable")?;

        Ok(Self::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CheckpointRecord> {
    let key: String = row.get("doc_key");
    let status_str: String = row.get("status");
    let status = CheckpointStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("checkpoint '{}' has unknown status '{}'", key, status_str))?;

    let result = match row.get::<Option<String>, _>("result_json") {
        Some(json) => Some(
            serde_json::from_str::<ClassificationResult>(&json)
                .with_context(|| format!("checkpoint '{}' has an undecodable result", key))?,
        ),
        None => None,
    };

    let error = match (
        row.get::<Option<String>, _>("error_cause"),
        row.get::<Option<String>, _>("error_message"),
    ) {
        (Some(cause), message) => Some(FailureDetail {
            cause,
            message: message.unwrap_or_default(),
        }),
        (None, _) => None,
    };

    let updated_ms: i64 = row.get("updated_at");
    let updated_at = DateTime::<Utc>::from_timestamp_millis(updated_ms)
        .ok_or_else(|| anyhow!("checkpoint '{}' has an invalid timestamp", key))?;

    Ok(CheckpointRecord {
        key,
        status,
        result,
        error,
        output_path: row.get("output_path"),
        size: row.get::<i64, _>("size").max(0) as u64,
        taxonomy_hash: row.get("taxonomy_hash"),
        processed: row.get("processed"),
        seq: row.get::<i64, _>("seq").max(0) as u64,
        updated_at,
    })
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<CheckpointRecord>> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE doc_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn put(&self, record: &CheckpointRecord) -> Result<u64> {
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE checkpoint_meta SET value = value + 1 WHERE name = 'seq'")
            .execute(&mut *tx)
            .await?;
        let seq: i64 = sqlx::query_scalar("SELECT value FROM checkpoint_meta WHERE name = 'seq'")
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (doc_key, status, result_json, error_cause, error_message,
                                     output_path, size, taxonomy_hash, processed, seq,
                                     updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_key) DO UPDATE SET
                status = excluded.status,
                result_json = excluded.result_json,
                error_cause = excluded.error_cause,
                error_message = excluded.error_message,
                output_path = excluded.output_path,
                size = excluded.size,
                taxonomy_hash = excluded.taxonomy_hash,
                processed = excluded.processed,
                seq = excluded.seq,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.key)
        .bind(record.status.as_str())
        .bind(&result_json)
        .bind(record.error.as_ref().map(|e| e.cause.clone()))
        .bind(record.error.as_ref().map(|e| e.message.clone()))
        .bind(&record.output_path)
        .bind(record.size as i64)
        .bind(&record.taxonomy_hash)
        .bind(&record.processed)
        .bind(seq)
        .bind(record.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(seq as u64)
    }

    async fn all(&self) -> Result<Vec<CheckpointRecord>> {
        let rows = sqlx::query("SELECT * FROM checkpoints ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM checkpoints")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
