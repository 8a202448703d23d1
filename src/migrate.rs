use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per document key; `seq` orders writes by processing order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            doc_key TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            result_json TEXT,
            error_cause TEXT,
            error_message TEXT,
            output_path TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            taxonomy_hash TEXT NOT NULL,
            processed TEXT,
            seq INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Stores created before the processed date was recorded.
    let has_processed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('checkpoints') WHERE name = 'processed'",
    )
    .fetch_one(pool)
    .await?;
    if has_processed == 0 {
        sqlx::query("ALTER TABLE checkpoints ADD COLUMN processed TEXT")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_checkpoints_seq ON checkpoints(seq)")
        .execute(pool)
        .await?;

    // Survives `clear()` so sequence numbers never go backwards.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoint_meta (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO checkpoint_meta (name, value) VALUES ('seq', 0)")
        .execute(pool)
        .await?;

    Ok(())
}
