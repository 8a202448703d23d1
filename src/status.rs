//! Checkpoint store overview.
//!
//! Used by `parasort status` to show how far a categorization has got:
//! counts per status, the failures with their recorded cause, and how many
//! records were validated against a different taxonomy than the one
//! currently configured.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::store::SqliteCheckpointStore;

/// Run the status command: query the checkpoint store and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let db_path = config.paths.checkpoint_db();
    let store = SqliteCheckpointStore::open(&db_path).await?;
    let pool = store.pool();

    let counts = sqlx::query("SELECT status, COUNT(*) AS n FROM checkpoints GROUP BY status")
        .fetch_all(pool)
        .await?;
    let count_of = |status: &str| -> i64 {
        counts
            .iter()
            .find(|r| r.get::<String, _>("status") == status)
            .map(|r| r.get::<i64, _>("n"))
            .unwrap_or(0)
    };
    let total: i64 = counts.iter().map(|r| r.get::<i64, _>("n")).sum();

    let last_update: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM checkpoints")
        .fetch_one(pool)
        .await?;

    let stale: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM checkpoints WHERE status = 'succeeded' AND taxonomy_hash != ?",
    )
    .bind(config.taxonomy.fingerprint())
    .fetch_one(pool)
    .await?;

    let interrupted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM checkpoints WHERE status = 'pending' AND output_path IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    let failures = sqlx::query(
        r#"
        SELECT doc_key, error_cause, error_message
        FROM checkpoints
        WHERE status = 'failed'
        ORDER BY seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("parasort status");
    println!("===============");
    println!();
    println!("  Store:       {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Last update: {}",
        match last_update {
            Some(ms) => format_ts_relative(ms / 1000),
            None => "never".to_string(),
        }
    );
    println!();
    println!("  Documents:   {}", total);
    println!("    succeeded: {}", count_of("succeeded"));
    println!("    failed:    {}", count_of("failed"));
    println!("    skipped:   {}", count_of("skipped"));
    println!("    pending:   {}", count_of("pending"));
    if interrupted > 0 {
        println!(
            "  {} interrupted move(s); run `parasort reconcile` or `parasort categorize`",
            interrupted
        );
    }
    if stale > 0 {
        println!(
            "  {} succeeded record(s) were validated against a different taxonomy",
            stale
        );
    }

    if !failures.is_empty() {
        println!();
        println!("  Failures:");
        println!("  {:<40} {:<18} {}", "FILE", "CAUSE", "MESSAGE");
        println!("  {}", "-".repeat(76));
        for row in &failures {
            let cause: Option<String> = row.get("error_cause");
            let message: Option<String> = row.get("error_message");
            println!(
                "  {:<40} {:<18} {}",
                row.get::<String, _>("doc_key"),
                cause.unwrap_or_default(),
                message.unwrap_or_default()
            );
        }
    }
    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp (seconds) as "3 hours ago"; older than a month
/// falls back to a date.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        format!("{} min{} ago", delta / 60, plural(delta / 60))
    } else if delta < 86400 {
        format!("{} hour{} ago", delta / 3600, plural(delta / 3600))
    } else if delta < 86400 * 30 {
        format!("{} day{} ago", delta / 86400, plural(delta / 86400))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now + 10_000).len(), 16);
    }
}
