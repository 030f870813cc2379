//! Database migrations and initialization.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Deadline applied to storage calls when none is configured.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize the SQLite database with the default storage timeout.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    open_pool(db_path, DEFAULT_STORAGE_TIMEOUT).await
}

/// Initialize the SQLite database with schema and pragmas.
///
/// `storage_timeout` bounds both pool acquisition and SQLite's busy wait, so a
/// locked or unreachable database fails instead of blocking indefinitely.
pub async fn open_pool(db_path: &str, storage_timeout: Duration) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let busy_timeout_ms = busy_timeout_millis(storage_timeout);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(storage_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move { configure_pragmas_conn(conn, busy_timeout_ms).await })
        })
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully at {}", db_path);
    Ok(pool)
}

/// Run all database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");
    let schema_sql = include_str!("schema.sql");

    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    info!("Migrations completed successfully");
    Ok(())
}

/// Configure SQLite pragmas for durability and bounded lock waits.
/// SQLite takes the busy timeout as a C int of milliseconds.
fn busy_timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

async fn configure_pragmas_conn(
    conn: &mut SqliteConnection,
    busy_timeout_ms: i32,
) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the actual mode set; must use fetch to get result
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    info!("SQLite journal_mode set to: {}", journal_mode);

    sqlx::query(&format!("PRAGMA busy_timeout = {}", busy_timeout_ms))
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db_path(temp_dir: &TempDir) -> String {
        temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn test_busy_timeout_saturates() {
        assert_eq!(busy_timeout_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(busy_timeout_millis(Duration::from_secs(u64::MAX)), i32::MAX);
        assert_eq!(
            busy_timeout_millis(Duration::from_millis(i32::MAX as u64 + 1)),
            i32::MAX
        );
    }

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_db_path(&temp_dir);

        let pool = init_db(&db_path).await.expect("init_db failed");
        assert!(Path::new(&db_path).exists());

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_migrations_create_ledger_tables() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_db_path(&temp_dir)).await.expect("init_db failed");

        for table in [
            "dealers",
            "loans",
            "vehicles",
            "audits",
            "transactions",
            "notifications",
        ] {
            let result: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .expect("table missing");
            assert_eq!(result.0, table);
        }
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_db_path(&temp_dir)).await.expect("init_db failed");

        run_migrations(&pool)
            .await
            .expect("second migration run failed");
    }

    #[tokio::test]
    async fn test_pragmas_configured() {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_pool(&temp_db_path(&temp_dir), Duration::from_millis(1500))
            .await
            .expect("open_pool failed");

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);

        let result: (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1500);
    }
}
