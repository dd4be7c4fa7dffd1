use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // WAL lets readers keep going while a check is being recorded.
    conn.query("PRAGMA journal_mode = WAL", ()).await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors and ping history").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors and ping_results
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            interval_minutes INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'checking',
            last_checked INTEGER,
            response_time INTEGER,
            total_checks INTEGER NOT NULL DEFAULT 0,
            successful_checks INTEGER NOT NULL DEFAULT 0,
            uptime_percentage INTEGER NOT NULL DEFAULT 100,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            CHECK (successful_checks <= total_checks)
        )",
        (),
    )
    .await?;

    // Timestamps are epoch milliseconds.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ping_results (
            id TEXT PRIMARY KEY,
            monitor_id TEXT NOT NULL,
            status TEXT NOT NULL,
            response_time INTEGER,
            timestamp INTEGER NOT NULL,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_monitors_url ON monitors(url)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ping_results_monitor_timestamp ON ping_results(monitor_id, timestamp DESC)",
        (),
    )
    .await?;

    Ok(())
}
