/// Database abstraction layer
///
/// Monitors and their ping history live in an embedded libsql file behind a
/// `deadpool` pool. Everything else in the service goes through [`Database`].

pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{Monitor, MonitorUpdate, NewMonitor, NewPingResult, PingResult};
pub use repository::{Database, DatabaseImpl, UrlTaken};

use anyhow::Result;

use crate::pool::LibsqlPool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the pool, migrate it and hand back the repository.
pub async fn open(path: &str, max_connections: usize) -> Result<DatabaseImpl> {
    let pool: LibsqlPool = crate::pool::open_local(path, max_connections).await?;
    {
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
    }
    Ok(DatabaseImpl::new_from_pool(pool))
}
