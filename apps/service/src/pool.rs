use std::time::Duration;

use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// How long a pooled connection waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // PRAGMA answers with a row, so it has to go through `query`.
        conn.query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT.as_millis()), ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ()).await?.next().await?.ok_or(LibsqlError::QueryReturnedNoRows)?;
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) a local database file and wrap it in a pool.
pub async fn open_local(path: &str, max_size: usize) -> anyhow::Result<LibsqlPool> {
    let database = libsql::Builder::new_local(path).build().await?;
    let pool = Pool::builder(LibsqlManager::new(database)).max_size(max_size.max(1)).build()?;
    Ok(pool)
}
