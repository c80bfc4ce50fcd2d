use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::Connection;
use std::time::Duration;

/// Applied on every pooled call; PRAGMA busy_timeout is per connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply performance PRAGMAs to a SQLite connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -16384;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        ",
    )
}

/// Create a deadpool-sqlite connection pool.
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, deadpool_sqlite::CreatePoolError> {
    let db_path = config.path.clone();

    // Set restrictive file permissions on the database file (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            if let Err(e) =
                std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "failed to set database file permissions");
            }
        }
    }

    let mut cfg = Config::new(db_path);
    cfg.pool = Some(PoolConfig::new(config.pool_size.max(1)));
    cfg.create_pool(Runtime::Tokio1)
}

/// Initialize the pool: get a connection and apply pragmas + run migrations.
pub async fn init_pool(pool: &Pool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get().await?;
    conn.interact(|conn| {
        apply_pragmas(conn)?;
        crate::storage::migrations::run_migrations(conn)?;
        Ok::<_, rusqlite::Error>(())
    })
    .await??;
    Ok(())
}

/// Run `f` on a pooled connection, mapping pool and SQLite failures into [`AppError`].
pub async fn interact<F, T>(pool: &Pool, f: F) -> AppResult<T>
where
    F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool
        .get()
        .await
        .map_err(|e| AppError::Internal(format!("pool error: {e}")))?;
    let result = conn
        .interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await?;
    Ok(result?)
}

/// Cheap liveness probe used by the health endpoint.
pub async fn ping(pool: &Pool) -> bool {
    interact(pool, |conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
        .await
        .is_ok()
}
