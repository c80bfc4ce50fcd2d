use rusqlite::Connection;

const MIGRATION_001: &str = include_str!("../../migrations/001_analytics.sql");
const MIGRATION_002: &str = include_str!("../../migrations/002_users_sessions.sql");
const MIGRATION_003: &str = include_str!("../../migrations/003_site_settings.sql");

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL,
            applied INTEGER NOT NULL
        );",
    )?;

    let migrations: &[(i64, &str, &str)] = &[
        (1, "001_analytics", MIGRATION_001),
        (2, "002_users_sessions", MIGRATION_002),
        (3, "003_site_settings", MIGRATION_003),
    ];

    for &(id, name, sql) in migrations {
        let applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;

        if !applied {
            tracing::info!(migration = name, "applying migration");
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO _migrations (id, name, applied) VALUES (?1, ?2, unixepoch())",
                rusqlite::params![id, name],
            )?;
        }
    }

    Ok(())
}
