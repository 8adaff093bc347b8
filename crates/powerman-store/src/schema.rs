//! Database schema.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Settings key holding the persisted logging flag.
pub const LOGGING_ENABLED_KEY: &str = "logging_enabled";

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// The ledger holds one row per phase and is seeded with zeros, which the
/// collector reads as a cold start.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Last raw counter and lifetime total per phase
        CREATE TABLE IF NOT EXISTS ledger (
            phase TEXT PRIMARY KEY CHECK (phase IN ('L1', 'L2', 'L3')),
            raw INTEGER NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO ledger (phase, raw, total, updated_at) VALUES
            ('L1', 0, 0, strftime('%s', 'now')),
            ('L2', 0, 0, strftime('%s', 'now')),
            ('L3', 0, 0, strftime('%s', 'now'));

        -- Raw snapshots, one per poll cycle
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            l1 INTEGER NOT NULL,
            l2 INTEGER NOT NULL,
            l3 INTEGER NOT NULL,
            recorded_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_recorded_at
            ON history(recorded_at);

        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            logged_at INTEGER NOT NULL,
            message TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_logs_logged_at
            ON logs(logged_at);

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        INSERT OR IGNORE INTO settings (key, value) VALUES ('logging_enabled', '0');
        "#,
    )?;

    Ok(())
}
