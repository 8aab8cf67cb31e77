use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Requests run on separate blocking threads, each with its own connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    Ok(conn)
}

/// Creates the database file and the selection table. Grid data tables belong to the application.
pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    open_connection(db_path)?
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS grid_selection (
                table_id        TEXT NOT NULL,
                session_id      TEXT NOT NULL,
                row_ids         TEXT NOT NULL DEFAULT '[]',
                last_changed_at TEXT,
                PRIMARY KEY (table_id, session_id)
            );
            ",
        )
        .context("failed to create grid_selection")
}
