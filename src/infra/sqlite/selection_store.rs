use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::domain::entities::row::RowId;
use crate::domain::entities::selection::{SelectionKey, SelectionState};
use crate::infra::sqlite::schema::open_connection;
use crate::usecase::ports::engine::EngineError;
use crate::usecase::ports::selection_store::SelectionStore;

/// Selections in the `grid_selection` table, one row per (table, session).
#[derive(Debug, Clone)]
pub struct SqliteSelectionStore {
    pub db_path: PathBuf,
}

impl SqliteSelectionStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl SelectionStore for SqliteSelectionStore {
    fn get(&self, key: &SelectionKey) -> Result<SelectionState, EngineError> {
        load_selection(&self.db_path, key).map_err(|err| EngineError::query_from(&err))
    }

    fn put(&self, key: &SelectionKey, state: &SelectionState) -> Result<(), EngineError> {
        upsert_selection(&self.db_path, key, state)
            .map_err(|err| EngineError::query_from(&err))
    }
}

pub fn load_selection(db_path: &Path, key: &SelectionKey) -> Result<SelectionState> {
    let conn = open_connection(db_path)?;
    let stored: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT row_ids, last_changed_at
             FROM grid_selection
             WHERE table_id = ?1 AND session_id = ?2",
            params![key.table_id, key.session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("failed to load selection")?;

    let Some((row_ids, last_changed_at)) = stored else {
        return Ok(SelectionState::default());
    };

    let selected_row_ids: BTreeSet<RowId> =
        serde_json::from_str(&row_ids).context("failed to decode selected row ids")?;
    let last_changed_at = match last_changed_at {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(&text)
                .with_context(|| format!("invalid selection timestamp: {text}"))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(SelectionState {
        selected_row_ids,
        last_changed_at,
    })
}

pub fn upsert_selection(db_path: &Path, key: &SelectionKey, state: &SelectionState) -> Result<()> {
    let conn = open_connection(db_path)?;
    let row_ids =
        serde_json::to_string(&state.selected_row_ids).context("failed to encode selected row ids")?;
    let last_changed_at = state.last_changed_at.map(|at| at.to_rfc3339());

    conn.execute(
        "INSERT INTO grid_selection(table_id, session_id, row_ids, last_changed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(table_id, session_id) DO UPDATE SET
            row_ids = excluded.row_ids,
            last_changed_at = excluded.last_changed_at",
        params![key.table_id, key.session_id, row_ids, last_changed_at],
    )
    .context("failed to upsert selection")?;
    Ok(())
}
