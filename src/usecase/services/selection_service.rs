use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::entities::row::RowId;
use crate::domain::entities::selection::{SelectionKey, SelectionState};
use crate::error::GridResult;
use crate::usecase::ports::selection_store::SelectionStore;

/// Read-modify-write access to one selection. Each mutation is a single `put`, so a request
/// never leaves a half-applied change behind. Concurrent writers to the same key: last write wins.
#[derive(Clone)]
pub struct SelectionService {
    store: Arc<dyn SelectionStore>,
}

impl SelectionService {
    pub fn new(store: Arc<dyn SelectionStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &SelectionKey) -> GridResult<SelectionState> {
        Ok(self.store.get(key)?)
    }

    pub fn set_selected(
        &self,
        key: &SelectionKey,
        selected: &[RowId],
        unselected: &[RowId],
    ) -> GridResult<SelectionState> {
        let mut state = self.store.get(key)?;
        state.apply_changes(selected, unselected, Utc::now());
        self.store.put(key, &state)?;
        debug!(
            table = %key.table_id,
            added = selected.len(),
            removed = unselected.len(),
            count = state.len(),
            "selection changed"
        );
        Ok(state)
    }

    /// Adds `ids` to the selection. Callers pass the ids of the current filtered view.
    pub fn select_all<I>(&self, key: &SelectionKey, ids: I) -> GridResult<SelectionState>
    where
        I: IntoIterator<Item = RowId>,
    {
        let mut state = self.store.get(key)?;
        state.select_all(ids, Utc::now());
        self.store.put(key, &state)?;
        Ok(state)
    }

    pub fn clear(&self, key: &SelectionKey) -> GridResult<SelectionState> {
        let mut state = self.store.get(key)?;
        state.clear(Utc::now());
        self.store.put(key, &state)?;
        Ok(state)
    }
}
