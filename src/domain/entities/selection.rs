use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::row::RowId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectionKey {
    pub table_id: String,
    pub session_id: String,
}

impl SelectionKey {
    pub fn new(table_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub selected_row_ids: BTreeSet<RowId>,
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl SelectionState {
    /// Adds first, then removes: an id present in both lists ends up unselected.
    pub fn apply_changes(&mut self, selected: &[RowId], unselected: &[RowId], now: DateTime<Utc>) {
        self.selected_row_ids.extend(selected.iter().cloned());
        for id in unselected {
            self.selected_row_ids.remove(id);
        }
        self.last_changed_at = Some(now);
    }

    pub fn select_all<I>(&mut self, ids: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = RowId>,
    {
        self.selected_row_ids.extend(ids);
        self.last_changed_at = Some(now);
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.selected_row_ids.clear();
        self.last_changed_at = Some(now);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected_row_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected_row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_row_ids.is_empty()
    }
}
