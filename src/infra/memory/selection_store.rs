use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::entities::selection::{SelectionKey, SelectionState};
use crate::usecase::ports::engine::EngineError;
use crate::usecase::ports::selection_store::SelectionStore;

/// Process-local selections, lost on restart.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    states: Mutex<HashMap<SelectionKey, SelectionState>>,
}

impl SelectionStore for MemorySelectionStore {
    fn get(&self, key: &SelectionKey) -> Result<SelectionState, EngineError> {
        let states = self
            .states
            .lock()
            .map_err(|_| EngineError::connection("selection store lock poisoned"))?;
        Ok(states.get(key).cloned().unwrap_or_default())
    }

    fn put(&self, key: &SelectionKey, state: &SelectionState) -> Result<(), EngineError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| EngineError::connection("selection store lock poisoned"))?;
        states.insert(key.clone(), state.clone());
        Ok(())
    }
}
