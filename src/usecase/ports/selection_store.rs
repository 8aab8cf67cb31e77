use crate::domain::entities::selection::{SelectionKey, SelectionState};
use crate::usecase::ports::engine::EngineError;

/// Durable selection per (table, session). A missing key reads as an empty selection.
pub trait SelectionStore: Send + Sync {
    fn get(&self, key: &SelectionKey) -> Result<SelectionState, EngineError>;
    fn put(&self, key: &SelectionKey, state: &SelectionState) -> Result<(), EngineError>;
}
