pub mod engine;
pub mod forms;
pub mod selection_store;
