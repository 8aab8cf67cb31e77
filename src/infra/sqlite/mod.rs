pub mod engine;
pub mod schema;
pub mod selection_store;
