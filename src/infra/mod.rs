pub mod export;
pub mod forms;
pub mod memory;
pub mod sqlite;
