use thiserror::Error;

use crate::usecase::ports::engine::EngineError;

#[derive(Debug, Error)]
pub enum GridError {
    /// Unknown action, malformed filter function or a missing required field.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Table definition mistakes made by the author of the table.
    #[error("invalid table configuration: {0}")]
    Config(String),
}

impl GridError {
    pub fn protocol(message: impl Into<String>) -> Self {
        GridError::Protocol(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        GridError::Permission(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        GridError::Config(message.into())
    }

    pub fn class_name(&self) -> String {
        match self {
            GridError::Protocol(_) => "protocol_error".to_string(),
            GridError::Permission(_) => "permission_error".to_string(),
            GridError::Engine(err) => format!("engine_error:{}", err.class_name()),
            GridError::Config(_) => "config_error".to_string(),
        }
    }
}

pub type GridResult<T> = Result<T, GridError>;
