pub mod config;
pub mod demo;
pub mod domain;
pub mod error;
pub mod infra;
pub mod platform;
pub mod usecase;
pub mod wire;

pub use error::{GridError, GridResult};
pub use usecase::services::dispatcher::{DispatchSettings, Dispatcher, GridResponse};

#[cfg(test)]
mod tests;
