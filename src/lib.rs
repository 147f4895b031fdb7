// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod indicators;
pub mod models;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{BotError, ConfigurationError};
pub use models::*;
