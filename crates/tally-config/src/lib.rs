//! tally-config
//!
//! Persisted settings for Tally: amount precision, side-channel queue size,
//! log filter and where books live on disk.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::{Config, DATA_ROOT_ENV};
