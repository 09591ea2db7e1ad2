//! harvest-core — shared data model and configuration for HarvestGrid.

pub mod config;
pub mod error;
pub mod types;

pub use config::HarvestConfig;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
