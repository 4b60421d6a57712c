//! Configuration management for simbox
//!
//! Settings are read once at startup and shared through a lock-free
//! `ArcSwap` handle.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared configuration handle
pub type ConfigHandle = Arc<ArcSwap<AppConfig>>;

/// Create a config handle holding `config`
pub fn new_config_handle(config: AppConfig) -> ConfigHandle {
    Arc::new(ArcSwap::from_pointee(config))
}
