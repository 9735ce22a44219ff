//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides, including the legacy variable names
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
