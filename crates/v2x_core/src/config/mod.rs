//! Configuration management for Video2X.
//!
//! This module provides:
//! - TOML-based configuration with general, transcoding and driver sections
//! - Atomic file writes (write to temp, then rename)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use v2x_core::config::ConfigManager;
//! use v2x_core::drivers::DriverId;
//!
//! let mut config = ConfigManager::new("video2x.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Cache: {}", config.settings().video2x.cache_directory().display());
//! let section = config.settings().driver_section(DriverId::SrmdNcnnVulkan).unwrap();
//! println!("SRMD binary: {}", section["path"]);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    default_driver_section, AppConfig, GeneralSettings, LoggingSettings, TranscodingSettings,
    KNOWN_SECTIONS,
};
