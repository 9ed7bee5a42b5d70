//! Config manager for loading and saving.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Unknown top-level sections are reported and dropped on load
//! - Missing fields are filled from defaults and written back

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use super::settings::{AppConfig, KNOWN_SECTIONS};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Config section [{0}] is missing")]
    MissingSection(String),

    #[error("Missing value for '{field}' in [{section}]")]
    MissingField { section: String, field: String },

    #[error("Invalid value for '{field}' in [{section}]: expected {expected}, found {found}")]
    InvalidField {
        section: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),
}

impl ConfigError {
    pub fn missing_section(section: impl Into<String>) -> Self {
        Self::MissingSection(section.into())
    }

    pub fn missing_field(section: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            section: section.into(),
            field: field.into(),
        }
    }

    pub fn invalid_field(
        section: impl Into<String>,
        field: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::InvalidField {
            section: section.into(),
            field: field.into(),
            expected,
            found,
        }
    }
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current config loaded in memory.
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            config: AppConfig::default(),
        }
    }

    /// Per-user config file location (`<config dir>/video2x/video2x.toml`).
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "video2x", "video2x")
            .map(|dirs| dirs.config_dir().join("video2x.toml"))
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current config.
    pub fn settings(&self) -> &AppConfig {
        &self.config
    }

    /// Get a mutable reference to the current config.
    ///
    /// Note: Changes made here are only in memory until `save()` is called.
    pub fn settings_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (config, _) = parse_and_check(&content)?;
        self.config = config;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// An existing file is rewritten when it had unknown sections or was
    /// missing defaulted fields.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (config, has_unknown) = parse_and_check(&content)?;
            self.config = config;

            let was_modified = has_unknown || content.trim() != self.render()?.trim();
            if was_modified {
                tracing::debug!("Rewriting config {}", self.config_path.display());
                self.save()?;
            }
        } else {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            tracing::info!("Creating default config at {}", self.config_path.display());
            self.config = AppConfig::default();
            self.save()?;
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.render()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    fn render(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# Video2X Configuration\n");
        output.push_str("# Driver tables hold the last values used for each driver.\n\n");
        output.push_str(&toml::to_string_pretty(&self.config)?);
        Ok(output)
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Same directory so the rename stays on one filesystem
        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Parse config text, reporting whether it had unknown top-level sections.
fn parse_and_check(content: &str) -> ConfigResult<(AppConfig, bool)> {
    let raw: toml::Table = toml::from_str(content)?;
    let mut has_unknown = false;
    for key in raw.keys() {
        if !KNOWN_SECTIONS.contains(&key.as_str()) {
            tracing::warn!("Ignoring unknown config section [{}]", key);
            has_unknown = true;
        }
    }

    let config: AppConfig = toml::from_str(content)?;
    Ok((config, has_unknown))
}
