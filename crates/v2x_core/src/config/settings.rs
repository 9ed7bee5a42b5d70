//! Config struct with TOML-based sections.
//!
//! The file has a general `[video2x]` section, a `[ffmpeg]` transcoding
//! section, an optional `[logging]` section and one table per driver. Driver
//! tables are kept as raw TOML; their schema belongs to the driver and is
//! checked when settings are resolved.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::manager::{ConfigError, ConfigResult};
use crate::drivers::{DriverId, FieldValue, FieldValues};
use crate::job::ImageFormat;
use crate::logging::LogConfig;
use crate::paths::{absolutize, default_cache_directory, expand_path};

/// Top-level table names the config understands.
pub const KNOWN_SECTIONS: [&str; 8] = [
    "video2x",
    "ffmpeg",
    "logging",
    "waifu2x_caffe",
    "waifu2x_converter_cpp",
    "waifu2x_ncnn_vulkan",
    "srmd_ncnn_vulkan",
    "anime4kcpp",
];

/// Root config structure containing all sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// General options.
    pub video2x: GeneralSettings,

    /// Transcoding (FFmpeg) options.
    pub ffmpeg: TranscodingSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waifu2x_caffe: Option<toml::Table>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waifu2x_converter_cpp: Option<toml::Table>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waifu2x_ncnn_vulkan: Option<toml::Table>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srmd_ncnn_vulkan: Option<toml::Table>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anime4kcpp: Option<toml::Table>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video2x: GeneralSettings::default(),
            ffmpeg: TranscodingSettings::default(),
            logging: LoggingSettings::default(),
            waifu2x_caffe: Some(default_driver_section(DriverId::Waifu2xCaffe)),
            waifu2x_converter_cpp: Some(default_driver_section(DriverId::Waifu2xConverterCpp)),
            waifu2x_ncnn_vulkan: Some(default_driver_section(DriverId::Waifu2xNcnnVulkan)),
            srmd_ncnn_vulkan: Some(default_driver_section(DriverId::SrmdNcnnVulkan)),
            anime4kcpp: Some(default_driver_section(DriverId::Anime4kCpp)),
        }
    }
}

impl AppConfig {
    /// Get a driver's config table.
    pub fn driver_section(&self, driver: DriverId) -> ConfigResult<&toml::Table> {
        self.section_slot(driver)
            .as_ref()
            .ok_or_else(|| ConfigError::missing_section(driver.id()))
    }

    /// Form values seeded from a driver's config table.
    pub fn driver_fields(&self, driver: DriverId) -> ConfigResult<FieldValues> {
        self.driver_section(driver).map(FieldValues::from_section)
    }

    /// Write form values back into a driver's table so the next `save()`
    /// remembers them.
    pub fn remember_fields(&mut self, driver: DriverId, fields: &FieldValues, names: &[&str]) {
        let section = self.section_slot_mut(driver).get_or_insert_with(toml::Table::new);
        for name in names {
            if let Some(value) = fields.get(name) {
                section.insert((*name).to_string(), field_to_toml(value));
            }
        }
    }

    fn section_slot(&self, driver: DriverId) -> &Option<toml::Table> {
        match driver {
            DriverId::Waifu2xCaffe => &self.waifu2x_caffe,
            DriverId::Waifu2xConverterCpp => &self.waifu2x_converter_cpp,
            DriverId::Waifu2xNcnnVulkan => &self.waifu2x_ncnn_vulkan,
            DriverId::SrmdNcnnVulkan => &self.srmd_ncnn_vulkan,
            DriverId::Anime4kCpp => &self.anime4kcpp,
        }
    }

    fn section_slot_mut(&mut self, driver: DriverId) -> &mut Option<toml::Table> {
        match driver {
            DriverId::Waifu2xCaffe => &mut self.waifu2x_caffe,
            DriverId::Waifu2xConverterCpp => &mut self.waifu2x_converter_cpp,
            DriverId::Waifu2xNcnnVulkan => &mut self.waifu2x_ncnn_vulkan,
            DriverId::SrmdNcnnVulkan => &mut self.srmd_ncnn_vulkan,
            DriverId::Anime4kCpp => &mut self.anime4kcpp,
        }
    }
}

/// General options shared by every driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Cache directory for extracted and upscaled frames.
    /// Unset means `<temp>/video2x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video2x_cache_directory: Option<String>,

    /// Keep extracted and upscaled frames after the job.
    #[serde(default)]
    pub preserve_frames: bool,

    /// Intermediate frame format.
    #[serde(default)]
    pub image_format: ImageFormat,
}

impl GeneralSettings {
    /// Resolved cache directory (variables expanded, absolute).
    pub fn cache_directory(&self) -> PathBuf {
        match self.video2x_cache_directory.as_deref() {
            Some(dir) if !dir.trim().is_empty() => absolutize(&expand_path(dir)),
            _ => default_cache_directory(),
        }
    }
}

/// FFmpeg options. Everything besides the binary path is passed through to
/// the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodingSettings {
    /// Folder (or binary) path for ffmpeg/ffprobe.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Remaining transcoding options.
    #[serde(flatten)]
    pub options: toml::Table,
}

fn default_ffmpeg_path() -> String {
    "%LOCALAPPDATA%/video2x/ffmpeg-latest-win64-static/bin".to_string()
}

impl Default for TranscodingSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            options: toml::Table::new(),
        }
    }
}

impl TranscodingSettings {
    /// FFmpeg path with variables expanded, made absolute.
    pub fn resolved_ffmpeg_path(&self) -> PathBuf {
        absolutize(&expand_path(&self.ffmpeg_path))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Folder for per-job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of recent lines attached to failure reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            logs_folder: default_logs_folder(),
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
        }
    }
}

impl LoggingSettings {
    /// Logs folder with variables expanded.
    pub fn logs_folder(&self) -> PathBuf {
        expand_path(&self.logs_folder)
    }

    /// Per-job logger configuration for these settings.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            compact: self.compact,
            progress_step: self.progress_step.max(1),
            error_tail: self.error_tail as usize,
            ..LogConfig::default()
        }
    }
}

/// Default driver table as shipped with a fresh install.
pub fn default_driver_section(driver: DriverId) -> toml::Table {
    let entries: Vec<(&str, toml::Value)> = match driver {
        DriverId::Waifu2xCaffe => vec![
            ("path", "%LOCALAPPDATA%/video2x/waifu2x-caffe/waifu2x-caffe-cui".into()),
            ("mode", "noise_scale".into()),
            ("noise_level", 3.into()),
            ("process", "gpu".into()),
            ("model", "cunet".into()),
            ("crop_size", 128.into()),
            ("output_quality", (-1).into()),
            ("output_depth", 8.into()),
            ("batch_size", 1.into()),
            ("gpu", 0.into()),
            ("tta", 0.into()),
        ],
        DriverId::Waifu2xConverterCpp => vec![
            (
                "path",
                "%LOCALAPPDATA%/video2x/waifu2x-converter-cpp/waifu2x-converter-cpp".into(),
            ),
            ("png-compression", 5.into()),
            ("processor", (-1).into()),
            ("model", "models_rgb".into()),
            ("mode", "noise-scale".into()),
            ("disable-gpu", false.into()),
            ("tta", 0.into()),
        ],
        DriverId::Waifu2xNcnnVulkan => vec![
            (
                "path",
                "%LOCALAPPDATA%/video2x/waifu2x-ncnn-vulkan/waifu2x-ncnn-vulkan".into(),
            ),
            ("n", 2.into()),
            ("t", 200.into()),
            ("model", "models-cunet".into()),
            ("g", 0.into()),
            ("j", "1:2:2".into()),
            ("x", false.into()),
        ],
        DriverId::SrmdNcnnVulkan => vec![
            (
                "path",
                "%LOCALAPPDATA%/video2x/srmd-ncnn-vulkan/srmd-ncnn-vulkan".into(),
            ),
            ("n", 3.into()),
            ("t", 200.into()),
            ("model", "models-srmd".into()),
            ("g", 0.into()),
            ("j", "1:2:2".into()),
            ("x", false.into()),
        ],
        DriverId::Anime4kCpp => vec![
            (
                "path",
                "%LOCALAPPDATA%/video2x/anime4kcpp/CLI/Anime4KCPP_CLI/Anime4KCPP_CLI".into(),
            ),
            ("passes", 2.into()),
            ("pushColorCount", 2.into()),
            ("strengthColor", 0.3.into()),
            ("strengthGradient", 1.0.into()),
            ("threads", 16.into()),
            ("preFilters", 4.into()),
            ("postFilters", 40.into()),
            ("platformID", 0.into()),
            ("deviceID", 0.into()),
            ("codec", "mp4v".into()),
            ("fastMode", false.into()),
            ("preprocessing", false.into()),
            ("postprocessing", false.into()),
            ("GPUMode", false.into()),
        ],
    };

    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn field_to_toml(value: &FieldValue) -> toml::Value {
    match value {
        FieldValue::Bool(b) => toml::Value::Boolean(*b),
        FieldValue::Int(i) => toml::Value::Integer(*i),
        FieldValue::Float(f) => toml::Value::Float(*f),
        FieldValue::Text(s) => toml::Value::String(s.clone()),
    }
}
