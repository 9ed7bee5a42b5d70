//! Identifiers for the supported upscaling drivers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One of the five interchangeable upscaling backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriverId {
    #[serde(rename = "waifu2x_caffe")]
    Waifu2xCaffe,
    #[serde(rename = "waifu2x_converter_cpp")]
    Waifu2xConverterCpp,
    #[serde(rename = "waifu2x_ncnn_vulkan")]
    Waifu2xNcnnVulkan,
    #[serde(rename = "srmd_ncnn_vulkan")]
    SrmdNcnnVulkan,
    #[serde(rename = "anime4kcpp")]
    Anime4kCpp,
}

/// Allowed scale ratio range for a driver, with the value a form starts at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRatioBounds {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ScaleRatioBounds {
    /// Check whether `ratio` is usable. Zero is never a usable ratio.
    pub fn contains(&self, ratio: f64) -> bool {
        ratio.is_finite() && ratio > 0.0 && ratio >= self.min && ratio <= self.max
    }
}

impl DriverId {
    /// All drivers in the order a driver picker lists them.
    pub const ALL: [DriverId; 5] = [
        DriverId::Waifu2xCaffe,
        DriverId::Waifu2xConverterCpp,
        DriverId::Waifu2xNcnnVulkan,
        DriverId::SrmdNcnnVulkan,
        DriverId::Anime4kCpp,
    ];

    /// Identifier used as the config section name.
    pub fn id(&self) -> &'static str {
        match self {
            DriverId::Waifu2xCaffe => "waifu2x_caffe",
            DriverId::Waifu2xConverterCpp => "waifu2x_converter_cpp",
            DriverId::Waifu2xNcnnVulkan => "waifu2x_ncnn_vulkan",
            DriverId::SrmdNcnnVulkan => "srmd_ncnn_vulkan",
            DriverId::Anime4kCpp => "anime4kcpp",
        }
    }

    /// Name shown in the driver picker.
    pub fn display_name(&self) -> &'static str {
        match self {
            DriverId::Waifu2xCaffe => "Waifu2X Caffe",
            DriverId::Waifu2xConverterCpp => "Waifu2X Converter CPP",
            DriverId::Waifu2xNcnnVulkan => "Waifu2X NCNN Vulkan",
            DriverId::SrmdNcnnVulkan => "SRMD NCNN Vulkan",
            DriverId::Anime4kCpp => "Anime4KCPP",
        }
    }

    /// Look up a driver by its picker name.
    pub fn from_display_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.display_name() == name)
    }

    /// Scale ratio constraints the driver binary accepts.
    pub fn scale_ratio_bounds(&self) -> ScaleRatioBounds {
        match self {
            DriverId::Waifu2xCaffe | DriverId::Waifu2xConverterCpp | DriverId::Anime4kCpp => {
                ScaleRatioBounds {
                    min: 0.0,
                    max: 999.0,
                    default: 2.0,
                }
            }
            DriverId::Waifu2xNcnnVulkan => ScaleRatioBounds {
                min: 1.0,
                max: 2.0,
                default: 2.0,
            },
            DriverId::SrmdNcnnVulkan => ScaleRatioBounds {
                min: 2.0,
                max: 4.0,
                default: 2.0,
            },
        }
    }

    /// Process (or thread) count a form should suggest for this driver.
    pub fn preferred_process_count(&self) -> u32 {
        match self {
            DriverId::Anime4kCpp => 16,
            _ => 1,
        }
    }

    /// Whether the engine attaches a frame-counting progress monitor.
    ///
    /// Anime4KCPP processes the whole video in one call and never reports
    /// frame counts, so no progress poller runs for it.
    pub fn reports_progress(&self) -> bool {
        !matches!(self, DriverId::Anime4kCpp)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DriverId {
    type Err = ConfigError;

    /// Accepts either the section identifier or the picker name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.id() == s || d.display_name() == s)
            .ok_or_else(|| ConfigError::UnknownDriver(s.to_string()))
    }
}
