//! Driver settings registry.
//!
//! Turns the values a front-end collected for the selected driver into one
//! strongly typed [`DriverSettings`] value:
//! - `DriverId`: the closed set of supported drivers and their constraints
//! - `FieldValues`: untyped form values, seeded from a config section
//! - `resolve`: exhaustive per-driver resolution with named field errors
//!
//! # Example
//!
//! ```
//! use v2x_core::drivers::{resolve, DriverId, FieldValues};
//!
//! let fields = FieldValues::new()
//!     .with("path", "/opt/srmd/srmd-ncnn-vulkan")
//!     .with("n", 3)
//!     .with("t", 0)
//!     .with("model", "models-srmd")
//!     .with("g", 0)
//!     .with("j", "1:2:2")
//!     .with("x", false);
//!
//! let settings = resolve(DriverId::SrmdNcnnVulkan, &fields).unwrap();
//! assert_eq!(settings.options()["m"].as_str(), Some("/opt/srmd/models-srmd"));
//! ```

mod fields;
mod id;
mod settings;

pub use fields::{FieldValue, FieldValues};
pub use id::{DriverId, ScaleRatioBounds};
pub use settings::{
    required_fields, resolve, Anime4kCppSettings, DriverSettings, NcnnVulkanSettings,
    Waifu2xCaffeSettings, Waifu2xConverterCppSettings,
};
