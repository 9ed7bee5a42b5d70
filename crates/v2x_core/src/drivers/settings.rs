//! Typed per-driver settings and their resolution from form values.
//!
//! Each driver has a fixed field set. The option names and value types
//! handed to the engine differ per driver and are spelled out in each
//! `options()` below; some drivers take toggles as 0/1 integers, others as
//! booleans.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fields::{FieldReader, FieldValues};
use super::id::DriverId;
use crate::config::ConfigResult;
use crate::paths::{expand_path, model_dir};

/// Field names each driver requires from the front-end, in resolution order.
pub fn required_fields(driver: DriverId) -> &'static [&'static str] {
    match driver {
        DriverId::Waifu2xCaffe => &[
            "path",
            "mode",
            "noise_level",
            "process",
            "model",
            "crop_size",
            "output_quality",
            "output_depth",
            "batch_size",
            "gpu",
            "tta",
        ],
        DriverId::Waifu2xConverterCpp => &[
            "path",
            "png-compression",
            "processor",
            "model",
            "mode",
            "disable-gpu",
            "tta",
        ],
        DriverId::Waifu2xNcnnVulkan | DriverId::SrmdNcnnVulkan => {
            &["path", "n", "t", "model", "g", "j", "x"]
        }
        DriverId::Anime4kCpp => &[
            "path",
            "passes",
            "pushColorCount",
            "strengthColor",
            "strengthGradient",
            "threads",
            "preFilters",
            "postFilters",
            "platformID",
            "deviceID",
            "codec",
            "fastMode",
            "preprocessing",
            "postprocessing",
            "GPUMode",
        ],
    }
}

/// Resolve form values into the settings for one driver.
///
/// Fails on the first missing or mistyped field; nothing is defaulted.
pub fn resolve(driver: DriverId, fields: &FieldValues) -> ConfigResult<DriverSettings> {
    let reader = FieldReader::new(driver.id(), fields);
    let settings = match driver {
        DriverId::Waifu2xCaffe => DriverSettings::Waifu2xCaffe(Waifu2xCaffeSettings::read(&reader)?),
        DriverId::Waifu2xConverterCpp => {
            DriverSettings::Waifu2xConverterCpp(Waifu2xConverterCppSettings::read(&reader)?)
        }
        DriverId::Waifu2xNcnnVulkan => {
            DriverSettings::Waifu2xNcnnVulkan(NcnnVulkanSettings::read(&reader)?)
        }
        DriverId::SrmdNcnnVulkan => DriverSettings::SrmdNcnnVulkan(NcnnVulkanSettings::read(&reader)?),
        DriverId::Anime4kCpp => DriverSettings::Anime4kCpp(Anime4kCppSettings::read(&reader)?),
    };

    tracing::debug!(
        "Resolved {} settings (binary: {})",
        driver,
        settings.binary_path().display()
    );
    Ok(settings)
}

/// Resolved settings for the selected driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", content = "settings")]
pub enum DriverSettings {
    #[serde(rename = "waifu2x_caffe")]
    Waifu2xCaffe(Waifu2xCaffeSettings),
    #[serde(rename = "waifu2x_converter_cpp")]
    Waifu2xConverterCpp(Waifu2xConverterCppSettings),
    #[serde(rename = "waifu2x_ncnn_vulkan")]
    Waifu2xNcnnVulkan(NcnnVulkanSettings),
    #[serde(rename = "srmd_ncnn_vulkan")]
    SrmdNcnnVulkan(NcnnVulkanSettings),
    #[serde(rename = "anime4kcpp")]
    Anime4kCpp(Anime4kCppSettings),
}

impl DriverSettings {
    pub fn driver_id(&self) -> DriverId {
        match self {
            DriverSettings::Waifu2xCaffe(_) => DriverId::Waifu2xCaffe,
            DriverSettings::Waifu2xConverterCpp(_) => DriverId::Waifu2xConverterCpp,
            DriverSettings::Waifu2xNcnnVulkan(_) => DriverId::Waifu2xNcnnVulkan,
            DriverSettings::SrmdNcnnVulkan(_) => DriverId::SrmdNcnnVulkan,
            DriverSettings::Anime4kCpp(_) => DriverId::Anime4kCpp,
        }
    }

    /// Path to the driver binary.
    pub fn binary_path(&self) -> &Path {
        match self {
            DriverSettings::Waifu2xCaffe(s) => &s.path,
            DriverSettings::Waifu2xConverterCpp(s) => &s.path,
            DriverSettings::Waifu2xNcnnVulkan(s) | DriverSettings::SrmdNcnnVulkan(s) => &s.path,
            DriverSettings::Anime4kCpp(s) => &s.path,
        }
    }

    /// Engine-facing option map, keyed by the driver's own option names.
    pub fn options(&self) -> toml::Table {
        match self {
            DriverSettings::Waifu2xCaffe(s) => s.options(),
            DriverSettings::Waifu2xConverterCpp(s) => s.options(),
            DriverSettings::Waifu2xNcnnVulkan(s) | DriverSettings::SrmdNcnnVulkan(s) => s.options(),
            DriverSettings::Anime4kCpp(s) => s.options(),
        }
    }
}

/// waifu2x-caffe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waifu2xCaffeSettings {
    pub path: PathBuf,
    pub mode: String,
    pub noise_level: i64,
    pub process: String,
    pub model_dir: PathBuf,
    pub crop_size: i64,
    pub output_quality: i64,
    pub output_depth: i64,
    pub batch_size: i64,
    pub gpu: i64,
    pub tta: bool,
}

impl Waifu2xCaffeSettings {
    fn read(r: &FieldReader<'_>) -> ConfigResult<Self> {
        let path = expand_path(&r.non_empty_text("path")?);
        let mode = r.text("mode")?;
        let noise_level = r.int("noise_level")?;
        let process = r.text("process")?;
        let model_dir = model_dir(&path, Some("models"), &r.non_empty_text("model")?);
        Ok(Self {
            path,
            mode,
            noise_level,
            process,
            model_dir,
            crop_size: r.int("crop_size")?,
            output_quality: r.int("output_quality")?,
            output_depth: r.int("output_depth")?,
            batch_size: r.int("batch_size")?,
            gpu: r.int("gpu")?,
            tta: r.flag("tta")?,
        })
    }

    fn options(&self) -> toml::Table {
        let mut t = toml::Table::new();
        t.insert("path".into(), path_value(&self.path));
        t.insert("mode".into(), self.mode.clone().into());
        t.insert("noise_level".into(), self.noise_level.into());
        t.insert("process".into(), self.process.clone().into());
        t.insert("model_dir".into(), path_value(&self.model_dir));
        t.insert("crop_size".into(), self.crop_size.into());
        t.insert("output_quality".into(), self.output_quality.into());
        t.insert("output_depth".into(), self.output_depth.into());
        t.insert("batch_size".into(), self.batch_size.into());
        t.insert("gpu".into(), self.gpu.into());
        t.insert("tta".into(), flag_as_int(self.tta));
        t
    }
}

/// waifu2x-converter-cpp settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waifu2xConverterCppSettings {
    pub path: PathBuf,
    pub png_compression: i64,
    pub processor: i64,
    pub model_dir: PathBuf,
    pub mode: String,
    pub disable_gpu: bool,
    pub tta: bool,
}

impl Waifu2xConverterCppSettings {
    fn read(r: &FieldReader<'_>) -> ConfigResult<Self> {
        let path = expand_path(&r.non_empty_text("path")?);
        let png_compression = r.int("png-compression")?;
        let processor = r.int("processor")?;
        let model_dir = model_dir(&path, None, &r.non_empty_text("model")?);
        Ok(Self {
            path,
            png_compression,
            processor,
            model_dir,
            mode: r.text("mode")?,
            disable_gpu: r.flag("disable-gpu")?,
            tta: r.flag("tta")?,
        })
    }

    fn options(&self) -> toml::Table {
        let mut t = toml::Table::new();
        t.insert("path".into(), path_value(&self.path));
        t.insert("png-compression".into(), self.png_compression.into());
        t.insert("processor".into(), self.processor.into());
        t.insert("model-dir".into(), path_value(&self.model_dir));
        t.insert("mode".into(), self.mode.clone().into());
        t.insert("disable-gpu".into(), self.disable_gpu.into());
        t.insert("tta".into(), flag_as_int(self.tta));
        t
    }
}

/// Settings shared by waifu2x-ncnn-vulkan and srmd-ncnn-vulkan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcnnVulkanSettings {
    pub path: PathBuf,
    pub noise_level: i64,
    pub tile_size: i64,
    pub model_dir: PathBuf,
    pub gpu_id: i64,
    /// Thread counts as `load:proc:save`.
    pub jobs: String,
    pub tta: bool,
}

impl NcnnVulkanSettings {
    fn read(r: &FieldReader<'_>) -> ConfigResult<Self> {
        let path = expand_path(&r.non_empty_text("path")?);
        let noise_level = r.int("n")?;
        let tile_size = r.int("t")?;
        let model_dir = model_dir(&path, None, &r.non_empty_text("model")?);
        Ok(Self {
            path,
            noise_level,
            tile_size,
            model_dir,
            gpu_id: r.int("g")?,
            jobs: r.text("j")?,
            tta: r.flag("x")?,
        })
    }

    fn options(&self) -> toml::Table {
        let mut t = toml::Table::new();
        t.insert("path".into(), path_value(&self.path));
        t.insert("n".into(), self.noise_level.into());
        t.insert("t".into(), self.tile_size.into());
        t.insert("m".into(), path_value(&self.model_dir));
        t.insert("g".into(), self.gpu_id.into());
        t.insert("j".into(), self.jobs.clone().into());
        t.insert("x".into(), self.tta.into());
        t
    }
}

/// Anime4KCPP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anime4kCppSettings {
    pub path: PathBuf,
    pub passes: i64,
    pub push_color_count: i64,
    pub strength_color: f64,
    pub strength_gradient: f64,
    pub threads: i64,
    pub pre_filters: i64,
    pub post_filters: i64,
    pub platform_id: i64,
    pub device_id: i64,
    pub codec: String,
    pub fast_mode: bool,
    pub preprocessing: bool,
    pub postprocessing: bool,
    pub gpu_mode: bool,
}

impl Anime4kCppSettings {
    fn read(r: &FieldReader<'_>) -> ConfigResult<Self> {
        Ok(Self {
            path: expand_path(&r.non_empty_text("path")?),
            passes: r.int("passes")?,
            push_color_count: r.int("pushColorCount")?,
            strength_color: r.float("strengthColor")?,
            strength_gradient: r.float("strengthGradient")?,
            threads: r.int("threads")?,
            pre_filters: r.int("preFilters")?,
            post_filters: r.int("postFilters")?,
            platform_id: r.int("platformID")?,
            device_id: r.int("deviceID")?,
            codec: r.text("codec")?,
            fast_mode: r.flag("fastMode")?,
            preprocessing: r.flag("preprocessing")?,
            postprocessing: r.flag("postprocessing")?,
            gpu_mode: r.flag("GPUMode")?,
        })
    }

    fn options(&self) -> toml::Table {
        let mut t = toml::Table::new();
        t.insert("path".into(), path_value(&self.path));
        t.insert("passes".into(), self.passes.into());
        t.insert("pushColorCount".into(), self.push_color_count.into());
        t.insert("strengthColor".into(), self.strength_color.into());
        t.insert("strengthGradient".into(), self.strength_gradient.into());
        t.insert("threads".into(), self.threads.into());
        t.insert("preFilters".into(), self.pre_filters.into());
        t.insert("postFilters".into(), self.post_filters.into());
        t.insert("platformID".into(), self.platform_id.into());
        t.insert("deviceID".into(), self.device_id.into());
        t.insert("codec".into(), self.codec.clone().into());
        t.insert("fastMode".into(), self.fast_mode.into());
        t.insert("preprocessing".into(), self.preprocessing.into());
        t.insert("postprocessing".into(), self.postprocessing.into());
        t.insert("GPUMode".into(), self.gpu_mode.into());
        t
    }
}

fn path_value(path: &Path) -> toml::Value {
    toml::Value::String(path.to_string_lossy().into_owned())
}

fn flag_as_int(flag: bool) -> toml::Value {
    toml::Value::Integer(i64::from(flag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    const BIN_DIR: &str = "/opt/video2x/driver";

    fn complete_fields(driver: DriverId) -> FieldValues {
        let path = format!("{BIN_DIR}/{}", driver.id());
        match driver {
            DriverId::Waifu2xCaffe => FieldValues::new()
                .with("path", path)
                .with("mode", "noise_scale")
                .with("noise_level", 3)
                .with("process", "gpu")
                .with("model", "cunet")
                .with("crop_size", 128)
                .with("output_quality", -1)
                .with("output_depth", 8)
                .with("batch_size", 1)
                .with("gpu", 0)
                .with("tta", true),
            DriverId::Waifu2xConverterCpp => FieldValues::new()
                .with("path", path)
                .with("png-compression", 5)
                .with("processor", -1)
                .with("model", "models_rgb")
                .with("mode", "noise-scale")
                .with("disable-gpu", false)
                .with("tta", false),
            DriverId::Waifu2xNcnnVulkan | DriverId::SrmdNcnnVulkan => FieldValues::new()
                .with("path", path)
                .with("n", 2)
                .with("t", 200)
                .with("model", "models-cunet")
                .with("g", 0)
                .with("j", "1:2:2")
                .with("x", true),
            DriverId::Anime4kCpp => FieldValues::new()
                .with("path", path)
                .with("passes", 2)
                .with("pushColorCount", 2)
                .with("strengthColor", 0.3)
                .with("strengthGradient", 1.0)
                .with("threads", 16)
                .with("preFilters", 4)
                .with("postFilters", 40)
                .with("platformID", 0)
                .with("deviceID", 0)
                .with("codec", "mp4v")
                .with("fastMode", false)
                .with("preprocessing", false)
                .with("postprocessing", false)
                .with("GPUMode", false),
        }
    }

    #[test]
    fn resolves_every_driver_with_all_options() {
        for driver in DriverId::ALL {
            let settings = resolve(driver, &complete_fields(driver)).unwrap();
            assert_eq!(settings.driver_id(), driver);

            let options = settings.options();
            let expected = required_fields(driver).len();
            assert_eq!(options.len(), expected, "option count for {driver}");
            assert!(!options.contains_key("model"), "bare model name leaked for {driver}");
        }
    }

    #[test]
    fn model_dirs_derive_from_binary_parent() {
        let cases = [
            (DriverId::Waifu2xCaffe, "model_dir", "models/cunet"),
            (DriverId::Waifu2xConverterCpp, "model-dir", "models_rgb"),
            (DriverId::Waifu2xNcnnVulkan, "m", "models-cunet"),
            (DriverId::SrmdNcnnVulkan, "m", "models-cunet"),
        ];

        for (driver, key, tail) in cases {
            let options = resolve(driver, &complete_fields(driver)).unwrap().options();
            let expected = Path::new(BIN_DIR).join(tail);
            assert_eq!(
                options[key].as_str(),
                Some(expected.to_string_lossy().as_ref()),
                "{driver}"
            );
        }
    }

    #[test]
    fn toggle_types_follow_each_driver() {
        let caffe = resolve(DriverId::Waifu2xCaffe, &complete_fields(DriverId::Waifu2xCaffe))
            .unwrap()
            .options();
        assert_eq!(caffe["tta"], toml::Value::Integer(1));

        let converter = resolve(
            DriverId::Waifu2xConverterCpp,
            &complete_fields(DriverId::Waifu2xConverterCpp),
        )
        .unwrap()
        .options();
        assert_eq!(converter["tta"], toml::Value::Integer(0));
        assert_eq!(converter["disable-gpu"], toml::Value::Boolean(false));

        let ncnn = resolve(DriverId::SrmdNcnnVulkan, &complete_fields(DriverId::SrmdNcnnVulkan))
            .unwrap()
            .options();
        assert_eq!(ncnn["x"], toml::Value::Boolean(true));
        assert_eq!(ncnn["j"], toml::Value::String("1:2:2".into()));

        let anime = resolve(DriverId::Anime4kCpp, &complete_fields(DriverId::Anime4kCpp))
            .unwrap()
            .options();
        assert_eq!(anime["GPUMode"], toml::Value::Boolean(false));
        assert_eq!(anime["strengthColor"], toml::Value::Float(0.3));
    }

    #[test]
    fn output_quality_reads_its_own_field() {
        let fields = complete_fields(DriverId::Waifu2xCaffe).with("output_quality", 90);
        let DriverSettings::Waifu2xCaffe(settings) = resolve(DriverId::Waifu2xCaffe, &fields).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(settings.output_quality, 90);
        assert_eq!(settings.output_depth, 8);
    }

    #[test]
    fn missing_field_is_named_for_every_driver() {
        for driver in DriverId::ALL {
            for field in required_fields(driver) {
                let mut fields = complete_fields(driver);
                fields.remove(field);

                match resolve(driver, &fields) {
                    Err(ConfigError::MissingField { section, field: missing }) => {
                        assert_eq!(section, driver.id());
                        assert_eq!(missing, *field);
                    }
                    other => panic!("{driver}/{field}: expected MissingField, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn mistyped_field_is_invalid_not_missing() {
        let fields = complete_fields(DriverId::Waifu2xNcnnVulkan).with("t", "large");
        let err = resolve(DriverId::Waifu2xNcnnVulkan, &fields).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "t"));
    }

    #[test]
    fn binary_path_expands_variables() {
        std::env::set_var("V2X_DRIVER_HOME", "/srv/drivers");
        let fields = complete_fields(DriverId::Waifu2xNcnnVulkan)
            .with("path", "$V2X_DRIVER_HOME/waifu2x-ncnn-vulkan");
        let settings = resolve(DriverId::Waifu2xNcnnVulkan, &fields).unwrap();
        assert_eq!(
            settings.binary_path(),
            Path::new("/srv/drivers/waifu2x-ncnn-vulkan")
        );
        assert_eq!(
            settings.options()["m"].as_str(),
            Some("/srv/drivers/models-cunet")
        );
    }
}
