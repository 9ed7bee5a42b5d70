//! Job request and the shared handle the engine works on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressCell, ProgressMonitor, ProgressReporter};
use crate::config::TranscodingSettings;
use crate::drivers::{DriverId, DriverSettings};
use crate::logging::JobLogger;

/// Format of extracted and upscaled intermediate frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Webp,
    Bmp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "webp" => Ok(ImageFormat::Webp),
            "bmp" => Ok(ImageFormat::Bmp),
            other => Err(format!("unsupported image format '{}'", other)),
        }
    }
}

impl TryFrom<String> for ImageFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Validated, immutable description of one upscaling job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSpec {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Resolved settings for the selected driver.
    pub driver: DriverSettings,
    /// FFmpeg options passed through to the engine.
    pub transcoding: TranscodingSettings,
    pub scale_ratio: f64,
    /// Parallel driver processes (threads for Anime4KCPP). Always at least 1.
    pub process_count: u32,
    /// Where extracted and upscaled frames are written.
    pub cache_directory: PathBuf,
    pub image_format: ImageFormat,
    /// Keep frames in the cache directory after the job.
    pub preserve_frames: bool,
}

impl JobSpec {
    pub fn driver_id(&self) -> DriverId {
        self.driver.driver_id()
    }

    /// Short job name for logs: the input's file name.
    pub fn display_name(&self) -> String {
        file_name_or_path(&self.input_path)
    }
}

fn file_name_or_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Process-unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Everything the engine needs for one run.
///
/// Shared between the orchestrator, the runner, the poller and the engine.
/// Only frame counters, the monitor phase and cancellation change after
/// creation.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    spec: JobSpec,
    cancel: CancellationToken,
    progress: Arc<ProgressCell>,
    logger: Option<Arc<JobLogger>>,
}

impl JobHandle {
    pub fn new(spec: JobSpec) -> Self {
        Self::with_token(spec, CancellationToken::new())
    }

    /// Create a handle observing an existing cancellation token.
    pub fn with_token(spec: JobSpec, cancel: CancellationToken) -> Self {
        Self {
            id: JobId::next(),
            spec,
            cancel,
            progress: Arc::new(ProgressCell::new()),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<JobLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Writer the engine uses to attach the monitor and count frames.
    pub fn progress(&self) -> ProgressReporter {
        ProgressReporter::new(self.progress.clone())
    }

    /// Reader for the progress poller.
    pub fn monitor(&self) -> ProgressMonitor {
        ProgressMonitor::new(self.progress.clone())
    }

    pub fn progress_cell(&self) -> &ProgressCell {
        &self.progress
    }

    /// Engines check this at safe points and return
    /// [`EngineError::Interrupted`](crate::engine::EngineError::Interrupted).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn frames_total(&self) -> u64 {
        self.progress.total_frames()
    }

    pub fn frames_upscaled(&self) -> u64 {
        self.progress.frames_upscaled()
    }

    pub fn logger(&self) -> Option<&JobLogger> {
        self.logger.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::drivers::{resolve, FieldValues};

    /// Spec for a waifu2x-ncnn-vulkan job on made-up paths.
    pub(crate) fn ncnn_spec() -> JobSpec {
        let fields = FieldValues::new()
            .with("path", "/opt/waifu2x/waifu2x-ncnn-vulkan")
            .with("n", 2)
            .with("t", 200)
            .with("model", "models-cunet")
            .with("g", 0)
            .with("j", "1:2:2")
            .with("x", false);
        let driver = resolve(DriverId::Waifu2xNcnnVulkan, &fields).unwrap();

        JobSpec {
            input_path: PathBuf::from("/videos/clip.mp4"),
            output_path: PathBuf::from("/videos/clip_output.mp4"),
            driver,
            transcoding: TranscodingSettings::default(),
            scale_ratio: 2.0,
            process_count: 1,
            cache_directory: PathBuf::from("/tmp/video2x"),
            image_format: ImageFormat::Png,
            preserve_frames: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ncnn_spec;
    use super::*;

    #[test]
    fn image_format_parses_case_insensitively() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpeg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert!("tiff".parse::<ImageFormat>().is_err());
        assert_eq!(serde_json::to_string(&ImageFormat::Webp).unwrap(), "\"webp\"");
    }

    #[test]
    fn job_ids_are_unique() {
        let a = JobHandle::new(ncnn_spec());
        let b = JobHandle::new(ncnn_spec());
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("job-"));
    }

    #[test]
    fn handle_shares_cancellation_and_progress() {
        let token = CancellationToken::new();
        let job = JobHandle::with_token(ncnn_spec(), token.clone());
        assert!(!job.is_cancelled());

        job.progress().attach(400);
        job.progress().set_frames_upscaled(100);
        assert_eq!((job.frames_upscaled(), job.frames_total()), (100, 400));
        assert_eq!(job.monitor().snapshot(), (100, 400));

        token.cancel();
        assert!(job.is_cancelled());
        assert_eq!(job.spec().driver_id(), DriverId::Waifu2xNcnnVulkan);
        assert_eq!(job.spec().display_name(), "clip.mp4");
    }
}
