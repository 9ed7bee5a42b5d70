//! One-job-at-a-time orchestration: prepare, start, stop and shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::{FailureDetail, JobOutcome, OrchestratorError, OrchestratorResult};
use super::poller::poll_progress_logged;
use super::runner::spawn_runner;
use crate::config::AppConfig;
use crate::drivers::{required_fields, resolve, DriverId, FieldValues};
use crate::engine::Engine;
use crate::job::{JobHandle, JobId, JobSpec, ProgressSample};
use crate::logging::{JobLogger, LogCallback, LogConfig};
use crate::paths::{absolutize, expand_path};

/// Tunables for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Progress sampling period.
    pub tick: Duration,
    /// How long `shutdown` waits for the runner and poller to settle.
    pub shutdown_grace: Duration,
    /// Folder for per-job log files. `None` disables job logs.
    pub log_dir: Option<PathBuf>,
    pub log_config: LogConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            log_dir: None,
            log_config: LogConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults with job logging taken from the `[logging]` section.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            log_dir: Some(config.logging.logs_folder()),
            log_config: config.logging.to_log_config(),
            ..Self::default()
        }
    }
}

/// What the interactive layer collected for a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub driver: DriverId,
    pub input_path: String,
    pub output_path: String,
    /// Form values for the driver; they override the config section.
    pub fields: FieldValues,
    /// `None` uses the driver's default ratio.
    pub scale_ratio: Option<f64>,
    /// `None` uses the driver's preferred count.
    pub process_count: Option<u32>,
    /// `None` or blank uses the configured cache directory.
    pub cache_directory: Option<String>,
    /// `None` uses the configured value.
    pub preserve_frames: Option<bool>,
}

impl JobRequest {
    pub fn new(
        driver: DriverId,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            input_path: input_path.into(),
            output_path: output_path.into(),
            fields: FieldValues::new(),
            scale_ratio: None,
            process_count: None,
            cache_directory: None,
            preserve_frames: None,
        }
    }

    pub fn with_fields(mut self, fields: FieldValues) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_scale_ratio(mut self, ratio: f64) -> Self {
        self.scale_ratio = Some(ratio);
        self
    }

    pub fn with_process_count(mut self, count: u32) -> Self {
        self.process_count = Some(count);
        self
    }

    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = Some(dir.into());
        self
    }

    pub fn with_preserve_frames(mut self, preserve: bool) -> Self {
        self.preserve_frames = Some(preserve);
        self
    }
}

/// Validate `request` against `config` and build the job spec.
///
/// Form values are layered over the driver's config section. A missing
/// section is only an error when the form values alone do not cover every
/// required field.
pub fn prepare_job(config: &AppConfig, request: JobRequest) -> OrchestratorResult<JobSpec> {
    let input = request.input_path.trim();
    if input.is_empty() {
        return Err(OrchestratorError::invalid_job("Input path not specified"));
    }
    let output = request.output_path.trim();
    if output.is_empty() {
        return Err(OrchestratorError::invalid_job("Output path not specified"));
    }

    let driver_id = request.driver;
    let fields = match config.driver_section(driver_id) {
        Ok(section) => FieldValues::from_section(section).overlay(request.fields),
        Err(_) if request.fields.covers(required_fields(driver_id)) => request.fields,
        Err(err) => return Err(err.into()),
    };
    let driver = resolve(driver_id, &fields)?;

    let bounds = driver_id.scale_ratio_bounds();
    let scale_ratio = request.scale_ratio.unwrap_or(bounds.default);
    if !bounds.contains(scale_ratio) {
        return Err(OrchestratorError::invalid_job(format!(
            "Scale ratio {} is outside {}..={} for {}",
            scale_ratio, bounds.min, bounds.max, driver_id
        )));
    }

    let process_count = request
        .process_count
        .unwrap_or_else(|| driver_id.preferred_process_count());
    if process_count < 1 {
        return Err(OrchestratorError::invalid_job(
            "Process count must be at least 1",
        ));
    }

    let cache_directory = match request.cache_directory.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => absolutize(&expand_path(dir)),
        _ => config.video2x.cache_directory(),
    };

    Ok(JobSpec {
        input_path: expand_path(input),
        output_path: expand_path(output),
        driver,
        transcoding: config.ffmpeg.clone(),
        scale_ratio,
        process_count,
        cache_directory,
        image_format: config.video2x.image_format,
        preserve_frames: request
            .preserve_frames
            .unwrap_or(config.video2x.preserve_frames),
    })
}

/// Handle for requesting cancellation of a running job.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Receiving side of a started job.
///
/// Samples arrive in emission order. The outcome may arrive before or after
/// the last sample.
#[derive(Debug)]
pub struct JobRun {
    id: JobId,
    progress: mpsc::UnboundedReceiver<ProgressSample>,
    outcome: Option<oneshot::Receiver<JobOutcome>>,
    cancel: CancelHandle,
}

impl JobRun {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Next progress sample; `None` once sampling has ended.
    pub async fn next_sample(&mut self) -> Option<ProgressSample> {
        self.progress.recv().await
    }

    /// Next sample if one is ready, without waiting.
    pub fn try_next_sample(&mut self) -> Option<ProgressSample> {
        self.progress.try_recv().ok()
    }

    /// Wait for the terminal outcome. `None` once it has been taken.
    pub async fn outcome(&mut self) -> Option<JobOutcome> {
        let rx = self.outcome.take()?;
        Some(rx.await.unwrap_or_else(|_| lost_outcome()))
    }

    /// Take the terminal outcome if it is ready.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        let rx = self.outcome.as_mut()?;
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => lost_outcome(),
        };
        self.outcome = None;
        Some(outcome)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

fn lost_outcome() -> JobOutcome {
    JobOutcome::Failed(FailureDetail::new(
        "Upscaling task ended without reporting an outcome",
    ))
}

/// What happened during [`Orchestrator::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Job that was active, if any.
    pub job: Option<JobId>,
    pub runner_settled: bool,
    pub poller_settled: bool,
}

impl ShutdownReport {
    fn idle() -> Self {
        Self {
            job: None,
            runner_settled: true,
            poller_settled: true,
        }
    }

    /// Both tasks finished within the grace period.
    pub fn is_clean(&self) -> bool {
        self.runner_settled && self.poller_settled
    }
}

struct ActiveJob {
    id: JobId,
    cancel: CancellationToken,
    runner: JoinHandle<()>,
    poller: Option<JoinHandle<()>>,
}

impl ActiveJob {
    fn is_finished(&self) -> bool {
        self.runner.is_finished() && self.poller.as_ref().is_none_or(|p| p.is_finished())
    }
}

/// Runs upscaling jobs one at a time on a tokio runtime.
///
/// # Example
///
/// ```ignore
/// let runtime = worker_runtime()?;
/// let mut orchestrator = Orchestrator::new(engine, runtime.handle().clone());
///
/// let spec = prepare_job(&config, JobRequest::new(DriverId::Waifu2xNcnnVulkan, input, output))?;
/// let mut run = orchestrator.start(spec)?;
///
/// while let Some(sample) = runtime.block_on(run.next_sample()) {
///     show(present_now(&sample));
/// }
/// let outcome = runtime.block_on(run.outcome());
/// ```
pub struct Orchestrator {
    engine: Arc<dyn Engine>,
    runtime: Handle,
    config: OrchestratorConfig,
    active: Option<ActiveJob>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn Engine>, runtime: Handle) -> Self {
        Self::with_config(engine, runtime, OrchestratorConfig::default())
    }

    pub fn with_config(engine: Arc<dyn Engine>, runtime: Handle, config: OrchestratorConfig) -> Self {
        Self {
            engine,
            runtime,
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether a started job has not finished yet.
    pub fn is_busy(&self) -> bool {
        self.active.as_ref().is_some_and(|job| !job.is_finished())
    }

    /// Start a job. See [`start_with_log_callback`](Self::start_with_log_callback).
    pub fn start(&mut self, spec: JobSpec) -> OrchestratorResult<JobRun> {
        self.start_with_log_callback(spec, None)
    }

    /// Start a job, forwarding job log lines to `log_callback`.
    ///
    /// Spawns the runner, and the progress poller for drivers that report
    /// frame progress. Fails with [`OrchestratorError::JobActive`] while a
    /// previous job is still in flight.
    pub fn start_with_log_callback(
        &mut self,
        spec: JobSpec,
        log_callback: Option<LogCallback>,
    ) -> OrchestratorResult<JobRun> {
        if self.is_busy() {
            return Err(OrchestratorError::JobActive);
        }

        let driver_id = spec.driver_id();
        let cancel = CancellationToken::new();
        let mut job = JobHandle::with_token(spec, cancel.clone());
        let mut progress_log = None;

        if let Some(ref log_dir) = self.config.log_dir {
            let logger = JobLogger::builder(job.spec().display_name(), log_dir.clone())
                .config(self.config.log_config.clone())
                .callback(log_callback)
                .build()
                .map_err(OrchestratorError::Logger)?;
            log_job_header(&logger, job.spec());
            let logger = Arc::new(logger);
            progress_log = Some(logger.clone());
            job = job.with_logger(logger);
        }

        let job = Arc::new(job);
        let id = job.id();
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();

        let poller = if driver_id.reports_progress() {
            Some(self.runtime.spawn(poll_progress_logged(
                job.monitor(),
                cancel.clone(),
                self.config.tick,
                sample_tx,
                progress_log,
            )))
        } else {
            tracing::debug!(job = %id, "{} does not report frame progress", driver_id);
            drop(sample_tx);
            None
        };

        let (runner, outcome_rx) = spawn_runner(&self.runtime, self.engine.clone(), job);

        tracing::info!(job = %id, driver = %driver_id, "Job started");
        self.active = Some(ActiveJob {
            id,
            cancel: cancel.clone(),
            runner,
            poller,
        });

        Ok(JobRun {
            id,
            progress: sample_rx,
            outcome: Some(outcome_rx),
            cancel: CancelHandle { token: cancel },
        })
    }

    /// Request cooperative cancellation of the active job.
    ///
    /// Returns `false` when no job is running.
    pub fn stop(&self) -> bool {
        match self.active {
            Some(ref job) if !job.is_finished() => {
                tracing::info!(job = %job.id, "Stop requested");
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel the active job and wait up to the grace period for it to
    /// settle. Tasks still running afterwards are detached, not killed.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let Some(active) = self.active.take() else {
            return ShutdownReport::idle();
        };
        active.cancel.cancel();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        let mut runner = active.runner;
        let runner_settled = tokio::time::timeout_at(deadline, &mut runner).await.is_ok();
        let poller_settled = match active.poller {
            Some(mut poller) => tokio::time::timeout_at(deadline, &mut poller).await.is_ok(),
            None => true,
        };

        let report = ShutdownReport {
            job: Some(active.id),
            runner_settled,
            poller_settled,
        };
        if report.is_clean() {
            tracing::info!(job = %active.id, "Shutdown complete");
        } else {
            tracing::warn!(
                job = %active.id,
                runner_settled,
                poller_settled,
                "Abandoning tasks that did not settle within {:?}",
                self.config.shutdown_grace
            );
        }
        report
    }

    /// Blocking [`shutdown`](Self::shutdown) for synchronous front-ends.
    ///
    /// Inside an async context this cannot block; it only requests
    /// cancellation and reports the tasks as unsettled.
    pub fn shutdown_blocking(&mut self) -> ShutdownReport {
        if Handle::try_current().is_ok() {
            tracing::warn!("shutdown_blocking called from async context; not waiting");
            let Some(active) = self.active.take() else {
                return ShutdownReport::idle();
            };
            active.cancel.cancel();
            return ShutdownReport {
                job: Some(active.id),
                runner_settled: active.runner.is_finished(),
                poller_settled: active.poller.as_ref().is_none_or(|p| p.is_finished()),
            };
        }

        let runtime = self.runtime.clone();
        runtime.block_on(self.shutdown())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(ref active) = self.active {
            active.cancel.cancel();
        }
    }
}

fn log_job_header(logger: &JobLogger, spec: &JobSpec) {
    logger.phase("Upscaling");
    logger.info(&format!("Input: {}", spec.input_path.display()));
    logger.info(&format!("Output: {}", spec.output_path.display()));
    logger.info(&format!(
        "Driver: {} (scale ratio {}, processes {})",
        spec.driver_id(),
        spec.scale_ratio,
        spec.process_count
    ));
    logger.debug(&format!("Cache: {}", spec.cache_directory.display()));
}

/// Two-worker runtime for front-ends that do not run one themselves.
pub fn worker_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("v2x-worker")
        .enable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::engine::EngineError;
    use crate::job::test_support::ncnn_spec;
    use crate::job::ImageFormat;
    use parking_lot::Mutex;
    use std::sync::mpsc as std_mpsc;

    /// Scripted engine step.
    enum Step {
        Attach(u64),
        Advance(u64),
        Finish,
        /// Return `Ok` without stopping the monitor.
        Return,
        CheckCancel,
    }

    /// Engine driven step by step from the test, acking each step.
    struct ScriptedEngine {
        steps: Mutex<std_mpsc::Receiver<Step>>,
        acks: mpsc::UnboundedSender<()>,
    }

    impl Engine for ScriptedEngine {
        fn run(&self, job: &JobHandle) -> Result<(), EngineError> {
            let steps = self.steps.lock();
            let progress = job.progress();
            while let Ok(step) = steps.recv() {
                let result = match step {
                    Step::Attach(total) => {
                        progress.attach(total);
                        None
                    }
                    Step::Advance(frames) => {
                        progress.add_frames_upscaled(frames);
                        None
                    }
                    Step::Finish => {
                        progress.finish();
                        Some(Ok(()))
                    }
                    Step::Return => Some(Ok(())),
                    Step::CheckCancel => job
                        .is_cancelled()
                        .then_some(Err(EngineError::Interrupted)),
                };
                let _ = self.acks.send(());
                if let Some(result) = result {
                    return result;
                }
            }
            Err(EngineError::other("script ended"))
        }
    }

    fn scripted() -> (
        Arc<dyn Engine>,
        std_mpsc::Sender<Step>,
        mpsc::UnboundedReceiver<()>,
    ) {
        let (step_tx, step_rx) = std_mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let engine = ScriptedEngine {
            steps: Mutex::new(step_rx),
            acks: ack_tx,
        };
        (Arc::new(engine), step_tx, ack_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_reports_quarters_then_hundred() {
        let (engine, steps, mut acks) = scripted();
        let mut orchestrator = Orchestrator::new(engine, Handle::current());
        let mut run = orchestrator.start(ncnn_spec()).unwrap();

        steps.send(Step::Attach(400)).unwrap();
        acks.recv().await.unwrap();
        let mut seen = vec![run.next_sample().await.unwrap().percentage];

        for _ in 0..3 {
            steps.send(Step::Advance(100)).unwrap();
            acks.recv().await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
            seen.push(run.next_sample().await.unwrap().percentage);
        }

        steps.send(Step::Advance(100)).unwrap();
        steps.send(Step::Finish).unwrap();
        acks.recv().await.unwrap();
        acks.recv().await.unwrap();

        let last = run.next_sample().await.unwrap();
        seen.push(last.percentage);
        assert_eq!((last.frames_done, last.frames_total), (0, 0));
        assert!(run.next_sample().await.is_none());

        assert_eq!(seen, vec![0, 25, 50, 75, 100]);
        assert!(run.outcome().await.unwrap().is_completed());
        assert!(run.outcome().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_without_finish_still_ends_at_hundred() {
        crate::logging::init_test_tracing();
        let (engine, steps, mut acks) = scripted();
        let mut orchestrator = Orchestrator::new(engine, Handle::current());
        let mut run = orchestrator.start(ncnn_spec()).unwrap();

        steps.send(Step::Attach(400)).unwrap();
        acks.recv().await.unwrap();
        assert_eq!(run.next_sample().await.unwrap().percentage, 0);

        steps.send(Step::Advance(300)).unwrap();
        acks.recv().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(run.next_sample().await.unwrap().percentage, 75);

        steps.send(Step::Return).unwrap();
        acks.recv().await.unwrap();

        let mut last = None;
        while let Some(sample) = run.next_sample().await {
            last = Some(sample);
        }
        let last = last.unwrap();
        assert_eq!((last.percentage, last.frames_done, last.frames_total), (100, 0, 0));
        assert!(run.outcome().await.unwrap().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn job_log_records_compact_progress() {
        let dir = tempfile::tempdir().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();

        let (engine, steps, mut acks) = scripted();
        let config = OrchestratorConfig {
            log_dir: Some(dir.path().to_path_buf()),
            log_config: LogConfig {
                progress_step: 50,
                show_timestamps: false,
                ..LogConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        let mut orchestrator = Orchestrator::with_config(engine, Handle::current(), config);
        let mut run = orchestrator
            .start_with_log_callback(
                ncnn_spec(),
                Some(Box::new(move |line: &str| sink.lock().push(line.to_string()))),
            )
            .unwrap();

        steps.send(Step::Attach(400)).unwrap();
        acks.recv().await.unwrap();
        let mut seen = vec![run.next_sample().await.unwrap().percentage];
        for _ in 0..3 {
            steps.send(Step::Advance(100)).unwrap();
            acks.recv().await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
            seen.push(run.next_sample().await.unwrap().percentage);
        }
        steps.send(Step::Advance(100)).unwrap();
        steps.send(Step::Finish).unwrap();
        acks.recv().await.unwrap();
        acks.recv().await.unwrap();
        while let Some(sample) = run.next_sample().await {
            seen.push(sample.percentage);
        }
        assert!(run.outcome().await.unwrap().is_completed());
        assert_eq!(seen, vec![0, 25, 50, 75, 100]);

        let progress: Vec<String> = lines
            .lock()
            .iter()
            .filter(|l| l.starts_with("Progress:"))
            .cloned()
            .collect();
        assert_eq!(progress, vec!["Progress: 0%", "Progress: 50%", "Progress: 100%"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_attach_is_cancelled_without_samples() {
        let (engine, steps, mut acks) = scripted();
        let mut orchestrator = Orchestrator::new(engine, Handle::current());
        let mut run = orchestrator.start(ncnn_spec()).unwrap();

        run.cancel_handle().cancel();
        steps.send(Step::CheckCancel).unwrap();
        acks.recv().await.unwrap();

        assert!(run.next_sample().await.is_none());
        assert_eq!(run.outcome().await, Some(JobOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_busy() {
        crate::logging::init_test_tracing();
        let (engine, steps, mut acks) = scripted();
        let mut orchestrator = Orchestrator::new(engine, Handle::current());
        let mut run = orchestrator.start(ncnn_spec()).unwrap();

        assert!(matches!(
            orchestrator.start(ncnn_spec()),
            Err(OrchestratorError::JobActive)
        ));

        assert!(orchestrator.stop());
        steps.send(Step::CheckCancel).unwrap();
        acks.recv().await.unwrap();
        assert_eq!(run.outcome().await, Some(JobOutcome::Cancelled));

        let report = orchestrator.shutdown().await;
        assert_eq!(report.job, Some(run.id()));
        assert!(report.is_clean());
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_wedged_engine_after_grace() {
        crate::logging::init_test_tracing();
        let (engine, steps, _acks) = scripted();
        let mut orchestrator = Orchestrator::new(engine, Handle::current());
        let run = orchestrator.start(ncnn_spec()).unwrap();

        let started = tokio::time::Instant::now();
        let shutdown = tokio::spawn(async move {
            let report = orchestrator.shutdown().await;
            (report, orchestrator)
        });

        // The blocked engine keeps the paused clock from auto-advancing
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let (report, _orchestrator) = shutdown.await.unwrap();

        assert_eq!(report.job, Some(run.id()));
        assert!(!report.runner_settled);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(run.cancel_handle().is_cancelled());

        // Release the blocking thread
        drop(steps);
    }

    #[tokio::test(start_paused = true)]
    async fn anime4kcpp_runs_without_poller() {
        let engine: Arc<dyn Engine> = Arc::new(|_: &JobHandle| Ok::<(), EngineError>(()));
        let mut orchestrator = Orchestrator::new(engine, Handle::current());

        let config = AppConfig::default();
        let spec = prepare_job(
            &config,
            JobRequest::new(DriverId::Anime4kCpp, "/videos/in.mp4", "/videos/out.mp4"),
        )
        .unwrap();
        let mut run = orchestrator.start(spec).unwrap();

        assert!(run.next_sample().await.is_none());
        assert!(run.outcome().await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn job_log_is_written_and_forwarded() {
        crate::logging::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();

        let engine: Arc<dyn Engine> = Arc::new(|job: &JobHandle| {
            if let Some(logger) = job.logger() {
                logger.command("waifu2x-ncnn-vulkan -s 2");
            }
            Err::<(), _>(EngineError::other("driver exited"))
        });
        let config = OrchestratorConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..OrchestratorConfig::default()
        };
        let mut orchestrator = Orchestrator::with_config(engine, Handle::current(), config);
        let mut run = orchestrator
            .start_with_log_callback(
                ncnn_spec(),
                Some(Box::new(move |line: &str| sink.lock().push(line.to_string()))),
            )
            .unwrap();

        assert!(matches!(run.outcome().await, Some(JobOutcome::Failed(_))));
        let lines = lines.lock();
        assert!(lines.iter().any(|l| l.contains("=== Upscaling ===")));
        assert!(lines.iter().any(|l| l.contains("$ waifu2x-ncnn-vulkan -s 2")));
        assert!(lines.iter().any(|l| l.contains("[ERROR] driver exited")));
    }

    #[test]
    fn stop_without_job_is_noop() {
        let runtime = worker_runtime().unwrap();
        let engine: Arc<dyn Engine> = Arc::new(|_: &JobHandle| Ok::<(), EngineError>(()));
        let mut orchestrator = Orchestrator::new(engine, runtime.handle().clone());
        assert!(!orchestrator.stop());
        assert_eq!(orchestrator.shutdown_blocking(), ShutdownReport::idle());
    }

    #[test]
    fn blocking_shutdown_waits_for_job() {
        let runtime = worker_runtime().unwrap();
        let engine: Arc<dyn Engine> = Arc::new(|job: &JobHandle| {
            while !job.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err::<(), _>(EngineError::Interrupted)
        });
        let mut orchestrator = Orchestrator::new(engine, runtime.handle().clone());
        let mut run = orchestrator.start(ncnn_spec()).unwrap();

        let report = orchestrator.shutdown_blocking();
        assert!(report.is_clean());
        assert_eq!(run.try_outcome(), Some(JobOutcome::Cancelled));
    }

    mod prepare {
        use super::*;

        fn request(driver: DriverId) -> JobRequest {
            JobRequest::new(driver, "/videos/in.mp4", "/videos/out.mp4")
        }

        #[test]
        fn rejects_blank_paths() {
            let config = AppConfig::default();
            let err = prepare_job(&config, JobRequest::new(DriverId::SrmdNcnnVulkan, "  ", "/o"))
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid job: Input path not specified");

            let err = prepare_job(&config, JobRequest::new(DriverId::SrmdNcnnVulkan, "/i", ""))
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid job: Output path not specified");
        }

        #[test]
        fn applies_defaults() {
            let config = AppConfig::default();
            let spec = prepare_job(&config, request(DriverId::Anime4kCpp)).unwrap();

            assert_eq!(spec.scale_ratio, 2.0);
            assert_eq!(spec.process_count, 16);
            assert_eq!(spec.cache_directory, config.video2x.cache_directory());
            assert_eq!(spec.image_format, ImageFormat::Png);
            assert!(!spec.preserve_frames);
        }

        #[test]
        fn form_values_override_section() {
            let config = AppConfig::default();
            let spec = prepare_job(
                &config,
                request(DriverId::SrmdNcnnVulkan)
                    .with_fields(FieldValues::new().with("n", 10))
                    .with_preserve_frames(true)
                    .with_cache_directory("/scratch/v2x"),
            )
            .unwrap();

            assert_eq!(spec.driver.options()["n"].as_integer(), Some(10));
            assert!(spec.preserve_frames);
            assert_eq!(spec.cache_directory, PathBuf::from("/scratch/v2x"));
        }

        #[test]
        fn validates_scale_ratio_and_processes() {
            let config = AppConfig::default();

            let err = prepare_job(&config, request(DriverId::SrmdNcnnVulkan).with_scale_ratio(1.0))
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidJob(ref m) if m.contains("Scale ratio")));

            let err = prepare_job(&config, request(DriverId::Waifu2xCaffe).with_scale_ratio(0.0))
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidJob(_)));

            let err = prepare_job(&config, request(DriverId::Waifu2xCaffe).with_process_count(0))
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidJob(ref m) if m.contains("Process")));
        }

        #[test]
        fn missing_section_needs_complete_form() {
            let mut config = AppConfig::default();
            config.srmd_ncnn_vulkan = None;

            let err = prepare_job(&config, request(DriverId::SrmdNcnnVulkan)).unwrap_err();
            assert!(matches!(
                err,
                OrchestratorError::Config(ConfigError::MissingSection(ref s)) if s == "srmd_ncnn_vulkan"
            ));

            let fields = FieldValues::new()
                .with("path", "/opt/srmd/srmd-ncnn-vulkan")
                .with("n", 3)
                .with("t", 0)
                .with("model", "models-srmd")
                .with("g", 0)
                .with("j", "1:2:2")
                .with("x", false);
            let spec =
                prepare_job(&config, request(DriverId::SrmdNcnnVulkan).with_fields(fields)).unwrap();
            assert_eq!(spec.driver_id(), DriverId::SrmdNcnnVulkan);
        }

        #[test]
        fn bad_field_is_a_config_error() {
            let config = AppConfig::default();
            let err = prepare_job(
                &config,
                request(DriverId::Waifu2xNcnnVulkan).with_fields(FieldValues::new().with("n", "two")),
            )
            .unwrap_err();
            assert!(matches!(
                err,
                OrchestratorError::Config(ConfigError::InvalidField { ref field, .. }) if field == "n"
            ));
        }
    }
}
