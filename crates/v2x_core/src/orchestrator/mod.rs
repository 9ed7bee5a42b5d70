//! Job orchestration: background execution and progress polling.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::start(spec)
//!     ├── runner  (blocking pool)  Engine::run ──► one JobOutcome (oneshot)
//!     └── poller  (async task)     ProgressCell ──► ProgressSample stream (mpsc)
//! ```
//!
//! The engine owns the progress cell's counters; the runner and poller only
//! observe it. Cancellation is a token the engine checks at safe points.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use v2x_core::config::AppConfig;
//! use v2x_core::drivers::DriverId;
//! use v2x_core::engine::{Engine, EngineError};
//! use v2x_core::job::JobHandle;
//! use v2x_core::orchestrator::{prepare_job, worker_runtime, JobRequest, Orchestrator};
//!
//! let engine: Arc<dyn Engine> = Arc::new(|job: &JobHandle| {
//!     job.progress().attach(240);
//!     // ... extract, upscale and encode ...
//!     job.progress().finish();
//!     Ok::<(), EngineError>(())
//! });
//!
//! let runtime = worker_runtime().unwrap();
//! let mut orchestrator = Orchestrator::new(engine, runtime.handle().clone());
//!
//! let config = AppConfig::default();
//! let request = JobRequest::new(DriverId::Waifu2xNcnnVulkan, "in.mp4", "out.mp4");
//! let mut run = orchestrator.start(prepare_job(&config, request).unwrap()).unwrap();
//!
//! while let Some(sample) = runtime.block_on(run.next_sample()) {
//!     println!("{}%", sample.percentage);
//! }
//! println!("{:?}", runtime.block_on(run.outcome()));
//! ```

mod errors;
mod poller;
mod runner;
mod session;

pub use errors::{FailureDetail, JobOutcome, OrchestratorError, OrchestratorResult};
pub use poller::poll_progress;
pub use runner::{run_job, spawn_runner};
pub use session::{
    prepare_job, worker_runtime, CancelHandle, JobRequest, JobRun, Orchestrator,
    OrchestratorConfig, ShutdownReport,
};
