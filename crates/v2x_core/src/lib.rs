//! V2X Core - job orchestration for the Video2X GUI
//!
//! This crate contains the logic that sits between a front-end and the
//! upscaling engine, with zero UI dependencies:
//! - Config file loading and per-driver settings resolution
//! - Running an upscale job off the interactive thread
//! - Sampling and presenting progress while the job runs
//!
//! # Example
//!
//! ```ignore
//! use v2x_core::config::ConfigManager;
//! use v2x_core::orchestrator::{prepare_job, JobRequest, Orchestrator};
//! use v2x_core::presenter::present_now;
//!
//! let mut config = ConfigManager::new("video2x.toml");
//! config.load()?;
//!
//! let spec = prepare_job(config.settings(), request)?;
//! let mut orchestrator = Orchestrator::new(engine, runtime.handle().clone());
//! let mut run = orchestrator.start(spec)?;
//!
//! while let Some(sample) = run.next_sample().await {
//!     let view = present_now(&sample);
//!     println!("{}% {} fps", view.percentage, view.rate_text);
//! }
//! if let Some(outcome) = run.outcome().await {
//!     println!("{}", outcome);
//! }
//! ```

pub mod config;
pub mod drivers;
pub mod engine;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod paths;
pub mod presenter;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
