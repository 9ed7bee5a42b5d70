//! Error and outcome types for job orchestration.
//!
//! Errors before a job starts are [`OrchestratorError`]s. Everything that
//! happens once it runs is folded into one [`JobOutcome`].

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Error preparing or starting a job.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Driver or config problem; no job was started.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The request failed validation.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Another job is still running on this orchestrator.
    #[error("A job is already running")]
    JobActive,

    /// The per-job log file could not be created.
    #[error("Failed to create job log: {0}")]
    Logger(#[source] io::Error),
}

impl OrchestratorError {
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob(message.into())
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Top-level error message. Never empty.
    pub message: String,
    /// Messages of the error's `source()` chain, outermost first.
    pub causes: Vec<String>,
    /// Last lines of driver output from the job log.
    pub log_tail: Vec<String>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Upscaling failed with an unknown error".to_string()
        } else {
            message
        };
        Self {
            message,
            causes: Vec::new(),
            log_tail: Vec::new(),
        }
    }

    /// Detail for an engine error, walking its source chain.
    pub fn from_engine_error(err: &EngineError) -> Self {
        let mut detail = Self::new(err.to_string());
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            detail.causes.push(cause.to_string());
            source = cause.source();
        }
        detail
    }

    /// Detail for a panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let text = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::new(format!("Engine panicked: {}", text))
    }

    pub fn with_log_tail(mut self, tail: Vec<String>) -> Self {
        self.log_tail = tail;
        self
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {}", cause)?;
        }
        Ok(())
    }
}

/// Terminal result of one job. Exactly one is delivered per job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
    },
    Cancelled,
    Failed(FailureDetail),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed { elapsed } => {
                write!(f, "{}", crate::presenter::format_completion(*elapsed))
            }
            JobOutcome::Cancelled => write!(f, "Upscale has been interrupted"),
            JobOutcome::Failed(detail) => write!(f, "Upscaler ran into an error:\n{}", detail),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
