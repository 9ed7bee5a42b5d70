//! Boundary to the upscaling engine.
//!
//! The engine extracts frames, runs the driver binary and re-encodes the
//! result. It is consumed here only through [`Engine`].

use std::io;

use thiserror::Error;

use crate::job::JobHandle;

/// A blocking upscaling engine.
///
/// `run` is called on a blocking worker thread, never on the interactive
/// thread. An implementation is expected to:
/// - call `job.progress().attach(total)` once the frame count is known
/// - advance the upscaled frame count as frames finish
/// - call `job.progress().finish()` after a normal run
/// - check `job.is_cancelled()` at safe points and return
///   [`EngineError::Interrupted`]
///
/// A blocked external call is not preempted on cancellation.
pub trait Engine: Send + Sync + 'static {
    fn run(&self, job: &JobHandle) -> Result<(), EngineError>;
}

impl<F> Engine for F
where
    F: Fn(&JobHandle) -> Result<(), EngineError> + Send + Sync + 'static,
{
    fn run(&self, job: &JobHandle) -> Result<(), EngineError> {
        self(job)
    }
}

/// Errors an engine run can end with.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The run stopped after observing cancellation.
    #[error("Upscaling was interrupted")]
    Interrupted,

    /// A driver or ffmpeg process failed.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Any other engine error, keeping its cause chain.
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error under a message.
    pub fn wrap(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, EngineError::Interrupted)
    }
}
