//! Job handle and shared progress state.
//!
//! A [`JobSpec`] is the validated request. [`JobHandle`] wraps it together
//! with a cancellation token and the [`ProgressCell`] the engine updates.

mod progress;
mod types;

pub use progress::{
    percentage, MonitorPhase, ProgressCell, ProgressMonitor, ProgressReporter, ProgressSample,
};
pub use types::{ImageFormat, JobHandle, JobId, JobSpec};

#[cfg(test)]
pub(crate) use types::test_support;
