//! Background execution of the blocking engine call.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::errors::{FailureDetail, JobOutcome};
use crate::engine::{Engine, EngineError};
use crate::job::JobHandle;
use crate::presenter::format_completion;

/// Run `engine` for `job` on the blocking pool and fold the result into one
/// [`JobOutcome`].
///
/// Engine errors and panics become `Failed`; nothing escapes to the caller.
/// A monitor the engine left running is stopped after a normal return and
/// marked aborted after any other result, so the poller always settles.
pub async fn run_job(engine: Arc<dyn Engine>, job: Arc<JobHandle>) -> JobOutcome {
    let started = Instant::now();
    let worker_job = job.clone();

    tracing::info!(job = %job.id(), driver = %job.spec().driver_id(), "Upscaling started");

    let result = tokio::task::spawn_blocking(move || engine.run(&worker_job)).await;

    let outcome = match result {
        Ok(Ok(())) => JobOutcome::Completed {
            elapsed: started.elapsed(),
        },
        Ok(Err(EngineError::Interrupted)) => JobOutcome::Cancelled,
        Ok(Err(err)) => JobOutcome::Failed(
            FailureDetail::from_engine_error(&err).with_log_tail(log_tail(&job)),
        ),
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            JobOutcome::Failed(
                FailureDetail::from_panic(payload.as_ref()).with_log_tail(log_tail(&job)),
            )
        }
        Err(join_err) => JobOutcome::Failed(FailureDetail::new(format!(
            "Engine task did not complete: {}",
            join_err
        ))),
    };

    let settled = if outcome.is_completed() {
        job.progress().finish()
    } else {
        job.progress_cell().mark_aborted()
    };
    if settled {
        tracing::debug!(job = %job.id(), "Progress monitor was not stopped by the engine");
    }

    record_outcome(&job, &outcome);
    outcome
}

/// Spawn [`run_job`] on `runtime`, delivering the outcome through a oneshot.
pub fn spawn_runner(
    runtime: &Handle,
    engine: Arc<dyn Engine>,
    job: Arc<JobHandle>,
) -> (JoinHandle<()>, oneshot::Receiver<JobOutcome>) {
    let (tx, rx) = oneshot::channel();
    let id = job.id();
    let task = runtime.spawn(async move {
        let outcome = run_job(engine, job).await;
        if tx.send(outcome).is_err() {
            tracing::debug!(job = %id, "Outcome receiver dropped");
        }
    });
    (task, rx)
}

fn log_tail(job: &JobHandle) -> Vec<String> {
    job.logger().map(|logger| logger.tail()).unwrap_or_default()
}

fn record_outcome(job: &JobHandle, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed { elapsed } => {
            tracing::info!(job = %job.id(), elapsed_secs = elapsed.as_secs_f64(), "Upscaling completed");
            if let Some(logger) = job.logger() {
                logger.success(&format_completion(*elapsed));
            }
        }
        JobOutcome::Cancelled => {
            tracing::info!(job = %job.id(), "Upscaling interrupted");
            if let Some(logger) = job.logger() {
                logger.warn("Upscale has been interrupted");
            }
        }
        JobOutcome::Failed(detail) => {
            tracing::warn!(job = %job.id(), error = %detail.message, "Upscaling failed");
            if let Some(logger) = job.logger() {
                logger.error(&detail.to_string());
                logger.show_tail("driver");
            }
        }
    }
    if let Some(logger) = job.logger() {
        logger.flush();
    }
}
