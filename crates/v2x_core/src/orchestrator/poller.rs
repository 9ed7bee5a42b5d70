//! Periodic sampling of a job's progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::job::{percentage, MonitorPhase, ProgressMonitor, ProgressSample};
use crate::logging::JobLogger;

/// Sample `monitor` every `tick` and send the results to `sink`.
///
/// Waits for the engine to attach the monitor first. Cancellation or abort
/// before attachment ends the loop without any sample. After attachment an
/// initial `{0, 0, 0}` sample goes out, then one sample per tick while the
/// monitor is running, and a forced `{100, 0, 0}` once it is stopped. An
/// aborted run gets no forced sample. Percentages never go down.
pub async fn poll_progress(
    mut monitor: ProgressMonitor,
    cancel: CancellationToken,
    tick: Duration,
    sink: UnboundedSender<ProgressSample>,
) {
    let attached = tokio::select! {
        biased;
        phase = monitor.wait_attached() => phase,
        _ = cancel.cancelled() => {
            tracing::debug!("Cancelled before the progress monitor attached");
            return;
        }
    };
    if attached == MonitorPhase::Aborted {
        tracing::debug!("Run ended before the progress monitor attached");
        return;
    }

    let start_time = Utc::now();
    if sink.send(ProgressSample::initial(start_time)).is_err() {
        return;
    }

    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_percentage = 0u8;

    let settled = loop {
        tokio::select! {
            biased;
            phase = monitor.wait_settled() => break phase,
            _ = ticker.tick() => {
                let (done, total) = monitor.snapshot();
                last_percentage = percentage(done, total).max(last_percentage);
                let sample = ProgressSample {
                    percentage: last_percentage,
                    frames_done: done,
                    frames_total: total,
                    start_time,
                };
                if sink.send(sample).is_err() {
                    tracing::debug!("Progress receiver dropped");
                    return;
                }
            }
        }
    };

    // Engines stop at 99% by convention
    if settled == MonitorPhase::Stopped {
        let _ = sink.send(ProgressSample::finished(start_time));
    }
}

/// [`poll_progress`], also recording each sample's percentage in the job
/// log. The logger applies its own compact-mode filtering.
pub(crate) async fn poll_progress_logged(
    monitor: ProgressMonitor,
    cancel: CancellationToken,
    tick: Duration,
    sink: UnboundedSender<ProgressSample>,
    logger: Option<Arc<JobLogger>>,
) {
    let Some(logger) = logger else {
        return poll_progress(monitor, cancel, tick, sink).await;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressSample>();
    let forward = async move {
        while let Some(sample) = rx.recv().await {
            logger.progress(sample.percentage.into());
            if sink.send(sample).is_err() {
                break;
            }
        }
    };
    tokio::join!(poll_progress(monitor, cancel, tick, tx), forward);
}
