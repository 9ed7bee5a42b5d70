//! Shared progress state between the engine and the progress poller.
//!
//! The engine writes through a [`ProgressReporter`]; the poller reads through
//! a [`ProgressMonitor`]. Frame counters are plain atomics. The monitor phase
//! is a `watch` channel so readers can await attachment and stop instead of
//! polling for them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of the engine's progress monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// Engine has not attached a monitor yet (frame total unknown).
    Pending,
    /// Engine is counting frames.
    Running,
    /// Engine stopped the monitor after a normal run.
    Stopped,
    /// Run ended without the engine stopping the monitor.
    Aborted,
}

impl MonitorPhase {
    /// Stopped or aborted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorPhase::Stopped | MonitorPhase::Aborted)
    }
}

/// Frame counters and monitor phase for one job.
#[derive(Debug)]
pub struct ProgressCell {
    total_frames: AtomicU64,
    frames_upscaled: AtomicU64,
    phase: watch::Sender<MonitorPhase>,
}

impl Default for ProgressCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCell {
    pub fn new() -> Self {
        Self {
            total_frames: AtomicU64::new(0),
            frames_upscaled: AtomicU64::new(0),
            phase: watch::Sender::new(MonitorPhase::Pending),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Acquire)
    }

    pub fn frames_upscaled(&self) -> u64 {
        self.frames_upscaled.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.phase.borrow()
    }

    /// Move to `next` if `allowed` accepts the current phase.
    fn transition(&self, next: MonitorPhase, allowed: impl Fn(MonitorPhase) -> bool) -> bool {
        self.phase.send_if_modified(|phase| {
            if allowed(*phase) {
                *phase = next;
                true
            } else {
                false
            }
        })
    }

    /// Mark the monitor aborted unless the engine already stopped it.
    ///
    /// Returns whether the phase changed.
    pub fn mark_aborted(&self) -> bool {
        self.transition(MonitorPhase::Aborted, |p| {
            matches!(p, MonitorPhase::Pending | MonitorPhase::Running)
        })
    }
}

/// Engine-side writer for a job's progress.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    cell: Arc<ProgressCell>,
}

impl ProgressReporter {
    pub(crate) fn new(cell: Arc<ProgressCell>) -> Self {
        Self { cell }
    }

    /// Attach the monitor once the total frame count is known.
    ///
    /// Returns `true` only for the call that moved the phase out of
    /// `Pending`; later calls just update the total.
    pub fn attach(&self, total_frames: u64) -> bool {
        self.cell.total_frames.store(total_frames, Ordering::Release);
        self.cell
            .transition(MonitorPhase::Running, |p| p == MonitorPhase::Pending)
    }

    /// Correct the total frame count after attachment.
    pub fn set_total_frames(&self, total_frames: u64) {
        self.cell.total_frames.store(total_frames, Ordering::Release);
    }

    /// Record the number of frames upscaled so far. Lower values than the
    /// current count are ignored.
    pub fn set_frames_upscaled(&self, frames: u64) {
        self.cell.frames_upscaled.fetch_max(frames, Ordering::AcqRel);
    }

    pub fn add_frames_upscaled(&self, frames: u64) {
        self.cell.frames_upscaled.fetch_add(frames, Ordering::AcqRel);
    }

    /// Stop the monitor after a normal run.
    pub fn finish(&self) -> bool {
        self.cell.transition(MonitorPhase::Stopped, |p| {
            matches!(p, MonitorPhase::Pending | MonitorPhase::Running)
        })
    }
}

/// Poller-side reader for a job's progress.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    cell: Arc<ProgressCell>,
    phase_rx: watch::Receiver<MonitorPhase>,
}

impl ProgressMonitor {
    pub(crate) fn new(cell: Arc<ProgressCell>) -> Self {
        let phase_rx = cell.phase.subscribe();
        Self { cell, phase_rx }
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.phase_rx.borrow()
    }

    /// `(frames_upscaled, total_frames)` read without locking.
    pub fn snapshot(&self) -> (u64, u64) {
        (self.cell.frames_upscaled(), self.cell.total_frames())
    }

    /// Wait until the phase leaves `Pending` and return the new phase.
    pub async fn wait_attached(&mut self) -> MonitorPhase {
        self.wait_until(|p| p != MonitorPhase::Pending).await
    }

    /// Wait until the monitor is stopped or aborted.
    pub async fn wait_settled(&mut self) -> MonitorPhase {
        self.wait_until(|p| p.is_terminal()).await
    }

    async fn wait_until(&mut self, f: impl Fn(MonitorPhase) -> bool) -> MonitorPhase {
        match self.phase_rx.wait_for(|p| f(*p)).await {
            Ok(phase) => *phase,
            // The cell owns the sender and we own the cell
            Err(_) => MonitorPhase::Aborted,
        }
    }
}

/// Integer completion percentage: `floor(100 * done / total)`, clamped to
/// 100, and 0 while the total is unknown.
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done) * 100) / u128::from(total);
    pct.min(100) as u8
}

/// One progress observation handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub percentage: u8,
    pub frames_done: u64,
    pub frames_total: u64,
    pub start_time: DateTime<Utc>,
}

impl ProgressSample {
    /// First sample after the monitor attaches.
    pub fn initial(start_time: DateTime<Utc>) -> Self {
        Self {
            percentage: 0,
            frames_done: 0,
            frames_total: 0,
            start_time,
        }
    }

    /// Forced final sample after a normal stop. Frame counts are zeroed.
    pub fn finished(start_time: DateTime<Utc>) -> Self {
        Self {
            percentage: 100,
            ..Self::initial(start_time)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_edge_cases() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(50, 200), 25);
        assert_eq!(percentage(199, 200), 99);
        assert_eq!(percentage(200, 200), 100);
        assert_eq!(percentage(500, 200), 100);
        assert_eq!(percentage(u64::MAX, 1), 100);
    }

    #[test]
    fn upscaled_count_never_decreases() {
        let cell = Arc::new(ProgressCell::new());
        let reporter = ProgressReporter::new(cell.clone());

        reporter.set_frames_upscaled(40);
        reporter.set_frames_upscaled(10);
        assert_eq!(cell.frames_upscaled(), 40);

        reporter.add_frames_upscaled(5);
        assert_eq!(cell.frames_upscaled(), 45);
    }

    #[test]
    fn phase_transitions() {
        let cell = Arc::new(ProgressCell::new());
        let reporter = ProgressReporter::new(cell.clone());
        assert_eq!(cell.phase(), MonitorPhase::Pending);

        assert!(reporter.attach(400));
        assert!(!reporter.attach(800));
        assert_eq!(cell.total_frames(), 800);
        assert_eq!(cell.phase(), MonitorPhase::Running);

        assert!(reporter.finish());
        assert!(!cell.mark_aborted());
        assert_eq!(cell.phase(), MonitorPhase::Stopped);
    }

    #[test]
    fn abort_before_attach() {
        let cell = Arc::new(ProgressCell::new());
        assert!(cell.mark_aborted());
        assert!(!ProgressReporter::new(cell.clone()).attach(10));
        assert_eq!(cell.phase(), MonitorPhase::Aborted);
    }

    #[tokio::test]
    async fn monitor_wakes_on_attach_and_stop() {
        let cell = Arc::new(ProgressCell::new());
        let mut monitor = ProgressMonitor::new(cell.clone());
        let reporter = ProgressReporter::new(cell);

        let waiter = tokio::spawn(async move {
            let attached = monitor.wait_attached().await;
            let settled = monitor.wait_settled().await;
            (attached, settled, monitor.snapshot())
        });

        reporter.attach(10);
        reporter.set_frames_upscaled(10);
        reporter.finish();

        let (attached, settled, snapshot) = waiter.await.unwrap();
        assert!(matches!(attached, MonitorPhase::Running | MonitorPhase::Stopped));
        assert_eq!(settled, MonitorPhase::Stopped);
        assert_eq!(snapshot, (10, 10));
    }

    #[test]
    fn forced_sample_zeroes_counts() {
        let t = Utc::now();
        let sample = ProgressSample::finished(t);
        assert_eq!(sample.percentage, 100);
        assert_eq!((sample.frames_done, sample.frames_total), (0, 0));
        assert_eq!(sample.start_time, t);
    }
}
