//! Projection of progress samples into display values.
//!
//! Everything here is pure: the same sample and clock reading always give the
//! same [`ProgressView`]. Division guards degrade to zero instead of failing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::ProgressSample;

/// Values a front-end shows for one progress sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub percentage: u8,
    /// Seconds since the job started.
    pub elapsed: f64,
    /// Estimated seconds left.
    pub remaining: f64,
    /// Frames per second.
    pub rate: f64,
    pub elapsed_text: String,
    pub remaining_text: String,
    /// Rate rounded to two decimals.
    pub rate_text: String,
}

/// Compute display values for `sample` as of `now`.
pub fn present(sample: &ProgressSample, now: DateTime<Utc>) -> ProgressView {
    let elapsed = (now - sample.start_time)
        .num_milliseconds()
        .max(0) as f64
        / 1000.0;

    let (rate, remaining) = if elapsed > 0.0 && sample.frames_done > 0 {
        let rate = sample.frames_done as f64 / elapsed;
        let left = sample.frames_total.saturating_sub(sample.frames_done) as f64;
        (rate, left / rate)
    } else {
        (0.0, 0.0)
    };

    ProgressView {
        percentage: sample.percentage,
        elapsed,
        remaining,
        rate,
        elapsed_text: format_hms(elapsed),
        remaining_text: format_hms(remaining),
        rate_text: format!("{:.2}", rate),
    }
}

/// [`present`] against the current wall clock.
pub fn present_now(sample: &ProgressSample) -> ProgressView {
    present(sample, Utc::now())
}

/// Format seconds as `HH:MM:SS`. Fractions are truncated; hours do not wrap
/// at 24. Negative or non-finite input shows as zero.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Message shown after a successful job.
pub fn format_completion(elapsed: Duration) -> String {
    let secs = (elapsed.as_secs_f64() * 1e5).round() / 1e5;
    format!("Upscale finished successfully, taking {} seconds", secs)
}
