//! Calibration tracker: baseline computation under a shared guard
//!
//! A calibration pass consumes samples from its own channel until the board
//! has been under a constant load for long enough, then replaces the shared
//! [`Baseline`] in one write. The dispatch loop keeps running the whole
//! time; it only ever sees the state through [`SharedCalibration`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::board::Sample;

// Calibration settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Minimum collection window in seconds.
    pub window_secs: u64,
    /// Minimum number of accepted samples before the window may close.
    pub min_samples: u32,
    /// Largest tolerated relative change between consecutive totals.
    pub stability_tolerance: f64,
    /// Totals below this many raw units restart the window.
    pub min_weight: i32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            window_secs: 3,
            min_samples: 100,
            stability_tolerance: 0.2,
            min_weight: 100,
        }
    }
}

impl CalibrationSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// The calibrated zero reference: per-corner centers plus the aggregate
/// weight that live totals are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Baseline {
    pub top_left: i32,
    pub top_right: i32,
    pub bottom_left: i32,
    pub bottom_right: i32,
    pub calibrated_weight: f64,
}

#[derive(Debug, Default)]
struct CalibrationState {
    calibrating: bool,
    baseline: Baseline,
}

/// Consistent snapshot of the calibration flag and baseline.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationView {
    pub calibrating: bool,
    pub baseline: Baseline,
}

/// Shared guard around the calibration state.
///
/// The only operations are an atomic snapshot, a single-slot `begin`, and
/// the wholesale `commit`/`abort` transitions, so readers can never observe
/// a half-replaced baseline. Reads from the dispatch loop go through
/// bounded try-lock retries instead of blocking the thread on the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedCalibration {
    state: Arc<RwLock<CalibrationState>>,
}

impl SharedCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of flag and baseline, taken under one read lock.
    pub fn view(&self) -> CalibrationView {
        loop {
            match self.state.try_read() {
                Ok(guard) => {
                    return CalibrationView {
                        calibrating: guard.calibrating,
                        baseline: guard.baseline,
                    }
                }
                Err(_) => {
                    debug!("calibration state contended, retrying read");
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Claims the single calibration slot. Returns false if a pass is
    /// already running, in which case the caller must not spawn another.
    pub fn begin(&self) -> bool {
        loop {
            match self.state.try_write() {
                Ok(mut guard) => {
                    if guard.calibrating {
                        return false;
                    }
                    guard.calibrating = true;
                    return true;
                }
                Err(_) => {
                    debug!("calibration state contended, retrying write");
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Replaces the baseline and leaves the calibrating state in one write.
    pub async fn commit(&self, baseline: Baseline) {
        let mut guard = self.state.write().await;
        guard.baseline = baseline;
        guard.calibrating = false;
    }

    /// Leaves the calibrating state keeping the previous baseline.
    pub async fn abort(&self) {
        let mut guard = self.state.write().await;
        guard.calibrating = false;
    }
}

/// Verdict on one sample offered to the collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    /// Counted into the running sums.
    Accepted,
    /// Incomplete contact (a corner at zero), ignored entirely.
    Skipped,
    /// Load not constant yet; the whole accumulation starts over.
    Reset,
}

/// Running per-corner sums over the accepted samples of one pass.
#[derive(Debug, Default)]
pub struct SampleWindow {
    sum_top_left: i32,
    sum_top_right: i32,
    sum_bottom_left: i32,
    sum_bottom_right: i32,
    count: u32,
    last_total: i32,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Applies the acceptance rules to one sample.
    ///
    /// A corner reading exactly zero is an unsupported contact state and is
    /// skipped without any effect. A total below the minimum weight or more
    /// than the tolerated distance from the previously offered total throws
    /// the accumulation away; the new total becomes the comparison point
    /// either way.
    pub fn offer(&mut self, sample: &Sample, settings: &CalibrationSettings) -> SampleVerdict {
        if sample.top_left == 0
            || sample.top_right == 0
            || sample.bottom_left == 0
            || sample.bottom_right == 0
        {
            return SampleVerdict::Skipped;
        }

        let total = sample.corner_total();
        let unstable = total < settings.min_weight
            || f64::from(self.last_total - total).abs() / f64::from(total)
                > settings.stability_tolerance;
        self.last_total = total;

        if unstable {
            self.sum_top_left = 0;
            self.sum_top_right = 0;
            self.sum_bottom_left = 0;
            self.sum_bottom_right = 0;
            self.count = 0;
            return SampleVerdict::Reset;
        }

        self.sum_top_left += sample.top_left;
        self.sum_top_right += sample.top_right;
        self.sum_bottom_left += sample.bottom_left;
        self.sum_bottom_right += sample.bottom_right;
        self.count += 1;
        SampleVerdict::Accepted
    }

    /// Averages the window into a baseline. Integer division, like the
    /// centers themselves.
    pub fn finalize(&self) -> Baseline {
        let n = self.count.max(1) as i32;
        let total_sum =
            self.sum_top_left + self.sum_top_right + self.sum_bottom_left + self.sum_bottom_right;
        Baseline {
            top_left: self.sum_top_left / n,
            top_right: self.sum_top_right / n,
            bottom_left: self.sum_bottom_left / n,
            bottom_right: self.sum_bottom_right / n,
            calibrated_weight: f64::from(total_sum / n),
        }
    }
}

// Pass phases
#[state]
#[derive(Debug, Clone)]
pub enum PassPhase {
    Collecting,
    Finalizing,
}

#[machine]
#[derive(Debug)]
pub struct CalibrationPass<S: PassPhase> {
    shared: SharedCalibration,
    samples: mpsc::Receiver<Sample>,
    settings: CalibrationSettings,
    window: SampleWindow,
    deadline: Instant,
}

impl CalibrationPass<Collecting> {
    /// Collects until the window has lasted long enough AND gathered enough
    /// accepted samples. Both bounds must hold; a fast stream still waits
    /// out the timer and a slow one extends it.
    ///
    /// Returns `None` when the sample channel closes first, after releasing
    /// the calibration slot.
    pub async fn collect(mut self) -> Option<CalibrationPass<Finalizing>> {
        loop {
            if self.window.count() >= self.settings.min_samples && Instant::now() >= self.deadline
            {
                break;
            }

            let Some(sample) = self.samples.recv().await else {
                warn!("calibration input closed before a stable window completed");
                self.shared.abort().await;
                return None;
            };

            match self.window.offer(&sample, &self.settings) {
                SampleVerdict::Accepted => {}
                SampleVerdict::Skipped => debug!("skipping sample with an idle corner"),
                SampleVerdict::Reset => {
                    debug!("load not settled, restarting collection window");
                    self.deadline = Instant::now() + self.settings.window();
                }
            }
        }
        Some(self.transition())
    }
}

impl CalibrationPass<Finalizing> {
    /// Publishes the averaged baseline and releases the calibration slot in
    /// one write.
    pub async fn commit(self) {
        let baseline = self.window.finalize();
        info!(
            calibrated_weight = baseline.calibrated_weight,
            "calibration complete"
        );
        self.shared.commit(baseline).await;
    }
}

/// Runs one full calibration pass. The caller must already hold the
/// calibration slot via [`SharedCalibration::begin`].
pub async fn run_pass(
    shared: SharedCalibration,
    samples: mpsc::Receiver<Sample>,
    settings: CalibrationSettings,
) {
    info!("calibrating, keep the load constant");
    let deadline = Instant::now() + settings.window();
    let pass = CalibrationPass::new(shared, samples, settings, SampleWindow::new(), deadline);
    if let Some(pass) = pass.collect().await {
        pass.commit().await;
    }
}
