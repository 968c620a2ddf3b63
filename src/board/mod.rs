//! Board subsystem: decoding, calibration and dispatch
//!
//! Implements the reading pipeline in three stages:
//!
//! 1. [`decoder`] - Accumulates raw axis events into complete samples
//! 2. [`calibration`] - Tracks the board's zero baseline concurrently
//! 3. [`dispatcher`] - Routes samples to calibration or the output streams
//!
//! # Architecture
//!
//! ```text
//! Board ──► Decoder ──► Dispatcher ──┬──► readings / weights streams
//!           (Samples)                └──► calibration window
//! ```
//!
//! The dispatch loop runs on a dedicated blocking task and never waits on a
//! consumer; calibration passes are spawned on demand, one at a time.

pub mod calibration;
pub mod decoder;
pub mod dispatcher;

pub use calibration::{Baseline, CalibrationSettings, CalibrationView, SharedCalibration};
pub use decoder::EventDecoder;
pub use dispatcher::{BoardHandle, DispatcherSettings};

use chrono::{DateTime, Local};

/// One synchronized snapshot of the four pressure pads.
///
/// Completed by the decoder when the kernel sends a synchronization marker;
/// the total is always the exact integer sum of the corners, widened once.
#[derive(Debug, Clone)]
pub struct Sample {
    pub top_left: i32,
    pub top_right: i32,
    pub bottom_left: i32,
    pub bottom_right: i32,
    pub total: f64,
    pub button: bool,
    pub timestamp: DateTime<Local>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            top_left: 0,
            top_right: 0,
            bottom_left: 0,
            bottom_right: 0,
            total: 0.0,
            button: false,
            timestamp: Local::now(),
        }
    }
}

impl Sample {
    /// Integer sum of the four corners, the value calibration accumulates.
    pub fn corner_total(&self) -> i32 {
        self.top_left + self.top_right + self.bottom_left + self.bottom_right
    }
}

// Board settings for both pipeline stages
#[derive(Clone, Debug, Default)]
pub struct BoardSettings {
    pub dispatcher: DispatcherSettings,
    pub calibration: CalibrationSettings,
}
