//! Reading dispatcher: the live read-decode-route loop
//!
//! One dedicated blocking task pulls batches from the device, feeds them
//! through the decoder and routes every completed sample: into the running
//! calibration pass, into a fresh one when the board has drifted, or onto
//! the output streams. Every forward is a single `try_send`; a consumer
//! that is not ready just misses the sample.

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::board::calibration::{self, CalibrationView, SharedCalibration};
use crate::board::decoder::EventDecoder;
use crate::board::{BoardSettings, Sample};
use crate::device::{EventSource, RawInputEvent};

// Dispatcher settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Relative deviation from the calibrated weight that triggers a new
    /// calibration pass.
    pub drift_tolerance: f64,
    /// Totals below this many raw units are dropped as noise.
    pub noise_floor: f64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            drift_tolerance: 0.05,
            noise_floor: 200.0,
        }
    }
}

/// Where one completed sample goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A pass is collecting; the sample feeds the calibration window.
    Calibration,
    /// The board drifted (or was never calibrated); start a pass, drop the
    /// sample.
    StartCalibration,
    /// Near-empty board, not worth publishing.
    Noise,
    /// A valid reading for the output streams.
    Forward,
}

/// Pure routing decision for one sample against a calibration snapshot.
pub fn route(view: &CalibrationView, sample: &Sample, settings: &DispatcherSettings) -> Route {
    if view.calibrating {
        return Route::Calibration;
    }

    let calibrated = view.baseline.calibrated_weight;
    if calibrated == 0.0 {
        // never calibrated; any load at all should establish a baseline
        return Route::StartCalibration;
    }
    if (sample.total - calibrated).abs() / calibrated > settings.drift_tolerance {
        return Route::StartCalibration;
    }
    if sample.total < settings.noise_floor {
        return Route::Noise;
    }
    Route::Forward
}

/// Public handle for the board pipeline.
///
/// Spawning wires the decoder, dispatcher and calibration guard together
/// and returns the two output streams.
pub struct BoardHandle {
    /// Full samples, one per valid reading.
    pub readings: mpsc::Receiver<Sample>,
    /// Totals only, for weight classification.
    pub weights: mpsc::Receiver<f64>,
}

impl BoardHandle {
    /// Starts the read-decode-dispatch loop on a blocking task.
    pub fn spawn(source: Box<dyn EventSource>, settings: BoardSettings) -> Self {
        info!("spawning board listener with settings: {settings:?}");

        let (readings_tx, readings_rx) = mpsc::channel(1);
        let (weights_tx, weights_rx) = mpsc::channel(1);

        let listener = BoardListener::new(source, settings, readings_tx, weights_tx);
        task::spawn_blocking(move || listener.run());

        Self {
            readings: readings_rx,
            weights: weights_rx,
        }
    }
}

/// The dispatch loop state: decoder, output senders, calibration guard and
/// the sender into the currently running pass, if any.
pub struct BoardListener {
    source: Box<dyn EventSource>,
    decoder: EventDecoder,
    shared: SharedCalibration,
    settings: BoardSettings,
    readings_tx: mpsc::Sender<Sample>,
    weights_tx: mpsc::Sender<f64>,
    calibration_tx: Option<mpsc::Sender<Sample>>,
    runtime: Handle,
}

impl BoardListener {
    /// Must be called from within the runtime; the captured handle is what
    /// later spawns calibration passes from the blocking loop.
    pub fn new(
        source: Box<dyn EventSource>,
        settings: BoardSettings,
        readings_tx: mpsc::Sender<Sample>,
        weights_tx: mpsc::Sender<f64>,
    ) -> Self {
        Self {
            source,
            decoder: EventDecoder::new(),
            shared: SharedCalibration::new(),
            settings,
            readings_tx,
            weights_tx,
            calibration_tx: None,
            runtime: Handle::current(),
        }
    }

    /// Blocks on the device forever. Read errors are logged and ridden
    /// out; the board either recovers or the process gets restarted from
    /// outside.
    pub fn run(mut self) {
        info!("board listener started");
        loop {
            match self.source.next_batch() {
                Ok(batch) => self.handle_batch(&batch),
                Err(e) => warn!("error reading events from the board: {e}"),
            }
        }
    }

    /// Decodes one batch and routes every completed sample.
    pub fn handle_batch(&mut self, batch: &[RawInputEvent]) {
        for sample in self.decoder.decode_batch(batch) {
            self.dispatch(sample);
        }
    }

    fn dispatch(&mut self, sample: Sample) {
        let view = self.shared.view();
        match route(&view, &sample, &self.settings.dispatcher) {
            Route::Calibration => {
                if let Some(tx) = &self.calibration_tx {
                    if tx.try_send(sample).is_err() {
                        debug!("calibration window busy, dropping sample");
                    }
                }
            }
            Route::StartCalibration => self.start_calibration(),
            Route::Noise => debug!(total = sample.total, "dropping near-empty reading"),
            Route::Forward => {
                if self.weights_tx.try_send(sample.total).is_err() {
                    debug!("weight consumer not ready, dropping reading");
                }
                if self.readings_tx.try_send(sample).is_err() {
                    debug!("readings consumer not ready, dropping reading");
                }
            }
        }
    }

    /// Spawns a calibration pass unless one is already collecting.
    fn start_calibration(&mut self) {
        if !self.shared.begin() {
            debug!("calibration already in progress");
            return;
        }

        info!("weight drifted from baseline, recalibrating");
        let (tx, rx) = mpsc::channel(1);
        self.calibration_tx = Some(tx);
        self.runtime.spawn(calibration::run_pass(
            self.shared.clone(),
            rx,
            self.settings.calibration.clone(),
        ));
    }
}
