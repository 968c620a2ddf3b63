//! Event decoder: raw kernel events into complete samples

use tracing::{debug, info};

use crate::board::Sample;
use crate::device::{RawInputEvent, EV_ABS, EV_KEY, EV_SYN};

// The board reports its pads on the hat axes.
const ABS_TOP_LEFT: u16 = 0x12; // ABS_HAT1X
const ABS_TOP_RIGHT: u16 = 0x10; // ABS_HAT0X
const ABS_BOTTOM_LEFT: u16 = 0x13; // ABS_HAT1Y
const ABS_BOTTOM_RIGHT: u16 = 0x11; // ABS_HAT0Y

// Front button of the board.
const KEY_FRONT_BUTTON: u16 = 304;

/// A read shorter than this is an incomplete burst and is thrown away whole.
const MIN_BATCH_EVENTS: usize = 5;

/// Accumulates axis updates into an in-progress [`Sample`] and emits it on
/// every synchronization marker.
#[derive(Debug, Default)]
pub struct EventDecoder {
    current: Sample,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one batch read, returning every sample completed by it.
    ///
    /// Batches with fewer than [`MIN_BATCH_EVENTS`] events are discarded
    /// without touching the in-progress sample.
    pub fn decode_batch(&mut self, batch: &[RawInputEvent]) -> Vec<Sample> {
        if batch.len() < MIN_BATCH_EVENTS {
            debug!("skipping incomplete batch of {} events", batch.len());
            return Vec::new();
        }

        let mut completed = Vec::new();
        for event in batch {
            if let Some(sample) = self.feed(event) {
                completed.push(sample);
            }
        }
        completed
    }

    fn feed(&mut self, event: &RawInputEvent) -> Option<Sample> {
        match event.event_type {
            EV_SYN => {
                let mut sample = std::mem::take(&mut self.current);
                sample.timestamp = chrono::Local::now();
                Some(sample)
            }
            EV_ABS => {
                match event.code {
                    ABS_TOP_LEFT => self.current.top_left = event.value,
                    ABS_TOP_RIGHT => self.current.top_right = event.value,
                    ABS_BOTTOM_LEFT => self.current.bottom_left = event.value,
                    ABS_BOTTOM_RIGHT => self.current.bottom_right = event.value,
                    other => {
                        info!("unexpected axis code: {other}");
                        return None;
                    }
                }
                self.current.total = f64::from(self.current.corner_total());
                None
            }
            EV_KEY => {
                if event.code == KEY_FRONT_BUTTON {
                    self.current.button = true;
                } else {
                    info!("unexpected key code: {}", event.code);
                }
                None
            }
            other => {
                info!("unexpected event type: {other}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(code: u16, value: i32) -> RawInputEvent {
        RawInputEvent::new(EV_ABS, code, value)
    }

    fn sync() -> RawInputEvent {
        RawInputEvent::new(EV_SYN, 0, 0)
    }

    #[test]
    fn short_batch_is_discarded_without_state_change() {
        let mut decoder = EventDecoder::new();
        // prime the in-progress sample
        decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 11),
            axis(ABS_TOP_RIGHT, 22),
            axis(ABS_BOTTOM_LEFT, 33),
            axis(ABS_BOTTOM_RIGHT, 44),
            axis(ABS_TOP_LEFT, 11),
        ]);

        let short = [axis(ABS_TOP_LEFT, 999), sync()];
        assert!(decoder.decode_batch(&short).is_empty());
        // the primed values survive the discarded batch untouched
        assert_eq!(decoder.current.top_left, 11);
        assert_eq!(decoder.current.top_right, 22);
        assert_eq!(decoder.current.total, 110.0);
    }

    #[test]
    fn total_is_exact_sum_of_corners() {
        let mut decoder = EventDecoder::new();
        let samples = decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 1200),
            axis(ABS_TOP_RIGHT, 1300),
            axis(ABS_BOTTOM_LEFT, 1400),
            axis(ABS_BOTTOM_RIGHT, 1500),
            sync(),
        ]);

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.top_left, 1200);
        assert_eq!(sample.top_right, 1300);
        assert_eq!(sample.bottom_left, 1400);
        assert_eq!(sample.bottom_right, 1500);
        assert_eq!(sample.total, 5400.0);
        assert!(!sample.button);
    }

    #[test]
    fn sync_resets_accumulation_to_zero() {
        let mut decoder = EventDecoder::new();
        decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 500),
            axis(ABS_TOP_RIGHT, 500),
            axis(ABS_BOTTOM_LEFT, 500),
            axis(ABS_BOTTOM_RIGHT, 500),
            sync(),
        ]);

        // a second burst only updates one corner; the rest start from zero
        let samples = decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 250),
            sync(),
            axis(ABS_TOP_RIGHT, 1),
            axis(ABS_BOTTOM_LEFT, 2),
            axis(ABS_BOTTOM_RIGHT, 3),
        ]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].top_left, 250);
        assert_eq!(samples[0].top_right, 0);
        assert_eq!(samples[0].total, 250.0);
    }

    #[test]
    fn unknown_axis_code_leaves_sample_untouched() {
        let mut decoder = EventDecoder::new();
        let samples = decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 100),
            axis(0x2f, 9999),
            axis(ABS_TOP_RIGHT, 100),
            axis(ABS_BOTTOM_LEFT, 100),
            axis(ABS_BOTTOM_RIGHT, 100),
            sync(),
        ]);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].total, 400.0);
    }

    #[test]
    fn only_the_front_button_sets_the_flag() {
        let mut decoder = EventDecoder::new();
        let samples = decoder.decode_batch(&[
            RawInputEvent::new(EV_KEY, 305, 1),
            axis(ABS_TOP_LEFT, 1),
            axis(ABS_TOP_RIGHT, 1),
            axis(ABS_BOTTOM_LEFT, 1),
            axis(ABS_BOTTOM_RIGHT, 1),
            sync(),
            RawInputEvent::new(EV_KEY, KEY_FRONT_BUTTON, 1),
            axis(ABS_TOP_LEFT, 2),
            axis(ABS_TOP_RIGHT, 2),
            axis(ABS_BOTTOM_LEFT, 2),
            axis(ABS_BOTTOM_RIGHT, 2),
            sync(),
        ]);

        assert_eq!(samples.len(), 2);
        assert!(!samples[0].button);
        assert!(samples[1].button);
    }

    #[test]
    fn accumulation_spans_batches_until_sync() {
        let mut decoder = EventDecoder::new();
        let none = decoder.decode_batch(&[
            axis(ABS_TOP_LEFT, 10),
            axis(ABS_TOP_RIGHT, 20),
            axis(ABS_BOTTOM_LEFT, 30),
            axis(ABS_BOTTOM_RIGHT, 40),
            axis(ABS_TOP_LEFT, 15),
        ]);
        assert!(none.is_empty());

        let samples = decoder.decode_batch(&[
            axis(ABS_TOP_RIGHT, 25),
            axis(ABS_BOTTOM_LEFT, 35),
            axis(ABS_BOTTOM_RIGHT, 45),
            axis(ABS_TOP_LEFT, 15),
            sync(),
        ]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].total, (15 + 25 + 35 + 45) as f64);
    }
}
