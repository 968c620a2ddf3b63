//! Device layer for the Wii Balance Board
//!
//! Owns everything that touches the host: evdev enumeration, the blocking
//! event read, and the battery sysfs lookup. The board core only ever sees
//! [`RawInputEvent`] triples through the [`EventSource`] seam, so it can be
//! driven by a fake source in tests.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

const NINTENDO_VENDOR: u16 = 0x057e;
const BALANCE_BOARD_PRODUCT: u16 = 0x0306;

const INPUT_DEVICE_LIST: &str = "/proc/bus/input/devices";

// Linux input event types carried by RawInputEvent.
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;

/// One raw `(type, code, value)` triple as delivered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }
}

// Device errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("didn't find any balance board on this system")]
    NotFound,

    #[error("couldn't inspect input devices: {0}")]
    Discovery(std::io::Error),

    #[error("didn't find the expected battery capacity location")]
    BatteryPathMissing,

    #[error("couldn't read events from the board: {0}")]
    Read(std::io::Error),

    #[error("couldn't read from the board battery file: {0}")]
    Battery(std::io::Error),

    #[error("didn't find an integer in the battery capacity file: {0}")]
    BatteryFormat(std::num::ParseIntError),
}

/// Blocking source of raw event batches.
///
/// One call corresponds to one kernel read: a burst of events terminated by
/// a synchronization marker, or an error that the caller is expected to log
/// and ride out.
pub trait EventSource: Send {
    fn next_batch(&mut self) -> Result<Vec<RawInputEvent>, DeviceError>;
}

/// A connected balance board: the open evdev handle plus its battery path.
pub struct BalanceBoard {
    device: evdev::Device,
    battery_path: PathBuf,
}

impl BalanceBoard {
    /// Picks the first connected balance board on the system.
    pub fn detect() -> Result<Self, DeviceError> {
        for (path, device) in evdev::enumerate() {
            let id = device.input_id();
            if id.vendor() != NINTENDO_VENDOR || id.product() != BALANCE_BOARD_PRODUCT {
                continue;
            }

            info!(
                "found balance board '{}' at {}",
                device.name().unwrap_or("unnamed"),
                path.display()
            );

            let battery_path = find_battery_path()?;
            debug!("battery capacity file at {}", battery_path.display());

            return Ok(Self {
                device,
                battery_path,
            });
        }

        Err(DeviceError::NotFound)
    }

    /// Returns the current power level as a percentage.
    pub fn battery(&self) -> Result<u8, DeviceError> {
        let raw = fs::read_to_string(&self.battery_path).map_err(DeviceError::Battery)?;
        raw.trim().parse().map_err(DeviceError::BatteryFormat)
    }
}

impl EventSource for BalanceBoard {
    fn next_batch(&mut self) -> Result<Vec<RawInputEvent>, DeviceError> {
        let events = self.device.fetch_events().map_err(DeviceError::Read)?;
        Ok(events
            .map(|event| RawInputEvent::new(event.event_type().0, event.code(), event.value()))
            .collect())
    }
}

/// Walks `/proc/bus/input/devices` to the board's stanza and resolves its
/// `power_supply` capacity file under `/sys`.
fn find_battery_path() -> Result<PathBuf, DeviceError> {
    let listing = fs::read_to_string(INPUT_DEVICE_LIST).map_err(DeviceError::Discovery)?;
    let marker = format!(
        "Vendor={:04x} Product={:04x}",
        NINTENDO_VENDOR, BALANCE_BOARD_PRODUCT
    );

    let mut in_board_stanza = false;
    for line in listing.lines() {
        // a blank line ends the stanza; reaching one inside the board's
        // stanza means it carried no sysfs entry
        if line.is_empty() {
            if in_board_stanza {
                return Err(DeviceError::BatteryPathMissing);
            }
            continue;
        }
        if line.contains(&marker) {
            in_board_stanza = true;
        }
        if !in_board_stanza {
            continue;
        }
        if let Some(sysfs) = line.strip_prefix("S: Sysfs=") {
            return capacity_file(&Path::new("/sys").join(sysfs.trim_start_matches('/')));
        }
    }

    Err(DeviceError::BatteryPathMissing)
}

fn capacity_file(sysfs: &Path) -> Result<PathBuf, DeviceError> {
    let supply_dir = sysfs.join("device/power_supply");
    let entries = fs::read_dir(&supply_dir).map_err(|_| DeviceError::BatteryPathMissing)?;
    for entry in entries {
        let candidate = entry.map_err(DeviceError::Discovery)?.path().join("capacity");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(DeviceError::BatteryPathMissing)
}
