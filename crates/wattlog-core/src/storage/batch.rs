use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// Averaged sensor values over one batching window
///
/// Immutable once emitted, except for the one-time move of its timestamp into
/// the epoch frame when the clock is first calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Mean voltage over the window, in volts
    pub voltage: f32,
    /// Mean current over the window, in amps
    pub current: f32,
    /// Window midpoint, milliseconds since the epoch (device-relative before calibration)
    pub timestamp_ms: u64,
}

impl BatchRecord {
    pub const fn new(voltage: f32, current: f32, timestamp_ms: u64) -> Self {
        Self {
            voltage,
            current,
            timestamp_ms,
        }
    }

    /// Timestamp truncated to whole seconds, as sent on the wire
    pub const fn timestamp_secs(&self) -> u64 {
        self.timestamp_ms / 1000
    }
}

impl Display for BatchRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[BatchRecord] timestamp: {} ms, voltage: {:.3} V, current: {:.3} A",
            self.timestamp_ms, self.voltage, self.current
        )
    }
}
