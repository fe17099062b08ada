//! Status LED patterns
//!
//! The LED level is a pure function of the connectivity state, the current
//! time and the end of the "came online" flash window. The tick evaluates it
//! once per iteration and writes the result to the pin.

use crate::app_state::ConnectivityState;

/// Flash window length after the device comes online
pub const DEFAULT_FLASH_MS: u64 = 500;

/// Periodic on/off pattern, phase-locked to the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub period_ms: u64,
    pub on_ms: u64,
}

impl BlinkPattern {
    pub const fn new(period_ms: u64, on_ms: u64) -> Self {
        Self { period_ms, on_ms }
    }

    pub const fn level(&self, now: u64) -> bool {
        now % self.period_ms < self.on_ms
    }
}

/// Fast toggle while the flash window is active
pub const FLASH: BlinkPattern = BlinkPattern::new(100, 25);

/// Short blip every two seconds
pub const OFFLINE: BlinkPattern = BlinkPattern::new(2_000, 200);

/// Even 1 Hz blink
pub const PENDING_TIME_SYNC: BlinkPattern = BlinkPattern::new(1_000, 500);

/// 10% duty at 50 Hz, perceived as a dim steady glow
pub const TRANSMITTING: BlinkPattern = BlinkPattern::new(20, 2);

/// Steady pattern for a state; `None` means the LED stays off
pub const fn state_pattern(state: ConnectivityState) -> Option<BlinkPattern> {
    match state {
        ConnectivityState::Offline => Some(OFFLINE),
        ConnectivityState::PendingTimeSync => Some(PENDING_TIME_SYNC),
        ConnectivityState::Online => None,
        ConnectivityState::Transmitting => Some(TRANSMITTING),
    }
}

/// LED level for this tick. The flash window takes priority over the state pattern.
pub const fn indicator_level(state: ConnectivityState, now: u64, flash_until: Option<u64>) -> bool {
    if let Some(until) = flash_until {
        if now < until {
            return FLASH.level(now);
        }
    }

    match state_pattern(state) {
        Some(pattern) => pattern.level(now),
        None => false,
    }
}
