//! Sensor readings and raw-code conversion
//!
//! The device samples two analog channels every tick: the bus voltage through
//! a resistor divider and the load current through a hall-effect transducer.
//! The ADC returns 12-bit codes which are mapped linearly to physical units.

use core::fmt::Display;

use thiserror_no_std::Error;

/// ADC reference voltage in volts
const ADC_VREF: f32 = 3.3;

/// Number of ADC codes (12-bit converter)
const ADC_CODES: f32 = 4096.0;

/// Volts per code on the voltage channel (1.0 MΩ / 0.2 MΩ divider)
pub const VOLTAGE_SCALE: ChannelScale = ChannelScale::new(ADC_VREF / ADC_CODES * (10.0 + 2.0) / 2.0);

/// Amps per code on the current channel (1:1 divider, 5 V = 300 A transducer)
pub const CURRENT_SCALE: ChannelScale =
    ChannelScale::new(ADC_VREF / ADC_CODES * (1.0 + 1.0) / 1.0 * 300.0 / 5.0);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("ADC conversion not ready on channel {channel}")]
    NotReady { channel: &'static str },
    #[error("ADC read failed on channel {channel}")]
    ReadFailed { channel: &'static str },
}

/// Linear mapping from an ADC code to a physical value.
///
/// The half-code offset centres each code in its quantisation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelScale {
    factor: f32,
}

impl ChannelScale {
    pub const fn new(factor: f32) -> Self {
        Self { factor }
    }

    pub const fn factor(&self) -> f32 {
        self.factor
    }

    pub fn convert(&self, raw: u16) -> f32 {
        (raw as f32 + 0.5) * self.factor
    }
}

/// Raw ADC codes for both channels, as read in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawReading {
    pub voltage_code: u16,
    pub current_code: u16,
}

impl RawReading {
    pub const fn new(voltage_code: u16, current_code: u16) -> Self {
        Self {
            voltage_code,
            current_code,
        }
    }

    /// Convert to physical units with the board's channel constants.
    pub fn convert(self) -> Reading {
        Reading {
            voltage: VOLTAGE_SCALE.convert(self.voltage_code),
            current: CURRENT_SCALE.convert(self.current_code),
        }
    }
}

/// One sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Volts
    pub voltage: f32,
    /// Amps
    pub current: f32,
}

impl Reading {
    pub const fn new(voltage: f32, current: f32) -> Self {
        Self { voltage, current }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[Reading] {:.3} V, {:.3} A", self.voltage, self.current)
    }
}
