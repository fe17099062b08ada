//! Hardware seam used by the tick loop
//!
//! The firmware implements [`Board`] over the ESP32-S3 peripherals and the
//! simulator over in-memory models. Every method is called from the tick and
//! must return immediately.

use crate::clock::RawTicks;
use crate::sensors::{RawReading, SensorError};

pub trait Board {
    /// Free-running millisecond counter; wraps at `u32::MAX`
    fn raw_ticks(&self) -> RawTicks;

    /// Raw ADC codes of the voltage and current channels
    fn read_sample(&mut self) -> Result<RawReading, SensorError>;

    /// Latest time-source value in Unix seconds, if a new one arrived
    fn poll_time(&mut self) -> Option<u64>;

    /// Ask the link layer to re-associate after a link loss
    fn request_reconnect(&mut self);

    fn set_indicator(&mut self, on: bool);
}
