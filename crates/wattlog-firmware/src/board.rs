//! ESP32-S3 implementation of the core [`Board`] seam

use embassy_time::Instant;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcChannel, AdcPin};
use esp_hal::gpio::{Level, Output};
use esp_hal::peripherals::{ADC1, GPIO4, GPIO5};
use wattlog_core::board::Board;
use wattlog_core::clock::RawTicks;
use wattlog_core::sensors::{RawReading, SensorError};

use crate::sntp::TIME_SIGNAL;
use crate::wifi::RECONNECT;

/// Polls of a one-shot conversion before the channel is reported not ready
const ADC_POLL_LIMIT: u32 = 1_000;

pub struct FirmwareBoard<'d> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    voltage_pin: AdcPin<GPIO4<'d>, ADC1<'d>>,
    current_pin: AdcPin<GPIO5<'d>, ADC1<'d>>,
    led: Output<'d>,
}

impl<'d> FirmwareBoard<'d> {
    pub fn new(
        adc: Adc<'d, ADC1<'d>, Blocking>,
        voltage_pin: AdcPin<GPIO4<'d>, ADC1<'d>>,
        current_pin: AdcPin<GPIO5<'d>, ADC1<'d>>,
        led: Output<'d>,
    ) -> Self {
        Self {
            adc,
            voltage_pin,
            current_pin,
            led,
        }
    }
}

fn read_channel<'d, PIN: AdcChannel>(
    adc: &mut Adc<'d, ADC1<'d>, Blocking>,
    pin: &mut AdcPin<PIN, ADC1<'d>>,
    channel: &'static str,
) -> Result<u16, SensorError> {
    for _ in 0..ADC_POLL_LIMIT {
        if let Ok(code) = adc.read_oneshot(pin) {
            return Ok(code);
        }
    }
    Err(SensorError::NotReady { channel })
}

impl Board for FirmwareBoard<'_> {
    fn raw_ticks(&self) -> RawTicks {
        // Truncation gives the wrapping 32-bit millisecond counter.
        Instant::now().as_millis() as RawTicks
    }

    fn read_sample(&mut self) -> Result<RawReading, SensorError> {
        let voltage_code = read_channel(&mut self.adc, &mut self.voltage_pin, "voltage")?;
        let current_code = read_channel(&mut self.adc, &mut self.current_pin, "current")?;
        Ok(RawReading::new(voltage_code, current_code))
    }

    fn poll_time(&mut self) -> Option<u64> {
        TIME_SIGNAL.try_take()
    }

    fn request_reconnect(&mut self) {
        RECONNECT.signal(());
    }

    fn set_indicator(&mut self, on: bool) {
        self.led.set_level(Level::from(on));
    }
}
