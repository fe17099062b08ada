//! Wrap-safe epoch clock
//!
//! Converts the free-running 32-bit millisecond tick counter of the device
//! into milliseconds since the Unix epoch. Until the first calibration the
//! clock runs in device-relative time (epoch zero at boot). The first plausible
//! time signal anchors it to real time; later signals re-anchor it for drift
//! without ever letting [`EpochClock::now`] go backwards.

/// Raw value of the hardware tick counter (one tick per millisecond).
pub type RawTicks = u32;

/// Ticks elapsed from `since` to `now`, modulo the counter width.
///
/// Correct as long as less than one full counter period (~49.7 days) separates
/// the two readings, including when the counter wrapped in between.
#[inline]
pub const fn wrapping_elapsed(now: RawTicks, since: RawTicks) -> RawTicks {
    now.wrapping_sub(since)
}

/// Anchor pairing an epoch instant with the tick counter value observed at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReference {
    /// Milliseconds since the Unix epoch at `tick`
    pub epoch_millis: u64,
    /// Raw tick counter value at the anchor instant
    pub tick: RawTicks,
}

impl ClockReference {
    /// Reference used before any time signal: epoch zero at `boot_tick`.
    pub const fn uncalibrated(boot_tick: RawTicks) -> Self {
        Self {
            epoch_millis: 0,
            tick: boot_tick,
        }
    }

}

/// Result of feeding a time signal to [`EpochClock::calibrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    /// First anchor to real time. Timestamps taken before it are device-relative
    /// and must be moved into the epoch frame with [`Calibration::rebase`].
    Initial {
        /// Device-relative clock value at the calibration instant
        device_millis: u64,
        /// Epoch value at the calibration instant
        epoch_millis: u64,
    },
    /// Re-anchor of an already calibrated clock. Applies going forward only.
    Drift {
        /// Clock value just before the re-anchor
        previous_millis: u64,
        /// Epoch value reported by the time source
        epoch_millis: u64,
    },
}

impl Calibration {
    pub const fn is_initial(&self) -> bool {
        matches!(self, Self::Initial { .. })
    }

    /// Move a timestamp taken with the pre-calibration clock into the epoch frame.
    ///
    /// The distance between the timestamp and the calibration instant is kept,
    /// so both past records and future deadlines map correctly. Drift
    /// calibrations leave timestamps untouched.
    pub const fn rebase(&self, timestamp_millis: u64) -> u64 {
        match *self {
            Self::Initial {
                device_millis,
                epoch_millis,
            } => {
                if timestamp_millis >= device_millis {
                    epoch_millis.saturating_add(timestamp_millis - device_millis)
                } else {
                    epoch_millis.saturating_sub(device_millis - timestamp_millis)
                }
            }
            Self::Drift { .. } => timestamp_millis,
        }
    }

    /// Signed jump applied by this calibration, in milliseconds.
    pub const fn correction_millis(&self) -> i64 {
        match *self {
            Self::Initial {
                device_millis,
                epoch_millis,
            } => epoch_millis as i64 - device_millis as i64,
            Self::Drift {
                previous_millis,
                epoch_millis,
            } => epoch_millis as i64 - previous_millis as i64,
        }
    }
}

/// Monotonic millisecond clock built on the wrapping tick counter.
///
/// Elapsed time is accumulated tick-to-tick in 64 bits, so any number of
/// counter wraps is handled provided [`EpochClock::now`] is called at least
/// once per counter period. The tick loop calls it thousands of times per
/// second.
#[derive(Debug, Clone)]
pub struct EpochClock {
    reference: ClockReference,
    last_tick: RawTicks,
    /// Milliseconds since `reference.tick`, extended past counter wraps
    elapsed_millis: u64,
    /// Largest value ever returned by `now`
    high_water: u64,
    calibrated: bool,
}

impl EpochClock {
    pub const fn new(boot_tick: RawTicks) -> Self {
        Self {
            reference: ClockReference::uncalibrated(boot_tick),
            last_tick: boot_tick,
            elapsed_millis: 0,
            high_water: 0,
            calibrated: false,
        }
    }

    /// Current time in milliseconds since the epoch (device-relative before calibration).
    pub fn now(&mut self, raw: RawTicks) -> u64 {
        self.elapsed_millis += wrapping_elapsed(raw, self.last_tick) as u64;
        self.last_tick = raw;

        let millis = self.reference.epoch_millis.saturating_add(self.elapsed_millis);
        if millis > self.high_water {
            self.high_water = millis;
        }
        self.high_water
    }

    /// Anchor the clock to `epoch_secs` at tick `raw`.
    ///
    /// The first call switches the clock into the epoch frame and returns
    /// [`Calibration::Initial`]. Later calls re-anchor for drift; a backward
    /// correction holds the current value until real time catches up.
    pub fn calibrate(&mut self, epoch_secs: u64, raw: RawTicks) -> Calibration {
        let before = self.now(raw);
        let epoch_millis = epoch_secs.saturating_mul(1000);

        self.reference = ClockReference {
            epoch_millis,
            tick: raw,
        };
        self.last_tick = raw;
        self.elapsed_millis = 0;

        if self.calibrated {
            if epoch_millis > self.high_water {
                self.high_water = epoch_millis;
            }
            Calibration::Drift {
                previous_millis: before,
                epoch_millis,
            }
        } else {
            self.calibrated = true;
            // Frame switch: device-relative values are not comparable with epoch values.
            self.high_water = epoch_millis;
            Calibration::Initial {
                device_millis: before,
                epoch_millis,
            }
        }
    }

    pub const fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}
