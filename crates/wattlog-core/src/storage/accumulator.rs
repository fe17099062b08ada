use log::{debug, warn};

use super::BatchRecord;
use crate::clock::Calibration;
use crate::sensors::Reading;

/// Running sums for the current window
///
/// Sums are kept in `f64`: a window of identical `f32` samples sums exactly,
/// so its average equals the sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleAccumulator {
    sum_voltage: f64,
    sum_current: f64,
    count: u32,
}

impl SampleAccumulator {
    pub const fn new() -> Self {
        Self {
            sum_voltage: 0.0,
            sum_current: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, reading: Reading) {
        self.sum_voltage += reading.voltage as f64;
        self.sum_current += reading.current as f64;
        self.count = self.count.saturating_add(1);
    }

    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Mean of both channels, `(0, 0)` for an empty window
    pub fn average(&self) -> (f32, f32) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let count = self.count as f64;
        (
            (self.sum_voltage / count) as f32,
            (self.sum_current / count) as f32,
        )
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Fixed-window reducer turning per-tick samples into batch records
///
/// ## Windows
///
/// Each window ends at `next_boundary`. The first tick whose clock value is
/// strictly past the boundary closes the window: the averages are emitted with
/// the window midpoint as timestamp and the boundary advances by one window.
/// If the loop stalled for longer than a window, the boundary is resynchronised
/// to one window from now rather than emitting a run of catch-up batches.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut reducer = BatchReducer::new(clock.now(raw), 10_000);
///
/// // Every tick
/// if let Some(record) = reducer.step(clock.now(raw), Some(reading)) {
///     queue.push(record);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BatchReducer {
    accumulator: SampleAccumulator,
    window_ms: u64,
    next_boundary: u64,
}

impl BatchReducer {
    /// Create a reducer whose first window starts at `now`
    pub fn new(now: u64, window_ms: u64) -> Self {
        let window_ms = window_ms.max(1);
        Self {
            accumulator: SampleAccumulator::new(),
            window_ms,
            next_boundary: now.saturating_add(window_ms),
        }
    }

    /// Run one tick: close the window if its boundary passed, then ingest `sample`.
    ///
    /// The sample of the tick that closes a window belongs to the next window.
    /// `None` means the sensors could not be read this tick.
    pub fn step(&mut self, now: u64, sample: Option<Reading>) -> Option<BatchRecord> {
        let record = if now > self.next_boundary {
            Some(self.close_window(now))
        } else {
            None
        };

        if let Some(sample) = sample {
            self.accumulator.add(sample);
        }

        record
    }

    fn close_window(&mut self, now: u64) -> BatchRecord {
        let (voltage, current) = self.accumulator.average();
        if self.accumulator.count() == 0 {
            warn!(" Window ending at {} had no samples, emitting zero batch", self.next_boundary);
        }

        let midpoint = self.next_boundary.saturating_sub(self.window_ms / 2);
        let record = BatchRecord::new(voltage, current, midpoint);
        debug!(" Window closed over {} samples: {}", self.accumulator.count(), record);

        self.accumulator.reset();
        self.next_boundary = self.next_boundary.saturating_add(self.window_ms);
        if self.next_boundary <= now {
            warn!(
                " Sampling fell behind by {} ms, resynchronising window",
                now - self.next_boundary
            );
            self.next_boundary = now.saturating_add(self.window_ms);
        }

        record
    }

    /// Move the pending boundary into the epoch frame after the first calibration
    pub fn rebase(&mut self, calibration: &Calibration) {
        self.next_boundary = calibration.rebase(self.next_boundary);
    }

    pub const fn next_boundary(&self) -> u64 {
        self.next_boundary
    }

    pub const fn pending_samples(&self) -> u32 {
        self.accumulator.count()
    }
}
