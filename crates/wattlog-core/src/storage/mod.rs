//! In-memory batching of sensor samples
//!
//! Samples are averaged over fixed windows by the [`accumulator::BatchReducer`]
//! and queued as [`BatchRecord`]s until the transmission pipeline takes them.
//! Nothing here survives a power cycle.

pub mod accumulator;
pub mod batch;
pub mod queue;

pub use accumulator::{BatchReducer, SampleAccumulator};
pub use batch::BatchRecord;
pub use queue::BatchQueue;

/// Default averaging window (10 seconds)
pub const DEFAULT_WINDOW_MS: u64 = 10_000;

/// Default queue bound: one day of 10-second batches
pub const DEFAULT_QUEUE_CAPACITY: usize = 8_640;
