//! Hardware-independent core library for wattlog
//!
//! This crate contains all platform-agnostic logic for the wattlog data
//! logger: the wrap-safe epoch clock, the connectivity state machine, the
//! windowed sample reducer and batch queue, and the non-blocking transmission
//! pipeline, plus the tick scheduler that runs them in a fixed order.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod board;
pub mod clock;
pub mod config;
pub mod indicator;
pub mod logger;
pub mod net;
pub mod sensors;
pub mod storage;
pub mod time_sync;

pub use logger::DataLogger;
