//! ESP32-S3 firmware-specific modules for wattlog
//!
//! This crate contains the hardware and network glue that cannot compile on
//! desktop targets: ADC and LED access, the Wi-Fi station loop, the SNTP
//! client and the task that carries HTTP exchanges for the core pipeline.

#![no_std]

extern crate alloc;

pub mod board;
pub mod dns;
pub mod http_bridge;
pub mod sntp;
pub mod wifi;
pub mod wifi_secrets;
