use serde::{Deserialize, Serialize};

use crate::indicator::DEFAULT_FLASH_MS;
use crate::net::{DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::storage::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WINDOW_MS};
use crate::time_sync::DEFAULT_PLAUSIBLE_AFTER_SECS;

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub logger: LoggerConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// Tunables of the logging loop
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct LoggerConfig<'a> {
    pub endpoint: EndpointConfig<'a>,
    pub batching: BatchingConfig,
    pub transmission: TransmissionConfig,
    pub time_sync: TimeSyncConfig,
    pub indicator: IndicatorConfig,
}

/// Where batch records are posted
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl Default for EndpointConfig<'_> {
    fn default() -> Self {
        Self {
            host: "localhost",
            port: 80,
            path: "/api/mutation",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Averaging window length
    pub window_ms: u64,
    /// Queued records kept before the oldest is dropped
    pub queue_capacity: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionConfig {
    /// Re-sends after the first attempt before a record is dropped
    pub max_retries: u8,
    /// Time allowed for the full response of one attempt
    pub request_timeout_ms: u64,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncConfig {
    /// Time signals at or below this Unix time are rejected
    pub plausible_after_secs: u64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            plausible_after_secs: DEFAULT_PLAUSIBLE_AFTER_SECS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorConfig {
    /// Length of the fast flash shown when the device comes online
    pub flash_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            flash_ms: DEFAULT_FLASH_MS,
        }
    }
}
