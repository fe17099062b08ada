//! Non-blocking delivery of one batch record at a time
//!
//! The pipeline is driven by the tick loop: [`TransmissionPipeline::start`]
//! opens the first attempt and [`TransmissionPipeline::service`] polls it
//! once per tick. An attempt ends when the connection closes, the response
//! buffer fills, or the request timeout elapses. A failed attempt is retried
//! up to `max_retries` times on a fresh connection; after that the record is
//! dropped.

use log::{debug, info, warn};
use thiserror_no_std::Error;

use super::protocol::{ProtocolError, Request, build_request, is_success};
use super::response::ResponseBuffer;
use super::transport::{Connection, Transport, TransportError};
use super::{RESPONSE_CAPACITY, TransmissionError};
use crate::config::{EndpointConfig, TransmissionConfig};
use crate::storage::BatchRecord;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("A transmission is already in flight")]
    Busy,
    #[error("Failed to build request: {0}")]
    Request(#[from] ProtocolError),
}

/// Result of servicing the pipeline for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceStatus {
    /// Nothing in flight
    Idle,
    /// The current attempt is still waiting for its response
    Pending,
    /// An attempt failed and a new one was started
    Retrying { attempt: u8, error: TransmissionError },
    /// The backend acknowledged the record
    Delivered(BatchRecord),
    /// The retry budget ran out; the record is gone
    GaveUp {
        record: BatchRecord,
        error: TransmissionError,
    },
}

impl ServiceStatus {
    /// The pipeline is idle again after this status
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered(_) | Self::GaveUp { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub delivered: u32,
    pub dropped: u32,
    pub abandoned: u32,
    /// Connections opened, retries included
    pub attempts: u32,
}

struct InFlight<C, const N: usize> {
    record: BatchRecord,
    request: Request,
    /// Retries used so far; the first send is attempt 0
    retries: u8,
    sent_at: u64,
    response: ResponseBuffer<N>,
    connection: Option<C>,
    send_error: Option<TransportError>,
}

pub struct TransmissionPipeline<'a, T: Transport, const N: usize = RESPONSE_CAPACITY> {
    transport: T,
    endpoint: EndpointConfig<'a>,
    config: TransmissionConfig,
    in_flight: Option<InFlight<T::Connection, N>>,
    stats: PipelineStats,
}

impl<'a, T: Transport, const N: usize> TransmissionPipeline<'a, T, N> {
    pub fn new(transport: T, endpoint: EndpointConfig<'a>, config: TransmissionConfig) -> Self {
        Self {
            transport,
            endpoint,
            config,
            in_flight: None,
            stats: PipelineStats::default(),
        }
    }

    /// Begin delivering `record`; the first attempt is opened immediately.
    pub fn start(&mut self, record: BatchRecord, now: u64) -> Result<(), StartError> {
        if self.in_flight.is_some() {
            return Err(StartError::Busy);
        }

        let request = build_request(&self.endpoint, &record)?;
        let mut attempt = InFlight {
            record,
            request,
            retries: 0,
            sent_at: now,
            response: ResponseBuffer::new(),
            connection: None,
            send_error: None,
        };

        info!(" Sending record {}", record);
        self.send(&mut attempt, now);
        self.in_flight = Some(attempt);
        Ok(())
    }

    /// Poll the in-flight attempt without blocking
    pub fn service(&mut self, now: u64) -> ServiceStatus {
        let Some(mut attempt) = self.in_flight.take() else {
            return ServiceStatus::Idle;
        };

        let closed = match attempt.connection.as_mut() {
            Some(connection) => match attempt.response.fill_from(connection) {
                Ok(_) => connection.is_closed(),
                Err(e) => {
                    debug!(" Read failed: {}", e);
                    true
                }
            },
            None => true,
        };

        let elapsed_ms = now.saturating_sub(attempt.sent_at);
        let timed_out = elapsed_ms > self.config.request_timeout_ms;
        let full = attempt.response.is_full();

        if !(closed || timed_out || full) {
            self.in_flight = Some(attempt);
            return ServiceStatus::Pending;
        }

        let delivered = is_success(attempt.response.terminate());
        drop(attempt.connection.take());

        if delivered {
            self.stats.delivered += 1;
            info!(" Delivered record {}", attempt.record);
            return ServiceStatus::Delivered(attempt.record);
        }

        let error = if let Some(e) = attempt.send_error {
            TransmissionError::TransportConnectFailure(e)
        } else if full {
            TransmissionError::ResponseBufferOverflow {
                capacity: ResponseBuffer::<N>::CAPACITY,
            }
        } else if timed_out {
            TransmissionError::RequestTimeout { elapsed_ms }
        } else {
            TransmissionError::MissingSuccessMarker
        };

        if attempt.retries < self.config.max_retries {
            attempt.retries += 1;
            warn!(
                " Attempt failed: {}; retrying ({}/{})",
                error, attempt.retries, self.config.max_retries
            );
            self.send(&mut attempt, now);
            let retry = attempt.retries;
            self.in_flight = Some(attempt);
            return ServiceStatus::Retrying {
                attempt: retry,
                error,
            };
        }

        self.stats.dropped += 1;
        warn!(
            " Giving up on record {} after {} attempts: {}",
            attempt.record,
            attempt.retries as u32 + 1,
            error
        );
        ServiceStatus::GaveUp {
            record: attempt.record,
            error,
        }
    }

    /// Drop the in-flight attempt, releasing its connection
    pub fn abandon(&mut self) -> Option<BatchRecord> {
        let attempt = self.in_flight.take()?;
        self.stats.abandoned += 1;
        Some(attempt.record)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    fn send(&mut self, attempt: &mut InFlight<T::Connection, N>, now: u64) {
        // At most one connection is ever open.
        drop(attempt.connection.take());
        attempt.response.clear();
        attempt.sent_at = now;
        attempt.send_error = None;
        self.stats.attempts += 1;

        match self.transport.open(&self.endpoint) {
            Ok(mut connection) => match connection.write(attempt.request.as_bytes()) {
                Ok(()) => attempt.connection = Some(connection),
                Err(e) => {
                    warn!(" Failed to write request: {}", e);
                    attempt.send_error = Some(e);
                }
            },
            Err(e) => {
                warn!(
                    " Failed to open connection to {}:{}: {}",
                    self.endpoint.host, self.endpoint.port, e
                );
                attempt.send_error = Some(e);
            }
        }
    }
}
