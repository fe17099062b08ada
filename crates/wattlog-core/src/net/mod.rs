//! Delivery of batch records to the backend
//!
//! This module provides the non-blocking request/response machinery used by
//! the tick loop:
//!
//! - [`Transport`] / [`Connection`]: the seam to the platform's socket layer
//! - [`ResponseBuffer`]: bounded capture of the raw reply
//! - [`build_request`] / [`is_success`]: the wire format and success test
//! - [`TransmissionPipeline`]: one record in flight, bounded retries, timeouts
//!
//! # Memory Characteristics
//!
//! Everything is sized at compile time: the request is a
//! `heapless::String<REQUEST_CAPACITY>` and the response buffer a
//! `ResponseBuffer<N>` (`RESPONSE_CAPACITY` by default), so one attempt costs
//! roughly 1 KB regardless of what the peer sends.

use thiserror_no_std::Error;

mod pipeline;
mod protocol;
mod response;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{PipelineStats, ServiceStatus, StartError, TransmissionPipeline};
pub use protocol::{
    BODY_CAPACITY, ProtocolError, REQUEST_CAPACITY, Request, SUCCESS_MARKER, build_body,
    build_request, is_success,
};
pub use response::ResponseBuffer;
pub use transport::{Connection, Transport, TransportError};

/// Re-sends after the first attempt before a record is dropped
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Time allowed for one attempt to produce a complete response
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default response buffer size, including the reserved terminator slot
pub const RESPONSE_CAPACITY: usize = 512;

/// Failures that consume one unit of the retry budget
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionError {
    /// The connection could not be opened or the request not written
    #[error("Transport connect failure: {0}")]
    TransportConnectFailure(TransportError),

    /// No terminal response within the request timeout
    #[error("Request timed out after {elapsed_ms} ms")]
    RequestTimeout {
        /// Time since the request was sent
        elapsed_ms: u64,
    },

    /// The response filled the buffer
    #[error("Response buffer overflow (max: {capacity} bytes)")]
    ResponseBufferOverflow {
        /// Usable buffer capacity
        capacity: usize,
    },

    /// The response completed without the success marker
    #[error("Response is missing the success marker")]
    MissingSuccessMarker,
}
