use thiserror_no_std::Error;

use crate::config::EndpointConfig;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to endpoint failed")]
    ConnectFailed,
    #[error("Transport is busy with another exchange")]
    Busy,
    #[error("Writing the request failed")]
    WriteFailed,
    #[error("Connection reset by peer")]
    Reset,
}

/// One open request/response exchange with the endpoint
///
/// None of these calls may block. The handle is released when dropped.
pub trait Connection {
    /// Queue the complete request for sending
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Copy response bytes that have already arrived into `buf`.
    ///
    /// Returns `Ok(0)` when nothing more is available right now.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// The peer finished sending and every received byte has been read
    fn is_closed(&self) -> bool;
}

/// Factory for connections to the configured endpoint
pub trait Transport {
    type Connection: Connection;

    /// Start a new exchange. Must not block; connection establishment may
    /// complete in the background, with failures reported as a closed
    /// connection that never produced data.
    fn open(&mut self, endpoint: &EndpointConfig<'_>) -> Result<Self::Connection, TransportError>;
}
