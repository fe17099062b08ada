//! HTTP framing of batch records
//!
//! A record is posted as a JSON mutation call:
//!
//! ```text
//! POST /api/mutation HTTP/1.1
//! Host: <host>
//! Content-Type: application/json
//! Content-Length: <n>
//! Connection: close
//!
//! {"path":"api:postLog","args":{"timestamp":<s>,"voltage":<v>,"current":<i>},"format":"json"}
//! ```
//!
//! The reply is not parsed. An attempt counts as delivered when the raw bytes
//! contain [`SUCCESS_MARKER`] anywhere, headers included.

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::config::EndpointConfig;
use crate::storage::BatchRecord;

pub const BODY_CAPACITY: usize = 256;
pub const REQUEST_CAPACITY: usize = 512;

pub const SUCCESS_MARKER: &[u8] = br#""status":"success""#;

const MUTATION_PATH: &str = "api:postLog";

pub type Request = String<REQUEST_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Request does not fit in {capacity} bytes")]
    RequestTooLarge { capacity: usize },
    #[error("Record holds a non-finite reading")]
    NonFiniteReading,
}

pub fn build_body(record: &BatchRecord) -> Result<String<BODY_CAPACITY>, ProtocolError> {
    if !record.voltage.is_finite() || !record.current.is_finite() {
        return Err(ProtocolError::NonFiniteReading);
    }

    let mut body = String::new();
    write!(
        body,
        r#"{{"path":"{}","args":{{"timestamp":{},"voltage":{},"current":{}}},"format":"json"}}"#,
        MUTATION_PATH,
        record.timestamp_secs(),
        record.voltage,
        record.current,
    )
    .map_err(|_| ProtocolError::RequestTooLarge {
        capacity: BODY_CAPACITY,
    })?;

    Ok(body)
}

pub fn build_request(endpoint: &EndpointConfig<'_>, record: &BatchRecord) -> Result<Request, ProtocolError> {
    let body = build_body(record)?;

    let mut request = Request::new();
    write!(
        request,
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        endpoint.path,
        endpoint.host,
        body.len(),
        body,
    )
    .map_err(|_| ProtocolError::RequestTooLarge {
        capacity: REQUEST_CAPACITY,
    })?;

    Ok(request)
}

/// Naive success test: substring search over the whole raw response
pub fn is_success(response: &[u8]) -> bool {
    response
        .windows(SUCCESS_MARKER.len())
        .any(|window| window == SUCCESS_MARKER)
}
