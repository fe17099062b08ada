//! Non-blocking HTTP transport for the transmission pipeline
//!
//! The pipeline runs inside the synchronous tick and may not await, so the
//! socket work happens in [`http_bridge_task`]. A [`BridgeConnection`] hands
//! its request to the task through a channel and reads the response back
//! from a byte pipe. Each connection owns a session number; dropping the
//! connection ends the session and the task abandons the exchange.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::select::{Either, select};
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_time::{Duration, Timer};
use heapless::{String, Vec};
use log::{debug, warn};
use thiserror_no_std::Error;
use wattlog_core::config::EndpointConfig;
use wattlog_core::net::{Connection, REQUEST_CAPACITY, RESPONSE_CAPACITY, Transport, TransportError};

use crate::dns::{self, ResolveError};

pub const HOST_CAPACITY: usize = 64;

const OUTBOX_DEPTH: usize = 2;
const SOCKET_BUFFER_LEN: usize = 1024;
const READ_CHUNK_LEN: usize = 128;
const SOCKET_TIMEOUT_SECS: u64 = 15;
const CANCEL_POLL_MS: u64 = 20;
const FORWARD_RETRY_MS: u64 = 5;

const NO_SESSION: u32 = 0;

struct Exchange {
    session: u32,
    host: String<HOST_CAPACITY>,
    port: u16,
    request: Vec<u8, REQUEST_CAPACITY>,
}

static OUTBOX: Channel<CriticalSectionRawMutex, Exchange, OUTBOX_DEPTH> = Channel::new();
static INBOX: Pipe<CriticalSectionRawMutex, RESPONSE_CAPACITY> = Pipe::new();

static NEXT_SESSION: AtomicU32 = AtomicU32::new(1);
static ACTIVE_SESSION: AtomicU32 = AtomicU32::new(NO_SESSION);
static FINISHED_SESSION: AtomicU32 = AtomicU32::new(NO_SESSION);

fn is_active(session: u32) -> bool {
    ACTIVE_SESSION.load(Ordering::Acquire) == session
}

fn next_session() -> u32 {
    loop {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        if session != NO_SESSION {
            return session;
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Resolving host failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("TCP connect failed")]
    Connect,
    #[error("Writing request failed")]
    Write,
    #[error("Reading response failed")]
    Read,
    #[error("Session ended by the pipeline")]
    Cancelled,
}

/// [`Transport`] backed by [`http_bridge_task`]
#[derive(Debug, Default)]
pub struct BridgeTransport;

impl Transport for BridgeTransport {
    type Connection = BridgeConnection;

    fn open(&mut self, endpoint: &EndpointConfig<'_>) -> Result<BridgeConnection, TransportError> {
        let mut host = String::new();
        host.push_str(endpoint.host)
            .map_err(|_| TransportError::ConnectFailed)?;

        let session = next_session();
        INBOX.clear();
        ACTIVE_SESSION.store(session, Ordering::Release);

        Ok(BridgeConnection {
            session,
            host,
            port: endpoint.port,
        })
    }
}

pub struct BridgeConnection {
    session: u32,
    host: String<HOST_CAPACITY>,
    port: u16,
}

impl Connection for BridgeConnection {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let request = Vec::from_slice(bytes).map_err(|_| TransportError::WriteFailed)?;
        OUTBOX
            .try_send(Exchange {
                session: self.session,
                host: self.host.clone(),
                port: self.port,
                request,
            })
            .map_err(|_| TransportError::Busy)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !is_active(self.session) {
            return Err(TransportError::Reset);
        }
        Ok(INBOX.try_read(buf).unwrap_or(0))
    }

    fn is_closed(&self) -> bool {
        FINISHED_SESSION.load(Ordering::Acquire) == self.session && INBOX.is_empty()
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        let _ = ACTIVE_SESSION.compare_exchange(
            self.session,
            NO_SESSION,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

#[embassy_executor::task]
pub async fn http_bridge_task(stack: Stack<'static>) {
    let mut rx_buffer = [0u8; SOCKET_BUFFER_LEN];
    let mut tx_buffer = [0u8; SOCKET_BUFFER_LEN];

    loop {
        let exchange = OUTBOX.receive().await;
        if !is_active(exchange.session) {
            debug!(" Session {} ended before it started", exchange.session);
            continue;
        }

        match run_exchange(stack, &exchange, &mut rx_buffer, &mut tx_buffer).await {
            Ok(received) => debug!(" Session {} done, {} bytes", exchange.session, received),
            Err(e) => warn!(" Session {} failed: {}", exchange.session, e),
        }
        FINISHED_SESSION.store(exchange.session, Ordering::Release);
    }
}

async fn run_exchange(
    stack: Stack<'_>,
    exchange: &Exchange,
    rx_buffer: &mut [u8],
    tx_buffer: &mut [u8],
) -> Result<usize, BridgeError> {
    let address = dns::resolve(stack, &exchange.host).await?;

    let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

    let result = match select(
        converse(&mut socket, exchange, address),
        cancelled(exchange.session),
    )
    .await
    {
        Either::First(result) => result,
        Either::Second(()) => Err(BridgeError::Cancelled),
    };

    socket.abort();
    result
}

async fn converse(socket: &mut TcpSocket<'_>, exchange: &Exchange, address: IpAddress) -> Result<usize, BridgeError> {
    socket
        .connect((address, exchange.port))
        .await
        .map_err(|_| BridgeError::Connect)?;

    let mut pending = exchange.request.as_slice();
    while !pending.is_empty() {
        let written = socket.write(pending).await.map_err(|_| BridgeError::Write)?;
        if written == 0 {
            return Err(BridgeError::Write);
        }
        pending = &pending[written..];
    }

    let mut chunk = [0u8; READ_CHUNK_LEN];
    let mut received = 0;
    loop {
        let read = socket.read(&mut chunk).await.map_err(|_| BridgeError::Read)?;
        if read == 0 {
            return Ok(received);
        }
        forward(exchange.session, &chunk[..read]).await?;
        received += read;
    }
}

/// Move response bytes into the pipe as the tick drains it
async fn forward(session: u32, mut data: &[u8]) -> Result<(), BridgeError> {
    while !data.is_empty() {
        if !is_active(session) {
            return Err(BridgeError::Cancelled);
        }
        match INBOX.try_write(data) {
            Ok(written) => data = &data[written..],
            Err(_) => Timer::after_millis(FORWARD_RETRY_MS).await,
        }
    }
    Ok(())
}

async fn cancelled(session: u32) {
    while is_active(session) {
        Timer::after_millis(CANCEL_POLL_MS).await;
    }
}
