//! SNTP time source
//!
//! Queries the configured NTP server whenever the link comes up and then
//! once an hour. Every decoded answer is published on [`TIME_SIGNAL`]; the
//! connectivity machine decides whether it is plausible.

use embassy_futures::select::select;
use embassy_net::Stack;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, WithTimeout};
use log::{error, info, warn};
use thiserror_no_std::Error;
use wattlog_core::time_sync::{
    self, NTP_PORT, RESYNC_INTERVAL_SECS, RETRY_INTERVAL_SECS, SNTP_PACKET_LEN, TimeSyncError,
};

use crate::dns::{self, ResolveError};
use crate::wifi::LINK_RESTORED;

/// Latest Unix time reported by the server, taken by the board each tick
pub static TIME_SIGNAL: Signal<CriticalSectionRawMutex, u64> = Signal::new();

const LOCAL_PORT: u16 = 12_300;
const REPLY_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
enum SntpError {
    #[error("Resolving server failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Sending request failed")]
    Send,
    #[error("No reply before the timeout")]
    Timeout,
    #[error("Receiving reply failed")]
    Receive,
    #[error("Bad reply: {0}")]
    Decode(#[from] TimeSyncError),
}

#[embassy_executor::task]
pub async fn sntp_task(stack: Stack<'static>, server: &'static str, plausible_after_secs: u64) {
    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];

    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buffer, &mut tx_meta, &mut tx_buffer);
    if let Err(e) = socket.bind(LOCAL_PORT) {
        error!(" Failed to bind SNTP socket: {:?}", e);
        return;
    }

    loop {
        stack.wait_config_up().await;

        let delay_secs = match query(stack, &socket, server).await {
            Ok(epoch_secs) => {
                TIME_SIGNAL.signal(epoch_secs);
                if time_sync::is_plausible(epoch_secs, plausible_after_secs) {
                    info!(" Time from {}: {}", server, epoch_secs);
                    RESYNC_INTERVAL_SECS
                } else {
                    warn!(" {} reported implausible time {}", server, epoch_secs);
                    RETRY_INTERVAL_SECS
                }
            }
            Err(e) => {
                warn!(" Time query to {} failed: {}", server, e);
                RETRY_INTERVAL_SECS
            }
        };

        LINK_RESTORED.reset();
        select(Timer::after_secs(delay_secs), LINK_RESTORED.wait()).await;
    }
}

async fn query(stack: Stack<'_>, socket: &UdpSocket<'_>, server: &str) -> Result<u64, SntpError> {
    let address = dns::resolve(stack, server).await?;

    socket
        .send_to(&time_sync::sntp_request(), (address, NTP_PORT))
        .await
        .map_err(|_| SntpError::Send)?;

    let mut reply = [0u8; SNTP_PACKET_LEN + 16];
    let (len, _) = socket
        .recv_from(&mut reply)
        .with_timeout(Duration::from_secs(REPLY_TIMEOUT_SECS))
        .await
        .map_err(|_| SntpError::Timeout)?
        .map_err(|_| SntpError::Receive)?;

    Ok(time_sync::parse_sntp_response(&reply[..len])?)
}
