//! Time source support: plausibility check and a minimal SNTP codec
//!
//! The firmware asks an NTP server for the time over UDP and hands plausible
//! answers to the connectivity machine. Only the transmit timestamp of the
//! server reply is used; round-trip compensation is below the one-second
//! resolution of the uploaded records.

use thiserror_no_std::Error;

/// Values at or below 2024-01-01T00:00:00Z are treated as an unsynced source
pub const DEFAULT_PLAUSIBLE_AFTER_SECS: u64 = 1_704_067_200;

/// Drift correction period once the clock is calibrated
pub const RESYNC_INTERVAL_SECS: u64 = 3_600;

/// Retry period while no valid answer has been received
pub const RETRY_INTERVAL_SECS: u64 = 10;

pub const NTP_PORT: u16 = 123;

/// SNTP messages are 48 bytes without extension fields
pub const SNTP_PACKET_LEN: usize = 48;

/// Seconds from 1900-01-01 (NTP era 0) to 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// LI = 0, VN = 4, Mode = 3 (client)
const CLIENT_HEADER: u8 = 0b00_100_011;

const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;
const LEAP_ALARM: u8 = 3;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncError {
    #[error("SNTP reply too short ({len} bytes)")]
    TooShort { len: usize },
    #[error("SNTP reply has unexpected mode {mode}")]
    UnexpectedMode { mode: u8 },
    #[error("SNTP server is not synchronised")]
    Unsynchronized,
    #[error("SNTP kiss-of-death from server")]
    KissOfDeath,
}

/// Whether `epoch_secs` can be trusted as real time
pub const fn is_plausible(epoch_secs: u64, threshold_secs: u64) -> bool {
    epoch_secs > threshold_secs
}

/// Build an SNTPv4 client request
pub const fn sntp_request() -> [u8; SNTP_PACKET_LEN] {
    let mut packet = [0u8; SNTP_PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Decode the Unix time in seconds from an SNTP server reply
pub fn parse_sntp_response(packet: &[u8]) -> Result<u64, TimeSyncError> {
    if packet.len() < SNTP_PACKET_LEN {
        return Err(TimeSyncError::TooShort { len: packet.len() });
    }

    let leap = packet[0] >> 6;
    let mode = packet[0] & 0b111;
    let stratum = packet[1];

    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(TimeSyncError::UnexpectedMode { mode });
    }
    if stratum == 0 {
        return Err(TimeSyncError::KissOfDeath);
    }
    if leap == LEAP_ALARM {
        return Err(TimeSyncError::Unsynchronized);
    }

    let ntp_secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;

    // Timestamps below the Unix offset belong to NTP era 1 (after 2036-02-07).
    let unix_secs = if ntp_secs >= NTP_UNIX_OFFSET {
        ntp_secs - NTP_UNIX_OFFSET
    } else {
        ntp_secs + (1u64 << 32) - NTP_UNIX_OFFSET
    };

    Ok(unix_secs)
}
