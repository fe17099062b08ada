//! Build-time settings injected by `build.rs` from `.env`

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

pub const BACKEND_HOST: &str = env!("BACKEND_HOST");
pub const BACKEND_PORT: u16 = parse_port(env!("BACKEND_PORT"));
pub const BACKEND_PATH: &str = env!("BACKEND_PATH");

pub const NTP_SERVER: &str = env!("NTP_SERVER");

/// Compile-time decimal port parser; a bad value fails the build.
const fn parse_port(text: &str) -> u16 {
    let digits = text.as_bytes();
    assert!(!digits.is_empty(), "BACKEND_PORT is empty");

    let mut port: u32 = 0;
    let mut i = 0;
    while i < digits.len() {
        assert!(digits[i].is_ascii_digit(), "BACKEND_PORT must be decimal");
        port = port * 10 + (digits[i] - b'0') as u32;
        assert!(port <= u16::MAX as u32, "BACKEND_PORT out of range");
        i += 1;
    }
    port as u16
}
