//! Wi-Fi station loop
//!
//! Associates with the configured access point, waits for DHCP and reports
//! link changes to the tick loop through [`LINK_EVENTS`]. After a loss it
//! waits for the logger's reconnect request (or a back-off timeout) before
//! associating again.

use alloc::string::String;
use embassy_futures::select::select;
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{info, warn};
use wattlog_core::app_state::{LinkEvent, LinkEvents};
use wattlog_core::config::InternetConfig;

/// Link notifications consumed at the start of each tick
pub static LINK_EVENTS: LinkEvents = LinkEvents::new();

/// Raised by the logger after it processed a link loss
pub static RECONNECT: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Raised every time the link comes back, so the time client re-queries at once
pub static LINK_RESTORED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

const DHCP_TIMEOUT_SECS: u64 = 15;
const RECONNECT_BACKOFF_SECS: u64 = 10;
const LINK_POLL_INTERVAL_MS: u64 = 250;

fn report(event: LinkEvent) {
    if !LINK_EVENTS.notify(event) {
        warn!(" Link event queue full, dropped {:?}", event);
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: embassy_net::Runner<'static, esp_radio::wifi::WifiDevice<'static>>) {
    runner.run().await;
}

#[embassy_executor::task]
pub async fn wifi_task(
    mut controller: WifiController<'static>,
    stack: Stack<'static>,
    internet: InternetConfig<'static>,
) {
    info!(" Wi-Fi task starting (ssid=\"{}\")", internet.ssid);

    let client_config = ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(String::from(internet.ssid))
            .with_password(String::from(internet.password)),
    );

    loop {
        RECONNECT.reset();

        if !controller.is_started().unwrap_or(false) {
            if let Err(e) = controller.set_config(&client_config) {
                warn!(" Wi-Fi set_config failed: {:?}", e);
                back_off().await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                warn!(" Wi-Fi start failed: {:?}", e);
                back_off().await;
                continue;
            }
        }

        if let Err(e) = controller.connect_async().await {
            warn!(" Wi-Fi connect failed: {:?}", e);
            let _ = controller.disconnect_async().await;
            back_off().await;
            continue;
        }

        if stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
            .await
            .is_err()
        {
            warn!(" DHCP timed out, reassociating");
            let _ = controller.disconnect_async().await;
            back_off().await;
            continue;
        }

        if let Some(config) = stack.config_v4() {
            info!(" Wi-Fi link up: ip={}", config.address.address());
        }
        report(LinkEvent::Established);
        LINK_RESTORED.signal(());

        while stack.is_link_up()
            && stack.config_v4().is_some()
            && matches!(controller.is_connected(), Ok(true))
        {
            Timer::after_millis(LINK_POLL_INTERVAL_MS).await;
        }

        warn!(" Wi-Fi link lost");
        report(LinkEvent::Lost);
        let _ = controller.disconnect_async().await;

        // Wait for the logger to acknowledge the loss, bounded by the back-off.
        select(RECONNECT.wait(), back_off()).await;
    }
}

async fn back_off() {
    Timer::after_secs(RECONNECT_BACKOFF_SECS).await;
}
