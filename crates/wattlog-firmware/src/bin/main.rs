#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, StackResources};
use embassy_time::Timer;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;
use wattlog_core::DataLogger;
use wattlog_core::board::Board;
use wattlog_core::config::{Config, EndpointConfig, InternetConfig, LoggerConfig};
use wattlog_firmware::board::FirmwareBoard;
use wattlog_firmware::http_bridge::{BridgeTransport, http_bridge_task};
use wattlog_firmware::sntp::sntp_task;
use wattlog_firmware::wifi::{LINK_EVENTS, net_task, wifi_task};
use wattlog_firmware::wifi_secrets::{
    BACKEND_HOST, BACKEND_PATH, BACKEND_PORT, NTP_SERVER, WIFI_PASSWORD, WIFI_SSID,
};

/// Pause between ticks; lets the network tasks run
const TICK_INTERVAL_MS: u64 = 1;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

fn firmware_config() -> Config<'static> {
    Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        logger: LoggerConfig {
            endpoint: EndpointConfig {
                host: BACKEND_HOST,
                port: BACKEND_PORT,
                path: BACKEND_PATH,
            },
            ..LoggerConfig::default()
        },
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let config = firmware_config();

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(DhcpConfig::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(net_task(runner).expect("net task"));
    spawner.spawn(wifi_task(wifi_controller, stack, config.internet).expect("wifi task"));
    spawner.spawn(
        sntp_task(
            stack,
            NTP_SERVER,
            config.logger.time_sync.plausible_after_secs,
        )
        .expect("sntp task"),
    );
    spawner.spawn(http_bridge_task(stack).expect("http bridge task"));

    // Voltage divider on GPIO4, current transducer on GPIO5 (both ADC1)
    let mut adc_config = AdcConfig::new();
    let voltage_pin = adc_config.enable_pin(peripherals.GPIO4, Attenuation::_11dB);
    let current_pin = adc_config.enable_pin(peripherals.GPIO5, Attenuation::_11dB);
    let adc = Adc::new(peripherals.ADC1, adc_config);
    let led = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());

    let mut board = FirmwareBoard::new(adc, voltage_pin, current_pin, led);
    let mut logger: DataLogger<'_, BridgeTransport> =
        DataLogger::new(config.logger, &LINK_EVENTS, BridgeTransport, board.raw_ticks());

    info!("Logger running");

    loop {
        logger.tick(&mut board);
        Timer::after_millis(TICK_INTERVAL_MS).await;
    }
}
