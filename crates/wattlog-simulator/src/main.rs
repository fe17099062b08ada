//! Host simulator for the wattlog data logger.
//!
//! Runs the core [`DataLogger`] against a simulated board and a flaky
//! in-memory backend, in simulated time, so the whole life cycle can be
//! watched in the log without hardware:
//!
//! | Time (s) | Event                                   |
//! |----------|-----------------------------------------|
//! | 1.5      | Link up                                 |
//! | 2        | Time server reports 0 (implausible)     |
//! | 4        | Time server reports the host clock      |
//! | 60       | Link lost                               |
//! | 70       | Link up again                           |
//! | 71       | Time server reports the host clock      |
//! | 150      | End                                     |
//!
//! The raw tick counter starts close to `u32::MAX` so it wraps early in the
//! run. Backend attempts cycle through refused, stalled, rejected, slow and
//! successful replies. Use `RUST_LOG=debug` to see every attempt.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use wattlog_core::DataLogger;
use wattlog_core::app_state::{LinkEvent, LinkEvents};
use wattlog_core::board::Board;
use wattlog_core::clock::RawTicks;
use wattlog_core::config::{EndpointConfig, LoggerConfig};
use wattlog_core::net::{Connection, Transport, TransportError};
use wattlog_core::sensors::{RawReading, SensorError};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Simulated milliseconds per tick
const TICK_MS: u32 = 10;

/// Raw counter value at boot; wraps after about 30 s
const BOOT_TICKS: RawTicks = u32::MAX - 30_000;

/// Total simulated run time
const RUN_MS: u64 = 150_000;

/// Every n-th ADC read fails
const FAILED_READ_EVERY: u64 = 97;

/// Empty reads before a reply starts arriving
const REPLY_LATENCY_READS: u32 = 20;

const SUCCESS_REPLY: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"status\":\"success\",\"value\":null}";
const REJECTED_REPLY: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"status\":\"error\",\"errorMessage\":\"Server Error\"}";

static LINK_EVENTS: LinkEvents = LinkEvents::new();

// ---------------------------------------------------------------------------
// Scripted environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Scene {
    Link(LinkEvent),
    /// The time server answers with an unset clock
    UnsetTime,
    /// The time server answers with the host clock
    HostTime,
}

const SCRIPT: &[(u64, Scene)] = &[
    (1_500, Scene::Link(LinkEvent::Established)),
    (2_000, Scene::UnsetTime),
    (4_000, Scene::HostTime),
    (60_000, Scene::Link(LinkEvent::Lost)),
    (70_000, Scene::Link(LinkEvent::Established)),
    (71_000, Scene::HostTime),
];

// ---------------------------------------------------------------------------
// Simulated board
// ---------------------------------------------------------------------------

/// Board whose counter and ADC are driven by the simulation loop.
struct SimulatedBoard {
    ticks: RawTicks,
    elapsed_ms: u64,
    reads: u64,
    time: Option<u64>,
    host_epoch_secs: u64,
    led: bool,
    reconnects: u32,
}

impl SimulatedBoard {
    fn new() -> Self {
        let host_epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            ticks: BOOT_TICKS,
            elapsed_ms: 0,
            reads: 0,
            time: None,
            host_epoch_secs,
            led: false,
            reconnects: 0,
        }
    }

    fn advance(&mut self, ms: u32) {
        self.ticks = self.ticks.wrapping_add(ms);
        self.elapsed_ms += u64::from(ms);
    }

    fn play(&mut self, scene: Scene) {
        match scene {
            Scene::Link(event) => {
                info!("[{} ms] Link {:?}", self.elapsed_ms, event);
                if !LINK_EVENTS.notify(event) {
                    warn!("Link event queue full, dropped {:?}", event);
                }
            }
            Scene::UnsetTime => {
                info!("[{} ms] Time server reports 0", self.elapsed_ms);
                self.time = Some(0);
            }
            Scene::HostTime => {
                let now = self.host_epoch_secs + self.elapsed_ms / 1000;
                info!("[{} ms] Time server reports {}", self.elapsed_ms, now);
                self.time = Some(now);
            }
        }
    }
}

impl Board for SimulatedBoard {
    fn raw_ticks(&self) -> RawTicks {
        self.ticks
    }

    fn read_sample(&mut self) -> Result<RawReading, SensorError> {
        self.reads += 1;
        if self.reads % FAILED_READ_EVERY == 0 {
            return Err(SensorError::NotReady { channel: "voltage" });
        }

        // Bus around 14 V with a slow ripple, load current cycling 0..30 A
        let t = self.elapsed_ms as f64 / 1000.0;
        let voltage_code = 1_390.0 + 40.0 * (t / 7.0).sin();
        let current_code = 100.0 + 100.0 * (t / 23.0).sin();
        Ok(RawReading::new(voltage_code as u16, current_code as u16))
    }

    fn poll_time(&mut self) -> Option<u64> {
        self.time.take()
    }

    fn request_reconnect(&mut self) {
        self.reconnects += 1;
        debug!("[{} ms] Reconnect requested", self.elapsed_ms);
    }

    fn set_indicator(&mut self, on: bool) {
        if on != self.led {
            debug!("[{} ms] LED {}", self.elapsed_ms, if on { "on" } else { "off" });
        }
        self.led = on;
    }
}

// ---------------------------------------------------------------------------
// Simulated backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    /// Connection refused
    Refuse,
    /// Accepts the request and never answers
    Stall,
    /// Answers without the success marker
    Reject,
    /// Answers one byte per read
    Slow,
    Succeed,
}

const BEHAVIOURS: &[Behaviour] = &[
    Behaviour::Refuse,
    Behaviour::Stall,
    Behaviour::Reject,
    Behaviour::Succeed,
    Behaviour::Succeed,
    Behaviour::Slow,
    Behaviour::Succeed,
    Behaviour::Succeed,
];

/// In-memory backend that cycles through [`BEHAVIOURS`].
#[derive(Debug, Default)]
struct SimulatedTransport {
    opened: usize,
}

impl Transport for SimulatedTransport {
    type Connection = SimulatedConnection;

    fn open(&mut self, endpoint: &EndpointConfig<'_>) -> Result<SimulatedConnection, TransportError> {
        let behaviour = BEHAVIOURS[self.opened % BEHAVIOURS.len()];
        self.opened += 1;
        debug!(
            "Opening {}:{} ({:?})",
            endpoint.host, endpoint.port, behaviour
        );

        if behaviour == Behaviour::Refuse {
            return Err(TransportError::ConnectFailed);
        }

        let reply = match behaviour {
            Behaviour::Reject => REJECTED_REPLY,
            _ => SUCCESS_REPLY,
        };

        Ok(SimulatedConnection {
            behaviour,
            reply,
            position: 0,
            latency: REPLY_LATENCY_READS,
        })
    }
}

struct SimulatedConnection {
    behaviour: Behaviour,
    reply: &'static [u8],
    position: usize,
    latency: u32,
}

impl Connection for SimulatedConnection {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let body = std::str::from_utf8(bytes)
            .ok()
            .and_then(|request| request.split("\r\n\r\n").nth(1))
            .unwrap_or("<binary>");
        debug!("Request body: {}", body);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.behaviour == Behaviour::Stall {
            return Ok(0);
        }
        if self.latency > 0 {
            self.latency -= 1;
            return Ok(0);
        }

        let remaining = &self.reply[self.position..];
        let limit = if self.behaviour == Behaviour::Slow {
            // One byte, then nothing until the next tick
            self.latency = 1;
            1
        } else {
            buf.len()
        };
        let len = remaining.len().min(limit);
        buf[..len].copy_from_slice(&remaining[..len]);
        self.position += len;
        Ok(len)
    }

    fn is_closed(&self) -> bool {
        self.behaviour != Behaviour::Stall && self.position == self.reply.len()
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting wattlog simulator");

    let config = LoggerConfig {
        endpoint: EndpointConfig {
            host: "backend.invalid",
            port: 80,
            path: "/api/mutation",
        },
        ..LoggerConfig::default()
    };

    let mut board = SimulatedBoard::new();
    let mut logger: DataLogger<'_, SimulatedTransport> = DataLogger::new(
        config,
        &LINK_EVENTS,
        SimulatedTransport::default(),
        board.raw_ticks(),
    );

    let mut script = SCRIPT.iter().peekable();
    let mut last_state = logger.state();

    while board.elapsed_ms < RUN_MS {
        while let Some(&&(at_ms, scene)) = script.peek() {
            if at_ms > board.elapsed_ms {
                break;
            }
            board.play(scene);
            script.next();
        }

        logger.tick(&mut board);

        if logger.state() != last_state {
            info!(
                "[{} ms] {} -> {}",
                board.elapsed_ms,
                last_state.label(),
                logger.state().label()
            );
            last_state = logger.state();
        }

        board.advance(TICK_MS);
    }

    let stats = logger.pipeline().stats();
    info!(
        "Delivered {}, dropped {}, abandoned {}, {} attempts",
        stats.delivered, stats.dropped, stats.abandoned, stats.attempts
    );
    info!(
        "{} batches still queued, {} evicted, {} reconnect requests",
        logger.queue().len(),
        logger.queue().evicted(),
        board.reconnects
    );
    info!("Simulator exiting");
}
