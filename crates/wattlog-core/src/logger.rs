//! The cooperative tick scheduler
//!
//! [`DataLogger`] owns every piece of mutable state of the device and advances
//! it in a fixed order on each call to [`DataLogger::tick`]:
//!
//! 1. pending link events
//! 2. the time source (calibration / drift correction)
//! 3. the transmission pipeline
//! 4. the sample reducer
//! 5. the status LED
//!
//! Nothing in a tick blocks. The platform calls `tick` in a loop with a short
//! yield in between.

use log::{debug, error, info, warn};

use crate::app_state::{
    ConnectivityMachine, ConnectivityState, LinkEvent, LinkEvents, TimeSignal, TransmitGate,
};
use crate::board::Board;
use crate::clock::{EpochClock, RawTicks};
use crate::config::LoggerConfig;
use crate::indicator::indicator_level;
use crate::net::{RESPONSE_CAPACITY, ServiceStatus, TransmissionPipeline, Transport};
use crate::storage::{BatchQueue, BatchReducer};

pub struct DataLogger<'a, T: Transport, const N: usize = RESPONSE_CAPACITY> {
    config: LoggerConfig<'a>,
    link_events: &'a LinkEvents,
    clock: EpochClock,
    machine: ConnectivityMachine,
    reducer: BatchReducer,
    queue: BatchQueue,
    pipeline: TransmissionPipeline<'a, T, N>,
    /// Consecutive failed sensor reads
    read_failures: u32,
}

impl<'a, T: Transport, const N: usize> DataLogger<'a, T, N> {
    /// Create the logger in `Offline`, with the clock starting at zero at `boot_tick`
    pub fn new(config: LoggerConfig<'a>, link_events: &'a LinkEvents, transport: T, boot_tick: RawTicks) -> Self {
        let mut clock = EpochClock::new(boot_tick);
        let now = clock.now(boot_tick);

        info!(
            " Logger starting: window {} ms, queue {}, endpoint {}:{}{}",
            config.batching.window_ms,
            config.batching.queue_capacity,
            config.endpoint.host,
            config.endpoint.port,
            config.endpoint.path
        );

        Self {
            config,
            link_events,
            clock,
            machine: ConnectivityMachine::new(),
            reducer: BatchReducer::new(now, config.batching.window_ms),
            queue: BatchQueue::with_capacity(config.batching.queue_capacity),
            pipeline: TransmissionPipeline::new(transport, config.endpoint, config.transmission),
            read_failures: 0,
        }
    }

    /// Run one scheduling iteration
    pub fn tick<B: Board>(&mut self, board: &mut B) {
        self.apply_link_events(board);
        self.apply_time_signal(board);

        let now = self.clock.now(board.raw_ticks());
        self.service_pipeline(now);
        self.sample(board, now);

        board.set_indicator(indicator_level(
            self.machine.state(),
            now,
            self.machine.flash_until(),
        ));
    }

    fn apply_link_events<B: Board>(&mut self, board: &mut B) {
        while let Some(event) = self.link_events.next() {
            let previous = self.machine.on_link_event(event);

            if event == LinkEvent::Lost {
                if let Some(record) = self.pipeline.abandon() {
                    warn!(" Link lost while transmitting, discarding {}", record);
                }
                if previous != ConnectivityState::Offline {
                    board.request_reconnect();
                }
            }
        }
    }

    fn apply_time_signal<B: Board>(&mut self, board: &mut B) {
        let Some(epoch_secs) = board.poll_time() else {
            return;
        };

        match self
            .machine
            .on_time_signal(epoch_secs, self.config.time_sync.plausible_after_secs)
        {
            TimeSignal::Implausible | TimeSignal::Ignored => {}
            TimeSignal::FirstSync => {
                let calibration = self.clock.calibrate(epoch_secs, board.raw_ticks());
                self.queue.rebase_all(&calibration);
                self.reducer.rebase(&calibration);
                info!(
                    " Clock calibrated to {} s, {} queued batches rebased",
                    epoch_secs,
                    self.queue.len()
                );
                self.arm_flash(board);
            }
            TimeSignal::Resync { came_online } => {
                let calibration = self.clock.calibrate(epoch_secs, board.raw_ticks());
                debug!(" Drift correction of {} ms", calibration.correction_millis());
                if came_online {
                    self.arm_flash(board);
                }
            }
        }
    }

    fn arm_flash<B: Board>(&mut self, board: &B) {
        let now = self.clock.now(board.raw_ticks());
        self.machine
            .arm_flash(now.saturating_add(self.config.indicator.flash_ms));
    }

    fn service_pipeline(&mut self, now: u64) {
        if self.machine.state() == ConnectivityState::Transmitting {
            let status = self.pipeline.service(now);
            if status.is_terminal() || status == ServiceStatus::Idle {
                self.machine.finish_transmission();
            }
            return;
        }

        if self
            .machine
            .transmit_gate(self.queue.len(), self.clock.is_calibrated())
            != TransmitGate::Ready
        {
            return;
        }

        if let Some(record) = self.queue.pop_front() {
            match self.pipeline.start(record, now) {
                Ok(()) => {
                    self.machine.begin_transmission();
                }
                Err(e) => error!(" Dropping record {}: {}", record, e),
            }
        }
    }

    fn sample<B: Board>(&mut self, board: &mut B, now: u64) {
        let sample = match board.read_sample() {
            Ok(raw) => {
                if self.read_failures > 0 {
                    info!(" Sensor recovered after {} failed reads", self.read_failures);
                    self.read_failures = 0;
                }
                Some(raw.convert())
            }
            Err(e) => {
                // Warn once per streak
                if self.read_failures == 0 {
                    warn!(" Skipping sample: {}", e);
                } else {
                    debug!(" Skipping sample: {}", e);
                }
                self.read_failures = self.read_failures.saturating_add(1);
                None
            }
        };

        if let Some(record) = self.reducer.step(now, sample) {
            self.queue.push(record);
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.machine.state()
    }

    pub fn machine(&self) -> &ConnectivityMachine {
        &self.machine
    }

    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn reducer(&self) -> &BatchReducer {
        &self.reducer
    }

    pub fn pipeline(&self) -> &TransmissionPipeline<'a, T, N> {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::config::BatchingConfig;
    use crate::net::testing::{FakeTransport, Reply};
    use crate::sensors::{RawReading, SensorError};

    const BOOT: RawTicks = u32::MAX - 20;
    const NOW_SECS: u64 = 1_717_000_000;
    const EPOCH_MS: u64 = NOW_SECS * 1000;

    struct FakeBoard {
        ticks: RawTicks,
        sample: Result<RawReading, SensorError>,
        time: Option<u64>,
        reconnects: u32,
        led: bool,
    }

    impl FakeBoard {
        fn new() -> Self {
            Self {
                ticks: BOOT,
                sample: Ok(RawReading::new(2_000, 10)),
                time: None,
                reconnects: 0,
                led: false,
            }
        }
    }

    impl Board for FakeBoard {
        fn raw_ticks(&self) -> RawTicks {
            self.ticks
        }

        fn read_sample(&mut self) -> Result<RawReading, SensorError> {
            self.sample
        }

        fn poll_time(&mut self) -> Option<u64> {
            self.time.take()
        }

        fn request_reconnect(&mut self) {
            self.reconnects += 1;
        }

        fn set_indicator(&mut self, on: bool) {
            self.led = on;
        }
    }

    fn config(window_ms: u64) -> LoggerConfig<'static> {
        LoggerConfig {
            batching: BatchingConfig {
                window_ms,
                queue_capacity: 16,
            },
            ..LoggerConfig::default()
        }
    }

    fn run(logger: &mut DataLogger<'_, FakeTransport>, board: &mut FakeBoard, ticks: u32) {
        for _ in 0..ticks {
            board.ticks = board.ticks.wrapping_add(1);
            logger.tick(board);
        }
    }

    fn bring_online(logger: &mut DataLogger<'_, FakeTransport>, events: &LinkEvents, board: &mut FakeBoard) {
        events.notify(LinkEvent::Established);
        run(logger, board, 1);
        assert_eq!(logger.state(), ConnectivityState::PendingTimeSync);

        board.time = Some(NOW_SECS);
        run(logger, board, 1);
        assert!(logger.clock().is_calibrated());
        assert!(matches!(
            logger.state(),
            ConnectivityState::Online | ConnectivityState::Transmitting
        ));
    }

    fn run_until_queued(logger: &mut DataLogger<'_, FakeTransport>, board: &mut FakeBoard) {
        for _ in 0..1_000 {
            if !logger.queue().is_empty() {
                return;
            }
            run(logger, board, 1);
        }
        panic!("no batch was queued");
    }

    fn timestamps(logger: &DataLogger<'_, FakeTransport>) -> Vec<u64> {
        logger.queue().iter().map(|r| r.timestamp_ms).collect()
    }

    #[test]
    fn test_implausible_time_keeps_pending() {
        let events = LinkEvents::new();
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(100), &events, FakeTransport::default(), BOOT);

        events.notify(LinkEvent::Established);
        board.time = Some(0);
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::PendingTimeSync);
        assert!(!logger.clock().is_calibrated());

        board.time = Some(NOW_SECS);
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Online);
        assert!(logger.clock().is_calibrated());
        assert_eq!(logger.machine().flash_until(), Some(EPOCH_MS + 500));
    }

    #[test]
    fn test_retry_bound_returns_online() {
        let events = LinkEvents::new();
        let transport = FakeTransport::always(Reply::Refuse);
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(100), &events, transport.clone(), BOOT);

        bring_online(&mut logger, &events, &mut board);
        run_until_queued(&mut logger, &mut board);

        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Transmitting);
        assert!(logger.queue().is_empty());

        run(&mut logger, &mut board, 3);
        assert_eq!(logger.state(), ConnectivityState::Transmitting);
        assert_eq!(transport.opened(), 4);

        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Online);
        assert_eq!(transport.opened(), 4);
        assert_eq!(logger.pipeline().stats().dropped, 1);
        assert!(logger.queue().is_empty());
    }

    #[test]
    fn test_fragmented_success_delivers() {
        let events = LinkEvents::new();
        let mut reply = Reply::success();
        if let Reply::Respond { per_read, .. } = &mut reply {
            *per_read = 1;
        }
        let transport = FakeTransport::scripted([reply]);
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(100), &events, transport.clone(), BOOT);

        bring_online(&mut logger, &events, &mut board);
        run_until_queued(&mut logger, &mut board);
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Transmitting);

        let mut ticks = 0;
        while logger.state() == ConnectivityState::Transmitting && ticks < 200 {
            run(&mut logger, &mut board, 1);
            ticks += 1;
        }

        assert_eq!(logger.state(), ConnectivityState::Online);
        assert_eq!(logger.pipeline().stats().delivered, 1);
        assert_eq!(transport.opened(), 1);
        assert!(ticks > 50);
    }

    #[test]
    fn test_link_lost_while_transmitting() {
        let events = LinkEvents::new();
        let transport = FakeTransport::always(Reply::Silent);
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(100), &events, transport.clone(), BOOT);

        bring_online(&mut logger, &events, &mut board);
        run_until_queued(&mut logger, &mut board);
        let in_flight = logger.queue().front().copied().unwrap();
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Transmitting);
        assert_eq!(transport.live(), 1);
        assert!(!timestamps(&logger).contains(&in_flight.timestamp_ms));

        events.notify(LinkEvent::Lost);
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.state(), ConnectivityState::Offline);
        assert!(!logger.pipeline().is_busy());
        assert_eq!(transport.live(), 0);
        assert_eq!(board.reconnects, 1);
        assert_eq!(logger.pipeline().stats().abandoned, 1);
        assert_eq!(logger.machine().flash_until(), None);
        // Discarded, not put back in the queue
        assert!(!timestamps(&logger).contains(&in_flight.timestamp_ms));

        run(&mut logger, &mut board, 20_000);
        assert_eq!(transport.opened(), 1);
        assert!(!timestamps(&logger).contains(&in_flight.timestamp_ms));
    }

    #[test]
    fn test_rebase_is_one_time() {
        let events = LinkEvents::new();
        let mut board = FakeBoard::new();
        let transport = FakeTransport::always(Reply::Silent);
        let mut logger = DataLogger::new(config(100), &events, transport, BOOT);

        // Three windows close while offline, across the counter wrap.
        run(&mut logger, &mut board, 350);
        assert_eq!(timestamps(&logger), [50, 150, 250]);

        // Calibration happens at device time 352.
        bring_online(&mut logger, &events, &mut board);
        assert_eq!(logger.state(), ConnectivityState::Transmitting);
        assert_eq!(timestamps(&logger), [EPOCH_MS - 202, EPOCH_MS - 102]);
        assert_eq!(logger.reducer().next_boundary(), EPOCH_MS + 48);

        run(&mut logger, &mut board, 49);
        assert_eq!(timestamps(&logger), [EPOCH_MS - 202, EPOCH_MS - 102, EPOCH_MS - 2]);

        // A later signal only corrects drift.
        board.time = Some(NOW_SECS + 5);
        run(&mut logger, &mut board, 1);
        assert_eq!(
            timestamps(&logger)[..3],
            [EPOCH_MS - 202, EPOCH_MS - 102, EPOCH_MS - 2]
        );
    }

    #[test]
    fn test_failed_reads_produce_zero_batch() {
        let events = LinkEvents::new();
        let mut board = FakeBoard::new();
        board.sample = Err(SensorError::ReadFailed { channel: "voltage" });
        let mut logger = DataLogger::new(config(100), &events, FakeTransport::default(), BOOT);

        run(&mut logger, &mut board, 101);
        let record = logger.queue().front().copied().unwrap();
        assert_eq!(record.voltage, 0.0);
        assert_eq!(record.current, 0.0);
        assert_eq!(logger.reducer().pending_samples(), 0);
        assert_eq!(logger.read_failures, 101);
    }

    #[test]
    fn test_read_failure_streak_resets_on_recovery() {
        let events = LinkEvents::new();
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(100), &events, FakeTransport::default(), BOOT);

        board.sample = Err(SensorError::NotReady { channel: "current" });
        run(&mut logger, &mut board, 5);
        assert_eq!(logger.read_failures, 5);

        board.sample = Ok(RawReading::new(2_000, 10));
        run(&mut logger, &mut board, 1);
        assert_eq!(logger.read_failures, 0);
        assert_eq!(logger.reducer().pending_samples(), 1);
    }

    #[test]
    fn test_indicator_follows_state() {
        let events = LinkEvents::new();
        let mut board = FakeBoard::new();
        let mut logger = DataLogger::new(config(10_000), &events, FakeTransport::default(), BOOT);

        run(&mut logger, &mut board, 1);
        assert!(board.led, "offline blink starts on");
        run(&mut logger, &mut board, 250);
        assert!(!board.led);

        bring_online(&mut logger, &events, &mut board);
        assert!(board.led, "flash window starts on");
        run(&mut logger, &mut board, 599);
        assert_eq!(logger.state(), ConnectivityState::Online);
        assert!(!board.led);
    }
}
