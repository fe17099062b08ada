//! Connectivity state and link events for wattlog
//!
//! The connectivity machine is the single owner of [`ConnectivityState`]. Link
//! notifications raised outside the tick (Wi-Fi driver callbacks, network
//! tasks) never touch it directly: they are queued on [`LinkEvents`] and
//! applied at the start of the next tick.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info};

use crate::time_sync;

/// Pending link events that fit between two ticks
pub const LINK_EVENT_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// No link; re-association has been requested
    Offline,
    /// Link up, waiting for a plausible time signal
    PendingTimeSync,
    /// Link up and clock calibrated, no request in flight
    Online,
    /// A batch record is being delivered
    Transmitting,
}

impl ConnectivityState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::PendingTimeSync => "pending-time-sync",
            Self::Online => "online",
            Self::Transmitting => "transmitting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Established,
    Lost,
}

/// Event slot shared between link callbacks and the tick loop
///
/// `notify` only records the event and is safe to call from any task or
/// interrupt context; the tick drains events with `next`.
pub struct LinkEvents {
    channel: Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_CAPACITY>,
}

impl LinkEvents {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Record a link event for the next tick. Returns `false` if the slot is full.
    pub fn notify(&self, event: LinkEvent) -> bool {
        self.channel.try_send(event).is_ok()
    }

    /// Take the oldest pending event
    pub fn next(&self) -> Option<LinkEvent> {
        self.channel.try_receive().ok()
    }
}

impl Default for LinkEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// What the tick has to do with a time signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSignal {
    /// Below the plausibility threshold (unsynced source)
    Implausible,
    /// Link is down; the signal is dropped
    Ignored,
    /// First plausible signal ever: calibrate, rebase queued data, now online
    FirstSync,
    /// Any later plausible signal: drift correction only
    Resync { came_online: bool },
}

/// Why a transmission cannot start this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitGate {
    Ready,
    NotOnline,
    QueueEmpty,
    TimeNotYetAvailable,
}

/// Connectivity and readiness state machine
///
/// `Offline → PendingTimeSync → Online ⇄ Transmitting`, with `Offline`
/// reachable from every state on link loss.
#[derive(Debug, Clone)]
pub struct ConnectivityMachine {
    state: ConnectivityState,
    flash_until: Option<u64>,
    time_synced: bool,
}

impl ConnectivityMachine {
    pub const fn new() -> Self {
        Self {
            state: ConnectivityState::Offline,
            flash_until: None,
            time_synced: false,
        }
    }

    pub const fn state(&self) -> ConnectivityState {
        self.state
    }

    pub const fn flash_until(&self) -> Option<u64> {
        self.flash_until
    }

    fn switch(&mut self, next: ConnectivityState) {
        if next != self.state {
            info!(" State: {} -> {}", self.state.label(), next.label());
            self.state = next;
        }
    }

    /// Apply a link event, returning the state it was applied in
    pub fn on_link_event(&mut self, event: LinkEvent) -> ConnectivityState {
        let previous = self.state;
        match event {
            LinkEvent::Established => {
                if previous == ConnectivityState::Offline {
                    self.switch(ConnectivityState::PendingTimeSync);
                } else {
                    debug!(" Link established while {}, ignored", previous.label());
                }
            }
            LinkEvent::Lost => {
                self.flash_until = None;
                self.switch(ConnectivityState::Offline);
            }
        }
        previous
    }

    /// Apply a time signal of `epoch_secs`, plausible only above `threshold_secs`
    pub fn on_time_signal(&mut self, epoch_secs: u64, threshold_secs: u64) -> TimeSignal {
        if !time_sync::is_plausible(epoch_secs, threshold_secs) {
            debug!(" Implausible time signal {} ignored", epoch_secs);
            return TimeSignal::Implausible;
        }

        let came_online = match self.state {
            ConnectivityState::Offline => return TimeSignal::Ignored,
            ConnectivityState::PendingTimeSync => {
                self.switch(ConnectivityState::Online);
                true
            }
            ConnectivityState::Online | ConnectivityState::Transmitting => false,
        };

        if self.time_synced {
            TimeSignal::Resync { came_online }
        } else {
            self.time_synced = true;
            TimeSignal::FirstSync
        }
    }

    /// Arm the indicator flash window until `until` (epoch milliseconds)
    pub fn arm_flash(&mut self, until: u64) {
        self.flash_until = Some(until);
    }

    pub fn transmit_gate(&self, queue_len: usize, calibrated: bool) -> TransmitGate {
        if self.state != ConnectivityState::Online {
            TransmitGate::NotOnline
        } else if !calibrated {
            TransmitGate::TimeNotYetAvailable
        } else if queue_len == 0 {
            TransmitGate::QueueEmpty
        } else {
            TransmitGate::Ready
        }
    }

    /// `Online → Transmitting`; returns whether the transition happened
    pub fn begin_transmission(&mut self) -> bool {
        if self.state == ConnectivityState::Online {
            self.switch(ConnectivityState::Transmitting);
            true
        } else {
            false
        }
    }

    /// `Transmitting → Online` after a terminal pipeline outcome
    pub fn finish_transmission(&mut self) {
        if self.state == ConnectivityState::Transmitting {
            self.switch(ConnectivityState::Online);
        }
    }
}

impl Default for ConnectivityMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u64 = 1_704_067_200;
    const NOW_SECS: u64 = 1_717_000_000;

    fn online_machine() -> ConnectivityMachine {
        let mut machine = ConnectivityMachine::new();
        machine.on_link_event(LinkEvent::Established);
        machine.on_time_signal(NOW_SECS, THRESHOLD);
        machine
    }

    #[test]
    fn test_starts_offline() {
        let machine = ConnectivityMachine::new();
        assert_eq!(machine.state(), ConnectivityState::Offline);
        assert_eq!(machine.flash_until(), None);
    }

    #[test]
    fn test_link_then_time_brings_online() {
        let mut machine = ConnectivityMachine::new();
        assert_eq!(
            machine.on_link_event(LinkEvent::Established),
            ConnectivityState::Offline
        );
        assert_eq!(machine.state(), ConnectivityState::PendingTimeSync);

        assert_eq!(machine.on_time_signal(0, THRESHOLD), TimeSignal::Implausible);
        assert_eq!(machine.state(), ConnectivityState::PendingTimeSync);

        assert_eq!(machine.on_time_signal(NOW_SECS, THRESHOLD), TimeSignal::FirstSync);
        assert_eq!(machine.state(), ConnectivityState::Online);
    }

    #[test]
    fn test_time_signal_offline_is_ignored() {
        let mut machine = ConnectivityMachine::new();
        assert_eq!(machine.on_time_signal(NOW_SECS, THRESHOLD), TimeSignal::Ignored);
        assert_eq!(machine.state(), ConnectivityState::Offline);
    }

    #[test]
    fn test_only_first_signal_calibrates() {
        let mut machine = online_machine();
        assert_eq!(
            machine.on_time_signal(NOW_SECS + 60, THRESHOLD),
            TimeSignal::Resync { came_online: false }
        );

        machine.on_link_event(LinkEvent::Lost);
        machine.on_link_event(LinkEvent::Established);
        assert_eq!(
            machine.on_time_signal(NOW_SECS + 120, THRESHOLD),
            TimeSignal::Resync { came_online: true }
        );
        assert_eq!(machine.state(), ConnectivityState::Online);
    }

    #[test]
    fn test_transmission_round_trip() {
        let mut machine = online_machine();
        assert!(machine.begin_transmission());
        assert_eq!(machine.state(), ConnectivityState::Transmitting);
        assert!(!machine.begin_transmission());

        machine.finish_transmission();
        assert_eq!(machine.state(), ConnectivityState::Online);
    }

    #[test]
    fn test_link_lost_from_any_state() {
        let mut machine = online_machine();
        machine.arm_flash(42);
        machine.begin_transmission();

        assert_eq!(
            machine.on_link_event(LinkEvent::Lost),
            ConnectivityState::Transmitting
        );
        assert_eq!(machine.state(), ConnectivityState::Offline);
        assert_eq!(machine.flash_until(), None);

        machine.finish_transmission();
        assert_eq!(machine.state(), ConnectivityState::Offline);
    }

    #[test]
    fn test_established_while_online_is_ignored() {
        let mut machine = online_machine();
        machine.on_link_event(LinkEvent::Established);
        assert_eq!(machine.state(), ConnectivityState::Online);
    }

    #[test]
    fn test_transmit_gate() {
        let mut machine = ConnectivityMachine::new();
        assert_eq!(machine.transmit_gate(3, true), TransmitGate::NotOnline);

        machine = online_machine();
        assert_eq!(machine.transmit_gate(3, false), TransmitGate::TimeNotYetAvailable);
        assert_eq!(machine.transmit_gate(0, true), TransmitGate::QueueEmpty);
        assert_eq!(machine.transmit_gate(1, true), TransmitGate::Ready);
    }

    #[test]
    fn test_link_events_fifo_and_bounded() {
        let events = LinkEvents::new();
        assert!(events.notify(LinkEvent::Established));
        assert!(events.notify(LinkEvent::Lost));
        assert_eq!(events.next(), Some(LinkEvent::Established));
        assert_eq!(events.next(), Some(LinkEvent::Lost));
        assert_eq!(events.next(), None);

        for _ in 0..LINK_EVENT_CAPACITY {
            assert!(events.notify(LinkEvent::Lost));
        }
        assert!(!events.notify(LinkEvent::Established));
    }
}
