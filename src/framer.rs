//! Bus-level packet framing.
//!
//! The framer sits between the bit receiver and the protocol engine. It
//! tracks where the bus is (detached, idle, inside a packet, suspended,
//! in reset) and turns the receiver's raw events into classified packet
//! bytes: the first byte after a sync pattern is the PID, everything
//! after it is payload, and the end-of-packet marker closes the frame.
//!
//! Line conditions outrank packet state. A reset or suspend detected by
//! the [`LineMonitor`](crate::line::LineMonitor) abandons any packet in
//! flight.

use crate::line::{LineCondition, LineState};
use crate::pid::Pid;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// Where the bus is right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub(crate) enum BusState {
    /// Pull-up released; the host sees no device.
    Detached,
    /// Pull-up asserted, waiting for the line to settle at idle.
    Attaching,
    /// Powered and idle, between packets.
    Idle,
    /// Sync seen, the next byte is the PID.
    Pid,
    /// Valid PID seen, payload bytes streaming in.
    Payload(Pid),
    /// Bad packet; discard everything until the next end-of-packet.
    SkipToEop,
    /// Bus idle past the suspend threshold.
    Suspend,
    /// SE0 held past the reset threshold.
    Reset,
}

/// What a receiver event meant at the packet level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FramerAction {
    Ignored,
    /// Packet opened with this PID.
    Pid(Pid),
    /// Payload byte of the open packet.
    Payload(Pid, u8),
    /// Packet closed cleanly.
    End(Pid),
    /// Malformed packet; the rest is being discarded.
    Error,
}

/// Line-condition edge reported to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineTransition {
    None,
    ResetStart,
    ResetEnd,
    SuspendStart,
    Resume,
}

pub(crate) struct Framer {
    state: BusState,
}

impl Framer {
    pub const fn new() -> Self {
        Framer {
            state: BusState::Detached,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> BusState {
        self.state
    }

    /// Should the transceiver present the full-/low-speed pull-up?
    pub fn pull_up(&self) -> bool {
        !matches!(self.state, BusState::Detached)
    }

    pub fn attach(&mut self) {
        if matches!(self.state, BusState::Detached) {
            self.state = BusState::Attaching;
        }
    }

    pub fn detach(&mut self) {
        self.state = BusState::Detached;
    }

    /// Fold in this tick's line condition. Runs before any packet event.
    pub fn on_line(&mut self, condition: LineCondition, line: LineState) -> LineTransition {
        match self.state {
            BusState::Detached => LineTransition::None,
            BusState::Attaching => {
                if condition == LineCondition::Reset {
                    self.state = BusState::Reset;
                    debug!("bus reset asserted");
                    LineTransition::ResetStart
                } else if line == LineState::J {
                    self.state = BusState::Idle;
                    LineTransition::None
                } else {
                    LineTransition::None
                }
            }
            BusState::Reset => {
                if condition != LineCondition::Reset {
                    self.state = BusState::Idle;
                    LineTransition::ResetEnd
                } else {
                    LineTransition::None
                }
            }
            BusState::Suspend => {
                if condition != LineCondition::Suspend {
                    self.state = BusState::Idle;
                    LineTransition::Resume
                } else {
                    LineTransition::None
                }
            }
            _ => match condition {
                LineCondition::Reset => {
                    self.state = BusState::Reset;
                    debug!("bus reset asserted");
                    LineTransition::ResetStart
                }
                LineCondition::Suspend => {
                    self.state = BusState::Suspend;
                    LineTransition::SuspendStart
                }
                LineCondition::Normal => LineTransition::None,
            },
        }
    }

    /// The receiver locked onto a sync pattern.
    pub fn on_sop(&mut self) {
        match self.state {
            // A sync while skipping is trusted; a false match yields a
            // PID whose complement check fails and we skip again.
            BusState::Idle | BusState::SkipToEop | BusState::Pid | BusState::Payload(_) => {
                self.state = BusState::Pid;
            }
            _ => {}
        }
    }

    /// A decoded byte arrived from the receiver.
    pub fn on_byte(&mut self, byte: u8) -> FramerAction {
        match self.state {
            BusState::Pid => match Pid::from_byte(byte) {
                Some(pid) => {
                    self.state = BusState::Payload(pid);
                    FramerAction::Pid(pid)
                }
                None => {
                    warn!("bad pid byte: {}", byte);
                    self.state = BusState::SkipToEop;
                    FramerAction::Error
                }
            },
            BusState::Payload(pid) => FramerAction::Payload(pid, byte),
            _ => FramerAction::Ignored,
        }
    }

    /// The receiver saw an end-of-packet.
    pub fn on_eop(&mut self) -> FramerAction {
        match self.state {
            BusState::Payload(pid) => {
                self.state = BusState::Idle;
                FramerAction::End(pid)
            }
            BusState::Pid | BusState::SkipToEop => {
                self.state = BusState::Idle;
                FramerAction::Ignored
            }
            _ => FramerAction::Ignored,
        }
    }

    /// The receiver hit a bit-stuffing violation.
    pub fn on_error(&mut self) {
        if matches!(
            self.state,
            BusState::Pid | BusState::Payload(_) | BusState::Idle
        ) {
            self.state = BusState::SkipToEop;
        }
    }
}
