//! Receive half of the line codec.

use super::{STUFF_LIMIT, SYNC_BYTE};
use crate::line::LineState;

/// What the receiver observed during one tick.
///
/// At most one field fires per tick: SYNC completes on its final bit,
/// bytes complete on data bits, EOP completes on the closing J.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RxEvents {
    /// SYNC pattern completed; a packet is starting.
    pub sop: bool,
    /// A de-stuffed byte finished assembling.
    pub byte: Option<u8>,
    /// End-of-packet sequence observed.
    pub eop: bool,
    /// Seventh consecutive 1: the packet in progress is dead.
    pub stuff_error: bool,
}

/// Clock recovery, NRZI decode, de-stuffing, and byte assembly.
#[derive(Debug)]
pub struct Receiver {
    samples_per_bit: u32,
    phase: u32,
    /// Dominant-wire level at the previous tick, for edge detection.
    last_level: bool,
    /// Dominant-wire level at the previous bit sample, the NRZI reference.
    bit_level: bool,
    /// Last eight decoded bits, newest in bit 7; compared against SYNC.
    /// Rests at all-ones, the idle-line decode, so a lone 1 bit right
    /// after a clear cannot impersonate the 0000000,1 pattern.
    window: u8,
    shift: u8,
    nbits: u8,
    ones: u8,
    in_packet: bool,
    /// Consecutive SE0 bit samples, for the EOP window.
    se0_bits: u8,
}

impl Receiver {
    pub const fn new(samples_per_bit: u32) -> Self {
        Receiver {
            samples_per_bit,
            phase: 0,
            last_level: true,
            bit_level: true,
            window: 0xFF,
            shift: 0,
            nbits: 0,
            ones: 0,
            in_packet: false,
            se0_bits: 0,
        }
    }

    /// Drop any packet in progress and re-arm the SYNC hunt.
    ///
    /// Used when the device takes the bus for its own transmission and
    /// when the bus resets; the receiver comes back as if freshly idle.
    pub fn restart(&mut self) {
        self.phase = 0;
        self.last_level = true;
        self.bit_level = true;
        self.window = 0xFF;
        self.nbits = 0;
        self.ones = 0;
        self.in_packet = false;
        self.se0_bits = 0;
    }

    /// Process one line sample.
    pub fn tick(&mut self, line: LineState) -> RxEvents {
        let mut events = RxEvents::default();
        let level = line.data_level();
        if level != self.last_level {
            self.last_level = level;
            // Re-center: the next bit sample lands half a period away.
            self.phase = self.samples_per_bit.div_ceil(2);
        } else {
            self.phase += 1;
        }
        if self.phase >= self.samples_per_bit {
            self.phase = 0;
            self.bit_sample(line, &mut events);
        }
        events
    }

    fn bit_sample(&mut self, line: LineState, events: &mut RxEvents) {
        match line {
            LineState::Se0 => {
                // Not data; counts toward the EOP window.
                self.se0_bits = self.se0_bits.saturating_add(1);
                return;
            }
            LineState::Se1 => {
                // Illegal on the bus; never data.
                self.se0_bits = 0;
                return;
            }
            _ => {}
        }

        let se0_run = core::mem::replace(&mut self.se0_bits, 0);
        if line == LineState::J && se0_run >= 2 {
            // SE0, SE0, J: terminates reception regardless of alignment.
            events.eop = true;
            self.in_packet = false;
            self.window = 0xFF;
            self.nbits = 0;
            self.bit_level = true;
            return;
        }

        let level = line.data_level();
        let bit = level == self.bit_level;
        self.bit_level = level;

        if !self.in_packet {
            self.window = (self.window >> 1) | ((bit as u8) << 7);
            if self.window == SYNC_BYTE {
                events.sop = true;
                self.in_packet = true;
                self.window = 0xFF;
                self.shift = 0;
                self.nbits = 0;
                // The 1 ending SYNC counts toward the first stuff run.
                self.ones = 1;
            }
            return;
        }

        if self.ones == STUFF_LIMIT {
            self.ones = 0;
            if bit {
                // Seventh consecutive 1; only a stuffed 0 is legal here.
                events.stuff_error = true;
                self.in_packet = false;
                self.window = 0xFF;
            }
            // The stuffed 0 is discarded, not shifted into the byte.
            return;
        }

        if bit {
            self.ones += 1;
        } else {
            self.ones = 0;
        }
        self.shift = (self.shift >> 1) | ((bit as u8) << 7);
        self.nbits += 1;
        if self.nbits == 8 {
            self.nbits = 0;
            events.byte = Some(self.shift);
        }
    }
}
