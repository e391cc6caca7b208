//! Transmit half of the line codec.

use super::{STUFF_LIMIT, SYNC_BYTE};
use crate::line::LineState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    /// SYNC and data bytes shifting out.
    Stream,
    /// Second SE0 bit of EOP.
    EopSe0,
    /// Closing J bit of EOP.
    EopJ,
    /// Bus released; the transmitter stays active through the boundary
    /// into the idle bit that follows EOP.
    Holdoff,
}

/// NRZI encoder with bit stuffing, SYNC prefix, and EOP generation.
///
/// One packet per [`start`](Self::start): the caller's pull closure
/// supplies the PID byte first, then payload bytes, and `None` to close
/// the packet. The pull happens at byte boundaries of the bit clock, so
/// a source that streams (a descriptor read, an endpoint FIFO) is asked
/// for exactly one byte per byte period.
#[derive(Debug)]
pub struct Transmitter {
    samples_per_bit: u32,
    phase: u32,
    state: State,
    shift: u8,
    bits_left: u8,
    ones: u8,
    /// Current NRZI level; true is the J polarity.
    level: bool,
    output: Option<LineState>,
}

impl Transmitter {
    pub const fn new(samples_per_bit: u32) -> Self {
        Transmitter {
            samples_per_bit,
            phase: 0,
            state: State::Idle,
            shift: 0,
            bits_left: 0,
            ones: 0,
            level: true,
            output: None,
        }
    }

    /// Begin a packet. The SYNC pattern goes out first; the pull closure
    /// passed to [`tick`](Self::tick) takes over at the next byte
    /// boundary.
    pub fn start(&mut self) {
        self.state = State::Stream;
        self.shift = SYNC_BYTE;
        self.bits_left = 8;
        self.ones = 0;
        self.level = true;
        self.phase = 0;
        self.output = None;
    }

    /// Drop everything and release the bus. For bus reset, which cancels
    /// any transmission in flight.
    pub fn abort(&mut self) {
        self.state = State::Idle;
        self.output = None;
    }

    /// True from [`start`](Self::start) until the packet, EOP included,
    /// has fully left the wire.
    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    /// Advance one tick. Returns the line state to drive, or `None` when
    /// the bus should be released.
    pub fn tick(&mut self, mut pull: impl FnMut() -> Option<u8>) -> Option<LineState> {
        if self.state == State::Idle {
            return None;
        }
        if self.phase == 0 {
            self.advance_bit(&mut pull);
        }
        self.phase += 1;
        if self.phase >= self.samples_per_bit {
            self.phase = 0;
        }
        self.output
    }

    /// Choose the line state for the next bit period.
    fn advance_bit(&mut self, pull: &mut impl FnMut() -> Option<u8>) {
        match self.state {
            State::Idle => {}
            State::Stream => {
                if self.ones == STUFF_LIMIT {
                    // Stuffed 0, inserted even when EOP would follow.
                    self.ones = 0;
                    self.level = !self.level;
                } else {
                    if self.bits_left == 0 {
                        match pull() {
                            Some(byte) => {
                                self.shift = byte;
                                self.bits_left = 8;
                            }
                            None => {
                                // First SE0 bit of EOP.
                                self.state = State::EopSe0;
                                self.output = Some(LineState::Se0);
                                return;
                            }
                        }
                    }
                    let bit = self.shift & 1 != 0;
                    self.shift >>= 1;
                    self.bits_left -= 1;
                    if bit {
                        self.ones += 1;
                    } else {
                        self.ones = 0;
                        self.level = !self.level;
                    }
                }
                self.output = Some(if self.level {
                    LineState::J
                } else {
                    LineState::K
                });
            }
            State::EopSe0 => {
                self.state = State::EopJ;
                self.output = Some(LineState::Se0);
            }
            State::EopJ => {
                self.state = State::Holdoff;
                self.output = Some(LineState::J);
            }
            State::Holdoff => {
                self.state = State::Idle;
                self.output = None;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Transmitter;
    use crate::line::LineState;
    use heapless::Vec;

    fn drain(tx: &mut Transmitter, bytes: &[u8]) -> Vec<Option<LineState>, 256> {
        let mut pending = bytes.iter().copied();
        let mut out = Vec::new();
        while tx.is_active() {
            out.push(tx.tick(|| pending.next())).unwrap();
        }
        out
    }

    #[test]
    fn idle_until_started() {
        let mut tx = Transmitter::new(1);
        assert!(!tx.is_active());
        assert_eq!(tx.tick(|| None), None);
    }

    #[test]
    fn packet_ends_released_and_inactive() {
        let mut tx = Transmitter::new(1);
        tx.start();
        let out = drain(&mut tx, &[0xD2]);
        // 8 SYNC + 8 data + 2 SE0 + J, then the released holdoff bit.
        assert_eq!(out.len(), 20);
        assert_eq!(out[out.len() - 1], None);
        assert_eq!(out[out.len() - 2], Some(LineState::J));
        assert_eq!(out[out.len() - 3], Some(LineState::Se0));
        assert_eq!(out[out.len() - 4], Some(LineState::Se0));
        assert!(!tx.is_active());
    }

    #[test]
    fn no_run_exceeds_the_stuff_limit() {
        let mut tx = Transmitter::new(1);
        tx.start();
        let out = drain(&mut tx, &[0xFF, 0xFF, 0xFF]);
        let mut run = 0;
        let mut longest = 0;
        let mut last = None;
        for state in out.iter().flatten() {
            if Some(state) == last {
                run += 1;
            } else {
                run = 1;
                last = Some(state);
            }
            longest = longest.max(run);
        }
        // Six held levels is a run of seven samples of the same state at
        // one sample per bit; the stuffed 0 must break anything longer.
        assert!(longest <= 7, "wire held a level for {longest} bit times");
    }

    #[test]
    fn abort_releases_immediately() {
        let mut tx = Transmitter::new(4);
        tx.start();
        tx.tick(|| Some(0xC3));
        assert!(tx.is_active());
        tx.abort();
        assert!(!tx.is_active());
        assert_eq!(tx.tick(|| Some(0xC3)), None);
    }

    #[test]
    fn each_bit_lasts_samples_per_bit_ticks() {
        let mut tx = Transmitter::new(4);
        tx.start();
        let mut pending = [0x0F].iter().copied();
        let mut states: Vec<LineState, 256> = Vec::new();
        while tx.is_active() {
            if let Some(s) = tx.tick(|| pending.next()) {
                states.push(s).unwrap();
            }
        }
        // 8 SYNC + 8 data + 3 EOP driven bits, 4 samples each.
        assert_eq!(states.len(), 19 * 4);
        for chunk in states.chunks(4) {
            assert!(chunk.iter().all(|s| *s == chunk[0]));
        }
    }
}
