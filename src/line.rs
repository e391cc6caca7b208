//! Differential line interface.
//!
//! Everything at this layer deals in raw D+/D- levels: classifying a pin
//! sample into one of the four line states, synchronizing the asynchronous
//! pins into the tick domain, and tracking how long the bus has been parked
//! in a state (reset and suspend are defined by wall-clock durations, not
//! by packet traffic).

use crate::Speed;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// A raw D+/D- input sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct PinState {
    /// D+ level.
    pub dp: bool,
    /// D- level.
    pub dm: bool,
}

/// Transceiver output for one tick.
///
/// When `output_enable` is clear the data pins are released and their
/// values are meaningless. `pull_up` asserts the device presence resistor;
/// which wire it belongs on (D+ at full speed, D- at low speed) is fixed
/// by the configured [`Speed`](crate::Speed), so board glue routes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct PinDrive {
    /// D+ level to drive.
    pub dp: bool,
    /// D- level to drive.
    pub dm: bool,
    /// Drive the data pins when set; release the bus when clear.
    pub output_enable: bool,
    /// Assert the speed-appropriate presence pull-up.
    pub pull_up: bool,
}

/// The four differential line states.
///
/// `J` is the idle polarity. Which physical wire is high during `J`
/// depends on the speed: D+ at full speed, D- at low speed. `Se1` (both
/// wires high) is illegal on a USB bus and only ever observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum LineState {
    /// Idle polarity.
    J,
    /// Inverted polarity.
    K,
    /// Single-ended zero: both wires low.
    Se0,
    /// Single-ended one: both wires high. Illegal, receive-only.
    Se1,
}

impl LineState {
    /// Classify a (synchronized) pin sample.
    pub fn from_pins(pins: PinState, speed: Speed) -> Self {
        match (pins.dp, pins.dm) {
            (false, false) => LineState::Se0,
            (true, true) => LineState::Se1,
            (dp, _) => {
                // Exactly one wire high: J when it is the idle-high wire.
                let idle_high = match speed {
                    Speed::Full => dp,
                    Speed::Low => !dp,
                };
                if idle_high {
                    LineState::J
                } else {
                    LineState::K
                }
            }
        }
    }

    /// Pin levels that signal this state.
    pub fn to_pins(self, speed: Speed) -> PinState {
        let (dp, dm) = match (self, speed) {
            (LineState::Se0, _) => (false, false),
            (LineState::Se1, _) => (true, true),
            (LineState::J, Speed::Full) | (LineState::K, Speed::Low) => (true, false),
            (LineState::K, Speed::Full) | (LineState::J, Speed::Low) => (false, true),
        };
        PinState { dp, dm }
    }

    /// Level of the dominant data wire (D+ at full speed, D- at low
    /// speed), as seen through the J/K mapping. Edge detection and NRZI
    /// reference both key off this.
    pub(crate) fn data_level(self) -> bool {
        matches!(self, LineState::J | LineState::Se1)
    }
}

/// Input synchronizer depth.
const SYNC_STAGES: u32 = 3;

/// Shift-register synchronizer for the raw pins.
///
/// The pins toggle asynchronously to the sample clock; every sample
/// passes through a fixed-depth shift register per wire before anything
/// downstream sees it.
#[derive(Debug, Default)]
pub struct PinSync {
    dp: u8,
    dm: u8,
}

impl PinSync {
    pub const fn new() -> Self {
        PinSync { dp: 0, dm: 0 }
    }

    /// Shift in a raw sample, returning the synchronized one.
    pub fn sample(&mut self, raw: PinState) -> PinState {
        self.dp = (self.dp << 1) | raw.dp as u8;
        self.dm = (self.dm << 1) | raw.dm as u8;
        PinState {
            dp: self.dp & (1 << (SYNC_STAGES - 1)) != 0,
            dm: self.dm & (1 << (SYNC_STAGES - 1)) != 0,
        }
    }
}

/// Long-duration line condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum LineCondition {
    /// Neither threshold reached.
    Normal,
    /// Idle (J) held at least the suspend threshold.
    Suspend,
    /// SE0 held at least the reset threshold.
    Reset,
}

/// Duration tracker for suspend and reset signaling.
///
/// Counts consecutive ticks of SE0 and of idle J. The thresholds come in
/// as tick counts; [`crate::Config`] derives them from the sample rate
/// and the wall-clock durations (2.5 ms of SE0 for reset, 3 ms of J
/// for suspend).
#[derive(Debug)]
pub struct LineMonitor {
    se0_ticks: u32,
    j_ticks: u32,
    reset_after: u32,
    suspend_after: u32,
}

impl LineMonitor {
    pub const fn new(reset_after: u32, suspend_after: u32) -> Self {
        LineMonitor {
            se0_ticks: 0,
            j_ticks: 0,
            reset_after,
            suspend_after,
        }
    }

    /// Account one tick of `line`, reporting the condition it sustains.
    ///
    /// The report is level-sensitive: it stays `Reset` / `Suspend` for as
    /// long as the line holds, and drops back to `Normal` on the first
    /// tick after the line moves.
    pub fn tick(&mut self, line: LineState) -> LineCondition {
        match line {
            LineState::Se0 => {
                self.se0_ticks = self.se0_ticks.saturating_add(1);
                self.j_ticks = 0;
            }
            LineState::J => {
                self.j_ticks = self.j_ticks.saturating_add(1);
                self.se0_ticks = 0;
            }
            _ => {
                self.se0_ticks = 0;
                self.j_ticks = 0;
            }
        }
        if self.se0_ticks >= self.reset_after {
            LineCondition::Reset
        } else if self.j_ticks >= self.suspend_after {
            LineCondition::Suspend
        } else {
            LineCondition::Normal
        }
    }
}

#[cfg(test)]
mod test {
    use super::{LineCondition, LineMonitor, LineState, PinState, PinSync};
    use crate::Speed;

    const HIGH_LOW: PinState = PinState { dp: true, dm: false };
    const LOW_HIGH: PinState = PinState { dp: false, dm: true };
    const BOTH_LOW: PinState = PinState { dp: false, dm: false };
    const BOTH_HIGH: PinState = PinState { dp: true, dm: true };

    #[test]
    fn classify_full_speed() {
        assert_eq!(LineState::from_pins(HIGH_LOW, Speed::Full), LineState::J);
        assert_eq!(LineState::from_pins(LOW_HIGH, Speed::Full), LineState::K);
        assert_eq!(LineState::from_pins(BOTH_LOW, Speed::Full), LineState::Se0);
        assert_eq!(LineState::from_pins(BOTH_HIGH, Speed::Full), LineState::Se1);
    }

    #[test]
    fn classify_low_speed_swaps_polarity() {
        assert_eq!(LineState::from_pins(HIGH_LOW, Speed::Low), LineState::K);
        assert_eq!(LineState::from_pins(LOW_HIGH, Speed::Low), LineState::J);
        assert_eq!(LineState::from_pins(BOTH_LOW, Speed::Low), LineState::Se0);
    }

    #[test]
    fn pins_round_trip() {
        for speed in [Speed::Full, Speed::Low] {
            for state in [LineState::J, LineState::K, LineState::Se0] {
                assert_eq!(LineState::from_pins(state.to_pins(speed), speed), state);
            }
        }
    }

    #[test]
    fn synchronizer_delays_by_stage_count() {
        let mut sync = PinSync::new();
        assert_eq!(sync.sample(BOTH_HIGH), BOTH_LOW);
        assert_eq!(sync.sample(BOTH_HIGH), BOTH_LOW);
        // Third stage: the first sample reaches the output.
        assert_eq!(sync.sample(BOTH_HIGH), BOTH_HIGH);
        assert_eq!(sync.sample(BOTH_LOW), BOTH_HIGH);
        assert_eq!(sync.sample(BOTH_LOW), BOTH_HIGH);
        assert_eq!(sync.sample(BOTH_LOW), BOTH_LOW);
    }

    #[test]
    fn reset_fires_after_threshold() {
        let mut monitor = LineMonitor::new(5, 8);
        for _ in 0..4 {
            assert_eq!(monitor.tick(LineState::Se0), LineCondition::Normal);
        }
        assert_eq!(monitor.tick(LineState::Se0), LineCondition::Reset);
        assert_eq!(monitor.tick(LineState::Se0), LineCondition::Reset);
        assert_eq!(monitor.tick(LineState::J), LineCondition::Normal);
    }

    #[test]
    fn suspend_fires_after_idle_threshold() {
        let mut monitor = LineMonitor::new(5, 8);
        for _ in 0..7 {
            assert_eq!(monitor.tick(LineState::J), LineCondition::Normal);
        }
        assert_eq!(monitor.tick(LineState::J), LineCondition::Suspend);
        // Any activity clears it.
        assert_eq!(monitor.tick(LineState::K), LineCondition::Normal);
    }

    #[test]
    fn interruptions_restart_the_count() {
        let mut monitor = LineMonitor::new(3, 100);
        monitor.tick(LineState::Se0);
        monitor.tick(LineState::Se0);
        monitor.tick(LineState::K);
        assert_eq!(monitor.tick(LineState::Se0), LineCondition::Normal);
        assert_eq!(monitor.tick(LineState::Se0), LineCondition::Normal);
        assert_eq!(monitor.tick(LineState::Se0), LineCondition::Reset);
    }
}
