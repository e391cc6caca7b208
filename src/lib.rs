//! A software USB 1.x device stack.
//!
//! `softusb` implements full- and low-speed USB device signaling in
//! software, from NRZI bits on D+/D- up through an endpoint 0 control
//! pipe that enumerates against a standard host. There is no USB
//! peripheral underneath: every call to [`Device::tick`] consumes one
//! raw pin sample and returns one pin drive, so any transceiver that
//! can be sampled at a fixed multiple of the bit rate can carry the
//! stack. Descriptors come from a [`descriptor::DescriptorStore`], and
//! traffic on non-zero endpoints goes through
//! [`endpoint::EndpointHandler`] implementations. See each module for
//! the layer it implements.
//!
//! ```no_run
//! use softusb::{Config, Device};
//! use softusb::descriptor::StaticDescriptors;
//! use softusb::line::PinState;
//!
//! static DESCRIPTORS: &[u8] = &[
//!     // device, configuration, and string descriptors, back to back
//! ];
//!
//! let mut device = Device::new(Config::full_speed(48_000_000), StaticDescriptors::new(DESCRIPTORS));
//! device.attach();
//! loop {
//!     let pins = PinState { dp: false, dm: false }; // sample the transceiver
//!     let drive = device.tick(pins);
//!     // apply `drive` back to the transceiver
//! }
//! ```

#![no_std]

// The defmt macros expand to paths under the literal name `defmt`, so
// the renamed crate has to be reachable under that name.
#[cfg(feature = "defmt-03")]
use defmt_03 as defmt;

#[macro_use]
mod log;

mod framer;

pub mod bus;
pub mod control;
pub mod crc;
pub mod data;
pub mod descriptor;
pub mod device;
pub mod endpoint;
pub mod line;
pub mod phy;
pub mod pid;
pub mod token;

pub use crate::device::{BusEvents, Device};

/// Bus signaling rate.
///
/// The speed decides line polarity (low speed swaps D+ and D-) and the
/// default endpoint 0 packet limit. It does not decide the tick rate;
/// that comes from [`Config::samples_per_bit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Speed {
    /// 12 Mb/s.
    Full,
    /// 1.5 Mb/s.
    Low,
}

/// Timing and sizing for a [`Device`].
///
/// All durations are in ticks of the caller's sample clock. The
/// constructors derive them from the clock rate; build the struct by
/// hand for unusual timing.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub speed: Speed,
    /// Line samples per bit time. Four or more for reliable recovery.
    pub samples_per_bit: u32,
    /// SE0 ticks before the device treats the line as a bus reset.
    pub reset_ticks: u32,
    /// Idle ticks before the device reports a suspend.
    pub suspend_ticks: u32,
    /// Endpoint 0 packet payload limit, as in the device descriptor.
    pub ep0_max_packet: u8,
}

impl Config {
    /// Full speed at the given sample rate: reset after 2.5 ms of SE0,
    /// suspend after 3 ms of idle. The rate should be an exact multiple
    /// of 12 MHz; 48 MHz gives the usual four samples per bit.
    pub const fn full_speed(sample_rate_hz: u32) -> Self {
        Config {
            speed: Speed::Full,
            samples_per_bit: sample_rate_hz / 12_000_000,
            reset_ticks: sample_rate_hz / 400,
            suspend_ticks: 3 * (sample_rate_hz / 1000),
            ep0_max_packet: 64,
        }
    }

    /// Low speed at the given sample rate: 1.5 Mb/s bit timing, the
    /// same wall clock thresholds as [`full_speed`](Config::full_speed).
    pub const fn low_speed(sample_rate_hz: u32) -> Self {
        Config {
            speed: Speed::Low,
            samples_per_bit: sample_rate_hz / 1_500_000,
            reset_ticks: sample_rate_hz / 400,
            suspend_ticks: 3 * (sample_rate_hz / 1000),
            ep0_max_packet: 8,
        }
    }
}
