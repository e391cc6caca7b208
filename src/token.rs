//! Token packets.
//!
//! A token is a PID plus two payload bytes carrying an 11-bit field
//! (7-bit address and 4-bit endpoint, or an 11-bit frame number for SOF)
//! and a 5-bit CRC. The decoder latches the two bytes, checks the CRC5
//! field against the 11-bit payload, gates on the device address, and
//! classifies the result.

#![allow(non_snake_case, non_upper_case_globals)]

use ral_registers::{read_reg, write_reg};

use crate::crc::Crc5;
use crate::pid::Pid;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// Token kinds that open a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TokenKind {
    Out,
    In,
    Setup,
}

/// A token that survived CRC and address gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TokenEvent {
    /// Start of frame, with the 11-bit frame number. No endpoint action.
    Sof { frame: u16 },
    /// A transaction opener addressed to this device.
    Token { kind: TokenKind, endpoint: u8 },
}

/// Plain latch conforming to the register macros' read/write contract.
///
/// Nothing writes this word behind the compiler's back, so unlike a
/// hardware register it needs no volatile access.
#[repr(transparent)]
struct Latch(u32);

impl Latch {
    const fn new(val: u32) -> Self {
        Latch(val)
    }

    fn read(&self) -> u32 {
        self.0
    }

    fn write(&mut self, val: u32) {
        self.0 = val;
    }
}

/// The token word as latched off the wire: bits 0..=7 are the first
/// payload byte, bits 8..=15 the second.
#[repr(transparent)]
struct TokenWord {
    WORD: Latch,
}

mod WORD {
    pub mod ADDRESS {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0x7F << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    pub mod ENDPOINT {
        pub const offset: u32 = 7;
        pub const mask: u32 = 0xF << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    pub mod CRC5 {
        pub const offset: u32 = 11;
        pub const mask: u32 = 0x1F << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    pub mod FRAME {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0x7FF << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}

impl TokenWord {
    const fn new() -> Self {
        TokenWord {
            WORD: Latch::new(0),
        }
    }

    fn load(&mut self, low: u8, high: u8) {
        write_reg!(crate::token, self, WORD, (low as u32) | ((high as u32) << 8));
    }

    fn address(&self) -> u8 {
        read_reg!(crate::token, self, WORD, ADDRESS) as u8
    }

    fn endpoint(&self) -> u8 {
        read_reg!(crate::token, self, WORD, ENDPOINT) as u8
    }

    fn frame(&self) -> u16 {
        read_reg!(crate::token, self, WORD, FRAME) as u16
    }

    fn check(&self) -> u8 {
        read_reg!(crate::token, self, WORD, CRC5) as u8
    }
}

const _: [(); 1] = [(); (core::mem::size_of::<TokenWord>() == 4) as usize];

/// Two-byte accumulator and classifier for token payloads.
pub struct TokenDecoder {
    word: TokenWord,
    bytes: [u8; 2],
    have: u8,
    overrun: bool,
}

impl TokenDecoder {
    pub const fn new() -> Self {
        TokenDecoder {
            word: TokenWord::new(),
            bytes: [0; 2],
            have: 0,
            overrun: false,
        }
    }

    /// Arm for a fresh token payload.
    pub fn begin(&mut self) {
        self.have = 0;
        self.overrun = false;
    }

    pub fn push(&mut self, byte: u8) {
        if self.have < 2 {
            self.bytes[self.have as usize] = byte;
            self.have += 1;
        } else {
            // A token carries exactly two payload bytes; anything more
            // condemns the packet.
            self.overrun = true;
        }
    }

    /// Close out the token at EOP.
    ///
    /// Returns `None` for every silent-discard condition: wrong payload
    /// length, CRC5 failure, or an address that is not ours. The host
    /// never learns which; it just sees no response.
    pub fn finish(&mut self, pid: Pid, device_address: u8) -> Option<TokenEvent> {
        let have = core::mem::replace(&mut self.have, 0);
        if have != 2 || self.overrun {
            debug!("TOKEN length bad");
            return None;
        }

        self.word.load(self.bytes[0], self.bytes[1]);

        // CRC5 covers the 11-bit field; FRAME spans exactly those bits.
        let mut crc = Crc5::new();
        crc.update_bits(self.word.frame(), 11);
        if crc.transmit() != self.word.check() {
            debug!("TOKEN CRC5 bad");
            return None;
        }

        if pid == Pid::Sof {
            return Some(TokenEvent::Sof {
                frame: self.word.frame(),
            });
        }

        if self.word.address() != device_address {
            // Addressed elsewhere: the whole transaction is not ours.
            return None;
        }

        let kind = match pid {
            Pid::Out => TokenKind::Out,
            Pid::In => TokenKind::In,
            Pid::Setup => TokenKind::Setup,
            _ => return None,
        };
        Some(TokenEvent::Token {
            kind,
            endpoint: self.word.endpoint(),
        })
    }
}
