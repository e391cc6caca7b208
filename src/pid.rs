//! Packet identifiers.
//!
//! Every packet starts with a PID byte: the 4-bit identifier in the low
//! nibble and its ones-complement in the high nibble. The complement pair
//! is the only integrity check a PID gets, so [`Pid::from_byte`] refuses
//! bytes where the pair does not hold.

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// 1.x packet identifiers, by their 4-bit nibble value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u8)]
pub enum Pid {
    Out = 0b0001,
    In = 0b1001,
    Sof = 0b0101,
    Setup = 0b1101,
    Data0 = 0b0011,
    Data1 = 0b1011,
    Ack = 0b0010,
    Nak = 0b1010,
    Stall = 0b1110,
    /// Low-speed preamble marker. Recognized so it can be skipped; this
    /// engine never acts on it.
    Pre = 0b1100,
}

impl Pid {
    /// Decode a bare nibble (low four bits).
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble & 0xF {
            0b0001 => Pid::Out,
            0b1001 => Pid::In,
            0b0101 => Pid::Sof,
            0b1101 => Pid::Setup,
            0b0011 => Pid::Data0,
            0b1011 => Pid::Data1,
            0b0010 => Pid::Ack,
            0b1010 => Pid::Nak,
            0b1110 => Pid::Stall,
            0b1100 => Pid::Pre,
            _ => return None,
        })
    }

    /// Decode a wire byte, enforcing the nibble/complement pair.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let nibble = byte & 0xF;
        if nibble ^ (byte >> 4) != 0xF {
            return None;
        }
        Self::from_nibble(nibble)
    }

    /// Wire byte: nibble plus complement.
    pub fn byte(self) -> u8 {
        let nibble = self as u8;
        nibble | ((!nibble & 0xF) << 4)
    }

    /// Token coding group: names an address/endpoint (or frame number).
    pub fn is_token(self) -> bool {
        matches!(self, Pid::Out | Pid::In | Pid::Sof | Pid::Setup)
    }

    pub fn is_data(self) -> bool {
        matches!(self, Pid::Data0 | Pid::Data1)
    }

    pub fn is_handshake(self) -> bool {
        matches!(self, Pid::Ack | Pid::Nak | Pid::Stall)
    }

    /// DATA0/DATA1 parity bit, for data PIDs only.
    pub fn data_parity(self) -> Option<bool> {
        match self {
            Pid::Data0 => Some(false),
            Pid::Data1 => Some(true),
            _ => None,
        }
    }

    /// Data PID for a toggle value.
    pub fn for_parity(parity: bool) -> Self {
        if parity {
            Pid::Data1
        } else {
            Pid::Data0
        }
    }
}
