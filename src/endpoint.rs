//! Endpoint-facing contract and per-endpoint bookkeeping.
//!
//! Non-zero endpoints plug higher-layer logic (a HID report queue, a
//! vendor pipe) into the engine through [`EndpointHandler`], the same
//! signal bundle endpoint 0 consumes internally, so adding endpoints
//! never touches the framer.

use usb_device::endpoint::EndpointAddress;
use usb_device::UsbDirection;

use crate::token::TokenKind;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// Endpoint numbers run 0..16, each with an IN and an OUT side.
pub const MAX_ENDPOINTS: usize = 16;

/// Accept/refuse decision for a received data packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Handshake {
    Ack,
    Nak,
}

/// Higher-layer endpoint logic.
///
/// The engine drives these callbacks in a strict order: a token opens a
/// transaction with [`transaction_start`](Self::transaction_start), then
/// either the rx callbacks run (OUT data) or the tx pulls run (IN data),
/// and each data packet settles before the next token for the endpoint
/// is processed.
pub trait EndpointHandler {
    /// A token addressed to this endpoint opened a transaction.
    fn transaction_start(&mut self, kind: TokenKind);

    /// Next payload byte of an incoming data packet.
    ///
    /// Bytes stream in before the packet's checksum verdict exists; hold
    /// them provisionally until [`rx_complete`](Self::rx_complete), and
    /// discard them if it never comes.
    fn rx_byte(&mut self, byte: u8);

    /// The incoming packet passed its CRC and toggle checks.
    ///
    /// Return [`Handshake::Ack`] to commit it, or [`Handshake::Nak`]
    /// when there's no room. A refused packet leaves the toggle alone,
    /// and the host retries the same data.
    fn rx_complete(&mut self) -> Handshake;

    /// Is a packet ready for the next IN token? `false` NAKs the token.
    fn tx_ready(&self) -> bool;

    /// Pull the next outgoing byte; `None` ends the packet. Only
    /// consulted for a packet's first transmission; retries replay a
    /// buffered copy.
    fn tx_byte(&mut self) -> Option<u8>;

    /// The host acknowledged the most recently transmitted packet;
    /// advance past the bytes already pulled.
    fn tx_acked(&mut self);
}

/// Toggle-word bit position for an endpoint and direction.
fn index(ep_addr: EndpointAddress) -> usize {
    (ep_addr.index() * 2) + (UsbDirection::In == ep_addr.direction()) as usize
}

/// One data-toggle bit per endpoint direction, packed into a word.
#[derive(Debug)]
pub(crate) struct Toggles(u32);

impl Toggles {
    pub const fn new() -> Self {
        Toggles(0)
    }

    /// Parity expected (rx) or transmitted next (tx).
    pub fn expected(&self, ep_addr: EndpointAddress) -> bool {
        self.0 & (1 << index(ep_addr)) != 0
    }

    pub fn set(&mut self, ep_addr: EndpointAddress, parity: bool) {
        let bit = 1 << index(ep_addr);
        if parity {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn flip(&mut self, ep_addr: EndpointAddress) {
        self.0 ^= 1 << index(ep_addr);
    }

    /// Bus reset: everything back to DATA0.
    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Configuration change: non-zero endpoints back to DATA0. Endpoint
    /// 0 keeps its state, since the control transfer carrying the
    /// request is still in flight.
    pub fn reset_non_zero(&mut self) {
        self.0 &= 0b11;
    }
}

#[cfg(test)]
mod test {
    use super::Toggles;
    use usb_device::endpoint::EndpointAddress;
    use usb_device::UsbDirection;

    fn out(index: usize) -> EndpointAddress {
        EndpointAddress::from_parts(index, UsbDirection::Out)
    }

    fn into(index: usize) -> EndpointAddress {
        EndpointAddress::from_parts(index, UsbDirection::In)
    }

    #[test]
    fn directions_are_independent() {
        let mut toggles = Toggles::new();
        toggles.set(out(1), true);
        assert!(toggles.expected(out(1)));
        assert!(!toggles.expected(into(1)));
        assert!(!toggles.expected(out(2)));
    }

    #[test]
    fn flip_alternates() {
        let mut toggles = Toggles::new();
        assert!(!toggles.expected(into(0)));
        toggles.flip(into(0));
        assert!(toggles.expected(into(0)));
        toggles.flip(into(0));
        assert!(!toggles.expected(into(0)));
    }

    #[test]
    fn reset_non_zero_spares_endpoint_zero() {
        let mut toggles = Toggles::new();
        toggles.set(out(0), true);
        toggles.set(into(0), true);
        toggles.set(out(3), true);
        toggles.set(into(7), true);
        toggles.reset_non_zero();
        assert!(toggles.expected(out(0)));
        assert!(toggles.expected(into(0)));
        assert!(!toggles.expected(out(3)));
        assert!(!toggles.expected(into(7)));
    }
}
