//! Endpoint 0 control transfer engine.
//!
//! Runs the three-stage control transfer: an 8-byte setup packet, an
//! optional data stage in either direction, and a status stage in the
//! opposite direction. Standard device requests are served internally
//! (descriptors stream out of a [`DescriptorStore`]); everything else
//! gets the zero-length answer.
//!
//! Two rules shape the whole module. A SETUP token preempts anything,
//! from any state. And side effects (the device address, the selected
//! configuration) latch as *pending* at dispatch and commit only once
//! the status-stage packet has gone out on the wire, so the device never
//! answers a transfer from a half-applied identity.

use usb_device::control::{Recipient, Request, RequestType};
use usb_device::descriptor::descriptor_type;
use usb_device::UsbDirection;

use crate::descriptor::DescriptorStore;
use crate::endpoint::Handshake;

#[cfg(feature = "defmt-03")]
use crate::defmt;

/// Control transfer progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub(crate) enum ControlState {
    Idle,
    /// SETUP token seen, accumulating the 8 setup bytes.
    ReceiveSetup,
    /// Device-to-host request dispatched, waiting for the first IN.
    WaitSendData,
    /// Streaming response packets to the host.
    SendData,
    /// Response sent, waiting for the host's zero-length OUT.
    ReceiveStatus,
    /// Host-to-device request with a data stage, waiting for OUT data.
    WaitReceiveData,
    /// Absorbing host data packets.
    ReceiveData,
    /// Waiting for the IN that carries our zero-length status.
    SendStatus,
}

/// What to do with an IN token for endpoint 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InAction {
    /// Send the next data-stage packet ([`ControlPipe::next_in_byte`]
    /// sources its bytes).
    Data,
    /// Send the zero-length status packet.
    Status,
    /// Nothing to give.
    Nak,
}

/// What to do with an OUT token for endpoint 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutAction {
    /// Accept a data-stage packet.
    Data,
    /// Accept the zero-length status packet.
    Status,
    /// Not expecting anything; let the packet pass unanswered.
    Ignore,
}

/// Side effect applied at the status-stage boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatusCommit {
    None,
    Addressed(u8),
    Configured(u8),
}

/// Where data-stage bytes come from.
enum Source {
    Empty,
    Store { offset: u32 },
    Internal { bytes: [u8; 2], cursor: u8 },
}

impl Source {
    fn read<S: DescriptorStore>(&self, store: &S, ahead: u8) -> u8 {
        match self {
            Source::Empty => 0,
            Source::Store { offset } => store.read(offset + u32::from(ahead)),
            Source::Internal { bytes, cursor } => bytes
                .get(usize::from(cursor + ahead))
                .copied()
                .unwrap_or(0),
        }
    }

    fn advance(&mut self, sent: u8) {
        match self {
            Source::Empty => {}
            Source::Store { offset } => *offset += u32::from(sent),
            Source::Internal { cursor, .. } => *cursor += sent,
        }
    }
}

pub(crate) struct ControlPipe {
    state: ControlState,
    max_packet: u8,
    setup: [u8; 8],
    setup_len: u8,
    address: u8,
    pending_address: Option<u8>,
    configuration: u8,
    pending_configuration: Option<u8>,
    source: Source,
    /// Bytes of the data stage not yet acknowledged by the host.
    remaining: u16,
    /// A full-size final packet needs a zero-length terminator.
    need_zlp: bool,
    /// Byte budget of the packet being assembled.
    quota: u8,
    /// Bytes pulled for the in-flight packet. Folded into `source` and
    /// `remaining` only once the host acknowledges, so a retransmission
    /// replays the same span.
    pulled: u8,
}

impl ControlPipe {
    pub const fn new(max_packet: u8) -> Self {
        ControlPipe {
            state: ControlState::Idle,
            max_packet,
            setup: [0; 8],
            setup_len: 0,
            address: 0,
            pending_address: None,
            configuration: 0,
            pending_configuration: None,
            source: Source::Empty,
            remaining: 0,
            need_zlp: false,
            quota: 0,
            pulled: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Committed device address; the token decoder's match target.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Committed configuration value, 0 while unconfigured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Bus reset: back to the default address, unconfigured.
    pub fn reset(&mut self) {
        *self = ControlPipe::new(self.max_packet);
    }

    /// A SETUP token arrived. Always wins, whatever was in flight.
    pub fn on_setup_token(&mut self) {
        self.state = ControlState::ReceiveSetup;
        self.setup_len = 0;
        self.pending_address = None;
        self.pending_configuration = None;
        self.source = Source::Empty;
        self.remaining = 0;
        self.need_zlp = false;
        self.quota = 0;
        self.pulled = 0;
    }

    /// Payload byte of a packet routed to this endpoint.
    pub fn on_rx_byte(&mut self, byte: u8) {
        match self.state {
            ControlState::ReceiveSetup => {
                if usize::from(self.setup_len) < self.setup.len() {
                    self.setup[usize::from(self.setup_len)] = byte;
                }
                // Bytes past the eighth are ignored, not an error.
                self.setup_len = self.setup_len.saturating_add(1);
            }
            // Host data we have no use for; absorbed and dropped.
            ControlState::ReceiveData => {}
            _ => {}
        }
    }

    /// A packet for this endpoint finished with a good checksum.
    pub fn on_rx_complete<S: DescriptorStore>(&mut self, store: &S) -> Handshake {
        match self.state {
            ControlState::ReceiveSetup => {
                if self.setup_len >= 8 {
                    self.dispatch(store);
                } else {
                    debug!("ep0: short setup ({} bytes)", self.setup_len);
                    self.state = ControlState::Idle;
                }
                Handshake::Ack
            }
            ControlState::ReceiveData => Handshake::Ack,
            ControlState::ReceiveStatus => {
                // Status ZLP received; the transfer is over.
                self.state = ControlState::Idle;
                Handshake::Ack
            }
            _ => Handshake::Ack,
        }
    }

    /// An IN token addressed endpoint 0.
    pub fn on_in_token(&mut self) -> InAction {
        match self.state {
            ControlState::WaitSendData | ControlState::SendData => {
                self.state = ControlState::SendData;
                self.quota = self.remaining.min(u16::from(self.max_packet)) as u8;
                self.pulled = 0;
                InAction::Data
            }
            // For a host-to-device transfer the IN token opens the
            // status stage, even if the host cut the data stage short.
            ControlState::WaitReceiveData
            | ControlState::ReceiveData
            | ControlState::SendStatus => {
                self.state = ControlState::SendStatus;
                InAction::Status
            }
            _ => InAction::Nak,
        }
    }

    /// An OUT token addressed endpoint 0.
    pub fn on_out_token(&mut self) -> OutAction {
        match self.state {
            ControlState::WaitReceiveData | ControlState::ReceiveData => {
                self.state = ControlState::ReceiveData;
                OutAction::Data
            }
            // The host may truncate our data stage and jump to status.
            ControlState::WaitSendData | ControlState::SendData | ControlState::ReceiveStatus => {
                self.state = ControlState::ReceiveStatus;
                OutAction::Status
            }
            _ => OutAction::Ignore,
        }
    }

    /// A token addressed some other endpoint; this engine stands down.
    pub fn on_foreign_token(&mut self) {
        if self.state != ControlState::Idle {
            debug!("ep0: transfer abandoned by foreign token");
            self.state = ControlState::Idle;
            self.pending_address = None;
            self.pending_configuration = None;
        }
    }

    /// Next byte of the packet under assembly, `None` once the packet's
    /// quota is spent.
    pub fn next_in_byte<S: DescriptorStore>(&mut self, store: &S) -> Option<u8> {
        if self.pulled >= self.quota {
            return None;
        }
        let byte = self.source.read(store, self.pulled);
        self.pulled += 1;
        Some(byte)
    }

    /// The host acknowledged the data packet we sent; advance past it.
    pub fn on_tx_acked(&mut self) {
        if self.state == ControlState::SendData {
            let sent = self.pulled;
            self.source.advance(sent);
            self.remaining = self.remaining.saturating_sub(u16::from(sent));
            self.pulled = 0;
            let full = sent == self.max_packet;
            if self.remaining == 0 && !(full && self.need_zlp) {
                self.state = ControlState::ReceiveStatus;
            }
        }
    }

    /// Our zero-length status packet finished on the wire. This is the
    /// commit point for address and configuration changes.
    pub fn on_status_sent(&mut self) -> StatusCommit {
        self.state = ControlState::Idle;
        if let Some(address) = self.pending_address.take() {
            self.address = address;
            debug!("ep0: address {}", address);
            return StatusCommit::Addressed(address);
        }
        if let Some(configuration) = self.pending_configuration.take() {
            self.configuration = configuration;
            debug!("ep0: configuration {}", configuration);
            return StatusCommit::Configured(configuration);
        }
        StatusCommit::None
    }

    fn parse(&self) -> Request {
        let rt = self.setup[0];
        Request {
            direction: if rt & 0x80 != 0 {
                UsbDirection::In
            } else {
                UsbDirection::Out
            },
            request_type: match (rt >> 5) & 0b11 {
                0 => RequestType::Standard,
                1 => RequestType::Class,
                2 => RequestType::Vendor,
                _ => RequestType::Reserved,
            },
            recipient: match rt & 0x1F {
                0 => Recipient::Device,
                1 => Recipient::Interface,
                2 => Recipient::Endpoint,
                3 => Recipient::Other,
                _ => Recipient::Reserved,
            },
            request: self.setup[1],
            value: u16::from_le_bytes([self.setup[2], self.setup[3]]),
            index: u16::from_le_bytes([self.setup[4], self.setup[5]]),
            length: u16::from_le_bytes([self.setup[6], self.setup[7]]),
        }
    }

    fn dispatch<S: DescriptorStore>(&mut self, store: &S) {
        let request = self.parse();
        debug!(
            "ep0: request {} value {} length {}",
            request.request, request.value, request.length
        );

        if request.request_type != RequestType::Standard
            || request.recipient != Recipient::Device
        {
            self.no_op(&request);
            return;
        }

        match request.request {
            Request::GET_DESCRIPTOR => self.get_descriptor(&request, store),
            Request::SET_ADDRESS => {
                self.pending_address = Some((request.value & 0x7F) as u8);
                self.state = ControlState::SendStatus;
            }
            Request::SET_CONFIGURATION => {
                self.pending_configuration = Some(request.value as u8);
                self.state = ControlState::SendStatus;
            }
            Request::GET_CONFIGURATION => {
                let value = self.configuration;
                self.internal_response(&request, &[value]);
            }
            // Bus powered, no remote wakeup.
            Request::GET_STATUS => self.internal_response(&request, &[0, 0]),
            Request::CLEAR_FEATURE | Request::SET_FEATURE => {
                self.state = ControlState::SendStatus;
            }
            _ => self.no_op(&request),
        }
    }

    fn get_descriptor<S: DescriptorStore>(&mut self, request: &Request, store: &S) {
        let [index, kind] = request.value.to_le_bytes();
        let region = match kind {
            descriptor_type::DEVICE => Some(store.device()),
            descriptor_type::CONFIGURATION => store.configuration(index),
            descriptor_type::STRING => store.string(index),
            _ => None,
        };
        match region {
            Some(region) => self.begin_in(
                request,
                Source::Store {
                    offset: region.offset,
                },
                region.length,
            ),
            None => {
                debug!("ep0: no descriptor {} index {}", kind, index);
                self.begin_in(request, Source::Empty, 0)
            }
        }
    }

    fn internal_response(&mut self, request: &Request, bytes: &[u8]) {
        let mut buf = [0u8; 2];
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        self.begin_in(
            request,
            Source::Internal {
                bytes: buf,
                cursor: 0,
            },
            len as u16,
        );
    }

    /// Arrange the device-to-host data stage: clamp to `wLength`, decide
    /// whether an aligned response needs a zero-length terminator.
    fn begin_in(&mut self, request: &Request, source: Source, length: u16) {
        if request.direction != UsbDirection::In || request.length == 0 {
            self.state = ControlState::SendStatus;
            return;
        }
        let length = length.min(request.length);
        self.need_zlp = length < request.length && length % u16::from(self.max_packet) == 0;
        self.source = source;
        self.remaining = length;
        self.state = ControlState::WaitSendData;
    }

    /// Requests this device does not serve complete with an empty data
    /// stage rather than a refusal.
    fn no_op(&mut self, request: &Request) {
        if request.direction == UsbDirection::In && request.length > 0 {
            self.source = Source::Empty;
            self.remaining = 0;
            self.need_zlp = false;
            self.state = ControlState::WaitSendData;
        } else if request.length > 0 {
            self.state = ControlState::WaitReceiveData;
        } else {
            self.state = ControlState::SendStatus;
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ControlPipe, ControlState, InAction, OutAction, StatusCommit};
    use crate::descriptor::{DescriptorStore, StaticDescriptors};
    use crate::endpoint::Handshake;

    const DEVICE: &[u8] = &[
        0x12, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 0x40, //
        0xd0, 0x16, 0x3f, 0x05, 0x00, 0x01, 0x01, 0x02, 0x00, 0x01,
    ];

    // A 16-byte "device descriptor" for packet-alignment cases.
    const ALIGNED: &[u8] = &[
        0x10, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 0x08, //
        0xd0, 0x16, 0x3f, 0x05, 0x00, 0x01, 0x00, 0x01,
    ];

    fn setup<S: DescriptorStore>(pipe: &mut ControlPipe, store: &S, bytes: &[u8; 8]) -> Handshake {
        pipe.on_setup_token();
        for byte in bytes {
            pipe.on_rx_byte(*byte);
        }
        pipe.on_rx_complete(store)
    }

    fn drain<S: DescriptorStore>(pipe: &mut ControlPipe, store: &S) -> heapless::Vec<u8, 64> {
        let mut bytes = heapless::Vec::new();
        while let Some(byte) = pipe.next_in_byte(store) {
            bytes.push(byte).ok().unwrap();
        }
        bytes
    }

    #[test]
    fn device_descriptor_streams_in_packet_sized_pieces() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        let ack = setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        );
        assert_eq!(ack, Handshake::Ack);
        assert_eq!(pipe.state(), ControlState::WaitSendData);

        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &DEVICE[0..8]);
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::SendData);

        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &DEVICE[8..16]);
        pipe.on_tx_acked();

        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &DEVICE[16..18]);
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);

        assert_eq!(pipe.on_out_token(), OutAction::Status);
        assert_eq!(pipe.on_rx_complete(&store), Handshake::Ack);
        assert_eq!(pipe.state(), ControlState::Idle);
    }

    #[test]
    fn response_clamps_to_wlength() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(64);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x09, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &DEVICE[0..9]);
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn retransmission_replays_the_same_span() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Data);
        let first = drain(&mut pipe, &store);
        // No acknowledgment: the next packet starts from the same offset.
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(drain(&mut pipe, &store), first);
        pipe.on_tx_acked();
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &DEVICE[8..16]);
    }

    #[test]
    fn set_address_commits_only_at_status() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x00, 0x05, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(pipe.state(), ControlState::SendStatus);
        assert_eq!(pipe.address(), 0);
        assert_eq!(pipe.on_in_token(), InAction::Status);
        assert_eq!(pipe.address(), 0);
        assert_eq!(pipe.on_status_sent(), StatusCommit::Addressed(7));
        assert_eq!(pipe.address(), 7);
        assert_eq!(pipe.state(), ControlState::Idle);
    }

    #[test]
    fn setup_preempts_and_drops_pending_side_effects() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x00, 0x05, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(pipe.state(), ControlState::SendStatus);
        // New SETUP before the status stage: the address never applies.
        setup(
            &mut pipe,
            &store,
            &[0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Status);
        assert_eq!(pipe.on_status_sent(), StatusCommit::Configured(1));
        assert_eq!(pipe.address(), 0);
        assert_eq!(pipe.configuration(), 1);
    }

    #[test]
    fn configuration_round_trip() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
        pipe.on_in_token();
        pipe.on_status_sent();
        assert_eq!(pipe.configuration(), 1);

        setup(
            &mut pipe,
            &store,
            &[0x80, 0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &[1]);
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn get_status_reports_bus_powered() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert_eq!(&drain(&mut pipe, &store)[..], &[0, 0]);
    }

    #[test]
    fn unsupported_request_answers_zero_length() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        // Class request to an interface; this core serves none of those.
        setup(
            &mut pipe,
            &store,
            &[0xA1, 0x01, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        );
        assert_eq!(pipe.state(), ControlState::WaitSendData);
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert!(drain(&mut pipe, &store).is_empty());
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn missing_string_answers_zero_length() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x09, 0x03, 0x00, 0x00, 0xFF, 0x00],
        );
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert!(drain(&mut pipe, &store).is_empty());
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn aligned_response_gets_a_terminating_zero_length_packet() {
        // 16 response bytes at an 8-byte packet size with more
        // requested: two full packets, then a bare terminator.
        let store = StaticDescriptors::new(ALIGNED);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x00],
        );
        for _ in 0..2 {
            assert_eq!(pipe.on_in_token(), InAction::Data);
            assert_eq!(drain(&mut pipe, &store).len(), 8);
            pipe.on_tx_acked();
            assert_eq!(pipe.state(), ControlState::SendData);
        }
        assert_eq!(pipe.on_in_token(), InAction::Data);
        assert!(drain(&mut pipe, &store).is_empty());
        pipe.on_tx_acked();
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn exact_wlength_skips_the_terminator() {
        // Same 16 bytes, but the host asked for exactly 16: the byte
        // count tells it everything and no terminator follows.
        let store = StaticDescriptors::new(ALIGNED);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x10, 0x00],
        );
        for _ in 0..2 {
            pipe.on_in_token();
            assert_eq!(drain(&mut pipe, &store).len(), 8);
            pipe.on_tx_acked();
        }
        assert_eq!(pipe.state(), ControlState::ReceiveStatus);
    }

    #[test]
    fn foreign_token_stands_the_engine_down() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        );
        assert_eq!(pipe.state(), ControlState::WaitSendData);
        pipe.on_foreign_token();
        assert_eq!(pipe.state(), ControlState::Idle);
        assert_eq!(pipe.on_in_token(), InAction::Nak);
    }

    #[test]
    fn host_may_truncate_the_data_stage() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        setup(
            &mut pipe,
            &store,
            &[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        );
        pipe.on_in_token();
        drain(&mut pipe, &store);
        pipe.on_tx_acked();
        // Host gives up on the rest and goes straight to status.
        assert_eq!(pipe.on_out_token(), OutAction::Status);
        assert_eq!(pipe.on_rx_complete(&store), Handshake::Ack);
        assert_eq!(pipe.state(), ControlState::Idle);
    }

    #[test]
    fn short_setup_is_discarded() {
        let store = StaticDescriptors::new(DEVICE);
        let mut pipe = ControlPipe::new(8);
        pipe.on_setup_token();
        for byte in [0x80u8, 0x06, 0x00] {
            pipe.on_rx_byte(byte);
        }
        assert_eq!(pipe.on_rx_complete(&store), Handshake::Ack);
        assert_eq!(pipe.state(), ControlState::Idle);
    }
}
