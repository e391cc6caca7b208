//! The tick-driven device engine.
//!
//! [`Device`] owns every state machine in the stack: pin synchronizer,
//! line monitor, bit receiver and transmitter, framer, token and data
//! decoders, the packet sender, and the endpoint 0 control pipe.
//! Everything advances from a single [`tick`](Device::tick) call per
//! line sample. Each tick consumes one raw pin sample and produces one
//! pin drive, so the caller's only job is to run the tick at the
//! configured sample rate and wire the results to a transceiver.
//!
//! The bus is half duplex. While the transmitter holds the line, the
//! receive path stands down; it restarts the moment the transmitter
//! releases. Everything that *answers* the host (handshakes, data
//! packets, the status zero-length packet) starts from the end of a
//! received packet, so all transmit decisions live in the end-of-packet
//! handlers.
//!
//! Protocol happenings the firmware cares about accumulate in a
//! [`BusEvents`] set, drained by [`poll`](Device::poll).

use usb_device::endpoint::EndpointAddress;
use usb_device::UsbDirection;

use crate::control::{ControlPipe, InAction, OutAction, StatusCommit};
use crate::data::{DataDecoder, PacketSender, MAX_PACKET};
use crate::descriptor::DescriptorStore;
use crate::endpoint::{EndpointHandler, Handshake, Toggles, MAX_ENDPOINTS};
use crate::framer::{Framer, FramerAction, LineTransition};
use crate::line::{LineMonitor, LineState, PinDrive, PinState, PinSync};
use crate::phy::{Receiver, RxEvents, Transmitter};
use crate::pid::Pid;
use crate::token::{TokenDecoder, TokenEvent, TokenKind};

#[cfg(feature = "defmt-03")]
use crate::defmt;
use crate::{Config, Speed};

bitflags::bitflags! {
    /// Accumulated protocol happenings, drained by [`Device::poll`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BusEvents: u16 {
        /// Host held SE0 past the reset threshold; the device is back
        /// at address 0, unconfigured.
        const RESET = 1 << 0;
        /// Bus idle past the suspend threshold.
        const SUSPEND = 1 << 1;
        /// Bus activity after a suspend.
        const RESUME = 1 << 2;
        /// Start-of-frame token; the frame number updated.
        const SOF = 1 << 3;
        /// A SETUP token opened a control transfer.
        const SETUP = 1 << 4;
        /// SET_ADDRESS completed its status stage.
        const ADDRESSED = 1 << 5;
        /// SET_CONFIGURATION completed its status stage.
        const CONFIGURED = 1 << 6;
        /// A malformed packet was dropped (bad PID, CRC, or stuffing).
        const ERROR = 1 << 7;
    }
}

/// Who the bytes of the packet being received belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxTarget {
    /// Not ours (wrong address, no open transaction).
    None,
    /// Ours, but consumed without a response.
    Discard,
    /// Endpoint 0 control traffic.
    Control,
    /// A handler-backed endpoint.
    Endpoint(usize),
}

/// What the transmitter is sending, deciding follow-up at completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxPurpose {
    None,
    /// ACK or NAK; fire and forget.
    Handshake,
    /// Control data-stage packet; expect the host's ACK.
    ControlData,
    /// Control status zero-length packet; commit side effects at EOP.
    ControlStatus,
    /// Handler data packet; expect the host's ACK.
    EndpointData(usize),
}

fn out_addr(endpoint: usize) -> EndpointAddress {
    EndpointAddress::from_parts(endpoint, UsbDirection::Out)
}

fn in_addr(endpoint: usize) -> EndpointAddress {
    EndpointAddress::from_parts(endpoint, UsbDirection::In)
}

/// Everything above the bit layer, kept apart from the transmitter so
/// the transmit pull closure can borrow it whole.
struct Protocol<'h, S> {
    store: S,
    control: ControlPipe,
    framer: Framer,
    token: TokenDecoder,
    data: DataDecoder,
    sender: PacketSender,
    toggles: Toggles,
    handlers: [Option<&'h mut dyn EndpointHandler>; MAX_ENDPOINTS],
    handler_limits: [u8; MAX_ENDPOINTS],
    ep0_limit: u8,
    rx_target: RxTarget,
    tx_purpose: TxPurpose,
    /// Sent a data packet, no handshake for it yet.
    await_ack: Option<TxPurpose>,
    events: BusEvents,
    frame: u16,
}

impl<'h, S: DescriptorStore> Protocol<'h, S> {
    fn new(store: S, ep0_limit: u8) -> Self {
        Protocol {
            store,
            control: ControlPipe::new(ep0_limit),
            framer: Framer::new(),
            token: TokenDecoder::new(),
            data: DataDecoder::new(),
            sender: PacketSender::new(),
            toggles: Toggles::new(),
            handlers: core::array::from_fn(|_| None),
            handler_limits: [8; MAX_ENDPOINTS],
            ep0_limit,
            rx_target: RxTarget::None,
            tx_purpose: TxPurpose::None,
            await_ack: None,
            events: BusEvents::empty(),
            frame: 0,
        }
    }

    /// Source for the transmitter: the sender frames PID and CRC around
    /// payload pulled from whoever owns the in-flight packet.
    fn pull_tx_byte(&mut self) -> Option<u8> {
        let Protocol {
            sender,
            control,
            store,
            handlers,
            tx_purpose,
            ..
        } = self;
        sender.next_byte(|| match tx_purpose {
            TxPurpose::ControlData => control.next_in_byte(store),
            TxPurpose::EndpointData(endpoint) => handlers[*endpoint]
                .as_mut()
                .and_then(|handler| handler.tx_byte()),
            _ => None,
        })
    }

    fn on_line_transition(&mut self, transition: LineTransition) {
        match transition {
            LineTransition::ResetStart => {
                self.events |= BusEvents::RESET;
                self.bus_reset();
            }
            LineTransition::SuspendStart => self.events |= BusEvents::SUSPEND,
            LineTransition::Resume => self.events |= BusEvents::RESUME,
            _ => {}
        }
    }

    /// Back to the post-reset defaults: address 0, unconfigured, all
    /// toggles DATA0, nothing in flight.
    fn bus_reset(&mut self) {
        self.control.reset();
        self.toggles.reset();
        self.rx_target = RxTarget::None;
        self.tx_purpose = TxPurpose::None;
        self.await_ack = None;
        self.frame = 0;
    }

    fn on_rx_events(&mut self, rx: RxEvents, tx: &mut Transmitter) {
        if rx.stuff_error {
            self.events |= BusEvents::ERROR;
            self.framer.on_error();
            self.rx_target = RxTarget::None;
        }
        if rx.sop {
            self.framer.on_sop();
        }
        if let Some(byte) = rx.byte {
            match self.framer.on_byte(byte) {
                FramerAction::Pid(pid) => self.on_pid(pid),
                FramerAction::Payload(pid, byte) => self.on_payload(pid, byte),
                FramerAction::Error => {
                    self.events |= BusEvents::ERROR;
                    self.rx_target = RxTarget::None;
                }
                _ => {}
            }
        }
        if rx.eop {
            if let FramerAction::End(pid) = self.framer.on_eop() {
                self.on_end(pid, tx);
            }
        }
    }

    fn on_pid(&mut self, pid: Pid) {
        if pid.is_token() {
            self.token.begin();
        } else if pid.is_data() && self.rx_target != RxTarget::None {
            self.data.begin(pid);
        }
    }

    fn on_payload(&mut self, pid: Pid, byte: u8) {
        if pid.is_token() {
            self.token.push(byte);
        } else if pid.is_data() && self.rx_target != RxTarget::None {
            if let Some(byte) = self.data.push(byte) {
                match self.rx_target {
                    RxTarget::Control => self.control.on_rx_byte(byte),
                    RxTarget::Endpoint(endpoint) => {
                        if let Some(handler) = self.handlers[endpoint].as_mut() {
                            handler.rx_byte(byte);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn on_end(&mut self, pid: Pid, tx: &mut Transmitter) {
        if pid.is_token() {
            let address = self.control.address();
            if let Some(event) = self.token.finish(pid, address) {
                self.handle_token(event, tx);
            }
        } else if pid.is_data() {
            if self.rx_target != RxTarget::None {
                let result = self.data.finish();
                self.handle_data_end(result.crc_ok, result.parity, tx);
            }
        } else if pid.is_handshake() {
            self.handle_handshake(pid);
        }
    }

    fn handle_token(&mut self, event: TokenEvent, tx: &mut Transmitter) {
        let (kind, endpoint) = match event {
            TokenEvent::Sof { frame } => {
                self.frame = frame;
                self.events |= BusEvents::SOF;
                return;
            }
            TokenEvent::Token { kind, endpoint } => (kind, usize::from(endpoint)),
        };

        self.rx_target = RxTarget::None;

        // A data packet we sent earlier is still unacknowledged. An IN
        // token for the same endpoint asks for it again; any other token
        // means the host moved on and the packet stays uncommitted.
        if let Some(purpose) = self.await_ack.take() {
            let same_source = kind == TokenKind::In
                && match purpose {
                    TxPurpose::ControlData => endpoint == 0,
                    TxPurpose::EndpointData(source) => source == endpoint,
                    _ => false,
                };
            if same_source {
                debug!("retransmit for endpoint {}", endpoint);
                self.sender.rearm();
                self.tx_purpose = purpose;
                tx.start();
                return;
            }
        }

        if endpoint == 0 {
            self.handle_control_token(kind, tx);
        } else {
            self.control.on_foreign_token();
            self.handle_endpoint_token(kind, endpoint, tx);
        }
    }

    fn handle_control_token(&mut self, kind: TokenKind, tx: &mut Transmitter) {
        match kind {
            TokenKind::Setup => {
                self.events |= BusEvents::SETUP;
                self.control.on_setup_token();
                // Setup data is DATA0; the data stage answers at DATA1.
                self.toggles.set(out_addr(0), false);
                self.toggles.set(in_addr(0), true);
                self.rx_target = RxTarget::Control;
            }
            TokenKind::Out => match self.control.on_out_token() {
                OutAction::Data => self.rx_target = RxTarget::Control,
                OutAction::Status => {
                    // The status packet is DATA1, whatever came before.
                    self.toggles.set(out_addr(0), true);
                    self.rx_target = RxTarget::Control;
                }
                OutAction::Ignore => self.rx_target = RxTarget::Discard,
            },
            TokenKind::In => match self.control.on_in_token() {
                InAction::Data => {
                    let parity = self.toggles.expected(in_addr(0));
                    self.sender.load_data(parity, self.ep0_limit);
                    self.tx_purpose = TxPurpose::ControlData;
                    tx.start();
                }
                InAction::Status => {
                    self.toggles.set(in_addr(0), true);
                    self.sender.load_data(true, 0);
                    self.tx_purpose = TxPurpose::ControlStatus;
                    tx.start();
                }
                InAction::Nak => self.send_handshake(Pid::Nak, tx),
            },
        }
    }

    fn handle_endpoint_token(&mut self, kind: TokenKind, endpoint: usize, tx: &mut Transmitter) {
        // Non-zero endpoints only exist once a configuration is set.
        if self.control.configuration() == 0 {
            debug!("token for endpoint {} while unconfigured", endpoint);
            return;
        }
        let handler = match self.handlers[endpoint].as_mut() {
            Some(handler) => handler,
            None => return,
        };
        handler.transaction_start(kind);
        match kind {
            TokenKind::Setup => {
                self.toggles.set(out_addr(endpoint), false);
                self.toggles.set(in_addr(endpoint), true);
                self.rx_target = RxTarget::Endpoint(endpoint);
            }
            TokenKind::Out => {
                self.rx_target = RxTarget::Endpoint(endpoint);
            }
            TokenKind::In => {
                if handler.tx_ready() {
                    let parity = self.toggles.expected(in_addr(endpoint));
                    self.sender
                        .load_data(parity, self.handler_limits[endpoint]);
                    self.tx_purpose = TxPurpose::EndpointData(endpoint);
                    tx.start();
                } else {
                    self.send_handshake(Pid::Nak, tx);
                }
            }
        }
    }

    fn handle_data_end(&mut self, crc_ok: bool, parity: bool, tx: &mut Transmitter) {
        let target = core::mem::replace(&mut self.rx_target, RxTarget::None);
        let endpoint = match target {
            RxTarget::None | RxTarget::Discard => return,
            RxTarget::Control => 0,
            RxTarget::Endpoint(endpoint) => endpoint,
        };

        if !crc_ok {
            warn!("data crc failed for endpoint {}", endpoint);
            self.events |= BusEvents::ERROR;
            self.send_handshake(Pid::Nak, tx);
            return;
        }
        if parity != self.toggles.expected(out_addr(endpoint)) {
            debug!("data toggle mismatch for endpoint {}", endpoint);
            self.send_handshake(Pid::Nak, tx);
            return;
        }

        let verdict = match target {
            RxTarget::Control => self.control.on_rx_complete(&self.store),
            RxTarget::Endpoint(endpoint) => match self.handlers[endpoint].as_mut() {
                Some(handler) => handler.rx_complete(),
                None => Handshake::Nak,
            },
            _ => Handshake::Nak,
        };
        match verdict {
            Handshake::Ack => {
                self.toggles.flip(out_addr(endpoint));
                self.send_handshake(Pid::Ack, tx);
            }
            Handshake::Nak => self.send_handshake(Pid::Nak, tx),
        }
    }

    fn handle_handshake(&mut self, pid: Pid) {
        if pid != Pid::Ack {
            return;
        }
        if let Some(purpose) = self.await_ack.take() {
            match purpose {
                TxPurpose::ControlData => {
                    self.toggles.flip(in_addr(0));
                    self.control.on_tx_acked();
                }
                TxPurpose::EndpointData(endpoint) => {
                    self.toggles.flip(in_addr(endpoint));
                    if let Some(handler) = self.handlers[endpoint].as_mut() {
                        handler.tx_acked();
                    }
                }
                _ => {}
            }
        }
    }

    /// The transmitter released the bus; settle what the packet meant.
    fn tx_done(&mut self) {
        match self.tx_purpose {
            TxPurpose::ControlData => self.await_ack = Some(TxPurpose::ControlData),
            TxPurpose::EndpointData(endpoint) => {
                self.await_ack = Some(TxPurpose::EndpointData(endpoint))
            }
            TxPurpose::ControlStatus => match self.control.on_status_sent() {
                StatusCommit::Addressed(_) => {
                    self.events |= BusEvents::ADDRESSED;
                }
                StatusCommit::Configured(_) => {
                    self.events |= BusEvents::CONFIGURED;
                    self.toggles.reset_non_zero();
                }
                StatusCommit::None => {}
            },
            _ => {}
        }
        self.tx_purpose = TxPurpose::None;
    }

    fn send_handshake(&mut self, pid: Pid, tx: &mut Transmitter) {
        self.sender.load_handshake(pid);
        self.tx_purpose = TxPurpose::Handshake;
        tx.start();
    }
}

/// A software USB 1.x device.
///
/// Generic over the descriptor store and borrowing the endpoint
/// handlers, so the whole device can live in a `static` next to a const
/// descriptor blob.
pub struct Device<'h, S> {
    speed: Speed,
    sync: PinSync,
    monitor: LineMonitor,
    rx: Receiver,
    tx: Transmitter,
    proto: Protocol<'h, S>,
}

impl<'h, S: DescriptorStore> Device<'h, S> {
    pub fn new(config: Config, store: S) -> Self {
        Device {
            speed: config.speed,
            sync: PinSync::new(),
            monitor: LineMonitor::new(config.reset_ticks, config.suspend_ticks),
            rx: Receiver::new(config.samples_per_bit),
            tx: Transmitter::new(config.samples_per_bit),
            proto: Protocol::new(store, config.ep0_max_packet),
        }
    }

    /// Present the pull-up; the host will notice and issue a reset.
    pub fn attach(&mut self) {
        self.proto.framer.attach();
    }

    /// Release the pull-up and forget all bus state.
    pub fn detach(&mut self) {
        self.proto.framer.detach();
        self.tx.abort();
        self.rx.restart();
        self.proto.bus_reset();
    }

    /// Hook a handler up to a non-zero endpoint. `max_packet` caps the
    /// payload of packets sent from this endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `endpoint` is 0 (endpoint 0 belongs to the control
    /// engine) or past the last endpoint.
    pub fn install_handler(
        &mut self,
        endpoint: usize,
        handler: &'h mut dyn EndpointHandler,
        max_packet: u8,
    ) {
        assert!(
            endpoint != 0 && endpoint < MAX_ENDPOINTS,
            "no installable endpoint {endpoint}"
        );
        self.proto.handler_limits[endpoint] = max_packet.min(MAX_PACKET as u8);
        self.proto.handlers[endpoint] = Some(handler);
    }

    /// Take the events accumulated since the last poll.
    pub fn poll(&mut self) -> BusEvents {
        core::mem::replace(&mut self.proto.events, BusEvents::empty())
    }

    /// Current device address (0 until SET_ADDRESS completes).
    pub fn address(&self) -> u8 {
        self.proto.control.address()
    }

    /// Selected configuration value (0 while unconfigured).
    pub fn configuration(&self) -> u8 {
        self.proto.control.configuration()
    }

    /// Frame number of the most recent start-of-frame token.
    pub fn frame_number(&self) -> u16 {
        self.proto.frame
    }

    /// Advance the whole stack by one line sample.
    pub fn tick(&mut self, pins: PinState) -> PinDrive {
        let sampled = self.sync.sample(pins);
        let speed = self.speed;

        if self.tx.is_active() {
            let Device { tx, proto, .. } = self;
            if let Some(line) = tx.tick(|| proto.pull_tx_byte()) {
                let pins = line.to_pins(speed);
                return PinDrive {
                    dp: pins.dp,
                    dm: pins.dm,
                    output_enable: true,
                    pull_up: proto.framer.pull_up(),
                };
            }
            // Released the bus on this tick.
            self.proto.tx_done();
            self.rx.restart();
            return self.idle_drive();
        }

        let line = LineState::from_pins(sampled, speed);
        let condition = self.monitor.tick(line);
        let transition = self.proto.framer.on_line(condition, line);
        if transition == LineTransition::ResetStart {
            self.tx.abort();
            self.rx.restart();
        }
        self.proto.on_line_transition(transition);

        let events = self.rx.tick(line);
        let Device { tx, proto, .. } = self;
        proto.on_rx_events(events, tx);

        self.idle_drive()
    }

    fn idle_drive(&self) -> PinDrive {
        PinDrive {
            dp: false,
            dm: false,
            output_enable: false,
            pull_up: self.proto.framer.pull_up(),
        }
    }
}
