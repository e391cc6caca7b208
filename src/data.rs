//! Data packets and handshake transmission.
//!
//! Receive: payload bytes stream out of the decoder through a two-byte
//! delay line, so consumers never see the trailing CRC16; by the time
//! EOP lands, the two newest bytes still inside the line are exactly the
//! checksum. CRC16 runs over payload and checksum together and must end
//! on the residual. Bytes are streamed before the packet's fate is known;
//! the caller commits or discards based on [`DataResult`].
//!
//! Transmit: one packet at a time. Data packets buffer every byte they
//! pull so a retransmission replays the identical packet without asking
//! the source again; handshakes are a bare PID.

use crate::crc::Crc16;
use crate::pid::Pid;

/// Largest data payload handled per packet, the full-speed maximum.
pub const MAX_PACKET: usize = 64;

/// What a received data packet amounted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataResult {
    /// CRC16 residual held at EOP.
    pub crc_ok: bool,
    /// Parity carried by the DATA0/DATA1 PID.
    pub parity: bool,
    /// Payload bytes emitted, checksum excluded.
    pub len: u8,
}

/// Receive half: delay line, CRC tracking, length accounting.
pub struct DataDecoder {
    crc: Crc16,
    parity: bool,
    pending: [u8; 2],
    have: u8,
    len: u8,
}

impl DataDecoder {
    pub const fn new() -> Self {
        DataDecoder {
            crc: Crc16::new(),
            parity: false,
            pending: [0; 2],
            have: 0,
            len: 0,
        }
    }

    /// Arm for an incoming data packet. `pid` must be DATA0 or DATA1.
    pub fn begin(&mut self, pid: Pid) {
        debug_assert!(pid.is_data());
        self.crc = Crc16::new();
        self.parity = pid.data_parity().unwrap_or(false);
        self.have = 0;
        self.len = 0;
    }

    /// Feed the next payload byte; returns the byte leaving the delay
    /// line, which is known to be payload rather than checksum.
    pub fn push(&mut self, byte: u8) -> Option<u8> {
        self.crc.update(byte);
        if self.have < 2 {
            self.pending[self.have as usize] = byte;
            self.have += 1;
            return None;
        }
        let out = self.pending[0];
        self.pending[0] = self.pending[1];
        self.pending[1] = byte;
        self.len = self.len.saturating_add(1);
        Some(out)
    }

    /// Close the packet at EOP.
    pub fn finish(&mut self) -> DataResult {
        let result = DataResult {
            // A packet without even a full checksum can never hold the
            // residual; no length special case needed.
            crc_ok: self.have == 2 && self.crc.good(),
            parity: self.parity,
            len: self.len,
        };
        self.have = 0;
        self.len = 0;
        result
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendState {
    Pid,
    Payload,
    CrcLo,
    CrcHi,
    Done,
}

/// Transmit half: PID, buffered payload, complemented CRC16.
pub struct PacketSender {
    state: SendState,
    pid: Pid,
    has_payload: bool,
    buf: [u8; MAX_PACKET],
    len: u8,
    pos: u8,
    limit: u8,
    filled: bool,
    crc: Crc16,
    crc_bytes: [u8; 2],
}

impl PacketSender {
    pub const fn new() -> Self {
        PacketSender {
            state: SendState::Done,
            pid: Pid::Nak,
            has_payload: false,
            buf: [0; MAX_PACKET],
            len: 0,
            pos: 0,
            limit: 0,
            filled: false,
            crc: Crc16::new(),
            crc_bytes: [0; 2],
        }
    }

    /// Queue a bare handshake packet.
    pub fn load_handshake(&mut self, pid: Pid) {
        debug_assert!(pid.is_handshake());
        self.state = SendState::Pid;
        self.pid = pid;
        self.has_payload = false;
    }

    /// Queue a data packet: PID per `parity`, at most `limit` payload
    /// bytes pulled from the source during transmission.
    pub fn load_data(&mut self, parity: bool, limit: u8) {
        self.state = SendState::Pid;
        self.pid = Pid::for_parity(parity);
        self.has_payload = true;
        self.len = 0;
        self.pos = 0;
        self.limit = limit.min(MAX_PACKET as u8);
        self.filled = false;
        self.crc = Crc16::new();
    }

    /// Re-queue the previous data packet, byte for byte. The source is
    /// not consulted; the buffered copy replays.
    pub fn rearm(&mut self) {
        debug_assert!(self.has_payload);
        self.state = SendState::Pid;
        self.pos = 0;
    }

    /// Serve the transmitter's byte pull. `pull` supplies payload bytes
    /// and is only consulted the first time a given packet transmits.
    pub fn next_byte(&mut self, mut pull: impl FnMut() -> Option<u8>) -> Option<u8> {
        loop {
            match self.state {
                SendState::Pid => {
                    self.state = if self.has_payload {
                        SendState::Payload
                    } else {
                        SendState::Done
                    };
                    return Some(self.pid.byte());
                }
                SendState::Payload => {
                    if self.pos < self.len {
                        let byte = self.buf[self.pos as usize];
                        self.pos += 1;
                        return Some(byte);
                    }
                    if !self.filled {
                        if self.len < self.limit {
                            if let Some(byte) = pull() {
                                self.buf[self.len as usize] = byte;
                                self.crc.update(byte);
                                self.len += 1;
                                self.pos += 1;
                                return Some(byte);
                            }
                        }
                        // Source dry or size limit hit: body complete.
                        self.filled = true;
                        self.crc_bytes = self.crc.transmit();
                    }
                    self.state = SendState::CrcLo;
                }
                SendState::CrcLo => {
                    self.state = SendState::CrcHi;
                    return Some(self.crc_bytes[0]);
                }
                SendState::CrcHi => {
                    self.state = SendState::Done;
                    return Some(self.crc_bytes[1]);
                }
                SendState::Done => return None,
            }
        }
    }

    /// Payload length of the packet most recently loaded or sent.
    pub fn payload_len(&self) -> u8 {
        self.len
    }
}
