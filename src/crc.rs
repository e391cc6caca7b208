//! Wire checksums.
//!
//! Two CRCs protect bus traffic: CRC5 (polynomial x⁵+x²+1) over the 11-bit
//! token field, and CRC16 (polynomial x¹⁶+x¹⁵+x²+1) over data payloads.
//! Both are implemented in their reflected form so bits go through in wire
//! order (LSB first) without any reversal step.
//!
//! The transmitter complements the register and sends it out LSB first.
//! Because of that, a receiver that keeps clocking the received check bits
//! through the same register ends on a fixed residual value instead of
//! zero; comparing against the residual is the whole validity check.

/// Token-field CRC.
#[derive(Debug)]
pub struct Crc5(u8);

impl Crc5 {
    /// Register value left behind by a clean token.
    pub const RESIDUAL: u8 = 0b00110;

    /// x⁵+x²+1, reflected.
    const POLY: u8 = 0x14;

    pub const fn new() -> Self {
        Crc5(0x1F)
    }

    /// Clock one bit through the register.
    pub fn update(&mut self, bit: bool) {
        let feedback = ((self.0 & 1) != 0) != bit;
        self.0 >>= 1;
        if feedback {
            self.0 ^= Self::POLY;
        }
    }

    /// Clock the low `count` bits of `value`, LSB first.
    pub fn update_bits(&mut self, value: u16, count: u32) {
        for i in 0..count {
            self.update(value & (1 << i) != 0);
        }
    }

    /// Current register value.
    pub fn value(&self) -> u8 {
        self.0
    }

    /// True once the register holds the clean-frame residual.
    pub fn good(&self) -> bool {
        self.0 == Self::RESIDUAL
    }

    /// Check bits to transmit (complemented, low 5 bits, send LSB first).
    pub fn transmit(&self) -> u8 {
        !self.0 & 0x1F
    }
}

/// Data-payload CRC.
#[derive(Debug)]
pub struct Crc16(u16);

impl Crc16 {
    /// Register value left behind by a clean data packet.
    pub const RESIDUAL: u16 = 0xB001;

    /// x¹⁶+x¹⁵+x²+1, reflected.
    const POLY: u16 = 0xA001;

    pub const fn new() -> Self {
        Crc16(0xFFFF)
    }

    pub fn update_bit(&mut self, bit: bool) {
        let feedback = ((self.0 & 1) != 0) != bit;
        self.0 >>= 1;
        if feedback {
            self.0 ^= Self::POLY;
        }
    }

    /// Clock a whole byte through, LSB first.
    pub fn update(&mut self, byte: u8) {
        for i in 0..8 {
            self.update_bit(byte & (1 << i) != 0);
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn good(&self) -> bool {
        self.0 == Self::RESIDUAL
    }

    /// Check bytes to transmit (complemented, low byte first).
    pub fn transmit(&self) -> [u8; 2] {
        let check = !self.0;
        [check as u8, (check >> 8) as u8]
    }
}
