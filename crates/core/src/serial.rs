//! ST7920 serial-mode deserializer.
//!
//! In serial mode the controller samples SID on the falling edge of SCLK
//! while CS is high. A transfer is three bytes, MSB first:
//!
//! ```text
//! byte 0:  1 1 1 1 1 RS RW 0    sync pattern + register select / read-write
//! byte 1:  D7 D6 D5 D4 0 0 0 0  high nibble of the payload
//! byte 2:  D3 D2 D1 D0 0 0 0 0  low nibble of the payload
//! ```
//!
//! A rising edge on CS throws away whatever was partially received.

/// Top five bits of the first byte of every transfer.
pub const SYNC_MASK: u8 = 0xF8;
const RS_BIT: u8 = 0b100;
const RW_BIT: u8 = 0b010;

/// One decoded three-byte transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Register select: true = data write, false = instruction.
    pub rs: bool,
    /// Read/write flag. Captured but never acted on.
    pub rw: bool,
    pub data: u8,
}

impl Command {
    pub fn instruction(data: u8) -> Self {
        Command { rs: false, rw: false, data }
    }

    pub fn data(data: u8) -> Self {
        Command { rs: true, rw: false, data }
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Command {
            rs: bytes[0] & RS_BIT != 0,
            rw: bytes[0] & RW_BIT != 0,
            data: bytes[1] | (bytes[2] >> 4),
        }
    }

    /// Wire encoding, as a host would clock it out.
    pub fn to_bytes(self) -> [u8; 3] {
        let mut sync = SYNC_MASK;
        if self.rs { sync |= RS_BIT; }
        if self.rw { sync |= RW_BIT; }
        [sync, self.data & 0xF0, self.data << 4]
    }
}

/// In-flight receive state. Nothing is buffered beyond one transfer.
#[derive(Debug, Clone, Default)]
pub struct ShiftRegister {
    incoming_byte: u8,
    incoming_bit_count: u8,
    incoming_cmd: [u8; 3],
    incoming_byte_count: u8,
    /// Transfers whose first byte lacked the sync pattern
    pub dbg_slips: u32,
}

impl ShiftRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift one sampled SID bit in. Returns a command once three bytes are framed.
    pub fn clock_in(&mut self, bit: bool) -> Option<Command> {
        self.incoming_byte = (self.incoming_byte << 1) | bit as u8;
        self.incoming_bit_count += 1;
        if self.incoming_bit_count < 8 {
            return None;
        }

        let byte = self.incoming_byte;
        self.incoming_byte = 0;
        self.incoming_bit_count = 0;

        // A first byte without the sync pattern is taken as the high-nibble
        // byte, leaving only one more byte to complete the transfer.
        if self.incoming_byte_count == 0 && byte & SYNC_MASK != SYNC_MASK {
            self.incoming_byte_count += 1;
            self.dbg_slips = self.dbg_slips.wrapping_add(1);
            tracing::warn!(byte, "serial: first byte without sync pattern");
        }
        self.incoming_cmd[self.incoming_byte_count as usize] = byte;
        self.incoming_byte_count += 1;

        if self.incoming_byte_count == 3 {
            let cmd = Command::from_bytes(self.incoming_cmd);
            self.incoming_cmd = [0; 3];
            self.incoming_byte_count = 0;
            return Some(cmd);
        }
        None
    }

    /// Abort any partial transfer (CS rising edge).
    pub fn reset(&mut self) {
        self.incoming_byte = 0;
        self.incoming_bit_count = 0;
        self.incoming_cmd = [0; 3];
        self.incoming_byte_count = 0;
    }

    pub fn bit_count(&self) -> u8 {
        self.incoming_bit_count
    }

    pub fn byte_count(&self) -> u8 {
        self.incoming_byte_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_byte(sr: &mut ShiftRegister, byte: u8) -> Option<Command> {
        let mut out = None;
        for i in (0..8).rev() {
            out = sr.clock_in(byte & (1 << i) != 0);
        }
        out
    }

    fn clock_bytes(sr: &mut ShiftRegister, bytes: &[u8]) -> Vec<Command> {
        bytes.iter().filter_map(|&b| clock_byte(sr, b)).collect()
    }

    #[test]
    fn test_decode_instruction() {
        let mut sr = ShiftRegister::new();
        let cmds = clock_bytes(&mut sr, &[0xF8, 0x30, 0x40]);
        assert_eq!(cmds, vec![Command { rs: false, rw: false, data: 0x34 }]);
        assert_eq!(sr.byte_count(), 0);
        assert_eq!(sr.bit_count(), 0);
    }

    #[test]
    fn test_decode_data_and_rw_flags() {
        let mut sr = ShiftRegister::new();
        let cmds = clock_bytes(&mut sr, &[0xFE, 0xA0, 0x50]);
        assert_eq!(cmds, vec![Command { rs: true, rw: true, data: 0xA5 }]);
    }

    #[test]
    fn test_wire_encoding_matches_decoder() {
        let cmd = Command::data(0x3C);
        assert_eq!(cmd.to_bytes(), [0xFC, 0x30, 0xC0]);
        assert_eq!(Command::from_bytes(cmd.to_bytes()), cmd);
    }

    #[test]
    fn test_bit_count_wraps_at_eight() {
        let mut sr = ShiftRegister::new();
        for _ in 0..7 {
            sr.clock_in(true);
        }
        assert_eq!(sr.bit_count(), 7);
        sr.clock_in(true);
        assert_eq!(sr.bit_count(), 0);
        assert_eq!(sr.byte_count(), 1);
    }

    #[test]
    fn test_first_byte_without_sync_slips_one_position() {
        let mut sr = ShiftRegister::new();
        // 0x10 is taken as the high nibble byte, 0x20 completes the transfer
        let cmds = clock_bytes(&mut sr, &[0x10, 0x20]);
        assert_eq!(cmds, vec![Command { rs: false, rw: false, data: 0x12 }]);
        assert_eq!(sr.dbg_slips, 1);
        // Framing is back in step afterwards
        let cmds = clock_bytes(&mut sr, &[0xFC, 0xF0, 0xF0]);
        assert_eq!(cmds, vec![Command::data(0xFF)]);
    }

    #[test]
    fn test_reset_discards_partial_transfer() {
        let mut sr = ShiftRegister::new();
        clock_byte(&mut sr, 0xF8);
        sr.clock_in(true);
        sr.clock_in(false);
        sr.reset();
        assert_eq!(sr.bit_count(), 0);
        assert_eq!(sr.byte_count(), 0);
        let cmds = clock_bytes(&mut sr, &[0xFC, 0x80, 0x10]);
        assert_eq!(cmds, vec![Command::data(0x81)]);
    }
}
