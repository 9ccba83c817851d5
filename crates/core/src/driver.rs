//! Host side of the serial link: bit-bangs commands the way firmware does.
//!
//! Each transfer raises CS (which also resets the receiver), clocks out
//! the three protocol bytes MSB first with SID set up while SCLK is high,
//! and drops CS again. SCLK idles low so every bit ends in a falling edge.

use crate::gpio::Line;
use crate::serial::Command;

/// Something firmware-side code can drive lines through.
pub trait PinDriver {
    fn drive(&mut self, line: Line, level: bool);
}

/// Extended-set instruction: set GDRAM address (vertical first, then horizontal).
pub const SET_GRAPHICS_ADDRESS: u8 = 0x80;
/// Function set, 8-bit interface, basic instruction set.
pub const FUNCTION_SET_BASIC: u8 = 0x30;
/// Function set, 8-bit interface, extended instruction set.
pub const FUNCTION_SET_EXTENDED: u8 = 0x34;
/// Extended function set with graphic display on.
pub const FUNCTION_SET_GRAPHICS: u8 = 0x36;
/// Display on, cursor and blink off.
pub const DISPLAY_ON: u8 = 0x0C;
pub const DISPLAY_CLEAR: u8 = 0x01;
/// Entry mode: cursor moves right.
pub const ENTRY_MODE: u8 = 0x06;

pub struct SerialWriter<'a, D: PinDriver> {
    pins: &'a mut D,
}

impl<'a, D: PinDriver> SerialWriter<'a, D> {
    pub fn new(pins: &'a mut D) -> Self {
        SerialWriter { pins }
    }

    fn write_byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            self.pins.drive(Line::Mosi, byte & (1 << i) != 0);
            self.pins.drive(Line::Clk, true);
            self.pins.drive(Line::Clk, false);
        }
    }

    /// Raw bytes inside one CS window, no sync handling.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.pins.drive(Line::Clk, false);
        self.pins.drive(Line::Cs, true);
        for &b in bytes {
            self.write_byte(b);
        }
        self.pins.drive(Line::Cs, false);
    }

    pub fn command(&mut self, cmd: Command) {
        self.write_raw(&cmd.to_bytes());
    }

    pub fn instruction(&mut self, byte: u8) {
        self.command(Command::instruction(byte));
    }

    pub fn data(&mut self, byte: u8) {
        self.command(Command::data(byte));
    }

    /// Point GDRAM writes at `row` (0..64), 16-bit word `word` (0..8).
    /// Rows 32..63 live at horizontal words 8..15 of rows 0..31.
    pub fn set_graphics_address(&mut self, row: u8, word: u8) {
        let (vertical, horizontal) = if row >= 32 { (row - 32, word + 8) } else { (row, word) };
        self.instruction(SET_GRAPHICS_ADDRESS | (vertical & 0x3F));
        self.instruction(SET_GRAPHICS_ADDRESS | (horizontal & 0x0F));
    }

    /// Power-on sequence for graphics mode.
    pub fn init_graphics(&mut self) {
        self.instruction(FUNCTION_SET_BASIC);
        self.instruction(DISPLAY_ON);
        self.instruction(DISPLAY_CLEAR);
        self.instruction(ENTRY_MODE);
        self.instruction(FUNCTION_SET_EXTENDED);
        self.instruction(FUNCTION_SET_GRAPHICS);
    }

    /// Push one visible row (16 bytes, MSB = leftmost pixel).
    pub fn write_row(&mut self, row: u8, bytes: &[u8]) {
        self.set_graphics_address(row, 0);
        for &b in bytes {
            self.data(b);
        }
    }

    /// Push a whole 128×64 frame, `frame` is 64 rows of 16 bytes.
    pub fn write_frame(&mut self, frame: &[u8]) {
        for (row, bytes) in frame.chunks(16).take(64).enumerate() {
            self.write_row(row as u8, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::controller::GDRAM_STRIDE;

    #[test]
    fn test_init_enters_extended_mode() {
        let mut board = Board::default();
        SerialWriter::new(&mut board).init_graphics();
        assert!(board.device.controller.extended_instruction_set());
    }

    #[test]
    fn test_write_row_lands_in_gdram() {
        let mut board = Board::default();
        let mut w = SerialWriter::new(&mut board);
        w.init_graphics();
        w.write_row(2, &[0xDE, 0xAD]);
        w.write_row(40, &[0xBE, 0xEF]);
        let ram = board.device.graphic_ram();
        assert_eq!(&ram[2 * GDRAM_STRIDE..2 * GDRAM_STRIDE + 2], &[0xDE, 0xAD]);
        assert_eq!(&ram[40 * GDRAM_STRIDE..40 * GDRAM_STRIDE + 2], &[0xBE, 0xEF]);
    }

    #[test]
    fn test_write_frame_round_trip() {
        let mut board = Board::default();
        let frame: Vec<u8> = (0..64 * 16).map(|i| (i * 7 % 251) as u8).collect();
        let mut w = SerialWriter::new(&mut board);
        w.init_graphics();
        w.write_frame(&frame);
        let ram = board.device.graphic_ram();
        for row in 0..64 {
            assert_eq!(&ram[row * GDRAM_STRIDE..row * GDRAM_STRIDE + 16], &frame[row * 16..row * 16 + 16]);
        }
    }
}
