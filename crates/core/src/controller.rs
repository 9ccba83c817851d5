//! ST7920 instruction set and graphics RAM.
//!
//! The controller has a basic and an extended instruction set, switched by
//! the function-set instruction (bit 5) which is present in both. Opcodes
//! are priority encoded: the highest set bit of the instruction byte picks
//! the instruction. Only the instructions that change addressing, mode or
//! GDRAM contents have an effect here; the rest are accepted so firmware
//! init sequences stay in step.
//!
//! GDRAM is 64 rows of 256 bits. Only the left 128 bits of each row are
//! visible on a 128×64 module.

use crate::serial::Command;

/// Bytes per GDRAM row (256 bits).
pub const GDRAM_STRIDE: usize = 256 / 8;
/// GDRAM rows.
pub const GDRAM_ROWS: usize = 64;
pub const GDRAM_SIZE: usize = GDRAM_STRIDE * GDRAM_ROWS;

/// The column pointer wraps to zero once it passes this value.
const COLUMN_WRAP: u8 = 32;

/// Priority-encoded opcode in the extended instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedOp {
    SetGraphicsAddress,
    ScrollOrIramAddress,
    FunctionSet,
    Unknown,
    DisplayStatus,
    Reverse,
    VerticalScrollSelect,
    Standby,
}

/// Priority-encoded opcode in the basic instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicOp {
    SetDdramAddress,
    SetCgramAddress,
    FunctionSet,
    CursorDisplayControl,
    DisplayControl,
    EntryModeSet,
    ReturnHome,
    DisplayClear,
}

/// Position of the highest set bit, or `None` for zero.
fn opcode_bit(byte: u8) -> Option<u32> {
    if byte == 0 { None } else { Some(7 - byte.leading_zeros()) }
}

impl ExtendedOp {
    pub fn decode(byte: u8) -> Option<Self> {
        Some(match opcode_bit(byte)? {
            7 => ExtendedOp::SetGraphicsAddress,
            6 => ExtendedOp::ScrollOrIramAddress,
            5 => ExtendedOp::FunctionSet,
            4 => ExtendedOp::Unknown,
            3 => ExtendedOp::DisplayStatus,
            2 => ExtendedOp::Reverse,
            1 => ExtendedOp::VerticalScrollSelect,
            _ => ExtendedOp::Standby,
        })
    }
}

impl BasicOp {
    pub fn decode(byte: u8) -> Option<Self> {
        Some(match opcode_bit(byte)? {
            7 => BasicOp::SetDdramAddress,
            6 => BasicOp::SetCgramAddress,
            5 => BasicOp::FunctionSet,
            4 => BasicOp::CursorDisplayControl,
            3 => BasicOp::DisplayControl,
            2 => BasicOp::EntryModeSet,
            1 => BasicOp::ReturnHome,
            _ => BasicOp::DisplayClear,
        })
    }
}

/// ST7920 command interpreter state
pub struct Controller {
    /// Graphics RAM, 32 bytes per row
    pub(crate) graphic_ram: Vec<u8>,
    /// [0] = row, [1] = byte within row
    pub(crate) coordinate: [u8; 2],
    /// Which half of a set-graphics-address pair comes next
    pub(crate) coordinate_index: u8,
    pub(crate) extended_instruction_set: bool,
    pub(crate) address_increment: bool,
    /// GDRAM changed since the renderer last looked
    pub dirty: bool,
    /// Debug counters (reset by the frontend)
    pub dbg_cmd_count: u32,
    pub dbg_data_count: u32,
}

impl Controller {
    pub fn new() -> Self {
        Controller {
            graphic_ram: vec![0; GDRAM_SIZE],
            coordinate: [0; 2],
            coordinate_index: 0,
            extended_instruction_set: false,
            address_increment: false,
            dirty: false,
            dbg_cmd_count: 0,
            dbg_data_count: 0,
        }
    }

    pub fn process_command(&mut self, cmd: Command) {
        tracing::trace!(rs = cmd.rs, rw = cmd.rw, data = cmd.data, "st7920 command");
        if cmd.rs {
            self.receive_data(cmd.data);
        } else if self.extended_instruction_set {
            self.receive_extended(cmd.data);
        } else {
            self.receive_basic(cmd.data);
        }
    }

    pub fn receive_data(&mut self, byte: u8) {
        self.dbg_data_count = self.dbg_data_count.wrapping_add(1);
        let index = self.coordinate[1] as usize + self.coordinate[0] as usize * GDRAM_STRIDE;
        // Row 63 with the column pointer at 32/33 lands past the end of GDRAM
        if let Some(slot) = self.graphic_ram.get_mut(index) {
            *slot = byte;
            self.dirty = true;
        }
        self.coordinate[1] += 1;
        if self.coordinate[1] > COLUMN_WRAP {
            self.coordinate[1] = 0;
        }
    }

    fn receive_extended(&mut self, byte: u8) {
        self.dbg_cmd_count = self.dbg_cmd_count.wrapping_add(1);
        match ExtendedOp::decode(byte) {
            Some(ExtendedOp::SetGraphicsAddress) => {
                // Vertical address first, then horizontal (16-bit words).
                // Words 8..15 address the lower half of the screen.
                self.coordinate[self.coordinate_index as usize] = byte & 0x7F;
                self.coordinate_index += 1;
                if self.coordinate_index == 2 {
                    self.coordinate_index = 0;
                    self.coordinate[1] *= 2;
                    if self.coordinate[1] >= 16 {
                        self.coordinate[1] = 0;
                        self.coordinate[0] += 32;
                    }
                }
            }
            Some(ExtendedOp::FunctionSet) => self.function_set(byte),
            // Scroll, reverse, standby etc. are accepted without effect
            Some(_) | None => {}
        }
    }

    fn receive_basic(&mut self, byte: u8) {
        self.dbg_cmd_count = self.dbg_cmd_count.wrapping_add(1);
        match BasicOp::decode(byte) {
            Some(BasicOp::FunctionSet) => self.function_set(byte),
            Some(BasicOp::EntryModeSet) => {
                self.address_increment = byte & 0x01 != 0;
            }
            // DDRAM/CGRAM addressing, display control, home, clear: text mode only
            Some(_) | None => {}
        }
    }

    /// Function set: 0b001 DL X RE G 0. RE (bit 2) selects the extended set.
    fn function_set(&mut self, byte: u8) {
        let extended = byte & 0b100 != 0;
        if extended != self.extended_instruction_set {
            tracing::debug!(extended, "st7920 instruction set switched");
        }
        self.extended_instruction_set = extended;
    }

    pub fn graphic_ram(&self) -> &[u8] {
        &self.graphic_ram
    }

    pub fn coordinate(&self) -> [u8; 2] {
        self.coordinate
    }

    pub fn coordinate_index(&self) -> u8 {
        self.coordinate_index
    }

    pub fn extended_instruction_set(&self) -> bool {
        self.extended_instruction_set
    }

    pub fn address_increment(&self) -> bool {
        self.address_increment
    }

    /// Reset per-frame debug counters
    pub fn dbg_reset_counters(&mut self) {
        self.dbg_cmd_count = 0;
        self.dbg_data_count = 0;
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
