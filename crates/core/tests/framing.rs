//! End-to-end framing through the pin bus.

use proptest::prelude::*;
use st7920_core::controller::GDRAM_STRIDE;
use st7920_core::driver::{PinDriver, SerialWriter};
use st7920_core::trace::Recorder;
use st7920_core::{Board, Command, Line, ShiftRegister};

/// Clock commands through a bare shift register, CS held high throughout.
fn decode_stream(cmds: &[Command]) -> Vec<Command> {
    let mut sr = ShiftRegister::new();
    let mut out = Vec::new();
    for cmd in cmds {
        for byte in cmd.to_bytes() {
            for i in (0..8).rev() {
                if let Some(c) = sr.clock_in(byte & (1 << i) != 0) {
                    out.push(c);
                }
            }
        }
    }
    out
}

fn arb_command() -> impl Strategy<Value = Command> {
    (any::<bool>(), any::<bool>(), any::<u8>()).prop_map(|(rs, rw, data)| Command { rs, rw, data })
}

proptest! {
    #[test]
    fn well_framed_commands_decode_one_to_one(cmds in prop::collection::vec(arb_command(), 0..40)) {
        prop_assert_eq!(decode_stream(&cmds), cmds);
    }

    #[test]
    fn cs_rise_mid_transfer_resynchronises(
        junk_bits in prop::collection::vec(any::<bool>(), 0..40),
        data in any::<u8>(),
    ) {
        let mut board = Board::default();
        board.drive(Line::Cs, true);
        for bit in junk_bits {
            board.drive(Line::Mosi, bit);
            board.drive(Line::Clk, true);
            board.drive(Line::Clk, false);
        }
        board.drive(Line::Cs, false);

        let before = board.device.controller.dbg_data_count;
        SerialWriter::new(&mut board).data(data);
        prop_assert_eq!(board.device.controller.dbg_data_count, before + 1);
        prop_assert_eq!(board.device.serial.bit_count(), 0);
        prop_assert_eq!(board.device.serial.byte_count(), 0);
    }
}

#[test]
fn data_lands_where_the_address_points() {
    let mut board = Board::default();
    let mut w = SerialWriter::new(&mut board);
    w.init_graphics();
    w.set_graphics_address(10, 3);
    w.data(0xC3);
    w.data(0x3C);
    let ram = board.device.graphic_ram();
    assert_eq!(ram[10 * GDRAM_STRIDE + 6], 0xC3);
    assert_eq!(ram[10 * GDRAM_STRIDE + 7], 0x3C);
}

#[test]
fn commands_without_cs_are_ignored() {
    let mut rec = Recorder::new();
    SerialWriter::new(&mut rec).data(0xFF);
    let mut board = Board::default();
    for &(line, level) in &rec.transitions {
        if line != Line::Cs {
            board.drive(line, level);
        }
    }
    assert_eq!(board.device.controller.dbg_data_count, 0);
    assert!(!board.device.controller.dirty);
}
