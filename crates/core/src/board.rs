//! A simulated board: one pin bus with the display module attached.
//!
//! Every level change made through the board is delivered to the device
//! before the call returns, in the order the events were raised. Levels the
//! device drives while handling an event queue further events, which are
//! drained in the same loop rather than re-entrantly.

use crate::driver::PinDriver;
use crate::gpio::{Gpio, Line, PinBus, PinMap};
use crate::renderer::Palette;
use crate::St7920;

pub struct Board {
    pub gpio: Gpio,
    pub device: St7920,
    /// Events delivered to the device so far
    pub dbg_event_count: u64,
}

impl Board {
    pub fn new(pins: PinMap, palette: Palette) -> Self {
        let mut gpio = Gpio::new();
        for pin in pins.pins() {
            gpio.attach(pin);
        }
        Board { gpio, device: St7920::new(pins, palette), dbg_event_count: 0 }
    }

    /// Firmware reads a line. The device may drive it in response.
    pub fn sample(&mut self, line: Line) -> bool {
        let pin = self.device.pins().pin(line);
        self.gpio.sample(pin);
        self.pump();
        self.gpio.level(pin)
    }

    pub fn level(&self, line: Line) -> bool {
        self.gpio.level(self.device.pins().pin(line))
    }

    fn pump(&mut self) {
        while let Some(event) = self.gpio.next_event() {
            self.device.interrupt(event, &mut self.gpio);
            self.dbg_event_count = self.dbg_event_count.wrapping_add(1);
        }
    }
}

impl PinDriver for Board {
    fn drive(&mut self, line: Line, level: bool) {
        let pin = self.device.pins().pin(line);
        self.gpio.set_level(pin, level);
        self.pump();
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::new(PinMap::default(), Palette::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Button;

    #[test]
    fn test_sample_reflects_host_input() {
        let mut board = Board::default();
        assert!(board.sample(Line::EncBut));
        board.device.set_button(Button::Encoder, true);
        assert!(!board.sample(Line::EncBut));
        board.device.set_button(Button::Encoder, false);
        assert!(board.sample(Line::EncBut));
    }

    #[test]
    fn test_loopback_settles() {
        let mut board = Board::default();
        board.device.rotate_encoder(2);
        board.sample(Line::Enc1);
        assert_eq!(board.gpio.pending(), 0);
        assert_eq!((board.level(Line::Enc1), board.level(Line::Enc2)), (false, true));
    }

    #[test]
    fn test_beeper_through_board() {
        let mut board = Board::default();
        board.drive(Line::Beeper, true);
        board.drive(Line::Beeper, false);
        assert_eq!(board.device.take_tone_events().len(), 2);
    }
}
