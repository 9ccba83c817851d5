//! Click-encoder and button emulation for the display module.
//!
//! The buttons are active low with pull-ups: whenever firmware touches one of
//! their lines the device drives back the inverse of the host's pressed state.
//! The rotary encoder drives its two lines from a Gray-code table indexed by
//! the host-controlled position.

/// Quadrature states in rotation order: bit 0 = EN1, bit 1 = EN2.
pub const ENCODER_TABLE: [u8; 4] = [1, 3, 2, 0];

/// Module buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Kill,
    Encoder,
    Back,
}

/// Beeper line transitions, forwarded to the audio side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneEvent {
    Start,
    Stop,
}

/// Host-side input: written by the frontend, read when driving pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub kill: bool,
    pub encoder_button: bool,
    pub back: bool,
    pub encoder_position: i32,
}

impl InputState {
    pub fn pressed(&self, button: Button) -> bool {
        match button {
            Button::Kill => self.kill,
            Button::Encoder => self.encoder_button,
            Button::Back => self.back,
        }
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        match button {
            Button::Kill => self.kill = pressed,
            Button::Encoder => self.encoder_button = pressed,
            Button::Back => self.back = pressed,
        }
    }

    /// Level to drive on a button line (active low).
    pub fn button_level(&self, button: Button) -> bool {
        !self.pressed(button)
    }

    /// (EN1, EN2) levels for the current position.
    pub fn encoder_levels(&self) -> (bool, bool) {
        let state = ENCODER_TABLE[self.encoder_position.rem_euclid(4) as usize];
        (state & 0x01 != 0, state & 0x02 != 0)
    }
}

/// Turns a stream of (EN1, EN2) samples back into signed steps, the way
/// firmware reads the encoder.
#[derive(Debug, Clone, Default)]
pub struct QuadratureDecoder {
    last: Option<u8>,
    pub position: i32,
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample. Returns the step taken (-1, 0 or +1).
    pub fn sample(&mut self, en1: bool, en2: bool) -> i32 {
        let state = en1 as u8 | ((en2 as u8) << 1);
        let Some(last) = self.last.replace(state) else { return 0 };
        let idx = |s: u8| ENCODER_TABLE.iter().position(|&t| t == s).unwrap_or(0) as i32;
        let step = match (idx(state) - idx(last)).rem_euclid(4) {
            1 => 1,
            3 => -1,
            // no change, or a skipped state we cannot attribute
            _ => 0,
        };
        self.position += step;
        step
    }
}
