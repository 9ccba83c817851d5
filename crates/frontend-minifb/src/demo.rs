//! Stimulus for the display: a built-in demo firmware or a recorded trace.
//!
//! The demo behaves like a minimal menu firmware: it initialises graphics
//! mode, polls the encoder and buttons through the pin bus every frame,
//! beeps while the encoder is pressed, and re-sends only the GDRAM rows that
//! changed.

use st7920_core::driver::{PinDriver, SerialWriter};
use st7920_core::input::QuadratureDecoder;
use st7920_core::trace::{self, Transition};
use st7920_core::{Board, Line, SCREEN_HEIGHT, SCREEN_WIDTH};

const ROW_BYTES: usize = SCREEN_WIDTH / 8;

pub enum Stimulus {
    Demo(DemoFirmware),
    Trace(TracePlayer),
}

impl Stimulus {
    pub fn step(&mut self, board: &mut Board) {
        match self {
            Stimulus::Demo(demo) => demo.step(board),
            Stimulus::Trace(player) => player.step(board),
        }
    }

    /// The display was restored behind the stimulus' back.
    pub fn resync(&mut self) {
        if let Stimulus::Demo(demo) = self {
            demo.invalidate();
        }
    }
}

pub struct DemoFirmware {
    frame: Vec<u8>,
    shown: Option<Vec<u8>>,
    decoder: QuadratureDecoder,
    initialized: bool,
    beeping: bool,
}

impl DemoFirmware {
    pub fn new() -> Self {
        DemoFirmware {
            frame: vec![0; ROW_BYTES * SCREEN_HEIGHT],
            shown: None,
            decoder: QuadratureDecoder::new(),
            initialized: false,
            beeping: false,
        }
    }

    pub fn step(&mut self, board: &mut Board) {
        if !self.initialized {
            SerialWriter::new(board).init_graphics();
            self.initialized = true;
        }

        let en1 = board.sample(Line::Enc1);
        let en2 = board.sample(Line::Enc2);
        self.decoder.sample(en1, en2);
        // Buttons are active low
        let click = !board.sample(Line::EncBut);
        let back = !board.sample(Line::Back);
        let kill = !board.sample(Line::Kill);

        if click != self.beeping {
            board.drive(Line::Beeper, click);
            self.beeping = click;
        }

        self.draw(click, back, kill);
        self.flush(board);
    }

    /// Forget what the display shows so the next step re-sends every row.
    pub fn invalidate(&mut self) {
        self.shown = None;
    }

    fn set_pixel(&mut self, x: usize, y: usize) {
        if x < SCREEN_WIDTH && y < SCREEN_HEIGHT {
            self.frame[y * ROW_BYTES + x / 8] |= 0x80 >> (x % 8);
        }
    }

    fn rect(&mut self, x0: usize, y0: usize, w: usize, h: usize, filled: bool) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let edge = y == y0 || y == y0 + h - 1 || x == x0 || x == x0 + w - 1;
                if filled || edge {
                    self.set_pixel(x, y);
                }
            }
        }
    }

    fn draw(&mut self, click: bool, back: bool, kill: bool) {
        self.frame.fill(0);
        self.rect(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT, false);

        // Encoder position as a bar
        self.rect(4, 8, 120, 16, false);
        let fill = self.decoder.position.rem_euclid(117) as usize;
        if fill > 0 {
            self.rect(6, 10, fill, 12, true);
        }

        for (i, pressed) in [click, back, kill].into_iter().enumerate() {
            self.rect(16 + i * 40, 36, 16, 16, pressed);
        }
    }

    fn flush(&mut self, board: &mut Board) {
        let mut w = SerialWriter::new(board);
        for row in 0..SCREEN_HEIGHT {
            let range = row * ROW_BYTES..(row + 1) * ROW_BYTES;
            let changed = match &self.shown {
                Some(shown) => shown[range.clone()] != self.frame[range.clone()],
                None => true,
            };
            if changed {
                w.write_row(row as u8, &self.frame[range]);
            }
        }
        self.shown = Some(self.frame.clone());
    }
}

impl Default for DemoFirmware {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays a recorded pin trace, a fixed number of transitions per frame.
pub struct TracePlayer {
    transitions: Vec<Transition>,
    pos: usize,
    per_frame: usize,
}

impl TracePlayer {
    pub fn new(transitions: Vec<Transition>, per_frame: usize) -> Self {
        TracePlayer { transitions, pos: 0, per_frame: per_frame.max(1) }
    }

    pub fn finished(&self) -> bool {
        self.pos >= self.transitions.len()
    }

    pub fn step(&mut self, board: &mut Board) {
        if self.finished() {
            return;
        }
        let end = (self.pos + self.per_frame).min(self.transitions.len());
        trace::replay(board, &self.transitions[self.pos..end]);
        self.pos = end;
        if self.finished() {
            tracing::info!(transitions = self.transitions.len(), "trace replay finished");
        }
    }
}
