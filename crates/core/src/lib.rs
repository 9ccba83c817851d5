//! # st7920-core
//!
//! Pin-level emulation of the ST7920 128×64 dot-matrix LCD controller as
//! found on "Full Graphic Smart Controller" display modules, together with
//! the module's click encoder, buttons and beeper.
//!
//! Firmware under test toggles digital lines; the device reassembles the
//! serial protocol from those transitions, runs the instruction set against
//! its graphics RAM, and periodically renders GDRAM into an RGBA texture.
//!
//! ## Architecture
//!
//! - [`St7920`] - The device: dispatches pin events to the parts below
//! - [`serial::ShiftRegister`] - Bit/byte framing of the SCLK/SID/CS protocol
//! - [`controller::Controller`] - Basic/extended instruction set and GDRAM
//! - [`renderer::Renderer`] - Throttled GDRAM → RGBA conversion and upload
//! - [`input`] - Button, rotary encoder and beeper line emulation
//! - [`gpio`] - Pin handles, events and the reference [`gpio::Gpio`] bus
//! - [`board::Board`] - Synchronous event delivery between a bus and the device
//! - [`driver`] - Host-side serial writer used by tests and the demo firmware
//! - [`trace`] - Text pin traces for record/replay
//! - [`capture`] - PBM/PNG export of the display
//! - [`snapshot`] - In-session controller snapshots

pub mod board;
pub mod capture;
pub mod controller;
pub mod driver;
pub mod error;
pub mod gpio;
pub mod input;
pub mod renderer;
pub mod serial;
pub mod snapshot;
pub mod trace;

use std::collections::VecDeque;
use std::time::Instant;

pub use board::Board;
pub use controller::Controller;
pub use error::{Error, Result};
pub use gpio::{EventKind, Gpio, GpioEvent, Line, PinBus, PinId, PinMap};
pub use input::{Button, InputState, ToneEvent};
pub use renderer::{Palette, RenderSurface, Renderer, TextureId, TextureParams};
pub use serial::{Command, ShiftRegister};
pub use snapshot::{RewindBuffer, Snapshot};

/// Visible display width in pixels
pub const SCREEN_WIDTH: usize = 128;
/// Visible display height in pixels
pub const SCREEN_HEIGHT: usize = 64;
/// Undrained beeper events kept; older ones are dropped first
pub const TONE_EVENT_LIMIT: usize = 256;

/// ST7920 display module attached to nine digital lines.
pub struct St7920 {
    pins: PinMap,
    pub serial: ShiftRegister,
    pub controller: Controller,
    pub renderer: Renderer,
    pub input: InputState,
    beeper_on: bool,
    tone_events: VecDeque<ToneEvent>,
}

impl St7920 {
    pub fn new(pins: PinMap, palette: Palette) -> Self {
        St7920 {
            pins,
            serial: ShiftRegister::new(),
            controller: Controller::new(),
            renderer: Renderer::new(palette),
            input: InputState::default(),
            beeper_on: false,
            tone_events: VecDeque::new(),
        }
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    /// Create the display texture on `surface`.
    pub fn init(&mut self, surface: &mut dyn RenderSurface) -> Result<()> {
        self.renderer.init(surface)
    }

    /// Handle one event on a subscribed line.
    pub fn interrupt(&mut self, event: GpioEvent, bus: &mut dyn PinBus) {
        let Some(line) = self.pins.line(event.pin) else { return };
        match (line, event.kind) {
            (Line::Clk, EventKind::Fall) => {
                if bus.level(self.pins.cs) {
                    let bit = bus.level(self.pins.mosi);
                    if let Some(cmd) = self.serial.clock_in(bit) {
                        self.controller.process_command(cmd);
                    }
                }
            }
            (Line::Cs, EventKind::Rise) => self.serial.reset(),
            (Line::Beeper, EventKind::Rise) => {
                self.beeper_on = true;
                self.push_tone(ToneEvent::Start);
            }
            (Line::Beeper, EventKind::Fall) => {
                self.beeper_on = false;
                self.push_tone(ToneEvent::Stop);
            }
            (Line::Kill, _) => bus.set_level(self.pins.kill, self.input.button_level(Button::Kill)),
            (Line::EncBut, _) => {
                bus.set_level(self.pins.enc_but, self.input.button_level(Button::Encoder))
            }
            (Line::Back, _) => bus.set_level(self.pins.back, self.input.button_level(Button::Back)),
            (Line::Enc1, _) | (Line::Enc2, _) => {
                let (en1, en2) = self.input.encoder_levels();
                bus.set_level(self.pins.enc1, en1);
                bus.set_level(self.pins.enc2, en2);
            }
            _ => {}
        }
    }

    fn push_tone(&mut self, ev: ToneEvent) {
        if self.tone_events.len() == TONE_EVENT_LIMIT {
            self.tone_events.pop_front();
        }
        self.tone_events.push_back(ev);
    }

    /// Render tick. Returns true if a new frame was uploaded.
    pub fn update(&mut self, now: Instant, surface: &mut dyn RenderSurface) -> Result<bool> {
        let St7920 { controller, renderer, .. } = self;
        renderer.update(now, &controller.graphic_ram, &mut controller.dirty, surface)
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.input.set_button(button, pressed);
    }

    /// Move the encoder by `steps` detent quarter-steps (positive = clockwise).
    pub fn rotate_encoder(&mut self, steps: i32) {
        self.input.encoder_position = self.input.encoder_position.wrapping_add(steps);
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn beeper_on(&self) -> bool {
        self.beeper_on
    }

    pub fn take_tone_events(&mut self) -> Vec<ToneEvent> {
        self.tone_events.drain(..).collect()
    }

    /// Save controller state as a snapshot (for rewind).
    pub fn save_snapshot(&self, frame: u32) -> Snapshot {
        Snapshot::capture(&self.controller, frame)
    }

    /// Restore controller state. Any half-received transfer is discarded.
    pub fn restore_snapshot(&mut self, snap: &Snapshot) {
        snap.restore(&mut self.controller);
        self.serial.reset();
    }

    /// Step back to the most recent snapshot in `history`, returning its frame.
    pub fn rewind(&mut self, history: &mut RewindBuffer) -> Option<u32> {
        let snap = history.pop()?;
        self.restore_snapshot(&snap);
        tracing::debug!(frame = snap.frame, left = history.len(), "rewind");
        Some(snap.frame)
    }

    pub fn graphic_ram(&self) -> &[u8] {
        self.controller.graphic_ram()
    }

    pub fn framebuffer_rgba(&self) -> &[u8] {
        &self.renderer.framebuffer
    }

    pub fn framebuffer_u32(&self) -> Vec<u32> {
        self.renderer.as_pixel_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> (St7920, Gpio) {
        let pins = PinMap::default();
        let mut gpio = Gpio::new();
        for pin in pins.pins() {
            gpio.attach(pin);
        }
        (St7920::new(pins, Palette::default()), gpio)
    }

    fn fire(dev: &mut St7920, gpio: &mut Gpio, pin: PinId, kind: EventKind) {
        dev.interrupt(GpioEvent { pin, kind }, gpio);
    }

    #[test]
    fn test_clock_ignored_while_deselected() {
        let (mut dev, mut gpio) = device();
        let pins = *dev.pins();
        gpio.set_level(pins.mosi, true);
        for _ in 0..24 {
            fire(&mut dev, &mut gpio, pins.clk, EventKind::Fall);
        }
        assert_eq!(dev.serial.bit_count(), 0);
        assert_eq!(dev.serial.byte_count(), 0);
    }

    #[test]
    fn test_clock_rise_does_not_sample() {
        let (mut dev, mut gpio) = device();
        let pins = *dev.pins();
        gpio.set_level(pins.cs, true);
        fire(&mut dev, &mut gpio, pins.clk, EventKind::Rise);
        assert_eq!(dev.serial.bit_count(), 0);
        fire(&mut dev, &mut gpio, pins.clk, EventKind::Fall);
        assert_eq!(dev.serial.bit_count(), 1);
    }

    #[test]
    fn test_beeper_events() {
        let (mut dev, mut gpio) = device();
        let beeper = dev.pins().beeper;
        fire(&mut dev, &mut gpio, beeper, EventKind::Rise);
        assert!(dev.beeper_on());
        fire(&mut dev, &mut gpio, beeper, EventKind::Fall);
        fire(&mut dev, &mut gpio, beeper, EventKind::Sample);
        assert!(!dev.beeper_on());
        assert_eq!(dev.take_tone_events(), vec![ToneEvent::Start, ToneEvent::Stop]);
        assert!(dev.take_tone_events().is_empty());
    }

    #[test]
    fn test_button_loopback() {
        let (mut dev, mut gpio) = device();
        let pins = *dev.pins();
        dev.set_button(Button::Back, true);
        fire(&mut dev, &mut gpio, pins.back, EventKind::Sample);
        assert!(!gpio.level(pins.back));
        fire(&mut dev, &mut gpio, pins.kill, EventKind::Sample);
        assert!(gpio.level(pins.kill));
        dev.set_button(Button::Back, false);
        fire(&mut dev, &mut gpio, pins.back, EventKind::Fall);
        assert!(gpio.level(pins.back));
    }

    #[test]
    fn test_encoder_drives_both_lines() {
        let (mut dev, mut gpio) = device();
        let pins = *dev.pins();
        dev.rotate_encoder(1);
        fire(&mut dev, &mut gpio, pins.enc2, EventKind::Sample);
        assert_eq!((gpio.level(pins.enc1), gpio.level(pins.enc2)), (true, true));
        dev.rotate_encoder(2);
        fire(&mut dev, &mut gpio, pins.enc1, EventKind::Rise);
        assert_eq!((gpio.level(pins.enc1), gpio.level(pins.enc2)), (false, false));
    }

    #[test]
    fn test_tone_events_bounded() {
        let (mut dev, mut gpio) = device();
        let beeper = dev.pins().beeper;
        for _ in 0..TONE_EVENT_LIMIT {
            fire(&mut dev, &mut gpio, beeper, EventKind::Rise);
            fire(&mut dev, &mut gpio, beeper, EventKind::Fall);
        }
        let events = dev.take_tone_events();
        assert_eq!(events.len(), TONE_EVENT_LIMIT);
        assert_eq!(events.last(), Some(&ToneEvent::Stop));
    }

    #[test]
    fn test_rewind_restores_gdram_and_drops_partial_transfer() {
        let (mut dev, mut gpio) = device();
        let pins = *dev.pins();
        dev.controller.process_command(Command::data(0x11));
        let mut history = RewindBuffer::new(4, 1);
        history.push(dev.save_snapshot(5));

        dev.controller.process_command(Command::data(0x22));
        gpio.set_level(pins.cs, true);
        for _ in 0..5 {
            fire(&mut dev, &mut gpio, pins.clk, EventKind::Fall);
        }
        dev.controller.dirty = false;

        assert_eq!(dev.rewind(&mut history), Some(5));
        assert_eq!(&dev.graphic_ram()[..2], &[0x11, 0x00]);
        assert_eq!(dev.controller.coordinate(), [0, 1]);
        assert_eq!(dev.serial.bit_count(), 0);
        assert!(dev.controller.dirty);
        assert_eq!(dev.rewind(&mut history), None);
    }

    #[test]
    fn test_unknown_pin_ignored() {
        let (mut dev, mut gpio) = device();
        fire(&mut dev, &mut gpio, PinId(200), EventKind::Rise);
        assert_eq!(gpio.pending(), 0);
    }
}
