//! Digital pin bus shared between firmware and the emulated controller.
//!
//! Pins are plain numeric handles. The controller never owns them: it reads
//! and drives levels through [`PinBus`] and reacts to [`GpioEvent`]s that the
//! surrounding board delivers. [`Gpio`] is the reference bus used by
//! [`Board`](crate::board::Board), the frontend and the tests.

use std::collections::VecDeque;
use std::fmt;

/// Opaque handle for one digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u16);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {}", self.0)
    }
}

/// What happened on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Rise,
    Fall,
    /// Firmware read the line's level.
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioEvent {
    pub pin: PinId,
    pub kind: EventKind,
}

/// Level access the controller needs while handling an event.
pub trait PinBus {
    fn level(&self, pin: PinId) -> bool;
    fn set_level(&mut self, pin: PinId, level: bool);
}

/// The nine logical lines of an ST7920 display module with encoder/buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Clk,
    Mosi,
    Cs,
    Beeper,
    Enc1,
    Enc2,
    EncBut,
    Back,
    Kill,
}

impl Line {
    pub const ALL: [Line; 9] = [
        Line::Clk, Line::Mosi, Line::Cs, Line::Beeper,
        Line::Enc1, Line::Enc2, Line::EncBut, Line::Back, Line::Kill,
    ];

    /// Short name used in pin traces.
    pub fn name(self) -> &'static str {
        match self {
            Line::Clk => "clk",
            Line::Mosi => "mosi",
            Line::Cs => "cs",
            Line::Beeper => "beeper",
            Line::Enc1 => "enc1",
            Line::Enc2 => "enc2",
            Line::EncBut => "enc_but",
            Line::Back => "back",
            Line::Kill => "kill",
        }
    }

    pub fn from_name(name: &str) -> Option<Line> {
        Line::ALL.iter().copied().find(|l| l.name() == name)
    }
}

/// Assignment of logical lines to pin handles. Fixed once the device is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub clk: PinId,
    pub mosi: PinId,
    pub cs: PinId,
    pub beeper: PinId,
    pub enc1: PinId,
    pub enc2: PinId,
    pub enc_but: PinId,
    pub back: PinId,
    pub kill: PinId,
}

impl PinMap {
    pub fn pin(&self, line: Line) -> PinId {
        match line {
            Line::Clk => self.clk,
            Line::Mosi => self.mosi,
            Line::Cs => self.cs,
            Line::Beeper => self.beeper,
            Line::Enc1 => self.enc1,
            Line::Enc2 => self.enc2,
            Line::EncBut => self.enc_but,
            Line::Back => self.back,
            Line::Kill => self.kill,
        }
    }

    /// Reverse lookup used to dispatch incoming events.
    pub fn line(&self, pin: PinId) -> Option<Line> {
        Line::ALL.iter().copied().find(|&l| self.pin(l) == pin)
    }

    /// Every pin the device subscribes to.
    pub fn pins(&self) -> [PinId; 9] {
        Line::ALL.map(|l| self.pin(l))
    }
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            clk: PinId(0),
            mosi: PinId(1),
            cs: PinId(2),
            beeper: PinId(3),
            enc1: PinId(4),
            enc2: PinId(5),
            enc_but: PinId(6),
            back: PinId(7),
            kill: PinId(8),
        }
    }
}

/// Reference pin bus: level per pin, a set of attached pins, and a FIFO of
/// events raised on attached pins that have not been delivered yet.
pub struct Gpio {
    levels: Vec<bool>,
    attached: Vec<bool>,
    pending: VecDeque<GpioEvent>,
}

impl Gpio {
    pub fn new() -> Self {
        Gpio { levels: Vec::new(), attached: Vec::new(), pending: VecDeque::new() }
    }

    fn slot(vec: &mut Vec<bool>, pin: PinId) -> &mut bool {
        let idx = pin.0 as usize;
        if idx >= vec.len() {
            vec.resize(idx + 1, false);
        }
        &mut vec[idx]
    }

    /// Subscribe a pin: level changes and samples on it raise events.
    pub fn attach(&mut self, pin: PinId) {
        *Self::slot(&mut self.attached, pin) = true;
    }

    pub fn is_attached(&self, pin: PinId) -> bool {
        self.attached.get(pin.0 as usize).copied().unwrap_or(false)
    }

    /// Read a level and raise a `Sample` event on attached pins.
    pub fn sample(&mut self, pin: PinId) -> bool {
        if self.is_attached(pin) {
            self.pending.push_back(GpioEvent { pin, kind: EventKind::Sample });
        }
        self.level(pin)
    }

    pub fn next_event(&mut self) -> Option<GpioEvent> {
        self.pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl PinBus for Gpio {
    fn level(&self, pin: PinId) -> bool {
        self.levels.get(pin.0 as usize).copied().unwrap_or(false)
    }

    fn set_level(&mut self, pin: PinId, level: bool) {
        let attached = self.is_attached(pin);
        let slot = Self::slot(&mut self.levels, pin);
        if *slot == level {
            return;
        }
        *slot = level;
        if attached {
            let kind = if level { EventKind::Rise } else { EventKind::Fall };
            self.pending.push_back(GpioEvent { pin, kind });
        }
    }
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_only_on_change() {
        let mut gpio = Gpio::new();
        let p = PinId(3);
        gpio.attach(p);
        gpio.set_level(p, true);
        gpio.set_level(p, true);
        gpio.set_level(p, false);
        assert_eq!(gpio.next_event(), Some(GpioEvent { pin: p, kind: EventKind::Rise }));
        assert_eq!(gpio.next_event(), Some(GpioEvent { pin: p, kind: EventKind::Fall }));
        assert_eq!(gpio.next_event(), None);
    }

    #[test]
    fn test_unattached_pin_is_silent() {
        let mut gpio = Gpio::new();
        gpio.set_level(PinId(10), true);
        assert!(gpio.level(PinId(10)));
        assert!(gpio.sample(PinId(10)));
        assert_eq!(gpio.pending(), 0);
    }

    #[test]
    fn test_sample_raises_event() {
        let mut gpio = Gpio::new();
        gpio.attach(PinId(1));
        assert!(!gpio.sample(PinId(1)));
        assert_eq!(gpio.next_event().map(|e| e.kind), Some(EventKind::Sample));
    }

    #[test]
    fn test_pin_map_lookup() {
        let map = PinMap::default();
        for line in Line::ALL {
            assert_eq!(map.line(map.pin(line)), Some(line));
            assert_eq!(Line::from_name(line.name()), Some(line));
        }
        assert_eq!(map.line(PinId(99)), None);
    }
}
