//! Text pin traces.
//!
//! One transition per line, `<line> <0|1>`, e.g. `clk 1`. Line names are
//! those of [`Line::name`]. `#` starts a comment.

use crate::driver::PinDriver;
use crate::error::{Error, Result};
use crate::gpio::Line;

pub type Transition = (Line, bool);

/// Parse a trace. Errors carry the 1-based line number.
pub fn parse(text: &str) -> Result<Vec<Transition>> {
    let mut out = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(level), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Trace { line: line_no, message: format!("expected `<line> <level>`, got `{}`", line) });
        };
        let pin = Line::from_name(name)
            .ok_or_else(|| Error::Trace { line: line_no, message: format!("unknown line `{}`", name) })?;
        let level = match level {
            "0" => false,
            "1" => true,
            other => {
                return Err(Error::Trace { line: line_no, message: format!("bad level `{}`", other) })
            }
        };
        out.push((pin, level));
    }
    Ok(out)
}

pub fn format(transitions: &[Transition]) -> String {
    let mut s = String::with_capacity(transitions.len() * 7);
    for &(line, level) in transitions {
        s.push_str(line.name());
        s.push(' ');
        s.push(if level { '1' } else { '0' });
        s.push('\n');
    }
    s
}

/// Drive a sequence of transitions into `target`.
pub fn replay<D: PinDriver>(target: &mut D, transitions: &[Transition]) {
    for &(line, level) in transitions {
        target.drive(line, level);
    }
}

/// Records transitions instead of driving real pins.
#[derive(Debug, Default)]
pub struct Recorder {
    pub transitions: Vec<Transition>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PinDriver for Recorder {
    fn drive(&mut self, line: Line, level: bool) {
        self.transitions.push((line, level));
    }
}
