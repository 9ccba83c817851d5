//! Controller snapshots for in-session rewind and comparison.
//!
//! A snapshot holds GDRAM, addressing and mode state. It does not include
//! the half-received serial transfer: snapshots are taken between frames.
//!
//! ## Encoded form
//!
//! ```text
//! +------------------+
//! | Magic "S792"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::controller::{Controller, GDRAM_SIZE};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"S792";
const FORMAT_VERSION: u32 = 1;

/// A frozen copy of controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub graphic_ram: Vec<u8>,
    pub coordinate: [u8; 2],
    pub coordinate_index: u8,
    pub extended_instruction_set: bool,
    pub address_increment: bool,
    /// Frame number when this snapshot was taken
    pub frame: u32,
}

impl Snapshot {
    pub fn capture(controller: &Controller, frame: u32) -> Self {
        Snapshot {
            graphic_ram: controller.graphic_ram.clone(),
            coordinate: controller.coordinate,
            coordinate_index: controller.coordinate_index,
            extended_instruction_set: controller.extended_instruction_set,
            address_increment: controller.address_increment,
            frame,
        }
    }

    /// Put the controller back in this state. GDRAM is marked dirty so the
    /// next render tick shows it.
    pub fn restore(&self, controller: &mut Controller) {
        controller.graphic_ram.clone_from(&self.graphic_ram);
        controller.coordinate = self.coordinate;
        controller.coordinate_index = self.coordinate_index;
        controller.extended_instruction_set = self.extended_instruction_set;
        controller.address_increment = self.address_increment;
        controller.dirty = true;
    }
}

pub fn encode(snap: &Snapshot) -> Result<Vec<u8>> {
    let payload = bincode::serialize(snap)
        .map_err(|e| Error::Snapshot(format!("serialize: {}", e)))?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(8 + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<Snapshot> {
    if data.len() < 8 {
        return Err(Error::Snapshot("data too small".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(Error::Snapshot("bad magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::Snapshot(format!(
            "unsupported version {} (expected {})", version, FORMAT_VERSION)));
    }
    let payload = miniz_oxide::inflate::decompress_to_vec(&data[8..])
        .map_err(|e| Error::Snapshot(format!("decompress: {:?}", e)))?;
    let snap: Snapshot = bincode::deserialize(&payload)
        .map_err(|e| Error::Snapshot(format!("deserialize: {}", e)))?;
    if snap.graphic_ram.len() != GDRAM_SIZE {
        return Err(Error::Snapshot(format!("GDRAM size {}", snap.graphic_ram.len())));
    }
    Ok(snap)
}

/// Write an encoded snapshot to `path`.
pub fn save_file(path: &Path, snap: &Snapshot) -> Result<()> {
    fs::write(path, encode(snap)?)?;
    tracing::debug!(frame = snap.frame, "snapshot saved to {}", path.display());
    Ok(())
}

pub fn load_file(path: &Path) -> Result<Snapshot> {
    decode(&fs::read(path)?)
}

/// Most recent snapshots, oldest dropped first once `capacity` is reached.
pub struct RewindBuffer {
    history: VecDeque<Snapshot>,
    capacity: usize,
    /// Frames between snapshots
    pub interval: u32,
    frames_since: u32,
}

impl RewindBuffer {
    pub fn new(capacity: usize, interval: u32) -> Self {
        let capacity = capacity.max(1);
        RewindBuffer {
            history: VecDeque::with_capacity(capacity),
            capacity,
            interval: interval.max(1),
            frames_since: 0,
        }
    }

    /// Count one finished frame; true when a snapshot is due.
    pub fn tick_frame(&mut self) -> bool {
        self.frames_since += 1;
        let due = self.frames_since >= self.interval;
        if due {
            self.frames_since = 0;
        }
        due
    }

    pub fn push(&mut self, snap: Snapshot) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(snap);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.history.pop_back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::Command;

    fn make_snap(frame: u32) -> Snapshot {
        Snapshot::capture(&Controller::new(), frame)
    }

    #[test]
    fn test_capture_restore() {
        let mut c = Controller::new();
        c.process_command(Command::instruction(0x34));
        c.process_command(Command::data(0x42));
        let snap = Snapshot::capture(&c, 10);

        c.process_command(Command::instruction(0x30));
        c.process_command(Command::data(0x99));
        c.dirty = false;

        snap.restore(&mut c);
        assert_eq!(c.graphic_ram()[0], 0x42);
        assert_eq!(c.graphic_ram()[1], 0);
        assert_eq!(c.coordinate(), [0, 1]);
        assert!(c.extended_instruction_set());
        assert!(c.dirty);
    }

    #[test]
    fn test_encode_decode() {
        let mut c = Controller::new();
        c.process_command(Command::data(0x5A));
        let snap = Snapshot::capture(&c, 3);
        let bytes = encode(&snap).unwrap();
        assert_eq!(&bytes[..4], b"S792");
        assert_eq!(decode(&bytes).unwrap(), snap);
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        assert!(decode(b"S79").is_err());
        assert!(decode(b"XXXX\x01\0\0\0").is_err());
        assert!(decode(b"S792\x02\0\0\0").is_err());
    }

    #[test]
    fn test_ring_overflow() {
        let mut rb = RewindBuffer::new(2, 1);
        rb.push(make_snap(1));
        rb.push(make_snap(2));
        rb.push(make_snap(3)); // overwrites frame 1
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.pop().unwrap().frame, 3);
        assert_eq!(rb.pop().unwrap().frame, 2);
        assert!(rb.pop().is_none());
        assert!(rb.is_empty());
    }

    #[test]
    fn test_tick_frame() {
        let mut rb = RewindBuffer::new(10, 60);
        for _ in 0..59 {
            assert!(!rb.tick_frame());
        }
        assert!(rb.tick_frame());
        assert!(!rb.tick_frame());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("st7920_snap_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.snap");

        let mut c = Controller::new();
        c.process_command(Command::data(0x81));
        let snap = Snapshot::capture(&c, 42);
        save_file(&path, &snap).unwrap();
        assert_eq!(load_file(&path).unwrap(), snap);

        std::fs::write(&path, b"junk").unwrap();
        assert!(matches!(load_file(&path), Err(Error::Snapshot(_))));
        assert!(matches!(load_file(&dir.join("missing.snap")), Err(Error::Io(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
