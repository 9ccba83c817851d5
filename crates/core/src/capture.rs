//! Display captures for offline inspection.
//!
//! - PBM (`P1`, plain text) straight from GDRAM, one character per pixel
//! - PNG from the rendered RGBA framebuffer
//!
//! Capture failures are returned to the caller; they never touch device state.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::controller::GDRAM_STRIDE;
use crate::error::Result;
use crate::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Visible 128×64 area of GDRAM as a plain PBM image.
pub fn to_pbm(graphic_ram: &[u8]) -> String {
    let mut out = String::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 2 + 64);
    out.push_str("P1\n# ST7920 GDRAM capture\n");
    out.push_str(&format!("{} {}\n", SCREEN_WIDTH, SCREEN_HEIGHT));
    for y in 0..SCREEN_HEIGHT {
        for x in 0..SCREEN_WIDTH {
            let byte = graphic_ram.get(y * GDRAM_STRIDE + x / 8).copied().unwrap_or(0);
            let bit = (byte >> (7 - x % 8)) & 1;
            out.push(if bit != 0 { '1' } else { '0' });
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

/// `<dir>/<prefix>_<unix-millis>.<ext>`
pub fn capture_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    dir.join(format!("{}_{}.{}", prefix, ms, ext))
}

/// Write a PBM capture into `dir`, returning the file written.
pub fn save_pbm(graphic_ram: &[u8], dir: &Path, prefix: &str) -> Result<PathBuf> {
    let path = capture_path(dir, prefix, "pbm");
    fs::write(&path, to_pbm(graphic_ram))?;
    tracing::info!(path = %path.display(), "LCD capture saved");
    Ok(path)
}

/// Write the rendered framebuffer as PNG into `dir`.
pub fn save_png(rgba: &[u8], dir: &Path, prefix: &str) -> Result<PathBuf> {
    let path = capture_path(dir, prefix, "png");
    fs::write(&path, encode_png(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, rgba))?;
    tracing::info!(path = %path.display(), "screenshot saved");
    Ok(path)
}

/// Encode an RGBA pixel buffer as an RGB PNG.
///
/// `rgba` contains `width * height * 4` bytes in row-major order.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut png = Vec::with_capacity(rgba.len() / 2 + 128);

    // PNG signature
    png.extend_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(2); // color type: RGB
    ihdr.push(0); // compression
    ihdr.push(0); // filter
    ihdr.push(0); // interlace
    write_chunk(&mut png, b"IHDR", &ihdr);

    // Filter byte (0=None) + RGB per row
    let row_bytes = width as usize * 3 + 1;
    let mut raw = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        raw.push(0);
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * 4;
            raw.extend_from_slice(&rgba[offset..offset + 3]);
        }
    }

    let zlib_data = miniz_oxide::deflate::compress_to_vec_zlib(&raw, 6);
    write_chunk(&mut png, b"IDAT", &zlib_data);
    write_chunk(&mut png, b"IEND", &[]);

    png
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    let crc = crc32(&chunk_type[..], data);
    out.extend_from_slice(&crc.to_be_bytes());
}

// CRC-32 (PNG/zlib)
fn crc32(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    for &b in chunk_type.iter().chain(data.iter()) {
        crc ^= b as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc ^ 0xFFFFFFFF
}
