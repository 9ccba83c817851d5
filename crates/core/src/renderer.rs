//! GDRAM to RGBA conversion, throttled to the display refresh rate.
//!
//! The renderer owns one texture on an external [`RenderSurface`]. On each
//! tick it re-renders the whole 128×64 visible area, but only when GDRAM is
//! dirty and at least [`FRAME_INTERVAL`] has passed since the last upload.

use std::time::{Duration, Instant};

use crate::controller::GDRAM_STRIDE;
use crate::error::{Error, Result};
use crate::{SCREEN_HEIGHT, SCREEN_WIDTH};

pub const FB_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 4; // RGBA

/// Minimum time between two uploads (30 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Handle returned by a surface for an allocated texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureParams {
    pub width: usize,
    pub height: usize,
    pub filter: Filter,
    pub wrap: Wrap,
}

/// 2D texture facility the display image is presented through.
pub trait RenderSurface {
    fn create_texture(&mut self, params: TextureParams) -> Result<TextureId>;
    /// Replace the full contents of `texture` with `rgba` (width * height * 4 bytes).
    fn upload(&mut self, texture: TextureId, rgba: &[u8]) -> Result<()>;
}

/// Pixel colors, RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub foreground: [u8; 4],
    pub background: [u8; 4],
}

impl Palette {
    /// Parse `RRGGBB` hex strings, alpha fixed at 0xFF.
    pub fn from_hex(foreground: &str, background: &str) -> Option<Self> {
        Some(Palette { foreground: parse_rgb(foreground)?, background: parse_rgb(background)? })
    }
}

fn parse_rgb(s: &str) -> Option<[u8; 4]> {
    let s = s.trim_start_matches('#');
    if s.len() != 6 {
        return None;
    }
    let v = u32::from_str_radix(s, 16).ok()?;
    Some([(v >> 16) as u8, (v >> 8) as u8, v as u8, 0xFF])
}

impl Default for Palette {
    /// White-on-blue, like the usual ST7920 12864 modules.
    fn default() -> Self {
        Palette {
            foreground: [0xDC, 0xE6, 0xFF, 0xFF],
            background: [0x20, 0x3C, 0xC8, 0xFF],
        }
    }
}

pub struct Renderer {
    pub framebuffer: Vec<u8>,
    pub palette: Palette,
    texture: Option<TextureId>,
    last_update: Option<Instant>,
    /// Number of uploads done so far
    pub dbg_upload_count: u64,
}

impl Renderer {
    pub fn new(palette: Palette) -> Self {
        let mut r = Renderer {
            framebuffer: vec![0; FB_SIZE],
            palette,
            texture: None,
            last_update: None,
            dbg_upload_count: 0,
        };
        r.fill(palette.background);
        r
    }

    fn fill(&mut self, color: [u8; 4]) {
        for px in self.framebuffer.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Allocate the display texture. Called once when the surface is ready.
    pub fn init(&mut self, surface: &mut dyn RenderSurface) -> Result<()> {
        let id = surface.create_texture(TextureParams {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            filter: Filter::Nearest,
            wrap: Wrap::ClampToEdge,
        })?;
        tracing::debug!(texture = id.0, "st7920 texture created");
        self.texture = Some(id);
        Ok(())
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Whether a frame would be produced at `now`.
    pub fn due(&self, now: Instant) -> bool {
        match self.last_update {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= FRAME_INTERVAL,
        }
    }

    /// Scheduling tick. Returns true when a frame was converted and uploaded.
    /// `dirty` is cleared once the frame has been uploaded.
    pub fn update(
        &mut self,
        now: Instant,
        graphic_ram: &[u8],
        dirty: &mut bool,
        surface: &mut dyn RenderSurface,
    ) -> Result<bool> {
        if !*dirty || !self.due(now) {
            return Ok(false);
        }
        let texture = self.texture.ok_or(Error::TextureNotInitialized)?;
        self.render(graphic_ram);
        surface.upload(texture, &self.framebuffer)?;
        self.last_update = Some(now);
        *dirty = false;
        self.dbg_upload_count = self.dbg_upload_count.wrapping_add(1);
        Ok(true)
    }

    /// Convert the visible 128×64 area of GDRAM (row-major, 32-byte stride,
    /// MSB = leftmost pixel) into the RGBA framebuffer.
    pub fn render(&mut self, graphic_ram: &[u8]) {
        let Palette { foreground, background } = self.palette;
        for y in 0..SCREEN_HEIGHT {
            for x in (0..SCREEN_WIDTH).step_by(8) {
                let byte = graphic_ram.get(y * GDRAM_STRIDE + x / 8).copied().unwrap_or(0);
                for j in 0..8 {
                    let color = if byte & (0x80 >> j) != 0 { foreground } else { background };
                    let offset = (y * SCREEN_WIDTH + x + j) * 4;
                    self.framebuffer[offset..offset + 4].copy_from_slice(&color);
                }
            }
        }
    }

    /// Convert framebuffer to u32 pixel array (0xRRGGBB format for minifb)
    pub fn as_pixel_buffer(&self) -> Vec<u32> {
        self.framebuffer
            .chunks_exact(4)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32)
            .collect()
    }
}
