//! ST7920 display emulator frontend.
//!
//! Two execution modes:
//!
//! - **GUI mode** (default): Scaled window with beeper audio, keyboard/mouse/
//!   gamepad input mapped to the click encoder and buttons, screenshots.
//! - **Headless mode** (`--headless`): Runs N frames and prints the display.
//!
//! The display is driven either by the built-in demo firmware or by a
//! recorded pin trace (`--trace`).

mod demo;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use gilrs::{Button as GilrsButton, Event as GilrsEvent, EventType, Gilrs};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Scale, ScaleMode, Window, WindowOptions};
use tracing_subscriber::EnvFilter;

use st7920_core::{capture, snapshot};
use st7920_core::{
    Board, Button, Error as CoreError, Palette, PinMap, RenderSurface, RewindBuffer, TextureId,
    TextureParams, ToneEvent, SCREEN_HEIGHT, SCREEN_WIDTH,
};

use demo::{DemoFirmware, Stimulus, TracePlayer};

/// Audio output sample rate in Hz
const AUDIO_SAMPLE_RATE: u32 = 44100;
/// Beeper pitch in Hz
const BEEPER_FREQ: f32 = 2700.0;
/// Square wave amplitude (0.0 to 1.0)
const AUDIO_VOLUME: f32 = 0.1;
/// Frames an arrow key keeps turning the encoder (one detent)
const ENCODER_HOLD_FRAMES: u8 = 4;
/// Rewind history: one snapshot every half second, 30 seconds deep
const REWIND_INTERVAL: u32 = 30;
const REWIND_CAPACITY: usize = 60;
const SNAPSHOT_FILE: &str = "st7920.snap";
const FRAME_TIME: Duration = Duration::from_nanos(1_000_000_000 / 60);
const TITLE: &str = "ST7920 Emulator";

#[derive(Parser, Debug)]
#[command(name = "st7920-sim", version, about = "ST7920 128x64 LCD module emulator")]
struct Cli {
    /// Replay a pin trace instead of running the demo firmware
    #[arg(long)]
    trace: Option<PathBuf>,
    /// Pin transitions replayed per frame
    #[arg(long, default_value_t = 20_000)]
    events_per_frame: usize,
    /// Run without a window
    #[arg(long)]
    headless: bool,
    /// Frames to run in headless mode
    #[arg(long, default_value_t = 60)]
    frames: usize,
    /// Encoder position before the run starts (headless)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    encoder: i32,
    /// Initial window scale 1-6
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(1..=6))]
    scale: u8,
    /// Start with the beeper muted
    #[arg(long)]
    mute: bool,
    /// Directory for screenshots and GDRAM captures
    #[arg(long, default_value = ".")]
    capture_dir: PathBuf,
    /// Save a PBM capture every N seconds
    #[arg(long)]
    capture_interval: Option<u64>,
    /// Foreground color RRGGBB
    #[arg(long, default_value = "DCE6FF")]
    fg: String,
    /// Background color RRGGBB
    #[arg(long, default_value = "203CC8")]
    bg: String,
}

// ─── Render surface ─────────────────────────────────────────────────────────

/// The window's single texture: an unscaled 0xRRGGBB pixel buffer.
struct WindowSurface {
    texture: Option<TextureId>,
    pixels: Vec<u32>,
}

impl WindowSurface {
    fn new() -> Self {
        WindowSurface { texture: None, pixels: Vec::new() }
    }
}

impl RenderSurface for WindowSurface {
    fn create_texture(&mut self, params: TextureParams) -> st7920_core::Result<TextureId> {
        if self.texture.is_some() {
            return Err(CoreError::Surface("texture already allocated".into()));
        }
        // Integer scaling below is nearest-neighbour with edge clamping
        self.pixels = vec![0; params.width * params.height];
        let id = TextureId(1);
        self.texture = Some(id);
        Ok(id)
    }

    fn upload(&mut self, texture: TextureId, rgba: &[u8]) -> st7920_core::Result<()> {
        if self.texture != Some(texture) {
            return Err(CoreError::Surface(format!("unknown texture {:?}", texture)));
        }
        if rgba.len() != self.pixels.len() * 4 {
            return Err(CoreError::Surface(format!("upload of {} bytes", rgba.len())));
        }
        for (dst, px) in self.pixels.iter_mut().zip(rgba.chunks_exact(4)) {
            *dst = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
        }
        Ok(())
    }
}

// ─── Audio ──────────────────────────────────────────────────────────────────

/// Square wave gated by the beeper line.
struct BeeperSource {
    on: Arc<AtomicBool>,
    sample_rate: u32,
    phase: f32,
}

impl Iterator for BeeperSource {
    type Item = f32;
    fn next(&mut self) -> Option<f32> {
        if !self.on.load(Ordering::Relaxed) {
            self.phase = 0.0;
            return Some(0.0);
        }
        let s = if self.phase < 0.5 { AUDIO_VOLUME } else { -AUDIO_VOLUME };
        self.phase += BEEPER_FREQ / self.sample_rate as f32;
        self.phase %= 1.0;
        Some(s)
    }
}

impl rodio::Source for BeeperSource {
    fn current_frame_len(&self) -> Option<usize> { None }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate }
    fn total_duration(&self) -> Option<Duration> { None }
}

fn setup_audio(on: Arc<AtomicBool>) -> Option<(rodio::OutputStream, rodio::Sink)> {
    let (stream, handle) = match rodio::OutputStream::try_default() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("audio device: {}", e);
            return None;
        }
    };
    match rodio::Sink::try_new(&handle) {
        Ok(sink) => {
            sink.append(BeeperSource { on, sample_rate: AUDIO_SAMPLE_RATE, phase: 0.0 });
            Some((stream, sink))
        }
        Err(e) => {
            tracing::warn!("audio sink: {}", e);
            None
        }
    }
}

// ─── Gamepad ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct GamepadState {
    up: bool,
    down: bool,
    click: bool,
    back: bool,
    kill: bool,
}

fn init_gamepad() -> Option<Gilrs> {
    match Gilrs::new() {
        Ok(gilrs) => {
            for (id, gp) in gilrs.gamepads() {
                tracing::debug!("gamepad [{}] \"{}\"", id, gp.name());
            }
            Some(gilrs)
        }
        Err(e) => {
            tracing::warn!("gamepad: {}", e);
            None
        }
    }
}

fn poll_gamepad(gilrs: &mut Gilrs, state: &mut GamepadState) {
    while let Some(GilrsEvent { event, .. }) = gilrs.next_event() {
        match event {
            EventType::ButtonPressed(b, _) => apply_button(state, b, true),
            EventType::ButtonReleased(b, _) => apply_button(state, b, false),
            EventType::Disconnected => *state = GamepadState::default(),
            _ => {}
        }
    }
}

fn apply_button(state: &mut GamepadState, btn: GilrsButton, pressed: bool) {
    match btn {
        GilrsButton::DPadUp => state.up = pressed,
        GilrsButton::DPadDown => state.down = pressed,
        GilrsButton::South | GilrsButton::Start => state.click = pressed,
        GilrsButton::East => state.back = pressed,
        GilrsButton::Select => state.kill = pressed,
        _ => {}
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Some(palette) = Palette::from_hex(&cli.fg, &cli.bg) else {
        bail!("colors must be RRGGBB hex, got --fg {} --bg {}", cli.fg, cli.bg);
    };

    let stimulus = match &cli.trace {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading trace {}", path.display()))?;
            let transitions = st7920_core::trace::parse(&text)
                .with_context(|| format!("parsing trace {}", path.display()))?;
            tracing::info!(transitions = transitions.len(), "loaded {}", path.display());
            Stimulus::Trace(TracePlayer::new(transitions, cli.events_per_frame))
        }
        None => Stimulus::Demo(DemoFirmware::new()),
    };

    let board = Board::new(PinMap::default(), palette);
    if cli.headless {
        run_headless(&cli, board, stimulus)
    } else {
        run_gui(&cli, board, stimulus)
    }
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

fn open_window(scale: usize) -> anyhow::Result<Window> {
    let mut window = Window::new(
        TITLE, SCREEN_WIDTH * scale, SCREEN_HEIGHT * scale,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    ).context("creating window")?;
    window.set_target_fps(60);
    Ok(window)
}

fn run_gui(cli: &Cli, mut board: Board, mut stimulus: Stimulus) -> anyhow::Result<()> {
    let mut scale = cli.scale as usize;
    let mut window = open_window(scale)?;
    let mut surface = WindowSurface::new();
    board.device.init(&mut surface).context("creating display texture")?;

    let beeper_on = Arc::new(AtomicBool::new(false));
    let mut muted = cli.mute;
    let mut _audio = if muted { None } else { setup_audio(beeper_on.clone()) };

    let mut gilrs = init_gamepad();
    let mut gp = GamepadState::default();
    let mut prev_gp = (false, false);
    let (mut up_held, mut down_held) = (0u8, 0u8);
    let mut scaled_buf = vec![0u32; SCREEN_WIDTH * scale * SCREEN_HEIGHT * scale];
    let mut last_capture = Instant::now();
    let mut frame_count: u64 = 0;
    let mut rewind = RewindBuffer::new(REWIND_CAPACITY, REWIND_INTERVAL);
    let snapshot_path = cli.capture_dir.join(SNAPSHOT_FILE);

    while window.is_open() && !window.is_key_down(Key::Escape) {
        if let Some(ref mut g) = gilrs { poll_gamepad(g, &mut gp); }

        // Scale toggle (1-6)
        let scale_keys = [Key::Key1, Key::Key2, Key::Key3, Key::Key4, Key::Key5, Key::Key6];
        for (i, key) in scale_keys.iter().enumerate() {
            if window.is_key_pressed(*key, KeyRepeat::No) && scale != i + 1 {
                scale = i + 1;
                scaled_buf = vec![0u32; SCREEN_WIDTH * scale * SCREEN_HEIGHT * scale];
                window = open_window(scale)?;
            }
        }

        if window.is_key_pressed(Key::M, KeyRepeat::No) {
            muted = !muted;
            _audio = if muted { None } else { setup_audio(beeper_on.clone()) };
        }
        if window.is_key_pressed(Key::S, KeyRepeat::No) {
            if let Err(e) = capture::save_png(board.device.framebuffer_rgba(), &cli.capture_dir, "screenshot") {
                tracing::warn!("screenshot failed: {}", e);
            }
        }
        let periodic = cli
            .capture_interval
            .is_some_and(|s| last_capture.elapsed() >= Duration::from_secs(s.max(1)));
        if window.is_key_pressed(Key::P, KeyRepeat::No) || periodic {
            last_capture = Instant::now();
            if let Err(e) = capture::save_pbm(board.device.graphic_ram(), &cli.capture_dir, "lcd") {
                tracing::warn!("LCD capture failed: {}", e);
            }
        }

        if window.is_key_pressed(Key::F5, KeyRepeat::No) {
            let snap = board.device.save_snapshot(frame_count as u32);
            match snapshot::save_file(&snapshot_path, &snap) {
                Ok(()) => tracing::info!("state saved to {}", snapshot_path.display()),
                Err(e) => tracing::warn!("saving state failed: {}", e),
            }
        }
        if window.is_key_pressed(Key::F9, KeyRepeat::No) {
            match snapshot::load_file(&snapshot_path) {
                Ok(snap) => {
                    board.device.restore_snapshot(&snap);
                    stimulus.resync();
                    tracing::info!(frame = snap.frame, "state loaded from {}", snapshot_path.display());
                }
                Err(e) => tracing::warn!("loading state failed: {}", e),
            }
        }

        // Holding Backspace freezes the stimulus and walks back through history
        let rewinding = window.is_key_down(Key::Backspace);
        if window.is_key_pressed(Key::Backspace, KeyRepeat::Yes)
            && board.device.rewind(&mut rewind).is_some()
        {
            stimulus.resync();
        }

        // Buttons
        let hovered = window.get_mouse_pos(MouseMode::Discard).is_some();
        let click = window.is_key_down(Key::Space)
            || window.is_key_down(Key::Enter)
            || window.is_key_down(Key::Right)
            || (hovered && window.get_mouse_down(MouseButton::Left))
            || gp.click;
        board.device.set_button(Button::Kill, window.is_key_down(Key::K) || gp.kill);
        board.device.set_button(Button::Encoder, click);
        board.device.set_button(Button::Back, window.is_key_down(Key::Left) || gp.back);

        // Arrow keys turn the encoder one detent, one quarter-step per frame
        let up_edge = window.is_key_pressed(Key::Up, KeyRepeat::Yes) || (gp.up && !prev_gp.0);
        let down_edge = window.is_key_pressed(Key::Down, KeyRepeat::Yes) || (gp.down && !prev_gp.1);
        prev_gp = (gp.up, gp.down);
        if up_held > 0 {
            up_held -= 1;
            board.device.rotate_encoder(-1);
        } else if up_edge {
            up_held = ENCODER_HOLD_FRAMES;
        }
        if down_held > 0 {
            down_held -= 1;
            board.device.rotate_encoder(1);
        } else if down_edge {
            down_held = ENCODER_HOLD_FRAMES;
        }
        if hovered {
            if let Some((_, dy)) = window.get_scroll_wheel() {
                if dy > 0.0 {
                    board.device.rotate_encoder(1);
                } else if dy < 0.0 {
                    board.device.rotate_encoder(-1);
                }
            }
        }

        if !rewinding {
            stimulus.step(&mut board);
            if rewind.tick_frame() {
                rewind.push(board.device.save_snapshot(frame_count as u32));
            }
        }
        frame_count += 1;

        for ev in board.device.take_tone_events() {
            tracing::trace!(?ev, "beeper");
        }
        beeper_on.store(board.device.beeper_on() && !muted, Ordering::Relaxed);

        board.device.update(Instant::now(), &mut surface).context("uploading display frame")?;

        // Nearest-neighbour integer upscale
        let scaled_w = SCREEN_WIDTH * scale;
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                let c = surface.pixels[y * SCREEN_WIDTH + x];
                for sy in 0..scale {
                    let base = (y * scale + sy) * scaled_w + x * scale;
                    scaled_buf[base..base + scale].fill(c);
                }
            }
        }
        window
            .update_with_buffer(&scaled_buf, scaled_w, SCREEN_HEIGHT * scale)
            .context("presenting frame")?;

        if frame_count % 120 == 0 {
            window.set_title(&format!(
                "{} - enc {} ({}x){}",
                TITLE, board.device.input.encoder_position, scale, if muted { " [MUTE]" } else { "" }
            ));
        }
    }
    tracing::info!(frames = frame_count, events = board.dbg_event_count, "exiting");
    Ok(())
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

/// Surface that keeps only the last uploaded frame.
struct HeadlessSurface {
    last: Vec<u8>,
}

impl RenderSurface for HeadlessSurface {
    fn create_texture(&mut self, _params: TextureParams) -> st7920_core::Result<TextureId> {
        Ok(TextureId(0))
    }

    fn upload(&mut self, _texture: TextureId, rgba: &[u8]) -> st7920_core::Result<()> {
        self.last.clear();
        self.last.extend_from_slice(rgba);
        Ok(())
    }
}

fn run_headless(cli: &Cli, mut board: Board, mut stimulus: Stimulus) -> anyhow::Result<()> {
    let mut surface = HeadlessSurface { last: Vec::new() };
    board.device.init(&mut surface)?;
    board.device.input_mut().encoder_position = cli.encoder;

    // Simulated clock so the render throttle behaves the same on every run
    let start = Instant::now();
    let mut uploads = 0;
    for frame in 0..cli.frames {
        board.device.controller.dbg_reset_counters();
        stimulus.step(&mut board);
        let now = start + FRAME_TIME * frame as u32;
        if board.device.update(now, &mut surface)? {
            uploads += 1;
        }
        for ev in board.device.take_tone_events() {
            let state = if ev == ToneEvent::Start { "on" } else { "off" };
            tracing::debug!(frame, "beeper {}", state);
        }
        tracing::debug!(
            frame,
            cmds = board.device.controller.dbg_cmd_count,
            data = board.device.controller.dbg_data_count,
            "frame"
        );
    }
    println!("{} frames, {} uploads, {} pin events", cli.frames, uploads, board.dbg_event_count);
    print_display(board.device.graphic_ram());
    Ok(())
}

fn print_display(graphic_ram: &[u8]) {
    let on = |x: usize, y: usize| {
        let byte = graphic_ram[y * st7920_core::controller::GDRAM_STRIDE + x / 8];
        byte & (0x80 >> (x % 8)) != 0
    };
    for y in (0..SCREEN_HEIGHT).step_by(2) {
        let mut l = String::with_capacity(SCREEN_WIDTH + 4);
        l.push_str("  |");
        for x in 0..SCREEN_WIDTH {
            l.push(match (on(x, y), on(x, y + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                _ => ' ',
            });
        }
        l.push('|');
        println!("{}", l);
    }
}
