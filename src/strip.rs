//! Pixel buffer drivers: the only code allowed to touch output hardware.
//!
//! The `rs_ws281x` C library is not thread-safe, so the strip lives behind
//! a single mutex ([`SharedStrip`]). Effects lock it once per rendered frame
//! and never hold it across an inter-frame sleep — that lock is the mutual
//! exclusion guarantee the scheduler relies on.
//!
//! Two drivers implement the same contract:
//! - [`Ws281xStrip`]: the real hardware (feature `hardware`)
//! - [`MemoryStrip`]: an in-memory buffer whose `render()` is a no-op, used
//!   when no hardware is attached and in tests

use crate::Color;
#[cfg(feature = "hardware")]
use crate::StripConfig;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long to let the hardware driver finish latch timing after a clear.
const SETTLE: Duration = Duration::from_millis(50);

// ── Driver contract ──────────────────────────────────────────────────

/// An ordered sequence of pixel cells plus a "push to hardware" operation.
///
/// All operations are best-effort: an out-of-range index is silently
/// ignored (the hardware may report fewer cells than configured), and
/// `render()` must never fail — a headless driver simply does nothing.
pub trait StripDriver: Send {
    /// Number of addressable cells.
    fn len(&self) -> usize;

    /// Set one cell. Out-of-range indices are a no-op, never a panic.
    fn set(&mut self, index: usize, color: Color);

    /// Set every cell to `color`.
    fn fill(&mut self, color: Color);

    /// Push the in-memory buffer to the physical output.
    fn render(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The strip as shared by the scheduler, effects, and HTTP handlers.
pub type SharedStrip = Arc<Mutex<dyn StripDriver>>;

/// Turn every cell off and render, without waiting.
///
/// Used inside frame loops where the next frame follows immediately.
pub fn blank(strip: &SharedStrip) {
    let mut s = strip.lock().unwrap();
    s.fill(Color::OFF);
    s.render();
}

/// Turn every cell off, render, and wait for the hardware to settle.
///
/// Callers rely on the strip being visually off once this returns.
pub fn clear(strip: &SharedStrip) {
    blank(strip);
    thread::sleep(SETTLE);
}

// ── Headless driver ──────────────────────────────────────────────────

/// In-memory strip: full buffer semantics, no output.
///
/// Stands in for the hardware when `rs_ws281x` is unavailable or fails to
/// initialize, so scheduler state transitions and timing stay correct on a
/// dev machine.
pub struct MemoryStrip {
    cells: Vec<Color>,
}

impl MemoryStrip {
    pub fn new(count: usize) -> Self {
        Self {
            cells: vec![Color::OFF; count],
        }
    }

    /// Current cell contents, mostly useful for inspection in tests.
    pub fn cells(&self) -> &[Color] {
        &self.cells
    }
}

impl StripDriver for MemoryStrip {
    fn len(&self) -> usize {
        self.cells.len()
    }

    fn set(&mut self, index: usize, color: Color) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = color;
        }
    }

    fn fill(&mut self, color: Color) {
        self.cells.fill(color);
    }

    fn render(&mut self) {
        // Headless: nothing to push.
    }
}

// ── Hardware driver ──────────────────────────────────────────────────

/// WS281x strip on a Raspberry Pi GPIO pin.
#[cfg(feature = "hardware")]
pub struct Ws281xStrip {
    controller: rs_ws281x::Controller,
    count: usize,
}

#[cfg(feature = "hardware")]
impl Ws281xStrip {
    /// Initialize the PWM controller. Fails if GPIO is unavailable
    /// (e.g., not running as root) — the caller degrades to [`MemoryStrip`].
    pub fn open(config: StripConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let channel = rs_ws281x::ChannelBuilder::new()
            .pin(i32::from(config.pin))
            .count(config.count as i32)
            .strip_type(rs_ws281x::StripType::Ws2812)
            .brightness(config.brightness)
            .build();

        let controller = rs_ws281x::ControllerBuilder::new()
            .freq(800_000)
            .dma(10)
            .channel(0, channel)
            .build()?;

        tracing::info!(
            "strip init: {} LEDs on GPIO {} (brightness {})",
            config.count,
            config.pin,
            config.brightness
        );

        Ok(Self {
            controller,
            count: config.count,
        })
    }
}

#[cfg(feature = "hardware")]
impl StripDriver for Ws281xStrip {
    fn len(&self) -> usize {
        self.count
    }

    fn set(&mut self, index: usize, color: Color) {
        let leds = self.controller.leds_mut(0);
        let max = self.count.min(leds.len());
        if index < max {
            // rs_ws281x raw cells are [B, G, R, W]
            leds[index] = [color.b, color.g, color.r, 0];
        }
    }

    fn fill(&mut self, color: Color) {
        let leds = self.controller.leds_mut(0);
        let max = self.count.min(leds.len());
        for led in &mut leds[..max] {
            *led = [color.b, color.g, color.r, 0];
        }
    }

    fn render(&mut self) {
        // Render failures are transient (DMA contention); log and move on so
        // effect timing and scheduler state stay correct.
        if let Err(e) = self.controller.render() {
            tracing::error!("ws281x render failed: {:?}", e);
        }
    }
}

// ── Test double ──────────────────────────────────────────────────────


// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_out_of_range_is_silent() {
        let mut strip = MemoryStrip::new(4);
        strip.set(4, Color::RED);
        strip.set(usize::MAX, Color::RED);
        assert!(strip.cells().iter().all(|&c| c == Color::OFF));
    }

    #[test]
    fn fill_sets_every_cell() {
        let mut strip = MemoryStrip::new(5);
        strip.fill(Color::BLUE);
        assert!(strip.cells().iter().all(|&c| c == Color::BLUE));
    }

    #[test]
    fn clear_leaves_strip_off_and_length_unchanged() {
        let rec = Arc::new(Mutex::new(MemoryStrip::new(8)));
        {
            let mut s = rec.lock().unwrap();
            s.fill(Color::GREEN);
        }
        let strip: SharedStrip = rec.clone();
        clear(&strip);

        let s = rec.lock().unwrap();
        assert_eq!(s.len(), 8);
        assert!(s.cells().iter().all(|&c| c == Color::OFF));
    }

    #[test]
    fn zero_length_strip_is_empty() {
        let strip = MemoryStrip::new(0);
        assert!(strip.is_empty());
        assert_eq!(strip.len(), 0);
    }

    #[test]
    fn recording_strip_snapshots_on_render() {
        let (rec, strip) = testing::RecordingStrip::shared(3);
        {
            let mut s = strip.lock().unwrap();
            s.set(1, Color::RED);
            s.render();
            s.set(2, Color::BLUE);
            s.render();
        }
        let rec = rec.lock().unwrap();
        assert_eq!(rec.frames.len(), 2);
        assert_eq!(rec.frames[0][1], Color::RED);
        assert_eq!(rec.frames[1][2], Color::BLUE);
        assert_eq!(rec.writes, 2);
    }
}
