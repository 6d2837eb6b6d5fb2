//! Shared building blocks for the LED strip agent.
//!
//! This module provides what the rest of the crate builds on:
//! - Strip hardware configuration
//! - Color and brightness math (pure, no I/O)
//! - Signal handling for clean shutdown
//!
//! It also re-exports the strip, effects, scheduler, dispatcher, config,
//! and server modules used by the main binary.

pub mod config;
pub mod dispatcher;
pub mod effects;
pub mod scheduler;
pub mod server;
pub mod strip;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Strip configuration ────────────────────────────────────────────

/// Configuration for the physical strip.
///
/// `Clone, Copy` make this cheaply copyable (three small integers).
/// Passed explicitly — no hidden global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripConfig {
    /// GPIO pin driving the data line.
    pub pin: u8,
    /// Number of addressable cells.
    pub count: usize,
    /// Global brightness (0-255), applied by the driver *after* per-pixel
    /// color is computed. See [`floor_lsb_for`].
    pub brightness: u8,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            pin: 18,
            count: 300,
            brightness: 255,
        }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// This lets us test color and effect logic without `rs_ws281x`.
/// At the hardware boundary, the driver converts to its raw byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// All channels off — also the sentinel returned for malformed hex
    /// input, indistinguishable from black by design.
    pub const OFF: Color = Color { r: 0, g: 0, b: 0 };

    pub const RED: Color = Color { r: 255, g: 0, b: 0 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `"#RRGGBB"` or `"RRGGBB"` into a color.
    ///
    /// Malformed input returns [`Color::OFF`]. Callers that need a hard
    /// error must validate length/charset themselves first; every caller
    /// here treats OFF as "unset" and falls back to a default.
    pub fn from_hex(s: &str) -> Self {
        let s = s.trim();
        let s = s.strip_prefix('#').unwrap_or(s);
        // from_str_radix tolerates a leading sign, so check the charset too.
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Color::OFF;
        }
        match u32::from_str_radix(s, 16) {
            Ok(v) => Color {
                r: ((v >> 16) & 0xFF) as u8,
                g: ((v >> 8) & 0xFF) as u8,
                b: (v & 0xFF) as u8,
            },
            Err(_) => Color::OFF,
        }
    }

    /// Scale each channel by `factor`, truncating (not rounding) to integer.
    ///
    /// `factor <= 0` returns OFF; `factor > 1` clamps to 1. Channels are
    /// scaled independently — overflow never carries between channels.
    pub fn fade(self, factor: f32) -> Self {
        if factor <= 0.0 {
            return Color::OFF;
        }
        let factor = factor.min(1.0);
        Color {
            r: (f32::from(self.r) * factor) as u8,
            g: (f32::from(self.g) * factor) as u8,
            b: (f32::from(self.b) * factor) as u8,
        }
    }

    /// Like [`Color::fade`], but any channel that starts nonzero and would
    /// truncate to 0 under `gain` is forced to `floor_lsb` instead.
    ///
    /// The driver applies a second, global brightness scale downstream
    /// (`effective = value * brightness / 255`), which can silently zero a
    /// dim color. Pre-compensating with [`floor_lsb_for`] keeps a breathing
    /// strip from ever looking fully off. A truly-zero channel stays zero.
    pub fn scale_with_floor(self, gain: f64, floor_lsb: u8) -> Self {
        if gain <= 0.0 {
            return Color::OFF;
        }
        let gain = gain.min(1.0);
        let scale = |v: u8| -> u8 {
            if v == 0 {
                return 0;
            }
            let s = (f64::from(v) * gain) as u32;
            if s == 0 {
                floor_lsb
            } else {
                s.min(255) as u8
            }
        };
        Color {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    /// Map a cyclic position (0-255) to a full-saturation hue.
    ///
    /// Three-segment piecewise linear interpolation across R→G→B, used by
    /// the rainbow effect. Byte-compatible with the classic NeoPixel wheel.
    pub fn wheel(pos: u8) -> Self {
        let pos = 255 - u16::from(pos);
        if pos < 85 {
            Color::new((255 - pos) as u8, 0, pos as u8)
        } else if pos < 170 {
            let pos = pos - 85;
            Color::new(0, pos as u8, (255 - pos) as u8)
        } else {
            let pos = pos - 170;
            Color::new(pos as u8, (255 - pos) as u8, 0)
        }
    }
}

/// Minimum per-channel value that survives the driver's global brightness
/// scaling: `ceil(256 / brightness)`.
///
/// The WS281x driver computes `value * brightness >> 8`, so anything below
/// this floor renders as zero.
pub fn floor_lsb_for(brightness: u8) -> u8 {
    if brightness == 0 || brightness == 255 {
        return 1;
    }
    let b = u32::from(brightness);
    ((256 + b - 1) / b).min(255) as u8
}

// ── Signal handling ────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// The flag is shared between the main loop and the signal handler via
/// `Arc<AtomicBool>` — a thread-safe boolean, no mutex needed.
pub fn setup_signal_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    running
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    // ── Hex parsing ────────────────────────────────────────────────

    #[rstest]
    #[case("#FF00FF", Color::new(255, 0, 255))]
    #[case("ff00ff", Color::new(255, 0, 255))]
    #[case("#00ff00", Color::GREEN)]
    #[case("000000", Color::OFF)]
    #[case(" #0000FF ", Color::BLUE)]
    fn from_hex_parses(#[case] input: &str, #[case] expected: Color) {
        assert_eq!(Color::from_hex(input), expected);
    }

    #[rstest]
    #[case("bad")]
    #[case("")]
    #[case("#12345")]
    #[case("#1234567")]
    #[case("gggggg")]
    #[case("+1234A")]
    #[case("-1234A")]
    fn from_hex_malformed_is_off(#[case] input: &str) {
        assert_eq!(Color::from_hex(input), Color::OFF);
    }

    // ── Fade ───────────────────────────────────────────────────────

    #[test]
    fn fade_zero_or_negative_is_off() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.fade(0.0), Color::OFF);
        assert_eq!(c.fade(-1.0), Color::OFF);
    }

    #[test]
    fn fade_above_one_clamps_to_one() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.fade(2.5), c.fade(1.0));
        assert_eq!(c.fade(1.0), c);
    }

    #[test]
    fn fade_truncates_channels_independently() {
        let c = Color::new(255, 3, 0);
        let faded = c.fade(0.5);
        assert_eq!(faded, Color::new(127, 1, 0));
    }

    #[test]
    fn fade_never_lifts_zero_channel() {
        let c = Color::new(255, 0, 255);
        for f in [0.1_f32, 0.5, 0.9, 1.0] {
            assert_eq!(c.fade(f).g, 0);
        }
    }

    // ── Scale with floor ───────────────────────────────────────────

    #[test]
    fn scale_with_floor_zero_gain_is_off() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.scale_with_floor(0.0, 6), Color::OFF);
        assert_eq!(c.scale_with_floor(-0.2, 6), Color::OFF);
    }

    #[test]
    fn scale_with_floor_keeps_dim_channels_visible() {
        // 10 * 0.05 truncates to 0 — floor kicks in
        let c = Color::new(10, 0, 200);
        let scaled = c.scale_with_floor(0.05, 6);
        assert_eq!(scaled.r, 6);
        assert_eq!(scaled.b, 10);
    }

    #[test]
    fn scale_with_floor_never_lifts_zero_channel() {
        let c = Color::new(255, 0, 1);
        let scaled = c.scale_with_floor(0.01, 6);
        assert_eq!(scaled.g, 0);
        assert_eq!(scaled.b, 6);
    }

    #[test]
    fn scale_with_floor_clamps_to_full_gain() {
        let c = Color::new(200, 100, 50);
        assert_eq!(c.scale_with_floor(3.0, 6), c);
    }

    // ── Wheel ──────────────────────────────────────────────────────

    #[rstest]
    #[case(255, Color::new(255, 0, 0))] // pos 0 in the first segment
    #[case(171, Color::new(171, 0, 84))]
    #[case(100, Color::new(0, 70, 185))]
    #[case(0, Color::new(85, 170, 0))]
    fn wheel_segment_values(#[case] pos: u8, #[case] expected: Color) {
        assert_eq!(Color::wheel(pos), expected);
    }

    #[test]
    fn wheel_is_always_partially_lit() {
        for pos in 0..=255u8 {
            let c = Color::wheel(pos);
            assert!(
                u16::from(c.r) + u16::from(c.g) + u16::from(c.b) > 0,
                "wheel({pos}) went dark"
            );
        }
    }

    // ── Brightness floor ───────────────────────────────────────────

    #[rstest]
    #[case(255, 1)]
    #[case(0, 1)]
    #[case(128, 2)]
    #[case(50, 6)] // ceil(256/50)
    #[case(1, 255)] // ceil(256/1) = 256, clamped
    fn floor_lsb_matches_global_brightness(#[case] brightness: u8, #[case] expected: u8) {
        assert_eq!(floor_lsb_for(brightness), expected);
    }

    #[test]
    fn floor_lsb_survives_driver_scaling() {
        // The property the floor exists for: floor * brightness / 256 >= 1.
        for brightness in 2..255u32 {
            let floor = u32::from(floor_lsb_for(brightness as u8));
            assert!(
                floor * brightness >= 256 || floor == 255,
                "floor {floor} too low for brightness {brightness}"
            );
        }
    }
}
