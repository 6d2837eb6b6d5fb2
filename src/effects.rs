//! Animation primitives: stateless per-run frame loops over a shared strip.
//!
//! Every primitive follows the same shape: lock the strip, write one frame,
//! render, unlock, then sleep for the frame delay. The lock is never held
//! across the sleep — that inter-frame gap is the only place another task
//! can take the strip, and the only place cancellation is checked.
//!
//! Foreground primitives are bounded by strip length and cycle counts; the
//! idle primitives ([`breathe`], [`solid`]) loop until their [`StopSignal`]
//! fires and blank the strip on the way out.

use crate::Color;
use crate::strip::{SharedStrip, blank};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// ── Cancellation ─────────────────────────────────────────────────────

/// Cooperative stop token, checked between frames — never mid-write.
///
/// Cloneable so the scheduler can keep one end while the effect thread
/// polls the other (same `Arc<AtomicBool>` pattern as the Ctrl+C flag).
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn strip_len(strip: &SharedStrip) -> usize {
    strip.lock().unwrap().len()
}

// ── Foreground primitives ────────────────────────────────────────────

/// Alternate full-fill and blank, `cycles` times.
pub fn blink(
    strip: &SharedStrip,
    color: Color,
    cycles: u32,
    on: Duration,
    off: Duration,
    stop: &StopSignal,
) {
    if strip_len(strip) == 0 {
        return;
    }
    for _ in 0..cycles.max(1) {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.fill(color);
            s.render();
        }
        thread::sleep(on);
        blank(strip);
        thread::sleep(off);
    }
}

/// Set cells front to back, rendering after each — a traveling fill.
pub fn color_wipe(strip: &SharedStrip, color: Color, delay: Duration, stop: &StopSignal) {
    let n = strip_len(strip);
    for i in 0..n {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.set(i, color);
            s.render();
        }
        thread::sleep(delay);
    }
}

/// One full hue rotation across the strip: 256×3 animation steps.
pub fn rainbow_cycle(strip: &SharedStrip, delay: Duration, stop: &StopSignal) {
    let n = strip_len(strip);
    if n == 0 {
        return;
    }
    for step in 0..256 * 3 {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            for i in 0..n {
                s.set(i, Color::wheel(((i * 256 / n + step) & 255) as u8));
            }
            s.render();
        }
        thread::sleep(delay);
    }
}

/// Draw a comet head with a fading tail into an already-blanked frame.
///
/// Positions at or past `limit` are skipped, so the stacked variant can
/// confine the comet to the unfilled region.
fn draw_comet_frame(
    s: &mut dyn crate::strip::StripDriver,
    head_color: Color,
    step: usize,
    tail: usize,
    limit: usize,
) {
    for t in 0..tail {
        let Some(pos) = step.checked_sub(t) else {
            continue;
        };
        if pos >= limit {
            continue;
        }
        let f = 1.0 - t as f32 / tail as f32;
        s.set(pos, head_color.fade(f));
    }
}

/// A bright head fading to black over `tail` pixels, traveling off the
/// far end of the strip. Step 0 lights only cell 0 at full brightness;
/// the final step leaves the strip dark.
pub fn comet(
    strip: &SharedStrip,
    head_color: Color,
    tail: usize,
    delay: Duration,
    stop: &StopSignal,
) {
    let tail = tail.max(1);
    let n = strip_len(strip);
    if n == 0 {
        return;
    }
    for step in 0..n + tail {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.fill(Color::OFF);
            draw_comet_frame(&mut *s, head_color, step, tail, n);
            s.render();
        }
        thread::sleep(delay);
    }
    blank(strip);
}

/// Comet whose direction reverses at each end; terminates after
/// `2 × bounces` boundary touches.
pub fn comet_bounce(
    strip: &SharedStrip,
    head_color: Color,
    tail: usize,
    delay: Duration,
    bounces: u32,
    stop: &StopSignal,
) {
    let tail = tail.max(1) as isize;
    let bounces = bounces.max(1);
    let n = strip_len(strip) as isize;
    if n == 0 {
        return;
    }

    let mut head: isize = 0;
    let mut dir: isize = 1;
    let mut touches = 0u32;

    loop {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.fill(Color::OFF);
            for t in 0..tail {
                let pos = head - t * dir;
                if (0..n).contains(&pos) {
                    let f = 1.0 - t as f32 / tail as f32;
                    s.set(pos as usize, head_color.fade(f));
                }
            }
            s.render();
        }
        thread::sleep(delay);

        head += dir;
        if head <= 0 {
            head = 0;
            dir = 1;
            touches += 1;
        } else if head >= n - 1 {
            head = n - 1;
            dir = -1;
            touches += 1;
        }
        if touches >= bounces * 2 {
            break;
        }
    }

    blank(strip);
}

/// Stacked comet fill: launch comets through the shrinking unfilled prefix,
/// committing each comet's tail to a persistent region that grows backward
/// from the end of the strip, cycling through `palette` per launch.
///
/// Once the strip is full, blink `blinks` times alternating the blink color
/// with the committed pattern, then clear.
pub fn stacked_comet(
    strip: &SharedStrip,
    palette: &[Color],
    tail: usize,
    delay: Duration,
    blinks: u32,
    blink_period: Duration,
    stop: &StopSignal,
) {
    let tail = tail.max(1);
    let n = strip_len(strip);
    if n == 0 || palette.is_empty() {
        return;
    }

    // Committed ("won") cells, separate from the transient comet overlay.
    let mut persist = vec![Color::OFF; n];
    let mut filled_start = n;
    let mut color_idx = 0usize;

    while filled_start > 0 {
        if stop.is_stopped() {
            blank(strip);
            return;
        }
        let shot = palette[color_idx % palette.len()];
        color_idx += 1;

        // Animate a comet through the unfilled region [0, filled_start).
        for step in 0..filled_start + tail {
            if stop.is_stopped() {
                blank(strip);
                return;
            }
            {
                let mut s = strip.lock().unwrap();
                for (i, &c) in persist.iter().enumerate() {
                    s.set(i, c);
                }
                draw_comet_frame(&mut *s, shot, step, tail, filled_start);
                s.render();
            }
            thread::sleep(delay);
        }

        // Commit this comet's chunk to the end of the unfilled region.
        let chunk = tail.min(filled_start);
        for i in 0..chunk {
            persist[filled_start - 1 - i] = shot;
        }
        filled_start -= chunk;
    }

    // Show the completed pattern once.
    {
        let mut s = strip.lock().unwrap();
        for (i, &c) in persist.iter().enumerate() {
            s.set(i, c);
        }
        s.render();
    }

    // Blink between the blink color and the committed pattern.
    for _ in 0..blinks.max(1) {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.fill(Color::WHITE);
            s.render();
        }
        thread::sleep(blink_period);
        {
            let mut s = strip.lock().unwrap();
            for (i, &c) in persist.iter().enumerate() {
                s.set(i, c);
            }
            s.render();
        }
        thread::sleep(blink_period);
    }

    blank(strip);
}

/// The legacy celebration: full-strip red, blue, green holds.
///
/// Doubles as the fallback when an event names an effect we don't know.
pub fn celebrate(strip: &SharedStrip, hold: Duration, stop: &StopSignal) {
    if strip_len(strip) == 0 {
        return;
    }
    for color in [Color::RED, Color::BLUE, Color::GREEN] {
        if stop.is_stopped() {
            break;
        }
        {
            let mut s = strip.lock().unwrap();
            s.fill(color);
            s.render();
        }
        thread::sleep(hold);
    }
    blank(strip);
}

// ── Idle primitives ──────────────────────────────────────────────────

/// Sinusoidal breathing at ~100 Hz.
///
/// Runs until stopped when `cycles` is `None` (the idle configuration), or
/// for a bounded number of full periods when requested as a foreground
/// effect. The phase is squared to ease the low end (a longer linger near
/// dark), and the duty never drops below `min_duty` so the strip never
/// looks off. `floor_lsb` pre-compensates for the driver's global
/// brightness scaler.
#[allow(clippy::too_many_arguments)]
pub fn breathe(
    strip: &SharedStrip,
    base: Color,
    floor_lsb: u8,
    frame: Duration,
    period_secs: f64,
    min_duty: f64,
    cycles: Option<u32>,
    stop: &StopSignal,
) {
    if strip_len(strip) == 0 {
        return;
    }
    let omega = 2.0 * std::f64::consts::PI / period_secs;
    let deadline = cycles.map(|c| period_secs * f64::from(c.max(1)));
    let start = Instant::now();

    while !stop.is_stopped() {
        let elapsed = start.elapsed().as_secs_f64();
        if deadline.is_some_and(|d| elapsed >= d) {
            break;
        }
        let phase = ((omega * elapsed).sin() + 1.0) / 2.0;
        let phase = phase * phase;
        let duty = min_duty + (1.0 - min_duty) * phase;

        {
            let mut s = strip.lock().unwrap();
            s.fill(base.scale_with_floor(duty, floor_lsb));
            s.render();
        }
        thread::sleep(frame);
    }

    blank(strip);
}

/// Persistent solid fill: renders once, parks until stopped, then clears.
pub fn solid(strip: &SharedStrip, color: Color, tick: Duration, stop: &StopSignal) {
    if strip_len(strip) == 0 {
        return;
    }
    {
        let mut s = strip.lock().unwrap();
        s.fill(color);
        s.render();
    }
    while !stop.is_stopped() {
        thread::sleep(tick);
    }
    blank(strip);
}

// ── Tests ────────────────────────────────────────────────────────────
