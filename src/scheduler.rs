//! Effect scheduler: the owner of strip access.
//!
//! At most one of {idle task, foreground run} writes to the strip at any
//! instant. The idle effect runs on its own cancellable background thread;
//! foreground effects run to completion on the effect worker thread, which
//! consumes a single mpsc queue so concurrent event dispatches serialize in
//! arrival order — the same channel-into-dedicated-thread shape the HTTP
//! server uses for everything that touches the hardware.
//!
//! The ordering guarantee for one event is strict:
//! `stop_idle()` (joins the idle thread) → `run_foreground()` → `start_idle()`.
//! No frame from the old idle effect can land after `stop_idle()` returns.

use crate::strip::{SharedStrip, blank, clear};
use crate::{Color, effects};
use effects::StopSignal;
use serde::Serialize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ── Effect specs ─────────────────────────────────────────────────────

/// Every animation the engine knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Blink,
    Wipe,
    Rainbow,
    Shoot,
    ShootBounce,
    StackedShoot,
    Breathe,
    Solid,
    Celebrate,
}

impl EffectKind {
    /// Parse a wire/preference effect name. Accepts the legacy aliases the
    /// deployed relay still sends. Unknown names return `None`; the
    /// dispatcher falls back to [`EffectKind::Celebrate`].
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "blink" => Some(Self::Blink),
            "wipe" => Some(Self::Wipe),
            "rainbow" => Some(Self::Rainbow),
            "shoot" => Some(Self::Shoot),
            "shoot_bounce" => Some(Self::ShootBounce),
            "stacked_shoot" | "stacked_shooting" | "deal_won_stacked" => Some(Self::StackedShoot),
            "breath" | "breathe" | "runbreathingeffect" => Some(Self::Breathe),
            "solid" => Some(Self::Solid),
            "celebrate" | "celebrate_legacy" => Some(Self::Celebrate),
            _ => None,
        }
    }
}

/// One resolved invocation: what to run, in which color, how many times.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectSpec {
    pub kind: EffectKind,
    pub color: Color,
    pub cycles: u32,
}

impl EffectSpec {
    pub fn new(kind: EffectKind, color: Color, cycles: u32) -> Self {
        Self {
            kind,
            color,
            cycles: cycles.max(1),
        }
    }
}

// ── Timing ───────────────────────────────────────────────────────────

/// Frame delays and hold durations for every primitive.
///
/// `Default` carries the tuning the deployed devices run; tests construct
/// near-zero timings so whole runs finish in milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    pub blink_on: Duration,
    pub blink_off: Duration,
    pub wipe_delay: Duration,
    pub wipe_pause: Duration,
    pub rainbow_delay: Duration,
    pub comet_tail: usize,
    pub shoot_delay: Duration,
    pub bounce_delay: Duration,
    pub stacked_delay: Duration,
    pub stacked_blinks: u32,
    pub stacked_blink_period: Duration,
    pub breathe_frame: Duration,
    pub breathe_period_secs: f64,
    pub breathe_min_duty: f64,
    pub solid_hold: Duration,
    pub celebrate_hold: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            blink_on: Duration::from_millis(500),
            blink_off: Duration::from_millis(250),
            wipe_delay: Duration::from_millis(5),
            wipe_pause: Duration::from_millis(200),
            rainbow_delay: Duration::from_millis(2),
            comet_tail: 8,
            shoot_delay: Duration::from_millis(20),
            bounce_delay: Duration::from_millis(15),
            stacked_delay: Duration::from_millis(15),
            stacked_blinks: 3,
            stacked_blink_period: Duration::from_millis(220),
            breathe_frame: Duration::from_millis(10),
            breathe_period_secs: 12.0,
            breathe_min_duty: 0.10,
            solid_hold: Duration::from_secs(1),
            celebrate_hold: Duration::from_secs(1),
        }
    }
}

/// Palette the stacked fill cycles through per launch.
const STACKED_PALETTE: [Color; 3] = [Color::RED, Color::BLUE, Color::GREEN];

// ── Scheduler ────────────────────────────────────────────────────────

/// Exactly one of these at any time; owned exclusively by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    IdleStopped,
    IdleRunning,
    ForegroundRunning,
}

struct IdleTask {
    stop: StopSignal,
    handle: thread::JoinHandle<()>,
}

/// Owns the strip reference and the idle/foreground state machine.
///
/// Constructed once and passed around by `Arc` — no ambient globals.
pub struct Scheduler {
    strip: SharedStrip,
    timing: Timing,
    floor_lsb: u8,
    state: Mutex<SchedulerState>,
    idle: Mutex<Option<IdleTask>>,
}

impl Scheduler {
    pub fn new(strip: SharedStrip, timing: Timing, floor_lsb: u8) -> Self {
        Self {
            strip,
            timing,
            floor_lsb,
            state: Mutex::new(SchedulerState::IdleStopped),
            idle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap()
    }

    pub fn strip(&self) -> &SharedStrip {
        &self.strip
    }

    /// Launch the idle effect's frame loop on a background thread.
    /// No-op if idle is already running.
    pub fn start_idle(&self, spec: &EffectSpec) {
        let mut idle = self.idle.lock().unwrap();
        if idle.is_some() {
            tracing::debug!("start_idle: idle effect already running");
            return;
        }

        tracing::info!(effect = ?spec.kind, "starting idle effect");
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let strip = self.strip.clone();
        let spec = spec.clone();
        let timing = self.timing;
        let floor_lsb = self.floor_lsb;

        let handle = thread::spawn(move || {
            run_idle(&strip, &spec, timing, floor_lsb, &task_stop);
        });

        *idle = Some(IdleTask { stop, handle });
        *self.state.lock().unwrap() = SchedulerState::IdleRunning;
    }

    /// Signal the idle task to stop and wait until it has exited.
    ///
    /// Synchronous on purpose: once this returns, the idle thread has been
    /// joined and the strip is dark — callers may immediately start writing
    /// frames without racing the old effect. No-op when idle isn't running.
    pub fn stop_idle(&self) {
        // Hold the slot lock across the join so a concurrent start_idle
        // blocks until the old task is fully gone, instead of spawning a
        // second writer while the join is still in flight. The idle thread
        // never takes this mutex, so the join cannot deadlock.
        let mut idle = self.idle.lock().unwrap();
        let Some(task) = idle.take() else {
            tracing::debug!("stop_idle: no idle effect running");
            return;
        };

        tracing::info!("stopping idle effect");
        task.stop.stop();
        if task.handle.join().is_err() {
            tracing::error!("idle effect thread panicked");
        }
        *self.state.lock().unwrap() = SchedulerState::IdleStopped;
    }

    /// Run a foreground effect to completion on the calling thread, then
    /// clear the strip unconditionally.
    ///
    /// Callers must have stopped the idle effect first; the effect worker
    /// always issues `stop_idle → run_foreground → start_idle` in sequence.
    pub fn run_foreground(&self, spec: &EffectSpec) {
        *self.state.lock().unwrap() = SchedulerState::ForegroundRunning;

        // Foreground runs are bounded by strip length and cycle counts;
        // the signal exists so shutdown can interrupt a long run.
        let stop = StopSignal::new();
        run_spec(&self.strip, spec, &self.timing, self.floor_lsb, &stop);

        clear(&self.strip);
        *self.state.lock().unwrap() = SchedulerState::IdleStopped;
    }
}

/// Run one finite effect to completion (or until `stop` fires).
fn run_spec(
    strip: &SharedStrip,
    spec: &EffectSpec,
    t: &Timing,
    floor_lsb: u8,
    stop: &StopSignal,
) {
    let cycles = spec.cycles.max(1);

    match spec.kind {
        EffectKind::Blink => {
            effects::blink(strip, spec.color, cycles, t.blink_on, t.blink_off, stop);
        }
        EffectKind::Wipe => {
            for _ in 0..cycles {
                if stop.is_stopped() {
                    break;
                }
                effects::color_wipe(strip, spec.color, t.wipe_delay, stop);
                thread::sleep(t.wipe_pause);
                blank(strip);
            }
        }
        EffectKind::Rainbow => {
            for _ in 0..cycles {
                if stop.is_stopped() {
                    break;
                }
                effects::rainbow_cycle(strip, t.rainbow_delay, stop);
            }
        }
        EffectKind::Shoot => {
            effects::comet(strip, spec.color, t.comet_tail, t.shoot_delay, stop);
        }
        EffectKind::ShootBounce => {
            effects::comet_bounce(strip, spec.color, t.comet_tail, t.bounce_delay, cycles, stop);
        }
        EffectKind::StackedShoot => {
            effects::stacked_comet(
                strip,
                &STACKED_PALETTE,
                t.comet_tail,
                t.stacked_delay,
                t.stacked_blinks,
                t.stacked_blink_period,
                stop,
            );
        }
        EffectKind::Breathe => {
            effects::breathe(
                strip,
                spec.color,
                floor_lsb,
                t.breathe_frame,
                t.breathe_period_secs,
                t.breathe_min_duty,
                Some(cycles),
                stop,
            );
        }
        EffectKind::Solid => {
            {
                let mut s = strip.lock().unwrap();
                s.fill(spec.color);
                s.render();
            }
            thread::sleep(t.solid_hold.saturating_mul(cycles));
            blank(strip);
        }
        EffectKind::Celebrate => {
            effects::celebrate(strip, t.celebrate_hold, stop);
        }
    }
}

/// Idle frame loop body. Breathing and solid fills park until stopped;
/// any other configured idle effect repeats until stopped.
fn run_idle(strip: &SharedStrip, spec: &EffectSpec, timing: Timing, floor_lsb: u8, stop: &StopSignal) {
    match spec.kind {
        EffectKind::Breathe => effects::breathe(
            strip,
            spec.color,
            floor_lsb,
            timing.breathe_frame,
            timing.breathe_period_secs,
            timing.breathe_min_duty,
            None,
            stop,
        ),
        EffectKind::Solid => effects::solid(strip, spec.color, timing.breathe_frame, stop),
        _ => {
            // Loop a finite effect as the idle animation.
            while !stop.is_stopped() {
                run_spec(strip, spec, &timing, floor_lsb, stop);
            }
            blank(strip);
        }
    }
}

// ── Effect worker ────────────────────────────────────────────────────

/// One queued foreground request.
pub struct EffectJob {
    /// Event name that triggered this run, for the logs.
    pub event: String,
    pub spec: EffectSpec,
}

/// Commands consumed by the effect worker thread.
///
/// Everything that changes what the strip is doing goes through this one
/// channel, so an idle restart triggered by a preference push can never
/// race a foreground run.
pub enum WorkerCommand {
    /// Run a foreground effect, then restore the configured idle effect.
    Run(EffectJob),
    /// Re-read the idle preference and restart the idle effect under it.
    RefreshIdle,
    /// Stop the idle effect and leave the strip dark.
    StopIdle,
    /// Stop everything and blank the strip. The optional sender is
    /// signalled once the strip is actually dark, so shutdown can wait
    /// behind whatever is still queued.
    Clear(Option<mpsc::Sender<()>>),
}

/// The single-consumer queue in front of the scheduler.
///
/// A second dispatch arriving mid-run waits in the channel; commands run
/// strictly in arrival order, one in flight at a time.
pub struct EffectWorker {
    commands: mpsc::Sender<WorkerCommand>,
    handle: thread::JoinHandle<()>,
}

impl EffectWorker {
    /// Spawn the worker thread. `idle_spec` is consulted after every
    /// foreground run and on every refresh, so preference pushes take
    /// effect without restarting the process.
    pub fn spawn<F>(scheduler: Arc<Scheduler>, idle_spec: F) -> Self
    where
        F: Fn() -> Option<EffectSpec> + Send + 'static,
    {
        let (commands, rx) = mpsc::channel::<WorkerCommand>();

        let handle = thread::spawn(move || {
            for command in rx {
                match command {
                    WorkerCommand::Run(job) => {
                        tracing::info!(
                            event = %job.event,
                            effect = ?job.spec.kind,
                            "running foreground effect"
                        );
                        scheduler.stop_idle();
                        scheduler.run_foreground(&job.spec);
                        if let Some(idle) = idle_spec() {
                            scheduler.start_idle(&idle);
                        }
                    }
                    WorkerCommand::RefreshIdle => {
                        scheduler.stop_idle();
                        match idle_spec() {
                            Some(idle) => scheduler.start_idle(&idle),
                            None => tracing::info!("no idle effect configured"),
                        }
                    }
                    WorkerCommand::StopIdle => {
                        scheduler.stop_idle();
                    }
                    WorkerCommand::Clear(done) => {
                        scheduler.stop_idle();
                        clear(scheduler.strip());
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                    }
                }
            }
            tracing::info!("effect worker: queue closed, exiting");
        });

        Self { commands, handle }
    }

    /// Queue handle for the dispatcher and HTTP handlers. Cheap to clone.
    pub fn sender(&self) -> mpsc::Sender<WorkerCommand> {
        self.commands.clone()
    }

    /// Close the queue and wait for in-flight commands to finish.
    pub fn join(self) {
        let EffectWorker { commands, handle } = self;
        drop(commands);
        if handle.join().is_err() {
            tracing::error!("effect worker thread panicked");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
