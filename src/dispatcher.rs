//! Event dispatcher: turns relay messages into foreground effect jobs.
//!
//! Resolution order for one event: the device's configured preference for
//! the event name, overridden by any non-empty fields on the message
//! itself, with hard fallbacks underneath — an event is never dropped for
//! being misconfigured, it just runs the default celebration in green.

use crate::Color;
use crate::config::{DevicePrefs, SharedPrefs};
use crate::scheduler::{EffectJob, EffectKind, EffectSpec, WorkerCommand};
use serde::Deserialize;
use std::sync::mpsc;

/// Color used when neither the preferences nor the message carry one.
pub const DEFAULT_COLOR: Color = Color::GREEN;

/// A relay message: either a bare event name or an event with overrides.
///
/// Plain-text frames (`"deal_won"`) become an `EventMessage` with only
/// `event` set.
#[derive(Clone, Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct EventMessage {
    /// Logical event name, e.g. `"deal_won"`.
    #[serde(rename = "type")]
    pub event: String,
    /// Optional effect override.
    pub effect: String,
    /// Optional `"#RRGGBB"` color override.
    pub color: String,
    /// Optional cycle-count override (0 = unset).
    pub cycles: u32,
}

impl EventMessage {
    pub fn named(event: &str) -> Self {
        Self {
            event: event.to_string(),
            ..Self::default()
        }
    }
}

/// Resolve an event against the device preferences.
///
/// A malformed color parses to the OFF sentinel and falls through to
/// [`DEFAULT_COLOR`]; an unknown effect name falls through to
/// [`EffectKind::Celebrate`].
pub fn resolve(prefs: &DevicePrefs, msg: &EventMessage) -> EffectSpec {
    let event = msg.event.trim().to_ascii_lowercase();

    // Device-level defaults for this event name.
    let mut kind = None;
    let mut color = Color::OFF;
    let mut cycles = 0u32;
    if let Some(pref) = prefs.events.get(&event) {
        kind = EffectKind::parse(&pref.effect);
        color = Color::from_hex(&pref.color);
        cycles = pref.cycles;
    }

    // Message overrides.
    if !msg.effect.trim().is_empty() {
        kind = EffectKind::parse(&msg.effect);
    }
    if !msg.color.trim().is_empty() {
        color = Color::from_hex(&msg.color);
    }
    if msg.cycles > 0 {
        cycles = msg.cycles;
    }

    // Hard fallbacks.
    let kind = kind.unwrap_or(EffectKind::Celebrate);
    let color = if color == Color::OFF { DEFAULT_COLOR } else { color };
    EffectSpec::new(kind, color, cycles.max(1))
}

/// Resolves events and hands them to the effect worker's queue.
pub struct Dispatcher {
    commands: mpsc::Sender<WorkerCommand>,
    prefs: SharedPrefs,
}

impl Dispatcher {
    pub fn new(commands: mpsc::Sender<WorkerCommand>, prefs: SharedPrefs) -> Self {
        Self { commands, prefs }
    }

    /// Resolve and enqueue one event. Never blocks on the running effect;
    /// the queue serializes delivery order into run order.
    pub fn dispatch(&self, msg: &EventMessage) {
        let spec = {
            let prefs = self.prefs.read().unwrap();
            resolve(&prefs, msg)
        };
        tracing::info!(
            event = %msg.event,
            effect = ?spec.kind,
            cycles = spec.cycles,
            "dispatching event"
        );
        let job = EffectJob {
            event: msg.event.clone(),
            spec,
        };
        if self.commands.send(WorkerCommand::Run(job)).is_err() {
            // Worker gone means we are shutting down.
            tracing::error!("effect worker unavailable; event dropped");
        }
    }

    /// Dispatch a bare event name (the relay's plain-text frame form).
    pub fn dispatch_text(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.dispatch(&EventMessage::named(name));
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectPref;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, RwLock};

    fn prefs_with_deal_won() -> DevicePrefs {
        let mut prefs = DevicePrefs::default();
        prefs.events.insert(
            "deal_won".into(),
            EffectPref {
                effect: "stacked_shooting".into(),
                color: "#FF0000".into(),
                cycles: 2,
            },
        );
        prefs
    }

    #[test]
    fn resolve_uses_configured_event_pref() {
        let spec = resolve(&prefs_with_deal_won(), &EventMessage::named("deal_won"));
        assert_eq!(
            spec,
            EffectSpec::new(EffectKind::StackedShoot, Color::RED, 2)
        );
    }

    #[test]
    fn resolve_event_name_is_case_insensitive() {
        let spec = resolve(&prefs_with_deal_won(), &EventMessage::named("  Deal_Won "));
        assert_eq!(spec.kind, EffectKind::StackedShoot);
    }

    #[test]
    fn resolve_message_overrides_win() {
        let msg = EventMessage {
            event: "deal_won".into(),
            effect: "rainbow".into(),
            color: "#0000FF".into(),
            cycles: 5,
        };
        let spec = resolve(&prefs_with_deal_won(), &msg);
        assert_eq!(spec, EffectSpec::new(EffectKind::Rainbow, Color::BLUE, 5));
    }

    #[test]
    fn resolve_unknown_event_falls_back_to_celebrate_green() {
        let spec = resolve(&DevicePrefs::default(), &EventMessage::named("mystery"));
        assert_eq!(
            spec,
            EffectSpec::new(EffectKind::Celebrate, DEFAULT_COLOR, 1)
        );
    }

    #[test]
    fn resolve_unknown_effect_override_falls_back_to_celebrate() {
        let msg = EventMessage {
            event: "deal_won".into(),
            effect: "disco".into(),
            ..EventMessage::default()
        };
        let spec = resolve(&prefs_with_deal_won(), &msg);
        assert_eq!(spec.kind, EffectKind::Celebrate);
    }

    #[test]
    fn resolve_malformed_color_falls_back_to_default() {
        let msg = EventMessage {
            event: "deal_won".into(),
            color: "zzz".into(),
            ..EventMessage::default()
        };
        let spec = resolve(&prefs_with_deal_won(), &msg);
        assert_eq!(spec.color, DEFAULT_COLOR);
    }

    #[test]
    fn resolve_zero_cycles_clamps_to_one() {
        let spec = resolve(&DevicePrefs::default(), &EventMessage::named("anything"));
        assert_eq!(spec.cycles, 1);
    }

    #[test]
    fn dispatch_enqueues_resolved_job() {
        let (tx, rx) = mpsc::channel();
        let prefs: SharedPrefs = Arc::new(RwLock::new(prefs_with_deal_won()));
        let dispatcher = Dispatcher::new(tx, prefs);

        dispatcher.dispatch_text("deal_won");

        let command = rx.try_recv().expect("no job enqueued");
        let WorkerCommand::Run(job) = command else {
            panic!("expected a run command");
        };
        assert_eq!(job.event, "deal_won");
        assert_eq!(job.spec.kind, EffectKind::StackedShoot);
    }

    #[test]
    fn dispatch_text_ignores_empty_frames() {
        let (tx, rx) = mpsc::channel();
        let prefs: SharedPrefs = Arc::new(RwLock::new(DevicePrefs::default()));
        let dispatcher = Dispatcher::new(tx, prefs);

        dispatcher.dispatch_text("   ");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_survives_a_closed_queue() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let prefs: SharedPrefs = Arc::new(RwLock::new(DevicePrefs::default()));
        let dispatcher = Dispatcher::new(tx, prefs);
        // Must log and return, not panic.
        dispatcher.dispatch_text("deal_won");
    }
}
