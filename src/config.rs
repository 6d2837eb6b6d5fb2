//! Device configuration: hardware parameters plus per-event effect
//! preferences, stored as one JSON file (`config.json`).
//!
//! The preference half is runtime-mutable — the relay can push a new set
//! at any time and the agent persists it here so a restart comes back up
//! with the same idle effect.

use crate::scheduler::{EffectKind, EffectSpec};
use crate::{Color, StripConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// One configured effect: name, hex color, cycle count.
///
/// Everything is optional on the wire; empty fields mean "use the default"
/// at resolution time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct EffectPref {
    /// Effect name (see `EffectKind::parse` for accepted values).
    pub effect: String,
    /// `"#RRGGBB"` color; empty or malformed falls back to a default.
    pub color: String,
    /// Repetitions; 0 means unset.
    pub cycles: u32,
}

/// The runtime-mutable half of the configuration: the idle effect and the
/// per-event defaults the dispatcher resolves against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct DevicePrefs {
    pub idle: EffectPref,
    /// Event name → configured effect (e.g. `"deal_won"` → stacked shoot).
    pub events: BTreeMap<String, EffectPref>,
}

impl DevicePrefs {
    /// The idle effect to run when nothing else is happening, or `None`
    /// when no (recognized) idle effect is configured.
    ///
    /// An unset or malformed idle color falls back to blue, matching the
    /// deployed devices.
    pub fn idle_spec(&self) -> Option<EffectSpec> {
        let kind = EffectKind::parse(&self.idle.effect)?;
        let mut color = Color::from_hex(&self.idle.color);
        if color == Color::OFF {
            color = Color::BLUE;
        }
        Some(EffectSpec::new(kind, color, self.idle.cycles.max(1)))
    }
}

/// Shared, runtime-updatable preferences handle.
pub type SharedPrefs = Arc<RwLock<DevicePrefs>>;

/// The whole `config.json`: strip hardware parameters plus preferences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub led_pin: u8,
    pub led_count: usize,
    /// Driver-level global brightness (0-255).
    pub brightness: u8,
    pub idle: EffectPref,
    pub events: BTreeMap<String, EffectPref>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            led_pin: 18,
            led_count: 300,
            brightness: 255,
            idle: EffectPref::default(),
            events: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file is not an error — the hardware
    /// defaults apply — but malformed JSON is.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            tracing::warn!("{} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Persist to `path`, pretty-printed so the file stays hand-editable.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn strip_config(&self) -> StripConfig {
        StripConfig {
            pin: self.led_pin,
            count: self.led_count,
            brightness: self.brightness,
        }
    }

    pub fn prefs(&self) -> DevicePrefs {
        DevicePrefs {
            idle: self.idle.clone(),
            events: self.events.clone(),
        }
    }

    /// Replace the preference half (after a relay push) ahead of a save.
    pub fn set_prefs(&mut self, prefs: &DevicePrefs) {
        self.idle = prefs.idle.clone();
        self.events = prefs.events.clone();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
