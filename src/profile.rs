//! # Profile Format
//!
//! JSON persistence of one profile: bindings, layers, chords, sequences,
//! gesture actions, analog and gesture tuning, and the macro library.
//!
//! Buttons are string-keyed only here; everything past [`Profile::into_parts`]
//! uses typed [`Button`] maps.
//!
//! Loading never rejects a numeric dial. Non-finite or non-positive
//! durations fall back to their default, everything else is clamped
//! into its documented range. Structurally invalid chords, sequences and
//! layers are skipped with a warning so one bad entry does not take the
//! whole profile down.
//!
//! ## Usage
//!
//! ```
//! use controller_keys::profile::Profile;
//!
//! let json = r#"{
//!     "name": "Browsing",
//!     "buttons": { "a": { "primary": { "type": "key_press", "key": 36 } } },
//!     "sequences": [ { "steps": ["dpad_up", "dpad_up"], "step_timeout_ms": -1, "action": { "type": "key_press", "key": 48 } } ]
//! }"#;
//! let profile: Profile = serde_json::from_str(json)?;
//! let parts = profile.into_parts();
//! assert_eq!(parts.table.sequences()[0].step_timeout().as_millis(), 400);
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::binding::action::{Action, MacroId};
use crate::binding::macros::{Macro, MacroLibrary};
use crate::binding::table::{
    BindingEntry, BindingTable, ChordMapping, DoubleTap, GestureKind, Layer, LongHold, Repeat,
    SequenceMapping, DEFAULT_DOUBLE_TAP_WINDOW, DEFAULT_LONG_HOLD_THRESHOLD,
    DEFAULT_REPEAT_INTERVAL, DEFAULT_STEP_TIMEOUT,
};
use crate::engine::analog::{
    AnalogSettings, FocusSettings, StickMode, StickSettings, TouchpadMode, TouchpadSettings,
    ZoomMode,
};
use crate::engine::gesture::{GestureSettings, DEFAULT_COOLDOWN, DEFAULT_REARM_THRESHOLD};
use crate::error::{ControllerKeysError, Result};
use crate::input::button::{Button, ButtonMap};

/// Long-hold threshold range in milliseconds.
pub const LONG_HOLD_RANGE_MS: (f64, f64) = (50.0, 5000.0);
/// Double-tap window range in milliseconds.
pub const DOUBLE_TAP_RANGE_MS: (f64, f64) = (50.0, 2000.0);
/// Repeat interval range in milliseconds.
pub const REPEAT_RANGE_MS: (f64, f64) = (10.0, 5000.0);
/// Sequence step timeout range in milliseconds.
pub const STEP_TIMEOUT_RANGE_MS: (f64, f64) = (50.0, 10_000.0);
/// Gesture cooldown range in milliseconds. Zero disables the cooldown.
pub const COOLDOWN_RANGE_MS: (f64, f64) = (0.0, 5000.0);

const DIAL_RANGE: (f32, f32) = (0.0, 1.0);
const DEADZONE_RANGE: (f32, f32) = (0.0, 0.5);
const KEY_THRESHOLD_RANGE: (f32, f32) = (0.1, 0.95);
const PAN_ZOOM_RATIO_RANGE: (f32, f32) = (1.0, 10.0);
const GESTURE_THRESHOLD_RANGE: (f32, f32) = (0.1, 1.0);

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_long_hold_ms() -> f64 {
    to_ms(DEFAULT_LONG_HOLD_THRESHOLD)
}

fn default_double_tap_ms() -> f64 {
    to_ms(DEFAULT_DOUBLE_TAP_WINDOW)
}

fn default_repeat_ms() -> f64 {
    to_ms(DEFAULT_REPEAT_INTERVAL)
}

fn default_step_timeout_ms() -> f64 {
    to_ms(DEFAULT_STEP_TIMEOUT)
}

fn to_ms(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

/// Positive, finite milliseconds clamped into `range`; anything else
/// becomes `default`.
fn sanitize_ms(value: f64, default: Duration, range: (f64, f64)) -> Duration {
    if !value.is_finite() || value <= 0.0 {
        return default;
    }
    let micros = (value.clamp(range.0, range.1) * 1000.0).round();
    Duration::from_micros(micros as u64)
}

/// Like [`sanitize_ms`] but zero is a legal value.
fn sanitize_ms_or_zero(value: f64, default: Duration, range: (f64, f64)) -> Duration {
    if value == 0.0 {
        return Duration::ZERO;
    }
    sanitize_ms(value, default, range)
}

fn dial(value: f32, default: f32, range: (f32, f32)) -> f32 {
    if value.is_finite() {
        value.clamp(range.0, range.1)
    } else {
        default
    }
}

// ==================== Bindings ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongHoldDef {
    pub action: Action,
    #[serde(default = "default_long_hold_ms")]
    pub threshold_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleTapDef {
    pub action: Action,
    #[serde(default = "default_double_tap_ms")]
    pub window_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatDef {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_repeat_ms")]
    pub interval_ms: f64,
}

/// Persisted form of a [`BindingEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<Action>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hold_style: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_hold: Option<LongHoldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_tap: Option<DoubleTapDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatDef>,
}

impl EntryDef {
    fn from_entry(entry: &BindingEntry) -> Self {
        Self {
            primary: entry.primary.clone(),
            hold_style: entry.hold_style,
            long_hold: entry.long_hold.as_ref().map(|l| LongHoldDef {
                action: l.action.clone(),
                threshold_ms: to_ms(l.threshold),
            }),
            double_tap: entry.double_tap.as_ref().map(|d| DoubleTapDef {
                action: d.action.clone(),
                window_ms: to_ms(d.window),
            }),
            repeat: entry.repeat.map(|r| RepeatDef {
                enabled: r.enabled,
                interval_ms: to_ms(r.interval),
            }),
        }
    }

    fn into_entry(self) -> BindingEntry {
        BindingEntry {
            primary: self.primary,
            hold_style: self.hold_style,
            long_hold: self.long_hold.map(|l| LongHold {
                action: l.action,
                threshold: sanitize_ms(l.threshold_ms, DEFAULT_LONG_HOLD_THRESHOLD, LONG_HOLD_RANGE_MS),
            }),
            double_tap: self.double_tap.map(|d| DoubleTap {
                action: d.action,
                window: sanitize_ms(d.window_ms, DEFAULT_DOUBLE_TAP_WINDOW, DOUBLE_TAP_RANGE_MS),
            }),
            repeat: self.repeat.map(|r| Repeat {
                enabled: r.enabled,
                interval: sanitize_ms(r.interval_ms, DEFAULT_REPEAT_INTERVAL, REPEAT_RANGE_MS),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordDef {
    pub buttons: Vec<Button>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDef {
    pub steps: Vec<Button>,
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: f64,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    pub name: String,
    pub activator: Button,
    #[serde(default)]
    pub buttons: BTreeMap<Button, EntryDef>,
    #[serde(default)]
    pub chords: Vec<ChordDef>,
    #[serde(default)]
    pub sequences: Vec<SequenceDef>,
}

fn entry_defs(map: &ButtonMap<BindingEntry>) -> BTreeMap<Button, EntryDef> {
    map.iter().map(|(b, e)| (b, EntryDef::from_entry(e))).collect()
}

fn chord_defs(chords: &[ChordMapping]) -> Vec<ChordDef> {
    chords
        .iter()
        .map(|c| ChordDef {
            buttons: c.buttons().iter().collect(),
            action: c.action().clone(),
        })
        .collect()
}

fn sequence_defs(sequences: &[SequenceMapping]) -> Vec<SequenceDef> {
    sequences
        .iter()
        .map(|s| SequenceDef {
            steps: s.steps().to_vec(),
            step_timeout_ms: to_ms(s.step_timeout()),
            action: s.action().clone(),
        })
        .collect()
}

fn build_chord(def: ChordDef, scope: &str) -> Option<ChordMapping> {
    ChordMapping::new(def.buttons, def.action)
        .map_err(|e| warn!(scope, "Skipping chord: {}", e))
        .ok()
}

fn build_sequence(def: SequenceDef, scope: &str) -> Option<SequenceMapping> {
    let timeout = sanitize_ms(def.step_timeout_ms, DEFAULT_STEP_TIMEOUT, STEP_TIMEOUT_RANGE_MS);
    SequenceMapping::new(def.steps, timeout, def.action)
        .map_err(|e| warn!(scope, "Skipping sequence: {}", e))
        .ok()
}

// ==================== Tuning ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickDef {
    pub mode: StickMode,
    pub sensitivity: f32,
    pub acceleration: f32,
    pub deadzone: f32,
    pub invert_x: bool,
    pub invert_y: bool,
}

impl Default for StickDef {
    fn default() -> Self {
        Self::from(StickSettings::default())
    }
}

impl From<StickSettings> for StickDef {
    fn from(s: StickSettings) -> Self {
        Self {
            mode: s.mode,
            sensitivity: s.sensitivity,
            acceleration: s.acceleration,
            deadzone: s.deadzone,
            invert_x: s.invert_x,
            invert_y: s.invert_y,
        }
    }
}

impl StickDef {
    fn sanitized(self) -> StickSettings {
        let d = StickSettings::default();
        StickSettings {
            mode: self.mode,
            sensitivity: dial(self.sensitivity, d.sensitivity, DIAL_RANGE),
            acceleration: dial(self.acceleration, d.acceleration, DIAL_RANGE),
            deadzone: dial(self.deadzone, d.deadzone, DEADZONE_RANGE),
            invert_x: self.invert_x,
            invert_y: self.invert_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchpadDef {
    pub mode: TouchpadMode,
    pub sensitivity: f32,
    pub acceleration: f32,
    pub invert_y: bool,
    pub pan_zoom_ratio: f32,
    pub zoom: ZoomMode,
}

impl Default for TouchpadDef {
    fn default() -> Self {
        Self::from(TouchpadSettings::default())
    }
}

impl From<TouchpadSettings> for TouchpadDef {
    fn from(t: TouchpadSettings) -> Self {
        Self {
            mode: t.mode,
            sensitivity: t.sensitivity,
            acceleration: t.acceleration,
            invert_y: t.invert_y,
            pan_zoom_ratio: t.pan_zoom_ratio,
            zoom: t.zoom,
        }
    }
}

impl TouchpadDef {
    fn sanitized(self) -> TouchpadSettings {
        let d = TouchpadSettings::default();
        TouchpadSettings {
            mode: self.mode,
            sensitivity: dial(self.sensitivity, d.sensitivity, DIAL_RANGE),
            acceleration: dial(self.acceleration, d.acceleration, DIAL_RANGE),
            invert_y: self.invert_y,
            pan_zoom_ratio: dial(self.pan_zoom_ratio, d.pan_zoom_ratio, PAN_ZOOM_RATIO_RANGE),
            zoom: self.zoom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusDef {
    pub button: Option<Button>,
    pub sensitivity: f32,
}

impl Default for FocusDef {
    fn default() -> Self {
        let d = FocusSettings::default();
        Self {
            button: d.button,
            sensitivity: d.sensitivity,
        }
    }
}

/// Persisted [`AnalogSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogDef {
    pub left_stick: StickDef,
    pub right_stick: StickDef,
    pub touchpad: TouchpadDef,
    pub focus: FocusDef,
    pub key_threshold: f32,
}

impl Default for AnalogDef {
    fn default() -> Self {
        Self::from(&AnalogSettings::default())
    }
}

impl From<&AnalogSettings> for AnalogDef {
    fn from(a: &AnalogSettings) -> Self {
        Self {
            left_stick: a.left_stick.into(),
            right_stick: a.right_stick.into(),
            touchpad: a.touchpad.into(),
            focus: FocusDef {
                button: a.focus.button,
                sensitivity: a.focus.sensitivity,
            },
            key_threshold: a.key_threshold,
        }
    }
}

impl AnalogDef {
    /// Settings with every dial forced into range.
    #[must_use]
    pub fn sanitized(self) -> AnalogSettings {
        let d = AnalogSettings::default();
        AnalogSettings {
            left_stick: self.left_stick.sanitized(),
            right_stick: self.right_stick.sanitized(),
            touchpad: self.touchpad.sanitized(),
            focus: FocusSettings {
                button: self.focus.button,
                sensitivity: dial(self.focus.sensitivity, d.focus.sensitivity, DIAL_RANGE),
            },
            key_threshold: dial(self.key_threshold, d.key_threshold, KEY_THRESHOLD_RANGE),
        }
    }
}

/// Persisted [`GestureSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureDef {
    pub enabled: bool,
    pub tilt_threshold: f32,
    pub steer_threshold: f32,
    pub rearm_threshold: f32,
    pub cooldown_ms: f64,
}

impl Default for GestureDef {
    fn default() -> Self {
        Self::from(&GestureSettings::default())
    }
}

impl From<&GestureSettings> for GestureDef {
    fn from(g: &GestureSettings) -> Self {
        Self {
            enabled: g.enabled,
            tilt_threshold: g.tilt_threshold,
            steer_threshold: g.steer_threshold,
            rearm_threshold: g.rearm_threshold,
            cooldown_ms: to_ms(g.cooldown),
        }
    }
}

impl GestureDef {
    /// Settings with thresholds in range and the re-arm threshold kept
    /// strictly below both trigger thresholds.
    #[must_use]
    pub fn sanitized(self) -> GestureSettings {
        let d = GestureSettings::default();
        let tilt = dial(self.tilt_threshold, d.tilt_threshold, GESTURE_THRESHOLD_RANGE);
        let steer = dial(self.steer_threshold, d.steer_threshold, GESTURE_THRESHOLD_RANGE);
        let lowest = tilt.min(steer);
        let mut rearm = dial(self.rearm_threshold, DEFAULT_REARM_THRESHOLD, DIAL_RANGE);
        if rearm >= lowest {
            rearm = DEFAULT_REARM_THRESHOLD.min(lowest * 0.5);
        }
        GestureSettings {
            enabled: self.enabled,
            tilt_threshold: tilt,
            steer_threshold: steer,
            rearm_threshold: rearm,
            cooldown: sanitize_ms_or_zero(self.cooldown_ms, DEFAULT_COOLDOWN, COOLDOWN_RANGE_MS),
        }
    }
}

// ==================== Profile ====================

/// Everything the runtime needs from a loaded profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileParts {
    pub name: String,
    pub enabled: bool,
    pub table: BindingTable,
    pub analog: AnalogSettings,
    pub gestures: GestureSettings,
    pub macros: MacroLibrary,
}

/// One persisted profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// A disabled profile ignores all controller input.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub buttons: BTreeMap<Button, EntryDef>,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
    #[serde(default)]
    pub chords: Vec<ChordDef>,
    #[serde(default)]
    pub sequences: Vec<SequenceDef>,
    #[serde(default)]
    pub gestures: BTreeMap<GestureKind, Action>,
    #[serde(default)]
    pub gesture_settings: GestureDef,
    #[serde(default)]
    pub analog: AnalogDef,
    #[serde(default)]
    pub macros: Vec<Macro>,
}

impl Profile {
    /// Captures a built table and its tuning.
    #[must_use]
    pub fn from_parts(parts: &ProfileParts) -> Self {
        let table = &parts.table;
        Self {
            name: parts.name.clone(),
            enabled: parts.enabled,
            buttons: entry_defs(table.base()),
            layers: table
                .layers()
                .iter()
                .map(|l| LayerDef {
                    name: l.name.clone(),
                    activator: l.activator,
                    buttons: entry_defs(&l.buttons),
                    chords: chord_defs(l.chords()),
                    sequences: sequence_defs(l.sequences()),
                })
                .collect(),
            chords: chord_defs(table.chords()),
            sequences: sequence_defs(table.sequences()),
            gestures: table.gestures().map(|(k, a)| (k, a.clone())).collect(),
            gesture_settings: GestureDef::from(&parts.gestures),
            analog: AnalogDef::from(&parts.analog),
            macros: parts.macros.iter().cloned().collect(),
        }
    }

    /// Captures a table with default tuning and no macros.
    #[must_use]
    pub fn from_table(name: &str, table: &BindingTable) -> Self {
        Self::from_parts(&ProfileParts {
            name: name.to_string(),
            enabled: true,
            table: table.clone(),
            analog: AnalogSettings::default(),
            gestures: GestureSettings::default(),
            macros: MacroLibrary::new(),
        })
    }

    /// Builds the runtime structures, sanitizing as it goes.
    #[must_use]
    pub fn into_parts(self) -> ProfileParts {
        let mut table = BindingTable::new();
        for (button, def) in self.buttons {
            table.set_binding(button, def.into_entry());
        }
        for def in self.chords.into_iter().filter_map(|d| build_chord(d, "base")) {
            if let Err(e) = table.add_chord(def) {
                warn!("Skipping chord: {}", e);
            }
        }
        for def in self.sequences.into_iter().filter_map(|d| build_sequence(d, "base")) {
            table.add_sequence(def);
        }
        for def in self.layers {
            let mut layer = Layer::new(&def.name, def.activator);
            for (button, entry) in def.buttons {
                layer.set_binding(button, entry.into_entry());
            }
            for chord in def.chords.into_iter().filter_map(|d| build_chord(d, &def.name)) {
                if let Err(e) = layer.add_chord(chord) {
                    warn!(layer = %def.name, "Skipping chord: {}", e);
                }
            }
            for sequence in def.sequences.into_iter().filter_map(|d| build_sequence(d, &def.name)) {
                layer.add_sequence(sequence);
            }
            if let Err(e) = table.add_layer(layer) {
                warn!(layer = %def.name, "Skipping layer: {}", e);
            }
        }
        for (kind, action) in self.gestures {
            table.set_gesture(kind, action);
        }

        let mut macros = MacroLibrary::new();
        for m in self.macros {
            macros.insert(m);
        }
        for id in unknown_macros(&table, &macros) {
            warn!(profile = %self.name, "Action references unknown macro {}", id);
        }

        ProfileParts {
            name: self.name,
            enabled: self.enabled,
            table,
            analog: self.analog.sanitized(),
            gestures: self.gesture_settings.sanitized(),
            macros,
        }
    }

    /// Loads a profile from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the profile file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a profile.
    /// Out-of-range values are not errors.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&contents)?;
        info!("Loaded profile '{}' from {}", profile.name, path.display());
        Ok(profile)
    }

    /// Writes the profile as pretty JSON.
    ///
    /// # Errors
    ///
    /// - `UnknownMacro` if an action references a macro the profile does
    ///   not define
    /// - I/O or serialization failures
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(id) = self.missing_macro() {
            return Err(ControllerKeysError::UnknownMacro(id.0.clone()));
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Profile '{}' saved to {}", self.name, path.display());
        Ok(())
    }

    fn actions(&self) -> impl Iterator<Item = &Action> + '_ {
        fn entry_actions(entry: &EntryDef) -> impl Iterator<Item = &Action> + '_ {
            entry
                .primary
                .iter()
                .chain(entry.long_hold.iter().map(|l| &l.action))
                .chain(entry.double_tap.iter().map(|d| &d.action))
        }
        let layer_actions = self.layers.iter().flat_map(|l| {
            l.buttons
                .values()
                .flat_map(entry_actions)
                .chain(l.chords.iter().map(|c| &c.action))
                .chain(l.sequences.iter().map(|s| &s.action))
        });
        self.buttons
            .values()
            .flat_map(entry_actions)
            .chain(self.chords.iter().map(|c| &c.action))
            .chain(self.sequences.iter().map(|s| &s.action))
            .chain(self.gestures.values())
            .chain(layer_actions)
    }

    fn missing_macro(&self) -> Option<&MacroId> {
        self.actions().find_map(|action| match action {
            Action::Macro { id } if !self.macros.iter().any(|m| &m.id == id) => Some(id),
            _ => None,
        })
    }
}

fn unknown_macros<'a>(table: &'a BindingTable, macros: &'a MacroLibrary) -> impl Iterator<Item = &'a MacroId> + 'a {
    table.all_actions().filter_map(move |action| match action {
        Action::Macro { id } if !macros.contains(id) => Some(id),
        _ => None,
    })
}
