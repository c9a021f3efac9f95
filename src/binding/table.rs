//! # Binding Table
//!
//! Static, per-profile lookup from button to mapping: a base layer, any
//! number of named layers, chords, sequences and gesture actions.
//!
//! The table is validated while it is being built ("authoring time"):
//! chords need two or more buttons and must not repeat an exact button
//! set, sequences need two or more steps and a positive step timeout,
//! and each layer needs its own activator. The engine assumes a table
//! that passed these checks.
//!
//! ## Usage
//!
//! ```
//! use controller_keys::binding::action::{Action, KeyCode};
//! use controller_keys::binding::table::{BindingEntry, BindingTable, ChordMapping};
//! use controller_keys::input::button::Button;
//!
//! let mut table = BindingTable::new();
//! table.set_binding(Button::A, BindingEntry::primary(Action::key(KeyCode::RETURN)));
//! table.add_chord(ChordMapping::new([Button::LeftBumper, Button::A], Action::key(KeyCode::TAB))?)?;
//!
//! assert!(table.entry(Button::A, None).is_some());
//! # Ok::<(), controller_keys::error::ControllerKeysError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::action::Action;
use crate::error::{ControllerKeysError, Result};
use crate::input::button::{Button, ButtonMap, ButtonSet};

/// Default time a button must be held to trigger its long-hold action.
pub const DEFAULT_LONG_HOLD_THRESHOLD: Duration = Duration::from_millis(500);

/// Default window in which a second press counts as a double tap.
pub const DEFAULT_DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

/// Default interval between repeated primary actions while held.
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Default time allowed between two consecutive sequence steps.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_millis(400);

/// Long-hold facet of a binding entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LongHold {
    pub action: Action,
    pub threshold: Duration,
}

/// Double-tap facet of a binding entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleTap {
    pub action: Action,
    pub window: Duration,
}

/// Repeat-while-held facet of a binding entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    pub enabled: bool,
    pub interval: Duration,
}

/// Mapping of one button on one layer.
///
/// The facets are independent and optional; at most one of each exists
/// per button per layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingEntry {
    pub primary: Option<Action>,
    /// The primary action is asserted for as long as the button is held.
    pub hold_style: bool,
    pub long_hold: Option<LongHold>,
    pub double_tap: Option<DoubleTap>,
    pub repeat: Option<Repeat>,
}

impl BindingEntry {
    /// Entry with only a primary action.
    #[must_use]
    pub fn primary(action: Action) -> Self {
        Self {
            primary: Some(action),
            ..Self::default()
        }
    }

    /// Entry whose primary action is held for the physical press duration.
    #[must_use]
    pub fn held(action: Action) -> Self {
        Self {
            primary: Some(action),
            hold_style: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_long_hold(mut self, action: Action, threshold: Duration) -> Self {
        self.long_hold = Some(LongHold { action, threshold });
        self
    }

    #[must_use]
    pub fn with_double_tap(mut self, action: Action, window: Duration) -> Self {
        self.double_tap = Some(DoubleTap { action, window });
        self
    }

    #[must_use]
    pub fn with_repeat(mut self, interval: Duration) -> Self {
        self.repeat = Some(Repeat {
            enabled: true,
            interval,
        });
        self
    }

    /// Primary action, ignoring an explicit [`Action::None`].
    #[must_use]
    pub fn primary_action(&self) -> Option<&Action> {
        self.primary.as_ref().filter(|a| !a.is_none())
    }

    #[must_use]
    pub fn long_hold_action(&self) -> Option<&LongHold> {
        self.long_hold.as_ref().filter(|l| !l.action.is_none())
    }

    #[must_use]
    pub fn double_tap_action(&self) -> Option<&DoubleTap> {
        self.double_tap.as_ref().filter(|d| !d.action.is_none())
    }

    /// Repeat interval, if repeat is enabled with a non-zero interval.
    #[must_use]
    pub fn repeat_interval(&self) -> Option<Duration> {
        self.repeat
            .filter(|r| r.enabled && !r.interval.is_zero())
            .map(|r| r.interval)
    }

    /// True if nothing in this entry can fire.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary_action().is_none()
            && self.long_hold_action().is_none()
            && self.double_tap_action().is_none()
    }
}

/// Exact-set chord.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordMapping {
    buttons: ButtonSet,
    action: Action,
}

impl ChordMapping {
    /// Creates a chord.
    ///
    /// # Errors
    ///
    /// Returns `ChordTooSmall` if fewer than two distinct buttons are given.
    pub fn new<I: IntoIterator<Item = Button>>(buttons: I, action: Action) -> Result<Self> {
        let buttons: ButtonSet = buttons.into_iter().collect();
        if buttons.len() < 2 {
            return Err(ControllerKeysError::ChordTooSmall(buttons.len()));
        }
        Ok(Self { buttons, action })
    }

    #[must_use]
    pub fn buttons(&self) -> ButtonSet {
        self.buttons
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }
}

/// Ordered button sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMapping {
    steps: Vec<Button>,
    step_timeout: Duration,
    action: Action,
}

impl SequenceMapping {
    /// Creates a sequence.
    ///
    /// # Errors
    ///
    /// - `SequenceTooShort` with fewer than two steps
    /// - `InvalidStepTimeout` with a zero timeout
    pub fn new(steps: Vec<Button>, step_timeout: Duration, action: Action) -> Result<Self> {
        if steps.len() < 2 {
            return Err(ControllerKeysError::SequenceTooShort(steps.len()));
        }
        if step_timeout.is_zero() {
            return Err(ControllerKeysError::InvalidStepTimeout);
        }
        Ok(Self {
            steps,
            step_timeout,
            action,
        })
    }

    #[must_use]
    pub fn steps(&self) -> &[Button] {
        &self.steps
    }

    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }
}

/// Discrete motion gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    TiltForward,
    TiltBack,
    SteerLeft,
    SteerRight,
}

impl GestureKind {
    pub const ALL: [GestureKind; 4] = [
        GestureKind::TiltForward,
        GestureKind::TiltBack,
        GestureKind::SteerLeft,
        GestureKind::SteerRight,
    ];

    /// Stable snake_case name, identical to the serialized form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            GestureKind::TiltForward => "tilt_forward",
            GestureKind::TiltBack => "tilt_back",
            GestureKind::SteerLeft => "steer_left",
            GestureKind::SteerRight => "steer_right",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        GestureKind::ALL
            .iter()
            .copied()
            .find(|g| g.name() == s)
            .ok_or_else(|| format!("unknown gesture: {}", s))
    }
}

/// Index of a layer inside its [`BindingTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

/// Where a chord or sequence lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Base,
    Layer(LayerId),
}

/// Alternate bindings active while `activator` is held.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub activator: Button,
    pub buttons: ButtonMap<BindingEntry>,
    chords: Vec<ChordMapping>,
    sequences: Vec<SequenceMapping>,
}

impl Layer {
    #[must_use]
    pub fn new(name: &str, activator: Button) -> Self {
        Self {
            name: name.to_string(),
            activator,
            buttons: ButtonMap::new(),
            chords: Vec::new(),
            sequences: Vec::new(),
        }
    }

    pub fn set_binding(&mut self, button: Button, entry: BindingEntry) {
        self.buttons.insert(button, entry);
    }

    /// Adds a layer-scoped chord.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChord` if the exact button set is already used on
    /// this layer.
    pub fn add_chord(&mut self, chord: ChordMapping) -> Result<()> {
        push_chord(&mut self.chords, chord)
    }

    pub fn add_sequence(&mut self, sequence: SequenceMapping) {
        self.sequences.push(sequence);
    }

    #[must_use]
    pub fn chords(&self) -> &[ChordMapping] {
        &self.chords
    }

    #[must_use]
    pub fn sequences(&self) -> &[SequenceMapping] {
        &self.sequences
    }
}

fn push_chord(chords: &mut Vec<ChordMapping>, chord: ChordMapping) -> Result<()> {
    if chords.iter().any(|c| c.buttons == chord.buttons) {
        return Err(ControllerKeysError::DuplicateChord(chord.buttons.to_string()));
    }
    chords.push(chord);
    Ok(())
}

/// Complete, validated binding configuration for one profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    base: ButtonMap<BindingEntry>,
    layers: Vec<Layer>,
    chords: Vec<ChordMapping>,
    sequences: Vec<SequenceMapping>,
    gestures: BTreeMap<GestureKind, Action>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base-layer entry for a button.
    pub fn set_binding(&mut self, button: Button, entry: BindingEntry) {
        self.base.insert(button, entry);
    }

    /// Adds a base-layer chord.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChord` if the exact button set is already bound.
    pub fn add_chord(&mut self, chord: ChordMapping) -> Result<()> {
        push_chord(&mut self.chords, chord)
    }

    pub fn add_sequence(&mut self, sequence: SequenceMapping) {
        self.sequences.push(sequence);
    }

    /// Adds a layer.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLayerActivator` if another layer already uses the
    /// same activator button.
    pub fn add_layer(&mut self, layer: Layer) -> Result<LayerId> {
        if self.layers.iter().any(|l| l.activator == layer.activator) {
            return Err(ControllerKeysError::DuplicateLayerActivator(layer.activator));
        }
        self.layers.push(layer);
        Ok(LayerId(self.layers.len() - 1))
    }

    pub fn set_gesture(&mut self, kind: GestureKind, action: Action) {
        if action.is_none() {
            self.gestures.remove(&kind);
        } else {
            self.gestures.insert(kind, action);
        }
    }

    /// Resolves the entry for `button`, consulting `layer` first and
    /// falling back to the base layer.
    #[must_use]
    pub fn entry(&self, button: Button, layer: Option<LayerId>) -> Option<&BindingEntry> {
        layer
            .and_then(|id| self.layers.get(id.0))
            .and_then(|l| l.buttons.get(button))
            .or_else(|| self.base.get(button))
    }

    /// Base-layer entry only.
    #[must_use]
    pub fn base_entry(&self, button: Button) -> Option<&BindingEntry> {
        self.base.get(button)
    }

    #[must_use]
    pub fn base(&self) -> &ButtonMap<BindingEntry> {
        &self.base
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id.0)
    }

    /// Layer activated by `button`, if any.
    #[must_use]
    pub fn layer_for_activator(&self, button: Button) -> Option<LayerId> {
        self.layers
            .iter()
            .position(|l| l.activator == button)
            .map(LayerId)
    }

    #[must_use]
    pub fn chords(&self) -> &[ChordMapping] {
        &self.chords
    }

    #[must_use]
    pub fn sequences(&self) -> &[SequenceMapping] {
        &self.sequences
    }

    /// Chords of a scope.
    #[must_use]
    pub fn scoped_chords(&self, scope: Scope) -> &[ChordMapping] {
        match scope {
            Scope::Base => &self.chords,
            Scope::Layer(id) => self.layers.get(id.0).map(|l| l.chords()).unwrap_or(&[]),
        }
    }

    #[must_use]
    pub fn gesture(&self, kind: GestureKind) -> Option<&Action> {
        self.gestures.get(&kind)
    }

    pub fn gestures(&self) -> impl Iterator<Item = (GestureKind, &Action)> + '_ {
        self.gestures.iter().map(|(k, a)| (*k, a))
    }

    /// Every action referenced anywhere in the table.
    pub fn all_actions(&self) -> impl Iterator<Item = &Action> + '_ {
        let entries = self
            .base
            .iter()
            .map(|(_, e)| e)
            .chain(self.layers.iter().flat_map(|l| l.buttons.iter().map(|(_, e)| e)));
        let entry_actions = entries.flat_map(|e| {
            e.primary
                .iter()
                .chain(e.long_hold.iter().map(|l| &l.action))
                .chain(e.double_tap.iter().map(|d| &d.action))
        });
        let chord_actions = self
            .chords
            .iter()
            .chain(self.layers.iter().flat_map(|l| l.chords.iter()))
            .map(ChordMapping::action);
        let sequence_actions = self
            .sequences
            .iter()
            .chain(self.layers.iter().flat_map(|l| l.sequences.iter()))
            .map(SequenceMapping::action);
        entry_actions
            .chain(chord_actions)
            .chain(sequence_actions)
            .chain(self.gestures.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::action::KeyCode;

    // ==================== Authoring Validation Tests ====================

    #[test]
    fn test_chord_requires_two_buttons() {
        let err = ChordMapping::new([Button::A], Action::key(KeyCode::A)).unwrap_err();
        assert!(matches!(err, ControllerKeysError::ChordTooSmall(1)));

        // Duplicates collapse in a set
        let err = ChordMapping::new([Button::A, Button::A], Action::key(KeyCode::A)).unwrap_err();
        assert!(matches!(err, ControllerKeysError::ChordTooSmall(1)));
    }

    #[test]
    fn test_duplicate_chord_rejected() {
        let mut table = BindingTable::new();
        table
            .add_chord(ChordMapping::new([Button::A, Button::B], Action::key(KeyCode::A)).unwrap())
            .unwrap();
        let err = table
            .add_chord(ChordMapping::new([Button::B, Button::A], Action::key(KeyCode::S)).unwrap())
            .unwrap_err();
        assert!(matches!(err, ControllerKeysError::DuplicateChord(_)));
        assert_eq!(table.chords().len(), 1);
    }

    #[test]
    fn test_sequence_validation() {
        let err = SequenceMapping::new(vec![Button::A], DEFAULT_STEP_TIMEOUT, Action::None).unwrap_err();
        assert!(matches!(err, ControllerKeysError::SequenceTooShort(1)));

        let err = SequenceMapping::new(vec![Button::A, Button::B], Duration::ZERO, Action::None)
            .unwrap_err();
        assert!(matches!(err, ControllerKeysError::InvalidStepTimeout));

        let ok = SequenceMapping::new(vec![Button::A, Button::A], DEFAULT_STEP_TIMEOUT, Action::None);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_duplicate_layer_activator_rejected() {
        let mut table = BindingTable::new();
        assert_eq!(table.add_layer(Layer::new("nav", Button::LeftBumper)).unwrap(), LayerId(0));
        let err = table.add_layer(Layer::new("edit", Button::LeftBumper)).unwrap_err();
        assert!(matches!(err, ControllerKeysError::DuplicateLayerActivator(Button::LeftBumper)));
    }

    // ==================== Lookup Tests ====================

    #[test]
    fn test_layer_lookup_falls_back_to_base() {
        let mut table = BindingTable::new();
        table.set_binding(Button::A, BindingEntry::primary(Action::key(KeyCode::A)));
        table.set_binding(Button::B, BindingEntry::primary(Action::key(KeyCode::S)));

        let mut layer = Layer::new("nav", Button::LeftBumper);
        layer.set_binding(Button::A, BindingEntry::primary(Action::key(KeyCode::UP_ARROW)));
        let id = table.add_layer(layer).unwrap();

        assert_eq!(
            table.entry(Button::A, Some(id)).unwrap().primary,
            Some(Action::key(KeyCode::UP_ARROW))
        );
        assert_eq!(
            table.entry(Button::B, Some(id)).unwrap().primary,
            Some(Action::key(KeyCode::S))
        );
        assert_eq!(
            table.entry(Button::A, None).unwrap().primary,
            Some(Action::key(KeyCode::A))
        );
        assert!(table.entry(Button::X, Some(id)).is_none());
        assert_eq!(table.layer_for_activator(Button::LeftBumper), Some(id));
        assert_eq!(table.layer_for_activator(Button::A), None);
    }

    #[test]
    fn test_entry_facets() {
        let entry = BindingEntry::primary(Action::None)
            .with_long_hold(Action::key(KeyCode::A), DEFAULT_LONG_HOLD_THRESHOLD)
            .with_repeat(DEFAULT_REPEAT_INTERVAL);
        assert!(entry.primary_action().is_none());
        assert!(entry.long_hold_action().is_some());
        assert!(entry.double_tap_action().is_none());
        assert_eq!(entry.repeat_interval(), Some(DEFAULT_REPEAT_INTERVAL));
        assert!(!entry.is_empty());
        assert!(BindingEntry::default().is_empty());
    }

    #[test]
    fn test_set_gesture_none_clears() {
        let mut table = BindingTable::new();
        table.set_gesture(GestureKind::TiltBack, Action::key(KeyCode::SPACE));
        assert!(table.gesture(GestureKind::TiltBack).is_some());
        table.set_gesture(GestureKind::TiltBack, Action::None);
        assert!(table.gesture(GestureKind::TiltBack).is_none());
    }

    #[test]
    fn test_all_actions_visits_every_slot() {
        let mut table = BindingTable::new();
        table.set_binding(
            Button::A,
            BindingEntry::primary(Action::key(KeyCode::A))
                .with_double_tap(Action::macro_ref("m"), DEFAULT_DOUBLE_TAP_WINDOW),
        );
        table
            .add_chord(ChordMapping::new([Button::A, Button::B], Action::script("s")).unwrap())
            .unwrap();
        table.set_gesture(GestureKind::SteerLeft, Action::key(KeyCode::LEFT_ARROW));
        assert_eq!(table.all_actions().count(), 4);
    }
}
