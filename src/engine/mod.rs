//! # Engine Module
//!
//! Single-timeline ingestion of controller input. Every call takes the
//! event's monotonic timestamp; the engine never reads the clock, so the
//! same event script always produces the same outputs.
//!
//! This module handles:
//! - Advancing per-button timers in deadline order before each event
//! - Routing presses through layers, chords, sequences and trackers
//! - Motion gestures and per-frame analog translation
//!
//! ## Precedence on a button press
//!
//! 1. Layer activators (and the focus button) are consumed as modifiers.
//! 2. A chord completed by the press claims every member button.
//! 3. A sequence completed by the press claims that press.
//! 4. Otherwise the button's tracker handles it on the active layer.
//!
//! A press that breaks a sequence is not consumed; it still reaches its
//! tracker and may start the sequence over.
//!
//! ## Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use controller_keys::binding::action::{Action, KeyCode};
//! use controller_keys::binding::table::{BindingEntry, BindingTable};
//! use controller_keys::engine::analog::AnalogSettings;
//! use controller_keys::engine::gesture::GestureSettings;
//! use controller_keys::engine::{Engine, EngineOutput};
//! use controller_keys::input::button::Button;
//! use controller_keys::input::event::InputEvent;
//!
//! let mut table = BindingTable::new();
//! table.set_binding(Button::A, BindingEntry::primary(Action::key(KeyCode::RETURN)));
//! let mut engine = Engine::new(table, AnalogSettings::default(), GestureSettings::default());
//!
//! let t0 = Instant::now();
//! engine.handle(InputEvent::ButtonDown { button: Button::A, at: t0 });
//! let out = engine.handle(InputEvent::ButtonUp { button: Button::A, at: t0 + Duration::from_millis(40) });
//! assert!(matches!(&out[..], [EngineOutput::Trigger(t)] if t.action == Action::key(KeyCode::RETURN)));
//! ```

pub mod analog;
pub mod chord;
pub mod gesture;
pub mod layer;
pub mod sequence;
pub mod tracker;

use std::time::Instant;
use tracing::debug;

use crate::binding::action::Action;
use crate::binding::table::{BindingTable, GestureKind, LayerId, Scope};
use crate::input::button::{Button, ButtonSet};
use crate::input::event::{AxisFrame, InputEvent, MotionSample};

use analog::{AnalogOutput, AnalogSettings, AnalogTranslator};
use chord::ChordDetector;
use gesture::{GestureClassifier, GestureSettings};
use layer::LayerResolver;
use sequence::SequenceDetector;
use tracker::{ButtonTracker, Emission};

pub use tracker::{Phase, PressType};

/// What produced a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    Button(Button),
    Chord(ButtonSet),
    Sequence(Vec<Button>),
    Gesture(GestureKind),
}

/// A fully disambiguated intent, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub source: TriggerSource,
    pub press: PressType,
    pub phase: Phase,
    pub action: Action,
    /// Layer the binding was found on; `None` for the base layer.
    pub layer: Option<LayerId>,
    pub at: Instant,
}

/// Engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    Trigger(Trigger),
    Analog(AnalogOutput),
}

fn scope_layer(scope: Scope) -> Option<LayerId> {
    match scope {
        Scope::Base => None,
        Scope::Layer(id) => Some(id),
    }
}

fn button_trigger(button: Button, emission: Emission) -> EngineOutput {
    EngineOutput::Trigger(Trigger {
        source: TriggerSource::Button(button),
        press: emission.press,
        phase: emission.phase,
        action: emission.action,
        layer: emission.layer,
        at: emission.at,
    })
}

/// The input disambiguation engine for one profile.
#[derive(Debug)]
pub struct Engine {
    table: BindingTable,
    trackers: [ButtonTracker; Button::COUNT],
    held: ButtonSet,
    chords: ChordDetector,
    sequences: SequenceDetector,
    layers: LayerResolver,
    gestures: GestureClassifier,
    analog: AnalogTranslator,
}

impl Engine {
    #[must_use]
    pub fn new(table: BindingTable, analog: AnalogSettings, gestures: GestureSettings) -> Self {
        Self {
            sequences: SequenceDetector::new(&table),
            table,
            trackers: std::array::from_fn(|_| ButtonTracker::new()),
            held: ButtonSet::EMPTY,
            chords: ChordDetector::new(),
            layers: LayerResolver::new(),
            gestures: GestureClassifier::new(gestures),
            analog: AnalogTranslator::new(analog),
        }
    }

    #[must_use]
    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Layer currently selected by held activators.
    #[must_use]
    pub fn active_layer(&self) -> Option<LayerId> {
        self.layers.active()
    }

    /// Every button physically down, modifiers included.
    #[must_use]
    pub fn held(&self) -> ButtonSet {
        self.held
    }

    /// Processes one discrete event.
    pub fn handle(&mut self, event: InputEvent) -> Vec<EngineOutput> {
        match event {
            InputEvent::ButtonDown { button, at } => self.button_down(button, at),
            InputEvent::ButtonUp { button, at } => self.button_up(button, at),
            InputEvent::Motion { sample, at } => self.motion(sample, at),
        }
    }

    /// Fires every timer due at or before `now`, earliest first.
    pub fn advance(&mut self, now: Instant) -> Vec<EngineOutput> {
        let mut out = Vec::new();
        loop {
            let due = Button::ALL
                .iter()
                .filter_map(|b| self.trackers[b.index()].next_deadline().map(|d| (d, *b)))
                .filter(|(d, _)| *d <= now)
                .min_by_key(|(d, _)| *d);
            let Some((deadline, button)) = due else {
                break;
            };
            out.extend(
                self.trackers[button.index()]
                    .fire_due(deadline)
                    .into_iter()
                    .map(|e| button_trigger(button, e)),
            );
        }
        out
    }

    /// Runs one analog frame after firing due timers.
    pub fn frame(&mut self, axes: &AxisFrame, now: Instant) -> Vec<EngineOutput> {
        let mut out = self.advance(now);
        let focus_held = self
            .analog
            .settings()
            .focus
            .button
            .is_some_and(|b| self.held.contains(b));
        out.extend(
            self.analog
                .translate(axes, focus_held)
                .into_iter()
                .map(EngineOutput::Analog),
        );
        out
    }

    /// Drops all transient state, releasing anything still asserted.
    pub fn reset(&mut self, now: Instant) -> Vec<EngineOutput> {
        let mut out = Vec::new();
        for button in Button::ALL {
            out.extend(
                self.trackers[button.index()]
                    .reset(now)
                    .into_iter()
                    .map(|e| button_trigger(button, e)),
            );
        }
        out.extend(self.analog.release_all().into_iter().map(EngineOutput::Analog));
        self.held = ButtonSet::EMPTY;
        self.chords.clear();
        self.sequences.clear();
        self.layers.clear();
        self.gestures.reset();
        out
    }

    fn is_focus(&self, button: Button) -> bool {
        self.analog.settings().focus.button == Some(button)
    }

    /// Routes a press in precedence order: layer or focus, chord, sequence, tracker.
    ///
    /// Earlier chord members reach their trackers before the chord completes,
    /// so a hold-style or repeating member has already sent its primary on
    /// key-down; the claim only releases it and stops further repeats.
    fn button_down(&mut self, button: Button, at: Instant) -> Vec<EngineOutput> {
        let mut out = self.advance(at);
        if !self.held.insert(button) {
            return out;
        }

        if let Some(id) = self.table.layer_for_activator(button) {
            debug!("Layer {} activated by {}", id.0, button);
            self.layers.press(button, id);
            return out;
        }
        if self.is_focus(button) {
            return out;
        }

        let layer = self.layers.active();

        if let Some(hit) = self.chords.press(button, layer, &self.table) {
            debug!("Chord {} matched", hit.buttons);
            for member in hit.buttons.iter() {
                out.extend(
                    self.trackers[member.index()]
                        .claim(at)
                        .into_iter()
                        .map(|e| button_trigger(member, e)),
                );
            }
            out.push(EngineOutput::Trigger(Trigger {
                source: TriggerSource::Chord(hit.buttons),
                press: PressType::Chord,
                phase: Phase::Tap,
                action: hit.action,
                layer: scope_layer(hit.scope),
                at,
            }));
            return out;
        }

        if let Some(hit) = self.sequences.press(button, layer, at, &self.table) {
            debug!("Sequence {:?} completed", hit.steps);
            out.extend(
                self.trackers[button.index()]
                    .claim(at)
                    .into_iter()
                    .map(|e| button_trigger(button, e)),
            );
            out.push(EngineOutput::Trigger(Trigger {
                source: TriggerSource::Sequence(hit.steps),
                press: PressType::Sequence,
                phase: Phase::Tap,
                action: hit.action,
                layer: scope_layer(hit.scope),
                at,
            }));
            return out;
        }

        let entry = self.table.entry(button, layer);
        out.extend(
            self.trackers[button.index()]
                .on_down(entry, layer, at)
                .into_iter()
                .map(|e| button_trigger(button, e)),
        );
        out
    }

    fn button_up(&mut self, button: Button, at: Instant) -> Vec<EngineOutput> {
        let mut out = self.advance(at);
        if !self.held.remove(button) {
            return out;
        }
        if self.layers.release(button) {
            debug!("Layer activator {} released", button);
            return out;
        }
        if self.is_focus(button) {
            return out;
        }

        self.chords.release(button);
        out.extend(
            self.trackers[button.index()]
                .on_up(at)
                .into_iter()
                .map(|e| button_trigger(button, e)),
        );
        out
    }

    fn motion(&mut self, sample: MotionSample, at: Instant) -> Vec<EngineOutput> {
        let mut out = self.advance(at);
        for kind in self.gestures.classify(sample, at) {
            if let Some(action) = self.table.gesture(kind) {
                out.push(EngineOutput::Trigger(Trigger {
                    source: TriggerSource::Gesture(kind),
                    press: PressType::Gesture,
                    phase: Phase::Tap,
                    action: action.clone(),
                    layer: None,
                    at,
                }));
            }
        }
        out
    }
}
