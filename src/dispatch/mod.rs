//! # Dispatch Module
//!
//! Turns engine output into OS input and side effects.
//!
//! This module handles:
//! - Key and mouse edges for key-press triggers, synthesized inline
//! - Pointer/scroll deltas with sub-unit remainders carried across frames
//! - Handing macros, scripts and system commands to the [`worker`]
//! - Reporting every trigger to telemetry and every failure as a
//!   [`Notification`]
//!
//! Nothing here returns an error to the caller. A failed action is
//! logged, counted and surfaced; the next event is processed normally.
//!
//! ## Phases
//!
//! | Phase | Key press | Other actions |
//! |-------|-----------|---------------|
//! | `Tap` | down + up | run |
//! | `Press` | down | run |
//! | `Release` | up | ignored |

pub mod obs;
pub mod script;
pub mod synth;
pub mod system;
pub mod worker;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::binding::action::{Action, KeyCode, KeyPress, Modifiers, ScriptId};
use crate::binding::macros::MacroLibrary;
use crate::engine::analog::AnalogOutput;
use crate::engine::{Phase, Trigger, TriggerSource};
use crate::error::DispatchError;
use crate::telemetry::{OutputKind, Telemetry};

use script::ScriptContext;
use synth::{emit_key, InputSynthesizer};
use worker::{Job, WorkerHandle};

/// Transient message for the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A dispatched action failed.
    Error { action: String, error: DispatchError },
    /// A script replaced its action hint.
    Hint { script: ScriptId, hint: String },
}

/// Logs, counts and surfaces a failed action.
pub(crate) fn report_failure(
    telemetry: &Telemetry,
    notifications: &mpsc::UnboundedSender<Notification>,
    action: &str,
    error: DispatchError,
) {
    warn!(action, %error, "Action failed");
    telemetry.record_failure();
    let _ = notifications.send(Notification::Error {
        action: action.to_string(),
        error,
    });
}

/// Sums fractional deltas and releases whole units, keeping the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeltaAccumulator {
    x: f32,
    y: f32,
}

impl DeltaAccumulator {
    /// Adds a delta; returns the whole units now available, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use controller_keys::dispatch::DeltaAccumulator;
    ///
    /// let mut acc = DeltaAccumulator::default();
    /// assert_eq!(acc.push(0.6, 0.0), None);
    /// assert_eq!(acc.push(0.6, -1.5), Some((1, -1)));
    /// ```
    pub fn push(&mut self, dx: f32, dy: f32) -> Option<(i32, i32)> {
        if dx.is_finite() {
            self.x += dx;
        }
        if dy.is_finite() {
            self.y += dy;
        }
        let (wx, wy) = (self.x.trunc(), self.y.trunc());
        self.x -= wx;
        self.y -= wy;
        if wx == 0.0 && wy == 0.0 {
            None
        } else {
            Some((wx as i32, wy as i32))
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn distance(dx: i32, dy: i32) -> f64 {
    f64::from(dx).hypot(f64::from(dy))
}

/// Ingestion-side dispatcher. Never blocks and never awaits.
pub struct Dispatcher {
    synth: Arc<dyn InputSynthesizer>,
    worker: WorkerHandle,
    macros: MacroLibrary,
    telemetry: Telemetry,
    notifications: mpsc::UnboundedSender<Notification>,
    pointer: DeltaAccumulator,
    scroll: DeltaAccumulator,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        synth: Arc<dyn InputSynthesizer>,
        worker: WorkerHandle,
        macros: MacroLibrary,
        telemetry: Telemetry,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            synth,
            worker,
            macros,
            telemetry,
            notifications,
            pointer: DeltaAccumulator::default(),
            scroll: DeltaAccumulator::default(),
        }
    }

    /// Replaces the macro library after a profile reload.
    pub fn set_macros(&mut self, macros: MacroLibrary) {
        self.macros = macros;
    }

    fn fail(&self, action: &str, error: DispatchError) {
        report_failure(&self.telemetry, &self.notifications, action, error);
    }

    /// Performs a trigger's action.
    ///
    /// # Arguments
    ///
    /// * `trigger` - Disambiguated trigger from the engine
    /// * `layer_name` - Name of the layer the binding came from, passed
    ///   to scripts
    pub fn dispatch(&mut self, trigger: &Trigger, layer_name: Option<&str>) {
        if trigger.phase != Phase::Release {
            self.telemetry
                .record_trigger(&trigger.source, trigger.press, trigger.layer.is_none());
        }
        debug!(
            source = ?trigger.source,
            press = trigger.press.name(),
            phase = ?trigger.phase,
            action = %trigger.action.label(),
            "Dispatch"
        );

        match &trigger.action {
            Action::None => {}
            Action::KeyPress(press) => self.key_press(press, trigger.phase),
            _ if trigger.phase == Phase::Release => {}
            Action::Macro { id } => {
                let job = match self.macros.get(id) {
                    Some(definition) => Job::Macro {
                        definition: definition.clone(),
                    },
                    None => {
                        self.fail(&trigger.action.label(), DispatchError::UnknownMacro(id.0.clone()));
                        return;
                    }
                };
                self.submit(&trigger.action, job);
            }
            Action::Script { id } => {
                let button = match trigger.source {
                    TriggerSource::Button(b) => Some(b),
                    _ => None,
                };
                let job = Job::Script {
                    id: id.clone(),
                    context: ScriptContext {
                        button,
                        press: trigger.press,
                        layer: layer_name.map(String::from),
                    },
                };
                self.submit(&trigger.action, job);
            }
            Action::System { command } => {
                self.submit(&trigger.action, Job::System { command: command.clone() });
            }
        }
    }

    fn submit(&self, action: &Action, job: Job) {
        if let Err(error) = self.worker.submit(job) {
            self.fail(&action.label(), error);
        }
    }

    fn key_press(&self, press: &KeyPress, phase: Phase) {
        let result = match phase {
            Phase::Tap => {
                emit_key(self.synth.as_ref(), press, true).and_then(|()| emit_key(self.synth.as_ref(), press, false))
            }
            Phase::Press => emit_key(self.synth.as_ref(), press, true),
            Phase::Release => emit_key(self.synth.as_ref(), press, false),
        };
        match result {
            Ok(()) if phase != Phase::Release => {
                let kind = if press.key.mouse_button().is_some() {
                    OutputKind::MouseClick
                } else {
                    OutputKind::KeyPress
                };
                self.telemetry.record_output(kind, 1);
            }
            Ok(()) => {}
            Err(error) => self.fail(&Action::KeyPress(*press).label(), error),
        }
    }

    /// Performs one analog output.
    pub fn dispatch_analog(&mut self, output: AnalogOutput) {
        let result = match output {
            AnalogOutput::Pointer { dx, dy } => match self.pointer.push(dx, dy) {
                Some((x, y)) => self
                    .synth
                    .pointer_motion(x, y)
                    .map(|()| self.telemetry.record_pointer(distance(x, y))),
                None => Ok(()),
            },
            AnalogOutput::Scroll { dx, dy } => match self.scroll.push(dx, dy) {
                Some((x, y)) => self
                    .synth
                    .scroll(x, y)
                    .map(|()| self.telemetry.record_scroll(distance(x, y))),
                None => Ok(()),
            },
            AnalogOutput::Key { key, down } => {
                self.synth.key(key, Modifiers::empty(), down).map(|()| {
                    if down {
                        self.telemetry.record_output(OutputKind::KeyPress, 1);
                    }
                })
            }
            AnalogOutput::Magnify { amount, phase } => self.synth.magnify(amount, phase),
            AnalogOutput::ZoomStep { zoom_in } => {
                let key = if zoom_in { KeyCode::EQUAL } else { KeyCode::MINUS };
                self.key_press(&KeyPress::with_modifiers(key, Modifiers::META), Phase::Tap);
                Ok(())
            }
        };
        if let Err(error) = result {
            self.fail("analog output", error);
        }
    }

    /// Drops carried sub-unit remainders.
    pub fn reset_analog(&mut self) {
        self.pointer.reset();
        self.scroll.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::action::{GesturePhase, MacroId, MouseButton, SystemCommand};
    use crate::binding::macros::{Macro, MacroStep};
    use crate::binding::table::LayerId;
    use crate::engine::PressType;
    use crate::input::button::Button;
    use crate::telemetry::ActionKey;
    use std::time::Instant;
    use synth::mocks::{RecordingSynthesizer, Synthesized};
    use synth::MockInputSynthesizer;

    struct Harness {
        dispatcher: Dispatcher,
        synth: Arc<RecordingSynthesizer>,
        telemetry: Telemetry,
        jobs: mpsc::UnboundedReceiver<Job>,
        notifications: mpsc::UnboundedReceiver<Notification>,
    }

    fn harness_with(synth: RecordingSynthesizer) -> Harness {
        let synth = Arc::new(synth);
        let telemetry = Telemetry::new();
        let (job_tx, jobs) = mpsc::unbounded_channel();
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        let mut macros = MacroLibrary::new();
        macros.insert(Macro {
            id: MacroId("greet".to_string()),
            name: String::new(),
            steps: vec![MacroStep::Delay { duration_ms: 1 }],
        });
        let dispatcher = Dispatcher::new(
            synth.clone(),
            WorkerHandle::new(job_tx),
            macros,
            telemetry.clone(),
            notify_tx,
        );
        Harness {
            dispatcher,
            synth,
            telemetry,
            jobs,
            notifications,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingSynthesizer::default())
    }

    fn trigger(button: Button, action: Action, phase: Phase) -> Trigger {
        Trigger {
            source: TriggerSource::Button(button),
            press: PressType::Single,
            phase,
            action,
            layer: None,
            at: Instant::now(),
        }
    }

    fn key(key: KeyCode, modifiers: Modifiers, down: bool) -> Synthesized {
        Synthesized::Key { key, modifiers, down }
    }

    // ==================== Key Press Tests ====================

    #[test]
    fn test_tap_sends_down_then_up() {
        let mut h = harness();
        let action = Action::key_with(KeyCode::A, Modifiers::CONTROL);
        h.dispatcher.dispatch(&trigger(Button::A, action, Phase::Tap), None);

        assert_eq!(
            h.synth.events(),
            vec![
                key(KeyCode::A, Modifiers::CONTROL, true),
                key(KeyCode::A, Modifiers::CONTROL, false)
            ]
        );
        let stats = h.telemetry.snapshot();
        assert_eq!(stats.output(OutputKind::KeyPress), 1);
        assert_eq!(stats.count(&ActionKey::Primary(Button::A)), 1);
    }

    #[test]
    fn test_hold_style_press_and_release() {
        let mut h = harness();
        let action = Action::key(KeyCode::MOUSE_LEFT);
        h.dispatcher.dispatch(&trigger(Button::RightTrigger, action.clone(), Phase::Press), None);
        h.dispatcher.dispatch(&trigger(Button::RightTrigger, action, Phase::Release), None);

        assert_eq!(
            h.synth.events(),
            vec![
                Synthesized::Mouse { button: MouseButton::Left, down: true },
                Synthesized::Mouse { button: MouseButton::Left, down: false },
            ]
        );
        // The release is not a second trigger
        let stats = h.telemetry.snapshot();
        assert_eq!(stats.count(&ActionKey::Primary(Button::RightTrigger)), 1);
        assert_eq!(stats.output(OutputKind::MouseClick), 1);
    }

    #[test]
    fn test_layered_trigger_not_counted_as_slot() {
        let mut h = harness();
        let mut t = trigger(Button::A, Action::key(KeyCode::A), Phase::Tap);
        t.layer = Some(LayerId(0));
        h.dispatcher.dispatch(&t, Some("nav"));

        let stats = h.telemetry.snapshot();
        assert_eq!(stats.total_actions(), 0);
        assert_eq!(stats.output(OutputKind::KeyPress), 1);
    }

    #[test]
    fn test_synthesis_failure_is_notified_not_raised() {
        let mut h = harness_with(RecordingSynthesizer::failing_after(0));
        h.dispatcher.dispatch(&trigger(Button::A, Action::key(KeyCode::A), Phase::Tap), None);
        h.dispatcher.dispatch(&trigger(Button::B, Action::key(KeyCode::S), Phase::Tap), None);

        let stats = h.telemetry.snapshot();
        assert_eq!(stats.dispatch_failures, 2);
        assert_eq!(stats.output(OutputKind::KeyPress), 0);
        // Failed triggers are still reported
        assert_eq!(stats.total_actions(), 2);
        assert!(matches!(
            h.notifications.try_recv(),
            Ok(Notification::Error { error: DispatchError::Synthesis(_), .. })
        ));
    }

    #[test]
    fn test_mock_synthesizer_sees_tap() {
        let mut mock = MockInputSynthesizer::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_key()
            .withf(|k, _, down| *k == KeyCode::SPACE && *down)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_key()
            .withf(|k, _, down| *k == KeyCode::SPACE && !*down)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        let (job_tx, _jobs) = mpsc::unbounded_channel();
        let (notify_tx, _notes) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(
            Arc::new(mock),
            WorkerHandle::new(job_tx),
            MacroLibrary::new(),
            Telemetry::new(),
            notify_tx,
        );
        dispatcher.dispatch(&trigger(Button::A, Action::key(KeyCode::SPACE), Phase::Tap), None);
    }

    // ==================== Worker Handoff Tests ====================

    #[test]
    fn test_macro_goes_to_worker() {
        let mut h = harness();
        h.dispatcher.dispatch(&trigger(Button::X, Action::macro_ref("greet"), Phase::Tap), None);

        match h.jobs.try_recv() {
            Ok(Job::Macro { definition }) => assert_eq!(definition.id.0, "greet"),
            other => panic!("Expected macro job, got {:?}", other),
        }
        assert!(h.synth.events().is_empty());
    }

    #[test]
    fn test_unknown_macro_fails_locally() {
        let mut h = harness();
        h.dispatcher.dispatch(&trigger(Button::X, Action::macro_ref("missing"), Phase::Tap), None);

        assert!(h.jobs.try_recv().is_err());
        assert_eq!(
            h.notifications.try_recv().ok(),
            Some(Notification::Error {
                action: "macro missing".to_string(),
                error: DispatchError::UnknownMacro("missing".to_string())
            })
        );
    }

    #[test]
    fn test_script_context_carries_trigger() {
        let mut h = harness();
        let mut t = trigger(Button::Y, Action::script("toggle"), Phase::Tap);
        t.press = PressType::LongHold;
        t.layer = Some(LayerId(1));
        h.dispatcher.dispatch(&t, Some("media"));

        assert_eq!(
            h.jobs.try_recv().ok(),
            Some(Job::Script {
                id: ScriptId("toggle".to_string()),
                context: ScriptContext {
                    button: Some(Button::Y),
                    press: PressType::LongHold,
                    layer: Some("media".to_string()),
                },
            })
        );
    }

    #[test]
    fn test_release_of_non_key_action_is_ignored() {
        let mut h = harness();
        let action = Action::system(SystemCommand::Shell { command: "true".into() });
        h.dispatcher.dispatch(&trigger(Button::B, action.clone(), Phase::Press), None);
        h.dispatcher.dispatch(&trigger(Button::B, action, Phase::Release), None);

        assert!(h.jobs.try_recv().is_ok());
        assert!(h.jobs.try_recv().is_err());
    }

    #[test]
    fn test_stopped_worker_is_notified() {
        let mut h = harness();
        h.jobs.close();
        let action = Action::system(SystemCommand::OpenLink { url: "https://example.com".into() });
        h.dispatcher.dispatch(&trigger(Button::B, action, Phase::Tap), None);

        assert!(matches!(
            h.notifications.try_recv(),
            Ok(Notification::Error { error: DispatchError::WorkerGone, .. })
        ));
    }

    // ==================== Analog Tests ====================

    #[test]
    fn test_pointer_remainders_carry() {
        let mut h = harness();
        for _ in 0..3 {
            h.dispatcher.dispatch_analog(AnalogOutput::Pointer { dx: 0.4, dy: -0.4 });
        }
        assert_eq!(h.synth.events(), vec![Synthesized::Pointer { dx: 1, dy: -1 }]);
        assert!((h.telemetry.snapshot().pointer_distance - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_scroll_and_magnify() {
        let mut h = harness();
        h.dispatcher.dispatch_analog(AnalogOutput::Scroll { dx: 0.0, dy: 2.5 });
        h.dispatcher.dispatch_analog(AnalogOutput::Magnify {
            amount: 0.25,
            phase: GesturePhase::Began,
        });
        assert_eq!(
            h.synth.events(),
            vec![
                Synthesized::Scroll { dx: 0, dy: 2 },
                Synthesized::Magnify {
                    amount: 0.25,
                    phase: GesturePhase::Began
                }
            ]
        );
        assert_eq!(h.telemetry.snapshot().scroll_distance, 2.0);
    }

    #[test]
    fn test_zoom_step_uses_shortcut() {
        let mut h = harness();
        h.dispatcher.dispatch_analog(AnalogOutput::ZoomStep { zoom_in: false });
        assert_eq!(
            h.synth.events(),
            vec![
                key(KeyCode::MINUS, Modifiers::META, true),
                key(KeyCode::MINUS, Modifiers::META, false)
            ]
        );
    }

    #[test]
    fn test_analog_key_edges() {
        let mut h = harness();
        h.dispatcher.dispatch_analog(AnalogOutput::Key { key: KeyCode::W, down: true });
        h.dispatcher.dispatch_analog(AnalogOutput::Key { key: KeyCode::W, down: false });
        assert_eq!(
            h.synth.events(),
            vec![
                key(KeyCode::W, Modifiers::empty(), true),
                key(KeyCode::W, Modifiers::empty(), false)
            ]
        );
        assert_eq!(h.telemetry.snapshot().output(OutputKind::KeyPress), 1);
    }

    #[test]
    fn test_reset_analog_drops_remainder() {
        let mut h = harness();
        h.dispatcher.dispatch_analog(AnalogOutput::Pointer { dx: 0.9, dy: 0.0 });
        h.dispatcher.reset_analog();
        h.dispatcher.dispatch_analog(AnalogOutput::Pointer { dx: 0.9, dy: 0.0 });
        assert!(h.synth.events().is_empty());
    }

    #[test]
    fn test_accumulator_ignores_non_finite() {
        let mut acc = DeltaAccumulator::default();
        assert_eq!(acc.push(f32::NAN, 1.0), Some((0, 1)));
        assert_eq!(acc.push(f32::INFINITY, 0.0), None);
    }
}
