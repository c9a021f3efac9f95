//! # Runtime
//!
//! Wires one loaded profile to the dispatcher. Every collaborator is
//! passed in explicitly; nothing here is global.
//!
//! The runtime owns the latest [`AxisFrame`]: axis samples only update it,
//! and [`Runtime::frame`] translates it once per frame tick.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dispatch::synth::InputSynthesizer;
use crate::dispatch::worker::WorkerHandle;
use crate::dispatch::{Dispatcher, Notification};
use crate::engine::{Engine, EngineOutput};
use crate::input::event::{AxisFrame, InputEvent, RawInput};
use crate::profile::ProfileParts;
use crate::telemetry::Telemetry;

/// Engine plus dispatcher for the active profile.
pub struct Runtime {
    profile: String,
    enabled: bool,
    engine: Engine,
    dispatcher: Dispatcher,
    telemetry: Telemetry,
    axes: AxisFrame,
}

impl Runtime {
    #[must_use]
    pub fn new(
        parts: ProfileParts,
        synth: Arc<dyn InputSynthesizer>,
        worker: WorkerHandle,
        telemetry: Telemetry,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let ProfileParts {
            name,
            enabled,
            table,
            analog,
            gestures,
            macros,
        } = parts;
        let dispatcher = Dispatcher::new(synth, worker, macros, telemetry.clone(), notifications);
        Self {
            profile: name,
            enabled,
            engine: Engine::new(table, analog, gestures),
            dispatcher,
            telemetry,
            axes: AxisFrame::default(),
        }
    }

    #[must_use]
    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Opens a telemetry session.
    pub fn start(&mut self, now: Instant) {
        info!("Profile '{}' active", self.profile);
        self.telemetry.start_session(now);
    }

    /// Swaps in another profile, releasing everything the old one held.
    pub fn load_profile(&mut self, parts: ProfileParts, now: Instant) {
        self.release_all(now);
        info!("Switching profile '{}' -> '{}'", self.profile, parts.name);
        self.profile = parts.name;
        self.enabled = parts.enabled;
        self.engine = Engine::new(parts.table, parts.analog, parts.gestures);
        self.dispatcher.set_macros(parts.macros);
        self.axes = AxisFrame::default();
    }

    /// Feeds one decoded input. A disabled profile ignores everything.
    pub fn handle_raw(&mut self, input: RawInput, now: Instant) {
        if !self.enabled {
            return;
        }
        let outputs = match input {
            RawInput::ButtonDown { button } => {
                if !self.engine.held().contains(button) {
                    self.telemetry.record_button_press(button);
                }
                self.engine.handle(InputEvent::ButtonDown { button, at: now })
            }
            RawInput::ButtonUp { button } => self.engine.handle(InputEvent::ButtonUp { button, at: now }),
            RawInput::Axes(frame) => {
                self.axes = frame;
                return;
            }
            RawInput::Motion(sample) => self.engine.handle(InputEvent::Motion { sample, at: now }),
        };
        self.route(outputs);
    }

    /// Frame tick: due timers, then analog translation.
    pub fn frame(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        let outputs = self.engine.frame(&self.axes, now);
        self.route(outputs);
    }

    /// Releases everything and closes the telemetry session.
    pub fn shutdown(&mut self, now: Instant) {
        self.release_all(now);
        self.telemetry.end_session(now);
        debug!("Runtime for '{}' shut down", self.profile);
    }

    fn release_all(&mut self, now: Instant) {
        let outputs = self.engine.reset(now);
        self.route(outputs);
        self.dispatcher.reset_analog();
    }

    fn route(&mut self, outputs: Vec<EngineOutput>) {
        for output in outputs {
            match output {
                EngineOutput::Trigger(trigger) => {
                    let layer = trigger
                        .layer
                        .and_then(|id| self.engine.table().layer(id))
                        .map(|l| l.name.as_str());
                    self.dispatcher.dispatch(&trigger, layer);
                }
                EngineOutput::Analog(output) => self.dispatcher.dispatch_analog(output),
            }
        }
    }
}
