//! # Gesture Classifier
//!
//! Turns the continuous two-axis motion signal into discrete gesture
//! pulses. Tilt is read from `y` (positive = forward) and steer from `x`
//! (positive = right).
//!
//! Each gesture is armed until its signal reaches the trigger threshold.
//! Firing disarms it; it re-arms once the signal drops below the re-arm
//! threshold. An optional cooldown additionally spaces out pulses of the
//! same gesture.

use std::time::{Duration, Instant};

use crate::binding::table::GestureKind;
use crate::input::event::MotionSample;

/// Default trigger threshold.
pub const DEFAULT_TRIGGER_THRESHOLD: f32 = 0.6;

/// Default re-arm threshold.
pub const DEFAULT_REARM_THRESHOLD: f32 = 0.3;

/// Default minimum spacing between two pulses of one gesture.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(250);

/// Classifier tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSettings {
    pub enabled: bool,
    /// Tilt magnitude that fires a tilt gesture (0.1..=1.0).
    pub tilt_threshold: f32,
    /// Steer magnitude that fires a steer gesture (0.1..=1.0).
    pub steer_threshold: f32,
    /// Signal magnitude below which a fired gesture re-arms. Always
    /// below the trigger thresholds.
    pub rearm_threshold: f32,
    pub cooldown: Duration,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tilt_threshold: DEFAULT_TRIGGER_THRESHOLD,
            steer_threshold: DEFAULT_TRIGGER_THRESHOLD,
            rearm_threshold: DEFAULT_REARM_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl GestureSettings {
    fn threshold(&self, kind: GestureKind) -> f32 {
        match kind {
            GestureKind::TiltForward | GestureKind::TiltBack => self.tilt_threshold,
            GestureKind::SteerLeft | GestureKind::SteerRight => self.steer_threshold,
        }
    }
}

/// Signed component of `sample` that drives `kind`.
fn signal(kind: GestureKind, sample: MotionSample) -> f32 {
    match kind {
        GestureKind::TiltForward => sample.y,
        GestureKind::TiltBack => -sample.y,
        GestureKind::SteerRight => sample.x,
        GestureKind::SteerLeft => -sample.x,
    }
}

#[derive(Debug, Clone, Copy)]
struct GestureState {
    armed: bool,
    last_fired: Option<Instant>,
}

impl Default for GestureState {
    fn default() -> Self {
        Self {
            armed: true,
            last_fired: None,
        }
    }
}

/// Hysteresis classifier for the four motion gestures.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    settings: GestureSettings,
    states: [GestureState; 4],
}

impl GestureClassifier {
    #[must_use]
    pub fn new(settings: GestureSettings) -> Self {
        Self {
            settings,
            states: [GestureState::default(); 4],
        }
    }

    #[must_use]
    pub fn settings(&self) -> &GestureSettings {
        &self.settings
    }

    /// Feeds one motion sample and returns the gestures it fires.
    pub fn classify(&mut self, sample: MotionSample, now: Instant) -> Vec<GestureKind> {
        if !self.settings.enabled {
            return Vec::new();
        }

        let mut fired = Vec::new();
        for (kind, state) in GestureKind::ALL.iter().zip(self.states.iter_mut()) {
            let value = signal(*kind, sample);
            if state.armed {
                let cooled = state
                    .last_fired
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.settings.cooldown);
                if value >= self.settings.threshold(*kind) && cooled {
                    state.armed = false;
                    state.last_fired = Some(now);
                    fired.push(*kind);
                }
            } else if value < self.settings.rearm_threshold {
                state.armed = true;
            }
        }
        fired
    }

    /// Re-arms every gesture.
    pub fn reset(&mut self) {
        self.states = [GestureState::default(); 4];
    }
}
