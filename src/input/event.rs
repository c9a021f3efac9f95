//! # Input Events
//!
//! Already-normalized input delivered by the controller decoding
//! collaborator. HID parsing happens elsewhere; by the time an event
//! reaches this crate buttons are identified by [`Button`] and analog
//! values are normalized floats.
//!
//! Two shapes exist:
//!
//! - [`RawInput`]: the untimed wire form (newline-delimited JSON on the
//!   decoder boundary).
//! - [`InputEvent`]: a discrete event stamped with a monotonic [`Instant`]
//!   as seen by the engine.
//!
//! Continuous axis values are not events; the latest [`AxisFrame`] is
//! sampled once per frame by the analog translator.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::button::Button;

/// Analog stick position, each axis in -1.0..=1.0 (+y is down).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StickSample {
    pub x: f32,
    pub y: f32,
}

impl StickSample {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance from center.
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// A single touchpad contact, coordinates normalized to 0.0..=1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
}

/// Touchpad state: up to two contacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchpadSample {
    #[serde(default)]
    pub primary: Option<TouchPoint>,
    #[serde(default)]
    pub secondary: Option<TouchPoint>,
}

/// All continuous axes of one controller at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisFrame {
    #[serde(default)]
    pub left_stick: StickSample,
    #[serde(default)]
    pub right_stick: StickSample,
    /// Left trigger travel, 0.0..=1.0.
    #[serde(default)]
    pub left_trigger: f32,
    /// Right trigger travel, 0.0..=1.0.
    #[serde(default)]
    pub right_trigger: f32,
    #[serde(default)]
    pub touchpad: TouchpadSample,
}

/// Two-axis motion signal (gyro/accelerometer fused by the decoder).
///
/// `x` carries left/right rotation, `y` forward/back. Both are roughly
/// -1.0..=1.0 at full deflection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
}

/// Untimed input as delivered over the decoder boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawInput {
    ButtonDown { button: Button },
    ButtonUp { button: Button },
    Axes(AxisFrame),
    Motion(MotionSample),
}

/// Discrete, timestamped event consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    ButtonDown { button: Button, at: Instant },
    ButtonUp { button: Button, at: Instant },
    Motion { sample: MotionSample, at: Instant },
}

impl InputEvent {
    /// Monotonic time the event was observed.
    #[must_use]
    pub fn at(&self) -> Instant {
        match self {
            InputEvent::ButtonDown { at, .. }
            | InputEvent::ButtonUp { at, .. }
            | InputEvent::Motion { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stick_magnitude() {
        assert_eq!(StickSample::default().magnitude(), 0.0);
        assert!((StickSample::new(0.6, 0.8).magnitude() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_raw_input_wire_format() {
        let down: RawInput = serde_json::from_str(r#"{"type":"button_down","button":"a"}"#).unwrap();
        assert_eq!(down, RawInput::ButtonDown { button: Button::A });

        let axes: RawInput =
            serde_json::from_str(r#"{"type":"axes","left_stick":{"x":0.5,"y":-0.25}}"#).unwrap();
        match axes {
            RawInput::Axes(frame) => {
                assert_eq!(frame.left_stick, StickSample::new(0.5, -0.25));
                assert_eq!(frame.right_stick, StickSample::default());
                assert!(frame.touchpad.primary.is_none());
            }
            other => panic!("Expected axes, got {:?}", other),
        }

        let motion: RawInput = serde_json::from_str(r#"{"type":"motion","x":0.1,"y":0.9}"#).unwrap();
        assert_eq!(motion, RawInput::Motion(MotionSample { x: 0.1, y: 0.9 }));
    }

    #[test]
    fn test_event_timestamp() {
        let now = Instant::now();
        let event = InputEvent::ButtonUp { button: Button::B, at: now };
        assert_eq!(event.at(), now);
    }
}
