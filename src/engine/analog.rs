//! # Analog Translator
//!
//! Converts stick and touchpad samples into pointer, scroll, key and zoom
//! output once per frame.
//!
//! ## Response curve
//!
//! For pointer and scroll modes the stick magnitude goes through:
//!
//! 1. Deadzone: magnitude at or below the deadzone radius yields zero.
//! 2. Remap: the remaining range is scaled back to `0..=1` so output
//!    starts from zero at the deadzone edge.
//! 3. Acceleration: `output = multiplier * remapped^exponent` with
//!    `exponent = 1 + acceleration * k`.
//!
//! The multiplier comes from the sensitivity dial through an exponential
//! curve, `low * (high / low)^sensitivity`, so sensitivity 0 gives `low`
//! and 1 gives `high`. `low`, `high` and `k` are per-mode
//! [`CurveConstants`].
//!
//! ## Usage
//!
//! ```
//! use controller_keys::engine::analog::{ResponseCurve, MOUSE_CURVE};
//!
//! let curve = ResponseCurve::new(0.1, 0.5, 0.0, MOUSE_CURVE);
//! assert_eq!(curve.apply(0.05), 0.0);
//! assert!(curve.apply(1.0) > curve.apply(0.5));
//! ```

use serde::{Deserialize, Serialize};

use crate::binding::action::{GesturePhase, KeyCode};
use crate::input::button::Button;
use crate::input::event::{AxisFrame, StickSample, TouchPoint, TouchpadSample};

/// Per-mode calibration of the response curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveConstants {
    /// Multiplier at sensitivity 0.
    pub low: f32,
    /// Multiplier at sensitivity 1.
    pub high: f32,
    /// Acceleration scale: `exponent = 1 + acceleration * k`.
    pub accel_k: f32,
}

/// Stick as pointer, pixels per frame at full deflection.
pub const MOUSE_CURVE: CurveConstants = CurveConstants {
    low: 2.0,
    high: 30.0,
    accel_k: 2.0,
};

/// Stick as scroll wheel, scroll units per frame at full deflection.
pub const SCROLL_CURVE: CurveConstants = CurveConstants {
    low: 1.0,
    high: 15.0,
    accel_k: 1.0,
};

/// Touchpad as pointer, pixels per full pad width.
pub const TOUCHPAD_CURVE: CurveConstants = CurveConstants {
    low: 200.0,
    high: 3000.0,
    accel_k: 1.0,
};

/// Touchpad two-finger pan, scroll units per full pad width.
pub const TOUCHPAD_SCROLL_CURVE: CurveConstants = CurveConstants {
    low: 100.0,
    high: 1500.0,
    accel_k: 0.0,
};

/// Multiplier range of the focus (precision) dial.
pub const FOCUS_RANGE: (f32, f32) = (0.5, 8.0);

/// Touchpad travel per frame treated as "normal speed" for acceleration.
const TOUCH_REFERENCE_SPEED: f32 = 0.02;

/// Minimum change of finger distance per frame to count as zoom.
const ZOOM_MIN_DELTA: f32 = 0.002;

/// Accumulated finger-distance change per zoom shortcut press.
const ZOOM_KEY_STEP: f32 = 0.05;

/// Maps a 0..1 sensitivity dial to a multiplier in `low..=high`.
#[must_use]
pub fn sensitivity_multiplier(sensitivity: f32, low: f32, high: f32) -> f32 {
    let s = if sensitivity.is_finite() {
        sensitivity.clamp(0.0, 1.0)
    } else {
        0.5
    };
    low * (high / low).powf(s)
}

/// Deadzone, remap and acceleration for one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCurve {
    deadzone: f32,
    exponent: f32,
    multiplier: f32,
}

impl ResponseCurve {
    /// Builds a curve from dial values.
    ///
    /// # Arguments
    ///
    /// * `deadzone` - Deadzone radius (0.0 to 0.5). Values outside are clamped.
    /// * `sensitivity` - Sensitivity dial (0.0 to 1.0)
    /// * `acceleration` - Acceleration dial (0.0 to 1.0)
    /// * `constants` - Per-mode calibration
    #[must_use]
    pub fn new(deadzone: f32, sensitivity: f32, acceleration: f32, constants: CurveConstants) -> Self {
        Self {
            deadzone: deadzone.clamp(0.0, 0.5),
            exponent: 1.0 + acceleration.clamp(0.0, 1.0) * constants.accel_k,
            multiplier: sensitivity_multiplier(sensitivity, constants.low, constants.high),
        }
    }

    /// Same curve with a substituted multiplier (focus mode).
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn deadzone(&self) -> f32 {
        self.deadzone
    }

    #[must_use]
    pub fn exponent(&self) -> f32 {
        self.exponent
    }

    #[must_use]
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Shapes a non-negative magnitude.
    ///
    /// # Returns
    ///
    /// Zero at or below the deadzone, otherwise a value that grows
    /// monotonically up to `multiplier` at full deflection.
    #[must_use]
    pub fn apply(&self, magnitude: f32) -> f32 {
        if magnitude.is_nan() || magnitude <= self.deadzone {
            return 0.0;
        }
        let remapped = ((magnitude - self.deadzone) / (1.0 - self.deadzone)).min(1.0);
        self.multiplier * remapped.powf(self.exponent)
    }
}

/// What a stick drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickMode {
    #[default]
    None,
    Mouse,
    Scroll,
    Wasd,
    Arrows,
}

/// What one-finger touchpad motion drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchpadMode {
    None,
    #[default]
    Mouse,
    Scroll,
}

/// How a two-finger zoom is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomMode {
    /// Synthesized magnify gesture.
    #[default]
    Magnify,
    /// Cmd+= / Cmd+- key presses.
    KeyShortcut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickSettings {
    pub mode: StickMode,
    pub sensitivity: f32,
    pub acceleration: f32,
    pub deadzone: f32,
    pub invert_x: bool,
    pub invert_y: bool,
}

impl Default for StickSettings {
    fn default() -> Self {
        Self {
            mode: StickMode::None,
            sensitivity: 0.5,
            acceleration: 0.5,
            deadzone: 0.15,
            invert_x: false,
            invert_y: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchpadSettings {
    pub mode: TouchpadMode,
    pub sensitivity: f32,
    pub acceleration: f32,
    pub invert_y: bool,
    /// Zoom wins over pan when the finger-distance change exceeds this
    /// multiple of the centroid movement.
    pub pan_zoom_ratio: f32,
    pub zoom: ZoomMode,
}

impl Default for TouchpadSettings {
    fn default() -> Self {
        Self {
            mode: TouchpadMode::Mouse,
            sensitivity: 0.5,
            acceleration: 0.3,
            invert_y: false,
            pan_zoom_ratio: 1.5,
            zoom: ZoomMode::Magnify,
        }
    }
}

/// Precision modifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusSettings {
    pub button: Option<Button>,
    pub sensitivity: f32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            button: None,
            sensitivity: 0.2,
        }
    }
}

/// All analog translation settings of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSettings {
    pub left_stick: StickSettings,
    pub right_stick: StickSettings,
    pub touchpad: TouchpadSettings,
    pub focus: FocusSettings,
    /// Deflection needed to press a WASD / arrow key.
    pub key_threshold: f32,
}

impl Default for AnalogSettings {
    fn default() -> Self {
        Self {
            left_stick: StickSettings {
                mode: StickMode::Mouse,
                ..StickSettings::default()
            },
            right_stick: StickSettings {
                mode: StickMode::Scroll,
                ..StickSettings::default()
            },
            touchpad: TouchpadSettings::default(),
            focus: FocusSettings::default(),
            key_threshold: 0.5,
        }
    }
}

/// Per-frame analog output. Deltas are fractional; the dispatcher
/// accumulates them into whole device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalogOutput {
    Pointer { dx: f32, dy: f32 },
    /// Positive `dy` scrolls toward content further down.
    Scroll { dx: f32, dy: f32 },
    Key { key: KeyCode, down: bool },
    /// Positive amount zooms in. One two-finger contact yields one
    /// `Began`, any number of `Changed` and a zero-amount `Ended`.
    Magnify { amount: f32, phase: GesturePhase },
    ZoomStep { zoom_in: bool },
}

/// Direction keys in up, down, left, right order.
const WASD_KEYS: [KeyCode; 4] = [KeyCode::W, KeyCode::S, KeyCode::A, KeyCode::D];
const ARROW_KEYS: [KeyCode; 4] = [
    KeyCode::UP_ARROW,
    KeyCode::DOWN_ARROW,
    KeyCode::LEFT_ARROW,
    KeyCode::RIGHT_ARROW,
];

#[derive(Debug, Clone, Copy, Default)]
struct DirectionKeys {
    held: [Option<KeyCode>; 4],
}

impl DirectionKeys {
    fn update(&mut self, wanted: [bool; 4], keys: [KeyCode; 4], out: &mut Vec<AnalogOutput>) {
        for i in 0..4 {
            match (self.held[i], wanted[i]) {
                (Some(key), false) => {
                    out.push(AnalogOutput::Key { key, down: false });
                    self.held[i] = None;
                }
                (Some(key), true) if key != keys[i] => {
                    out.push(AnalogOutput::Key { key, down: false });
                    out.push(AnalogOutput::Key { key: keys[i], down: true });
                    self.held[i] = Some(keys[i]);
                }
                (None, true) => {
                    out.push(AnalogOutput::Key { key: keys[i], down: true });
                    self.held[i] = Some(keys[i]);
                }
                _ => {}
            }
        }
    }

    fn release(&mut self, out: &mut Vec<AnalogOutput>) {
        self.update([false; 4], WASD_KEYS, out);
    }
}

fn distance(a: TouchPoint, b: TouchPoint) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn midpoint(a: TouchPoint, b: TouchPoint) -> TouchPoint {
    TouchPoint {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
    }
}

/// Frame-to-frame analog state.
#[derive(Debug, Clone)]
pub struct AnalogTranslator {
    settings: AnalogSettings,
    keys: [DirectionKeys; 2],
    last_touch: Option<TouchPoint>,
    last_pair: Option<(f32, TouchPoint)>,
    zoom_accum: f32,
    magnifying: bool,
}

impl AnalogTranslator {
    #[must_use]
    pub fn new(settings: AnalogSettings) -> Self {
        Self {
            settings,
            keys: [DirectionKeys::default(); 2],
            last_touch: None,
            last_pair: None,
            zoom_accum: 0.0,
            magnifying: false,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AnalogSettings {
        &self.settings
    }

    /// Translates one frame.
    ///
    /// `focus_held` substitutes the focus multiplier for pointer output.
    pub fn translate(&mut self, axes: &AxisFrame, focus_held: bool) -> Vec<AnalogOutput> {
        let mut out = Vec::new();
        let sticks = [
            (self.settings.left_stick, axes.left_stick),
            (self.settings.right_stick, axes.right_stick),
        ];
        for (i, (settings, sample)) in sticks.into_iter().enumerate() {
            self.translate_stick(i, &settings, sample, focus_held, &mut out);
        }
        self.translate_touchpad(&axes.touchpad, focus_held, &mut out);
        out
    }

    /// Releases every direction key still held and forgets touch state.
    pub fn release_all(&mut self) -> Vec<AnalogOutput> {
        let mut out = Vec::new();
        for keys in &mut self.keys {
            keys.release(&mut out);
        }
        self.last_touch = None;
        self.last_pair = None;
        self.zoom_accum = 0.0;
        self.end_magnify(&mut out);
        out
    }

    /// Pointer or scroll delta for one stick sample.
    #[must_use]
    pub fn stick_delta(&self, settings: &StickSettings, sample: StickSample, focus_held: bool) -> (f32, f32) {
        let constants = match settings.mode {
            StickMode::Mouse => MOUSE_CURVE,
            StickMode::Scroll => SCROLL_CURVE,
            _ => return (0.0, 0.0),
        };
        let mut curve = ResponseCurve::new(settings.deadzone, settings.sensitivity, settings.acceleration, constants);
        if focus_held && settings.mode == StickMode::Mouse {
            curve = curve.with_multiplier(self.focus_multiplier());
        }

        let magnitude = sample.magnitude();
        let shaped = curve.apply(magnitude);
        if shaped == 0.0 {
            return (0.0, 0.0);
        }
        let sx = if settings.invert_x { -1.0 } else { 1.0 };
        let sy = if settings.invert_y { -1.0 } else { 1.0 };
        (
            sx * shaped * sample.x / magnitude,
            sy * shaped * sample.y / magnitude,
        )
    }

    fn focus_multiplier(&self) -> f32 {
        sensitivity_multiplier(self.settings.focus.sensitivity, FOCUS_RANGE.0, FOCUS_RANGE.1)
    }

    fn translate_stick(
        &mut self,
        index: usize,
        settings: &StickSettings,
        sample: StickSample,
        focus_held: bool,
        out: &mut Vec<AnalogOutput>,
    ) {
        match settings.mode {
            StickMode::None => self.keys[index].release(out),
            StickMode::Mouse | StickMode::Scroll => {
                self.keys[index].release(out);
                let (dx, dy) = self.stick_delta(settings, sample, focus_held);
                if dx != 0.0 || dy != 0.0 {
                    out.push(if settings.mode == StickMode::Mouse {
                        AnalogOutput::Pointer { dx, dy }
                    } else {
                        AnalogOutput::Scroll { dx, dy }
                    });
                }
            }
            StickMode::Wasd | StickMode::Arrows => {
                let keys = if settings.mode == StickMode::Wasd {
                    WASD_KEYS
                } else {
                    ARROW_KEYS
                };
                let t = self.settings.key_threshold.max(settings.deadzone);
                let y = if settings.invert_y { -sample.y } else { sample.y };
                let x = if settings.invert_x { -sample.x } else { sample.x };
                self.keys[index].update([y < -t, y > t, x < -t, x > t], keys, out);
            }
        }
    }

    fn translate_touchpad(&mut self, pad: &TouchpadSample, focus_held: bool, out: &mut Vec<AnalogOutput>) {
        let settings = self.settings.touchpad;
        if settings.mode == TouchpadMode::None {
            self.last_touch = None;
            self.last_pair = None;
            self.end_magnify(out);
            return;
        }

        match (pad.primary, pad.secondary) {
            (Some(a), Some(b)) => {
                self.last_touch = None;
                let spread = distance(a, b);
                let center = midpoint(a, b);
                if let Some((last_spread, last_center)) = self.last_pair {
                    let spread_delta = spread - last_spread;
                    let pan = distance(center, last_center);
                    if spread_delta.abs() > settings.pan_zoom_ratio * pan && spread_delta.abs() > ZOOM_MIN_DELTA {
                        self.zoom(spread_delta, settings.zoom, out);
                    } else if pan > 0.0 {
                        let m = sensitivity_multiplier(
                            settings.sensitivity,
                            TOUCHPAD_SCROLL_CURVE.low,
                            TOUCHPAD_SCROLL_CURVE.high,
                        );
                        let sy = if settings.invert_y { -1.0 } else { 1.0 };
                        out.push(AnalogOutput::Scroll {
                            dx: (center.x - last_center.x) * m,
                            dy: sy * (center.y - last_center.y) * m,
                        });
                    }
                }
                self.last_pair = Some((spread, center));
            }
            (Some(p), None) => {
                self.last_pair = None;
                self.zoom_accum = 0.0;
                self.end_magnify(out);
                if let Some(last) = self.last_touch {
                    let (dx, dy) = (p.x - last.x, p.y - last.y);
                    let travel = (dx * dx + dy * dy).sqrt();
                    if travel > 0.0 {
                        let curve = ResponseCurve::new(0.0, settings.sensitivity, settings.acceleration, TOUCHPAD_CURVE);
                        let gain = if focus_held && settings.mode == TouchpadMode::Mouse {
                            self.focus_multiplier() / MOUSE_CURVE.high * curve.multiplier()
                        } else {
                            curve.multiplier()
                        };
                        let speed = travel / TOUCH_REFERENCE_SPEED;
                        let scale = gain * speed.powf(curve.exponent() - 1.0);
                        let sy = if settings.invert_y { -1.0 } else { 1.0 };
                        let (dx, dy) = (dx * scale, sy * dy * scale);
                        out.push(match settings.mode {
                            TouchpadMode::Scroll => AnalogOutput::Scroll { dx, dy },
                            _ => AnalogOutput::Pointer { dx, dy },
                        });
                    }
                }
                self.last_touch = Some(p);
            }
            _ => {
                self.last_touch = None;
                self.last_pair = None;
                self.zoom_accum = 0.0;
                self.end_magnify(out);
            }
        }
    }

    fn zoom(&mut self, spread_delta: f32, mode: ZoomMode, out: &mut Vec<AnalogOutput>) {
        match mode {
            ZoomMode::Magnify => {
                let phase = if self.magnifying {
                    GesturePhase::Changed
                } else {
                    GesturePhase::Began
                };
                self.magnifying = true;
                out.push(AnalogOutput::Magnify {
                    amount: spread_delta,
                    phase,
                });
            }
            ZoomMode::KeyShortcut => {
                self.zoom_accum += spread_delta;
                while self.zoom_accum >= ZOOM_KEY_STEP {
                    self.zoom_accum -= ZOOM_KEY_STEP;
                    out.push(AnalogOutput::ZoomStep { zoom_in: true });
                }
                while self.zoom_accum <= -ZOOM_KEY_STEP {
                    self.zoom_accum += ZOOM_KEY_STEP;
                    out.push(AnalogOutput::ZoomStep { zoom_in: false });
                }
            }
        }
    }
}

impl AnalogTranslator {
    /// Closes an open magnify gesture.
    fn end_magnify(&mut self, out: &mut Vec<AnalogOutput>) {
        if self.magnifying {
            self.magnifying = false;
            out.push(AnalogOutput::Magnify {
                amount: 0.0,
                phase: GesturePhase::Ended,
            });
        }
    }
}
