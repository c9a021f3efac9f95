//! # OS Input Synthesis Boundary
//!
//! [`InputSynthesizer`] is the capability the dispatcher calls into to
//! produce real keyboard and mouse events. Platform backends live outside
//! this crate; [`LoggingSynthesizer`] is the built-in backend that traces
//! every event instead of injecting it.
//!
//! Implementations must be callable from both the ingestion thread and
//! the worker tasks, hence `Send + Sync`.

use tracing::debug;

use crate::binding::action::{GesturePhase, KeyCode, KeyPress, Modifiers, MouseButton};
use crate::error::DispatchError;

/// Result type of a synthesis call.
pub type SynthResult = std::result::Result<(), DispatchError>;

/// OS-level input synthesis.
#[cfg_attr(test, mockall::automock)]
pub trait InputSynthesizer: Send + Sync {
    /// Key down or up with modifiers held.
    fn key(&self, key: KeyCode, modifiers: Modifiers, down: bool) -> SynthResult;

    /// Mouse button down or up.
    fn mouse_button(&self, button: MouseButton, down: bool) -> SynthResult;

    /// Relative pointer motion in pixels.
    fn pointer_motion(&self, dx: i32, dy: i32) -> SynthResult;

    /// Scroll in device units.
    fn scroll(&self, dx: i32, dy: i32) -> SynthResult;

    /// Magnify gesture event; positive zooms in.
    fn magnify(&self, amount: f32, phase: GesturePhase) -> SynthResult;

    /// Types a single character.
    fn type_char(&self, c: char) -> SynthResult;
}

/// Sends one key edge, routing the reserved mouse range to mouse buttons.
///
/// # Errors
///
/// Propagates the backend's refusal.
pub fn emit_key(synth: &dyn InputSynthesizer, press: &KeyPress, down: bool) -> SynthResult {
    match press.key.mouse_button() {
        Some(button) => synth.mouse_button(button, down),
        None => synth.key(press.key, press.modifiers, down),
    }
}

/// Backend that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSynthesizer;

impl InputSynthesizer for LoggingSynthesizer {
    fn key(&self, key: KeyCode, modifiers: Modifiers, down: bool) -> SynthResult {
        debug!(key = key.0, ?modifiers, down, "synth key");
        Ok(())
    }

    fn mouse_button(&self, button: MouseButton, down: bool) -> SynthResult {
        debug!(?button, down, "synth mouse button");
        Ok(())
    }

    fn pointer_motion(&self, dx: i32, dy: i32) -> SynthResult {
        debug!(dx, dy, "synth pointer");
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> SynthResult {
        debug!(dx, dy, "synth scroll");
        Ok(())
    }

    fn magnify(&self, amount: f32, phase: GesturePhase) -> SynthResult {
        debug!(amount, ?phase, "synth magnify");
        Ok(())
    }

    fn type_char(&self, c: char) -> SynthResult {
        debug!(%c, "synth type");
        Ok(())
    }
}
