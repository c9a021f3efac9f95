//! # Actions
//!
//! The closed set of things a binding slot can do. Every triggerable slot
//! (primary, long-hold, double-tap, chord, sequence, gesture) holds exactly
//! one [`Action`]; dispatch matches on the variant.
//!
//! Actions are immutable values. Editing a binding means building a new
//! `Action` and replacing the old one.
//!
//! ## Key codes
//!
//! [`KeyCode`] carries a platform virtual key code (macOS `kVK_*`
//! numbering). Mouse buttons live in a reserved range starting at
//! `0xF000` so a key-press action can also represent a click.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    /// Keyboard modifier flags held while a key is synthesized.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const META = 1 << 3;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers::empty()
    }
}

/// Mouse buttons addressable through the reserved key code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

/// Phase of a continuous gesture such as magnify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GesturePhase {
    Began,
    Changed,
    Ended,
}

/// Virtual key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const A: KeyCode = KeyCode(0x00);
    pub const S: KeyCode = KeyCode(0x01);
    pub const D: KeyCode = KeyCode(0x02);
    pub const W: KeyCode = KeyCode(0x0D);
    pub const EQUAL: KeyCode = KeyCode(0x18);
    pub const MINUS: KeyCode = KeyCode(0x1B);
    pub const RETURN: KeyCode = KeyCode(0x24);
    pub const TAB: KeyCode = KeyCode(0x30);
    pub const SPACE: KeyCode = KeyCode(0x31);
    pub const ESCAPE: KeyCode = KeyCode(0x35);
    pub const LEFT_ARROW: KeyCode = KeyCode(0x7B);
    pub const RIGHT_ARROW: KeyCode = KeyCode(0x7C);
    pub const DOWN_ARROW: KeyCode = KeyCode(0x7D);
    pub const UP_ARROW: KeyCode = KeyCode(0x7E);

    pub const MOUSE_LEFT: KeyCode = KeyCode(0xF000);
    pub const MOUSE_RIGHT: KeyCode = KeyCode(0xF001);
    pub const MOUSE_MIDDLE: KeyCode = KeyCode(0xF002);
    pub const MOUSE_BACK: KeyCode = KeyCode(0xF003);
    pub const MOUSE_FORWARD: KeyCode = KeyCode(0xF004);

    /// Returns the mouse button this code stands for, if any.
    #[must_use]
    pub fn mouse_button(self) -> Option<MouseButton> {
        match self {
            KeyCode::MOUSE_LEFT => Some(MouseButton::Left),
            KeyCode::MOUSE_RIGHT => Some(MouseButton::Right),
            KeyCode::MOUSE_MIDDLE => Some(MouseButton::Middle),
            KeyCode::MOUSE_BACK => Some(MouseButton::Back),
            KeyCode::MOUSE_FORWARD => Some(MouseButton::Forward),
            _ => None,
        }
    }
}

/// A single key (or mouse button) with modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: KeyCode,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyPress {
    #[must_use]
    pub fn new(key: KeyCode) -> Self {
        Self {
            key,
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub fn with_modifiers(key: KeyCode, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

/// Identifier of a macro in the profile's macro library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroId(pub String);

/// Identifier of a user script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub String);

impl fmt::Display for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP verbs supported by the webhook action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Delete,
    Patch,
}

/// Actions that leave the input domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemCommand {
    /// Launch an application by path or name.
    LaunchApp {
        target: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Run a shell command line.
    Shell { command: String },
    /// Open a URL with the system handler.
    OpenLink { url: String },
    /// Fire an HTTP request (webhook).
    HttpRequest {
        #[serde(default)]
        method: HttpMethod,
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
    /// Send a single request over the OBS websocket.
    Obs {
        request_type: String,
        #[serde(default)]
        request_data: Option<serde_json::Value>,
    },
}

/// Everything a binding slot can trigger.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    KeyPress(KeyPress),
    Macro { id: MacroId },
    Script { id: ScriptId },
    System { command: SystemCommand },
}

impl Action {
    /// Shorthand for a plain key press.
    #[must_use]
    pub fn key(key: KeyCode) -> Self {
        Action::KeyPress(KeyPress::new(key))
    }

    /// Shorthand for a key press with modifiers.
    #[must_use]
    pub fn key_with(key: KeyCode, modifiers: Modifiers) -> Self {
        Action::KeyPress(KeyPress::with_modifiers(key, modifiers))
    }

    #[must_use]
    pub fn macro_ref(id: &str) -> Self {
        Action::Macro {
            id: MacroId(id.to_string()),
        }
    }

    #[must_use]
    pub fn script(id: &str) -> Self {
        Action::Script {
            id: ScriptId(id.to_string()),
        }
    }

    #[must_use]
    pub fn system(command: SystemCommand) -> Self {
        Action::System { command }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }

    /// Short human-readable description used in logs and hints.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Action::None => "none".to_string(),
            Action::KeyPress(press) => match press.key.mouse_button() {
                Some(button) => format!("mouse {:?}", button).to_lowercase(),
                None if press.modifiers.is_empty() => format!("key 0x{:02X}", press.key.0),
                None => format!("key 0x{:02X} {:?}", press.key.0, press.modifiers),
            },
            Action::Macro { id } => format!("macro {}", id),
            Action::Script { id } => format!("script {}", id),
            Action::System { command } => command.label(),
        }
    }
}

impl SystemCommand {
    /// Short description used in logs and notifications.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            SystemCommand::LaunchApp { target, .. } => format!("launch {}", target),
            SystemCommand::Shell { command } => format!("shell `{}`", command),
            SystemCommand::OpenLink { url } => format!("open {}", url),
            SystemCommand::HttpRequest { method, url, .. } => format!("{:?} {}", method, url),
            SystemCommand::Obs { request_type, .. } => format!("obs {}", request_type),
        }
    }
}
