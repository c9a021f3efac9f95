//! # Macros
//!
//! A macro is an ordered list of steps executed by the action worker.
//! The engine only ever references a macro by [`MacroId`]; steps are run
//! sequentially in the worker context (see `dispatch::worker`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::action::{KeyPress, MacroId};

/// Default typing cadence for [`MacroStep::TypeText`].
pub const DEFAULT_CHARS_PER_SECOND: f64 = 30.0;

/// Allowed typing cadence range.
pub const CHARS_PER_SECOND_RANGE: (f64, f64) = (1.0, 1000.0);

/// One step of a macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MacroStep {
    /// Press and release a key.
    Press(KeyPress),
    /// Hold a key down for a fixed duration, then release it.
    Hold {
        #[serde(flatten)]
        key: KeyPress,
        duration_ms: u64,
    },
    /// Wait.
    Delay { duration_ms: u64 },
    /// Type literal text one character at a time.
    TypeText {
        text: String,
        #[serde(default = "default_chars_per_second")]
        chars_per_second: f64,
    },
}

fn default_chars_per_second() -> f64 {
    DEFAULT_CHARS_PER_SECOND
}

impl MacroStep {
    /// Replaces an unusable typing cadence with the default.
    #[must_use]
    pub fn sanitized(self) -> Self {
        match self {
            MacroStep::TypeText { text, chars_per_second } => {
                let cps = if chars_per_second.is_finite() && chars_per_second > 0.0 {
                    chars_per_second.clamp(CHARS_PER_SECOND_RANGE.0, CHARS_PER_SECOND_RANGE.1)
                } else {
                    DEFAULT_CHARS_PER_SECOND
                };
                MacroStep::TypeText {
                    text,
                    chars_per_second: cps,
                }
            }
            other => other,
        }
    }

    /// Delay between typed characters for a `TypeText` step.
    #[must_use]
    pub fn char_interval(chars_per_second: f64) -> Duration {
        Duration::from_secs_f64(1.0 / chars_per_second.max(CHARS_PER_SECOND_RANGE.0))
    }
}

/// A named macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub id: MacroId,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<MacroStep>,
}

/// All macros of a profile, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroLibrary {
    macros: BTreeMap<MacroId, Macro>,
}

impl MacroLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a macro.
    pub fn insert(&mut self, mut m: Macro) {
        m.steps = m.steps.into_iter().map(MacroStep::sanitized).collect();
        self.macros.insert(m.id.clone(), m);
    }

    #[must_use]
    pub fn get(&self, id: &MacroId) -> Option<&Macro> {
        self.macros.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &MacroId) -> bool {
        self.macros.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Macro> + '_ {
        self.macros.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::action::KeyCode;

    #[test]
    fn test_step_json_shapes() {
        let json = r#"[
            {"step": "press", "key": 0},
            {"step": "hold", "key": 1, "duration_ms": 250},
            {"step": "delay", "duration_ms": 100},
            {"step": "type_text", "text": "hi"}
        ]"#;
        let steps: Vec<MacroStep> = serde_json::from_str(json).unwrap();
        assert_eq!(steps[0], MacroStep::Press(KeyPress::new(KeyCode::A)));
        assert_eq!(
            steps[1],
            MacroStep::Hold {
                key: KeyPress::new(KeyCode::S),
                duration_ms: 250
            }
        );
        assert_eq!(steps[2], MacroStep::Delay { duration_ms: 100 });
        assert_eq!(
            steps[3],
            MacroStep::TypeText {
                text: "hi".to_string(),
                chars_per_second: DEFAULT_CHARS_PER_SECOND
            }
        );
    }

    #[test]
    fn test_type_text_cadence_sanitized() {
        let step = MacroStep::TypeText {
            text: "x".to_string(),
            chars_per_second: f64::NAN,
        };
        match step.sanitized() {
            MacroStep::TypeText { chars_per_second, .. } => {
                assert_eq!(chars_per_second, DEFAULT_CHARS_PER_SECOND)
            }
            other => panic!("unexpected step {:?}", other),
        }

        let step = MacroStep::TypeText {
            text: "x".to_string(),
            chars_per_second: 5000.0,
        };
        match step.sanitized() {
            MacroStep::TypeText { chars_per_second, .. } => assert_eq!(chars_per_second, 1000.0),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_char_interval() {
        assert_eq!(MacroStep::char_interval(10.0), Duration::from_millis(100));
    }

    #[test]
    fn test_library_insert_and_lookup() {
        let mut library = MacroLibrary::new();
        library.insert(Macro {
            id: MacroId("greet".to_string()),
            name: "Greeting".to_string(),
            steps: vec![MacroStep::Delay { duration_ms: 5 }],
        });
        assert_eq!(library.len(), 1);
        assert!(library.contains(&MacroId("greet".to_string())));
        assert!(library.get(&MacroId("other".to_string())).is_none());
    }
}
