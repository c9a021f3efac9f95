//! Usage counters and their persisted JSON shape.
//!
//! Counters only ever grow. Keys are typed in memory and stringified
//! only by serde at the persistence boundary.

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::binding::table::GestureKind;
use crate::engine::{PressType, TriggerSource};
use crate::input::button::{Button, ButtonSet};

/// Press-type bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Single,
    DoubleTap,
    LongHold,
    Chord,
    Sequence,
    Gesture,
}

impl ActionType {
    /// Bucket for a trigger's press type. Repeat ticks are not counted.
    #[must_use]
    pub fn from_press(press: PressType) -> Option<Self> {
        match press {
            PressType::Single => Some(ActionType::Single),
            PressType::DoubleTap => Some(ActionType::DoubleTap),
            PressType::LongHold => Some(ActionType::LongHold),
            PressType::Chord => Some(ActionType::Chord),
            PressType::Sequence => Some(ActionType::Sequence),
            PressType::Gesture => Some(ActionType::Gesture),
            PressType::Repeat => None,
        }
    }
}

/// Output bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    KeyPress,
    MouseClick,
    Macro,
    /// Individual macro steps executed.
    MacroStep,
    Webhook,
    AppLaunch,
    Command,
    Link,
    Script,
    ObsCall,
}

/// A logical binding slot, the unit the optimizer reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKey {
    Primary(Button),
    LongHold(Button),
    DoubleTap(Button),
    Chord(ButtonSet),
    Sequence(Vec<Button>),
    Gesture(GestureKind),
}

impl ActionKey {
    /// Slot a trigger came from. Repeat ticks map to nothing.
    #[must_use]
    pub fn from_trigger(source: &TriggerSource, press: PressType) -> Option<Self> {
        match (source, press) {
            (TriggerSource::Button(b), PressType::Single) => Some(ActionKey::Primary(*b)),
            (TriggerSource::Button(b), PressType::LongHold) => Some(ActionKey::LongHold(*b)),
            (TriggerSource::Button(b), PressType::DoubleTap) => Some(ActionKey::DoubleTap(*b)),
            (TriggerSource::Chord(set), _) => Some(ActionKey::Chord(*set)),
            (TriggerSource::Sequence(steps), _) => Some(ActionKey::Sequence(steps.clone())),
            (TriggerSource::Gesture(kind), _) => Some(ActionKey::Gesture(*kind)),
            _ => None,
        }
    }

    /// Buttons whose slots this key occupies.
    #[must_use]
    pub fn buttons(&self) -> ButtonSet {
        match self {
            ActionKey::Primary(b) | ActionKey::LongHold(b) | ActionKey::DoubleTap(b) => {
                [*b].into_iter().collect()
            }
            ActionKey::Chord(set) => *set,
            ActionKey::Sequence(steps) => steps.iter().copied().collect(),
            ActionKey::Gesture(_) => ButtonSet::EMPTY,
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKey::Primary(b) => write!(f, "primary:{}", b),
            ActionKey::LongHold(b) => write!(f, "long_hold:{}", b),
            ActionKey::DoubleTap(b) => write!(f, "double_tap:{}", b),
            ActionKey::Chord(set) => write!(f, "chord:{}", set),
            ActionKey::Sequence(steps) => {
                let names: Vec<&str> = steps.iter().map(|b| b.name()).collect();
                write!(f, "sequence:{}", names.join(">"))
            }
            ActionKey::Gesture(kind) => write!(f, "gesture:{}", kind),
        }
    }
}

impl FromStr for ActionKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed action key: {}", s))?;
        match kind {
            "primary" => Ok(ActionKey::Primary(rest.parse()?)),
            "long_hold" => Ok(ActionKey::LongHold(rest.parse()?)),
            "double_tap" => Ok(ActionKey::DoubleTap(rest.parse()?)),
            "chord" => Ok(ActionKey::Chord(
                rest.split('+').map(Button::from_str).collect::<Result<ButtonSet, _>>()?,
            )),
            "sequence" => Ok(ActionKey::Sequence(
                rest.split('>').map(Button::from_str).collect::<Result<Vec<_>, _>>()?,
            )),
            "gesture" => Ok(ActionKey::Gesture(rest.parse()?)),
            other => Err(format!("unknown action key kind: {}", other)),
        }
    }
}

impl Serialize for ActionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Session bracketing and day streaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    pub count: u64,
    pub total_seconds: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active: Option<NaiveDate>,
}

impl SessionStats {
    /// Registers a session starting on local calendar day `date`.
    pub fn begin(&mut self, date: NaiveDate) {
        self.count += 1;
        match self.last_active {
            Some(last) if date <= last => return,
            Some(last) if last.succ_opt() == Some(date) => self.current_streak += 1,
            _ => self.current_streak = 1,
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_active = Some(date);
    }
}

/// Every counter the aggregator keeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub button_presses: BTreeMap<Button, u64>,
    pub action_types: BTreeMap<ActionType, u64>,
    pub action_keys: BTreeMap<ActionKey, u64>,
    pub outputs: BTreeMap<OutputKind, u64>,
    pub pointer_distance: f64,
    pub scroll_distance: f64,
    pub dispatch_failures: u64,
    pub sessions: SessionStats,
}

impl UsageStats {
    /// Observed count for a binding slot.
    #[must_use]
    pub fn count(&self, key: &ActionKey) -> u64 {
        self.action_keys.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn presses(&self, button: Button) -> u64 {
        self.button_presses.get(&button).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn output(&self, kind: OutputKind) -> u64 {
        self.outputs.get(&kind).copied().unwrap_or(0)
    }

    /// Sum of all per-slot counts.
    #[must_use]
    pub fn total_actions(&self) -> u64 {
        self.action_keys.values().sum()
    }
}
