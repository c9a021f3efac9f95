//! # Button Identifiers
//!
//! Fixed set of physical controller buttons across the two supported
//! controller families (Xbox-style and DualSense-style), plus typed,
//! fixed-size containers keyed by [`Button`].
//!
//! Face buttons are named by position (`A` is the bottom face button on
//! both families: Xbox A, DualSense Cross).
//!
//! | Button | Xbox | DualSense | Category | Hand |
//! |--------|------|-----------|----------|------|
//! | A / B / X / Y | A B X Y | Cross Circle Square Triangle | Face | Right |
//! | LeftBumper / RightBumper | LB RB | L1 R1 | Bumper | Left / Right |
//! | LeftTrigger / RightTrigger | LT RT | L2 R2 | Trigger | Left / Right |
//! | DpadUp/Down/Left/Right | D-Pad | D-Pad | Dpad | Left |
//! | View / Menu | View Menu | Create Options | Special | Left / Right |
//! | Guide / Share | Xbox Share | PS Mute | Special | Center |
//! | LeftThumbstick / RightThumbstick | LS RS | L3 R3 | Stick | Left / Right |
//! | Touchpad | - | Touchpad click | Touchpad | Center |
//! | Paddle1..Paddle4 | Elite P1-P4 | Edge back buttons | Paddle | Right/Left |
//!
//! Category and hand metadata are used for grouping in the optimizer only;
//! the engine never branches on them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Physical button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    View,
    Menu,
    Guide,
    Share,
    LeftThumbstick,
    RightThumbstick,
    Touchpad,
    Mic,
    Paddle1,
    Paddle2,
    Paddle3,
    Paddle4,
}

/// Button grouping used for display and optimizer heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonCategory {
    Face,
    Bumper,
    Trigger,
    Dpad,
    Special,
    Stick,
    Touchpad,
    Paddle,
}

/// Which hand normally operates a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
    Center,
}

impl Button {
    /// Number of button variants.
    pub const COUNT: usize = 24;

    /// All buttons in declaration order.
    pub const ALL: [Button; Button::COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::LeftTrigger,
        Button::RightTrigger,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
        Button::View,
        Button::Menu,
        Button::Guide,
        Button::Share,
        Button::LeftThumbstick,
        Button::RightThumbstick,
        Button::Touchpad,
        Button::Mic,
        Button::Paddle1,
        Button::Paddle2,
        Button::Paddle3,
        Button::Paddle4,
    ];

    /// Dense index of this button, `0..Button::COUNT`.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case name, identical to the serialized form.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::X => "x",
            Button::Y => "y",
            Button::LeftBumper => "left_bumper",
            Button::RightBumper => "right_bumper",
            Button::LeftTrigger => "left_trigger",
            Button::RightTrigger => "right_trigger",
            Button::DpadUp => "dpad_up",
            Button::DpadDown => "dpad_down",
            Button::DpadLeft => "dpad_left",
            Button::DpadRight => "dpad_right",
            Button::View => "view",
            Button::Menu => "menu",
            Button::Guide => "guide",
            Button::Share => "share",
            Button::LeftThumbstick => "left_thumbstick",
            Button::RightThumbstick => "right_thumbstick",
            Button::Touchpad => "touchpad",
            Button::Mic => "mic",
            Button::Paddle1 => "paddle1",
            Button::Paddle2 => "paddle2",
            Button::Paddle3 => "paddle3",
            Button::Paddle4 => "paddle4",
        }
    }

    #[must_use]
    pub fn category(self) -> ButtonCategory {
        match self {
            Button::A | Button::B | Button::X | Button::Y => ButtonCategory::Face,
            Button::LeftBumper | Button::RightBumper => ButtonCategory::Bumper,
            Button::LeftTrigger | Button::RightTrigger => ButtonCategory::Trigger,
            Button::DpadUp | Button::DpadDown | Button::DpadLeft | Button::DpadRight => {
                ButtonCategory::Dpad
            }
            Button::View | Button::Menu | Button::Guide | Button::Share | Button::Mic => {
                ButtonCategory::Special
            }
            Button::LeftThumbstick | Button::RightThumbstick => ButtonCategory::Stick,
            Button::Touchpad => ButtonCategory::Touchpad,
            Button::Paddle1 | Button::Paddle2 | Button::Paddle3 | Button::Paddle4 => {
                ButtonCategory::Paddle
            }
        }
    }

    #[must_use]
    pub fn hand(self) -> Hand {
        match self {
            Button::LeftBumper
            | Button::LeftTrigger
            | Button::DpadUp
            | Button::DpadDown
            | Button::DpadLeft
            | Button::DpadRight
            | Button::View
            | Button::LeftThumbstick
            | Button::Paddle3
            | Button::Paddle4 => Hand::Left,
            Button::A
            | Button::B
            | Button::X
            | Button::Y
            | Button::RightBumper
            | Button::RightTrigger
            | Button::Menu
            | Button::RightThumbstick
            | Button::Paddle1
            | Button::Paddle2 => Hand::Right,
            Button::Guide | Button::Share | Button::Touchpad | Button::Mic => Hand::Center,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Button::ALL
            .iter()
            .copied()
            .find(|b| b.name() == s)
            .ok_or_else(|| format!("unknown button: {}", s))
    }
}

/// Fixed-size map from [`Button`] to `T`.
///
/// Backed by an array indexed by [`Button::index`]; no hashing and no
/// string keys in engine code.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonMap<T> {
    slots: [Option<T>; Button::COUNT],
}

impl<T> Default for ButtonMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ButtonMap<T> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    #[inline]
    pub fn get(&self, button: Button) -> Option<&T> {
        self.slots[button.index()].as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, button: Button) -> Option<&mut T> {
        self.slots[button.index()].as_mut()
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, button: Button, value: T) -> Option<T> {
        self.slots[button.index()].replace(value)
    }

    pub fn remove(&mut self, button: Button) -> Option<T> {
        self.slots[button.index()].take()
    }

    #[must_use]
    pub fn contains(&self, button: Button) -> bool {
        self.slots[button.index()].is_some()
    }

    /// Iterates populated entries in button declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Button, &T)> + '_ {
        Button::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(b, slot)| slot.as_ref().map(|v| (*b, v)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl<T: Default> ButtonMap<T> {
    /// Returns a mutable reference, inserting `T::default()` if absent.
    pub fn entry_or_default(&mut self, button: Button) -> &mut T {
        self.slots[button.index()].get_or_insert_with(T::default)
    }
}

impl<T> FromIterator<(Button, T)> for ButtonMap<T> {
    fn from_iter<I: IntoIterator<Item = (Button, T)>>(iter: I) -> Self {
        let mut map = ButtonMap::new();
        for (button, value) in iter {
            map.insert(button, value);
        }
        map
    }
}

/// Unordered set of buttons stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ButtonSet(u32);

impl ButtonSet {
    /// The empty set.
    pub const EMPTY: ButtonSet = ButtonSet(0);

    #[must_use]
    pub fn new() -> Self {
        Self::EMPTY
    }

    #[inline]
    fn bit(button: Button) -> u32 {
        1 << button.index()
    }

    /// Adds a button, returning `true` if it was not already present.
    pub fn insert(&mut self, button: Button) -> bool {
        let had = self.contains(button);
        self.0 |= Self::bit(button);
        !had
    }

    /// Removes a button, returning `true` if it was present.
    pub fn remove(&mut self, button: Button) -> bool {
        let had = self.contains(button);
        self.0 &= !Self::bit(button);
        had
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, button: Button) -> bool {
        self.0 & Self::bit(button) != 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn is_disjoint(&self, other: &ButtonSet) -> bool {
        self.0 & other.0 == 0
    }

    #[must_use]
    pub fn union(&self, other: &ButtonSet) -> ButtonSet {
        ButtonSet(self.0 | other.0)
    }

    /// Returns this set without `button`.
    #[must_use]
    pub fn without(&self, button: Button) -> ButtonSet {
        ButtonSet(self.0 & !Self::bit(button))
    }

    /// Iterates members in button declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL.iter().copied().filter(|b| self.contains(*b))
    }
}

impl FromIterator<Button> for ButtonSet {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut set = ButtonSet::new();
        for button in iter {
            set.insert(button);
        }
        set
    }
}

impl Serialize for ButtonSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ButtonSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Vec::<Button>::deserialize(deserializer)?.into_iter().collect())
    }
}

impl fmt::Display for ButtonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Button::name).collect();
        f.write_str(&names.join("+"))
    }
}
