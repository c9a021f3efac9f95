//! # Chord Detector
//!
//! Keeps the live set of held buttons and matches it, on every press,
//! against exact-set chords. Subset containment never matches: holding
//! `A+B+X` does not fire an `A+B` chord.
//!
//! Layer activators are owned by the layer resolver and never enter the
//! live set, so a layer chord is written without its activator.

use crate::binding::action::Action;
use crate::binding::table::{BindingTable, LayerId, Scope};
use crate::input::button::{Button, ButtonSet};

/// A chord that just formed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordHit {
    pub buttons: ButtonSet,
    pub action: Action,
    pub scope: Scope,
}

/// Live-set tracking and exact-set matching.
#[derive(Debug, Clone, Default)]
pub struct ChordDetector {
    live: ButtonSet,
    fired: Vec<ButtonSet>,
}

impl ChordDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buttons currently down (activators excluded).
    #[must_use]
    pub fn live(&self) -> ButtonSet {
        self.live
    }

    /// Adds `button` to the live set and returns the chord it completes.
    ///
    /// The active layer's chords are checked before the base chords.
    pub fn press(&mut self, button: Button, layer: Option<LayerId>, table: &BindingTable) -> Option<ChordHit> {
        self.live.insert(button);
        if self.live.len() < 2 || self.fired.contains(&self.live) {
            return None;
        }

        let scopes = layer.map(Scope::Layer).into_iter().chain([Scope::Base]);
        for scope in scopes {
            if let Some(chord) = table.scoped_chords(scope).iter().find(|c| c.buttons() == self.live) {
                self.fired.push(self.live);
                return Some(ChordHit {
                    buttons: self.live,
                    action: chord.action().clone(),
                    scope,
                });
            }
        }
        None
    }

    /// Removes `button` from the live set, clearing any fired chord that
    /// contained it.
    pub fn release(&mut self, button: Button) -> bool {
        self.fired.retain(|set| !set.contains(button));
        self.live.remove(button)
    }

    pub fn clear(&mut self) {
        self.live = ButtonSet::EMPTY;
        self.fired.clear();
    }
}
