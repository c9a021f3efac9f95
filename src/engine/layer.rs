//! # Layer Resolver
//!
//! Tracks which layer activators are held and picks the active layer.
//! When several activators are held the most recently pressed one wins
//! (LIFO); releasing it falls back to the next most recent still held.

use crate::binding::table::LayerId;
use crate::input::button::Button;

/// Stack of held layer activators.
#[derive(Debug, Clone, Default)]
pub struct LayerResolver {
    held: Vec<(Button, LayerId)>,
}

impl LayerResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an activator press. A repeated press of an already held
    /// activator moves it to the top.
    pub fn press(&mut self, activator: Button, layer: LayerId) {
        self.held.retain(|(b, _)| *b != activator);
        self.held.push((activator, layer));
    }

    /// Records an activator release. Returns `false` if `activator` was
    /// not held.
    pub fn release(&mut self, activator: Button) -> bool {
        let before = self.held.len();
        self.held.retain(|(b, _)| *b != activator);
        self.held.len() != before
    }

    /// Currently active layer, or `None` for the base layer.
    #[must_use]
    pub fn active(&self) -> Option<LayerId> {
        self.held.last().map(|(_, id)| *id)
    }

    #[must_use]
    pub fn is_held(&self, activator: Button) -> bool {
        self.held.iter().any(|(b, _)| *b == activator)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}
