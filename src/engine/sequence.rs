//! # Sequence Detector
//!
//! Independent progress per configured sequence: the index of the next
//! expected step and the time of the last matched step.
//!
//! A press that arrives more than `step_timeout` after the previous step,
//! or that does not match the expected step, resets progress. The same
//! press may then seed step 0 if it matches the first step. Only the
//! press that completes a sequence is reported as a hit; the others are
//! left to single-button handling.
//!
//! Sequences of inactive layers do not observe presses, and their
//! progress is dropped whenever the active layer changes.

use std::time::Instant;

use crate::binding::action::Action;
use crate::binding::table::{BindingTable, LayerId, Scope, SequenceMapping};
use crate::input::button::Button;

/// A sequence that just completed.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceHit {
    pub scope: Scope,
    /// Index of the sequence within its scope.
    pub index: usize,
    pub steps: Vec<Button>,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    index: usize,
    last: Option<Instant>,
}

impl Progress {
    fn reset(&mut self) {
        *self = Progress::default();
    }

    /// Feeds one press. Returns `true` when the sequence completes.
    fn step(&mut self, sequence: &SequenceMapping, button: Button, now: Instant) -> bool {
        let steps = sequence.steps();

        if let Some(last) = self.last {
            if now.saturating_duration_since(last) > sequence.step_timeout() {
                self.reset();
            }
        }

        if steps.get(self.index) == Some(&button) {
            self.index += 1;
            self.last = Some(now);
        } else {
            self.reset();
            if steps.first() == Some(&button) {
                self.index = 1;
                self.last = Some(now);
            }
        }

        if self.index == steps.len() {
            self.reset();
            true
        } else {
            false
        }
    }
}

/// Progress for every base and layer sequence of one table.
#[derive(Debug, Clone, Default)]
pub struct SequenceDetector {
    base: Vec<Progress>,
    layers: Vec<Vec<Progress>>,
    scope: Option<LayerId>,
}

impl SequenceDetector {
    /// Creates a detector sized for `table`.
    #[must_use]
    pub fn new(table: &BindingTable) -> Self {
        Self {
            base: vec![Progress::default(); table.sequences().len()],
            layers: table
                .layers()
                .iter()
                .map(|l| vec![Progress::default(); l.sequences().len()])
                .collect(),
            scope: None,
        }
    }

    /// Feeds a press and returns the sequence it completes, if any.
    ///
    /// Layer sequences are consulted first. When several sequences
    /// complete on the same press the first one in declaration order wins
    /// and the rest keep their (reset) state.
    pub fn press(
        &mut self,
        button: Button,
        layer: Option<LayerId>,
        now: Instant,
        table: &BindingTable,
    ) -> Option<SequenceHit> {
        if layer != self.scope {
            if let Some(old) = self.scope.and_then(|id| self.layers.get_mut(id.0)) {
                old.iter_mut().for_each(Progress::reset);
            }
            self.scope = layer;
        }

        let mut hit = None;

        if let Some(id) = layer {
            if let (Some(progress), Some(def)) = (self.layers.get_mut(id.0), table.layer(id)) {
                for (index, (p, seq)) in progress.iter_mut().zip(def.sequences()).enumerate() {
                    if p.step(seq, button, now) && hit.is_none() {
                        hit = Some(SequenceHit {
                            scope: Scope::Layer(id),
                            index,
                            steps: seq.steps().to_vec(),
                            action: seq.action().clone(),
                        });
                    }
                }
            }
        }

        for (index, (p, seq)) in self.base.iter_mut().zip(table.sequences()).enumerate() {
            if p.step(seq, button, now) && hit.is_none() {
                hit = Some(SequenceHit {
                    scope: Scope::Base,
                    index,
                    steps: seq.steps().to_vec(),
                    action: seq.action().clone(),
                });
            }
        }

        hit
    }

    /// Drops all progress.
    pub fn clear(&mut self) {
        self.base.iter_mut().for_each(Progress::reset);
        self.layers.iter_mut().flatten().for_each(Progress::reset);
        self.scope = None;
    }
}
