//! Recommendation generation.
//!
//! Three kinds of candidates are produced from the analyzed entries:
//!
//! - **Swap**: a frequent action in an expensive slot trades places with
//!   a rarer action in a cheaper one.
//!   Priority `(p_hi - p_lo) * (c_hi - c_lo)`.
//! - **Promote**: a used long-hold or double-tap action moves to a fresh
//!   cross-hand chord. Priority `p * (c - chord cost)`.
//! - **Demote**: a rarely used primary moves to its button's free
//!   long-hold slot, freeing the press for the costliest frequent action.
//!   Priority `p_b * (c_b - 1) - p_d * 3`.
//!
//! Candidates are then accepted greedily by descending priority, skipping
//! any whose buttons overlap an accepted one. A recommendation's buttons
//! cover every action it relocates, so no action moves twice.

use serde::Serialize;

use super::{slot_buttons, ActionEntry, SlotKind};
use crate::binding::table::BindingTable;
use crate::input::button::{Button, ButtonSet, Hand};
use crate::telemetry::{ActionKey, UsageStats};

/// Primaries used less often than this are demotion candidates.
pub const DEMOTE_MAX_PROBABILITY: f64 = 0.02;

/// What a recommendation proposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationKind {
    Swap { frequent: ActionKey, rare: ActionKey },
    Promote { from: ActionKey, chord: ButtonSet },
    Demote { button: Button, beneficiary: ActionKey },
}

impl RecommendationKind {
    /// Tie-break order between equal priorities.
    fn rank(&self) -> u8 {
        match self {
            RecommendationKind::Swap { .. } => 0,
            RecommendationKind::Promote { .. } => 1,
            RecommendationKind::Demote { .. } => 2,
        }
    }

    fn describe(&self) -> String {
        match self {
            RecommendationKind::Swap { frequent, rare } => {
                format!("swap {} with {}", frequent, rare)
            }
            RecommendationKind::Promote { from, chord } => {
                format!("move {} to chord {}", from, chord)
            }
            RecommendationKind::Demote { button, beneficiary } => format!(
                "move primary:{} to long_hold:{} and give its press to {}",
                button, button, beneficiary
            ),
        }
    }
}

/// A proposed binding change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub kind: RecommendationKind,
    pub priority: f64,
    /// Every button the change touches.
    pub buttons: ButtonSet,
    pub description: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, priority: f64, buttons: ButtonSet) -> Self {
        Self {
            description: kind.describe(),
            kind,
            priority,
            buttons,
        }
    }
}

fn single(button: Button) -> ButtonSet {
    [button].into_iter().collect()
}

/// Button owning a per-button slot.
fn slot_button(key: &ActionKey) -> Option<Button> {
    match key {
        ActionKey::Primary(b) | ActionKey::LongHold(b) | ActionKey::DoubleTap(b) => Some(*b),
        _ => None,
    }
}

fn swaps(entries: &[ActionEntry]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for hi in entries.iter().filter(|e| e.waste > 0.0) {
        for lo in entries {
            if hi.count > lo.count && hi.actual_cost > lo.actual_cost {
                let priority = (hi.probability - lo.probability) * (hi.actual_cost - lo.actual_cost);
                out.push(Recommendation::new(
                    RecommendationKind::Swap {
                        frequent: hi.key.clone(),
                        rare: lo.key.clone(),
                    },
                    priority,
                    hi.key.buttons().union(&lo.key.buttons()),
                ));
            }
        }
    }
    out
}

fn promotions(table: &BindingTable, stats: &UsageStats, entries: &[ActionEntry]) -> Vec<Recommendation> {
    let buttons = slot_buttons(table);
    let existing: Vec<ButtonSet> = table.chords().iter().map(|c| c.buttons()).collect();
    let mut reserved: Vec<ButtonSet> = Vec::new();
    let mut out = Vec::new();

    let sources = entries
        .iter()
        .filter(|e| matches!(e.slot, SlotKind::LongHold | SlotKind::DoubleTap) && e.count > 0);
    for entry in sources {
        let Some(source) = slot_button(&entry.key) else {
            continue;
        };
        let mut best: Option<(u64, ButtonSet)> = None;
        for left in buttons.iter().filter(|b| b.hand() == Hand::Left && **b != source) {
            for right in buttons.iter().filter(|b| b.hand() == Hand::Right && **b != source) {
                let pair: ButtonSet = [*left, *right].into_iter().collect();
                if existing.contains(&pair) || reserved.contains(&pair) {
                    continue;
                }
                let presses = stats.presses(*left) + stats.presses(*right);
                if best.map_or(true, |(p, _)| presses < p) {
                    best = Some((presses, pair));
                }
            }
        }
        let Some((_, chord)) = best else {
            continue;
        };
        reserved.push(chord);
        out.push(Recommendation::new(
            RecommendationKind::Promote {
                from: entry.key.clone(),
                chord,
            },
            entry.probability * (entry.actual_cost - SlotKind::Chord.cost()),
            chord.union(&single(source)),
        ));
    }
    out
}

fn demotions(table: &BindingTable, entries: &[ActionEntry]) -> Vec<Recommendation> {
    let press = SlotKind::Press.cost();
    let demote_cost = SlotKind::LongHold.cost() - press;
    let mut out = Vec::new();

    for demoted in entries.iter().filter(|e| e.probability < DEMOTE_MAX_PROBABILITY) {
        let ActionKey::Primary(button) = demoted.key else {
            continue;
        };
        if table
            .base_entry(button)
            .is_some_and(|e| e.long_hold_action().is_some())
        {
            continue;
        }
        let beneficiary = entries
            .iter()
            .filter(|b| b.key != demoted.key && b.actual_cost > press && b.count > 0)
            .map(|b| (b, b.probability * (b.actual_cost - press)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((beneficiary, benefit)) = beneficiary else {
            continue;
        };
        let priority = benefit - demoted.probability * demote_cost;
        if priority > 0.0 {
            out.push(Recommendation::new(
                RecommendationKind::Demote {
                    button,
                    beneficiary: beneficiary.key.clone(),
                },
                priority,
                single(button).union(&beneficiary.key.buttons()),
            ));
        }
    }
    out
}

/// Orders candidates and keeps a mutually non-conflicting subset.
///
/// Priorities are compared at nanounit precision so that float noise
/// never outranks the kind tie-break.
#[must_use]
pub fn select(mut candidates: Vec<Recommendation>) -> Vec<Recommendation> {
    let quantize = |p: f64| (p * 1e9).round() as i64;
    candidates.retain(|c| c.priority > 0.0);
    candidates.sort_by(|a, b| {
        quantize(b.priority)
            .cmp(&quantize(a.priority))
            .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
    });

    let mut taken = ButtonSet::EMPTY;
    let mut accepted = Vec::new();
    for candidate in candidates {
        if candidate.buttons.is_disjoint(&taken) {
            taken = taken.union(&candidate.buttons);
            accepted.push(candidate);
        }
    }
    accepted
}

/// Produces the final recommendation list for analyzed entries.
pub(crate) fn recommend(table: &BindingTable, stats: &UsageStats, entries: &[ActionEntry]) -> Vec<Recommendation> {
    let mut candidates = swaps(entries);
    candidates.extend(promotions(table, stats, entries));
    candidates.extend(demotions(table, entries));
    select(candidates)
}
