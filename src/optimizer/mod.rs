//! # Binding Optimizer
//!
//! On-demand analysis of how well the base-layer bindings fit observed
//! usage. Reads a telemetry snapshot and the binding table; never touches
//! the live engine.
//!
//! This module handles:
//! - Per-slot probability, actual cost and optimal cost
//! - The efficiency score
//! - Swap / promote / demote recommendations (see [`recommend`])
//!
//! ## Slot costs
//!
//! | Slot | Cost |
//! |------|------|
//! | Single press | 1 |
//! | Chord | 2 |
//! | Sequence | 3 |
//! | Long-hold | 4 |
//! | Double-tap | 4 |
//!
//! The optimal cost of an action is the cost of the slot it would get if
//! every available slot were handed out cheapest-first to actions in
//! descending frequency order.

pub mod recommend;

pub use recommend::{Recommendation, RecommendationKind};

use serde::Serialize;

use crate::binding::table::BindingTable;
use crate::input::button::{Button, ButtonSet, Hand};
use crate::telemetry::{ActionKey, UsageStats};

/// Observed actions required before any verdict is given.
pub const MIN_OBSERVED_ACTIONS: u64 = 50;

/// Kind of binding slot an action occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Press,
    Chord,
    Sequence,
    LongHold,
    DoubleTap,
}

impl SlotKind {
    /// Relative physical and temporal effort of the slot.
    #[must_use]
    pub fn cost(self) -> f64 {
        match self {
            SlotKind::Press => 1.0,
            SlotKind::Chord => 2.0,
            SlotKind::Sequence => 3.0,
            SlotKind::LongHold | SlotKind::DoubleTap => 4.0,
        }
    }

    /// Slot kind of a binding key; gestures have none.
    #[must_use]
    pub fn of(key: &ActionKey) -> Option<Self> {
        match key {
            ActionKey::Primary(_) => Some(SlotKind::Press),
            ActionKey::Chord(_) => Some(SlotKind::Chord),
            ActionKey::Sequence(_) => Some(SlotKind::Sequence),
            ActionKey::LongHold(_) => Some(SlotKind::LongHold),
            ActionKey::DoubleTap(_) => Some(SlotKind::DoubleTap),
            ActionKey::Gesture(_) => None,
        }
    }
}

/// One bound action and its cost figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEntry {
    pub key: ActionKey,
    pub slot: SlotKind,
    /// Human-readable action label.
    pub action: String,
    pub count: u64,
    pub probability: f64,
    pub actual_cost: f64,
    pub optimal_cost: f64,
    /// `actual_cost - optimal_cost`; negative when the action sits in a
    /// cheaper slot than its frequency earns.
    pub waste: f64,
}

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub has_enough_data: bool,
    pub total_actions: u64,
    /// In `0.0..=1.0`; `None` without enough data.
    pub efficiency: Option<f64>,
    /// Sorted by descending count.
    pub entries: Vec<ActionEntry>,
    /// Mutually non-conflicting, highest priority first.
    pub recommendations: Vec<Recommendation>,
}

/// Buttons that can carry slots of their own (layer activators cannot).
pub(crate) fn slot_buttons(table: &BindingTable) -> Vec<Button> {
    let activators: ButtonSet = table.layers().iter().map(|l| l.activator).collect();
    Button::ALL
        .iter()
        .copied()
        .filter(|b| !activators.contains(*b))
        .collect()
}

/// Every base-layer slot currently holding an action.
fn collect_entries(table: &BindingTable, stats: &UsageStats, total: u64) -> Vec<ActionEntry> {
    let mut bound = Vec::new();
    for (button, entry) in table.base().iter() {
        if let Some(action) = entry.primary_action() {
            bound.push((ActionKey::Primary(button), action.label()));
        }
        if let Some(long_hold) = entry.long_hold_action() {
            bound.push((ActionKey::LongHold(button), long_hold.action.label()));
        }
        if let Some(double_tap) = entry.double_tap_action() {
            bound.push((ActionKey::DoubleTap(button), double_tap.action.label()));
        }
    }
    for chord in table.chords() {
        bound.push((ActionKey::Chord(chord.buttons()), chord.action().label()));
    }
    for sequence in table.sequences() {
        bound.push((ActionKey::Sequence(sequence.steps().to_vec()), sequence.action().label()));
    }

    let mut entries: Vec<ActionEntry> = bound
        .into_iter()
        .filter_map(|(key, action)| {
            let slot = SlotKind::of(&key)?;
            let count = stats.count(&key);
            let probability = if total > 0 { count as f64 / total as f64 } else { 0.0 };
            Some(ActionEntry {
                key,
                slot,
                action,
                count,
                probability,
                actual_cost: slot.cost(),
                optimal_cost: slot.cost(),
                waste: 0.0,
            })
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

/// Costs of every slot the table's buttons could offer, built cheapest first.
fn slot_pool(table: &BindingTable, entries: usize) -> Vec<f64> {
    let buttons = slot_buttons(table);
    let left = buttons.iter().filter(|b| b.hand() == Hand::Left).count();
    let right = buttons.iter().filter(|b| b.hand() == Hand::Right).count();

    let mut pool = Vec::new();
    pool.extend(std::iter::repeat(SlotKind::Press.cost()).take(buttons.len()));
    pool.extend(std::iter::repeat(SlotKind::Chord.cost()).take(left * right));
    pool.extend(std::iter::repeat(SlotKind::Sequence.cost()).take(entries));
    pool.extend(std::iter::repeat(SlotKind::LongHold.cost()).take(buttons.len()));
    pool.extend(std::iter::repeat(SlotKind::DoubleTap.cost()).take(buttons.len()));
    pool
}

/// Greedy assignment: the i-th most frequent action gets the i-th
/// cheapest slot.
fn assign_optimal(table: &BindingTable, entries: &mut [ActionEntry]) {
    let pool = slot_pool(table, entries.len());
    for (entry, optimal) in entries.iter_mut().zip(pool) {
        entry.optimal_cost = optimal;
        entry.waste = entry.actual_cost - optimal;
    }
}

fn efficiency(entries: &[ActionEntry]) -> f64 {
    let actual: f64 = entries.iter().map(|e| e.probability * e.actual_cost).sum();
    if actual <= 0.0 {
        return 1.0;
    }
    let waste: f64 = entries.iter().map(|e| e.probability * e.waste).sum();
    (1.0 - waste / actual).clamp(0.0, 1.0)
}

/// Analyzes the base layer of `table` against `stats`.
///
/// # Arguments
///
/// * `table` - Current bindings
/// * `stats` - Point-in-time telemetry snapshot
///
/// # Returns
///
/// Entries are always filled in. Efficiency and recommendations require
/// at least [`MIN_OBSERVED_ACTIONS`] observed actions.
///
/// # Examples
///
/// ```
/// use controller_keys::binding::table::BindingTable;
/// use controller_keys::optimizer::analyze;
/// use controller_keys::telemetry::UsageStats;
///
/// let report = analyze(&BindingTable::new(), &UsageStats::default());
/// assert!(!report.has_enough_data);
/// assert!(report.recommendations.is_empty());
/// ```
#[must_use]
pub fn analyze(table: &BindingTable, stats: &UsageStats) -> AnalysisReport {
    let total = stats.total_actions();
    let mut entries = collect_entries(table, stats, total);
    assign_optimal(table, &mut entries);

    if total < MIN_OBSERVED_ACTIONS {
        return AnalysisReport {
            has_enough_data: false,
            total_actions: total,
            efficiency: None,
            entries,
            recommendations: Vec::new(),
        };
    }

    let recommendations = recommend::recommend(table, stats, &entries);
    AnalysisReport {
        has_enough_data: true,
        total_actions: total,
        efficiency: Some(efficiency(&entries)),
        entries,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::action::{Action, KeyCode};
    use crate::binding::table::{BindingEntry, ChordMapping, GestureKind, Layer};
    use std::time::Duration;

    fn stats_with(counts: &[(ActionKey, u64)]) -> UsageStats {
        let mut stats = UsageStats::default();
        for (key, count) in counts {
            stats.action_keys.insert(key.clone(), *count);
        }
        stats
    }

    fn table() -> BindingTable {
        let mut table = BindingTable::new();
        table.set_binding(Button::A, BindingEntry::primary(Action::key(KeyCode::A)));
        table.set_binding(
            Button::B,
            BindingEntry::primary(Action::key(KeyCode::S))
                .with_long_hold(Action::key(KeyCode::D), Duration::from_millis(500)),
        );
        table
    }

    // ==================== Cost Tests ====================

    #[test]
    fn test_slot_costs_ordered() {
        assert!(SlotKind::Press.cost() < SlotKind::Chord.cost());
        assert!(SlotKind::Chord.cost() < SlotKind::Sequence.cost());
        assert!(SlotKind::Sequence.cost() < SlotKind::LongHold.cost());
        assert_eq!(SlotKind::LongHold.cost(), SlotKind::DoubleTap.cost());
    }

    #[test]
    fn test_entries_probability_and_waste() {
        let stats = stats_with(&[
            (ActionKey::Primary(Button::A), 10),
            (ActionKey::Primary(Button::B), 30),
            (ActionKey::LongHold(Button::B), 60),
        ]);
        let report = analyze(&table(), &stats);

        assert!(report.has_enough_data);
        assert_eq!(report.total_actions, 100);
        let first = &report.entries[0];
        assert_eq!(first.key, ActionKey::LongHold(Button::B));
        assert_eq!(first.probability, 0.6);
        assert_eq!(first.actual_cost, 4.0);
        assert_eq!(first.optimal_cost, 1.0);
        assert_eq!(first.waste, 3.0);
        assert!(report.entries.iter().skip(1).all(|e| e.waste == 0.0));
    }

    #[test]
    fn test_efficiency_in_unit_range() {
        let stats = stats_with(&[
            (ActionKey::Primary(Button::A), 10),
            (ActionKey::Primary(Button::B), 30),
            (ActionKey::LongHold(Button::B), 60),
        ]);
        let efficiency = analyze(&table(), &stats).efficiency.unwrap();
        // actual = 0.1 + 0.3 + 2.4 = 2.8, waste = 1.8
        assert!((efficiency - (1.0 - 1.8 / 2.8)).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_layout_scores_one() {
        // Gestures count toward the total but occupy no slot
        let stats = stats_with(&[
            (ActionKey::Primary(Button::A), 40),
            (ActionKey::Primary(Button::B), 30),
            (ActionKey::LongHold(Button::B), 0),
            (ActionKey::Gesture(GestureKind::TiltForward), 10),
        ]);
        assert_eq!(analyze(&table(), &stats).efficiency, Some(1.0));
    }

    // ==================== Data Threshold Tests ====================

    #[test]
    fn test_insufficient_data() {
        let stats = stats_with(&[(ActionKey::LongHold(Button::B), MIN_OBSERVED_ACTIONS - 1)]);
        let report = analyze(&table(), &stats);

        assert!(!report.has_enough_data);
        assert_eq!(report.efficiency, None);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.entries.len(), 3);
    }

    // ==================== Scope Tests ====================

    #[test]
    fn test_chords_and_sequences_are_entries() {
        let mut table = table();
        table
            .add_chord(ChordMapping::new([Button::A, Button::RightBumper], Action::key(KeyCode::TAB)).unwrap())
            .unwrap();
        let stats = stats_with(&[(ActionKey::Chord([Button::A, Button::RightBumper].into_iter().collect()), 5)]);
        let report = analyze(&table, &stats);
        assert_eq!(report.entries[0].slot, SlotKind::Chord);
        assert_eq!(report.entries[0].count, 5);
    }

    #[test]
    fn test_activators_offer_no_slots() {
        let mut table = BindingTable::new();
        table.add_layer(Layer::new("nav", Button::LeftBumper)).unwrap();
        let buttons = slot_buttons(&table);
        assert!(!buttons.contains(&Button::LeftBumper));
        assert_eq!(buttons.len(), Button::COUNT - 1);
    }

    #[test]
    fn test_report_serializes() {
        let stats = stats_with(&[(ActionKey::LongHold(Button::B), 80), (ActionKey::Primary(Button::A), 5)]);
        let json = serde_json::to_value(analyze(&table(), &stats)).unwrap();
        assert_eq!(json["has_enough_data"], true);
        assert_eq!(json["entries"][0]["key"], "long_hold:b");
        assert_eq!(json["entries"][0]["slot"], "long_hold");
    }
}
