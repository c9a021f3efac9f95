//! # Button State Tracker
//!
//! One finite-state machine per physical button. Turns raw down/up
//! events into disambiguated intents: single press, long hold, double
//! tap, repeat tick, and hold-style press/release.
//!
//! ## States
//!
//! ```text
//!            down                       long-hold deadline
//!   Idle ───────────▶ Pending ─────────────────────────────▶ Consumed
//!    ▲                  │  │ up (double-tap configured)         │
//!    │   up (no DT)     │  └──────────▶ AwaitingDoubleTap       │ up
//!    ├──────────────────┘                 │ down → double tap ──┘
//!    │                                    │ deadline → primary (retroactive)
//!    ├────────────────────────────────────┘
//!    │        hold-style: Holding (press on down, release on up)
//!    └──────  repeat:     Repeating (tick every interval while held)
//! ```
//!
//! ## Timers
//!
//! Timers are plain deadlines stored in the state. The engine asks each
//! tracker for its [`ButtonTracker::next_deadline`] and calls
//! [`ButtonTracker::fire_due`] in deadline order before handling any
//! event at a later instant. Cancelling a timer means replacing the state,
//! so a cancelled timer can never fire late.
//!
//! ## Repeat disambiguation
//!
//! - No long-hold and no double-tap: the primary fires on down and then
//!   once per interval while held.
//! - Double-tap but no long-hold: the button is resolved as a held
//!   primary once it stays down for the double-tap window; the first
//!   emission happens then and repeating continues from there.
//! - Long-hold configured: long-hold supersedes the primary when held,
//!   so repeat never starts.
//!
//! Hold-style assertion applies when neither long-hold nor double-tap is
//! configured; otherwise the primary is delivered as a tap once resolved.

use std::time::{Duration, Instant};

use crate::binding::action::Action;
use crate::binding::table::{BindingEntry, LayerId};

/// How a trigger was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressType {
    Single,
    LongHold,
    DoubleTap,
    /// A repeated primary emission while the button stays down.
    Repeat,
    Chord,
    Sequence,
    Gesture,
}

impl PressType {
    /// Stable snake_case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PressType::Single => "single",
            PressType::LongHold => "long_hold",
            PressType::DoubleTap => "double_tap",
            PressType::Repeat => "repeat",
            PressType::Chord => "chord",
            PressType::Sequence => "sequence",
            PressType::Gesture => "gesture",
        }
    }
}

/// Whether a trigger is a one-shot or one edge of a held assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fire once.
    Tap,
    /// Begin asserting (hold-style press).
    Press,
    /// Stop asserting (hold-style release).
    Release,
}

/// An intent produced by a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub press: PressType,
    pub phase: Phase,
    pub action: Action,
    /// Layer the activation was resolved on.
    pub layer: Option<LayerId>,
    /// When the intent occurred (event time or timer deadline).
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Pending {
        entry: BindingEntry,
        layer: Option<LayerId>,
        long_hold_at: Option<Instant>,
        /// Hold-to-repeat resolution deadline (double-tap + repeat only).
        resolve_at: Option<Instant>,
    },
    Holding {
        action: Action,
        layer: Option<LayerId>,
    },
    Repeating {
        action: Action,
        layer: Option<LayerId>,
        interval: Duration,
        next: Instant,
    },
    AwaitingDoubleTap {
        entry: BindingEntry,
        layer: Option<LayerId>,
        deadline: Instant,
    },
    /// Down, but nothing more will be emitted for this activation.
    Consumed,
}

/// Per-button state machine.
#[derive(Debug, Clone)]
pub struct ButtonTracker {
    state: State,
}

impl Default for ButtonTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// True while no activation or double-tap window is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// True while a hold-style primary is being asserted.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        matches!(self.state, State::Holding { .. })
    }

    /// Handles a physical press.
    ///
    /// `entry` is the binding resolved for this activation; `None` means
    /// the button is unbound on every layer. Due timers must have been
    /// fired up to `now` before calling this.
    pub fn on_down(
        &mut self,
        entry: Option<&BindingEntry>,
        layer: Option<LayerId>,
        now: Instant,
    ) -> Vec<Emission> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::AwaitingDoubleTap { entry, layer, .. } => {
                self.state = State::Consumed;
                return entry
                    .double_tap_action()
                    .map(|dt| vec![emit(PressType::DoubleTap, Phase::Tap, &dt.action, layer, now)])
                    .unwrap_or_default();
            }
            State::Idle => {}
            other => {
                // Repeated down without an up; keep the current activation.
                self.state = other;
                return Vec::new();
            }
        }

        let Some(entry) = entry.filter(|e| !e.is_empty()) else {
            self.state = State::Consumed;
            return Vec::new();
        };

        let long_hold = entry.long_hold_action();
        let double_tap = entry.double_tap_action();
        let repeat = entry.repeat_interval();

        if long_hold.is_none() && double_tap.is_none() {
            if let Some(primary) = entry.primary_action() {
                if entry.hold_style {
                    self.state = State::Holding {
                        action: primary.clone(),
                        layer,
                    };
                    return vec![emit(PressType::Single, Phase::Press, primary, layer, now)];
                }
                if let Some(interval) = repeat {
                    self.state = State::Repeating {
                        action: primary.clone(),
                        layer,
                        interval,
                        next: now + interval,
                    };
                    return vec![emit(PressType::Single, Phase::Tap, primary, layer, now)];
                }
            }
        }

        let resolve_at = match (long_hold, double_tap, repeat, entry.primary_action()) {
            (None, Some(dt), Some(_), Some(_)) => Some(now + dt.window),
            _ => None,
        };

        self.state = State::Pending {
            entry: entry.clone(),
            layer,
            long_hold_at: long_hold.map(|l| now + l.threshold),
            resolve_at,
        };
        Vec::new()
    }

    /// Handles a physical release.
    pub fn on_up(&mut self, now: Instant) -> Vec<Emission> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Pending { entry, layer, .. } => {
                if let Some(dt) = entry.double_tap_action() {
                    let deadline = now + dt.window;
                    self.state = State::AwaitingDoubleTap {
                        entry,
                        layer,
                        deadline,
                    };
                    Vec::new()
                } else {
                    entry
                        .primary_action()
                        .map(|a| vec![emit(PressType::Single, Phase::Tap, a, layer, now)])
                        .unwrap_or_default()
                }
            }
            State::Holding { action, layer } => {
                vec![emit(PressType::Single, Phase::Release, &action, layer, now)]
            }
            State::AwaitingDoubleTap {
                entry,
                layer,
                deadline,
            } => {
                // Stray release while the button is already up.
                self.state = State::AwaitingDoubleTap {
                    entry,
                    layer,
                    deadline,
                };
                Vec::new()
            }
            State::Repeating { .. } | State::Consumed | State::Idle => Vec::new(),
        }
    }

    /// Earliest pending timer, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Pending {
                long_hold_at,
                resolve_at,
                ..
            } => match (long_hold_at, resolve_at) {
                (Some(a), Some(b)) => Some(*a.min(b)),
                (a, b) => a.or(*b),
            },
            State::Repeating { next, .. } => Some(*next),
            State::AwaitingDoubleTap { deadline, .. } => Some(*deadline),
            State::Idle | State::Holding { .. } | State::Consumed => None,
        }
    }

    /// Fires the earliest timer if it is due at `now`.
    ///
    /// Emissions are stamped with the timer deadline, not `now`.
    pub fn fire_due(&mut self, now: Instant) -> Vec<Emission> {
        let Some(deadline) = self.next_deadline().filter(|d| *d <= now) else {
            return Vec::new();
        };

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Pending {
                entry,
                layer,
                long_hold_at,
                resolve_at,
            } => {
                if long_hold_at == Some(deadline) {
                    self.state = State::Consumed;
                    return entry
                        .long_hold_action()
                        .map(|l| vec![emit(PressType::LongHold, Phase::Tap, &l.action, layer, deadline)])
                        .unwrap_or_default();
                }
                debug_assert_eq!(resolve_at, Some(deadline));
                match (entry.primary_action(), entry.repeat_interval()) {
                    (Some(primary), Some(interval)) => {
                        self.state = State::Repeating {
                            action: primary.clone(),
                            layer,
                            interval,
                            next: deadline + interval,
                        };
                        vec![emit(PressType::Single, Phase::Tap, primary, layer, deadline)]
                    }
                    _ => {
                        self.state = State::Consumed;
                        Vec::new()
                    }
                }
            }
            State::Repeating {
                action,
                layer,
                interval,
                next,
            } => {
                let out = vec![emit(PressType::Repeat, Phase::Tap, &action, layer, next)];
                self.state = State::Repeating {
                    action,
                    layer,
                    interval,
                    next: next + interval,
                };
                out
            }
            State::AwaitingDoubleTap { entry, layer, .. } => entry
                .primary_action()
                .map(|a| vec![emit(PressType::Single, Phase::Tap, a, layer, deadline)])
                .unwrap_or_default(),
            other => {
                self.state = other;
                Vec::new()
            }
        }
    }

    /// A chord or sequence took this button's current press.
    ///
    /// Cancels pending timers. A held assertion is released, and a primary
    /// still waiting on a double-tap window from the previous press is
    /// delivered before the claim takes effect.
    pub fn claim(&mut self, now: Instant) -> Vec<Emission> {
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Holding { action, layer } => {
                vec![emit(PressType::Single, Phase::Release, &action, layer, now)]
            }
            State::AwaitingDoubleTap { entry, layer, .. } => entry
                .primary_action()
                .map(|a| vec![emit(PressType::Single, Phase::Tap, a, layer, now)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Drops all state, releasing a held assertion if there is one.
    pub fn reset(&mut self, now: Instant) -> Vec<Emission> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Holding { action, layer } => {
                vec![emit(PressType::Single, Phase::Release, &action, layer, now)]
            }
            _ => Vec::new(),
        }
    }
}

fn emit(press: PressType, phase: Phase, action: &Action, layer: Option<LayerId>, at: Instant) -> Emission {
    Emission {
        press,
        phase,
        action: action.clone(),
        layer,
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::action::KeyCode;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Fires every timer due up to `now`, in order.
    fn advance(tracker: &mut ButtonTracker, now: Instant) -> Vec<Emission> {
        let mut out = Vec::new();
        while tracker.next_deadline().is_some_and(|d| d <= now) {
            out.extend(tracker.fire_due(now));
        }
        out
    }

    fn primary() -> Action {
        Action::key(KeyCode::A)
    }

    fn long() -> Action {
        Action::key(KeyCode::S)
    }

    fn double() -> Action {
        Action::key(KeyCode::D)
    }

    // ==================== Primary Only ====================

    #[test]
    fn test_primary_fires_once_on_up() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary());
        let mut tracker = ButtonTracker::new();

        assert!(tracker.on_down(Some(&entry), None, t0).is_empty());
        let out = tracker.on_up(t0 + ms(30));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].press, PressType::Single);
        assert_eq!(out[0].phase, Phase::Tap);
        assert_eq!(out[0].action, primary());
        assert_eq!(out[0].at, t0 + ms(30));
        assert!(tracker.is_idle());
        assert!(advance(&mut tracker, t0 + ms(5000)).is_empty());
    }

    #[test]
    fn test_unbound_button_emits_nothing() {
        let t0 = Instant::now();
        let mut tracker = ButtonTracker::new();
        assert!(tracker.on_down(None, None, t0).is_empty());
        assert!(tracker.on_up(t0 + ms(10)).is_empty());
        assert!(tracker.is_idle());
    }

    // ==================== Long Hold ====================

    #[test]
    fn test_long_hold_supersedes_primary() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_long_hold(long(), ms(500));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        assert!(advance(&mut tracker, t0 + ms(499)).is_empty());

        let out = advance(&mut tracker, t0 + ms(700));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].press, PressType::LongHold);
        assert_eq!(out[0].action, long());
        assert_eq!(out[0].at, t0 + ms(500));

        assert!(tracker.on_up(t0 + ms(900)).is_empty());
        assert!(advance(&mut tracker, t0 + ms(5000)).is_empty());
    }

    #[test]
    fn test_release_before_threshold_fires_primary() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_long_hold(long(), ms(500));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        assert!(advance(&mut tracker, t0 + ms(200)).is_empty());
        let out = tracker.on_up(t0 + ms(200));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, primary());

        // Cancelled timer never fires
        assert!(advance(&mut tracker, t0 + ms(600)).is_empty());
    }

    // ==================== Double Tap ====================

    #[test]
    fn test_double_tap_within_window() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_double_tap(double(), ms(300));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        assert!(tracker.on_up(t0 + ms(50)).is_empty());
        assert!(advance(&mut tracker, t0 + ms(200)).is_empty());

        let out = tracker.on_down(Some(&entry), None, t0 + ms(200));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].press, PressType::DoubleTap);
        assert_eq!(out[0].action, double());

        assert!(tracker.on_up(t0 + ms(250)).is_empty());
        assert!(advance(&mut tracker, t0 + ms(5000)).is_empty());
    }

    #[test]
    fn test_double_tap_window_expiry_fires_primary_retroactively() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_double_tap(double(), ms(300));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        tracker.on_up(t0 + ms(50));
        let out = advance(&mut tracker, t0 + ms(400));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].press, PressType::Single);
        assert_eq!(out[0].at, t0 + ms(350));
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_two_slow_taps_fire_primary_twice() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_double_tap(double(), ms(300));
        let mut tracker = ButtonTracker::new();
        let mut out = Vec::new();

        tracker.on_down(Some(&entry), None, t0);
        tracker.on_up(t0 + ms(50));
        out.extend(advance(&mut tracker, t0 + ms(600)));
        tracker.on_down(Some(&entry), None, t0 + ms(600));
        tracker.on_up(t0 + ms(650));
        out.extend(advance(&mut tracker, t0 + ms(2000)));

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.action == primary() && e.press == PressType::Single));
    }

    #[test]
    fn test_double_tap_without_primary_expires_silently() {
        let t0 = Instant::now();
        let entry = BindingEntry::default().with_double_tap(double(), ms(300));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        tracker.on_up(t0 + ms(20));
        assert!(advance(&mut tracker, t0 + ms(1000)).is_empty());
        assert!(tracker.is_idle());
    }

    // ==================== Repeat ====================

    #[test]
    fn test_repeat_fires_immediately_then_per_interval() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_repeat(ms(100));
        let mut tracker = ButtonTracker::new();

        let first = tracker.on_down(Some(&entry), None, t0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].press, PressType::Single);

        let ticks = advance(&mut tracker, t0 + ms(350));
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|e| e.press == PressType::Repeat));
        assert_eq!(ticks[2].at, t0 + ms(300));

        assert!(tracker.on_up(t0 + ms(360)).is_empty());
        assert!(advance(&mut tracker, t0 + ms(1000)).is_empty());
    }

    #[test]
    fn test_repeat_deferred_until_double_tap_window_passes() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary())
            .with_double_tap(double(), ms(300))
            .with_repeat(ms(100));
        let mut tracker = ButtonTracker::new();

        assert!(tracker.on_down(Some(&entry), None, t0).is_empty());
        assert!(advance(&mut tracker, t0 + ms(299)).is_empty());

        let out = advance(&mut tracker, t0 + ms(500));
        assert_eq!(out.len(), 3); // resolve at 300, repeats at 400 and 500
        assert_eq!(out[0].press, PressType::Single);
        assert_eq!(out[0].at, t0 + ms(300));
        assert_eq!(out[1].press, PressType::Repeat);

        assert!(tracker.on_up(t0 + ms(550)).is_empty());
    }

    #[test]
    fn test_repeat_suppressed_by_long_hold() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary())
            .with_long_hold(long(), ms(500))
            .with_repeat(ms(100));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        let out = advance(&mut tracker, t0 + ms(1000));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].press, PressType::LongHold);
    }

    // ==================== Hold Style ====================

    #[test]
    fn test_hold_style_press_and_release() {
        let t0 = Instant::now();
        let entry = BindingEntry::held(primary());
        let mut tracker = ButtonTracker::new();

        let down = tracker.on_down(Some(&entry), None, t0);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].phase, Phase::Press);
        assert!(tracker.is_holding());

        let up = tracker.on_up(t0 + ms(800));
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].phase, Phase::Release);
        assert_eq!(up[0].action, primary());
    }

    // ==================== Claims ====================

    #[test]
    fn test_claim_cancels_pending_primary() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_long_hold(long(), ms(500));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        assert!(tracker.claim(t0 + ms(20)).is_empty());
        assert!(advance(&mut tracker, t0 + ms(1000)).is_empty());
        assert!(tracker.on_up(t0 + ms(1000)).is_empty());
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_claim_releases_hold() {
        let t0 = Instant::now();
        let entry = BindingEntry::held(primary());
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        let out = tracker.claim(t0 + ms(10));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].phase, Phase::Release);
        assert!(tracker.on_up(t0 + ms(50)).is_empty());
    }

    #[test]
    fn test_claim_on_idle_consumes_press() {
        let t0 = Instant::now();
        let mut tracker = ButtonTracker::new();
        assert!(tracker.claim(t0).is_empty());
        let entry = BindingEntry::primary(primary());
        // A second down while claimed is ignored
        assert!(tracker.on_down(Some(&entry), None, t0).is_empty());
        assert!(tracker.on_up(t0 + ms(10)).is_empty());
    }

    #[test]
    fn test_claim_delivers_primary_waiting_on_double_tap() {
        let t0 = Instant::now();
        let entry = BindingEntry::primary(primary()).with_double_tap(double(), ms(300));
        let mut tracker = ButtonTracker::new();

        tracker.on_down(Some(&entry), None, t0);
        tracker.on_up(t0 + ms(40));
        let out = tracker.claim(t0 + ms(100));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, primary());
        assert!(advance(&mut tracker, t0 + ms(1000)).is_empty());
    }

    #[test]
    fn test_reset_releases_hold() {
        let t0 = Instant::now();
        let mut tracker = ButtonTracker::new();
        tracker.on_down(Some(&BindingEntry::held(primary())), None, t0);
        let out = tracker.reset(t0 + ms(5));
        assert_eq!(out.len(), 1);
        assert!(tracker.is_idle());
    }
}
