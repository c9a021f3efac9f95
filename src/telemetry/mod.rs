//! # Telemetry Module
//!
//! Running usage counters fed by the dispatcher and the action worker.
//!
//! This module handles:
//! - Per-button, per-press-type and per-slot counters
//! - Output counters and pointer/scroll distance
//! - Session bracketing with day streaks (local calendar)
//! - JSON persistence of the accumulated counters
//!
//! [`Telemetry`] is a cheap cloneable handle over shared state. Readers
//! such as the optimizer take a [`Telemetry::snapshot`], a point-in-time
//! copy, and never hold the lock while working.

pub mod stats;

pub use stats::{ActionKey, ActionType, OutputKind, SessionStats, UsageStats};

use chrono::{Local, NaiveDate};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

use crate::engine::{PressType, TriggerSource};
use crate::error::Result;
use crate::input::button::Button;

#[derive(Debug, Default)]
struct TelemetryState {
    stats: UsageStats,
    session_started: Option<Instant>,
}

/// Shared handle to the aggregator.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    inner: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    /// Creates an aggregator with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator continuing from `stats`.
    #[must_use]
    pub fn with_stats(stats: UsageStats) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TelemetryState {
                stats,
                session_started: None,
            })),
        }
    }

    /// Loads counters from a JSON file. A missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No telemetry at {}, starting fresh", path.display());
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)?;
        let stats: UsageStats = serde_json::from_str(&contents)?;
        Ok(Self::with_stats(stats))
    }

    /// Writes counters to a JSON file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!("Telemetry saved to {}", path.display());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> UsageStats {
        self.lock().stats.clone()
    }

    /// Counts a physical button press.
    pub fn record_button_press(&self, button: Button) {
        *self.lock().stats.button_presses.entry(button).or_default() += 1;
    }

    /// Counts a dispatched trigger.
    ///
    /// Slot counts are kept for base-layer triggers only; layered
    /// bindings are outside the optimizer's model.
    pub fn record_trigger(&self, source: &TriggerSource, press: PressType, base_layer: bool) {
        let mut state = self.lock();
        if let Some(kind) = ActionType::from_press(press) {
            *state.stats.action_types.entry(kind).or_default() += 1;
        }
        if base_layer {
            if let Some(key) = ActionKey::from_trigger(source, press) {
                *state.stats.action_keys.entry(key).or_default() += 1;
            }
        }
    }

    pub fn record_output(&self, kind: OutputKind, count: u64) {
        if count > 0 {
            *self.lock().stats.outputs.entry(kind).or_default() += count;
        }
    }

    /// Adds pointer travel in pixels.
    pub fn record_pointer(&self, distance: f64) {
        if distance.is_finite() {
            self.lock().stats.pointer_distance += distance.abs();
        }
    }

    /// Adds scroll travel in scroll units.
    pub fn record_scroll(&self, distance: f64) {
        if distance.is_finite() {
            self.lock().stats.scroll_distance += distance.abs();
        }
    }

    pub fn record_failure(&self) {
        self.lock().stats.dispatch_failures += 1;
    }

    /// Opens a session today (local calendar).
    pub fn start_session(&self, now: Instant) {
        self.start_session_on(Local::now().date_naive(), now);
    }

    /// Opens a session on an explicit calendar day.
    pub fn start_session_on(&self, date: NaiveDate, now: Instant) {
        let mut state = self.lock();
        state.stats.sessions.begin(date);
        state.session_started = Some(now);
    }

    /// Closes the open session, adding its length to the total.
    pub fn end_session(&self, now: Instant) {
        let mut state = self.lock();
        if let Some(started) = state.session_started.take() {
            state.stats.sessions.total_seconds += now.saturating_duration_since(started).as_secs_f64();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    // ==================== Counter Tests ====================

    #[test]
    fn test_record_trigger_counts_base_slots_only() {
        let telemetry = Telemetry::new();
        let source = TriggerSource::Button(Button::A);
        telemetry.record_trigger(&source, PressType::Single, true);
        telemetry.record_trigger(&source, PressType::Single, false);
        telemetry.record_trigger(&source, PressType::Repeat, true);

        let stats = telemetry.snapshot();
        assert_eq!(stats.action_types.get(&ActionType::Single), Some(&2));
        assert_eq!(stats.count(&ActionKey::Primary(Button::A)), 1);
        assert_eq!(stats.total_actions(), 1);
    }

    #[test]
    fn test_outputs_and_distances() {
        let telemetry = Telemetry::new();
        telemetry.record_output(OutputKind::KeyPress, 2);
        telemetry.record_output(OutputKind::KeyPress, 0);
        telemetry.record_pointer(-3.5);
        telemetry.record_pointer(f64::NAN);
        telemetry.record_scroll(2.0);
        telemetry.record_failure();
        telemetry.record_button_press(Button::B);

        let stats = telemetry.snapshot();
        assert_eq!(stats.output(OutputKind::KeyPress), 2);
        assert_eq!(stats.pointer_distance, 3.5);
        assert_eq!(stats.scroll_distance, 2.0);
        assert_eq!(stats.dispatch_failures, 1);
        assert_eq!(stats.presses(Button::B), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let telemetry = Telemetry::new();
        let before = telemetry.snapshot();
        telemetry.record_failure();
        assert_eq!(before.dispatch_failures, 0);
        assert_eq!(telemetry.clone().snapshot().dispatch_failures, 1);
    }

    // ==================== Session Tests ====================

    #[test]
    fn test_session_seconds_accumulate() {
        let telemetry = Telemetry::new();
        let t0 = Instant::now();
        let day = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

        telemetry.start_session_on(day, t0);
        telemetry.end_session(t0 + Duration::from_secs(90));
        // Ending twice adds nothing
        telemetry.end_session(t0 + Duration::from_secs(500));

        let sessions = telemetry.snapshot().sessions;
        assert_eq!(sessions.count, 1);
        assert_eq!(sessions.total_seconds, 90.0);
        assert_eq!(sessions.current_streak, 1);
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stats.json");

        let telemetry = Telemetry::new();
        telemetry.record_trigger(&TriggerSource::Button(Button::X), PressType::LongHold, true);
        telemetry.record_output(OutputKind::Macro, 1);
        telemetry.save(&path).unwrap();

        let loaded = Telemetry::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), telemetry.snapshot());
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let telemetry = Telemetry::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(telemetry.snapshot(), UsageStats::default());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, "not json").unwrap();
        assert!(Telemetry::load(&path).is_err());
    }
}
