//! Focus scoring engine
//!
//! Consumes tracker events and maintains a bounded focus score with a
//! distraction counter. Distraction entries and threshold breaches are
//! buffered as [`FocusSignal`]s and drained by the session controller,
//! which owns routing to the notification collaborator.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::{TrackerEvent, TrackerEventKind};

/// Score recovery for a generic activity event.
pub const ACTIVITY_RECOVERY: f64 = 0.5;
/// Score recovery for scroll-position movement.
pub const SCROLL_RECOVERY: f64 = 2.0;
/// Penalty applied on every detected distraction.
pub const DISTRACTION_PENALTY: f64 = 10.0;
/// Recovery applied by an explicit learner interaction.
pub const INTERACTION_RECOVERY: f64 = 15.0;
/// Decay applied per engagement tick once scroll position has stagnated.
pub const STAGNATION_DECAY: f64 = 5.0;
/// Reward applied per engagement tick when scroll position moved.
pub const MOVEMENT_REWARD: f64 = 2.0;
/// Consecutive unchanged engagement ticks tolerated before decay starts.
pub const STAGNATION_TICK_LIMIT: u32 = 30;

/// What triggered a distraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionKind {
    Idle,
    ErraticPointer,
    RapidScroll,
    TabHidden,
}

impl DistractionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ErraticPointer => "erratic_pointer",
            Self::RapidScroll => "rapid_scroll",
            Self::TabHidden => "tab_hidden",
        }
    }
}

/// Mutable scoring state, owned exclusively by one engine instance.
#[derive(Debug, Clone)]
pub struct FocusState {
    pub score: f64,
    pub distraction_count: u32,
    pub session_start: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Immutable record of one detected distraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistractionLogEntry {
    pub kind: DistractionKind,
    pub timestamp: DateTime<Utc>,
    pub focus_score_at_event: f64,
    pub session_elapsed_seconds: i64,
}

/// Point-in-time view of the scoring state, used for metrics polling and
/// notification payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusSnapshot {
    pub score: f64,
    pub distraction_count: u32,
    pub session_elapsed_seconds: i64,
    pub seconds_since_activity: i64,
}

/// Signals the engine raises for the controller to route.
#[derive(Debug, Clone)]
pub enum FocusSignal {
    Distraction(DistractionLogEntry),
    ThresholdBreached(FocusSnapshot),
}

/// Focus scoring engine for one monitored surface.
pub struct FocusEngine {
    state: FocusState,
    idle_threshold_secs: u32,
    distraction_threshold: f64,
    /// Whether the current idle episode has already been penalized.
    /// Idle polls re-fire every second while idleness persists; the
    /// penalty applies once per episode and re-arms on activity.
    idle_penalized: bool,
    stagnant_ticks: u32,
    last_tick_scroll: Option<f64>,
    signals: VecDeque<FocusSignal>,
}

impl FocusEngine {
    /// Create an engine seeded at full focus.
    #[must_use]
    pub fn new(idle_threshold_secs: u32, distraction_threshold: f64, now: DateTime<Utc>) -> Self {
        Self {
            state: FocusState {
                score: 100.0,
                distraction_count: 0,
                session_start: now,
                last_activity: now,
            },
            idle_threshold_secs,
            distraction_threshold,
            idle_penalized: false,
            stagnant_ticks: 0,
            last_tick_scroll: None,
            signals: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &FocusState {
        &self.state
    }

    /// Consume one tracker event.
    pub fn handle_event(&mut self, event: &TrackerEvent) {
        match event.kind {
            TrackerEventKind::Activity => {
                // Scroll movement recovers faster than generic input.
                let moved = event.magnitude.is_some_and(|delta| delta > 0.0);
                let recovery = if moved { SCROLL_RECOVERY } else { ACTIVITY_RECOVERY };
                self.apply_activity(recovery, event.timestamp);
            }
            TrackerEventKind::Idle => {
                // Activity from any tracker resets the idle clock, so the
                // effective idleness is measured from the engine's own
                // last-activity timestamp rather than per modality.
                let idle_secs = (event.timestamp - self.state.last_activity).num_seconds();
                if idle_secs > i64::from(self.idle_threshold_secs) && !self.idle_penalized {
                    self.record_distraction(DistractionKind::Idle, event.timestamp);
                    self.idle_penalized = true;
                }
            }
            TrackerEventKind::Erratic => {
                self.record_distraction(DistractionKind::ErraticPointer, event.timestamp);
            }
            TrackerEventKind::Rapid => {
                self.record_distraction(DistractionKind::RapidScroll, event.timestamp);
            }
        }
    }

    /// Tab switched away or back. Hidden counts as a distraction; becoming
    /// visible again counts as an activity event.
    pub fn visibility_changed(&mut self, hidden: bool, now: DateTime<Utc>) {
        if hidden {
            self.record_distraction(DistractionKind::TabHidden, now);
        } else {
            self.apply_activity(ACTIVITY_RECOVERY, now);
        }
    }

    /// 1-second engagement tick: reward scroll movement, decay stagnation.
    ///
    /// Runs independently of the idle-based distraction path.
    pub fn tick_engagement(&mut self, scroll_position: Option<f64>) {
        let Some(prev) = self.last_tick_scroll else {
            // First observed position is the baseline.
            self.last_tick_scroll = scroll_position;
            return;
        };
        let moved = scroll_position.is_some_and(|current| (current - prev).abs() > f64::EPSILON);

        if moved {
            self.stagnant_ticks = 0;
            self.state.score = clamp_score(self.state.score + MOVEMENT_REWARD);
        } else {
            self.stagnant_ticks = self.stagnant_ticks.saturating_add(1);
            if self.stagnant_ticks > STAGNATION_TICK_LIMIT {
                self.state.score = clamp_score(self.state.score - STAGNATION_DECAY);
            }
        }

        if scroll_position.is_some() {
            self.last_tick_scroll = scroll_position;
        }
    }

    /// Focus check: when the score is at or below the floor, raise a
    /// threshold breach and fully reset.
    ///
    /// Returns `true` when the threshold was breached.
    pub fn check_focus(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.score > self.distraction_threshold {
            return false;
        }
        let snapshot = self.snapshot(now);
        self.signals.push_back(FocusSignal::ThresholdBreached(snapshot));
        self.reset_focus(now);
        true
    }

    /// Explicit external signal, e.g. the learner acknowledging a break
    /// prompt. Behaves like a strong activity event.
    pub fn register_interaction(&mut self, now: DateTime<Utc>) {
        self.apply_activity(INTERACTION_RECOVERY, now);
    }

    /// Full reset: score back to 100, distraction history cleared.
    pub fn reset_focus(&mut self, now: DateTime<Utc>) {
        self.state.score = 100.0;
        self.state.distraction_count = 0;
        self.state.last_activity = now;
        self.idle_penalized = false;
        self.stagnant_ticks = 0;
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> FocusSnapshot {
        FocusSnapshot {
            score: self.state.score,
            distraction_count: self.state.distraction_count,
            session_elapsed_seconds: (now - self.state.session_start).num_seconds(),
            seconds_since_activity: (now - self.state.last_activity).num_seconds(),
        }
    }

    /// Take all buffered signals, oldest first.
    pub fn drain_signals(&mut self) -> Vec<FocusSignal> {
        self.signals.drain(..).collect()
    }

    fn apply_activity(&mut self, recovery: f64, now: DateTime<Utc>) {
        self.state.score = clamp_score(self.state.score + recovery);
        self.state.last_activity = now;
        self.idle_penalized = false;
    }

    fn record_distraction(&mut self, kind: DistractionKind, now: DateTime<Utc>) {
        self.state.distraction_count += 1;
        self.state.score = clamp_score(self.state.score - DISTRACTION_PENALTY);

        let entry = DistractionLogEntry {
            kind,
            timestamp: now,
            focus_score_at_event: self.state.score,
            session_elapsed_seconds: (now - self.state.session_start).num_seconds(),
        };
        log::debug!(
            "distraction {} at score {:.1}",
            kind.as_str(),
            entry.focus_score_at_event
        );
        self.signals.push_back(FocusSignal::Distraction(entry));
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn idle_event(duration: f64, at: DateTime<Utc>) -> TrackerEvent {
        TrackerEvent {
            kind: TrackerEventKind::Idle,
            timestamp: at,
            magnitude: Some(duration),
        }
    }

    fn activity_event(at: DateTime<Utc>) -> TrackerEvent {
        TrackerEvent {
            kind: TrackerEventKind::Activity,
            timestamp: at,
            magnitude: None,
        }
    }

    fn engine() -> FocusEngine {
        // Medium sensitivity pair.
        FocusEngine::new(30, 50.0, t(0))
    }

    #[test]
    fn score_stays_within_bounds() {
        let mut engine = engine();

        // Hammer with distractions: floor at 0.
        for i in 0..50 {
            engine.handle_event(&TrackerEvent {
                kind: TrackerEventKind::Erratic,
                timestamp: t(i),
                magnitude: Some(9000.0),
            });
        }
        assert!((engine.state().score - 0.0).abs() < f64::EPSILON);

        // Recover far past the cap: ceiling at 100.
        for i in 50..400 {
            engine.handle_event(&activity_event(t(i)));
            engine.register_interaction(t(i));
        }
        assert!((engine.state().score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn idle_past_threshold_penalizes_and_logs() {
        let mut engine = engine();
        engine.handle_event(&idle_event(31.0, t(31)));

        assert_eq!(engine.state().distraction_count, 1);
        assert!((engine.state().score - 90.0).abs() < f64::EPSILON);

        let signals = engine.drain_signals();
        assert_eq!(signals.len(), 1);
        match &signals[0] {
            FocusSignal::Distraction(entry) => {
                assert_eq!(entry.kind, DistractionKind::Idle);
                assert_eq!(entry.session_elapsed_seconds, 31);
                assert!((entry.focus_score_at_event - 90.0).abs() < f64::EPSILON);
            }
            FocusSignal::ThresholdBreached(_) => panic!("expected distraction"),
        }
    }

    #[test]
    fn idle_below_threshold_is_ignored() {
        let mut engine = engine();
        engine.handle_event(&idle_event(29.0, t(29)));
        assert_eq!(engine.state().distraction_count, 0);
        assert!(engine.drain_signals().is_empty());
    }

    #[test]
    fn idle_episode_penalized_once() {
        let mut engine = engine();

        // Idle polls keep firing every second past the threshold.
        for i in 31..60 {
            engine.handle_event(&idle_event(i as f64, t(i)));
        }
        assert_eq!(engine.state().distraction_count, 1);
        assert!((engine.state().score - 90.0).abs() < f64::EPSILON);

        // Activity re-arms; the next episode penalizes again.
        engine.handle_event(&activity_event(t(60)));
        engine.handle_event(&idle_event(31.0, t(91)));
        assert_eq!(engine.state().distraction_count, 2);
    }

    #[test]
    fn erratic_and_rapid_are_independent_of_idle_state() {
        let mut engine = engine();
        engine.handle_event(&TrackerEvent {
            kind: TrackerEventKind::Rapid,
            timestamp: t(1),
            magnitude: Some(1500.0),
        });
        engine.handle_event(&TrackerEvent {
            kind: TrackerEventKind::Erratic,
            timestamp: t(2),
            magnitude: Some(5000.0),
        });
        assert_eq!(engine.state().distraction_count, 2);
        assert!((engine.state().score - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hidden_tab_is_a_distraction_and_visible_recovers() {
        let mut engine = engine();
        engine.visibility_changed(true, t(1));
        assert_eq!(engine.state().distraction_count, 1);

        let before = engine.state().score;
        engine.visibility_changed(false, t(2));
        assert!(engine.state().score > before);
    }

    #[test]
    fn reset_clears_score_and_history() {
        let mut engine = engine();
        engine.handle_event(&idle_event(40.0, t(40)));
        engine.visibility_changed(true, t(41));
        assert!(engine.state().distraction_count > 0);

        engine.reset_focus(t(42));
        assert!((engine.state().score - 100.0).abs() < f64::EPSILON);
        assert_eq!(engine.state().distraction_count, 0);
    }

    #[test]
    fn interaction_never_exceeds_cap() {
        let mut engine = engine();
        for i in 0..10 {
            engine.register_interaction(t(i));
        }
        assert!((engine.state().score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn focus_check_breaches_and_resets() {
        let mut engine = engine();
        // Six distractions bring the score to 40, under the 50 floor.
        for i in 0..6 {
            engine.visibility_changed(true, t(i));
        }
        assert!(engine.check_focus(t(10)));

        let signals = engine.drain_signals();
        let breach = signals
            .iter()
            .filter(|s| matches!(s, FocusSignal::ThresholdBreached(_)))
            .count();
        assert_eq!(breach, 1);

        // Auto-reset after the breach clears history, not only the score.
        assert!((engine.state().score - 100.0).abs() < f64::EPSILON);
        assert_eq!(engine.state().distraction_count, 0);
        assert!(!engine.check_focus(t(11)));
    }

    #[test]
    fn stagnation_decay_engages_only_after_limit() {
        let mut engine = engine();
        engine.tick_engagement(Some(100.0));

        // 30 unchanged ticks are tolerated.
        for _ in 0..STAGNATION_TICK_LIMIT {
            engine.tick_engagement(Some(100.0));
        }
        assert!((engine.state().score - 100.0).abs() < f64::EPSILON);

        // The next unchanged tick starts decaying.
        engine.tick_engagement(Some(100.0));
        assert!((engine.state().score - 95.0).abs() < f64::EPSILON);

        // Movement rewards and resets the stagnation window.
        engine.tick_engagement(Some(400.0));
        assert!((engine.state().score - 97.0).abs() < f64::EPSILON);
        engine.tick_engagement(Some(400.0));
        assert!((engine.state().score - 97.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_reports_elapsed_and_idle_seconds() {
        let mut engine = engine();
        engine.handle_event(&activity_event(t(10)));
        let snapshot = engine.snapshot(t(25));
        assert_eq!(snapshot.session_elapsed_seconds, 25);
        assert_eq!(snapshot.seconds_since_activity, 15);
    }
}
