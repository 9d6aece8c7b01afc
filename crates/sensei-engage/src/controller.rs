//! Engagement session controller
//!
//! [`EngagementSession`] wires one scoring engine and its three trackers
//! behind a sensitivity preset; it is a plain state machine driven by the
//! embedding surface. [`EngagementMonitor`] owns the timer loop and routes
//! engine signals to the notification collaborator.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sensei_integrations::{FocusNotice, NotificationSink};
use tokio::time::interval;

use crate::preset::Sensitivity;
use crate::scoring::{FocusEngine, FocusSignal, FocusSnapshot};
use crate::tracker::{KeyboardTracker, PointerTracker, ScrollTracker};

/// Seconds between metrics polls in the monitor loop.
const METRICS_POLL_SECS: u64 = 5;

/// One monitored surface: engine + trackers behind a preset.
pub struct EngagementSession {
    engine: FocusEngine,
    pointer: PointerTracker,
    keyboard: KeyboardTracker,
    scroll: ScrollTracker,
    focus_check_interval_secs: u32,
    last_focus_check: Option<DateTime<Utc>>,
    last_scroll_offset: Option<f64>,
    intervention_pending: bool,
    running: bool,
}

impl EngagementSession {
    /// Create a stopped session with the preset's thresholds.
    #[must_use]
    pub fn new(sensitivity: Sensitivity, now: DateTime<Utc>) -> Self {
        Self {
            engine: FocusEngine::new(
                sensitivity.idle_threshold_secs(),
                sensitivity.distraction_threshold(),
                now,
            ),
            pointer: PointerTracker::new(),
            keyboard: KeyboardTracker::new(),
            scroll: ScrollTracker::new(),
            focus_check_interval_secs: 1,
            last_focus_check: None,
            last_scroll_offset: None,
            intervention_pending: false,
            running: false,
        }
    }

    /// Override the focus-check cadence (default 1s).
    #[must_use]
    pub fn with_focus_check_interval(mut self, secs: u32) -> Self {
        self.focus_check_interval_secs = secs.max(1);
        self
    }

    /// Start monitoring. Trackers are disposable: a restart gets fresh
    /// instances rather than reusing stopped ones. Safe to call repeatedly.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.running {
            return;
        }
        self.pointer = PointerTracker::new();
        self.keyboard = KeyboardTracker::new();
        self.scroll = ScrollTracker::new();
        self.pointer.start();
        self.keyboard.start(now);
        self.scroll.start(now);
        self.running = true;
    }

    /// Stop all trackers. Safe to call repeatedly or before `start()`.
    pub fn stop(&mut self) {
        self.pointer.stop();
        self.keyboard.stop();
        self.scroll.stop();
        self.running = false;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64, now: DateTime<Utc>) {
        for event in self.pointer.observe(x, y, now) {
            self.engine.handle_event(&event);
        }
    }

    pub fn key_pressed(&mut self, now: DateTime<Utc>) {
        for event in self.keyboard.observe(now) {
            self.engine.handle_event(&event);
        }
    }

    pub fn scrolled(&mut self, offset: f64, now: DateTime<Utc>) {
        self.last_scroll_offset = Some(offset);
        for event in self.scroll.observe(offset, now) {
            self.engine.handle_event(&event);
        }
    }

    pub fn visibility_changed(&mut self, hidden: bool, now: DateTime<Utc>) {
        self.engine.visibility_changed(hidden, now);
    }

    /// One second of wall clock: drive the idle polls, the engagement
    /// timer, and (at its own cadence) the focus check. Returns the
    /// signals raised since the previous tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FocusSignal> {
        if !self.running {
            return Vec::new();
        }

        if let Some(event) = self.keyboard.poll_idle(now) {
            self.engine.handle_event(&event);
        }
        if let Some(event) = self.scroll.poll_idle(now) {
            self.engine.handle_event(&event);
        }

        self.engine.tick_engagement(self.last_scroll_offset);

        let check_due = self.last_focus_check.map_or(true, |last| {
            (now - last).num_seconds() >= i64::from(self.focus_check_interval_secs)
        });
        if check_due {
            if self.engine.check_focus(now) {
                self.intervention_pending = true;
            }
            self.last_focus_check = Some(now);
        }

        self.engine.drain_signals()
    }

    /// Learner resumed: reset the engine and clear the intervention flag.
    pub fn resume_learning(&mut self, now: DateTime<Utc>) {
        self.engine.reset_focus(now);
        self.intervention_pending = false;
    }

    /// Forwarded external interaction, e.g. break-game acknowledged.
    pub fn register_interaction(&mut self, now: DateTime<Utc>) {
        self.engine.register_interaction(now);
    }

    #[must_use]
    pub const fn intervention_pending(&self) -> bool {
        self.intervention_pending
    }

    #[must_use]
    pub fn metrics(&self, now: DateTime<Utc>) -> FocusSnapshot {
        self.engine.snapshot(now)
    }
}

/// Async wrapper that owns the timer loop for one [`EngagementSession`]
/// and forwards its signals to the notification collaborator.
pub struct EngagementMonitor {
    learner_id: String,
    session: Arc<Mutex<EngagementSession>>,
    notifier: Arc<dyn NotificationSink>,
    shutdown: Arc<AtomicBool>,
}

impl Clone for EngagementMonitor {
    fn clone(&self) -> Self {
        Self {
            learner_id: self.learner_id.clone(),
            session: self.session.clone(),
            notifier: self.notifier.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl EngagementMonitor {
    #[must_use]
    pub fn new(
        learner_id: impl Into<String>,
        sensitivity: Sensitivity,
        notifier: Arc<dyn NotificationSink>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id: learner_id.into(),
            session: Arc::new(Mutex::new(EngagementSession::new(sensitivity, now))),
            notifier,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run until [`Self::shutdown`] is called: 1s engine tick plus a 5s
    /// metrics poll.
    pub async fn run(&self) {
        self.session.lock().unwrap().start(Utc::now());
        let mut tick = interval(Duration::from_secs(1));
        let mut metrics_poll = interval(Duration::from_secs(METRICS_POLL_SECS));
        log::info!("engagement monitor started for {}", self.learner_id);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for notice in self.collect_notices(Utc::now()) {
                        let notifier = self.notifier.clone();
                        tokio::spawn(async move {
                            // Best-effort: the sink logs its own failures.
                            let _ = notifier.notify(&notice).await;
                        });
                    }
                }
                _ = metrics_poll.tick() => {
                    let snapshot = self.snapshot(Utc::now());
                    log::debug!(
                        "focus {} score={:.1} distractions={}",
                        self.learner_id,
                        snapshot.score,
                        snapshot.distraction_count
                    );
                }
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
        }

        self.session.lock().unwrap().stop();
        log::info!("engagement monitor stopped for {}", self.learner_id);
    }

    /// Advance the session one tick and convert its signals to notices.
    fn collect_notices(&self, now: DateTime<Utc>) -> Vec<FocusNotice> {
        let signals = self.session.lock().unwrap().tick(now);
        signals
            .into_iter()
            .map(|signal| match signal {
                FocusSignal::Distraction(entry) => FocusNotice {
                    learner_id: self.learner_id.clone(),
                    kind: entry.kind.as_str().to_string(),
                    metrics: serde_json::to_value(&entry).unwrap_or_default(),
                },
                FocusSignal::ThresholdBreached(snapshot) => FocusNotice {
                    learner_id: self.learner_id.clone(),
                    kind: "focus_threshold".to_string(),
                    metrics: serde_json::to_value(&snapshot).unwrap_or_default(),
                },
            })
            .collect()
    }

    pub fn resume_learning(&self) {
        self.session.lock().unwrap().resume_learning(Utc::now());
    }

    pub fn register_interaction(&self) {
        self.session.lock().unwrap().register_interaction(Utc::now());
    }

    #[must_use]
    pub fn intervention_pending(&self) -> bool {
        self.session.lock().unwrap().intervention_pending()
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> FocusSnapshot {
        self.session.lock().unwrap().metrics(now)
    }

    /// Direct access for surfaces that feed samples in.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<EngagementSession>> {
        self.session.clone()
    }

    /// Request the run loop to stop. Safe to call multiple times.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
