//! Input signal trackers
//!
//! Pointer, keyboard and scroll trackers are passive state machines fed raw
//! samples by the embedding surface. They own no timers: the session
//! controller drives the 1-second idle polls. Trackers are disposable - the
//! controller replaces them with fresh instances on restart instead of
//! reusing a stopped one.

use chrono::{DateTime, Utc};

/// Pointer velocity (px/s) above which movement counts as erratic.
pub const ERRATIC_VELOCITY_PX_PER_SEC: f64 = 3000.0;

/// Absolute scroll delta (px) above which a scroll counts as rapid.
pub const RAPID_SCROLL_DELTA_PX: f64 = 800.0;

/// Kinds of events a tracker can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEventKind {
    /// Any raw input was observed.
    Activity,
    /// No input for some duration; magnitude carries the seconds.
    Idle,
    /// Pointer velocity exceeded the erratic threshold.
    Erratic,
    /// Scroll delta exceeded the rapid threshold.
    Rapid,
}

/// An ephemeral tracker event; produced and consumed immediately.
#[derive(Debug, Clone)]
pub struct TrackerEvent {
    pub kind: TrackerEventKind,
    pub timestamp: DateTime<Utc>,
    pub magnitude: Option<f64>,
}

impl TrackerEvent {
    fn activity(timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: TrackerEventKind::Activity,
            timestamp,
            magnitude: None,
        }
    }
}

/// Tracks pointer movement and flags erratic velocity.
#[derive(Debug, Default)]
pub struct PointerTracker {
    started: bool,
    last_sample: Option<(f64, f64, DateTime<Utc>)>,
}

impl PointerTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the tracker. Safe to call repeatedly.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Disarm and forget sample history. Safe to call repeatedly or
    /// without a prior `start()`.
    pub fn stop(&mut self) {
        self.started = false;
        self.last_sample = None;
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Observe a pointer position sample.
    ///
    /// Emits an activity event, plus an erratic event when the
    /// instantaneous velocity from the previous sample exceeds the fixed
    /// threshold.
    pub fn observe(&mut self, x: f64, y: f64, now: DateTime<Utc>) -> Vec<TrackerEvent> {
        if !self.started {
            return Vec::new();
        }

        let mut events = vec![TrackerEvent::activity(now)];

        if let Some((px, py, pt)) = self.last_sample {
            let dt = (now - pt).num_milliseconds() as f64 / 1000.0;
            if dt > 0.0 {
                let distance = ((x - px).powi(2) + (y - py).powi(2)).sqrt();
                let velocity = distance / dt;
                if velocity > ERRATIC_VELOCITY_PX_PER_SEC {
                    events.push(TrackerEvent {
                        kind: TrackerEventKind::Erratic,
                        timestamp: now,
                        magnitude: Some(velocity),
                    });
                }
            }
        }

        self.last_sample = Some((x, y, now));
        events
    }
}

/// Tracks keystrokes and reports per-modality idleness.
#[derive(Debug, Default)]
pub struct KeyboardTracker {
    started: bool,
    last_event_at: Option<DateTime<Utc>>,
}

impl KeyboardTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the tracker, seeding the idle clock. Safe to call repeatedly.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if !self.started {
            self.started = true;
            self.last_event_at = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.started = false;
        self.last_event_at = None;
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Observe a keystroke.
    pub fn observe(&mut self, now: DateTime<Utc>) -> Vec<TrackerEvent> {
        if !self.started {
            return Vec::new();
        }
        self.last_event_at = Some(now);
        vec![TrackerEvent::activity(now)]
    }

    /// 1-second poll: report seconds since the last keystroke.
    pub fn poll_idle(&mut self, now: DateTime<Utc>) -> Option<TrackerEvent> {
        if !self.started {
            return None;
        }
        let last = self.last_event_at?;
        let idle_secs = (now - last).num_seconds().max(0) as f64;
        Some(TrackerEvent {
            kind: TrackerEventKind::Idle,
            timestamp: now,
            magnitude: Some(idle_secs),
        })
    }
}

/// Tracks scroll offsets, flags rapid jumps, and reports idleness.
#[derive(Debug, Default)]
pub struct ScrollTracker {
    started: bool,
    last_offset: Option<f64>,
    last_event_at: Option<DateTime<Utc>>,
}

impl ScrollTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the tracker, seeding the idle clock. Safe to call repeatedly.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if !self.started {
            self.started = true;
            self.last_event_at = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.started = false;
        self.last_offset = None;
        self.last_event_at = None;
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Observe a scroll offset sample.
    ///
    /// Emits an activity event carrying the absolute delta from the
    /// previous offset, plus a rapid event when the delta exceeds the
    /// fixed threshold.
    pub fn observe(&mut self, offset: f64, now: DateTime<Utc>) -> Vec<TrackerEvent> {
        if !self.started {
            return Vec::new();
        }

        let delta = self.last_offset.map(|prev| (offset - prev).abs());
        self.last_offset = Some(offset);
        self.last_event_at = Some(now);

        let mut events = vec![TrackerEvent {
            kind: TrackerEventKind::Activity,
            timestamp: now,
            magnitude: delta,
        }];

        if let Some(delta) = delta {
            if delta > RAPID_SCROLL_DELTA_PX {
                events.push(TrackerEvent {
                    kind: TrackerEventKind::Rapid,
                    timestamp: now,
                    magnitude: Some(delta),
                });
            }
        }

        events
    }

    /// 1-second poll: report seconds since the last scroll event.
    pub fn poll_idle(&mut self, now: DateTime<Utc>) -> Option<TrackerEvent> {
        if !self.started {
            return None;
        }
        let last = self.last_event_at?;
        let idle_secs = (now - last).num_seconds().max(0) as f64;
        Some(TrackerEvent {
            kind: TrackerEventKind::Idle,
            timestamp: now,
            magnitude: Some(idle_secs),
        })
    }
}
