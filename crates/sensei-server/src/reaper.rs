//! Idle session reaper.
//!
//! Sweeps the registry on a fixed interval and evicts sessions whose
//! `last_activity` is older than the idle threshold: the session leaves
//! both maps atomically, every owned agent handle gets a best-effort
//! shutdown, and the connection is closed through its outbound queue.
//! Sweeps race safely with disconnect-driven teardown.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::interval;

use crate::protocol::OutboundFrame;
use crate::registry::SessionRegistry;

/// Default inactivity threshold: 30 minutes.
pub const DEFAULT_IDLE_AFTER_SECS: u64 = 30 * 60;
/// Default sweep interval: 5 minutes.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    idle_after: Duration,
    sweep_interval: StdDuration,
}

impl IdleReaper {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, idle_after_secs: u64, sweep_interval_secs: u64) -> Self {
        Self {
            registry,
            idle_after: Duration::seconds(idle_after_secs as i64),
            sweep_interval: StdDuration::from_secs(sweep_interval_secs.max(1)),
        }
    }

    /// Sweep forever at the configured interval.
    pub async fn run(&self) {
        let mut ticker = interval(self.sweep_interval);
        // The first tick completes immediately; a sweep at startup is
        // harmless.
        loop {
            ticker.tick().await;
            let reaped = self.sweep(Utc::now()).await;
            if reaped > 0 {
                log::info!("reaped {reaped} idle sessions");
            }
        }
    }

    /// Evict every session idle past the threshold as of `now`. Returns
    /// the number of sessions removed by this sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let candidates = self.registry.idle_connections(now, self.idle_after);
        let mut reaped = 0;

        for connection_id in candidates {
            // A session removed by a concurrent disconnect shows up as
            // None here; that sweep entry is a no-op.
            let Some(session) = self.registry.remove(connection_id) else {
                continue;
            };
            log::info!(
                "evicting idle session {connection_id} (learner {}, idle since {})",
                session.learner_id,
                session.last_activity
            );
            let _ = session.outbound.send(OutboundFrame::Close);
            session.agents.shutdown_all().await;
            reaped += 1;
        }

        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::AgentSessionManager;
    use crate::protocol::CommandEnvelope;
    use crate::testing::StubFactory;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn sweep_evicts_only_sessions_past_threshold() {
        let registry = Arc::new(SessionRegistry::new());
        let factory = Arc::new(StubFactory::new());
        let manager = AgentSessionManager::new(registry.clone(), factory.clone());
        let reaper = IdleReaper::new(registry.clone(), DEFAULT_IDLE_AFTER_SECS, 1);

        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let (stale_tx, mut stale_rx) = mpsc::unbounded_channel();
        let (fresh_tx, _fresh_rx) = mpsc::unbounded_channel();
        registry.register(stale, "u1", "learner-1", stale_tx, t(0));
        registry.register(fresh, "u2", "learner-2", fresh_tx, t(0));

        // The stale session owns two agent handles.
        let start = json!({"category": "learning", "action": "start_session"});
        let tutor = json!({"category": "tutor", "input": "hi"});
        let start: CommandEnvelope = serde_json::from_value(start).unwrap();
        let tutor: CommandEnvelope = serde_json::from_value(tutor).unwrap();
        assert!(manager.dispatch(stale, start).await.ok);
        assert!(manager.dispatch(stale, tutor).await.ok);
        // Dispatch touched the clock; age it back past the threshold.
        registry.with_session_mut(stale, |s| s.last_activity = t(0));
        registry.touch(fresh, t(1000));

        // 31 minutes after the stale session's last activity.
        let reaped = reaper.sweep(t(31 * 60)).await;
        assert_eq!(reaped, 1);

        // Gone from both maps; the fresh session is untouched.
        assert!(!registry.contains(stale));
        assert_eq!(registry.learner_connection_count("learner-1"), 0);
        assert!(registry.contains(fresh));

        // Each owned handle received exactly one shutdown call, and the
        // connection was told to close.
        let agents = factory.created_agents();
        assert_eq!(agents.len(), 2);
        for agent in &agents {
            assert_eq!(agent.shutdowns.load(Ordering::SeqCst), 1);
        }
        let mut saw_close = false;
        while let Ok(frame) = stale_rx.try_recv() {
            if matches!(frame, OutboundFrame::Close) {
                saw_close = true;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn sweep_is_idempotent_against_concurrent_removal() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = IdleReaper::new(registry.clone(), 60, 1);

        let conn = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(conn, "u1", "learner-1", tx, t(0));

        // Disconnect handling wins the race.
        let session = registry.remove(conn).unwrap();
        session.agents.shutdown_all().await;

        // The sweep sees nothing to do.
        assert_eq!(reaper.sweep(t(10_000)).await, 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn session_without_handles_reaps_cleanly() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = IdleReaper::new(registry.clone(), 60, 1);

        let conn = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(conn, "u1", "learner-1", tx, t(0));

        assert_eq!(reaper.sweep(t(120)).await, 1);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn failing_agent_shutdown_does_not_block_eviction() {
        let registry = Arc::new(SessionRegistry::new());
        let mut factory = StubFactory::new();
        factory.fail_shutdown = true;
        let factory = Arc::new(factory);
        let manager = AgentSessionManager::new(registry.clone(), factory.clone());
        let reaper = IdleReaper::new(registry.clone(), 60, 1);

        let conn = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(conn, "u1", "learner-1", tx, t(0));
        let start: CommandEnvelope =
            serde_json::from_value(json!({"category": "learning", "action": "start_session"}))
                .unwrap();
        let tutor: CommandEnvelope =
            serde_json::from_value(json!({"category": "tutor", "input": "hi"})).unwrap();
        assert!(manager.dispatch(conn, start).await.ok);
        assert!(manager.dispatch(conn, tutor).await.ok);
        registry.with_session_mut(conn, |s| s.last_activity = t(0));

        assert_eq!(reaper.sweep(t(120)).await, 1);
        // Both shutdowns were attempted despite each failing.
        for agent in factory.created_agents() {
            assert_eq!(agent.shutdowns.load(Ordering::SeqCst), 1);
        }
    }
}
