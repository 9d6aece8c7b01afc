//! In-memory session registry.
//!
//! Owns the two shared maps - `connection → AgentSession` and
//! `learner → {connection}` - behind a single mutex. Every operation is a
//! short synchronous critical section with no await inside, so
//! check-then-mutate sequences are atomic and the two teardown paths
//! (client disconnect, idle reaper) race safely: removal hands the session
//! out exactly once and the loser observes `None`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sensei_agents::AgentSet;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::protocol::OutboundFrame;

/// Server-side record binding one live connection to its lazily created
/// agent handles.
pub struct AgentSession {
    pub learner_id: String,
    pub user_id: String,
    pub agents: AgentSet,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub outbound: UnboundedSender<OutboundFrame>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, AgentSession>,
    learners: HashMap<String, HashSet<Uuid>>,
}

/// Registry of live connections and their sessions.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically create the session for a freshly authenticated
    /// connection and index it under its learner.
    pub fn register(
        &self,
        connection_id: Uuid,
        user_id: impl Into<String>,
        learner_id: impl Into<String>,
        outbound: UnboundedSender<OutboundFrame>,
        now: DateTime<Utc>,
    ) {
        let learner_id = learner_id.into();
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(
            connection_id,
            AgentSession {
                learner_id: learner_id.clone(),
                user_id: user_id.into(),
                agents: AgentSet::new(),
                started_at: now,
                last_activity: now,
                outbound,
            },
        );
        inner
            .learners
            .entry(learner_id.clone())
            .or_default()
            .insert(connection_id);
        log::info!("registered connection {connection_id} for learner {learner_id}");
    }

    /// Atomically remove a connection from both maps, returning the owned
    /// session. Idempotent: a second removal observes `None`.
    pub fn remove(&self, connection_id: Uuid) -> Option<AgentSession> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.remove(&connection_id)?;
        if let Some(set) = inner.learners.get_mut(&session.learner_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                inner.learners.remove(&session.learner_id);
            }
        }
        Some(session)
    }

    /// Update a session's activity clock. Returns `false` when the
    /// connection is no longer registered.
    pub fn touch(&self, connection_id: Uuid, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(&connection_id) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Run `f` against the session under the lock. `f` must not block.
    pub fn with_session_mut<R>(
        &self,
        connection_id: Uuid,
        f: impl FnOnce(&mut AgentSession) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.get_mut(&connection_id).map(f)
    }

    /// Outbound queues of every live connection for a learner.
    #[must_use]
    pub fn senders_for(&self, learner_id: &str) -> Vec<UnboundedSender<OutboundFrame>> {
        let inner = self.inner.lock().unwrap();
        let Some(connection_ids) = inner.learners.get(learner_id) else {
            return Vec::new();
        };
        connection_ids
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .map(|session| session.outbound.clone())
            .collect()
    }

    /// Connections whose sessions have been inactive longer than
    /// `idle_after` as of `now`.
    #[must_use]
    pub fn idle_connections(&self, now: DateTime<Utc>, idle_after: Duration) -> Vec<Uuid> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .iter()
            .filter(|(_, session)| now.signed_duration_since(session.last_activity) > idle_after)
            .map(|(id, _)| *id)
            .collect()
    }

    #[must_use]
    pub fn learner_of(&self, connection_id: Uuid) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(&connection_id)
            .map(|session| session.learner_id.clone())
    }

    #[must_use]
    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.inner.lock().unwrap().sessions.contains_key(&connection_id)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    #[must_use]
    pub fn learner_connection_count(&self, learner_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .learners
            .get(learner_id)
            .map_or(0, HashSet::len)
    }
}
