//! Best-effort event fan-out to a learner's live connections.

use std::sync::Arc;

use crate::protocol::{OutboundFrame, ServerEvent};
use crate::registry::SessionRegistry;

/// Routes server events to every connection of a learner.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `event` to each of the learner's connections. Zero live
    /// connections is a silent no-op; each push is independent and no
    /// ordering or delivery guarantee is made across connections.
    ///
    /// Returns the number of queues the event was accepted by.
    pub fn broadcast(&self, learner_id: &str, event: &ServerEvent) -> usize {
        let senders = self.registry.senders_for(learner_id);
        if senders.is_empty() {
            log::debug!("no live connections for learner {learner_id}");
            return 0;
        }

        let mut delivered = 0;
        for sender in senders {
            if sender.send(OutboundFrame::Event(event.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
