//! Fire-and-forget focus-event notifications.
//!
//! Monitoring must never block or crash on delivery problems: failures are
//! logged and counted, and the counters expose the channel's health.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One outbound focus event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusNotice {
    pub learner_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub metrics: serde_json::Value,
}

/// Destination for focus notices.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notice.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; callers treat this as
    /// best-effort and must not propagate it into the scoring path.
    async fn notify(&self, notice: &FocusNotice) -> Result<()>;
}

/// Posts notices to the engagement-events endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl HttpNotifier {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Delivery counters: `(delivered, failed)`.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (
            self.delivered.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    async fn post(&self, notice: &FocusNotice) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notice)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("notification endpoint error ({status}): {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    async fn notify(&self, notice: &FocusNotice) -> Result<()> {
        match self.post(notice).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "focus notification for {} not delivered: {e}",
                    notice.learner_id
                );
                Err(e)
            }
        }
    }
}
