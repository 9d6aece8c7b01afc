//! Agent capability traits and the per-session agent set.
//!
//! Agents are external black boxes invoked by capability category. A
//! session lazily constructs at most one handle per category through an
//! [`AgentFactory`] and owns it until teardown: whoever creates a handle
//! is responsible for shutting it down.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Agent capability categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    Learning,
    Tutor,
    Speech,
}

impl AgentCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Tutor => "tutor",
            Self::Speech => "speech",
        }
    }
}

/// Outcome of processing a learner's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// Agent feedback passed through to the caller.
    pub feedback: serde_json::Value,
    /// Whether the agent adapted the content in response.
    #[serde(default)]
    pub adapted: bool,
}

/// A tutoring reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorReply {
    pub message: String,
    /// Set when the agent detected fatigue or frustration.
    #[serde(default)]
    pub fatigue_detected: bool,
}

/// Metadata accompanying a speech-analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechTask {
    pub task_type: String,
    #[serde(default)]
    pub target_text: Option<String>,
    #[serde(default)]
    pub child_age: Option<u8>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// Adaptive-learning agent operations.
#[async_trait]
pub trait LearningAgent: Send + Sync {
    /// Process a learner's answer for an activity.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent invocation fails.
    async fn process_answer(
        &self,
        activity_id: &str,
        answer: &serde_json::Value,
        context: Option<&serde_json::Value>,
    ) -> Result<AnswerOutcome>;

    /// Fetch the next content recommendation.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent invocation fails.
    async fn recommend(&self, context: Option<&serde_json::Value>) -> Result<serde_json::Value>;

    /// Release agent-side resources. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be shut down cleanly.
    async fn shutdown(&self) -> Result<()>;
}

/// Conversational tutoring agent operations.
#[async_trait]
pub trait TutorAgent: Send + Sync {
    /// Respond to free-form learner input with activity/question context.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent invocation fails.
    async fn respond(
        &self,
        input: &str,
        current_activity: Option<&str>,
        current_question: Option<&str>,
    ) -> Result<TutorReply>;

    /// Release agent-side resources. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be shut down cleanly.
    async fn shutdown(&self) -> Result<()>;
}

/// Speech-analysis agent operations.
#[async_trait]
pub trait SpeechAgent: Send + Sync {
    /// Analyze a decoded audio payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent invocation fails.
    async fn analyze(&self, audio: &[u8], task: &SpeechTask) -> Result<serde_json::Value>;

    /// Release agent-side resources. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be shut down cleanly.
    async fn shutdown(&self) -> Result<()>;
}

/// Creates agent handles for a learner, one per category.
pub trait AgentFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the handle cannot be constructed.
    fn create_learning(&self, learner_id: &str) -> Result<Arc<dyn LearningAgent>>;

    /// # Errors
    ///
    /// Returns an error if the handle cannot be constructed.
    fn create_tutor(&self, learner_id: &str) -> Result<Arc<dyn TutorAgent>>;

    /// # Errors
    ///
    /// Returns an error if the handle cannot be constructed.
    fn create_speech(&self, learner_id: &str) -> Result<Arc<dyn SpeechAgent>>;
}

/// The agent handles owned by one session.
///
/// One optional slot per category makes "at most one handle per category"
/// structural rather than a runtime invariant.
#[derive(Default)]
pub struct AgentSet {
    learning: Option<Arc<dyn LearningAgent>>,
    tutor: Option<Arc<dyn TutorAgent>>,
    speech: Option<Arc<dyn SpeechAgent>>,
}

impl AgentSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the learning handle, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory fails.
    pub fn learning(
        &mut self,
        factory: &dyn AgentFactory,
        learner_id: &str,
    ) -> Result<Arc<dyn LearningAgent>> {
        if let Some(handle) = &self.learning {
            return Ok(handle.clone());
        }
        let handle = factory.create_learning(learner_id)?;
        log::debug!("created learning agent for {learner_id}");
        self.learning = Some(handle.clone());
        Ok(handle)
    }

    /// Get the tutor handle, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory fails.
    pub fn tutor(
        &mut self,
        factory: &dyn AgentFactory,
        learner_id: &str,
    ) -> Result<Arc<dyn TutorAgent>> {
        if let Some(handle) = &self.tutor {
            return Ok(handle.clone());
        }
        let handle = factory.create_tutor(learner_id)?;
        log::debug!("created tutor agent for {learner_id}");
        self.tutor = Some(handle.clone());
        Ok(handle)
    }

    /// Get the speech handle, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory fails.
    pub fn speech(
        &mut self,
        factory: &dyn AgentFactory,
        learner_id: &str,
    ) -> Result<Arc<dyn SpeechAgent>> {
        if let Some(handle) = &self.speech {
            return Ok(handle.clone());
        }
        let handle = factory.create_speech(learner_id)?;
        log::debug!("created speech agent for {learner_id}");
        self.speech = Some(handle.clone());
        Ok(handle)
    }

    /// Number of handles currently owned.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        usize::from(self.learning.is_some())
            + usize::from(self.tutor.is_some())
            + usize::from(self.speech.is_some())
    }

    /// Shut down every owned handle, best-effort: a failure on one never
    /// prevents attempting the others.
    pub async fn shutdown_all(&self) {
        if let Some(handle) = &self.learning {
            if let Err(e) = handle.shutdown().await {
                log::warn!("learning agent shutdown failed: {e}");
            }
        }
        if let Some(handle) = &self.tutor {
            if let Err(e) = handle.shutdown().await {
                log::warn!("tutor agent shutdown failed: {e}");
            }
        }
        if let Some(handle) = &self.speech {
            if let Err(e) = handle.shutdown().await {
                log::warn!("speech agent shutdown failed: {e}");
            }
        }
    }
}
