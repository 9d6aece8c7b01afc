//! HTTP-backed agent handles against the external agent service.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::agent::{
    AgentFactory, AnswerOutcome, LearningAgent, SpeechAgent, SpeechTask, TutorAgent, TutorReply,
};

async fn post_json(
    client: &Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to reach agent service at {url}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("agent service error ({status}): {error_text}");
    }

    response
        .json()
        .await
        .context("failed to parse agent service response")
}

/// Learning agent backed by the agent service.
pub struct RemoteLearningAgent {
    client: Client,
    base_url: String,
    learner_id: String,
}

#[async_trait]
impl LearningAgent for RemoteLearningAgent {
    async fn process_answer(
        &self,
        activity_id: &str,
        answer: &serde_json::Value,
        context: Option<&serde_json::Value>,
    ) -> Result<AnswerOutcome> {
        let url = format!("{}/learning/answer", self.base_url);
        let body = json!({
            "learner_id": self.learner_id,
            "activity_id": activity_id,
            "answer": answer,
            "context": context,
        });
        let value = post_json(&self.client, &url, &body).await?;
        serde_json::from_value(value).context("malformed answer outcome")
    }

    async fn recommend(&self, context: Option<&serde_json::Value>) -> Result<serde_json::Value> {
        let url = format!("{}/learning/recommendation", self.base_url);
        let body = json!({
            "learner_id": self.learner_id,
            "context": context,
        });
        post_json(&self.client, &url, &body).await
    }

    async fn shutdown(&self) -> Result<()> {
        let url = format!("{}/learning/close", self.base_url);
        let body = json!({ "learner_id": self.learner_id });
        post_json(&self.client, &url, &body).await.map(|_| ())
    }
}

/// Tutor agent backed by the agent service.
pub struct RemoteTutorAgent {
    client: Client,
    base_url: String,
    learner_id: String,
}

#[async_trait]
impl TutorAgent for RemoteTutorAgent {
    async fn respond(
        &self,
        input: &str,
        current_activity: Option<&str>,
        current_question: Option<&str>,
    ) -> Result<TutorReply> {
        let url = format!("{}/tutor/respond", self.base_url);
        let body = json!({
            "learner_id": self.learner_id,
            "input": input,
            "current_activity": current_activity,
            "current_question": current_question,
        });
        let value = post_json(&self.client, &url, &body).await?;
        serde_json::from_value(value).context("malformed tutor reply")
    }

    async fn shutdown(&self) -> Result<()> {
        let url = format!("{}/tutor/close", self.base_url);
        let body = json!({ "learner_id": self.learner_id });
        post_json(&self.client, &url, &body).await.map(|_| ())
    }
}

/// Speech-analysis agent backed by the agent service.
pub struct RemoteSpeechAgent {
    client: Client,
    base_url: String,
    learner_id: String,
}

#[async_trait]
impl SpeechAgent for RemoteSpeechAgent {
    async fn analyze(&self, audio: &[u8], task: &SpeechTask) -> Result<serde_json::Value> {
        let url = format!("{}/speech/analyze", self.base_url);
        // The service accepts raw sample bytes as an array; metadata rides
        // alongside.
        let body = json!({
            "learner_id": self.learner_id,
            "audio": audio,
            "task_type": task.task_type,
            "target_text": task.target_text,
            "child_age": task.child_age,
            "sample_rate": task.sample_rate,
        });
        post_json(&self.client, &url, &body).await
    }

    async fn shutdown(&self) -> Result<()> {
        let url = format!("{}/speech/close", self.base_url);
        let body = json!({ "learner_id": self.learner_id });
        post_json(&self.client, &url, &body).await.map(|_| ())
    }
}

/// Factory producing service-backed handles that share one HTTP client.
pub struct AgentServiceFactory {
    client: Client,
    base_url: String,
}

impl AgentServiceFactory {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl AgentFactory for AgentServiceFactory {
    fn create_learning(&self, learner_id: &str) -> Result<Arc<dyn LearningAgent>> {
        Ok(Arc::new(RemoteLearningAgent {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            learner_id: learner_id.to_string(),
        }))
    }

    fn create_tutor(&self, learner_id: &str) -> Result<Arc<dyn TutorAgent>> {
        Ok(Arc::new(RemoteTutorAgent {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            learner_id: learner_id.to_string(),
        }))
    }

    fn create_speech(&self, learner_id: &str) -> Result<Arc<dyn SpeechAgent>> {
        Ok(Arc::new(RemoteSpeechAgent {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            learner_id: learner_id.to_string(),
        }))
    }
}
