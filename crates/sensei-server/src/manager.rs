//! Command dispatch and per-session agent ownership.
//!
//! Handles are created lazily on first use of a category and cached on the
//! session; construction happens inside the registry critical section
//! (synchronous), the invocation itself outside any lock. An error from a
//! handle is caught, logged, and surfaced as an error result - it never
//! terminates the connection or affects other sessions.

use std::sync::Arc;

use base64::prelude::*;
use chrono::Utc;
use sensei_agents::{AgentFactory, LearningAgent, SpeechAgent, SpeechTask, TutorAgent};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::protocol::{
    Command, CommandEnvelope, CommandResponse, LearningAction, OutboundFrame, ServerEvent,
};
use crate::registry::SessionRegistry;

/// Why a command was answered with an error result.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown connection")]
    UnknownConnection,
    #[error("unknown action for this category")]
    UnknownAction,
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("agent invocation failed: {0}")]
    Agent(String),
}

/// Routes typed commands to the owning session's agent handles.
pub struct AgentSessionManager {
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn AgentFactory>,
    broadcaster: Broadcaster,
}

impl AgentSessionManager {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, factory: Arc<dyn AgentFactory>) -> Self {
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            registry,
            factory,
            broadcaster,
        }
    }

    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Execute one command envelope and build the correlated response.
    pub async fn dispatch(&self, connection_id: Uuid, envelope: CommandEnvelope) -> CommandResponse {
        let id = envelope.id;
        match self.execute(connection_id, envelope.command).await {
            Ok(result) => CommandResponse::success(id, result),
            Err(e) => {
                log::warn!("command on connection {connection_id} failed: {e}");
                CommandResponse::failure(id, e.to_string())
            }
        }
    }

    async fn execute(&self, connection_id: Uuid, command: Command) -> Result<Value, CommandError> {
        match command {
            Command::Learning {
                action,
                activity_id,
                answer,
                context,
            } => match action {
                LearningAction::Unknown => Err(CommandError::UnknownAction),
                LearningAction::StartSession => {
                    let (learner_id, _handle) = self.learning_handle(connection_id)?;
                    Ok(json!({ "status": "started", "learner_id": learner_id }))
                }
                LearningAction::ProcessAnswer => {
                    let activity_id = activity_id
                        .ok_or_else(|| CommandError::Payload("activity_id is required".into()))?;
                    let answer = answer
                        .ok_or_else(|| CommandError::Payload("answer is required".into()))?;
                    let (_learner_id, handle) = self.learning_handle(connection_id)?;
                    let outcome = handle
                        .process_answer(&activity_id, &answer, context.as_ref())
                        .await
                        .map_err(|e| CommandError::Agent(e.to_string()))?;

                    if outcome.adapted {
                        // Adaptation concerns only the surface that sent
                        // the answer, not the learner's other devices.
                        self.send_to_origin(
                            connection_id,
                            ServerEvent::ContentAdapted(json!({
                                "activity_id": activity_id,
                                "feedback": outcome.feedback.clone(),
                            })),
                        );
                    }
                    serde_json::to_value(&outcome).map_err(|e| CommandError::Agent(e.to_string()))
                }
                LearningAction::GetRecommendation => {
                    let (_learner_id, handle) = self.learning_handle(connection_id)?;
                    handle
                        .recommend(context.as_ref())
                        .await
                        .map_err(|e| CommandError::Agent(e.to_string()))
                }
            },
            Command::Tutor {
                input,
                current_activity,
                current_question,
            } => {
                let (learner_id, handle) = self.tutor_handle(connection_id)?;
                let reply = handle
                    .respond(
                        &input,
                        current_activity.as_deref(),
                        current_question.as_deref(),
                    )
                    .await
                    .map_err(|e| CommandError::Agent(e.to_string()))?;

                self.broadcaster.broadcast(
                    &learner_id,
                    &ServerEvent::TutorMessage(json!({ "message": reply.message.clone() })),
                );
                if reply.fatigue_detected {
                    self.broadcaster.broadcast(
                        &learner_id,
                        &ServerEvent::BreakSuggested(json!({ "reason": "fatigue" })),
                    );
                }
                serde_json::to_value(&reply).map_err(|e| CommandError::Agent(e.to_string()))
            }
            Command::Speech {
                audio,
                task_type,
                target_text,
                child_age,
                sample_rate,
            } => {
                let audio = BASE64_STANDARD
                    .decode(audio.as_bytes())
                    .map_err(|e| CommandError::Payload(format!("audio is not valid base64: {e}")))?;
                let task = SpeechTask {
                    task_type,
                    target_text,
                    child_age,
                    sample_rate,
                };
                let (_learner_id, handle) = self.speech_handle(connection_id)?;
                handle
                    .analyze(&audio, &task)
                    .await
                    .map_err(|e| CommandError::Agent(e.to_string()))
            }
        }
    }

    fn learning_handle(
        &self,
        connection_id: Uuid,
    ) -> Result<(String, Arc<dyn LearningAgent>), CommandError> {
        let now = Utc::now();
        self.registry
            .with_session_mut(connection_id, |session| {
                session.last_activity = now;
                let learner_id = session.learner_id.clone();
                session
                    .agents
                    .learning(self.factory.as_ref(), &learner_id)
                    .map(|handle| (learner_id, handle))
            })
            .ok_or(CommandError::UnknownConnection)?
            .map_err(|e| CommandError::Agent(e.to_string()))
    }

    fn tutor_handle(
        &self,
        connection_id: Uuid,
    ) -> Result<(String, Arc<dyn TutorAgent>), CommandError> {
        let now = Utc::now();
        self.registry
            .with_session_mut(connection_id, |session| {
                session.last_activity = now;
                let learner_id = session.learner_id.clone();
                session
                    .agents
                    .tutor(self.factory.as_ref(), &learner_id)
                    .map(|handle| (learner_id, handle))
            })
            .ok_or(CommandError::UnknownConnection)?
            .map_err(|e| CommandError::Agent(e.to_string()))
    }

    fn speech_handle(
        &self,
        connection_id: Uuid,
    ) -> Result<(String, Arc<dyn SpeechAgent>), CommandError> {
        let now = Utc::now();
        self.registry
            .with_session_mut(connection_id, |session| {
                session.last_activity = now;
                let learner_id = session.learner_id.clone();
                session
                    .agents
                    .speech(self.factory.as_ref(), &learner_id)
                    .map(|handle| (learner_id, handle))
            })
            .ok_or(CommandError::UnknownConnection)?
            .map_err(|e| CommandError::Agent(e.to_string()))
    }

    fn send_to_origin(&self, connection_id: Uuid, event: ServerEvent) {
        self.registry.with_session_mut(connection_id, |session| {
            let _ = session.outbound.send(OutboundFrame::Event(event));
        });
    }
}
