//! Wire protocol for real-time connections.
//!
//! Frames are newline-delimited JSON. The first inbound frame must be a
//! [`Handshake`]; afterwards the client sends [`CommandEnvelope`]s and
//! receives correlated [`CommandResponse`]s plus server-pushed
//! [`ServerEvent`]s.
//!
//! Commands are a closed tagged union so that every category and action is
//! matched exhaustively; an unrecognized action name still deserializes
//! (to [`LearningAction::Unknown`]) and is answered with an error result
//! instead of being silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// First frame on every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub token: String,
    /// Target learner; falls back to the token subject when absent.
    #[serde(default)]
    pub learner_id: Option<String>,
}

/// Server answer to a [`Handshake`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeReply {
    #[must_use]
    pub fn accepted(connection_id: Uuid) -> Self {
        Self {
            ok: true,
            connection_id: Some(connection_id),
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            connection_id: None,
            error: Some(error.into()),
        }
    }
}

/// Actions the learning category supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningAction {
    StartSession,
    ProcessAnswer,
    GetRecommendation,
    /// Any action name not in the closed set above.
    #[serde(other)]
    Unknown,
}

/// A typed command, tagged by capability category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Command {
    Learning {
        action: LearningAction,
        #[serde(default)]
        activity_id: Option<String>,
        #[serde(default)]
        answer: Option<Value>,
        #[serde(default)]
        context: Option<Value>,
    },
    Tutor {
        input: String,
        #[serde(default)]
        current_activity: Option<String>,
        #[serde(default)]
        current_question: Option<String>,
    },
    Speech {
        /// Base64-encoded audio payload.
        audio: String,
        task_type: String,
        #[serde(default)]
        target_text: Option<String>,
        #[serde(default)]
        child_age: Option<u8>,
        #[serde(default)]
        sample_rate: Option<u32>,
    },
}

/// Inbound command frame with optional correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: Command,
}

/// Correlated reply to one [`CommandEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Create a successful result
    #[must_use]
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create a failure result
    #[must_use]
    pub fn failure(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Server-pushed side-effect events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "content:adapted")]
    ContentAdapted(Value),
    #[serde(rename = "tutor:message")]
    TutorMessage(Value),
    #[serde(rename = "break:suggested")]
    BreakSuggested(Value),
}

/// Frames queued for a connection's writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    Response(CommandResponse),
    Event(ServerEvent),
    /// Tells the writer to shut the connection down.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn learning_envelope_parses() {
        let frame = json!({
            "id": 7,
            "category": "learning",
            "action": "process_answer",
            "activity_id": "act-1",
            "answer": {"choice": 2}
        });
        let envelope: CommandEnvelope = serde_json::from_value(frame).unwrap();
        assert_eq!(envelope.id, Some(7));
        match envelope.command {
            Command::Learning {
                action,
                activity_id,
                ..
            } => {
                assert_eq!(action, LearningAction::ProcessAnswer);
                assert_eq!(activity_id.as_deref(), Some("act-1"));
            }
            _ => panic!("wrong category"),
        }
    }

    #[test]
    fn unknown_action_deserializes_to_unknown() {
        let frame = json!({"category": "learning", "action": "reticulate_splines"});
        let envelope: CommandEnvelope = serde_json::from_value(frame).unwrap();
        match envelope.command {
            Command::Learning { action, .. } => assert_eq!(action, LearningAction::Unknown),
            _ => panic!("wrong category"),
        }
    }

    #[test]
    fn unknown_category_is_a_parse_error() {
        let frame = json!({"category": "telepathy", "input": "hi"});
        assert!(serde_json::from_value::<CommandEnvelope>(frame).is_err());
    }

    #[test]
    fn events_serialize_with_colon_names() {
        let event = ServerEvent::TutorMessage(json!({"message": "hello"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "tutor:message");
        assert_eq!(value["payload"]["message"], "hello");

        let adapted = ServerEvent::ContentAdapted(json!({}));
        assert_eq!(
            serde_json::to_value(&adapted).unwrap()["event"],
            "content:adapted"
        );
    }

    #[test]
    fn responses_omit_empty_fields() {
        let ok = CommandResponse::success(Some(1), json!({"x": 1}));
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("error").is_none());

        let err = CommandResponse::failure(None, "boom");
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("id").is_none());
        assert!(value.get("result").is_none());
        assert_eq!(value["error"], "boom");
    }
}
