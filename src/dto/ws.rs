use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

/// Inbound envelope: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Payload of a `join` message.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinPayload {
    /// Display name; missing or empty falls back to a placeholder.
    #[serde(default)]
    pub username: Option<String>,
}

/// Payload of a `submit_answer` message.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerPayload {
    /// Raw answer value; shape depends on the question type.
    #[schema(value_type = Object)]
    pub answer: Value,
    /// Client-reported submission time, seconds since epoch.
    #[serde(default)]
    pub timestamp: f64,
}

/// A parsed client-to-server message.
#[derive(Debug)]
pub enum ClientMessage {
    /// Join or rejoin the session.
    Join(JoinPayload),
    /// Submit an answer for the participant's current question.
    SubmitAnswer(SubmitAnswerPayload),
    /// Host request to start the quiz.
    StartQuiz,
    /// Host request to end the quiz early.
    EndQuiz,
    /// Keepalive probe.
    Ping,
    /// Recognizably framed message with an unknown type tag.
    Unknown(String),
}

impl ClientMessage {
    /// Parse one inbound text frame. Returns an error for frames that are
    /// not valid envelopes or whose payload does not fit the message type.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        // An omitted payload reads the same as an empty one.
        let payload = match envelope.payload {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        Ok(match envelope.kind.as_str() {
            "join" => ClientMessage::Join(serde_json::from_value(payload)?),
            "submit_answer" => ClientMessage::SubmitAnswer(serde_json::from_value(payload)?),
            "start_quiz" => ClientMessage::StartQuiz,
            "end_quiz" => ClientMessage::EndQuiz,
            "ping" => ClientMessage::Ping,
            other => ClientMessage::Unknown(other.to_owned()),
        })
    }
}

/// Wire shape of a question pushed to clients. Correctness fields never
/// appear here; they are only revealed after the question closes.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionBody {
    /// Question identifier within the quiz.
    pub id: String,
    /// Prompt text.
    pub question: String,
    /// Question type tag.
    #[serde(rename = "questionType")]
    pub question_type: String,
    /// Choice labels for choice-based questions.
    pub options: Vec<String>,
    /// Draggable item labels, when the type uses them.
    #[serde(rename = "dragItems")]
    pub drag_items: Option<Vec<String>>,
    /// Drop target labels, when the type uses them.
    #[serde(rename = "dropTargets")]
    pub drop_targets: Option<Vec<String>>,
    /// Illustration URL, if any.
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// A question paired with its position and remaining time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    /// The sanitized question body.
    pub question: QuestionBody,
    /// Zero-based position in the quiz.
    pub index: usize,
    /// Total number of questions.
    pub total: usize,
    /// Seconds left on the question clock.
    pub time_remaining: u64,
}

/// Roster broadcast sent whenever the participant list changes.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionUpdatePayload {
    /// Lifecycle status string.
    pub status: String,
    /// Number of participants in the roster.
    pub participant_count: usize,
    /// Roster in join order.
    pub participants: Vec<super::session::ParticipantView>,
}

/// Full state snapshot sent to a connection after it joins.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatePayload {
    /// Shareable join code.
    pub session_code: String,
    /// Identifier of the quiz being played.
    pub quiz_id: String,
    /// Display title of the quiz.
    pub quiz_title: String,
    /// Host identity.
    pub host_id: String,
    /// Lifecycle status string.
    pub status: String,
    /// Session-wide question pointer, -1 before start.
    pub current_question_index: i64,
    /// Total number of questions.
    pub total_questions: usize,
    /// Roster in join order.
    pub participants: Vec<super::session::ParticipantView>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

/// Per-submitter acknowledgement of an accepted answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResultPayload {
    /// Whether the answer matched.
    pub is_correct: bool,
    /// Points awarded for this answer.
    pub points: i64,
    /// The correct answer value.
    #[schema(value_type = Object)]
    pub correct_answer: Value,
    /// Submitter's cumulative score after the award.
    pub new_total_score: i64,
}

/// One row of a ranking table.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankingRow {
    /// 1-based rank.
    pub rank: usize,
    /// Participant identity.
    pub participant_id: String,
    /// Display name.
    pub username: String,
    /// Cumulative score.
    pub score: i64,
    /// Number of questions answered so far.
    pub answered_count: usize,
    /// Fraction of answered questions that were correct, final results only.
    pub accuracy: Option<f64>,
}

/// Host-only standings update.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardUpdatePayload {
    /// Current standings, best first.
    pub rankings: Vec<RankingRow>,
    /// Answer distribution for the just-closed question, reveal only.
    pub answer_distribution: Option<BTreeMap<String, u64>>,
}

/// Per-participant reveal sent after a question closes.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerFeedbackPayload {
    /// Whether this participant answered correctly.
    pub is_correct: bool,
    /// Points this participant earned on the question.
    pub points_earned: i64,
    /// The correct answer value.
    #[schema(value_type = Object)]
    pub correct_answer: Value,
    /// This participant's cumulative score.
    pub your_score: i64,
    /// How submissions were distributed over answers.
    pub answer_distribution: BTreeMap<String, u64>,
}

/// Final standings broadcast at quiz completion.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizCompletedPayload {
    /// Final rankings with accuracy.
    pub final_rankings: Vec<RankingRow>,
}

/// Error frame for a single connection.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
}

/// A server-to-client message, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Roster change broadcast.
    SessionUpdate(SessionUpdatePayload),
    /// Post-join state snapshot.
    SessionState(SessionStatePayload),
    /// Question push.
    Question(QuestionView),
    /// Connection-scoped error.
    Error(ErrorPayload),
    /// Accepted-answer acknowledgement.
    AnswerResult(AnswerResultPayload),
    /// Host-only standings.
    LeaderboardUpdate(LeaderboardUpdatePayload),
    /// Per-participant reveal.
    AnswerFeedback(AnswerFeedbackPayload),
    /// Quiz start broadcast.
    QuizStarted,
    /// Final results broadcast.
    QuizCompleted(QuizCompletedPayload),
    /// Keepalive reply.
    Pong,
}

impl ServerMessage {
    /// Build an [`ServerMessage::Error`] from anything displayable.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_join_with_username() {
        let parsed =
            ClientMessage::from_json_str(r#"{"type":"join","payload":{"username":"Ada"}}"#)
                .unwrap();
        match parsed {
            ClientMessage::Join(payload) => assert_eq!(payload.username.as_deref(), Some("Ada")),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_join_without_payload() {
        let parsed = ClientMessage::from_json_str(r#"{"type":"join"}"#).unwrap();
        match parsed {
            ClientMessage::Join(payload) => assert!(payload.username.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_submit_answer() {
        let raw = r#"{"type":"submit_answer","payload":{"answer":2,"timestamp":1700000000.5}}"#;
        let parsed = ClientMessage::from_json_str(raw).unwrap();
        match parsed {
            ClientMessage::SubmitAnswer(payload) => {
                assert_eq!(payload.answer, json!(2));
                assert_eq!(payload.timestamp, 1_700_000_000.5);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_preserved() {
        let parsed = ClientMessage::from_json_str(r#"{"type":"dance","payload":{}}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Unknown(kind) if kind == "dance"));
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(ClientMessage::from_json_str("not json").is_err());
        assert!(ClientMessage::from_json_str(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn server_message_uses_adjacent_tagging() {
        let message = ServerMessage::error("boom");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"type": "error", "payload": {"message": "boom"}}));
    }

    #[test]
    fn unit_variants_serialize_without_payload() {
        let value = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(value, json!({"type": "pong"}));
    }

    #[test]
    fn question_body_skips_absent_extras() {
        let body = QuestionBody {
            id: "q1".into(),
            question: "What is 2 + 2?".into(),
            question_type: "multiple-choice".into(),
            options: vec!["3".into(), "4".into()],
            drag_items: None,
            drop_targets: None,
            image_url: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("dragItems").is_none());
        assert!(value.get("correctAnswer").is_none());
        assert_eq!(value["questionType"], "multiple-choice");
    }
}
