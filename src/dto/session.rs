use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::format_timestamp,
    state::session::{Participant, Session},
};

/// Request body for creating a live session.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSessionRequest {
    /// Identifier of the quiz to play.
    #[validate(length(min = 1, message = "quiz_id must not be empty"))]
    pub quiz_id: String,
    /// Identity of the host creating the session.
    #[validate(length(min = 1, message = "host_id must not be empty"))]
    pub host_id: String,
}

/// Response body after a session is created.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCreatedResponse {
    /// Shareable join code.
    pub session_code: String,
    /// Seconds until the waiting session expires.
    pub expires_in: u64,
    /// Absolute expiry timestamp, RFC 3339.
    pub expires_at: String,
}

/// Roster view of one participant, the shape embedded in session payloads.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    /// Participant identity.
    pub participant_id: String,
    /// Display name.
    pub username: String,
    /// Cumulative score.
    pub score: i64,
    /// Whether a live channel is attached.
    pub connected: bool,
    /// Number of questions answered so far.
    pub answered_count: usize,
}

impl From<&Participant> for ParticipantView {
    fn from(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id.clone(),
            username: participant.username.clone(),
            score: participant.score,
            connected: participant.connected,
            answered_count: participant.answers.len(),
        }
    }
}

/// Response body for the session info endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfoResponse {
    /// Shareable join code.
    pub session_code: String,
    /// Identifier of the quiz being played.
    pub quiz_id: String,
    /// Display title of the quiz.
    pub quiz_title: String,
    /// Host identity.
    pub host_id: String,
    /// Lifecycle status, `waiting`, `active` or `completed`.
    pub status: String,
    /// Session-wide question pointer, -1 before start.
    pub current_question_index: i64,
    /// Total number of questions in the quiz.
    pub total_questions: usize,
    /// Number of participants in the roster.
    pub participant_count: usize,
    /// Roster in join order.
    pub participants: Vec<ParticipantView>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
}

impl From<&Session> for SessionInfoResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_code: session.code.clone(),
            quiz_id: session.quiz_id.clone(),
            quiz_title: session.quiz_title.clone(),
            host_id: session.host_id.clone(),
            status: session.status.as_str().to_owned(),
            current_question_index: session.current_question_index,
            total_questions: session.total_questions,
            participant_count: session.participants.len(),
            participants: session.participants.values().map(Into::into).collect(),
            created_at: format_timestamp(session.created_at),
        }
    }
}
