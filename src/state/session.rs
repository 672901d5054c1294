use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::dao::models::QuestionEntity;

/// Lifecycle status of a live session. Transitions are monotonic:
/// `Waiting -> Active -> Completed`, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionStatus {
    /// Session is open for new participants, quiz not started.
    Waiting,
    /// Quiz is in progress; only known participants may reconnect.
    Active,
    /// Quiz has finished; no transition leaves this state.
    Completed,
}

impl SessionStatus {
    /// Wire representation of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

/// Error returned when a status transition would move backward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition: {from:?} -> {to:?}")]
pub struct InvalidStatusTransition {
    /// Status the session was in.
    pub from: SessionStatus,
    /// Rejected target status.
    pub to: SessionStatus,
}

/// One recorded answer submission. At most one exists per question index.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    /// Question the answer belongs to.
    pub question_index: usize,
    /// Raw submitted answer value.
    pub answer: Value,
    /// Client-reported submission timestamp (seconds since epoch).
    pub timestamp: f64,
    /// Whether the canonicalized answer matched the correctness spec.
    pub is_correct: bool,
    /// Points awarded for this answer.
    pub points_earned: i64,
}

/// A participant inside a session. Created on join, never deleted mid-game;
/// disconnection only flips the connectivity flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Caller-supplied identity, unique within the session.
    pub id: String,
    /// Display name chosen at join time.
    pub username: String,
    /// Cumulative score.
    pub score: i64,
    /// Whether a live channel is currently attached.
    pub connected: bool,
    /// Grace-window marker set on disconnect, cleared on reconnect.
    pub disconnected_at: Option<OffsetDateTime>,
    /// Ordered submission history.
    pub answers: Vec<AnswerRecord>,
    /// Self-paced question pointer, independent of the session-wide index.
    pub question_index: usize,
}

impl Participant {
    /// Build a fresh, connected participant with no history.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            score: 0,
            connected: true,
            disconnected_at: None,
            answers: Vec::new(),
            question_index: 0,
        }
    }

    /// Whether an answer is already recorded for `question_index`.
    pub fn has_answered(&self, question_index: usize) -> bool {
        self.answers
            .iter()
            .any(|record| record.question_index == question_index)
    }

    /// The recorded answer for `question_index`, if any.
    pub fn answer_for(&self, question_index: usize) -> Option<&AnswerRecord> {
        self.answers
            .iter()
            .find(|record| record.question_index == question_index)
    }

    /// Number of correct answers in the history.
    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|record| record.is_correct).count()
    }
}

/// Ephemeral state for one live session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Shareable join code.
    pub code: String,
    /// Quiz the session plays.
    pub quiz_id: String,
    /// Display title of the quiz, denormalized at creation.
    pub quiz_title: String,
    /// Host identity; the only identity allowed to start or end the quiz.
    pub host_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Question sequence, copied from storage at creation so an outage mid-game
    /// never stalls grading.
    pub questions: Arc<Vec<QuestionEntity>>,
    /// Session-wide question pointer, -1 before the quiz starts.
    pub current_question_index: i64,
    /// Total number of questions in the quiz.
    pub total_questions: usize,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Absolute expiry deadline (creation + TTL).
    pub expires_at: OffsetDateTime,
    /// Set when the quiz starts.
    pub started_at: Option<OffsetDateTime>,
    /// Set when the quiz completes.
    pub completed_at: Option<OffsetDateTime>,
    /// Start of the current question, basis of elapsed-time scoring.
    pub question_started_at: Option<OffsetDateTime>,
    /// Whether the current question's reveal already ran. The quorum path and
    /// the timeout path race; the first to flip this flag wins.
    pub question_revealed: bool,
    /// Participant roster in join order.
    pub participants: IndexMap<String, Participant>,
}

impl Session {
    /// Build a new session in the waiting state.
    pub fn new(
        code: impl Into<String>,
        quiz_id: impl Into<String>,
        quiz_title: impl Into<String>,
        host_id: impl Into<String>,
        questions: Arc<Vec<QuestionEntity>>,
        now: OffsetDateTime,
        ttl_secs: u64,
    ) -> Self {
        let total_questions = questions.len();
        Self {
            code: code.into(),
            quiz_id: quiz_id.into(),
            quiz_title: quiz_title.into(),
            host_id: host_id.into(),
            status: SessionStatus::Waiting,
            questions,
            current_question_index: -1,
            total_questions,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs as i64),
            started_at: None,
            completed_at: None,
            question_started_at: None,
            question_revealed: false,
            participants: IndexMap::new(),
        }
    }

    /// Whether the absolute TTL has elapsed.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Transition `Waiting -> Active`, initializing the question pointer.
    pub fn start(&mut self, now: OffsetDateTime) -> Result<(), InvalidStatusTransition> {
        if self.status != SessionStatus::Waiting {
            return Err(InvalidStatusTransition {
                from: self.status,
                to: SessionStatus::Active,
            });
        }
        self.status = SessionStatus::Active;
        self.started_at = Some(now);
        self.current_question_index = 0;
        self.question_revealed = false;
        Ok(())
    }

    /// Transition to `Completed`. Idempotent: returns whether the transition
    /// actually happened, the guard against duplicate completion processing.
    pub fn complete(&mut self, now: OffsetDateTime) -> bool {
        if self.status == SessionStatus::Completed {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
        true
    }
}

/// Outcome of a session lookup that distinguishes expiry from absence.
#[derive(Debug)]
pub enum SessionLookup {
    /// Session exists and is live.
    Found(Session),
    /// Session exists but its TTL elapsed before the quiz started.
    Expired,
    /// No such session.
    Missing,
}

/// Key-value store for per-session ephemeral state.
///
/// Mutations run inside `with_session_mut`, which holds the dashmap shard
/// write lock for the duration of the closure: every read-then-write sequence
/// against one session (answer submission, roster changes, index advance) is
/// a single atomic operation with respect to other connections.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session with this code exists, live or not.
    pub fn contains(&self, code: &str) -> bool {
        self.sessions.contains_key(code)
    }

    /// Insert a freshly created session.
    pub fn insert(&self, session: Session) {
        self.sessions.insert(session.code.clone(), session);
    }

    /// Remove a session outright (deferred cleanup path).
    pub fn remove(&self, code: &str) {
        self.sessions.remove(code);
    }

    /// Drop a `Waiting` session past its TTL. An abandoned session never
    /// reaches the completion cleanup path, so the expiry timer purges it
    /// here and frees its join code. Returns whether a removal happened.
    pub fn remove_if_expired_waiting(&self, code: &str, now: OffsetDateTime) -> bool {
        self.sessions
            .remove_if(code, |_, session| {
                session.status == SessionStatus::Waiting && session.is_expired(now)
            })
            .is_some()
    }

    /// Clone the session if it is visible at `now`.
    ///
    /// A `Waiting` session past its TTL is treated as absent; an `Active` or
    /// `Completed` session is never hidden by the TTL (a game in flight is
    /// not killed at the boundary).
    pub fn get(&self, code: &str, now: OffsetDateTime) -> Option<Session> {
        self.sessions
            .get(code)
            .filter(|entry| Self::visible(entry.value(), now))
            .map(|entry| entry.value().clone())
    }

    /// Lookup distinguishing expiry from absence, for callers that surface
    /// the difference (the REST info endpoint).
    pub fn lookup(&self, code: &str, now: OffsetDateTime) -> SessionLookup {
        match self.sessions.get(code) {
            Some(entry) if Self::visible(entry.value(), now) => {
                SessionLookup::Found(entry.value().clone())
            }
            Some(_) => SessionLookup::Expired,
            None => SessionLookup::Missing,
        }
    }

    /// Run `f` against the session under the shard read lock.
    pub fn with_session<T>(
        &self,
        code: &str,
        now: OffsetDateTime,
        f: impl FnOnce(&Session) -> T,
    ) -> Option<T> {
        self.sessions
            .get(code)
            .filter(|entry| Self::visible(entry.value(), now))
            .map(|entry| f(entry.value()))
    }

    /// Run `f` against the session under the shard write lock. The closure is
    /// the unit of atomicity for all correctness-affecting mutations.
    pub fn with_session_mut<T>(
        &self,
        code: &str,
        now: OffsetDateTime,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        let mut entry = self.sessions.get_mut(code)?;
        if !Self::visible(entry.value(), now) {
            return None;
        }
        Some(f(entry.value_mut()))
    }

    fn visible(session: &Session, now: OffsetDateTime) -> bool {
        session.status != SessionStatus::Waiting || !session.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_questions(count: usize) -> Arc<Vec<QuestionEntity>> {
        let questions = (0..count)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "questionText": format!("Question {i}"),
                    "type": "singleMcq",
                    "options": ["a", "b"],
                    "correctAnswerIndex": 0
                }))
                .unwrap()
            })
            .collect();
        Arc::new(questions)
    }

    fn sample_session() -> Session {
        Session::new(
            "ABC123",
            "quiz-1",
            "Sample Quiz",
            "host-1",
            sample_questions(3),
            OffsetDateTime::now_utc(),
            600,
        )
    }

    #[test]
    fn new_session_waits_with_index_before_start() {
        let session = sample_session();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.current_question_index, -1);
        assert!(session.question_started_at.is_none());
    }

    #[test]
    fn start_moves_waiting_to_active() {
        let mut session = sample_session();
        session.start(OffsetDateTime::now_utc()).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_question_index, 0);
        assert!(session.started_at.is_some());
    }

    #[test]
    fn start_rejected_once_active_or_completed() {
        let now = OffsetDateTime::now_utc();
        let mut session = sample_session();
        session.start(now).unwrap();
        let err = session.start(now).unwrap_err();
        assert_eq!(err.from, SessionStatus::Active);

        assert!(session.complete(now));
        let err = session.start(now).unwrap_err();
        assert_eq!(err.from, SessionStatus::Completed);
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn complete_is_idempotent() {
        let now = OffsetDateTime::now_utc();
        let mut session = sample_session();
        session.start(now).unwrap();
        assert!(session.complete(now));
        assert!(!session.complete(now));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn complete_from_waiting_is_allowed() {
        // Host-forced termination before start.
        let now = OffsetDateTime::now_utc();
        let mut session = sample_session();
        assert!(session.complete(now));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn expired_waiting_session_is_hidden() {
        let store = SessionStore::new();
        let now = OffsetDateTime::now_utc();
        let mut session = sample_session();
        session.expires_at = now - Duration::seconds(1);
        store.insert(session);

        assert!(store.get("ABC123", now).is_none());
        assert!(matches!(
            store.lookup("ABC123", now),
            SessionLookup::Expired
        ));
    }

    #[test]
    fn active_session_survives_ttl_boundary() {
        let store = SessionStore::new();
        let now = OffsetDateTime::now_utc();
        let mut session = sample_session();
        session.start(now).unwrap();
        session.expires_at = now - Duration::seconds(1);
        store.insert(session);

        assert!(store.get("ABC123", now).is_some());
    }

    #[test]
    fn purge_drops_only_expired_waiting_sessions() {
        let store = SessionStore::new();
        let now = OffsetDateTime::now_utc();

        let mut abandoned = sample_session();
        abandoned.expires_at = now - Duration::seconds(1);
        store.insert(abandoned);

        let mut playing = sample_session();
        playing.code = "DEF456".into();
        playing.start(now).unwrap();
        playing.expires_at = now - Duration::seconds(1);
        store.insert(playing);

        let mut fresh = sample_session();
        fresh.code = "GHI789".into();
        store.insert(fresh);

        assert!(store.remove_if_expired_waiting("ABC123", now));
        assert!(!store.contains("ABC123"));

        // A game in flight is never purged at the TTL boundary.
        assert!(!store.remove_if_expired_waiting("DEF456", now));
        assert!(store.contains("DEF456"));

        // A waiting session within its TTL stays.
        assert!(!store.remove_if_expired_waiting("GHI789", now));
        assert!(store.contains("GHI789"));
    }

    #[test]
    fn duplicate_answer_detection() {
        let mut participant = Participant::new("p1", "Player One");
        participant.answers.push(AnswerRecord {
            question_index: 0,
            answer: serde_json::json!(1),
            timestamp: 0.0,
            is_correct: true,
            points_earned: 1450,
        });
        assert!(participant.has_answered(0));
        assert!(!participant.has_answered(1));
        assert_eq!(participant.correct_count(), 1);
    }
}
