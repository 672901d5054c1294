use rand::Rng;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    error::ServiceError,
    state::{
        SharedState,
        session::{Participant, Session, SessionLookup, SessionStatus},
    },
};

/// Characters used in generated session codes.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Upper bound on collision retries before giving up on code generation.
const MAX_CODE_ATTEMPTS: usize = 100;

/// Generate a random join code of `length` uppercase alphanumeric characters.
pub fn generate_session_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

/// Create a new waiting session for `quiz_id`, hosted by `host_id`.
///
/// The quiz must exist in storage and carry at least one question; the join
/// code is regenerated on collision with any existing session.
pub async fn create_session(
    state: &SharedState,
    quiz_id: &str,
    host_id: &str,
) -> Result<Session, ServiceError> {
    let store = state.require_quiz_store().await?;
    let quiz = store
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz {quiz_id} not found")))?;

    if quiz.questions.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "quiz {quiz_id} has no questions"
        )));
    }

    let code = unique_session_code(state)?;
    let session = Session::new(
        code.clone(),
        quiz.id,
        quiz.title,
        host_id,
        std::sync::Arc::new(quiz.questions),
        OffsetDateTime::now_utc(),
        state.config().session_ttl_secs,
    );
    state.sessions().insert(session.clone());
    schedule_expiry(state, &code);
    info!(session = %code, quiz = %quiz_id, host = %host_id, "session created");
    Ok(session)
}

/// Arm the absolute-TTL purge. A session that starts before the deadline
/// keeps playing past it; one still waiting is dropped so its state and its
/// join code do not outlive a quiz that never ran.
fn schedule_expiry(state: &SharedState, code: &str) {
    let state_clone = state.clone();
    let code_owned = code.to_owned();
    let ttl = std::time::Duration::from_secs(state.config().session_ttl_secs);
    let task = tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        state_clone.timers().clear_expiry(&code_owned);
        let now = OffsetDateTime::now_utc();
        if state_clone
            .sessions()
            .remove_if_expired_waiting(&code_owned, now)
        {
            state_clone.timers().cancel_all(&code_owned);
            state_clone.scores().clear(&code_owned);
            info!(session = %code_owned, "abandoned session purged at expiry");
        }
    });
    state.timers().set_expiry(code, task.abort_handle());
}

fn unique_session_code(state: &SharedState) -> Result<String, ServiceError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_session_code(state.config().code_length);
        if !state.sessions().contains(&code) {
            return Ok(code);
        }
    }
    warn!("exhausted session code attempts");
    Err(ServiceError::InvalidState(
        "could not allocate a unique session code".into(),
    ))
}

/// Fetch a session snapshot, distinguishing expiry from absence.
pub fn get_session(state: &SharedState, code: &str) -> Result<Session, ServiceError> {
    match state.sessions().lookup(code, OffsetDateTime::now_utc()) {
        SessionLookup::Found(session) => Ok(session),
        SessionLookup::Expired => Err(ServiceError::Expired(format!("session {code} expired"))),
        SessionLookup::Missing => Err(ServiceError::NotFound(format!("session {code} not found"))),
    }
}

/// Whether `participant_id` is the host of the session.
pub fn is_host(state: &SharedState, code: &str, participant_id: &str) -> bool {
    state
        .sessions()
        .with_session(code, OffsetDateTime::now_utc(), |session| {
            session.host_id == participant_id
        })
        .unwrap_or(false)
}

/// Outcome of a join attempt.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Participant was added (or re-attached) and the session snapshot taken.
    Joined(Session),
    /// The quiz is underway and this identity is not a known participant.
    QuizAlreadyStarted,
}

/// Add `participant_id` to the session roster, or re-attach a known one.
///
/// Rejoining preserves score and answer history; only the connectivity flag
/// and username are refreshed. Unknown identities are turned away once the
/// quiz is active.
pub fn join_session(
    state: &SharedState,
    code: &str,
    participant_id: &str,
    username: &str,
) -> Result<JoinOutcome, ServiceError> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session_mut(code, now, |session| {
            if let Some(existing) = session.participants.get_mut(participant_id) {
                existing.connected = true;
                existing.disconnected_at = None;
                if !username.is_empty() {
                    existing.username = username.to_owned();
                }
                return JoinOutcome::Joined(session.clone());
            }
            if session.status != SessionStatus::Waiting {
                return JoinOutcome::QuizAlreadyStarted;
            }
            session.participants.insert(
                participant_id.to_owned(),
                Participant::new(participant_id, username),
            );
            JoinOutcome::Joined(session.clone())
        })
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))
}

/// Outcome of a start request, so an idempotent retry is distinguishable
/// from a first start.
#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// The quiz transitioned `Waiting -> Active`.
    Started,
    /// The quiz was already running; nothing changed.
    AlreadyActive,
}

/// Start the quiz. Host-only; starting an already-active quiz is a no-op
/// acknowledged to the caller rather than an error.
pub fn start_session(
    state: &SharedState,
    code: &str,
    requester_id: &str,
) -> Result<StartOutcome, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let outcome = state
        .sessions()
        .with_session_mut(code, now, |session| {
            if session.host_id != requester_id {
                return Err(ServiceError::Forbidden(
                    "Only the host can start the quiz".into(),
                ));
            }
            match session.status {
                SessionStatus::Active => Ok(StartOutcome::AlreadyActive),
                SessionStatus::Completed => Err(ServiceError::InvalidState(
                    "quiz has already completed".into(),
                )),
                SessionStatus::Waiting => {
                    session
                        .start(now)
                        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;
                    session.question_started_at = Some(now);
                    for participant in session.participants.values_mut() {
                        participant.question_index = 0;
                    }
                    info!(session = %code, "quiz started");
                    Ok(StartOutcome::Started)
                }
            }
        })
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))??;

    if outcome == StartOutcome::Started {
        // An active game is allowed to outlive the TTL.
        state.timers().cancel_expiry(code);
    }
    Ok(outcome)
}

/// Transition the session to `Completed`. Returns whether this call performed
/// the transition; `false` means another path already completed it.
pub fn end_session(state: &SharedState, code: &str) -> Option<bool> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session_mut(code, now, |session| session.complete(now))
}

/// Mark a participant disconnected. The record is kept; only the connectivity
/// flag flips, so a reconnect within the grace window restores everything.
/// Returns `None` when the session or the participant is unknown.
pub fn mark_disconnected(
    state: &SharedState,
    code: &str,
    participant_id: &str,
) -> Option<Session> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session_mut(code, now, |session| {
            let participant = session.participants.get_mut(participant_id)?;
            participant.connected = false;
            participant.disconnected_at = Some(now);
            Some(session.clone())
        })
        .flatten()
}
