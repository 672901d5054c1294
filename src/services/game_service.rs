use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    dao::models::QuestionEntity,
    dto::ws::{QuestionBody, QuestionView},
    error::ServiceError,
    state::{
        SharedState,
        session::{AnswerRecord, Session},
    },
};

/// Reduce an answer value to a canonical string so semantically equal
/// submissions compare equal regardless of JSON spelling.
///
/// Numbers lose their float/integer spelling, strings are trimmed, arrays are
/// order-insensitive, objects compare by sorted key/value pairs.
pub fn canonical_answer(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.trim().to_owned(),
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(canonical_answer).collect();
            parts.sort();
            parts.join(",")
        }
        Value::Object(map) => {
            let mut parts: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{key}={}", canonical_answer(value)))
                .collect();
            parts.sort();
            parts.join(",")
        }
    }
}

/// Whether a submitted answer matches the correctness specification.
/// A null spec means the question carries no correctness data; nothing
/// matches it.
pub fn answers_match(submitted: &Value, spec: &Value) -> bool {
    if spec.is_null() {
        return false;
    }
    canonical_answer(submitted) == canonical_answer(spec)
}

/// Points for a correct answer after `elapsed` seconds: a 1000 base plus a
/// linearly decaying bonus of up to 500.
pub fn score_correct(elapsed: f64, duration: f64) -> i64 {
    let remaining_fraction = (1.0 - elapsed / duration).max(0.0);
    1000 + (remaining_fraction * 500.0).floor() as i64
}

/// Build the client-safe wire view of one question. Returns `None` when the
/// stored question has no usable text.
fn question_body(question: &QuestionEntity, index: usize) -> Option<QuestionBody> {
    if question.text.trim().is_empty() {
        return None;
    }
    Some(QuestionBody {
        id: question
            .id
            .clone()
            .unwrap_or_else(|| index.to_string()),
        question: question.text.clone(),
        question_type: question.kind.clone(),
        options: question.options.clone(),
        drag_items: question.drag_items.clone(),
        drop_targets: question.drop_targets.clone(),
        image_url: question.image_url.clone(),
    })
}

/// View of the question at `index` with a full clock, for pushes where the
/// timer starts now (or restarts for a reconnecting participant).
pub fn question_by_index(
    session: &Session,
    index: usize,
    duration_secs: u64,
) -> Option<QuestionView> {
    let question = session.questions.get(index)?;
    let body = question_body(question, index)?;
    Some(QuestionView {
        question: body,
        index,
        total: session.total_questions,
        time_remaining: duration_secs,
    })
}

/// View of the session's current question with the live remaining time.
///
/// `Ok(None)` means the pointer is past the end or the stored question is
/// unusable; the latter is logged and skipped rather than surfaced to clients.
pub fn current_question(
    state: &SharedState,
    code: &str,
) -> Result<Option<QuestionView>, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let duration = state.config().question_duration_secs;
    state
        .sessions()
        .with_session(code, now, |session| {
            let index = usize::try_from(session.current_question_index).ok()?;
            let question = session.questions.get(index)?;
            let Some(body) = question_body(question, index) else {
                warn!(session = %code, index, "skipping question with empty text");
                return None;
            };
            let elapsed = session
                .question_started_at
                .map(|started| (now - started).as_seconds_f64().max(0.0))
                .unwrap_or(0.0);
            let time_remaining = (duration as f64 - elapsed).max(0.0) as u64;
            Some(QuestionView {
                question: body,
                index,
                total: session.total_questions,
                time_remaining,
            })
        })
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))
}

/// Correctness specification of the question at `index`, for reveal payloads.
pub fn correct_answer_for(session: &Session, index: usize) -> Value {
    session
        .questions
        .get(index)
        .map(QuestionEntity::correctness_spec)
        .unwrap_or(Value::Null)
}

/// Why a submission was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The question clock plus the grace window had already elapsed.
    TimeExpired,
    /// An answer for this question is already on record.
    AlreadyAnswered,
    /// The submitting identity is not in the roster.
    ParticipantNotFound,
    /// No question is currently open (not started, finished, or a stale index).
    QuestionNotActive,
}

impl RejectReason {
    /// Human-readable message for the error frame.
    pub fn message(self) -> &'static str {
        match self {
            RejectReason::TimeExpired => "Time expired for this question",
            RejectReason::AlreadyAnswered => "Answer already submitted for this question",
            RejectReason::ParticipantNotFound => "Participant not found in session",
            RejectReason::QuestionNotActive => "No active question to answer",
        }
    }
}

/// A recorded submission and its grading.
#[derive(Debug, Clone)]
pub struct AnswerAccepted {
    /// Whether the canonicalized answer matched.
    pub is_correct: bool,
    /// Points awarded for this answer.
    pub points: i64,
    /// The correctness specification, echoed back to the submitter.
    pub correct_answer: Value,
    /// Submitter's cumulative score after the award.
    pub new_total_score: i64,
    /// Question index the answer was recorded against.
    pub question_index: usize,
}

/// Explicit result of a submission attempt. Rejections carry their reason so
/// the caller can tell the client what actually happened.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The answer was recorded and graded.
    Accepted(AnswerAccepted),
    /// The answer was not recorded.
    Rejected(RejectReason),
}

/// Record and grade one answer submission.
///
/// The whole read-grade-write sequence runs inside the session store's write
/// lock, so concurrent submissions from other connections serialize and the
/// at-most-one-answer-per-question rule holds under racing duplicates.
pub fn submit_answer(
    state: &SharedState,
    code: &str,
    participant_id: &str,
    answer: Value,
    client_timestamp: f64,
) -> Result<SubmitOutcome, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let duration = state.config().question_duration_f64();
    let deadline = state.config().submission_deadline_f64();

    state
        .sessions()
        .with_session_mut(code, now, |session| {
            let Ok(index) = usize::try_from(session.current_question_index) else {
                return SubmitOutcome::Rejected(RejectReason::QuestionNotActive);
            };
            if index >= session.total_questions {
                return SubmitOutcome::Rejected(RejectReason::QuestionNotActive);
            }
            let Some(started) = session.question_started_at else {
                return SubmitOutcome::Rejected(RejectReason::QuestionNotActive);
            };

            let elapsed = (now - started).as_seconds_f64().max(0.0);
            if elapsed > deadline {
                return SubmitOutcome::Rejected(RejectReason::TimeExpired);
            }

            let spec = correct_answer_for(session, index);
            let is_correct = answers_match(&answer, &spec);
            let points = if is_correct {
                score_correct(elapsed, duration)
            } else {
                0
            };

            let Some(participant) = session.participants.get_mut(participant_id) else {
                return SubmitOutcome::Rejected(RejectReason::ParticipantNotFound);
            };
            if participant.has_answered(index) {
                return SubmitOutcome::Rejected(RejectReason::AlreadyAnswered);
            }

            participant.answers.push(AnswerRecord {
                question_index: index,
                answer,
                timestamp: client_timestamp,
                is_correct,
                points_earned: points,
            });
            participant.score += points;

            SubmitOutcome::Accepted(AnswerAccepted {
                is_correct,
                points,
                correct_answer: spec,
                new_total_score: participant.score,
                question_index: index,
            })
        })
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))
}

/// Whether every connected participant has answered the current question.
/// False when nobody is connected; disconnected participants do not hold up
/// the reveal.
pub fn all_connected_answered(state: &SharedState, code: &str) -> bool {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session(code, now, |session| {
            let Ok(index) = usize::try_from(session.current_question_index) else {
                return false;
            };
            let connected: Vec<_> = session
                .participants
                .values()
                .filter(|p| p.connected)
                .collect();
            !connected.is_empty() && connected.iter().all(|p| p.has_answered(index))
        })
        .unwrap_or(false)
}

/// Distribution of recorded answers for the question at `index`, keyed by
/// canonical answer string.
pub fn answer_distribution(session: &Session, index: usize) -> BTreeMap<String, u64> {
    let mut distribution = BTreeMap::new();
    for participant in session.participants.values() {
        if let Some(record) = participant.answer_for(index) {
            *distribution
                .entry(canonical_answer(&record.answer))
                .or_insert(0) += 1;
        }
    }
    distribution
}

/// Claim the reveal for the question at `index`. Returns `true` for exactly
/// one caller: the quorum path and the timeout path both land here, and only
/// the winner proceeds to broadcast results.
pub fn try_begin_reveal(state: &SharedState, code: &str, index: usize) -> bool {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session_mut(code, now, |session| {
            if session.current_question_index != index as i64 || session.question_revealed {
                return false;
            }
            session.question_revealed = true;
            true
        })
        .unwrap_or(false)
}

/// Result of moving the session-wide question pointer forward.
#[derive(Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The pointer moved to this index and the question clock restarted.
    Advanced(usize),
    /// The last question was already open; the quiz is over.
    Finished,
    /// The session was already completed; nothing changed.
    AlreadyCompleted,
}

/// Advance to the next question, restarting the question clock.
pub fn advance_question(state: &SharedState, code: &str) -> Option<AdvanceOutcome> {
    let now = OffsetDateTime::now_utc();
    state.sessions().with_session_mut(code, now, |session| {
        if session.status == crate::state::session::SessionStatus::Completed {
            return AdvanceOutcome::AlreadyCompleted;
        }
        let next = session.current_question_index + 1;
        if next as usize >= session.total_questions {
            return AdvanceOutcome::Finished;
        }
        session.current_question_index = next;
        session.question_started_at = Some(now);
        session.question_revealed = false;
        AdvanceOutcome::Advanced(next as usize)
    })
}

/// Set a participant's own question pointer (self-paced flows). The pointer
/// is independent of the session-wide one; moving it never touches other
/// participants. Returns whether the participant exists and the index is in
/// range.
pub fn set_participant_question_index(
    state: &SharedState,
    code: &str,
    participant_id: &str,
    index: usize,
) -> bool {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session_mut(code, now, |session| {
            if index >= session.total_questions {
                return false;
            }
            match session.participants.get_mut(participant_id) {
                Some(participant) => {
                    participant.question_index = index;
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false)
}

/// A participant's own question pointer.
pub fn participant_question_index(
    state: &SharedState,
    code: &str,
    participant_id: &str,
) -> Option<usize> {
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session(code, now, |session| {
            session
                .participants
                .get(participant_id)
                .map(|p| p.question_index)
        })
        .flatten()
}

/// Fetch the question at an explicit index, for self-paced progression where
/// each participant reads at their own pointer.
pub fn question_at(
    state: &SharedState,
    code: &str,
    index: usize,
) -> Result<Option<QuestionView>, ServiceError> {
    let now = OffsetDateTime::now_utc();
    let duration = state.config().question_duration_secs;
    state
        .sessions()
        .with_session(code, now, |session| question_by_index(session, index, duration))
        .ok_or_else(|| ServiceError::NotFound(format!("session {code} not found")))
}

/// Fraction of a participant's answers that were correct, as a percentage
/// rounded to two decimals. Zero answers yields zero.
pub fn accuracy_percent(answered: usize, correct: usize) -> f64 {
    if answered == 0 {
        return 0.0;
    }
    let raw = correct as f64 / answered as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, session::Participant},
    };
    use serde_json::json;
    use std::sync::Arc;
    use time::Duration;

    fn sample_session(code: &str) -> Session {
        let questions: Vec<QuestionEntity> = vec![
            serde_json::from_value(json!({
                "questionText": "Pick one",
                "type": "singleMcq",
                "options": ["a", "b", "c"],
                "correctAnswerIndex": 1
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "questionText": "Pick many",
                "type": "multiMcq",
                "options": ["a", "b", "c"],
                "correctAnswerIndices": [0, 2]
            }))
            .unwrap(),
        ];
        Session::new(
            code,
            "quiz-1",
            "Sample",
            "host-1",
            Arc::new(questions),
            OffsetDateTime::now_utc(),
            600,
        )
    }

    fn active_state(code: &str) -> SharedState {
        let state = AppState::new(AppConfig::default());
        let mut session = sample_session(code);
        let now = OffsetDateTime::now_utc();
        session.start(now).unwrap();
        session.question_started_at = Some(now);
        session
            .participants
            .insert("p1".into(), Participant::new("p1", "Ada"));
        session
            .participants
            .insert("p2".into(), Participant::new("p2", "Grace"));
        state.sessions().insert(session);
        state
    }

    fn backdate_question_start(state: &SharedState, code: &str, seconds: f64) {
        let now = OffsetDateTime::now_utc();
        state.sessions().with_session_mut(code, now, |session| {
            session.question_started_at = Some(now - Duration::seconds_f64(seconds));
        });
    }

    #[test]
    fn scoring_decays_linearly() {
        assert_eq!(score_correct(3.0, 30.0), 1450);
        assert_eq!(score_correct(15.0, 30.0), 1250);
        assert_eq!(score_correct(28.0, 30.0), 1033);
        assert_eq!(score_correct(0.0, 30.0), 1500);
        assert_eq!(score_correct(30.0, 30.0), 1000);
        assert_eq!(score_correct(31.5, 30.0), 1000);
    }

    #[test]
    fn scoring_is_monotonically_nonincreasing() {
        let mut previous = i64::MAX;
        for tenths in 0..=320 {
            let points = score_correct(tenths as f64 / 10.0, 30.0);
            assert!(points <= previous);
            previous = points;
        }
    }

    #[test]
    fn canonical_forms_collapse_spellings() {
        assert_eq!(canonical_answer(&json!(2)), canonical_answer(&json!(2.0)));
        assert_eq!(canonical_answer(&json!("2")), "2");
        assert_eq!(canonical_answer(&json!(" b ")), "b");
        assert_eq!(
            canonical_answer(&json!([2, 0])),
            canonical_answer(&json!([0, 2]))
        );
        assert_eq!(
            canonical_answer(&json!({"x": "a", "y": "b"})),
            canonical_answer(&json!({"y": "b", "x": "a"}))
        );
    }

    #[test]
    fn numeric_submission_matches_string_spec() {
        assert!(answers_match(&json!(2), &json!("2")));
        assert!(!answers_match(&json!(1), &json!("2")));
        assert!(!answers_match(&json!(2), &Value::Null));
    }

    #[test]
    fn accepted_answer_is_recorded_and_scored() {
        let state = active_state("GAME01");
        backdate_question_start(&state, "GAME01", 3.0);

        let outcome = submit_answer(&state, "GAME01", "p1", json!(1), 1.0).unwrap();
        let SubmitOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted");
        };
        assert!(accepted.is_correct);
        assert_eq!(accepted.points, 1450);
        assert_eq!(accepted.new_total_score, 1450);
        assert_eq!(accepted.correct_answer, json!(1));
    }

    #[test]
    fn incorrect_answer_earns_zero_but_is_recorded() {
        let state = active_state("GAME02");
        backdate_question_start(&state, "GAME02", 3.0);

        let outcome = submit_answer(&state, "GAME02", "p1", json!(0), 1.0).unwrap();
        let SubmitOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted");
        };
        assert!(!accepted.is_correct);
        assert_eq!(accepted.points, 0);
        assert_eq!(accepted.new_total_score, 0);

        // Recorded: a second attempt is a duplicate, not a retry.
        let outcome = submit_answer(&state, "GAME02", "p1", json!(1), 2.0).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::AlreadyAnswered)
        ));
    }

    #[test]
    fn late_submission_is_time_expired() {
        let state = active_state("GAME03");
        backdate_question_start(&state, "GAME03", 33.0);

        let outcome = submit_answer(&state, "GAME03", "p1", json!(1), 1.0).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::TimeExpired)
        ));
    }

    #[test]
    fn submission_within_grace_window_is_accepted_at_base_points() {
        let state = active_state("GAME04");
        backdate_question_start(&state, "GAME04", 31.0);

        let outcome = submit_answer(&state, "GAME04", "p1", json!(1), 1.0).unwrap();
        let SubmitOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted");
        };
        assert_eq!(accepted.points, 1000);
    }

    #[test]
    fn unknown_participant_is_rejected() {
        let state = active_state("GAME05");
        let outcome = submit_answer(&state, "GAME05", "ghost", json!(1), 1.0).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::ParticipantNotFound)
        ));
    }

    #[test]
    fn submission_before_start_is_not_active() {
        let state = AppState::new(AppConfig::default());
        let mut session = sample_session("GAME06");
        session
            .participants
            .insert("p1".into(), Participant::new("p1", "Ada"));
        state.sessions().insert(session);

        let outcome = submit_answer(&state, "GAME06", "p1", json!(1), 1.0).unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(RejectReason::QuestionNotActive)
        ));
    }

    #[test]
    fn scores_accumulate_across_questions() {
        let state = active_state("GAME07");
        backdate_question_start(&state, "GAME07", 3.0);
        submit_answer(&state, "GAME07", "p1", json!(1), 1.0).unwrap();

        assert_eq!(
            advance_question(&state, "GAME07"),
            Some(AdvanceOutcome::Advanced(1))
        );
        backdate_question_start(&state, "GAME07", 15.0);
        let outcome = submit_answer(&state, "GAME07", "p1", json!([0, 2]), 2.0).unwrap();
        let SubmitOutcome::Accepted(accepted) = outcome else {
            panic!("expected accepted");
        };
        assert!(accepted.is_correct);
        assert_eq!(accepted.points, 1250);
        assert_eq!(accepted.new_total_score, 2700);
    }

    #[test]
    fn quorum_ignores_disconnected_participants() {
        let state = active_state("GAME08");
        backdate_question_start(&state, "GAME08", 3.0);
        submit_answer(&state, "GAME08", "p1", json!(1), 1.0).unwrap();
        assert!(!all_connected_answered(&state, "GAME08"));

        let now = OffsetDateTime::now_utc();
        state.sessions().with_session_mut("GAME08", now, |session| {
            session.participants.get_mut("p2").unwrap().connected = false;
        });
        assert!(all_connected_answered(&state, "GAME08"));
    }

    #[test]
    fn distribution_counts_canonical_answers() {
        let state = active_state("GAME09");
        state
            .sessions()
            .with_session_mut("GAME09", OffsetDateTime::now_utc(), |session| {
                session
                    .participants
                    .insert("p3".into(), Participant::new("p3", "Lin"));
            });
        backdate_question_start(&state, "GAME09", 3.0);
        submit_answer(&state, "GAME09", "p1", json!(1), 1.0).unwrap();
        submit_answer(&state, "GAME09", "p2", json!("1"), 1.5).unwrap();
        submit_answer(&state, "GAME09", "p3", json!(0), 2.0).unwrap();

        let now = OffsetDateTime::now_utc();
        let session = state.sessions().get("GAME09", now).unwrap();
        let distribution = answer_distribution(&session, 0);
        assert_eq!(distribution.get("1"), Some(&2));
        assert_eq!(distribution.get("0"), Some(&1));
        assert_eq!(distribution.len(), 2);
    }

    #[test]
    fn advance_past_last_question_finishes() {
        let state = active_state("GAME10");
        assert_eq!(
            advance_question(&state, "GAME10"),
            Some(AdvanceOutcome::Advanced(1))
        );
        assert_eq!(
            advance_question(&state, "GAME10"),
            Some(AdvanceOutcome::Finished)
        );

        let now = OffsetDateTime::now_utc();
        state
            .sessions()
            .with_session_mut("GAME10", now, |session| session.complete(now));
        assert_eq!(
            advance_question(&state, "GAME10"),
            Some(AdvanceOutcome::AlreadyCompleted)
        );
    }

    #[test]
    fn reveal_is_claimed_by_exactly_one_caller() {
        let state = active_state("GAME13");
        assert!(try_begin_reveal(&state, "GAME13", 0));
        // Second claim for the same question loses, whichever path it came from.
        assert!(!try_begin_reveal(&state, "GAME13", 0));
        // A stale index never claims the reveal.
        assert!(!try_begin_reveal(&state, "GAME13", 1));

        // Advancing re-arms the flag for the next question.
        assert_eq!(
            advance_question(&state, "GAME13"),
            Some(AdvanceOutcome::Advanced(1))
        );
        assert!(try_begin_reveal(&state, "GAME13", 1));
    }

    #[test]
    fn participants_progress_independently_when_self_paced() {
        let state = active_state("GAME12");
        assert!(set_participant_question_index(&state, "GAME12", "p1", 1));
        assert!(!set_participant_question_index(&state, "GAME12", "p1", 5));
        assert!(!set_participant_question_index(&state, "GAME12", "ghost", 0));

        assert_eq!(participant_question_index(&state, "GAME12", "p1"), Some(1));
        assert_eq!(participant_question_index(&state, "GAME12", "p2"), Some(0));

        let for_p1 = question_at(&state, "GAME12", 1).unwrap().unwrap();
        let for_p2 = question_at(&state, "GAME12", 0).unwrap().unwrap();
        assert_eq!(for_p1.question.question, "Pick many");
        assert_eq!(for_p2.question.question, "Pick one");
    }

    #[test]
    fn accuracy_rounds_to_two_decimals() {
        assert_eq!(accuracy_percent(0, 0), 0.0);
        assert_eq!(accuracy_percent(3, 2), 66.67);
        assert_eq!(accuracy_percent(4, 4), 100.0);
    }

    #[test]
    fn current_question_reports_remaining_time() {
        let state = active_state("GAME11");
        backdate_question_start(&state, "GAME11", 10.0);
        let view = current_question(&state, "GAME11").unwrap().unwrap();
        assert_eq!(view.index, 0);
        assert_eq!(view.total, 2);
        assert!(view.time_remaining <= 20);
        assert!(view.time_remaining >= 19);
        assert!(view.question.options.len() == 3);
    }
}
