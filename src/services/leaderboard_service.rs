use time::OffsetDateTime;

use crate::{
    dao::models::{FinalResultEntity, ParticipantResultEntity, RankingEntity},
    dto::{format_timestamp, ws::RankingRow},
    services::game_service::accuracy_percent,
    state::{SharedState, session::Session},
};

/// Push a participant's cumulative score into the session's score board.
pub fn update_score(state: &SharedState, code: &str, participant_id: &str, score: i64) {
    state.scores().update_score(code, participant_id, score);
}

/// Current standings, best first, joined with roster data.
///
/// A board entry whose participant record is gone still ranks, under the
/// `"Unknown"` placeholder name.
pub fn rankings(state: &SharedState, code: &str, limit: usize) -> Vec<RankingRow> {
    let entries = state.scores().top(code, limit);
    if entries.is_empty() {
        return Vec::new();
    }
    let now = OffsetDateTime::now_utc();
    state
        .sessions()
        .with_session(code, now, |session| {
            entries
                .iter()
                .enumerate()
                .map(|(position, entry)| {
                    let participant = session.participants.get(&entry.participant_id);
                    RankingRow {
                        rank: position + 1,
                        participant_id: entry.participant_id.clone(),
                        username: participant
                            .map(|p| p.username.clone())
                            .unwrap_or_else(|| "Unknown".to_owned()),
                        score: entry.score,
                        answered_count: participant.map(|p| p.answers.len()).unwrap_or(0),
                        accuracy: None,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Final standings with per-participant accuracy filled in.
pub fn final_rankings(state: &SharedState, code: &str) -> Vec<RankingRow> {
    let mut rows = rankings(state, code, usize::MAX);
    let now = OffsetDateTime::now_utc();
    state.sessions().with_session(code, now, |session| {
        for row in &mut rows {
            if let Some(participant) = session.participants.get(&row.participant_id) {
                row.accuracy = Some(accuracy_percent(
                    participant.answers.len(),
                    participant.correct_count(),
                ));
            } else {
                row.accuracy = Some(0.0);
            }
        }
    });
    rows
}

/// 1-based rank of one participant, 0 when unranked.
pub fn user_rank(state: &SharedState, code: &str, participant_id: &str) -> usize {
    state.scores().rank_of(code, participant_id)
}

/// Drop the session's score board (teardown).
pub fn clear(state: &SharedState, code: &str) {
    state.scores().clear(code);
}

/// Assemble the persistent result document from the completed session
/// snapshot and the final rankings.
pub fn final_result_document(session: &Session, rankings: &[RankingRow]) -> FinalResultEntity {
    let participants = session
        .participants
        .values()
        .map(|participant| ParticipantResultEntity {
            participant_id: participant.id.clone(),
            username: participant.username.clone(),
            score: participant.score,
            answered_count: participant.answers.len(),
            correct_count: participant.correct_count(),
        })
        .collect();
    let ranking_entities = rankings
        .iter()
        .map(|row| RankingEntity {
            rank: row.rank,
            participant_id: row.participant_id.clone(),
            username: row.username.clone(),
            score: row.score,
            accuracy: row.accuracy.unwrap_or(0.0),
        })
        .collect();
    FinalResultEntity {
        id: uuid::Uuid::new_v4(),
        session_code: session.code.clone(),
        quiz_id: session.quiz_id.clone(),
        host_id: session.host_id.clone(),
        participants,
        rankings: ranking_entities,
        created_at: format_timestamp(session.created_at),
        completed_at: format_timestamp(
            session.completed_at.unwrap_or_else(OffsetDateTime::now_utc),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::QuestionEntity,
        state::{
            AppState,
            session::{AnswerRecord, Participant},
        },
    };
    use serde_json::json;
    use std::sync::Arc;

    fn seeded_state(code: &str) -> SharedState {
        let state = AppState::new(AppConfig::default());
        let questions: Vec<QuestionEntity> = vec![serde_json::from_value(json!({
            "questionText": "Q",
            "options": ["a", "b"],
            "correctAnswerIndex": 0
        }))
        .unwrap()];
        let mut session = Session::new(
            code,
            "quiz-1",
            "Sample",
            "host-1",
            Arc::new(questions),
            OffsetDateTime::now_utc(),
            600,
        );
        for (id, name, score, correct) in [
            ("p1", "Ada", 1450_i64, true),
            ("p2", "Grace", 0_i64, false),
        ] {
            let mut participant = Participant::new(id, name);
            participant.score = score;
            participant.answers.push(AnswerRecord {
                question_index: 0,
                answer: json!(0),
                timestamp: 0.0,
                is_correct: correct,
                points_earned: score,
            });
            session.participants.insert(id.to_owned(), participant);
        }
        state.sessions().insert(session);
        state
    }

    #[test]
    fn rankings_join_usernames_and_progress() {
        let state = seeded_state("LEAD01");
        update_score(&state, "LEAD01", "p1", 1450);
        update_score(&state, "LEAD01", "p2", 0);

        let rows = rankings(&state, "LEAD01", 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].username, "Ada");
        assert_eq!(rows[0].score, 1450);
        assert_eq!(rows[0].answered_count, 1);
        assert!(rows[0].accuracy.is_none());
    }

    #[test]
    fn missing_roster_entry_falls_back_to_unknown() {
        let state = seeded_state("LEAD02");
        update_score(&state, "LEAD02", "ghost", 500);

        let rows = rankings(&state, "LEAD02", 10);
        assert_eq!(rows[0].username, "Unknown");
        assert_eq!(rows[0].answered_count, 0);
    }

    #[test]
    fn final_rankings_carry_accuracy() {
        let state = seeded_state("LEAD03");
        update_score(&state, "LEAD03", "p1", 1450);
        update_score(&state, "LEAD03", "p2", 0);

        let rows = final_rankings(&state, "LEAD03");
        assert_eq!(rows[0].accuracy, Some(100.0));
        assert_eq!(rows[1].accuracy, Some(0.0));
    }

    #[test]
    fn user_rank_reflects_board() {
        let state = seeded_state("LEAD04");
        update_score(&state, "LEAD04", "p1", 1450);
        update_score(&state, "LEAD04", "p2", 900);
        assert_eq!(user_rank(&state, "LEAD04", "p2"), 2);
        assert_eq!(user_rank(&state, "LEAD04", "ghost"), 0);
    }

    #[test]
    fn result_document_snapshots_everything() {
        let state = seeded_state("LEAD05");
        update_score(&state, "LEAD05", "p1", 1450);
        update_score(&state, "LEAD05", "p2", 0);

        let now = OffsetDateTime::now_utc();
        let session = state
            .sessions()
            .with_session_mut("LEAD05", now, |session| {
                session.complete(now);
                session.clone()
            })
            .unwrap();
        let rows = final_rankings(&state, "LEAD05");
        let document = final_result_document(&session, &rows);

        assert_eq!(document.session_code, "LEAD05");
        assert_eq!(document.participants.len(), 2);
        assert_eq!(document.rankings.len(), 2);
        assert_eq!(document.rankings[0].accuracy, 100.0);
        assert!(!document.completed_at.is_empty());
    }
}
