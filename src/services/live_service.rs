use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    dto::{
        format_timestamp,
        ws::{
            AnswerFeedbackPayload, AnswerResultPayload, ClientMessage, JoinPayload,
            LeaderboardUpdatePayload, QuizCompletedPayload, ServerMessage, SessionStatePayload,
            SessionUpdatePayload, SubmitAnswerPayload,
        },
    },
    error::ServiceError,
    services::{
        game_service::{self, AdvanceOutcome, SubmitOutcome},
        leaderboard_service, session_service,
    },
    state::{
        SharedState,
        session::{Session, SessionStatus},
    },
};

/// Number of rows pushed in incremental standings updates. Final results are
/// never truncated.
const LEADERBOARD_LIMIT: usize = 10;

/// Handle the full lifecycle of one live connection.
///
/// The socket is split so a dedicated writer task keeps outbound messages
/// flowing while we await inbound frames. The channel is registered up front
/// so even pre-join errors reach the client.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    session_code: String,
    participant_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state
        .connections()
        .register(&session_code, &participant_id, outbound_tx.clone());
    info!(session = %session_code, participant = %participant_id, "connection opened");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(ClientMessage::Join(payload)) => {
                    handle_join(&state, &session_code, &participant_id, payload);
                }
                Ok(ClientMessage::SubmitAnswer(payload)) => {
                    handle_submit(&state, &session_code, &participant_id, payload).await;
                }
                Ok(ClientMessage::StartQuiz) => {
                    handle_start(&state, &session_code, &participant_id).await;
                }
                Ok(ClientMessage::EndQuiz) => {
                    handle_end(&state, &session_code, &participant_id).await;
                }
                Ok(ClientMessage::Ping) => {
                    state
                        .connections()
                        .send_to(&session_code, &participant_id, &ServerMessage::Pong);
                }
                Ok(ClientMessage::Unknown(kind)) => {
                    warn!(session = %session_code, participant = %participant_id, kind = %kind, "unknown message type");
                    send_error(
                        &state,
                        &session_code,
                        &participant_id,
                        format!("Unknown message type: {kind}"),
                    );
                }
                Err(err) => {
                    warn!(session = %session_code, participant = %participant_id, error = %err, "failed to parse message");
                    send_error(&state, &session_code, &participant_id, "Invalid message format");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(session = %session_code, participant = %participant_id, "client closed connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session = %session_code, participant = %participant_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Only tear down if our channel is still the registered one; a reconnect
    // may already have replaced it.
    let removed =
        state
            .connections()
            .unregister_if_current(&session_code, &participant_id, &outbound_tx);
    if removed {
        handle_disconnect(&state, &session_code, &participant_id);
    }
    info!(session = %session_code, participant = %participant_id, "connection closed");

    finalize(writer_task, outbound_tx).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

fn send_error(state: &SharedState, code: &str, participant_id: &str, message: impl Into<String>) {
    state
        .connections()
        .send_to(code, participant_id, &ServerMessage::error(message));
}

/// Client-facing message for a service failure on the live channel.
fn error_message(err: &ServiceError) -> String {
    match err {
        ServiceError::NotFound(_) => "Session not found".to_owned(),
        ServiceError::Expired(_) => "Session has expired".to_owned(),
        ServiceError::Forbidden(message)
        | ServiceError::InvalidInput(message)
        | ServiceError::InvalidState(message) => message.clone(),
        other => other.to_string(),
    }
}

fn session_update(session: &Session) -> ServerMessage {
    ServerMessage::SessionUpdate(SessionUpdatePayload {
        status: session.status.as_str().to_owned(),
        participant_count: session.participants.len(),
        participants: session.participants.values().map(Into::into).collect(),
    })
}

fn session_state(session: &Session) -> ServerMessage {
    ServerMessage::SessionState(SessionStatePayload {
        session_code: session.code.clone(),
        quiz_id: session.quiz_id.clone(),
        quiz_title: session.quiz_title.clone(),
        host_id: session.host_id.clone(),
        status: session.status.as_str().to_owned(),
        current_question_index: session.current_question_index,
        total_questions: session.total_questions,
        participants: session.participants.values().map(Into::into).collect(),
        created_at: format_timestamp(session.created_at),
    })
}

/// Handle a `join` message.
///
/// The host attaches without ever entering the roster, so it never appears in
/// rankings. Participants are added (or re-attached with history intact) and
/// the whole session hears about the roster change.
fn handle_join(state: &SharedState, code: &str, participant_id: &str, payload: JoinPayload) {
    let username = payload
        .username
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_owned());

    if session_service::is_host(state, code, participant_id) {
        match session_service::get_session(state, code) {
            Ok(session) => {
                state
                    .connections()
                    .send_to(code, participant_id, &session_state(&session));
                if session.status == SessionStatus::Active {
                    push_current_question(state, code, participant_id);
                    push_host_leaderboard(state, code, &session.host_id, None);
                }
                info!(session = %code, "host attached");
            }
            Err(err) => send_error(state, code, participant_id, error_message(&err)),
        }
        return;
    }

    match session_service::join_session(state, code, participant_id, &username) {
        Ok(session_service::JoinOutcome::Joined(session)) => {
            state.timers().cancel_disconnect_check(code, participant_id);
            state.connections().broadcast(code, &session_update(&session));
            state
                .connections()
                .send_to(code, participant_id, &session_state(&session));
            if session.status == SessionStatus::Active {
                // Mid-game reconnect: restore the question the session is on.
                push_current_question(state, code, participant_id);
            }
            info!(session = %code, participant = %participant_id, username = %username, "participant joined");
        }
        Ok(session_service::JoinOutcome::QuizAlreadyStarted) => {
            send_error(state, code, participant_id, "Quiz has already started");
        }
        Err(err) => send_error(state, code, participant_id, error_message(&err)),
    }
}

fn push_current_question(state: &SharedState, code: &str, participant_id: &str) {
    match game_service::current_question(state, code) {
        Ok(Some(view)) => {
            state
                .connections()
                .send_to(code, participant_id, &ServerMessage::Question(view));
        }
        Ok(None) => {}
        Err(err) => {
            warn!(session = %code, error = %err, "failed to load current question");
        }
    }
}

fn push_host_leaderboard(
    state: &SharedState,
    code: &str,
    host_id: &str,
    distribution: Option<std::collections::BTreeMap<String, u64>>,
) {
    let rankings = leaderboard_service::rankings(state, code, LEADERBOARD_LIMIT);
    state.connections().send_to_host(
        code,
        host_id,
        &ServerMessage::LeaderboardUpdate(LeaderboardUpdatePayload {
            rankings,
            answer_distribution: distribution,
        }),
    );
}

/// Handle a `submit_answer` message: grade, acknowledge, update the host's
/// standings, and close the question early once every connected participant
/// has answered.
async fn handle_submit(
    state: &SharedState,
    code: &str,
    participant_id: &str,
    payload: SubmitAnswerPayload,
) {
    match game_service::submit_answer(state, code, participant_id, payload.answer, payload.timestamp)
    {
        Ok(SubmitOutcome::Accepted(accepted)) => {
            leaderboard_service::update_score(state, code, participant_id, accepted.new_total_score);
            state.connections().send_to(
                code,
                participant_id,
                &ServerMessage::AnswerResult(AnswerResultPayload {
                    is_correct: accepted.is_correct,
                    points: accepted.points,
                    correct_answer: accepted.correct_answer.clone(),
                    new_total_score: accepted.new_total_score,
                }),
            );
            if let Ok(session) = session_service::get_session(state, code) {
                push_host_leaderboard(state, code, &session.host_id, None);
            }
            if game_service::all_connected_answered(state, code) {
                reveal_question(state, code, accepted.question_index).await;
            }
        }
        Ok(SubmitOutcome::Rejected(reason)) => {
            send_error(state, code, participant_id, reason.message());
        }
        Err(err) => send_error(state, code, participant_id, error_message(&err)),
    }
}

/// Close the question at `index`: broadcast per-participant feedback and the
/// answer distribution, then schedule the advance to the next question.
///
/// Both the everyone-answered path and the timeout path land here; the
/// reveal claim in the session store guarantees only one proceeds.
async fn reveal_question(state: &SharedState, code: &str, index: usize) {
    if !game_service::try_begin_reveal(state, code, index) {
        return;
    }
    let Ok(session) = session_service::get_session(state, code) else {
        return;
    };

    let distribution = game_service::answer_distribution(&session, index);
    let correct_answer = game_service::correct_answer_for(&session, index);

    push_host_leaderboard(state, code, &session.host_id, Some(distribution.clone()));

    for participant in session.participants.values() {
        if !participant.connected {
            continue;
        }
        let record = participant.answer_for(index);
        state.connections().send_to(
            code,
            &participant.id,
            &ServerMessage::AnswerFeedback(AnswerFeedbackPayload {
                is_correct: record.map(|r| r.is_correct).unwrap_or(false),
                points_earned: record.map(|r| r.points_earned).unwrap_or(0),
                correct_answer: correct_answer.clone(),
                your_score: participant.score,
                answer_distribution: distribution.clone(),
            }),
        );
    }

    info!(session = %code, index, "question revealed");
    schedule_advance(state, code);
}

/// Schedule the post-reveal pause, then move on. The abort handle lands in
/// the timer table so completion through another path cancels it.
fn schedule_advance(state: &SharedState, code: &str) {
    let state_clone = state.clone();
    let code_owned = code.to_owned();
    let delay = state.config().reveal_delay();
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        state_clone.timers().clear_advance(&code_owned);
        advance_or_complete(&state_clone, &code_owned).await;
    });
    // Same slot as the question timer: arming one aborts the other.
    state.timers().set_advance(code, task.abort_handle());
}

/// Arm the question clock: when duration plus grace elapses without a full
/// quorum, the reveal fires anyway.
fn start_question_timer(state: &SharedState, code: &str, index: usize) {
    let state_clone = state.clone();
    let code_owned = code.to_owned();
    let timeout = std::time::Duration::from_secs(
        state.config().question_duration_secs + state.config().answer_grace_secs,
    );
    let task = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        state_clone.timers().clear_advance(&code_owned);
        reveal_question(&state_clone, &code_owned, index).await;
    });
    state.timers().set_advance(code, task.abort_handle());
}

/// Move the session to the next question, or complete it when none remain.
/// Questions with unusable stored content are skipped with a log line.
async fn advance_or_complete(state: &SharedState, code: &str) {
    loop {
        match game_service::advance_question(state, code) {
            Some(AdvanceOutcome::Advanced(index)) => {
                if broadcast_question(state, code, index) {
                    start_question_timer(state, code, index);
                    return;
                }
                warn!(session = %code, index, "skipping unusable question");
            }
            Some(AdvanceOutcome::Finished) => {
                complete_session(state, code).await;
                return;
            }
            Some(AdvanceOutcome::AlreadyCompleted) | None => return,
        }
    }
}

/// Broadcast the question at `index` with a full clock. Returns whether the
/// stored question was usable.
fn broadcast_question(state: &SharedState, code: &str, index: usize) -> bool {
    let Ok(session) = session_service::get_session(state, code) else {
        return false;
    };
    match game_service::question_by_index(&session, index, state.config().question_duration_secs) {
        Some(view) => {
            state
                .connections()
                .broadcast(code, &ServerMessage::Question(view));
            true
        }
        None => false,
    }
}

/// Handle a `start_quiz` message. Starting twice acknowledges the requester
/// without replaying the start to everyone else.
async fn handle_start(state: &SharedState, code: &str, participant_id: &str) {
    match session_service::start_session(state, code, participant_id) {
        Ok(session_service::StartOutcome::Started) => {
            state
                .connections()
                .broadcast(code, &ServerMessage::QuizStarted);
            if let Ok(session) = session_service::get_session(state, code) {
                state.connections().broadcast(code, &session_update(&session));
            }
            if broadcast_question(state, code, 0) {
                start_question_timer(state, code, 0);
            } else {
                // First question unusable; let the advance loop find one.
                advance_or_complete(state, code).await;
            }
        }
        Ok(session_service::StartOutcome::AlreadyActive) => {
            state
                .connections()
                .send_to(code, participant_id, &ServerMessage::QuizStarted);
        }
        Err(err) => send_error(state, code, participant_id, error_message(&err)),
    }
}

/// Handle an `end_quiz` message (host only).
async fn handle_end(state: &SharedState, code: &str, participant_id: &str) {
    if !session_service::is_host(state, code, participant_id) {
        send_error(state, code, participant_id, "Only the host can end the quiz");
        return;
    }
    info!(session = %code, "host ended the quiz");
    complete_session(state, code).await;
}

/// Complete the session exactly once: cancel pending timers, broadcast final
/// results, persist them best-effort, and schedule the store cleanup.
pub async fn complete_session(state: &SharedState, code: &str) {
    if session_service::end_session(state, code) != Some(true) {
        return;
    }
    state.timers().cancel_advance(code);
    state.timers().cancel_expiry(code);

    let final_rankings = leaderboard_service::final_rankings(state, code);
    let Ok(session) = session_service::get_session(state, code) else {
        return;
    };

    state.connections().broadcast(
        code,
        &ServerMessage::QuizCompleted(QuizCompletedPayload {
            final_rankings: final_rankings.clone(),
        }),
    );

    persist_results(state, &session, &final_rankings).await;
    schedule_cleanup(state, code);
    info!(session = %code, participants = session.participants.len(), "quiz completed");
}

/// Persist the final result document. Persistence failure is logged, never
/// allowed to block the completion broadcast that already went out.
async fn persist_results(
    state: &SharedState,
    session: &Session,
    rankings: &[crate::dto::ws::RankingRow],
) {
    let document = leaderboard_service::final_result_document(session, rankings);
    match state.quiz_store().await {
        Some(store) => {
            if let Err(err) = store.save_result(document).await {
                warn!(session = %session.code, error = %err, "failed to persist final results");
            }
        }
        None => {
            warn!(session = %session.code, "storage degraded; final results not persisted");
        }
    }
}

/// Keep the completed session queryable for a while, then drop all its state.
fn schedule_cleanup(state: &SharedState, code: &str) {
    let state_clone = state.clone();
    let code_owned = code.to_owned();
    let delay = state.config().cleanup_delay();
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        state_clone.timers().clear_cleanup(&code_owned);
        state_clone.timers().cancel_all(&code_owned);
        state_clone.sessions().remove(&code_owned);
        leaderboard_service::clear(&state_clone, &code_owned);
        info!(session = %code_owned, "session state cleaned up");
    });
    state.timers().set_cleanup(code, task.abort_handle());
}

/// Tear down after a socket closes: soft-disconnect the participant and arm
/// the grace check. The record stays; no score is forfeited.
fn handle_disconnect(state: &SharedState, code: &str, participant_id: &str) {
    if session_service::is_host(state, code, participant_id) {
        info!(session = %code, "host detached");
        return;
    }
    let Some(session) = session_service::mark_disconnected(state, code, participant_id) else {
        return;
    };
    state.connections().broadcast(code, &session_update(&session));
    schedule_disconnect_check(state, code, participant_id);
}

/// After the grace window, note whether the participant came back. Either
/// way the roster record survives until session cleanup.
fn schedule_disconnect_check(state: &SharedState, code: &str, participant_id: &str) {
    let state_clone = state.clone();
    let code_owned = code.to_owned();
    let participant_owned = participant_id.to_owned();
    let grace = state.config().disconnect_grace();
    let task = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        state_clone
            .timers()
            .clear_disconnect_check(&code_owned, &participant_owned);
        let now = time::OffsetDateTime::now_utc();
        let still_gone = state_clone
            .sessions()
            .with_session(&code_owned, now, |session| {
                session
                    .participants
                    .get(&participant_owned)
                    .is_some_and(|p| !p.connected)
            })
            .unwrap_or(false);
        if still_gone {
            info!(
                session = %code_owned,
                participant = %participant_owned,
                "participant did not return within the grace window"
            );
        }
    });
    state
        .timers()
        .set_disconnect_check(code, participant_id, task.abort_handle());
}
