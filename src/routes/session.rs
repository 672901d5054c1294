use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        format_timestamp,
        session::{CreateSessionRequest, SessionCreatedResponse, SessionInfoResponse},
        validation::validate_session_code,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionCreatedResponse),
        (status = 400, description = "Invalid request or quiz has no questions"),
        (status = 404, description = "Quiz not found"),
        (status = 503, description = "Storage unavailable"),
    )
)]
/// Create a live session for a quiz and hand back its join code.
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<SessionCreatedResponse>, AppError> {
    let session =
        session_service::create_session(&state, &request.quiz_id, &request.host_id).await?;
    Ok(Json(SessionCreatedResponse {
        session_code: session.code,
        expires_in: state.config().session_ttl_secs,
        expires_at: format_timestamp(session.expires_at),
    }))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{code}",
    params(("code" = String, Path, description = "Six character session join code")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionInfoResponse),
        (status = 400, description = "Malformed session code"),
        (status = 404, description = "Session not found"),
        (status = 410, description = "Session expired"),
    )
)]
/// Look up a session by its join code.
pub async fn session_info(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionInfoResponse>, AppError> {
    let code = code.to_ascii_uppercase();
    validate_session_code(&code, state.config().code_length)
        .map_err(|_| AppError::BadRequest(format!("malformed session code `{code}`")))?;
    let session = session_service::get_session(&state, &code)?;
    Ok(Json(SessionInfoResponse::from(&session)))
}

/// Configure the session routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{code}", get(session_info))
}
