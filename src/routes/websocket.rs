use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{services::live_service, state::SharedState};

/// Query parameters for the live connection upgrade.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LiveQuery {
    /// Caller-chosen identity, stable across reconnects.
    pub participant_id: String,
}

#[utoipa::path(
    get,
    path = "/api/ws/{session_code}",
    params(
        ("session_code" = String, Path, description = "Session join code"),
        LiveQuery,
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a live quiz WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(session_code): Path<String>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session_code = session_code.to_ascii_uppercase();
    ws.on_upgrade(move |socket| {
        live_service::handle_socket(state, socket, session_code, query.participant_id)
    })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/ws/{session_code}", get(ws_handler))
}
