use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the generated OpenAPI document.
pub mod docs;
/// Health check endpoint.
pub mod health;
/// Session creation and lookup endpoints.
pub mod session;
/// WebSocket upgrade endpoint for live play.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
