use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live quiz backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::session_info,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionCreatedResponse,
            crate::dto::session::SessionInfoResponse,
            crate::dto::session::ParticipantView,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::QuestionView,
            crate::dto::ws::RankingRow,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session creation and lookup"),
        (name = "live", description = "WebSocket operations for live play"),
    )
)]
pub struct ApiDoc;
