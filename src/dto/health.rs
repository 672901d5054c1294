use serde::Serialize;
use utoipa::ToSchema;

/// Response payload for the health check endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status, `ok` or `degraded`.
    pub status: &'static str,
    /// Whether the storage backend is currently reachable.
    pub storage_connected: bool,
}

impl HealthResponse {
    /// Build the payload from the degraded flag.
    pub fn from_degraded(degraded: bool) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            storage_connected: !degraded,
        }
    }
}
