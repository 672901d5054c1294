use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payload.
pub mod health;
/// REST payloads for session creation and lookup.
pub mod session;
/// Input validation helpers.
pub mod validation;
/// WebSocket envelope and payload types.
pub mod ws;

/// Format a timestamp as RFC 3339 for wire payloads.
pub fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
