/// OpenAPI document assembly.
pub mod documentation;
/// Question flow, answer grading and scoring.
pub mod game_service;
/// Health probes.
pub mod health_service;
/// Ranking computation over the score boards.
pub mod leaderboard_service;
/// WebSocket connection lifecycle and message orchestration.
pub mod live_service;
/// Session creation, membership and lifecycle transitions.
pub mod session_service;
/// Storage backend supervision and reconnection.
pub mod storage_supervisor;
