//! Library crate for live-quiz-back, exposing modules for binaries and integration tests.

/// Runtime configuration and game timing constants.
pub mod config;
/// Storage abstraction and backends.
pub mod dao;
/// Wire payload types for REST and WebSocket.
pub mod dto;
/// Error taxonomy for services and HTTP responses.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic services.
pub mod services;
/// Shared in-memory application state.
pub mod state;
