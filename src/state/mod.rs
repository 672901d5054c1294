pub mod connections;
pub mod scoreboard;
pub mod session;
pub mod timers;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::quiz_store::QuizStore,
    error::ServiceError,
};

pub use self::connections::ConnectionRegistry;
pub use self::scoreboard::ScoreBoards;
pub use self::session::SessionStore;
pub use self::timers::TimerTable;

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing sessions, scoreboards, live
/// connections, deferred timers, and the storage backend handle.
pub struct AppState {
    config: AppConfig,
    quiz_store: RwLock<Option<Arc<dyn QuizStore>>>,
    degraded: watch::Sender<bool>,
    sessions: SessionStore,
    scores: ScoreBoards,
    connections: ConnectionRegistry,
    timers: TimerTable,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            quiz_store: RwLock::new(None),
            degraded: degraded_tx,
            sessions: SessionStore::new(),
            scores: ScoreBoards::new(),
            connections: ConnectionRegistry::new(),
            timers: TimerTable::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current quiz store, if one is installed.
    pub async fn quiz_store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.quiz_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the quiz store or fail with the degraded-mode error.
    pub async fn require_quiz_store(&self) -> Result<Arc<dyn QuizStore>, ServiceError> {
        self.quiz_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn set_quiz_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.quiz_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }
        let _ = self.degraded.send(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Per-session ephemeral state store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Per-session sorted score structures.
    pub fn scores(&self) -> &ScoreBoards {
        &self.scores
    }

    /// Registry of live WebSocket channels.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Deferred task table for reveal/cleanup/disconnect timers.
    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }
}
