use std::sync::Mutex;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{FinalResultEntity, QuizEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

/// In-memory [`QuizStore`] backend.
///
/// Used by the unit tests and as the fallback backend when the server runs
/// without a database configured. Never degrades.
#[derive(Debug, Default)]
pub struct MemoryQuizStore {
    quizzes: DashMap<String, QuizEntity>,
    results: Mutex<Vec<FinalResultEntity>>,
}

impl MemoryQuizStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a quiz document, keyed by its identifier.
    pub fn insert_quiz(&self, quiz: QuizEntity) {
        self.quizzes.insert(quiz.id.clone(), quiz);
    }

    /// Snapshot of every final result persisted so far.
    pub fn results(&self) -> Vec<FinalResultEntity> {
        self.results.lock().expect("results lock poisoned").clone()
    }
}

impl QuizStore for MemoryQuizStore {
    fn find_quiz(&self, quiz_id: &str) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quiz = self.quizzes.get(quiz_id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn save_result(&self, result: FinalResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.results
            .lock()
            .expect("results lock poisoned")
            .push(result);
        Box::pin(async move { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
