pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{FinalResultEntity, QuizEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for quiz content and final results.
///
/// Quiz documents are read-only from this service's perspective; the only
/// write is the one-shot final result document at session completion.
pub trait QuizStore: Send + Sync {
    /// Fetch a quiz with its ordered question sequence by identifier.
    fn find_quiz(&self, quiz_id: &str) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Persist a final result document.
    fn save_result(&self, result: FinalResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish the backend connection after a failed probe.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
