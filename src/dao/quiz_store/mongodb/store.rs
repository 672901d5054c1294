use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoQuizDocument, quiz_id_filter},
};
use crate::dao::{
    models::{FinalResultEntity, QuizEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

const QUIZ_COLLECTION_NAME: &str = "quizzes";
const RESULT_COLLECTION_NAME: &str = "live_game_results";

/// MongoDB-backed [`QuizStore`].
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.database.write().await;
        *guard = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let options = IndexOptions::builder()
            .name(Some("result_session_code_idx".to_owned()))
            .build();
        let index = mongodb::IndexModel::builder()
            .keys(doc! { "session_code": 1 })
            .options(options)
            .build();

        self.result_collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULT_COLLECTION_NAME,
                index: "session_code",
                source,
            })?;

        Ok(())
    }

    async fn quiz_collection(&self) -> Collection<MongoQuizDocument> {
        let guard = self.inner.database.read().await;
        guard.collection::<MongoQuizDocument>(QUIZ_COLLECTION_NAME)
    }

    async fn result_collection(&self) -> Collection<FinalResultEntity> {
        let guard = self.inner.database.read().await;
        guard.collection::<FinalResultEntity>(RESULT_COLLECTION_NAME)
    }

    async fn find_quiz(&self, quiz_id: &str) -> MongoResult<Option<QuizEntity>> {
        let collection = self.quiz_collection().await;

        let document = collection
            .find_one(quiz_id_filter(quiz_id))
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: quiz_id.to_owned(),
                source,
            })?;

        Ok(document.map(Into::into))
    }

    async fn save_result(&self, result: FinalResultEntity) -> MongoResult<()> {
        let session_code = result.session_code.clone();
        let collection = self.result_collection().await;

        collection
            .insert_one(&result)
            .await
            .map_err(|source| MongoDaoError::SaveResult {
                session_code,
                source,
            })?;

        Ok(())
    }
}

impl QuizStore for MongoQuizStore {
    fn find_quiz(&self, quiz_id: &str) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        let quiz_id = quiz_id.to_owned();
        Box::pin(async move { store.find_quiz(&quiz_id).await.map_err(Into::into) })
    }

    fn save_result(&self, result: FinalResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_result(result).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
