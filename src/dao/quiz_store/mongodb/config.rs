use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Database used when `MONGO_DB` is not set.
const DEFAULT_DATABASE: &str = "quiz_app";

/// Connection parameters for the MongoDB quiz store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the quiz and result collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI, defaulting the database name when absent.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri).await.map_err(|source| {
            MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            }
        })?;

        Ok(Self {
            options,
            database_name: db_name.unwrap_or(DEFAULT_DATABASE).to_owned(),
        })
    }

    /// Build the configuration from `MONGO_URI` / `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
