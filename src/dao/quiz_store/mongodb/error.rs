use thiserror::Error;

/// Result alias for MongoDB-backed operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors produced by the MongoDB quiz store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Driver-side parse failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A required environment variable is missing.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// The client object could not be constructed.
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// The initial ping never succeeded within the retry budget.
    #[error("MongoDB did not answer the initial ping after {attempts} attempts")]
    InitialPing {
        /// Number of attempts performed.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A health-check ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Index bootstrap failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index key description.
        index: &'static str,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A quiz document lookup failed.
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        /// Quiz identifier.
        id: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A final result insert failed.
    #[error("failed to save final result for session `{session_code}`")]
    SaveResult {
        /// Session join code of the result document.
        session_code: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
}
