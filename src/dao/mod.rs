/// Database model definitions shared across backends.
pub mod models;
/// Quiz content and final result storage backends.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
