/// Durable record definitions shared across storage backends.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// World store trait and its backends.
pub mod world_store;
