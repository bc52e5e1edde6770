//! MongoDB-backed [`WorldStore`](crate::dao::world_store::WorldStore).

/// Connection configuration.
pub mod config;
/// Client construction and retry policy.
pub mod connection;
/// MongoDB-specific error taxonomy.
pub mod error;
/// Document representations of the durable records.
pub mod models;
/// The store implementation itself.
pub mod store;

pub use config::MongoConfig;
pub use error::{MongoDaoError, MongoResult};
pub use store::MongoWorldStore;
