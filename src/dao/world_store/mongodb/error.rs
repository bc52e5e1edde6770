//! Errors raised by the MongoDB backend.

use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// MongoDB-specific failure taxonomy; collapses into
/// [`StorageError::Unavailable`] at the trait boundary.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The client could not be built from the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Initial connectivity could not be established.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of ping attempts made.
        attempts: u32,
        /// Driver error from the final attempt.
        #[source]
        source: MongoError,
    },
    /// A health-check ping failed on an established connection.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Index description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An entity write failed.
    #[error("failed to write entity `{entity_key}` in region `{region_id}`")]
    WriteEntity {
        /// Region partition.
        region_id: String,
        /// Entity key within the region.
        entity_key: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An entity read failed.
    #[error("failed to load entity `{entity_key}` in region `{region_id}`")]
    LoadEntity {
        /// Region partition.
        region_id: String,
        /// Entity key within the region.
        entity_key: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A region-scoped entity listing failed.
    #[error("failed to list entities of region `{region_id}`")]
    ListEntities {
        /// Region partition.
        region_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A task write failed.
    #[error("failed to write task `{id}`")]
    WriteTask {
        /// Task id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A task read failed.
    #[error("failed to load task `{id}`")]
    LoadTask {
        /// Task id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A connection-record write failed.
    #[error("failed to write connection `{id}`")]
    WriteConnection {
        /// Connection id.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A region-scoped connection lookup failed.
    #[error("failed to list connections of region `{region_id}`")]
    ListConnections {
        /// Region partition.
        region_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
