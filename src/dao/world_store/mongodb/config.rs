//! Connection settings for the MongoDB backend.

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Parsed client options plus the database name to operate on.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed MongoDB client options.
    pub options: ClientOptions,
    /// Name of the database holding the world tables.
    pub database_name: String,
}

impl MongoConfig {
    /// Build a configuration from a connection URI and optional database
    /// name.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("grid_nations").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}
