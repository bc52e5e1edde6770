//! Durable connection registry: the store-backed side of the WebSocket
//! lifecycle.

use std::time::SystemTime;

use tracing::info;

use crate::{dao::models::ConnectionRecord, error::ServiceError, state::SharedState};

/// Record a freshly established connection, not yet subscribed anywhere.
pub async fn register(state: &SharedState, connection_id: &str) -> Result<(), ServiceError> {
    let store = state.require_world_store().await?;
    store
        .put_connection(ConnectionRecord {
            connection_id: connection_id.to_string(),
            region_id: None,
            connected_at: SystemTime::now(),
        })
        .await?;
    info!(connection_id, "connection registered");
    Ok(())
}

/// Point a connection's subscription at a region, replacing any previous one.
pub async fn subscribe(
    state: &SharedState,
    connection_id: &str,
    region_id: &str,
) -> Result<(), ServiceError> {
    let store = state.require_world_store().await?;
    store.subscribe_connection(connection_id, region_id).await?;
    info!(connection_id, region_id, "connection subscribed to region");
    Ok(())
}

/// Drop a connection's durable record on disconnect.
pub async fn unregister(state: &SharedState, connection_id: &str) -> Result<(), ServiceError> {
    let store = state.require_world_store().await?;
    store.delete_connection(connection_id).await?;
    info!(connection_id, "connection unregistered");
    Ok(())
}
