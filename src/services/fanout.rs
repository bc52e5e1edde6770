//! Broadcast of region events to every subscribed connection.

use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use crate::{dao::world_store::WorldStore, dto::ws::RegionEvent, error::ServiceError};

/// Result of pushing one payload to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The payload was handed to the connection's writer.
    Delivered,
    /// The connection is permanently gone and its record should be pruned.
    Gone,
    /// A transient delivery failure; the connection record is kept.
    Failed(String),
}

/// Push side of the transport, seam between fanout and the socket registry.
///
/// Abstracted so the broadcast path can be exercised without real sockets.
pub trait Transport: Send + Sync {
    /// Push one serialized payload to one connection.
    fn push(&self, connection_id: &str, payload: String) -> BoxFuture<'static, PushOutcome>;
}

/// Deliver `event` to every connection subscribed to `region_id`.
///
/// The event is serialized once and pushed to all recipients concurrently. A
/// failure against one connection never affects delivery to the others: gone
/// connections are pruned from the registry, transient failures are logged
/// and skipped. The broadcast itself is best-effort and only storage errors
/// on the recipient lookup propagate.
pub async fn broadcast_region(
    store: &Arc<dyn WorldStore>,
    transport: &dyn Transport,
    region_id: &str,
    event: &RegionEvent,
) -> Result<(), ServiceError> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(region_id, error = %err, "failed to serialize region event");
            return Ok(());
        }
    };

    let recipients = store.connections_by_region(region_id).await?;
    if recipients.is_empty() {
        debug!(region_id, "no subscribers for region event");
        return Ok(());
    }

    let pushes = recipients.iter().map(|connection| {
        let connection_id = connection.connection_id.clone();
        let push = transport.push(&connection.connection_id, payload.clone());
        async move { (connection_id, push.await) }
    });

    for (connection_id, outcome) in join_all(pushes).await {
        match outcome {
            PushOutcome::Delivered => {}
            PushOutcome::Gone => {
                debug!(connection_id, region_id, "pruning gone connection");
                if let Err(err) = store.delete_connection(&connection_id).await {
                    warn!(connection_id, error = %err, "failed to prune gone connection");
                }
            }
            PushOutcome::Failed(reason) => {
                warn!(connection_id, region_id, reason, "event delivery failed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex, time::SystemTime};

    use dashmap::DashMap;

    use super::*;
    use crate::{
        catalog::{EntityCategory, EntityDefinition},
        dao::{
            models::{ConnectionRecord, EntityRecord},
            world_store::memory::MemoryWorldStore,
        },
        dto::{
            map::EntityView,
            ws::{ChangeType, RegionEvent},
        },
    };

    struct RecordingTransport {
        delivered: DashMap<String, Vec<String>>,
        gone: Mutex<HashSet<String>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                delivered: DashMap::new(),
                gone: Mutex::new(HashSet::new()),
                failing: Mutex::new(HashSet::new()),
            }
        }

        fn mark_gone(&self, connection_id: &str) {
            self.gone.lock().unwrap().insert(connection_id.to_string());
        }

        fn mark_failing(&self, connection_id: &str) {
            self.failing
                .lock()
                .unwrap()
                .insert(connection_id.to_string());
        }

        fn deliveries(&self, connection_id: &str) -> usize {
            self.delivered
                .get(connection_id)
                .map(|frames| frames.len())
                .unwrap_or(0)
        }
    }

    impl Transport for RecordingTransport {
        fn push(&self, connection_id: &str, payload: String) -> BoxFuture<'static, PushOutcome> {
            let outcome = if self.gone.lock().unwrap().contains(connection_id) {
                PushOutcome::Gone
            } else if self.failing.lock().unwrap().contains(connection_id) {
                PushOutcome::Failed("boom".to_string())
            } else {
                self.delivered
                    .entry(connection_id.to_string())
                    .or_default()
                    .push(payload);
                PushOutcome::Delivered
            };
            Box::pin(async move { outcome })
        }
    }

    fn sample_event() -> RegionEvent {
        let definition = EntityDefinition {
            id: "house".to_string(),
            name: "House".to_string(),
            category: EntityCategory::Building,
            width: 2,
            height: 2,
            price: 100,
            build_time_secs: 30,
            image: String::new(),
            description: None,
            stats: Default::default(),
        };
        let record = EntityRecord {
            region_id: "r1".to_string(),
            entity_key: "house#2_2#k".to_string(),
            entity_definition_id: "house".to_string(),
            x: 2,
            y: 2,
            owner_id: None,
            params: Default::default(),
        };
        RegionEvent::entity_updated(ChangeType::Modify, EntityView::materialize(record, &definition))
    }

    async fn subscribed(store: &Arc<dyn WorldStore>, connection_id: &str, region_id: &str) {
        store
            .put_connection(ConnectionRecord {
                connection_id: connection_id.to_string(),
                region_id: None,
                connected_at: SystemTime::now(),
            })
            .await
            .unwrap();
        store
            .subscribe_connection(connection_id, region_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gone_connection_is_pruned_and_others_still_receive() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        subscribed(&store, "alive-1", "r1").await;
        subscribed(&store, "stale", "r1").await;
        subscribed(&store, "alive-2", "r1").await;

        let transport = RecordingTransport::new();
        transport.mark_gone("stale");

        broadcast_region(&store, &transport, "r1", &sample_event())
            .await
            .unwrap();

        assert_eq!(transport.deliveries("alive-1"), 1);
        assert_eq!(transport.deliveries("alive-2"), 1);
        assert_eq!(transport.deliveries("stale"), 0);

        let remaining = store.connections_by_region("r1").await.unwrap();
        let ids: Vec<_> = remaining
            .iter()
            .map(|connection| connection.connection_id.as_str())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!ids.contains(&"stale"));
    }

    #[tokio::test]
    async fn transient_failure_keeps_the_connection_registered() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        subscribed(&store, "flaky", "r1").await;

        let transport = RecordingTransport::new();
        transport.mark_failing("flaky");

        broadcast_region(&store, &transport, "r1", &sample_event())
            .await
            .unwrap();

        let remaining = store.connections_by_region("r1").await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn deleted_connection_is_never_contacted() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        subscribed(&store, "leaver", "r1").await;
        store.delete_connection("leaver").await.unwrap();

        let transport = RecordingTransport::new();
        broadcast_region(&store, &transport, "r1", &sample_event())
            .await
            .unwrap();

        assert_eq!(transport.deliveries("leaver"), 0);
    }

    #[tokio::test]
    async fn events_stay_scoped_to_the_subscribed_region() {
        let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
        subscribed(&store, "in-region", "r1").await;
        subscribed(&store, "elsewhere", "r2").await;

        let transport = RecordingTransport::new();
        broadcast_region(&store, &transport, "r1", &sample_event())
            .await
            .unwrap();

        assert_eq!(transport.deliveries("in-region"), 1);
        assert_eq!(transport.deliveries("elsewhere"), 0);
    }
}
