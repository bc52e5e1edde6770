//! Central application state shared across handlers.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    config::AppConfig,
    dao::world_store::WorldStore,
    error::ServiceError,
    scheduler::{TaskTrigger, TriggerScheduler},
    services::fanout::{PushOutcome, Transport},
};

/// Cheaply clonable handle to the application state.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push frames to one connected WebSocket peer.
pub struct SocketConnection {
    /// Transport-assigned connection id.
    pub id: String,
    /// Writer channel feeding the connection's outbound task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: store handle, live sockets, catalog and
/// scheduler.
///
/// All request handlers and the trigger delivery worker are stateless apart
/// from this shared structure; durable world state always lives behind the
/// [`WorldStore`].
pub struct AppState {
    world_store: RwLock<Option<Arc<dyn WorldStore>>>,
    sockets: DashMap<String, SocketConnection>,
    catalog: Catalog,
    scheduler: Arc<dyn TriggerScheduler>,
    config: Arc<AppConfig>,
    dead_letters: DashMap<Uuid, TaskTrigger>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(config: AppConfig, scheduler: Arc<dyn TriggerScheduler>) -> SharedState {
        let catalog = Catalog::new(config.definitions().to_vec());
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            world_store: RwLock::new(None),
            sockets: DashMap::new(),
            catalog,
            scheduler,
            config: Arc::new(config),
            dead_letters: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current world store, if one is installed.
    pub async fn world_store(&self) -> Option<Arc<dyn WorldStore>> {
        let guard = self.world_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the world store or fail with [`ServiceError::Degraded`].
    pub async fn require_world_store(&self) -> Result<Arc<dyn WorldStore>, ServiceError> {
        self.world_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn set_world_store(&self, store: Arc<dyn WorldStore>) {
        {
            let mut guard = self.world_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Whether the application currently runs without a storage backend.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.world_store.read().await;
        guard.is_none()
    }

    /// Update and broadcast the degraded flag.
    pub async fn update_degraded(&self, value: bool) {
        let _ = self.degraded.send(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of live WebSocket writers keyed by connection id.
    ///
    /// This is transport state, not world state: the durable connection
    /// records live in the store.
    pub fn sockets(&self) -> &DashMap<String, SocketConnection> {
        &self.sockets
    }

    /// Immutable entity-definition catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Trigger scheduler handle.
    pub fn scheduler(&self) -> Arc<dyn TriggerScheduler> {
        self.scheduler.clone()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Record a trigger whose delivery retries were exhausted.
    pub fn dead_letter(&self, trigger: TaskTrigger) {
        self.dead_letters.insert(trigger.task_id, trigger);
    }

    /// Number of dead-lettered triggers since startup.
    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }
}

impl Transport for AppState {
    fn push(&self, connection_id: &str, payload: String) -> BoxFuture<'static, PushOutcome> {
        let sender = self
            .sockets
            .get(connection_id)
            .map(|connection| connection.tx.clone());
        Box::pin(async move {
            match sender {
                // No live socket for the record: the peer is gone as far as
                // this instance is concerned.
                None => PushOutcome::Gone,
                Some(tx) => match tx.send(Message::Text(payload.into())) {
                    Ok(()) => PushOutcome::Delivered,
                    Err(_) => PushOutcome::Gone,
                },
            }
        })
    }
}
