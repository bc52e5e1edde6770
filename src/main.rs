//! Grid Nations Back binary entrypoint wiring REST, WebSocket, scheduling and
//! storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grid_nations_back::{
    config::AppConfig,
    routes,
    scheduler::local::LocalTriggerScheduler,
    services::trigger_worker,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (scheduler, due_rx) = LocalTriggerScheduler::new();
    let app_state = AppState::new(config, Arc::new(scheduler));

    tokio::spawn(trigger_worker::run(app_state.clone(), due_rx));
    spawn_storage(app_state.clone()).await;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured storage backend: MongoDB under supervision when a
/// URI is configured, the in-process store otherwise.
#[cfg(feature = "mongo-store")]
async fn spawn_storage(state: SharedState) {
    use grid_nations_back::{
        dao::world_store::mongodb::{MongoConfig, MongoWorldStore},
        services::storage_supervisor,
    };

    match env::var("MONGO_URI") {
        Ok(uri) => {
            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoWorldStore::connect(config).await?;
                    Ok(Arc::new(store) as Arc<dyn grid_nations_back::dao::world_store::WorldStore>)
                }
            }));
        }
        Err(_) => install_memory_store(state).await,
    }
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_storage(state: SharedState) {
    install_memory_store(state).await;
}

/// Fall back to the in-process store; world state will not survive restarts.
async fn install_memory_store(state: SharedState) {
    use grid_nations_back::dao::world_store::{WorldStore, memory::MemoryWorldStore};

    info!("MONGO_URI not set; using in-memory storage");
    let store: Arc<dyn WorldStore> = Arc::new(MemoryWorldStore::new());
    state.set_world_store(store).await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
