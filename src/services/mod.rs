//! Business logic services, kept free of HTTP concerns.

/// Region-scoped event fanout over live connections.
pub mod fanout;
/// Deferred task finalization: effects, status CAS and broadcast.
pub mod finalizer;
/// Health reporting.
pub mod health_service;
/// Region map reads and entity placement/removal.
pub mod map_service;
/// Durable connection registry operations.
pub mod registry;
/// Degraded-mode storage supervision.
pub mod storage_supervisor;
/// Generate/move task creation.
pub mod task_service;
/// Trigger delivery worker with retries and dead-lettering.
pub mod trigger_worker;
/// WebSocket session lifecycle.
pub mod websocket_service;

/// OpenAPI documentation assembly.
pub mod documentation;
