//! Wire-facing request/response and message shapes.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Catalog listing DTOs.
pub mod catalog;
/// Health endpoint DTOs.
pub mod health;
/// Region map and placement DTOs.
pub mod map;
/// Task creation DTOs.
pub mod task;
/// Shared validation helpers.
pub mod validation;
/// WebSocket message shapes.
pub mod ws;

/// Render a timestamp as RFC 3339 for HTTP responses.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
