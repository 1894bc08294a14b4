#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geofenced incident alerting.
//!
//! Incidents arrive from a bulk fetch and a live push stream; zones come
//! from the user (named zones) and from the device's live position (the
//! self zone). [`AlertEngine`] decides which incidents fall inside which
//! zones and emits an [`AlertIntent`] exactly once per (zone, incident)
//! pair. [`runtime::spawn_engine`] wraps it in a tokio task with a
//! subscribable alert stream and a non-blocking notification queue.

pub mod engine;
pub mod feed;
pub mod ledger;
pub mod notify;
pub mod parsing;
pub mod runtime;
pub mod zone_store;

pub use engine::{AlertEngine, AlertIntent, BatchOutcome};
pub use feed::{IncidentFeed, IngestOutcome, IngestReport};
pub use ledger::{AlertKey, AlertLedger};
pub use notify::{AlertNotification, LogNotifier, Notifier};
pub use runtime::{EngineHandle, LocationWatch, RuntimeConfig, spawn_engine};
pub use zone_store::ZoneStore;

use safezone_zone_models::ValidationError;

/// Why an incident record was skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// The record was not a JSON object.
    #[error("record is not an object")]
    NotAnObject,

    /// Neither `_id` nor `id` held a usable identifier.
    #[error("record has no id")]
    MissingId,

    /// `lat` or `lng` was absent or not numeric.
    #[error("record has a missing or non-numeric lat/lng")]
    MissingCoordinate,

    /// `lat`/`lng` parsed but lie outside the valid range.
    #[error("record coordinate out of range: {0}")]
    OutOfRange(#[from] safezone_geo::CoordinateError),
}

/// A notification channel failed to deliver an alert.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The channel is not reachable (permissions revoked, device offline).
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    /// I/O failure while writing the notification.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned through an [`EngineHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Zone input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The engine task is no longer running.
    #[error("alert engine has stopped")]
    Stopped,
}
