use serde::{Deserialize, Serialize};
#[cfg(test)]
use tokio::sync::oneshot;

use crate::domain::OrderDraft;
use crate::error::SyncError;

/// Status events emitted by a sync engine, in the order they happen.
///
/// Consumers treat the stream as latest-wins: only the most recent status is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum SyncStatus {
    /// A significant change was observed and the debounce window is open.
    PendingDebounce,
    /// A reconcile call is in flight.
    Ongoing,
    /// The remote side returned a new authoritative draft.
    Succeeded(OrderDraft),
    Failed(SyncError),
}

impl SyncStatus {
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncStatus::PendingDebounce => SyncPhase::PendingDebounce,
            SyncStatus::Ongoing => SyncPhase::Ongoing,
            SyncStatus::Succeeded(_) => SyncPhase::Succeeded,
            SyncStatus::Failed(_) => SyncPhase::Failed,
        }
    }
}

/// Payload-free view of the engine state. `Idle` precedes the first status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    PendingDebounce,
    Ongoing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::PendingDebounce => "pending_debounce",
            SyncPhase::Ongoing => "ongoing",
            SyncPhase::Succeeded => "succeeded",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Messages accepted by a running engine besides draft changes.
#[derive(Debug)]
pub enum SyncRequest {
    /// Re-submit the latest draft now, bypassing the debounce window.
    Retry,
    #[cfg(test)]
    GetSnapshot {
        respond_to: oneshot::Sender<EngineSnapshot>,
    },
}

/// Internal engine state, exposed to tests only.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub phase: SyncPhase,
    pub dispatched: u64,
    pub in_flight: bool,
    pub resync_pending: bool,
    pub debounce_armed: bool,
}
