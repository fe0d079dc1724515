use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::domain::{OrderDraft, OrderStatus};
use crate::engine::{DraftPreparer, EngineSettings, DEFAULT_DEBOUNCE};
use crate::error::SessionError;
use crate::policy::{AnyChangePolicy, PriceAffectingPolicy, SyncPolicy};

/// What the editing screen is doing with the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// A new order. Only price-affecting edits are synced and the order is kept as
    /// a server-side auto-draft until the user submits it.
    #[default]
    Creation,
    /// An existing order. Every edit is synced.
    Edit,
}

impl SyncMode {
    pub fn policy(self) -> Box<dyn SyncPolicy> {
        match self {
            SyncMode::Creation => Box::new(PriceAffectingPolicy),
            SyncMode::Edit => Box::new(AnyChangePolicy),
        }
    }

    /// The draft the first observed value is compared against.
    ///
    /// In edit mode the loaded order is the starting point, so opening it syncs nothing.
    pub fn baseline(self, initial: &OrderDraft) -> OrderDraft {
        match self {
            SyncMode::Creation => OrderDraft::empty(),
            SyncMode::Edit => initial.clone(),
        }
    }

    pub fn preparer(self) -> DraftPreparer {
        match self {
            SyncMode::Creation => Box::new(|draft: OrderDraft| {
                draft
                    .with_status(OrderStatus::AutoDraft)
                    .sanitize_unsynced_items()
            }),
            SyncMode::Edit => Box::new(OrderDraft::sanitize_unsynced_items),
        }
    }

    /// Combines the current draft with a reconciled order on write-back.
    pub fn merge(self, current: &OrderDraft, reconciled: OrderDraft) -> OrderDraft {
        match self {
            // Only priced fields come from the remote copy. It is an auto-draft, and
            // it may predate note or address edits made while it was computed.
            SyncMode::Creation => OrderDraft {
                status: current.status.clone(),
                billing_address: current.billing_address.clone(),
                shipping_address: current.shipping_address.clone(),
                customer_note: current.customer_note.clone(),
                ..reconciled
            },
            SyncMode::Edit => reconciled,
        }
    }
}

impl FromStr for SyncMode {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "creation" | "create" => Ok(SyncMode::Creation),
            "edit" => Ok(SyncMode::Edit),
            other => Err(SessionError::InvalidConfig(format!("unknown sync mode '{}'", other))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Creation => f.write_str("creation"),
            SyncMode::Edit => f.write_str("edit"),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub debounce: Duration,
    pub status_buffer: usize,
    pub mode: SyncMode,
}

impl SyncConfig {
    /// Reads `ORDER_SYNC_DEBOUNCE_MS`, `ORDER_SYNC_STATUS_BUFFER` and `ORDER_SYNC_MODE`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Missing or unparsable values fall back to their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debounce = lookup("ORDER_SYNC_DEBOUNCE_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        let status_buffer = lookup("ORDER_SYNC_STATUS_BUFFER")
            .and_then(|value| value.parse().ok())
            .filter(|buffer: &usize| *buffer > 0)
            .unwrap_or(32);
        let mode = match lookup("ORDER_SYNC_MODE") {
            Some(value) => value.parse().unwrap_or_else(|e: SessionError| {
                warn!(error = %e, "Falling back to creation mode");
                SyncMode::Creation
            }),
            None => SyncMode::Creation,
        };
        Self {
            debounce,
            status_buffer,
            mode,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_status_buffer(mut self, status_buffer: usize) -> Self {
        self.status_buffer = status_buffer;
        self
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.status_buffer == 0 {
            return Err(SessionError::InvalidConfig("status buffer must be positive".to_string()));
        }
        Ok(())
    }

    pub fn engine_settings(&self, initial: &OrderDraft) -> EngineSettings {
        EngineSettings {
            debounce: self.debounce,
            status_buffer: self.status_buffer,
            baseline: self.mode.baseline(initial),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
