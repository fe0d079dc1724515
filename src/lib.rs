//! Keeps an order draft under edit in sync with the authoritative store.
//!
//! Edits are published through a [`DraftSource`](clients::DraftSource). A
//! [`SyncEngine`](engine::SyncEngine) watches it, debounces significant changes and
//! sends the latest draft to a [`Reconciler`](reconciler::Reconciler), at most one
//! call at a time. [`DraftSyncSession`](app_system::DraftSyncSession) wires the pieces
//! together and writes results back.

pub mod app_system;
pub mod clients;
pub mod domain;
pub mod engine;
pub mod error;
pub mod messages;
pub mod policy;
pub mod reconciler;

#[cfg(test)]
mod mock_framework;
