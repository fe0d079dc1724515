//! The remote side of the sync: send a draft, get back the authoritative order.

mod in_memory;

pub use in_memory::InMemoryReconciler;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::OrderDraft;
use crate::error::SyncError;

/// Sends a draft to the authoritative store and returns the recomputed order.
///
/// A draft with `id == 0` is created remotely; any other draft updates the existing
/// order. The engine never has more than one call outstanding per instance, so
/// implementations do not need to guard against overlapping calls from one engine.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, draft: OrderDraft) -> Result<OrderDraft, SyncError>;
}

#[async_trait]
impl<R: Reconciler + ?Sized> Reconciler for Arc<R> {
    async fn reconcile(&self, draft: OrderDraft) -> Result<OrderDraft, SyncError> {
        (**self).reconcile(draft).await
    }
}
