//! # Mock Framework
//!
//! Reconcilers for testing the engine and the session without a remote store.
//!
//! Use [`create_mock_reconciler`] to get a reconciler and a receiver of the calls it
//! gets, then [`expect_reconcile`] to take the next call and answer it by hand.
//! [`ScriptedReconciler`] answers on its own and records what it saw.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::domain::OrderDraft;
use crate::error::SyncError;
use crate::reconciler::Reconciler;

pub type ReconcileResponder = oneshot::Sender<Result<OrderDraft, SyncError>>;
pub type ReconcileCall = (OrderDraft, ReconcileResponder);

/// Forwards every reconcile call to a channel the test controls.
pub struct ChannelReconciler {
    sender: mpsc::Sender<ReconcileCall>,
}

#[async_trait]
impl Reconciler for ChannelReconciler {
    async fn reconcile(&self, draft: OrderDraft) -> Result<OrderDraft, SyncError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send((draft, respond_to))
            .await
            .map_err(|_| SyncError::NetworkError("Mock receiver dropped".to_string()))?;
        response
            .await
            .map_err(|_| SyncError::NetworkError("Mock responder dropped".to_string()))?
    }
}

/// Creates a mock reconciler and a receiver for asserting and answering its calls.
///
/// The test decides when and how each call completes, which makes overlap and
/// out-of-order scenarios deterministic.
pub fn create_mock_reconciler(buffer_size: usize) -> (ChannelReconciler, mpsc::Receiver<ReconcileCall>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ChannelReconciler { sender }, receiver)
}

/// Helper to take the next reconcile call.
pub async fn expect_reconcile(receiver: &mut mpsc::Receiver<ReconcileCall>) -> Option<ReconcileCall> {
    receiver.recv().await
}

/// Echoes drafts back with a remote id, after an optional latency.
///
/// Queued failures are returned first, one per call.
pub struct ScriptedReconciler {
    latency: Duration,
    failures: Mutex<VecDeque<SyncError>>,
    received: Mutex<Vec<OrderDraft>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedReconciler {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failures: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(self, error: SyncError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn received(&self) -> Vec<OrderDraft> {
        self.received.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reconciler for ScriptedReconciler {
    async fn reconcile(&self, draft: OrderDraft) -> Result<OrderDraft, SyncError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.received.lock().unwrap().push(draft.clone());

        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut reconciled = draft;
        if reconciled.id == 0 {
            reconciled.id = 100;
        }
        reconciled.number = reconciled.id.to_string();
        Ok(reconciled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reconciler() {
        let (reconciler, mut calls) = create_mock_reconciler(10);

        let call = tokio::spawn(async move { reconciler.reconcile(OrderDraft::empty().with_note("Hi")).await });

        let (draft, responder) = expect_reconcile(&mut calls).await.expect("Expected reconcile");
        assert_eq!(draft.customer_note, "Hi");
        let mut reconciled = draft.clone();
        reconciled.id = 3;
        responder.send(Ok(reconciled.clone())).unwrap();

        assert_eq!(call.await.unwrap(), Ok(reconciled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_reconciler_fails_then_echoes() {
        let reconciler = ScriptedReconciler::new(Duration::from_millis(50))
            .fail_next(SyncError::NetworkError("offline".into()));

        let first = reconciler.reconcile(OrderDraft::empty()).await;
        let second = reconciler.reconcile(OrderDraft::empty()).await.unwrap();

        assert_eq!(first, Err(SyncError::NetworkError("offline".into())));
        assert_eq!(second.id, 100);
        assert_eq!(second.number, "100");
        assert_eq!(reconciler.calls(), 2);
        assert_eq!(reconciler.max_concurrency(), 1);
    }
}
