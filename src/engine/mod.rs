//! The sync engine: one actor per order under edit.
//!
//! The engine watches the draft source, filters transitions through its
//! [`SyncPolicy`], debounces bursts of edits and keeps at most one reconcile call in
//! flight. Everything it learns is reported as a [`SyncStatus`] stream; it never
//! writes to the draft source itself.
//!
//! ```text
//! Idle -> PendingDebounce -> Ongoing -> Succeeded | Failed
//!                 ^                          |
//!                 +------- new edit ---------+     (retry goes straight to Ongoing)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clients::SyncClient;
use crate::domain::OrderDraft;
use crate::error::SyncError;
use crate::messages::{SyncPhase, SyncRequest, SyncStatus};
use crate::policy::SyncPolicy;
use crate::reconciler::Reconciler;

#[cfg(test)]
use crate::messages::EngineSnapshot;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Transformation applied to every observed draft before it is compared or sent.
pub type DraftPreparer = Box<dyn Fn(OrderDraft) -> OrderDraft + Send + Sync>;

type InFlight = Pin<Box<dyn Future<Output = Result<OrderDraft, SyncError>> + Send>>;

/// Knobs injected into an engine at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub debounce: Duration,
    pub status_buffer: usize,
    /// The draft the first observed value is compared against.
    pub baseline: OrderDraft,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            status_buffer: 32,
            baseline: OrderDraft::empty(),
        }
    }
}

pub struct SyncEngine<P: SyncPolicy, R: Reconciler> {
    drafts: watch::Receiver<OrderDraft>,
    requests: mpsc::Receiver<SyncRequest>,
    statuses: mpsc::Sender<SyncStatus>,
    cancel: CancellationToken,
    policy: P,
    reconciler: Arc<R>,
    debounce: Duration,
    prepare: DraftPreparer,

    /// Last observed draft, the reference for the next significance check.
    last_seen: OrderDraft,
    /// What a dispatch would send. `None` until something significant was observed.
    latest: Option<OrderDraft>,
    phase: SyncPhase,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    dispatched_revision: u64,
    resync_pending: bool,
    dispatched: u64,
    drafts_open: bool,
    requests_open: bool,
    consumer_gone: bool,
}

impl<P: SyncPolicy, R: Reconciler> SyncEngine<P, R> {
    /// Builds an engine plus the client handle and the status stream it feeds.
    ///
    /// The engine does nothing until [`run`](Self::run) is spawned.
    pub fn new(
        drafts: watch::Receiver<OrderDraft>,
        policy: P,
        reconciler: Arc<R>,
        settings: EngineSettings,
    ) -> (Self, SyncClient, mpsc::Receiver<SyncStatus>) {
        let (request_sender, requests) = mpsc::channel(1);
        let (statuses, status_receiver) = mpsc::channel(settings.status_buffer.max(1));
        let cancel = CancellationToken::new();

        let engine = Self {
            drafts,
            requests,
            statuses,
            cancel: cancel.clone(),
            policy,
            reconciler,
            debounce: settings.debounce,
            prepare: Box::new(|draft| draft),
            last_seen: settings.baseline,
            latest: None,
            phase: SyncPhase::Idle,
            deadline: None,
            in_flight: None,
            dispatched_revision: 0,
            resync_pending: false,
            dispatched: 0,
            drafts_open: true,
            requests_open: true,
            consumer_gone: false,
        };
        let client = SyncClient::new(request_sender, cancel);
        (engine, client, status_receiver)
    }

    /// Installs the per-mode draft transformation. The baseline goes through it too.
    pub fn with_preparer(
        mut self,
        prepare: impl Fn(OrderDraft) -> OrderDraft + Send + Sync + 'static,
    ) -> Self {
        self.last_seen = prepare(self.last_seen);
        self.prepare = Box::new(prepare);
        self
    }

    /// Main loop. Returns when the engine is cancelled, the status consumer goes away,
    /// or both inputs are closed with no work left.
    #[instrument(name = "sync_engine", skip(self))]
    pub async fn run(mut self) {
        info!(
            policy = self.policy.name(),
            debounce_ms = self.debounce.as_millis() as u64,
            "SyncEngine starting"
        );

        let first = self.drafts.borrow_and_update().clone();
        self.handle_draft(first).await;

        while self.is_active() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("SyncEngine cancelled");
                    break;
                }
                _ = self.statuses.closed() => {
                    info!("Status consumer went away");
                    break;
                }
                outcome = next_outcome(&mut self.in_flight) => {
                    self.handle_outcome(outcome).await;
                }
                changed = self.drafts.changed(), if self.drafts_open => match changed {
                    Ok(()) => {
                        let draft = self.drafts.borrow_and_update().clone();
                        self.handle_draft(draft).await;
                    }
                    Err(_) => {
                        debug!("Draft source closed");
                        self.drafts_open = false;
                    }
                },
                request = self.requests.recv(), if self.requests_open => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("All client handles dropped");
                        self.requests_open = false;
                    }
                },
                _ = sleep_until(self.deadline) => {
                    self.handle_debounce_elapsed().await;
                }
            }
        }

        if self.in_flight.take().is_some() {
            debug!("Abandoned in-flight reconcile");
        }
        info!(dispatched = self.dispatched, "SyncEngine stopped");
    }

    fn is_active(&self) -> bool {
        if self.consumer_gone || self.cancel.is_cancelled() {
            return false;
        }
        self.drafts_open || self.requests_open || self.in_flight.is_some() || self.deadline.is_some()
    }

    #[instrument(fields(revision = draft.local_revision, phase = %self.phase), skip(self, draft))]
    async fn handle_draft(&mut self, draft: OrderDraft) {
        let draft = (self.prepare)(draft);
        let significant = self.policy.is_significant(&self.last_seen, &draft);
        self.last_seen = draft.clone();

        if !significant {
            debug!("Change not significant");
            // Insignificant edits still ride along with the next dispatch.
            if self.latest.is_some() {
                self.latest = Some(draft);
            }
            return;
        }

        self.latest = Some(draft);
        if self.in_flight.is_some() {
            debug!("Reconcile in flight, follow-up queued");
            self.resync_pending = true;
            return;
        }
        self.arm_debounce().await;
    }

    async fn handle_request(&mut self, request: SyncRequest) {
        match request {
            SyncRequest::Retry => self.handle_retry().await,
            #[cfg(test)]
            SyncRequest::GetSnapshot { respond_to } => {
                let _ = respond_to.send(EngineSnapshot {
                    phase: self.phase,
                    dispatched: self.dispatched,
                    in_flight: self.in_flight.is_some(),
                    resync_pending: self.resync_pending,
                    debounce_armed: self.deadline.is_some(),
                });
            }
        }
    }

    #[instrument(fields(phase = %self.phase), skip(self))]
    async fn handle_retry(&mut self) {
        if self.in_flight.is_some() {
            debug!("Retry ignored, reconcile already in flight");
            return;
        }
        let Some(draft) = self.latest.clone() else {
            debug!("Retry ignored, nothing to sync yet");
            return;
        };
        info!("Retrying immediately");
        self.deadline = None;
        self.dispatch(draft).await;
    }

    async fn handle_debounce_elapsed(&mut self) {
        self.deadline = None;
        if let Some(draft) = self.latest.clone() {
            self.dispatch(draft).await;
        }
    }

    #[instrument(fields(revision = self.dispatched_revision), skip(self, outcome))]
    async fn handle_outcome(&mut self, outcome: Result<OrderDraft, SyncError>) {
        self.in_flight = None;

        match outcome {
            Ok(mut order) => {
                if self.resync_pending {
                    // Stamped with what was sent, so the caller will not write it back
                    // over the newer edits. Those get their own round trip.
                    debug!("Result overtaken by significant local edits");
                    order.local_revision = self.dispatched_revision;
                } else {
                    // Edits since dispatch, if any, were insignificant: the result still
                    // describes the latest draft.
                    order.local_revision = self
                        .latest
                        .as_ref()
                        .map_or(self.dispatched_revision, |latest| latest.local_revision);
                    let baseline = (self.prepare)(order.clone());
                    self.last_seen = baseline.clone();
                    self.latest = Some(baseline);
                }
                info!(order_id = order.id, total = %order.total, "Reconcile succeeded");
                self.emit(SyncStatus::Succeeded(order)).await;
            }
            Err(error) => {
                warn!(error = %error, transient = error.is_transient(), "Reconcile failed");
                self.emit(SyncStatus::Failed(error)).await;
            }
        }

        if std::mem::take(&mut self.resync_pending) {
            self.arm_debounce().await;
        }
    }

    async fn arm_debounce(&mut self) {
        self.deadline = Some(Instant::now() + self.debounce);
        if self.phase != SyncPhase::PendingDebounce {
            self.emit(SyncStatus::PendingDebounce).await;
        }
    }

    /// Starts a reconcile call unless one is already running.
    #[instrument(fields(revision = draft.local_revision, order_id = draft.id), skip(self, draft))]
    async fn dispatch(&mut self, draft: OrderDraft) {
        if self.in_flight.is_some() {
            warn!("Dispatch refused, reconcile already in flight");
            return;
        }
        self.dispatched += 1;
        self.dispatched_revision = draft.local_revision;
        let reconciler = Arc::clone(&self.reconciler);
        self.in_flight = Some(Box::pin(async move { reconciler.reconcile(draft).await }));
        debug!(dispatched = self.dispatched, "Reconcile dispatched");
        self.emit(SyncStatus::Ongoing).await;
    }

    async fn emit(&mut self, status: SyncStatus) {
        self.phase = status.phase();
        debug!(phase = %self.phase, "Emitting status");
        tokio::select! {
            sent = self.statuses.send(status) => {
                if sent.is_err() {
                    self.consumer_gone = true;
                }
            }
            _ = self.cancel.cancelled() => {}
        }
    }
}

async fn next_outcome(in_flight: &mut Option<InFlight>) -> Result<OrderDraft, SyncError> {
    match in_flight.as_mut() {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
