use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::app_system::config::{SyncConfig, SyncMode};
use crate::clients::{DraftSource, RetrySignal, SyncClient};
use crate::domain::OrderDraft;
use crate::engine::SyncEngine;
use crate::error::SessionError;
use crate::messages::{SyncPhase, SyncStatus};
use crate::reconciler::Reconciler;

/// One editing session: the draft source, its sync engine and the task that feeds
/// engine results back into the draft.
///
/// Responsible for starting the tasks, wiring them together, and tearing them down.
/// Dropping the session tears it down as well; [`shutdown`](Self::shutdown) also waits
/// for the tasks to finish.
pub struct DraftSyncSession {
    source: DraftSource,
    client: SyncClient,
    mode: SyncMode,
    status: watch::Receiver<Option<SyncStatus>>,
    events: Option<mpsc::Receiver<SyncStatus>>,
    handles: Vec<JoinHandle<()>>,
}

impl DraftSyncSession {
    /// Starts a session over `initial`. Must be called from within a tokio runtime.
    pub fn start<R: Reconciler>(
        config: SyncConfig,
        initial: OrderDraft,
        reconciler: Arc<R>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let mode = config.mode;
        info!(mode = %mode, debounce_ms = config.debounce.as_millis() as u64, "Starting sync session");

        let source = DraftSource::new(initial.clone());
        let (engine, client, statuses) = SyncEngine::new(
            source.subscribe(),
            mode.policy(),
            reconciler,
            config.engine_settings(&initial),
        );
        let engine = engine.with_preparer(mode.preparer());
        let engine_handle = tokio::spawn(engine.run());

        let (status_sender, status) = watch::channel(None);
        let (event_sender, events) = mpsc::channel(config.status_buffer);
        let consumer = StatusConsumer {
            source: source.clone(),
            mode,
            status: status_sender,
            events: event_sender,
        };
        let consumer_handle = tokio::spawn(
            consumer
                .run(statuses)
                .instrument(tracing::info_span!("status_consumer", mode = %mode)),
        );

        Ok(Self {
            source,
            client,
            mode,
            status,
            events: Some(events),
            handles: vec![engine_handle, consumer_handle],
        })
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn source(&self) -> &DraftSource {
        &self.source
    }

    pub fn current(&self) -> OrderDraft {
        self.source.current()
    }

    /// Applies a user edit to the draft. Returns `false` when the edit changes nothing.
    pub fn edit(&self, edit: impl FnOnce(&mut OrderDraft)) -> bool {
        self.source.update(edit)
    }

    pub fn retry(&self) -> bool {
        self.client.retry()
    }

    pub fn retry_signal(&self) -> RetrySignal {
        self.client.retry_signal()
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    /// The most recent status, `None` while nothing has happened yet.
    pub fn latest_status(&self) -> Option<SyncStatus> {
        self.status.borrow().clone()
    }

    pub fn latest_phase(&self) -> SyncPhase {
        self.status
            .borrow()
            .as_ref()
            .map(SyncStatus::phase)
            .unwrap_or_default()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<SyncStatus>> {
        self.status.clone()
    }

    /// Hands out the ordered status stream. Only the first call gets it.
    ///
    /// The stream is bounded by `status_buffer` and lossy: when its holder falls
    /// behind, newer statuses are dropped with a warning instead of stalling the
    /// engine. [`latest_status`](Self::latest_status) is always current.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SyncStatus>> {
        self.events.take()
    }

    pub async fn shutdown(mut self) -> Result<(), SessionError> {
        info!("Shutting down sync session...");
        self.client.shutdown();

        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                error!("Session task failed: {:?}", e);
                return Err(SessionError::TaskFailed(e.to_string()));
            }
        }

        info!("Sync session shutdown complete.");
        Ok(())
    }
}

impl Drop for DraftSyncSession {
    fn drop(&mut self) {
        self.client.shutdown();
    }
}

/// Applies engine results to the draft source and republishes them.
struct StatusConsumer {
    source: DraftSource,
    mode: SyncMode,
    status: watch::Sender<Option<SyncStatus>>,
    events: mpsc::Sender<SyncStatus>,
}

impl StatusConsumer {
    async fn run(self, mut statuses: mpsc::Receiver<SyncStatus>) {
        while let Some(status) = statuses.recv().await {
            self.handle_status(&status);
            self.status.send_replace(Some(status.clone()));
            match self.events.try_send(status) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    warn!(phase = %dropped.phase(), "Event stream full, status dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        debug!("Status stream ended");
    }

    #[instrument(skip(self, status), fields(phase = %status.phase()))]
    fn handle_status(&self, status: &SyncStatus) {
        match status {
            SyncStatus::Succeeded(order) => {
                let mode = self.mode;
                let changed = self
                    .source
                    .apply_reconciled(order.clone(), |current, reconciled| mode.merge(current, reconciled));
                debug!(changed, order_id = order.id, "Reconciled order written back");
            }
            SyncStatus::Failed(e) if e.is_invalid_coupon() => {
                info!(error = %e, "Removing rejected coupons");
                self.source.update(|draft| draft.coupon_lines.clear());
            }
            SyncStatus::Failed(e) => {
                debug!(error = %e, transient = e.is_transient(), "Sync failed, waiting for retry");
            }
            SyncStatus::PendingDebounce | SyncStatus::Ongoing => {}
        }
    }
}
