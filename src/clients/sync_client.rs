use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::messages::SyncRequest;

#[cfg(test)]
use crate::error::SessionError;
#[cfg(test)]
use crate::messages::EngineSnapshot;

/// Fire-and-forget trigger asking the engine to re-submit the latest draft now.
///
/// Triggers that arrive while one is still queued are coalesced into it.
#[derive(Clone)]
pub struct RetrySignal {
    sender: mpsc::Sender<SyncRequest>,
}

impl RetrySignal {
    /// Returns `false` once the engine has stopped.
    pub fn trigger(&self) -> bool {
        match self.sender.try_send(SyncRequest::Retry) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Retry already queued");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Handle to a running sync engine.
#[derive(Clone)]
pub struct SyncClient {
    sender: mpsc::Sender<SyncRequest>,
    cancel: CancellationToken,
}

impl SyncClient {
    pub fn new(sender: mpsc::Sender<SyncRequest>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    pub fn retry_signal(&self) -> RetrySignal {
        RetrySignal {
            sender: self.sender.clone(),
        }
    }

    #[instrument(skip(self))]
    pub fn retry(&self) -> bool {
        debug!("Sending retry request");
        self.retry_signal().trigger()
    }

    /// Tears the engine down. Any pending debounce and any in-flight call are abandoned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }

    /// Reads the engine's internal state. Waits for a free slot, unlike retries.
    #[cfg(test)]
    pub async fn snapshot(&self) -> Result<EngineSnapshot, SessionError> {
        let (respond_to, response) = tokio::sync::oneshot::channel();
        self.sender
            .send(SyncRequest::GetSnapshot { respond_to })
            .await
            .map_err(|_| SessionError::EngineCommunicationError("Engine closed".to_string()))?;
        response
            .await
            .map_err(|_| SessionError::EngineCommunicationError("Engine dropped".to_string()))
    }
}
