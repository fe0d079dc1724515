//! Handles used by the editing layer: the draft source it writes to and the client
//! that talks to a running sync engine.

mod draft_source;
mod sync_client;

pub use draft_source::DraftSource;
pub use sync_client::{RetrySignal, SyncClient};
