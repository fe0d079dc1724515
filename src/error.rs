use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the remote side refused a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    InvalidCoupon,
    InvalidQuantity,
    Other(String),
}

/// Errors produced by a reconcile attempt. Carried inside `SyncStatus::Failed`.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum SyncError {
    /// Connectivity or server trouble. Worth retrying.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// The remote side rejected the draft. The user has to correct it.
    #[error("Validation error: {message}")]
    ValidationError { kind: RejectionKind, message: String },
    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl SyncError {
    pub fn validation(kind: RejectionKind, message: impl Into<String>) -> Self {
        SyncError::ValidationError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NetworkError(_))
    }

    pub fn is_invalid_coupon(&self) -> bool {
        matches!(
            self,
            SyncError::ValidationError {
                kind: RejectionKind::InvalidCoupon,
                ..
            }
        )
    }
}

/// Errors raised by the session and client handles themselves.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Session task failed: {0}")]
    TaskFailed(String),
    #[error("Engine communication error: {0}")]
    EngineCommunicationError(String),
}
