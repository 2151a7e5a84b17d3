//! Orchestration error taxonomy.

use thiserror::Error;

use crate::source::ApiError;
use crate::store::{CheckpointError, StoreError};

/// Errors surfaced by the sync layer.
///
/// `Transport`, `Upstream` and `Decode` are page-level: the worker keeps its
/// cursor and retries on its next cycle. `Write` means the page was fetched
/// but not persisted; the cursor is not advanced either.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Upstream failure ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed upstream page: {0}")]
    Decode(String),

    #[error("Invalid window: {0}")]
    Validation(String),

    #[error("Write failure: {0}")]
    Write(#[from] StoreError),

    #[error("Checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl SyncError {
    /// Whether this error is confined to one page and retried on the next cycle.
    pub fn is_page_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Upstream { .. } | Self::Decode(_) | Self::Write(_)
        )
    }

    /// Whether the same request can succeed later without an upstream fix.
    ///
    /// Rate limits, server errors, transport and write failures clear up on
    /// their own. A rejected request (4xx) or an undecodable page body does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Write(_) => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Validation(_) | Self::Checkpoint(_) => false,
        }
    }

    /// Whether the upstream rejected the request for rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Upstream { status: 429, .. })
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(message) => SyncError::Transport(message),
            ApiError::Upstream { status, body } => SyncError::Upstream { status, body },
            ApiError::Decode(message) => SyncError::Decode(message),
            ApiError::Config(message) => SyncError::Validation(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_map_to_page_failures() {
        let err: SyncError = ApiError::upstream(429, b"slow down").into();
        assert!(err.is_rate_limited());
        assert!(err.is_page_failure());

        let err: SyncError = ApiError::Transport("reset".into()).into();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(!err.is_rate_limited());

        let err: SyncError = ApiError::Decode("eof".into()).into();
        assert!(err.is_page_failure());
    }

    #[test]
    fn retryable_failures() {
        let retryable: [SyncError; 3] = [
            ApiError::upstream(429, b"slow down").into(),
            ApiError::upstream(502, b"bad gateway").into(),
            ApiError::Transport("reset".into()).into(),
        ];
        assert!(retryable.iter().all(SyncError::is_retryable));

        let rejected: [SyncError; 3] = [
            ApiError::upstream(400, b"invalid contract").into(),
            ApiError::Decode("eof".into()).into(),
            SyncError::Validation("2099-01".into()),
        ];
        assert!(!rejected.iter().any(SyncError::is_retryable));
    }

    #[test]
    fn validation_is_not_a_page_failure() {
        assert!(!SyncError::Validation("2099-01".into()).is_page_failure());
    }
}
