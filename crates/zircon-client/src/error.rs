//! Client error types.

use thiserror::Error;
use zircon_types::{CacheCode, ChunkCode, Status, Version};

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A compare-and-swap write lost to a concurrent writer; `current` is
    /// the version the caller must re-read before retrying.
    #[error("stale version: current version is {current}")]
    StaleVersion { current: Version },

    /// A status from a service that the coordinator does not absorb.
    #[error("{0}")]
    Status(#[from] Status),

    /// Retries ran out of budget.
    #[error("retry budget exhausted: {0}")]
    RetryExhausted(String),
}

impl ClientError {
    /// The version carried by a stale-version failure.
    pub fn current_version(&self) -> Option<Version> {
        match self {
            ClientError::StaleVersion { current } => Some(*current),
            ClientError::Status(status) => status.version(),
            ClientError::RetryExhausted(_) => None,
        }
    }

    /// Whether this is a not-found failure (chunk or entry).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::Status(status)
                if status.code() == CacheCode::ENTRY_NOT_FOUND
                    || status.code() == ChunkCode::CHUNK_NOT_FOUND
        )
    }

    /// Whether this is a stale-version failure.
    pub fn is_stale(&self) -> bool {
        matches!(self, ClientError::StaleVersion { .. })
    }

    /// Whether this is an out-of-bounds failure.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            ClientError::Status(status) if status.code() == ChunkCode::OUT_OF_BOUNDS
        )
    }
}

/// Convenience result type.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_carries_version() {
        let err = ClientError::StaleVersion {
            current: Version(7),
        };
        assert!(err.is_stale());
        assert_eq!(err.current_version(), Some(Version(7)));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_status_classification() {
        let err: ClientError = Status::new(CacheCode::ENTRY_NOT_FOUND).into();
        assert!(err.is_not_found());
        assert!(!err.is_stale());

        let err: ClientError = Status::new(ChunkCode::OUT_OF_BOUNDS).into();
        assert!(err.is_out_of_bounds());
    }
}
