//! Error types for the upload engine.

use thiserror::Error;

use chunklift_store::StoreError;

use crate::session::UploadState;

/// Result type alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error variants for upload operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Rejected configuration: non-positive chunk size, empty bucket/key,
    /// zero concurrency, or a payload needing more parts than the store
    /// accepts.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The store did not hand out a usable upload identifier. Fatal: no
    /// parts were attempted.
    #[error("multipart upload creation failed for {key}: {reason}")]
    InitiationFailed {
        /// The object key the session was for.
        key: String,
        /// Why initiation failed.
        reason: String,
    },

    /// A store operation failed after the retry budget was exhausted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A part's locally computed digest disagrees with the store's returned
    /// identifier, and bounded re-uploads did not resolve it.
    #[error("part {part_number} integrity mismatch: local digest {local}, store returned {remote}")]
    PartIntegrityMismatch {
        /// The offending part number.
        part_number: u32,
        /// Hex digest computed locally before transfer.
        local: String,
        /// Identifier the store returned for the part.
        remote: String,
    },

    /// The store's authoritative part listing disagrees with the local view
    /// after re-upload attempts.
    #[error("part count mismatch: expected {expected} parts, store reports {actual}")]
    PartCountMismatch {
        /// Parts the session transferred.
        expected: usize,
        /// Parts the store reported.
        actual: usize,
    },

    /// The completed object's digest disagrees with the locally computed
    /// composite digest.
    #[error("object integrity mismatch: expected {expected}, store returned {actual}")]
    ObjectIntegrityMismatch {
        /// The locally computed composite digest.
        expected: String,
        /// The digest the store returned at completion.
        actual: String,
    },

    /// A part-transfer task panicked or was cancelled.
    #[error("part {part_number} upload task aborted")]
    TaskAborted {
        /// The part number the task was transferring.
        part_number: u32,
    },

    /// A session state transition was attempted out of order.
    #[error("invalid session transition from {from:?} on {operation}")]
    InvalidTransition {
        /// The state the session was in.
        from: UploadState,
        /// The operation that was attempted.
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = UploadError::InvalidConfiguration {
            reason: "chunk size must be at least 1 byte".to_string(),
        };
        assert!(format!("{}", err).contains("chunk size"));

        let err = UploadError::PartCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            format!("{}", err),
            "part count mismatch: expected 3 parts, store reports 2"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::Transport {
            reason: "reset".to_string(),
        };
        let err: UploadError = store_err.into();
        assert!(matches!(err, UploadError::Store(_)));
    }
}
