//! Error types for object-store backends.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or protocol-level transfer failure. Retryable.
    #[error("transport failure: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// An operation exceeded its deadline. Retryable.
    #[error("operation timed out after {seconds}s")]
    Timeout {
        /// The deadline that expired, in seconds.
        seconds: u64,
    },

    /// The referenced multipart upload does not exist (never created,
    /// already completed, or already aborted).
    #[error("no such multipart upload: {upload_id}")]
    NoSuchUpload {
        /// The unknown upload identifier.
        upload_id: String,
    },

    /// The referenced object does not exist.
    #[error("no such key: {key}")]
    NoSuchKey {
        /// The unknown object key.
        key: String,
    },

    /// The referenced bucket does not exist.
    #[error("no such bucket: {bucket}")]
    NoSuchBucket {
        /// The unknown bucket name.
        bucket: String,
    },

    /// A completion list entry did not match a stored part.
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart {
        /// The offending part number.
        part_number: u32,
        /// Why the part was rejected.
        reason: String,
    },

    /// The completion list was malformed (empty, unordered, or with gaps).
    #[error("invalid part order: {reason}")]
    InvalidPartOrder {
        /// Why the list was rejected.
        reason: String,
    },

    /// Backend-specific failure (SDK errors map here). Not retryable.
    #[error("backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },
}
