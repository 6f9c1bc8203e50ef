//! Upload engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::error::{UploadError, UploadResult};
use crate::retry::RetryConfig;

/// Configuration for a multipart upload run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Target bucket.
    pub bucket: String,
    /// Chunk size in bytes. Parts other than the last are exactly this long.
    pub chunk_size: usize,
    /// Maximum concurrent part transfers.
    pub max_concurrent_parts: usize,
    /// Per-part transfer deadline in seconds; expiry counts as a retryable
    /// failure.
    pub part_timeout_secs: u64,
    /// Retry budget shared by transport failures, timeouts, integrity
    /// re-uploads, and reconciliation repair rounds.
    pub retry: RetryConfig,
    /// Delete the completed object when the final digest comparison fails.
    pub delete_on_digest_mismatch: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_parts: 4,
            part_timeout_secs: 300,
            retry: RetryConfig::default(),
            delete_on_digest_mismatch: false,
        }
    }
}

impl UploadConfig {
    /// Default configuration targeting `bucket`.
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    /// The per-part deadline as a [`Duration`].
    pub fn part_timeout(&self) -> Duration {
        Duration::from_secs(self.part_timeout_secs)
    }

    /// Reject unusable configurations before any network traffic.
    pub fn validate(&self) -> UploadResult<()> {
        if self.bucket.is_empty() {
            return Err(UploadError::InvalidConfiguration {
                reason: "bucket must not be empty".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidConfiguration {
                reason: "chunk size must be at least 1 byte".to_string(),
            });
        }
        if self.max_concurrent_parts == 0 {
            return Err(UploadError::InvalidConfiguration {
                reason: "max concurrent parts must be at least 1".to_string(),
            });
        }
        if self.part_timeout_secs == 0 {
            return Err(UploadError::InvalidConfiguration {
                reason: "part timeout must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_concurrent_parts, 4);
        assert_eq!(config.part_timeout_secs, 300);
        assert!(!config.delete_on_digest_mismatch);
    }

    #[test]
    fn test_new_sets_bucket() {
        let config = UploadConfig::new("media.uploads");
        assert_eq!(config.bucket, "media.uploads");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let config = UploadConfig::default();
        assert!(matches!(
            config.validate(),
            Err(UploadError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = UploadConfig {
            chunk_size: 0,
            ..UploadConfig::new("bucket")
        };
        assert!(matches!(
            config.validate(),
            Err(UploadError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = UploadConfig {
            max_concurrent_parts: 0,
            ..UploadConfig::new("bucket")
        };
        assert!(matches!(
            config.validate(),
            Err(UploadError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_part_timeout_conversion() {
        let config = UploadConfig {
            part_timeout_secs: 7,
            ..UploadConfig::new("bucket")
        };
        assert_eq!(config.part_timeout(), Duration::from_secs(7));
    }
}
