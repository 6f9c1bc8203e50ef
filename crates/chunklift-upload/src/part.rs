//! Transfer of one chunk as one numbered part.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use chunklift_store::{ObjectStore, StoreError, StoreResult};

use crate::chunker::Chunk;
use crate::digest::chunk_digest;
use crate::error::{UploadError, UploadResult};
use crate::retry::{is_retryable, RetryConfig};
use crate::session::PartResult;

/// Uploads chunks as numbered parts of one open multipart session.
///
/// Each transfer computes the chunk digest locally, sends the bytes under the
/// chunk's part number, and compares the store's returned identifier against
/// the local digest. Transport failures and timeouts retry with backoff;
/// integrity mismatches re-upload the part. Both share the same bounded
/// budget, after which the error is surfaced and fails the session.
pub struct PartUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    upload_id: String,
    retry: RetryConfig,
    part_timeout: Duration,
}

impl PartUploader {
    /// Build an uploader bound to one open session.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
        upload_id: &str,
        retry: RetryConfig,
        part_timeout: Duration,
    ) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            retry,
            part_timeout,
        }
    }

    /// Transfer one chunk, returning the verified part result.
    pub async fn upload(&self, chunk: &Chunk) -> UploadResult<PartResult> {
        let part_number = chunk.part_number();
        let local_hex = chunk_digest(&chunk.data).to_hex();
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.send_once(part_number, chunk.data.clone()).await {
                Ok(remote_etag) => {
                    if remote_etag.trim_matches('"') == local_hex {
                        let latency_us = started.elapsed().as_micros() as u64;
                        debug!(part_number, size = chunk.len(), latency_us, "part uploaded");
                        return Ok(PartResult {
                            part_number,
                            remote_etag,
                            local_digest: local_hex,
                            size: chunk.len() as u64,
                            latency_us,
                        });
                    }
                    warn!(
                        part_number,
                        local = %local_hex,
                        remote = %remote_etag,
                        attempt,
                        "part integrity mismatch"
                    );
                    if attempt > self.retry.max_retries {
                        return Err(UploadError::PartIntegrityMismatch {
                            part_number,
                            local: local_hex,
                            remote: remote_etag,
                        });
                    }
                }
                Err(err) if is_retryable(&err) && attempt <= self.retry.max_retries => {
                    warn!(part_number, attempt, error = %err, "part transfer failed, retrying");
                }
                Err(err) => return Err(err.into()),
            }
            tokio::time::sleep(self.retry.backoff(attempt - 1)).await;
        }
    }

    async fn send_once(&self, part_number: u32, data: Bytes) -> StoreResult<String> {
        let transfer =
            self.store
                .upload_part(&self.upload_id, &self.bucket, &self.key, part_number, data);
        match tokio::time::timeout(self.part_timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                seconds: self.part_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunklift_store::MemoryObjectStore;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    fn test_chunk(index: usize, data: &'static [u8]) -> Chunk {
        Chunk {
            index,
            data: Bytes::from_static(data),
        }
    }

    async fn open_session(store: &MemoryObjectStore) -> String {
        store
            .create_multipart_upload("bucket", "key")
            .await
            .unwrap()
    }

    fn uploader(
        store: Arc<MemoryObjectStore>,
        upload_id: &str,
        retry: RetryConfig,
        part_timeout: Duration,
    ) -> PartUploader {
        PartUploader::new(store, "bucket", "key", upload_id, retry, part_timeout)
    }

    #[tokio::test]
    async fn test_upload_returns_verified_result() {
        let store = Arc::new(MemoryObjectStore::new());
        let upload_id = open_session(&store).await;
        let uploader = uploader(Arc::clone(&store), &upload_id, fast_retry(3), TIMEOUT);

        let result = uploader.upload(&test_chunk(0, b"hello")).await.unwrap();
        assert_eq!(result.part_number, 1);
        assert_eq!(result.size, 5);
        assert_eq!(result.remote_etag, format!("{:x}", md5::compute(b"hello")));
        assert_eq!(result.local_digest, result.remote_etag);
    }

    #[tokio::test]
    async fn test_transient_failures_recover() {
        let store = Arc::new(MemoryObjectStore::new());
        store.inject_part_failures(1, 2);
        let upload_id = open_session(&store).await;
        let uploader = uploader(Arc::clone(&store), &upload_id, fast_retry(3), TIMEOUT);

        let result = uploader.upload(&test_chunk(0, b"data")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_transport_budget_exhaustion() {
        let store = Arc::new(MemoryObjectStore::new());
        store.inject_part_failures(1, 100);
        let upload_id = open_session(&store).await;
        let uploader = uploader(Arc::clone(&store), &upload_id, fast_retry(1), TIMEOUT);

        let result = uploader.upload(&test_chunk(0, b"data")).await;
        assert!(matches!(
            result,
            Err(UploadError::Store(StoreError::Transport { .. }))
        ));
    }

    #[tokio::test]
    async fn test_integrity_mismatch_retries_then_fails() {
        let store = Arc::new(MemoryObjectStore::new());
        store.inject_etag_corruption(1);
        let upload_id = open_session(&store).await;
        let uploader = uploader(Arc::clone(&store), &upload_id, fast_retry(2), TIMEOUT);

        let result = uploader.upload(&test_chunk(0, b"payload")).await;
        match result {
            Err(UploadError::PartIntegrityMismatch {
                part_number,
                local,
                remote,
            }) => {
                assert_eq!(part_number, 1);
                assert_ne!(local, remote);
            }
            other => panic!("expected PartIntegrityMismatch, got {:?}", other),
        }
        // Initial attempt plus two re-uploads, each stored server-side.
        assert_eq!(store.stats().part_uploads, 3);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_surfaced() {
        let store = Arc::new(MemoryObjectStore::new());
        store.inject_part_latency(Duration::from_millis(50));
        let upload_id = open_session(&store).await;
        let uploader = uploader(
            Arc::clone(&store),
            &upload_id,
            fast_retry(1),
            Duration::from_millis(5),
        );

        let result = uploader.upload(&test_chunk(0, b"slow")).await;
        assert!(matches!(
            result,
            Err(UploadError::Store(StoreError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_upload_fails_fast() {
        let store = Arc::new(MemoryObjectStore::new());
        let uploader = uploader(Arc::clone(&store), "missing", fast_retry(3), TIMEOUT);

        let result = uploader.upload(&test_chunk(0, b"data")).await;
        assert!(matches!(
            result,
            Err(UploadError::Store(StoreError::NoSuchUpload { .. }))
        ));
        // Permanent errors must not consume the retry budget.
        assert_eq!(store.stats().part_uploads, 0);
    }
}
