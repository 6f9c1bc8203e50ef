//! The upload protocol driver.
//!
//! Drives one session through initiate → concurrent part transfer →
//! reconciliation against the store's part listing → completion → composite
//! digest verification. Every failing path after initiation aborts the
//! remote multipart session so the store is never left holding orphaned
//! parts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use chunklift_store::{CompletedPart, ObjectStore};

use crate::chunker::{chunk, Chunk};
use crate::config::UploadConfig;
use crate::digest::{chunk_digest, composite_digest, ObjectDigest};
use crate::error::{UploadError, UploadResult};
use crate::part::PartUploader;
use crate::retry::with_retry;
use crate::session::{PartResult, UploadSession};

/// Summary of one completed multipart upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Object key.
    pub key: String,
    /// Store-assigned upload id of the session.
    pub upload_id: String,
    /// Number of parts transferred.
    pub total_parts: usize,
    /// Total payload bytes.
    pub total_bytes: u64,
    /// ETag the store returned for the completed object.
    pub remote_etag: String,
    /// The locally computed composite digest.
    pub expected_digest: String,
    /// Whether the final digest comparison ran and passed. False means the
    /// backend does not report composite ETags and the check was skipped.
    pub digest_verified: bool,
    /// Wall-clock duration of the whole protocol in milliseconds.
    pub elapsed_ms: u64,
    /// Per-part outcomes, sorted by part number.
    pub parts: Vec<PartResult>,
}

/// Summary of one single-shot upload.
#[derive(Debug, Clone, Serialize)]
pub struct SingleUploadReport {
    /// Object key.
    pub key: String,
    /// ETag the store returned for the object.
    pub remote_etag: String,
    /// Payload bytes.
    pub total_bytes: u64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Orchestrates multipart uploads against an explicit store handle.
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
}

impl UploadCoordinator {
    /// Build a coordinator; the configuration is validated up front.
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `payload` to `key` via the multipart protocol.
    pub async fn upload(&self, key: &str, payload: Bytes) -> UploadResult<UploadReport> {
        if key.is_empty() {
            return Err(UploadError::InvalidConfiguration {
                reason: "object key must not be empty".to_string(),
            });
        }

        let started = Instant::now();
        let chunks = chunk(&payload, self.config.chunk_size)?;
        let digests: Vec<_> = chunks.iter().map(|c| chunk_digest(&c.data)).collect();
        let expected = composite_digest(&digests);
        info!(
            key,
            bytes = payload.len(),
            parts = chunks.len(),
            chunk_size = self.config.chunk_size,
            "starting multipart upload"
        );

        let upload_id = match self
            .store
            .create_multipart_upload(&self.config.bucket, key)
            .await
        {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => {
                return Err(UploadError::InitiationFailed {
                    key: key.to_string(),
                    reason: "store returned an empty upload id".to_string(),
                })
            }
            Err(err) => {
                return Err(UploadError::InitiationFailed {
                    key: key.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        let session = Arc::new(Mutex::new(UploadSession::new(
            &self.config.bucket,
            key,
            chunks.len(),
        )));
        session.lock().mark_initiated(&upload_id)?;

        match self.run_protocol(&session, &chunks, &expected, started).await {
            Ok(report) => Ok(report),
            Err(err) => {
                session.lock().mark_failed().ok();
                self.abort_after_failure(&session, &err).await;
                Err(err)
            }
        }
    }

    /// Upload `payload` to `key` in one request. This is the sequential
    /// baseline the chunked path is compared against.
    pub async fn put_single(&self, key: &str, payload: Bytes) -> UploadResult<SingleUploadReport> {
        if key.is_empty() {
            return Err(UploadError::InvalidConfiguration {
                reason: "object key must not be empty".to_string(),
            });
        }

        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let bucket = self.config.bucket.clone();
        let remote_etag = with_retry(&self.config.retry, || {
            let store = Arc::clone(&store);
            let bucket = bucket.clone();
            let key = key.to_string();
            let data = payload.clone();
            async move { store.put_object(&bucket, &key, data).await }
        })
        .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(key, bytes = payload.len(), elapsed_ms, etag = %remote_etag, "single-shot upload completed");
        Ok(SingleUploadReport {
            key: key.to_string(),
            remote_etag,
            total_bytes: payload.len() as u64,
            elapsed_ms,
        })
    }

    async fn run_protocol(
        &self,
        session: &Arc<Mutex<UploadSession>>,
        chunks: &[Chunk],
        expected: &ObjectDigest,
        started: Instant,
    ) -> UploadResult<UploadReport> {
        let uploader = {
            let s = session.lock();
            Arc::new(PartUploader::new(
                Arc::clone(&self.store),
                s.bucket(),
                s.key(),
                s.upload_id(),
                self.config.retry.clone(),
                self.config.part_timeout(),
            ))
        };

        session.lock().begin_transfer()?;
        self.transfer_parts(session, &uploader, chunks).await?;
        self.reconcile(session, &uploader, chunks).await?;
        session.lock().mark_reconciled()?;

        session.lock().begin_completion()?;
        let (bucket, key, upload_id, ordered) = {
            let s = session.lock();
            (
                s.bucket().to_string(),
                s.key().to_string(),
                s.upload_id().to_string(),
                s.sorted_parts(),
            )
        };
        let completion: Vec<CompletedPart> = ordered
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.remote_etag.clone(),
            })
            .collect();
        let remote_etag = self
            .store
            .complete_multipart_upload(&bucket, &key, &upload_id, completion)
            .await?;

        let digest_verified = if self.store.composite_etags() {
            if !expected.matches(&remote_etag) {
                warn!(key = %key, expected = %expected, actual = %remote_etag, "completed object digest mismatch");
                if self.config.delete_on_digest_mismatch {
                    if let Err(delete_err) = self.store.delete_object(&bucket, &key).await {
                        warn!(key = %key, error = %delete_err, "failed to delete corrupt object");
                    }
                }
                return Err(UploadError::ObjectIntegrityMismatch {
                    expected: expected.to_string(),
                    actual: remote_etag,
                });
            }
            true
        } else {
            debug!(key = %key, "backend does not report composite etags; skipping digest verification");
            false
        };

        session.lock().mark_completed()?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let total_bytes = ordered.iter().map(|p| p.size).sum();
        info!(
            key = %key,
            upload_id = %upload_id,
            parts = ordered.len(),
            total_bytes,
            elapsed_ms,
            etag = %remote_etag,
            "multipart upload completed"
        );
        Ok(UploadReport {
            key,
            upload_id,
            total_parts: ordered.len(),
            total_bytes,
            remote_etag,
            expected_digest: expected.to_string(),
            digest_verified,
            elapsed_ms,
            parts: ordered,
        })
    }

    /// Fan every chunk out to its own transfer task, bounded by the
    /// configured concurrency, and join them all before returning. Workers
    /// append to the session's result collection under its mutex; the first
    /// error (in part order) wins.
    async fn transfer_parts(
        &self,
        session: &Arc<Mutex<UploadSession>>,
        uploader: &Arc<PartUploader>,
        chunks: &[Chunk],
    ) -> UploadResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_parts));
        let mut handles = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let uploader = Arc::clone(uploader);
            let semaphore = Arc::clone(&semaphore);
            let session = Arc::clone(session);
            let chunk = chunk.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let result = uploader.upload(&chunk).await?;
                session.lock().record_part(result)
            }));
        }

        let mut first_error = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(_) => Err(UploadError::TaskAborted {
                    part_number: index as u32 + 1,
                }),
            };
            if let Err(err) = outcome {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cross-check the store's authoritative part listing against the local
    /// view. Missing part numbers are re-uploaded and the listing re-checked,
    /// up to the retry budget.
    async fn reconcile(
        &self,
        session: &Arc<Mutex<UploadSession>>,
        uploader: &Arc<PartUploader>,
        chunks: &[Chunk],
    ) -> UploadResult<()> {
        let (bucket, key, upload_id, total_parts) = {
            let s = session.lock();
            (
                s.bucket().to_string(),
                s.key().to_string(),
                s.upload_id().to_string(),
                s.total_parts(),
            )
        };

        let mut attempt = 0u32;
        loop {
            let listed = self.store.list_parts(&bucket, &key, &upload_id).await?;
            let numbers: HashSet<u32> = listed.iter().map(|p| p.part_number).collect();
            let missing = session.lock().missing_from(&numbers);

            if listed.len() == total_parts && missing.is_empty() {
                debug!(upload_id = %upload_id, parts = total_parts, "store listing matches local view");
                return Ok(());
            }

            attempt += 1;
            warn!(
                expected = total_parts,
                actual = listed.len(),
                missing = ?missing,
                attempt,
                "store part listing disagrees with local view"
            );
            if attempt > self.config.retry.max_retries {
                return Err(UploadError::PartCountMismatch {
                    expected: total_parts,
                    actual: listed.len(),
                });
            }

            for part_number in &missing {
                let chunk = &chunks[(*part_number - 1) as usize];
                uploader.upload(chunk).await?;
            }
            tokio::time::sleep(self.config.retry.backoff(attempt - 1)).await;
        }
    }

    async fn abort_after_failure(&self, session: &Mutex<UploadSession>, err: &UploadError) {
        // A digest mismatch is only discovered after the store has assembled
        // the object; there is no multipart session left to abort.
        if matches!(err, UploadError::ObjectIntegrityMismatch { .. }) {
            return;
        }
        let (bucket, key, upload_id) = {
            let s = session.lock();
            (
                s.bucket().to_string(),
                s.key().to_string(),
                s.upload_id().to_string(),
            )
        };
        warn!(key = %key, upload_id = %upload_id, error = %err, "upload failed, aborting multipart session");
        if let Err(abort_err) = self
            .store
            .abort_multipart_upload(&bucket, &key, &upload_id)
            .await
        {
            warn!(upload_id = %upload_id, error = %abort_err, "abort after failure also failed");
        }
    }
}
