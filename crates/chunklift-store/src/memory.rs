//! In-memory object store with authoritative multipart semantics.
//!
//! The memory backend implements the same observable contract as an
//! S3-compatible service: per-part ETags are the MD5 of the part body, the
//! completion list must be ascending and contiguous from part 1, and the
//! completed-object ETag is `md5(concat(raw part digests))-<part count>`.
//! Fault-injection hooks let tests simulate corrupted ETag responses, parts
//! missing from listings, transient transport failures, and initiation
//! failures.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{BoxFuture, CompletedPart, ObjectStore, PartInfo};
use crate::error::{StoreError, StoreResult};

/// Counters for operations observed by the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Number of multipart sessions created.
    pub creates: u64,
    /// Number of part uploads accepted (including re-uploads).
    pub part_uploads: u64,
    /// Number of part listings served.
    pub lists: u64,
    /// Number of multipart completions.
    pub completes: u64,
    /// Number of multipart aborts.
    pub aborts: u64,
    /// Number of single-shot puts.
    pub puts: u64,
    /// Number of object deletions.
    pub deletes: u64,
    /// Total part bytes accepted.
    pub bytes_received: u64,
    /// Part uploads currently in flight.
    pub inflight_parts: u64,
    /// High-water mark of concurrent part uploads.
    pub max_inflight_parts: u64,
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Parts whose returned ETag is corrupted (the part itself is stored intact).
    corrupt_etag_parts: HashSet<u32>,
    /// Part number -> remaining listings it stays hidden from.
    listing_gaps: HashMap<u32, u32>,
    /// Part number -> remaining upload attempts that fail with a transport error.
    part_failures: HashMap<u32, u32>,
    /// Fail every create call.
    fail_create: bool,
    /// Corrupt the ETag returned at completion (the object is stored intact).
    corrupt_complete_etag: bool,
    /// Artificial latency applied to each part upload.
    part_latency: Option<Duration>,
}

#[derive(Debug)]
struct StoredPart {
    etag: String,
    data: Bytes,
}

#[derive(Debug)]
struct MultipartSession {
    bucket: String,
    key: String,
    parts: HashMap<u32, StoredPart>,
}

#[derive(Debug)]
struct StoredObject {
    etag: String,
    data: Vec<u8>,
}

/// In-memory object store for tests and local runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    uploads: Mutex<HashMap<String, MultipartSession>>,
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    stats: Mutex<StoreStats>,
    faults: Mutex<FaultPlan>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        self.stats.lock().clone()
    }

    /// Number of multipart sessions that are still open.
    pub fn active_upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    /// ETag of a stored object, if present.
    pub fn object_etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.etag.clone())
    }

    /// Body of a stored object, if present.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Whether an object exists.
    pub fn contains_object(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Corrupt the ETag returned for every upload of `part_number`.
    /// The part itself is stored intact.
    pub fn inject_etag_corruption(&self, part_number: u32) {
        self.faults.lock().corrupt_etag_parts.insert(part_number);
    }

    /// Hide `part_number` from the next `calls` part listings.
    pub fn inject_listing_gap(&self, part_number: u32, calls: u32) {
        self.faults.lock().listing_gaps.insert(part_number, calls);
    }

    /// Fail the next `failures` uploads of `part_number` with a transport error.
    pub fn inject_part_failures(&self, part_number: u32, failures: u32) {
        self.faults.lock().part_failures.insert(part_number, failures);
    }

    /// Fail every subsequent create call.
    pub fn inject_create_failure(&self) {
        self.faults.lock().fail_create = true;
    }

    /// Corrupt the ETag returned by every completion. The assembled object
    /// is stored intact.
    pub fn inject_completion_corruption(&self) {
        self.faults.lock().corrupt_complete_etag = true;
    }

    /// Apply artificial latency to each part upload.
    pub fn inject_part_latency(&self, latency: Duration) {
        self.faults.lock().part_latency = Some(latency);
    }

    fn store_part(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String> {
        if part_number == 0 || part_number > 10_000 {
            return Err(StoreError::InvalidPart {
                part_number,
                reason: "part number must be between 1 and 10000".to_string(),
            });
        }

        let size = data.len() as u64;
        let etag = format!("{:x}", md5::compute(&data));
        {
            let mut uploads = self.uploads.lock();
            let session =
                uploads
                    .get_mut(upload_id)
                    .ok_or_else(|| StoreError::NoSuchUpload {
                        upload_id: upload_id.to_string(),
                    })?;
            if session.bucket != bucket || session.key != key {
                return Err(StoreError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                });
            }
            session.parts.insert(
                part_number,
                StoredPart {
                    etag: etag.clone(),
                    data,
                },
            );
        }

        {
            let mut stats = self.stats.lock();
            stats.part_uploads += 1;
            stats.bytes_received += size;
        }

        if self.faults.lock().corrupt_etag_parts.contains(&part_number) {
            let mangled = mangle_etag(&etag);
            warn!(part_number, etag = %mangled, "returning corrupted etag for part");
            return Ok(mangled);
        }

        debug!(part_number, size, "stored part");
        Ok(etag)
    }

    fn complete_inner(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        validate_completion_list(parts)?;

        let session = {
            let mut uploads = self.uploads.lock();
            {
                let session =
                    uploads
                        .get(upload_id)
                        .ok_or_else(|| StoreError::NoSuchUpload {
                            upload_id: upload_id.to_string(),
                        })?;
                for part in parts {
                    let stored = session.parts.get(&part.part_number).ok_or_else(|| {
                        StoreError::InvalidPart {
                            part_number: part.part_number,
                            reason: "part was never uploaded".to_string(),
                        }
                    })?;
                    if stored.etag != part.etag.trim_matches('"') {
                        return Err(StoreError::InvalidPart {
                            part_number: part.part_number,
                            reason: "etag does not match stored part".to_string(),
                        });
                    }
                }
            }
            uploads
                .remove(upload_id)
                .ok_or_else(|| StoreError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                })?
        };

        let mut ctx = md5::Context::new();
        let mut body = Vec::new();
        for part in parts {
            if let Some(stored) = session.parts.get(&part.part_number) {
                ctx.consume(md5::compute(&stored.data).0);
                body.extend_from_slice(&stored.data);
            }
        }
        let etag = format!("{:x}-{}", ctx.compute(), parts.len());

        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                etag: etag.clone(),
                data: body,
            },
        );
        self.stats.lock().completes += 1;
        debug!(upload_id, key, parts = parts.len(), etag = %etag, "completed multipart upload");

        if self.faults.lock().corrupt_complete_etag {
            let mangled = mangle_etag(&etag);
            warn!(upload_id, etag = %mangled, "returning corrupted etag for completed object");
            return Ok(mangled);
        }
        Ok(etag)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            self.stats.lock().creates += 1;
            if self.faults.lock().fail_create {
                warn!(bucket, key, "injected initiation failure");
                return Err(StoreError::Transport {
                    reason: "injected initiation failure".to_string(),
                });
            }
            let upload_id = Uuid::new_v4().to_string();
            self.uploads.lock().insert(
                upload_id.clone(),
                MultipartSession {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    parts: HashMap::new(),
                },
            );
            debug!(bucket, key, upload_id = %upload_id, "created multipart upload");
            Ok(upload_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        upload_id: &'a str,
        bucket: &'a str,
        key: &'a str,
        part_number: u32,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            {
                let mut faults = self.faults.lock();
                if let Some(remaining) = faults.part_failures.get_mut(&part_number) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        warn!(part_number, "injected transport failure for part upload");
                        return Err(StoreError::Transport {
                            reason: format!("injected failure for part {}", part_number),
                        });
                    }
                }
            }

            let latency = self.faults.lock().part_latency;
            {
                let mut stats = self.stats.lock();
                stats.inflight_parts += 1;
                stats.max_inflight_parts = stats.max_inflight_parts.max(stats.inflight_parts);
            }
            if let Some(delay) = latency {
                tokio::time::sleep(delay).await;
            }

            let result = self.store_part(upload_id, bucket, key, part_number, data);
            self.stats.lock().inflight_parts -= 1;
            result
        })
    }

    fn list_parts<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<PartInfo>>> {
        Box::pin(async move {
            self.stats.lock().lists += 1;
            let uploads = self.uploads.lock();
            let session = uploads
                .get(upload_id)
                .ok_or_else(|| StoreError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                })?;

            let mut numbers: Vec<u32> = session.parts.keys().copied().collect();
            numbers.sort_unstable();

            let mut faults = self.faults.lock();
            let mut infos = Vec::with_capacity(numbers.len());
            for number in numbers {
                if let Some(remaining) = faults.listing_gaps.get_mut(&number) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        continue;
                    }
                }
                if let Some(part) = session.parts.get(&number) {
                    infos.push(PartInfo {
                        part_number: number,
                        etag: part.etag.clone(),
                        size: part.data.len() as u64,
                    });
                }
            }
            debug!(upload_id, parts = infos.len(), "listed parts");
            Ok(infos)
        })
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move { self.complete_inner(bucket, key, upload_id, &parts) })
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.stats.lock().aborts += 1;
            match self.uploads.lock().remove(upload_id) {
                Some(_) => {
                    debug!(upload_id, "aborted multipart upload");
                    Ok(())
                }
                None => Err(StoreError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                }),
            }
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>> {
        Box::pin(async move {
            let etag = format!("{:x}", md5::compute(&data));
            self.objects.lock().insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    etag: etag.clone(),
                    data: data.to_vec(),
                },
            );
            self.stats.lock().puts += 1;
            debug!(bucket, key, size = data.len(), "put object");
            Ok(etag)
        })
    }

    fn delete_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.stats.lock().deletes += 1;
            match self
                .objects
                .lock()
                .remove(&(bucket.to_string(), key.to_string()))
            {
                Some(_) => {
                    debug!(bucket, key, "deleted object");
                    Ok(())
                }
                None => Err(StoreError::NoSuchKey {
                    key: key.to_string(),
                }),
            }
        })
    }

    fn composite_etags(&self) -> bool {
        true
    }
}

/// Reject empty, unordered, or non-contiguous completion lists.
fn validate_completion_list(parts: &[CompletedPart]) -> StoreResult<()> {
    if parts.is_empty() {
        return Err(StoreError::InvalidPartOrder {
            reason: "no parts provided for completion".to_string(),
        });
    }
    if parts[0].part_number != 1 {
        return Err(StoreError::InvalidPartOrder {
            reason: "parts must start from 1".to_string(),
        });
    }
    for window in parts.windows(2) {
        if window[1].part_number != window[0].part_number + 1 {
            return Err(StoreError::InvalidPartOrder {
                reason: "parts must be ascending and contiguous".to_string(),
            });
        }
    }
    Ok(())
}

/// Deterministically produce a different but well-formed ETag.
fn mangle_etag(etag: &str) -> String {
    let head = if etag.starts_with('0') { '1' } else { '0' };
    let mut flipped = String::with_capacity(etag.len());
    flipped.push(head);
    flipped.push_str(etag.get(1..).unwrap_or_default());
    flipped
}
