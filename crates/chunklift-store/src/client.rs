//! The object-store contract.
//!
//! Backends are expected to be S3-compatible at the protocol level: opaque
//! string upload identifiers, 1-based numbered parts, opaque ETags derived
//! from content hashes, and a three-phase multipart session (create, transfer
//! parts in any order, complete with the final ordered part list).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One part as reported by the store's authoritative listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    /// Part number (1-based).
    pub part_number: u32,
    /// Store-assigned identifier for the part.
    pub etag: String,
    /// Size of the part in bytes.
    pub size: u64,
}

/// One entry of the ordered list handed to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,
    /// The ETag returned by the store when the part was uploaded.
    pub etag: String,
}

/// Opaque credential handle for remote backends.
///
/// Passed explicitly to backend constructors; the engine never reads
/// process-global credential state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Region, if the backend is region-addressed.
    pub region: Option<String>,
    /// Endpoint override for S3-compatible services (MinIO etc).
    pub endpoint: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Trait for object-store operations (S3, MinIO, and compatible services).
///
/// All methods are one network round-trip against the backend. Implementations
/// must be safe to share across concurrent part-upload tasks.
pub trait ObjectStore: Send + Sync {
    /// Open a multipart session for `bucket`/`key`, returning the upload id.
    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<String>>;

    /// Transfer one numbered part, returning the store-assigned ETag.
    fn upload_part<'a>(
        &'a self,
        upload_id: &'a str,
        bucket: &'a str,
        key: &'a str,
        part_number: u32,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>>;

    /// The store's authoritative listing of parts received for this upload.
    fn list_parts<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<PartInfo>>>;

    /// Assemble the object from the ordered part list, returning the final
    /// object ETag.
    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> BoxFuture<'a, StoreResult<String>>;

    /// Discard the session and any parts the store is holding for it.
    fn abort_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Single-shot object write, returning the object ETag.
    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, StoreResult<String>>;

    /// Remove an object.
    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str)
        -> BoxFuture<'a, StoreResult<()>>;

    /// Whether completed-object ETags follow the MD5 composite convention
    /// (`md5(concat(raw part digests))-<part count>`).
    ///
    /// End-to-end digest verification is only meaningful against backends
    /// that report it; callers skip the comparison otherwise.
    fn composite_etags(&self) -> bool {
        true
    }
}
