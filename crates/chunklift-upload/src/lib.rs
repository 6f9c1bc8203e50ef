#![warn(missing_docs)]

//! Chunklift upload engine: multipart upload of large in-memory objects with
//! end-to-end integrity verification.
//!
//! The engine splits a payload into fixed-size chunks, transfers them
//! concurrently as numbered parts of a multipart upload (bounded concurrency,
//! bounded retries), reconciles the store's authoritative part listing
//! against the local view, completes the upload with the ordered part list,
//! and compares the store's returned digest against a locally computed
//! composite digest.
//!
//! The composite digest is chunking-dependent by design: it hashes the
//! concatenation of per-chunk hashes, so the same bytes uploaded with a
//! different chunk size produce a different digest. That mirrors the
//! multipart-ETag convention of S3-compatible stores and is what makes the
//! local and remote values comparable at all.

pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod digest;
pub mod error;
pub mod part;
pub mod retry;
pub mod session;

pub use chunker::{chunk, Chunk, DEFAULT_CHUNK_SIZE, MAX_PARTS};
pub use config::UploadConfig;
pub use coordinator::{SingleUploadReport, UploadCoordinator, UploadReport};
pub use digest::{chunk_digest, composite_digest, ChunkDigest, ObjectDigest};
pub use error::{UploadError, UploadResult};
pub use retry::RetryConfig;
pub use session::{PartResult, UploadSession, UploadState};
