#![warn(missing_docs)]

//! Chunklift object-store layer: the backend contract and its implementations.
//!
//! The upload engine talks to any backend through the [`ObjectStore`] trait,
//! which models the three-phase multipart protocol (create a session, transfer
//! numbered parts, complete with the ordered part list) plus the single-shot
//! put path. [`MemoryObjectStore`] is a full in-process implementation with
//! real multipart ETag semantics and fault-injection hooks for tests; the
//! `aws` feature adds [`S3ObjectStore`] over `aws-sdk-s3`.

pub mod client;
pub mod error;
pub mod memory;

#[cfg(feature = "aws")]
pub mod s3;

pub use client::{BoxFuture, CompletedPart, Credentials, ObjectStore, PartInfo};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryObjectStore, StoreStats};

#[cfg(feature = "aws")]
pub use s3::S3ObjectStore;
