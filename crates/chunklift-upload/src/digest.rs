//! Two-level content digests matching the multipart-ETag convention.
//!
//! Level one hashes each chunk's raw bytes; level two hashes the
//! concatenation of the raw level-one digests (not their hex rendering) and
//! appends the chunk count. S3-compatible stores compute completed-object
//! ETags the same way, which is what makes local and remote values directly
//! comparable.

use std::fmt;

/// MD5 digest of one chunk's raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDigest([u8; 16]);

impl ChunkDigest {
    /// The raw digest bytes, as fed into the composite hash.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex rendering, as compared against per-part ETags.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Composite digest of a chunked object: `<hex>-<chunk count>`.
///
/// Chunking-dependent by design: the same bytes at a different chunk size
/// produce a different composite digest, exactly as the store-side ETag
/// convention does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDigest {
    /// Hex of the hash over the concatenated raw chunk digests.
    pub hex: String,
    /// Number of chunks the object was uploaded as.
    pub chunk_count: usize,
}

impl ObjectDigest {
    /// Compare against a store-reported ETag, tolerating the quoting some
    /// backends wrap around ETag values.
    pub fn matches(&self, etag: &str) -> bool {
        etag.trim_matches('"') == self.to_string()
    }
}

impl fmt::Display for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hex, self.chunk_count)
    }
}

/// Hash one chunk's raw bytes.
pub fn chunk_digest(data: &[u8]) -> ChunkDigest {
    ChunkDigest(md5::compute(data).0)
}

/// Hash the ordered chunk digests into the composite object digest.
///
/// Order-sensitive: swapping two chunk digests changes the result, which is
/// what lets the final comparison catch part-order corruption.
pub fn composite_digest(digests: &[ChunkDigest]) -> ObjectDigest {
    let mut ctx = md5::Context::new();
    for digest in digests {
        ctx.consume(digest.as_bytes());
    }
    ObjectDigest {
        hex: format!("{:x}", ctx.compute()),
        chunk_count: digests.len(),
    }
}
