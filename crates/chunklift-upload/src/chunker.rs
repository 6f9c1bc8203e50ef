//! Fixed-size partitioning of an in-memory payload.

use bytes::Bytes;

use crate::error::{UploadError, UploadResult};

/// Default chunk size: 5 MiB, the minimum part size most multipart-upload
/// backends accept for parts other than the last.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// The conventional store-side ceiling on part numbers.
pub const MAX_PARTS: usize = 10_000;

/// One contiguous slice of the payload, destined to become one numbered part.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    /// Zero-copy view into the payload.
    pub data: Bytes,
}

impl Chunk {
    /// The 1-based part number this chunk uploads as.
    pub fn part_number(&self) -> u32 {
        self.index as u32 + 1
    }

    /// Chunk length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk is zero-length (only possible for an empty payload).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Split `buffer` into an ordered sequence of chunks of `chunk_size` bytes,
/// the last possibly shorter.
///
/// Pure and deterministic. Always yields at least one chunk: an empty buffer
/// produces a single zero-length chunk, so even empty objects travel through
/// the same multipart protocol.
pub fn chunk(buffer: &Bytes, chunk_size: usize) -> UploadResult<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(UploadError::InvalidConfiguration {
            reason: "chunk size must be at least 1 byte".to_string(),
        });
    }

    let total = buffer.len().div_ceil(chunk_size).max(1);
    if total > MAX_PARTS {
        return Err(UploadError::InvalidConfiguration {
            reason: format!(
                "payload of {} bytes needs {} parts at chunk size {}, above the {} part ceiling",
                buffer.len(),
                total,
                chunk_size,
                MAX_PARTS
            ),
        });
    }

    let chunks = (0..total)
        .map(|index| {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(buffer.len());
            Chunk {
                index,
                data: buffer.slice(start..end),
            }
        })
        .collect();
    Ok(chunks)
}
