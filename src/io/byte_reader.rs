use async_trait::async_trait;

use crate::error::ReadError;

/// Random-access byte source for a single input file.
///
/// The format reader above this seam only needs the object's size and byte
/// ranges, so alternate backends (and in-memory test sources) plug in here.
#[async_trait]
pub trait ByteReader: Send + Sync {
    /// Total size of the object in bytes.
    async fn size(&self) -> Result<u64, ReadError>;

    /// Read the half-open byte range `[start, end)`.
    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, ReadError>;
}
