use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random-access reads over an immutable byte source.
///
/// Implementations must be safe to share between concurrent region reads.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns [`IoError::RangeOutOfBounds`] if the range extends past the
    /// end of the source. A zero-length read returns empty bytes.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Identifier used in logs and errors (typically the file path).
    fn identifier(&self) -> &str;
}

/// Reject ranges that leave a source of `size` bytes.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}
