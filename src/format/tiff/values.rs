//! Reading tag values that live outside their IFD entry.
//!
//! Tile offset and byte-count arrays are fetched with a single range read
//! per array.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads tag values through a [`RangeReader`] using the file's byte order.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Raw value bytes, from the entry itself or from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or_else(|| unexpected_type(entry, "a known field type"))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: format!("value of {} bytes is too large", size),
        })?;
        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, len).await?)
    }

    /// Integer array of Short, Long or Long8 values, widened to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = match entry.field_type {
            Some(t @ (FieldType::Short | FieldType::Long | FieldType::Long8)) => t,
            _ => return Err(unexpected_type(entry, "Short, Long or Long8")),
        };
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        let byte_order = self.header.byte_order;
        let width = field_type.size_in_bytes();

        Ok(bytes
            .chunks_exact(width)
            .map(|chunk| match field_type {
                FieldType::Short => u64::from(byte_order.read_u16(chunk)),
                FieldType::Long => u64::from(byte_order.read_u32(chunk)),
                _ => byte_order.read_u64(chunk),
            })
            .collect())
    }

    /// ASCII value with its NUL terminator stripped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(unexpected_type(entry, "Ascii"));
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn tag_name(entry: &IfdEntry) -> &'static str {
    match entry.tag {
        270 => "ImageDescription",
        324 => "TileOffsets",
        325 => "TileByteCounts",
        347 => "JPEGTables",
        _ => "unknown",
    }
}

fn unexpected_type(entry: &IfdEntry, expected: &str) -> TiffError {
    TiffError::InvalidTagValue {
        tag: tag_name(entry),
        message: format!("expected {}, got field type {}", expected, entry.field_type_raw),
    }
}
