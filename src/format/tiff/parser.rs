//! TIFF and BigTIFF header and IFD parsing.
//!
//! Parsing works on byte buffers that were already fetched through a
//! [`RangeReader`](crate::io::RangeReader); nothing here does I/O.
//!
//! ```text
//! Classic TIFF header (8 bytes)      BigTIFF header (16 bytes)
//! ┌────┬────┬──────────┐             ┌────┬────┬────┬────┬──────────┐
//! │ II │ 42 │ IFD (u32)│             │ II │ 43 │ 8  │ 0  │ IFD (u64)│
//! └────┴────┴──────────┘             └────┴────┴────┴────┴──────────┘
//! ```

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

/// Size of a classic TIFF header.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of a BigTIFF header. Reading this many bytes covers both variants.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Upper bound on entries in one IFD. Real slides use a few dozen.
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// Byte Order
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the first two bytes of `bytes`.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header at the start of a file of `file_size` bytes.
    ///
    /// `bytes` must hold at least [`TIFF_HEADER_SIZE`] bytes, or
    /// [`BIGTIFF_HEADER_SIZE`] for BigTIFF.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        ensure_len(bytes, TIFF_HEADER_SIZE)?;

        let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
            0x4949 => ByteOrder::LittleEndian,
            0x4D4D => ByteOrder::BigEndian,
            magic => return Err(TiffError::InvalidMagic(magic)),
        };

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&bytes[2..]) {
            42 => (false, u64::from(byte_order.read_u32(&bytes[4..]))),
            43 => {
                ensure_len(bytes, BIGTIFF_HEADER_SIZE)?;
                let offset_size = byte_order.read_u16(&bytes[4..]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..]))
            }
            version => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset == 0 || first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(Self {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Bytes per IFD entry: 12 for TIFF, 20 for BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Bytes of the entry-count field that opens an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Bytes of offsets, the next-IFD pointer and the inline value field.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Decode the entry count from the first [`Self::ifd_count_size`] bytes.
    pub fn read_entry_count(&self, bytes: &[u8]) -> Result<u64, TiffError> {
        ensure_len(bytes, self.ifd_count_size())?;
        Ok(if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u16(bytes))
        })
    }

    fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u32(bytes))
        }
    }
}

fn ensure_len(bytes: &[u8], required: usize) -> Result<(), TiffError> {
    if bytes.len() < required {
        return Err(TiffError::Truncated {
            required: required as u64,
            actual: bytes.len() as u64,
        });
    }
    Ok(())
}

// =============================================================================
// IFD Entries
// =============================================================================

/// One tag of an IFD.
///
/// Values that fit in the entry's value field are kept inline; larger
/// values are referenced by offset and fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// Raw value field: 4 bytes for TIFF, 8 for BigTIFF
    pub value_offset_bytes: Vec<u8>,
    pub is_inline: bool,
}

impl IfdEntry {
    fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let tag = byte_order.read_u16(bytes);
        let field_type_raw = byte_order.read_u16(&bytes[2..]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_start) = if header.is_bigtiff {
            (byte_order.read_u64(&bytes[4..]), 12)
        } else {
            (u64::from(byte_order.read_u32(&bytes[4..])), 8)
        };
        let value_offset_bytes = bytes[value_start..value_start + header.offset_size()].to_vec();

        let is_inline = field_type
            .and_then(|t| count.checked_mul(t.size_in_bytes() as u64))
            .is_some_and(|size| size <= header.offset_size() as u64);

        Self {
            tag,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// Total size of the value in bytes, if the field type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .and_then(|t| self.count.checked_mul(t.size_in_bytes() as u64))
    }

    /// File offset of an out-of-line value.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() == 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            u64::from(byte_order.read_u32(&self.value_offset_bytes))
        }
    }

    /// Single inline integer value, if this entry holds one.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(u32::from(byte_order.read_u16(&self.value_offset_bytes))),
            FieldType::Long => Some(byte_order.read_u32(&self.value_offset_bytes)),
            FieldType::Long8 => u32::try_from(byte_order.read_u64(&self.value_offset_bytes)).ok(),
            _ => None,
        }
    }
}

// =============================================================================
// IFD
// =============================================================================

/// An Image File Directory: one image of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Bytes occupied by an IFD with `entry_count` entries.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.offset_size()
    }

    /// Parse an IFD from bytes starting at its entry count.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let entry_count = header.read_entry_count(bytes)?;
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::TooManyEntries(entry_count));
        }
        ensure_len(bytes, Self::calculate_size(entry_count, header))?;

        let entry_size = header.ifd_entry_size();
        let start = header.ifd_count_size();
        let entries = (0..entry_count as usize)
            .map(|i| {
                let offset = start + i * entry_size;
                IfdEntry::parse(&bytes[offset..offset + entry_size], header)
            })
            .collect();

        let next_at = start + entry_count as usize * entry_size;
        Ok(Self {
            entries,
            next_ifd_offset: header.read_offset(&bytes[next_at..]),
        })
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag.as_u16())
    }

    /// Inline integer value of `tag`.
    pub fn get_u32(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(tag)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageWidth, byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::ImageLength, byte_order)
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileWidth, byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_u32(TiffTag::TileLength, byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_u32(TiffTag::Compression, byte_order)
            .and_then(|v| u16::try_from(v).ok())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn le_header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    #[test]
    fn test_byte_order() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(ByteOrder::LittleEndian.read_u16(&bytes), 0x0201);
        assert_eq!(ByteOrder::BigEndian.read_u32(&bytes), 0x01020304);
        assert_eq!(ByteOrder::LittleEndian.read_u64(&bytes), 0x0807060504030201);
    }

    #[test]
    fn test_parse_classic_header() {
        let header = TiffHeader::parse(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0, 0, 0], 100).unwrap();
        assert_eq!(header, le_header());
        assert_eq!(header.ifd_entry_size(), 12);

        let header = TiffHeader::parse(&[0x4D, 0x4D, 0x00, 0x2A, 0, 0, 0, 0x10], 100).unwrap();
        assert_eq!(header.byte_order, ByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset, 16);
    }

    #[test]
    fn test_parse_bigtiff_header() {
        let bytes = [
            0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00, // II, 43, offset size 8
            0x10, 0, 0, 0, 0, 0, 0, 0, // first IFD at 16
        ];
        let header = TiffHeader::parse(&bytes, 1000).unwrap();
        assert!(header.is_bigtiff);
        assert_eq!(header.first_ifd_offset, 16);
        assert_eq!(header.ifd_entry_size(), 20);
        assert_eq!(header.offset_size(), 8);
    }

    #[test]
    fn test_parse_header_errors() {
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x2A], 100),
            Err(TiffError::Truncated { required: 8, actual: 3 })
        ));
        assert!(matches!(
            TiffHeader::parse(&[0x89, 0x50, 0x4E, 0x47, 0, 0, 0, 0], 100),
            Err(TiffError::InvalidMagic(0x5089))
        ));
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x2C, 0x00, 8, 0, 0, 0], 100),
            Err(TiffError::InvalidVersion(44))
        ));
        assert!(matches!(
            TiffHeader::parse(&[0x49, 0x49, 0x2A, 0x00, 0xE8, 0x03, 0, 0], 100),
            Err(TiffError::InvalidIfdOffset(1000))
        ));
        let bigtiff = [0x49, 0x49, 0x2B, 0x00, 0x04, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            TiffHeader::parse(&bigtiff, 100),
            Err(TiffError::InvalidBigTiffOffsetSize(4))
        ));
    }

    #[test]
    fn test_parse_ifd() {
        let mut bytes = vec![2, 0]; // two entries
        // ImageWidth, SHORT, 1, 1024
        bytes.extend_from_slice(&[0x00, 0x01, 3, 0, 1, 0, 0, 0, 0x00, 0x04, 0, 0]);
        // TileOffsets, LONG, 4, at offset 500
        bytes.extend_from_slice(&[0x44, 0x01, 4, 0, 4, 0, 0, 0, 0xF4, 0x01, 0, 0]);
        bytes.extend_from_slice(&[0x20, 0, 0, 0]); // next IFD at 32

        let header = le_header();
        assert_eq!(Ifd::calculate_size(2, &header), bytes.len());
        let ifd = Ifd::parse(&bytes, &header).unwrap();

        assert_eq!(ifd.entries.len(), 2);
        assert_eq!(ifd.next_ifd_offset, 32);
        assert_eq!(ifd.image_width(ByteOrder::LittleEndian), Some(1024));

        let offsets = ifd.get_entry_by_tag(TiffTag::TileOffsets).unwrap();
        assert!(!offsets.is_inline);
        assert_eq!(offsets.value_byte_size(), Some(16));
        assert_eq!(offsets.value_offset(ByteOrder::LittleEndian), 500);
        assert_eq!(offsets.inline_u32(ByteOrder::LittleEndian), None);
        assert!(ifd.tile_width(ByteOrder::LittleEndian).is_none());
    }

    #[test]
    fn test_parse_ifd_truncated() {
        let header = le_header();
        assert!(matches!(
            Ifd::parse(&[3, 0, 0, 0], &header),
            Err(TiffError::Truncated { required: 42, .. })
        ));
        assert!(matches!(
            Ifd::parse(&[0xFF, 0xFF], &header),
            Err(TiffError::TooManyEntries(65535))
        ));
    }
}
