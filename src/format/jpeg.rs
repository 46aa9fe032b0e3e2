//! JPEG tile stream preparation.
//!
//! Aperio SVS and many pyramidal TIFFs store tiles as abbreviated JPEG
//! streams: the quantization (DQT) and Huffman (DHT) tables are kept once
//! in the level's `JPEGTables` tag and every tile holds only its scan.
//!
//! ```text
//! tables: SOI DQT DHT ... EOI        tile: SOI SOF SOS <scan> EOI
//!                  │                              │
//!                  └──── SOI DQT DHT ... SOF SOS <scan> EOI ────┘
//! ```

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DHT: u8 = 0xC4;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

/// What a stream declares before its first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    /// Tables appear before the scan
    Complete,
    /// Scan starts without any tables
    Abbreviated,
    /// Not a JPEG stream, or no scan found
    Unknown,
}

/// Walk the marker segments after SOI until tables or a scan turn up.
fn classify(data: &[u8]) -> StreamKind {
    if data.len() < 4 || data[..2] != SOI {
        return StreamKind::Unknown;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data[pos + 1] {
            DQT | DHT => return StreamKind::Complete,
            SOS => return StreamKind::Abbreviated,
            // Fill bytes and standalone markers carry no length
            0xFF => pos += 1,
            0x00 | 0x01 | 0xD0..=0xD9 => pos += 2,
            _ if pos + 3 < data.len() => {
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length.max(2);
            }
            _ => break,
        }
    }
    StreamKind::Unknown
}

/// True when the stream reaches a scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    classify(data) == StreamKind::Abbreviated
}

/// Splice `tables` in front of an abbreviated tile stream.
///
/// The tables' trailing EOI and the tile's leading SOI are dropped so the
/// result is a single SOI ... EOI stream.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI).unwrap_or(tile);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Return a decodable stream for `tile`, merging `tables` only when the
/// tile is abbreviated.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile: Bytes) -> Bytes {
    match tables {
        Some(tables) if !tables.is_empty() && is_abbreviated_stream(&tile) => {
            merge_jpeg_tables(tables, &tile)
        }
        _ => tile,
    }
}
