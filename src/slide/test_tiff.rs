//! In-memory tiled TIFF builder for tests.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, RgbImage};

/// How tiles are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    /// Uncompressed RGB
    Raw,
    /// Self-contained JPEG streams
    Jpeg,
    /// JPEG scans with the tables in a shared JPEGTables tag
    AbbreviatedJpeg,
}

pub struct TiffLevel {
    pub image: RgbImage,
    pub tile: u32,
}

/// Little-endian classic TIFF with one tiled IFD per level.
pub fn build_tiled_tiff(
    levels: &[TiffLevel],
    encoding: TileEncoding,
    description: Option<&str>,
) -> Vec<u8> {
    let mut file = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut ifds: Vec<Vec<(u16, u16, u32, u32)>> = Vec::new();

    for (i, level) in levels.iter().enumerate() {
        let (w, h) = level.image.dimensions();
        let t = level.tile;
        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        let mut tables = None;

        for ty in 0..h.div_ceil(t) {
            for tx in 0..w.div_ceil(t) {
                let mut tile = RgbImage::new(t, t);
                let (x, y) = (tx * t, ty * t);
                let view = imageops::crop_imm(&level.image, x, y, t.min(w - x), t.min(h - y));
                imageops::replace(&mut tile, &view.to_image(), 0, 0);

                let data = match encoding {
                    TileEncoding::Raw => tile.into_raw(),
                    TileEncoding::Jpeg => encode_jpeg(&tile),
                    TileEncoding::AbbreviatedJpeg => {
                        let (level_tables, scan) = split_tables(&encode_jpeg(&tile));
                        tables.get_or_insert(level_tables);
                        scan
                    }
                };
                offsets.push(file.len() as u32);
                counts.push(data.len() as u32);
                file.extend_from_slice(&data);
            }
        }

        let compression = if encoding == TileEncoding::Raw { 1 } else { 7 };
        let offsets_value = push_longs(&mut file, &offsets);
        let counts_value = push_longs(&mut file, &counts);

        let mut entries = vec![(256, 4, 1, w), (257, 4, 1, h), (259, 3, 1, compression)];
        if let (0, Some(text)) = (i, description) {
            let at = file.len() as u32;
            file.extend_from_slice(text.as_bytes());
            file.push(0);
            entries.push((270, 2, text.len() as u32 + 1, at));
        }
        entries.extend([
            (277, 3, 1, 3),
            (322, 3, 1, t),
            (323, 3, 1, t),
            (324, 4, offsets.len() as u32, offsets_value),
            (325, 4, counts.len() as u32, counts_value),
        ]);
        if let Some(tables) = tables {
            let at = file.len() as u32;
            file.extend_from_slice(&tables);
            entries.push((347, 7, tables.len() as u32, at));
        }
        ifds.push(entries);
    }

    // Chain the IFDs after the data, patching each "next IFD" pointer.
    let mut pointer_at = 4;
    for entries in ifds {
        let at = file.len() as u32;
        file[pointer_at..pointer_at + 4].copy_from_slice(&at.to_le_bytes());
        file.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, field_type, count, value) in entries {
            file.extend_from_slice(&tag.to_le_bytes());
            file.extend_from_slice(&field_type.to_le_bytes());
            file.extend_from_slice(&count.to_le_bytes());
            if field_type == 3 && count == 1 {
                file.extend_from_slice(&(value as u16).to_le_bytes());
                file.extend_from_slice(&[0, 0]);
            } else {
                file.extend_from_slice(&value.to_le_bytes());
            }
        }
        pointer_at = file.len();
        file.extend_from_slice(&[0; 4]);
    }
    file
}

fn encode_jpeg(tile: &RgbImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, 95)
        .encode(tile.as_raw(), tile.width(), tile.height(), ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

/// Move the DQT/DHT segments of a complete stream into a tables stream.
fn split_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut scan = vec![0xFF, 0xD8];
    let mut pos = 2;
    loop {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            scan.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        match marker {
            0xDB | 0xC4 => tables.extend_from_slice(segment),
            0xE0..=0xEF => {}
            _ => scan.extend_from_slice(segment),
        }
        pos += 2 + len;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, scan)
}

/// Inline a single value, otherwise write the array and return its offset.
fn push_longs(file: &mut Vec<u8>, values: &[u32]) -> u32 {
    if let [single] = values {
        return *single;
    }
    let at = file.len() as u32;
    for value in values {
        file.extend_from_slice(&value.to_le_bytes());
    }
    at
}
