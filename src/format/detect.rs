//! Slide format detection.
//!
//! - **Aperio SVS**: tiled TIFF whose first ImageDescription mentions "Aperio"
//! - **Generic pyramidal TIFF**: any other tiled TIFF

use super::tiff::{ByteOrder, TIFF_HEADER_SIZE};

/// Detected tiled slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    AperioSvs,
    GenericTiff,
}

impl SlideFormat {
    /// Classify from the first IFD's ImageDescription.
    pub fn from_description(description: Option<&str>) -> Self {
        match description {
            Some(text) if text.contains("Aperio") => SlideFormat::AperioSvs,
            _ => SlideFormat::GenericTiff,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }
}

/// Cheap check on the first bytes of a file: TIFF or BigTIFF magic.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    let byte_order = match [bytes[0], bytes[1]] {
        [0x49, 0x49] => ByteOrder::LittleEndian,
        [0x4D, 0x4D] => ByteOrder::BigEndian,
        _ => return false,
    };
    matches!(byte_order.read_u16(&bytes[2..]), 42 | 43)
}

/// Scanner properties carried in an SVS ImageDescription.
///
/// ```text
/// Aperio Image Library v12.0.5
/// 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideProperties {
    /// Microns per pixel at level 0
    pub mpp: Option<f64>,

    /// Objective magnification
    pub magnification: Option<f64>,
}

impl SlideProperties {
    pub fn parse(description: &str) -> Self {
        let mut properties = Self::default();
        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().parse::<f64>().ok();
            match key.trim() {
                "MPP" => properties.mpp = value,
                "AppMag" => properties.magnification = value,
                _ => {}
            }
        }
        properties
    }
}
