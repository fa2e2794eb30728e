// Licensed under the Apache-2.0 license

use core::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::ebl::{EBL_TAG_ENC_HEADER, EBL_TAG_HEADER};
use crate::gbl::GBL_TAG_HEADER;

/// Shortest buffer either format can be recognized from.
pub const MIN_DETECT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Ebl,
    Gbl,
}

impl ImageFormat {
    fn as_string(&self) -> &str {
        match *self {
            ImageFormat::Ebl => "EBL",
            ImageFormat::Gbl => "GBL",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

pub(crate) fn is_gbl(buffer: &[u8]) -> bool {
    match buffer.first_chunk::<4>() {
        Some(magic) if buffer.len() >= MIN_DETECT_LEN => u32::from_le_bytes(*magic) == GBL_TAG_HEADER,
        _ => false,
    }
}

pub(crate) fn is_ebl(buffer: &[u8]) -> bool {
    match buffer.first_chunk::<2>() {
        Some(magic) if buffer.len() >= MIN_DETECT_LEN => {
            let tag = u16::from_be_bytes(*magic);
            tag == EBL_TAG_HEADER || tag == EBL_TAG_ENC_HEADER
        }
        _ => false,
    }
}

/// Classifies a buffer by its leading magic.
///
/// GBL is checked before EBL. A GBL magic read as a big-endian EBL tag is
/// 0xeb17, which is not an EBL header tag, but the order is fixed so that the
/// answer never depends on that coincidence.
pub fn detect_format(buffer: &[u8]) -> Option<ImageFormat> {
    let format = if is_gbl(buffer) {
        Some(ImageFormat::Gbl)
    } else if is_ebl(buffer) {
        Some(ImageFormat::Ebl)
    } else {
        None
    };
    trace!("Detected {:?} for {} byte buffer", format, buffer.len());
    format
}
