// Licensed under the Apache-2.0 license

use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ImageResult, TrailingFault};
use crate::ImageFormat;

/// EBL images are padded with erased-flash bytes.
pub const EBL_PADDING: u8 = 0xff;
/// GBL images are padded with zeroes.
pub const GBL_PADDING: u8 = 0x00;

/// What may follow the end tag of an image.
///
/// Image generators differ between format revisions: some pad to an
/// alignment boundary, some emit nothing after the CRC, and some consumers
/// never look past the end tag at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Every trailing byte must equal the given padding value.
    Padding(u8),
    /// The image must end exactly after the end tag.
    Forbidden,
    /// Trailing bytes are ignored.
    Unchecked,
}

impl TrailingPolicy {
    pub(crate) fn check(self, format: ImageFormat, buffer: &[u8], offset: usize) -> ImageResult<()> {
        let trailing = buffer.get(offset..).unwrap_or_default();
        let fault = match self {
            TrailingPolicy::Unchecked => None,
            TrailingPolicy::Forbidden if !trailing.is_empty() => Some(TrailingFault::NotEmpty {
                offset,
                remaining: trailing.len(),
            }),
            TrailingPolicy::Forbidden => None,
            TrailingPolicy::Padding(expected) => trailing
                .iter()
                .position(|&byte| byte != expected)
                .map(|index| TrailingFault::BadPadding {
                    offset: offset + index,
                    expected,
                    found: trailing[index],
                }),
        };
        match fault {
            Some(fault) => Err(ImageError::TrailingDataInvalid { format, fault }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EblOptions {
    pub trailing: TrailingPolicy,
}

impl Default for EblOptions {
    fn default() -> Self {
        EblOptions {
            trailing: TrailingPolicy::Padding(EBL_PADDING),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GblOptions {
    pub trailing: TrailingPolicy,
}

impl Default for GblOptions {
    fn default() -> Self {
        GblOptions {
            trailing: TrailingPolicy::Padding(GBL_PADDING),
        }
    }
}

/// Options for [`crate::decode_with`], one set per format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub ebl: EblOptions,
    pub gbl: GblOptions,
}
