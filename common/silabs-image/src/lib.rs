// Licensed under the Apache-2.0 license

//! Decoder for Silicon Labs bootloader upgrade images.
//!
//! Two container formats are supported: the legacy Ember Bootloader format
//! (EBL) and the Gecko Bootloader format (GBL). Buffers are expected to be
//! already extracted from any outer OTA container. Decoding borrows payloads
//! from the input buffer and never modifies it.
//!
//! ```no_run
//! # fn run(buffer: &[u8]) -> Result<(), silabs_image::ImageError> {
//! match silabs_image::decode(buffer)? {
//!     silabs_image::Image::Gbl(image) => println!("{} GBL records", image.records.len()),
//!     silabs_image::Image::Ebl(image) => println!("{} EBL records", image.records.len()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksum;
mod codec;
pub mod config;
pub mod detect;
pub mod ebl;
pub mod error;
pub mod gbl;

use log::warn;
use serde::Serialize;

pub use config::{DecodeOptions, EblOptions, GblOptions, TrailingPolicy};
pub use detect::{detect_format, ImageFormat};
pub use ebl::{EblHeader, EblImage, EblRecord};
pub use error::{ImageError, ImageResult};
pub use gbl::{GblHeader, GblImage, GblRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Image<'a> {
    Ebl(EblImage<'a>),
    Gbl(GblImage<'a>),
}

impl Image<'_> {
    pub fn format(&self) -> ImageFormat {
        match self {
            Image::Ebl(_) => ImageFormat::Ebl,
            Image::Gbl(_) => ImageFormat::Gbl,
        }
    }
}

/// Decodes an EBL image with the default trailing-padding policy.
pub fn decode_ebl(buffer: &[u8]) -> ImageResult<EblImage<'_>> {
    decode_ebl_with(buffer, &EblOptions::default())
}

pub fn decode_ebl_with<'a>(buffer: &'a [u8], options: &EblOptions) -> ImageResult<EblImage<'a>> {
    EblImage::decode(buffer, options).map_err(|err| {
        warn!("Rejected EBL image: {}", err);
        err
    })
}

/// Decodes a GBL image with the default trailing-padding policy.
pub fn decode_gbl(buffer: &[u8]) -> ImageResult<GblImage<'_>> {
    decode_gbl_with(buffer, &GblOptions::default())
}

pub fn decode_gbl_with<'a>(buffer: &'a [u8], options: &GblOptions) -> ImageResult<GblImage<'a>> {
    GblImage::decode(buffer, options).map_err(|err| {
        warn!("Rejected GBL image: {}", err);
        err
    })
}

/// Detects the format of `buffer` and decodes it with the matching decoder.
pub fn decode(buffer: &[u8]) -> ImageResult<Image<'_>> {
    decode_with(buffer, &DecodeOptions::default())
}

pub fn decode_with<'a>(buffer: &'a [u8], options: &DecodeOptions) -> ImageResult<Image<'a>> {
    match detect_format(buffer) {
        Some(ImageFormat::Gbl) => decode_gbl_with(buffer, &options.gbl).map(Image::Gbl),
        Some(ImageFormat::Ebl) => decode_ebl_with(buffer, &options.ebl).map(Image::Ebl),
        None => Err(ImageError::UnrecognizedFormat { len: buffer.len() }),
    }
}
