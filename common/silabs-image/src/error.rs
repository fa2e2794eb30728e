// Licensed under the Apache-2.0 license

use thiserror::Error;

use crate::ImageFormat;

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Unrecognized image format ({len} bytes)")]
    UnrecognizedFormat { len: usize },
    #[error("Malformed {format} header: {fault}")]
    MalformedHeader {
        format: ImageFormat,
        fault: HeaderFault,
    },
    #[error("Malformed {format} record at offset {offset}: {fault}")]
    MalformedRecord {
        format: ImageFormat,
        offset: usize,
        fault: RecordFault,
    },
    #[error("Truncated {format} image: no end tag before offset {offset}")]
    TruncatedContainer { format: ImageFormat, offset: usize },
    #[error("Image CRC-32 is invalid (expected 0x{expected:08x}, computed 0x{actual:08x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("Invalid {format} trailing data: {fault}")]
    TrailingDataInvalid {
        format: ImageFormat,
        fault: TrailingFault,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderFault {
    #[error("header needs at least {needed} bytes, but buffer only has {available}")]
    TooShort { needed: usize, available: usize },
    #[error("unknown header tag 0x{0:x}")]
    UnknownTag(u32),
    #[error("failed signature check (expected 0x{expected:04x}, found 0x{found:04x})")]
    BadSignature { expected: u16, found: u16 },
    #[error("incorrect header length (expected {expected}, found {found})")]
    LengthMismatch { expected: usize, found: usize },
    #[error("header length {found} is below the minimum of {min}")]
    LengthTooSmall { min: usize, found: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordFault {
    #[error("unknown tag 0x{0:x}")]
    UnknownTag(u32),
    #[error("tag 0x{tag:x} declares {declared} bytes but only {available} remain")]
    Overrun {
        tag: u32,
        declared: usize,
        available: usize,
    },
    #[error("tag 0x{tag:x} length should be {expected}, but was {actual}")]
    LengthMismatch {
        tag: u32,
        expected: usize,
        actual: usize,
    },
    #[error("tag 0x{tag:x} needs at least {min} bytes, but was {actual}")]
    LengthTooSmall { tag: u32, min: usize, actual: usize },
    #[error("tag 0x{tag:x} length should be between {min} and {max}, but was {actual}")]
    LengthOutOfRange {
        tag: u32,
        min: usize,
        max: usize,
        actual: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrailingFault {
    #[error("padding byte 0x{found:02x} at offset {offset} (expected 0x{expected:02x})")]
    BadPadding {
        offset: usize,
        expected: u8,
        found: u8,
    },
    #[error("{remaining} unexpected bytes after offset {offset}")]
    NotEmpty { offset: usize, remaining: usize },
}
