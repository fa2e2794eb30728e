// Licensed under the Apache-2.0 license

//! Gecko Bootloader (GBL) images.
//!
//! A GBL image is a sequence of `tag:u32, len:u32` records, all little-endian.
//! The first record is the image header; the scan ends at the end tag.

use log::{debug, trace};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::Serialize;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::checksum;
use crate::codec::{read_fixed, slice_at, LengthRule};
use crate::config::GblOptions;
use crate::error::{HeaderFault, ImageError, ImageResult, RecordFault};
use crate::ImageFormat;

pub const GBL_TAG_HEADER: u32 = 0x03a6_17eb;

/// Width of the `tag:u32, len:u32` prefix of every record.
pub const GBL_TAG_HEADER_LEN: usize = core::mem::size_of::<GblTagHeader>();

/// Header `image_type` flag: payload is AES-CCM encrypted.
pub const GBL_TYPE_ENCRYPTION_AESCCM: u32 = 0x0000_0001;
/// Header `image_type` flag: image carries an ECDSA-P256 signature.
pub const GBL_TYPE_SIGNATURE_ECDSA: u32 = 0x0000_0100;

const GBL_HEADER_MIN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize)]
#[repr(u32)]
pub enum GblTag {
    Header = 0x03a6_17eb,
    Application = 0xf40a_0af4,
    Bootloader = 0xf509_09f5,
    SeUpgrade = 0x5ea6_17eb,
    Metadata = 0xf608_08f6,
    Prog = 0xfe01_01fe,
    EraseProg = 0xfd03_03fd,
    End = 0xfc04_04fc,
    EncHeader = 0xfb05_05fb,
    EncInit = 0xfa06_06fa,
    EncEblData = 0xf907_07f9,
    EncMac = 0xf709_09f7,
    SignatureEcdsaP256 = 0xf70a_0af7,
    CertificateEcdsaP256 = 0xf30b_0bf3,
}

impl GblTag {
    fn length_rule(self) -> LengthRule {
        match self {
            GblTag::End => LengthRule::Exact(core::mem::size_of::<GblEndFixed>()),
            GblTag::EncHeader => LengthRule::Exact(core::mem::size_of::<GblEncHeaderFixed>()),
            GblTag::EncInit => LengthRule::Exact(core::mem::size_of::<GblEncInitFixed>()),
            GblTag::EncMac => LengthRule::Exact(core::mem::size_of::<GblEncMacFixed>()),
            GblTag::SignatureEcdsaP256 => {
                LengthRule::Exact(core::mem::size_of::<GblSignatureFixed>())
            }
            _ => LengthRule::Any,
        }
    }
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblTagHeader {
    pub tag: U32<LittleEndian>,
    pub len: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblHeaderFixed {
    pub tag: U32<LittleEndian>,
    pub len: U32<LittleEndian>,
    pub version: U32<LittleEndian>,
    pub image_type: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblApplicationFixed {
    pub app_type: U32<LittleEndian>,
    pub version: U32<LittleEndian>,
    pub capabilities: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblBootloaderFixed {
    pub bootloader_version: U32<LittleEndian>,
    pub address: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblSeUpgradeFixed {
    pub blob_size: U32<LittleEndian>,
    pub version: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblProgFixed {
    pub flash_start_address: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblEndFixed {
    pub crc: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblEncHeaderFixed {
    pub version: U32<LittleEndian>,
    pub magic_word: U32<LittleEndian>,
    pub encryption_type: U32<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblEncInitFixed {
    pub msg_len: U32<LittleEndian>,
    pub nonce: [u8; 12],
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblEncMacFixed {
    pub mac: [u8; 16],
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct GblSignatureFixed {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GblHeader {
    pub len: u32,
    pub version: u32,
    pub image_type: u32,
}

impl GblHeader {
    pub fn is_encrypted(&self) -> bool {
        self.image_type & GBL_TYPE_ENCRYPTION_AESCCM != 0
    }

    pub fn is_signed(&self) -> bool {
        self.image_type & GBL_TYPE_SIGNATURE_ECDSA != 0
    }

    fn decode(buffer: &[u8]) -> ImageResult<Self> {
        let header_err = |fault| ImageError::MalformedHeader {
            format: ImageFormat::Gbl,
            fault,
        };
        let too_short = |needed: usize| {
            header_err(HeaderFault::TooShort {
                needed,
                available: buffer.len(),
            })
        };

        let tag = match buffer.first_chunk::<4>() {
            Some(tag) => u32::from_le_bytes(*tag),
            None => return Err(too_short(GBL_TAG_HEADER_LEN)),
        };
        if tag != GBL_TAG_HEADER {
            return Err(header_err(HeaderFault::UnknownTag(tag)));
        }

        let (fixed, _) = GblHeaderFixed::read_from_prefix(buffer)
            .map_err(|_| too_short(core::mem::size_of::<GblHeaderFixed>()))?;

        let len = fixed.len.get();
        if (len as usize) < GBL_HEADER_MIN_LEN {
            return Err(header_err(HeaderFault::LengthTooSmall {
                min: GBL_HEADER_MIN_LEN,
                found: len as usize,
            }));
        }
        let end = (len as usize).saturating_add(GBL_TAG_HEADER_LEN);
        if end > buffer.len() {
            return Err(too_short(end));
        }

        Ok(GblHeader {
            len,
            version: fixed.version.get(),
            image_type: fixed.image_type.get(),
        })
    }
}

/// Flash write carried by program and erase-program tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GblProgram<'a> {
    pub len: u32,
    pub flash_start_address: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GblRecord<'a> {
    Application {
        len: u32,
        app_type: u32,
        version: u32,
        capabilities: u32,
        product_id: &'a [u8],
    },
    Bootloader {
        len: u32,
        bootloader_version: u32,
        address: u32,
        data: &'a [u8],
    },
    SeUpgrade {
        len: u32,
        blob_size: u32,
        version: u32,
        data: &'a [u8],
    },
    Metadata {
        len: u32,
        data: &'a [u8],
    },
    Program(GblProgram<'a>),
    EraseProgram(GblProgram<'a>),
    End {
        len: u32,
        crc: u32,
    },
    EncryptionHeader {
        len: u32,
        version: u32,
        magic_word: u32,
        encryption_type: u32,
    },
    EncryptionInit {
        len: u32,
        msg_len: u32,
        nonce: [u8; 12],
    },
    EncryptedData {
        len: u32,
        data: &'a [u8],
    },
    EncryptionMac {
        len: u32,
        mac: [u8; 16],
    },
    SignatureEcdsaP256 {
        len: u32,
        r: [u8; 32],
        s: [u8; 32],
    },
    CertificateEcdsaP256 {
        len: u32,
        certificate: &'a [u8],
    },
}

impl<'a> GblRecord<'a> {
    pub fn tag(&self) -> GblTag {
        match self {
            GblRecord::Application { .. } => GblTag::Application,
            GblRecord::Bootloader { .. } => GblTag::Bootloader,
            GblRecord::SeUpgrade { .. } => GblTag::SeUpgrade,
            GblRecord::Metadata { .. } => GblTag::Metadata,
            GblRecord::Program(_) => GblTag::Prog,
            GblRecord::EraseProgram(_) => GblTag::EraseProg,
            GblRecord::End { .. } => GblTag::End,
            GblRecord::EncryptionHeader { .. } => GblTag::EncHeader,
            GblRecord::EncryptionInit { .. } => GblTag::EncInit,
            GblRecord::EncryptedData { .. } => GblTag::EncEblData,
            GblRecord::EncryptionMac { .. } => GblTag::EncMac,
            GblRecord::SignatureEcdsaP256 { .. } => GblTag::SignatureEcdsaP256,
            GblRecord::CertificateEcdsaP256 { .. } => GblTag::CertificateEcdsaP256,
        }
    }

    pub fn declared_len(&self) -> u32 {
        match self {
            GblRecord::Program(prog) | GblRecord::EraseProgram(prog) => prog.len,
            GblRecord::Application { len, .. }
            | GblRecord::Bootloader { len, .. }
            | GblRecord::SeUpgrade { len, .. }
            | GblRecord::Metadata { len, .. }
            | GblRecord::End { len, .. }
            | GblRecord::EncryptionHeader { len, .. }
            | GblRecord::EncryptionInit { len, .. }
            | GblRecord::EncryptedData { len, .. }
            | GblRecord::EncryptionMac { len, .. }
            | GblRecord::SignatureEcdsaP256 { len, .. }
            | GblRecord::CertificateEcdsaP256 { len, .. } => *len,
        }
    }

    /// Decodes the record at `offset`, returning it with its on-wire span.
    pub fn decode(buffer: &'a [u8], offset: usize) -> ImageResult<(Self, usize)> {
        let record_err = |fault| ImageError::MalformedRecord {
            format: ImageFormat::Gbl,
            offset,
            fault,
        };

        let (tag_header, _) = buffer
            .get(offset..)
            .and_then(|rest| GblTagHeader::read_from_prefix(rest).ok())
            .ok_or(ImageError::TruncatedContainer {
                format: ImageFormat::Gbl,
                offset,
            })?;
        let raw_tag = tag_header.tag.get();
        let len = tag_header.len.get();

        let tag = match GblTag::from_u32(raw_tag) {
            Some(GblTag::Header) | None => return Err(record_err(RecordFault::UnknownTag(raw_tag))),
            Some(tag) => tag,
        };
        tag.length_rule()
            .check(raw_tag, len as usize)
            .map_err(record_err)?;

        let payload_offset = offset + GBL_TAG_HEADER_LEN;
        let payload = slice_at(buffer, payload_offset, len as usize).ok_or_else(|| {
            record_err(RecordFault::Overrun {
                tag: raw_tag,
                declared: len as usize,
                available: buffer.len().saturating_sub(payload_offset),
            })
        })?;

        let record = Self::decode_payload(tag, len, payload).map_err(record_err)?;
        Ok((record, GBL_TAG_HEADER_LEN + len as usize))
    }

    fn decode_payload(tag: GblTag, len: u32, payload: &'a [u8]) -> Result<Self, RecordFault> {
        let raw_tag = tag as u32;
        let record = match tag {
            GblTag::Application => {
                let (fixed, product_id) = read_fixed::<GblApplicationFixed>(raw_tag, payload)?;
                GblRecord::Application {
                    len,
                    app_type: fixed.app_type.get(),
                    version: fixed.version.get(),
                    capabilities: fixed.capabilities.get(),
                    product_id,
                }
            }
            GblTag::Bootloader => {
                let (fixed, data) = read_fixed::<GblBootloaderFixed>(raw_tag, payload)?;
                GblRecord::Bootloader {
                    len,
                    bootloader_version: fixed.bootloader_version.get(),
                    address: fixed.address.get(),
                    data,
                }
            }
            GblTag::SeUpgrade => {
                let (fixed, data) = read_fixed::<GblSeUpgradeFixed>(raw_tag, payload)?;
                GblRecord::SeUpgrade {
                    len,
                    blob_size: fixed.blob_size.get(),
                    version: fixed.version.get(),
                    data,
                }
            }
            GblTag::Metadata => GblRecord::Metadata { len, data: payload },
            GblTag::Prog | GblTag::EraseProg => {
                let (fixed, data) = read_fixed::<GblProgFixed>(raw_tag, payload)?;
                let prog = GblProgram {
                    len,
                    flash_start_address: fixed.flash_start_address.get(),
                    data,
                };
                if tag == GblTag::Prog {
                    GblRecord::Program(prog)
                } else {
                    GblRecord::EraseProgram(prog)
                }
            }
            GblTag::End => {
                let (fixed, _) = read_fixed::<GblEndFixed>(raw_tag, payload)?;
                GblRecord::End {
                    len,
                    crc: fixed.crc.get(),
                }
            }
            GblTag::EncHeader => {
                let (fixed, _) = read_fixed::<GblEncHeaderFixed>(raw_tag, payload)?;
                GblRecord::EncryptionHeader {
                    len,
                    version: fixed.version.get(),
                    magic_word: fixed.magic_word.get(),
                    encryption_type: fixed.encryption_type.get(),
                }
            }
            GblTag::EncInit => {
                let (fixed, _) = read_fixed::<GblEncInitFixed>(raw_tag, payload)?;
                GblRecord::EncryptionInit {
                    len,
                    msg_len: fixed.msg_len.get(),
                    nonce: fixed.nonce,
                }
            }
            GblTag::EncEblData => GblRecord::EncryptedData { len, data: payload },
            GblTag::EncMac => {
                let (fixed, _) = read_fixed::<GblEncMacFixed>(raw_tag, payload)?;
                GblRecord::EncryptionMac { len, mac: fixed.mac }
            }
            GblTag::SignatureEcdsaP256 => {
                let (fixed, _) = read_fixed::<GblSignatureFixed>(raw_tag, payload)?;
                GblRecord::SignatureEcdsaP256 {
                    len,
                    r: fixed.r,
                    s: fixed.s,
                }
            }
            GblTag::CertificateEcdsaP256 => GblRecord::CertificateEcdsaP256 {
                len,
                certificate: payload,
            },
            GblTag::Header => return Err(RecordFault::UnknownTag(raw_tag)),
        };
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GblImage<'a> {
    pub header: GblHeader,
    pub records: Vec<GblRecord<'a>>,
}

impl<'a> GblImage<'a> {
    pub fn decode(buffer: &'a [u8], options: &GblOptions) -> ImageResult<Self> {
        let header = GblHeader::decode(buffer)?;
        debug!(
            "GBL header: version 0x{:08x}, type 0x{:08x}, {} byte buffer",
            header.version,
            header.image_type,
            buffer.len()
        );

        let mut offset = GBL_TAG_HEADER_LEN + header.len as usize;
        let mut records = Vec::new();
        loop {
            if offset >= buffer.len() {
                return Err(ImageError::TruncatedContainer {
                    format: ImageFormat::Gbl,
                    offset,
                });
            }

            let (record, span) = GblRecord::decode(buffer, offset)?;
            trace!(
                "GBL record {:?} at offset {} ({} bytes)",
                record.tag(),
                offset,
                record.declared_len()
            );
            offset += span;

            let is_end = matches!(record, GblRecord::End { .. });
            records.push(record);
            if is_end {
                break;
            }
        }

        checksum::verify_residue(&buffer[..offset])?;
        options.trailing.check(ImageFormat::Gbl, buffer, offset)?;

        debug!(
            "GBL image valid: {} records, {} bytes consumed",
            records.len(),
            offset
        );
        Ok(GblImage { header, records })
    }

    /// CRC field of the end record.
    pub fn end_crc(&self) -> Option<u32> {
        self.records.iter().find_map(|record| match record {
            GblRecord::End { crc, .. } => Some(*crc),
            _ => None,
        })
    }

    /// Flash address and data of every program record, in order.
    pub fn program_chunks(&self) -> impl Iterator<Item = (u32, &'a [u8])> + '_ {
        self.records.iter().filter_map(|record| match record {
            GblRecord::Program(prog) | GblRecord::EraseProgram(prog) => {
                Some((prog.flash_start_address, prog.data))
            }
            _ => None,
        })
    }

    pub fn application(&self) -> Option<&GblRecord<'a>> {
        self.records
            .iter()
            .find(|record| matches!(record, GblRecord::Application { .. }))
    }
}
