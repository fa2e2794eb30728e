// Licensed under the Apache-2.0 license

//! Ember Bootloader (EBL) images.
//!
//! An EBL image is a big-endian header followed by `tag:u16, len:u16` records
//! and terminated by an end tag carrying the image CRC. Encrypted images use a
//! short encrypted header instead of the plain one and carry their program
//! data inside encrypted-data records.

use log::{debug, trace};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::Serialize;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::checksum;
use crate::codec::{read_fixed, slice_at, LengthRule};
use crate::config::EblOptions;
use crate::error::{HeaderFault, ImageError, ImageResult, RecordFault};
use crate::ImageFormat;

pub const EBL_TAG_HEADER: u16 = 0x0000;
pub const EBL_TAG_ENC_HEADER: u16 = 0xfb05;

/// Signature word present in both the plain and the encrypted header.
pub const EBL_IMAGE_SIGNATURE: u16 = 0xe350;

/// Width of the `tag:u16, len:u16` prefix of every record.
pub const EBL_TAG_HEADER_LEN: usize = core::mem::size_of::<EblTagHeader>();

const EBL_PLAIN_HEADER_MIN_LEN: usize = 12;
const EBL_ENC_HEADER_LEN: usize = 6;
const EBL_MAX_RECORD_LEN: usize = 65534;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize)]
#[repr(u16)]
pub enum EblTag {
    Header = 0x0000,
    Prog = 0xfe01,
    MfgProg = 0x02fe,
    EraseProg = 0xfd03,
    Metadata = 0xf608,
    End = 0xfc04,
    EncHeader = 0xfb05,
    EncInit = 0xfa06,
    EncEblData = 0xf907,
    EncMac = 0xf709,
}

impl EblTag {
    fn length_rule(self) -> LengthRule {
        match self {
            EblTag::Prog | EblTag::MfgProg | EblTag::EraseProg => {
                LengthRule::Range(2, EBL_MAX_RECORD_LEN)
            }
            EblTag::Metadata => LengthRule::Range(1, EBL_MAX_RECORD_LEN),
            EblTag::End => LengthRule::Exact(core::mem::size_of::<EblEndFixed>()),
            EblTag::EncMac => LengthRule::Exact(core::mem::size_of::<EblEncMacFixed>()),
            _ => LengthRule::Any,
        }
    }
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblTagHeader {
    pub tag: U16<BigEndian>,
    pub len: U16<BigEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblPlainHeaderFixed {
    pub tag: U16<BigEndian>,
    pub len: U16<BigEndian>,
    pub version: U16<BigEndian>,
    pub signature: U16<BigEndian>,
    pub flash_addr: U32<BigEndian>,
    pub aat_crc: U32<BigEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblEncHeaderFixed {
    pub tag: U16<BigEndian>,
    pub len: U16<BigEndian>,
    pub version: U16<BigEndian>,
    pub enc_type: U16<BigEndian>,
    pub signature: U16<BigEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblProgFixed {
    pub flash_addr: U32<BigEndian>,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblEncInitFixed {
    pub msg_len: U32<BigEndian>,
    pub nonce: [u8; 12],
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblEncMacFixed {
    pub mac: [u8; 16],
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EblEndFixed {
    pub crc: U32<BigEndian>,
}

/// Unencrypted image header, including the application address table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EblPlainHeader<'a> {
    pub len: u16,
    pub version: u16,
    pub signature: u16,
    pub flash_addr: u32,
    pub aat_crc: u32,
    pub aat: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EblEncryptedHeader {
    pub len: u16,
    pub version: u16,
    pub enc_type: u16,
    pub signature: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EblHeader<'a> {
    Plain(EblPlainHeader<'a>),
    Encrypted(EblEncryptedHeader),
}

impl<'a> EblHeader<'a> {
    pub fn tag(&self) -> EblTag {
        match self {
            EblHeader::Plain(_) => EblTag::Header,
            EblHeader::Encrypted(_) => EblTag::EncHeader,
        }
    }

    /// Header length as declared on the wire, excluding the tag prefix.
    pub fn declared_len(&self) -> u16 {
        match self {
            EblHeader::Plain(header) => header.len,
            EblHeader::Encrypted(header) => header.len,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, EblHeader::Encrypted(_))
    }

    fn decode(buffer: &'a [u8]) -> ImageResult<Self> {
        let header_err = |fault| ImageError::MalformedHeader {
            format: ImageFormat::Ebl,
            fault,
        };
        let too_short = |needed: usize| {
            header_err(HeaderFault::TooShort {
                needed,
                available: buffer.len(),
            })
        };

        let tag = match buffer.first_chunk::<2>() {
            Some(tag) => u16::from_be_bytes(*tag),
            None => return Err(too_short(EBL_TAG_HEADER_LEN)),
        };

        match tag {
            EBL_TAG_HEADER => {
                let (fixed, _) = EblPlainHeaderFixed::read_from_prefix(buffer)
                    .map_err(|_| too_short(core::mem::size_of::<EblPlainHeaderFixed>()))?;

                let signature = fixed.signature.get();
                if signature != EBL_IMAGE_SIGNATURE {
                    return Err(header_err(HeaderFault::BadSignature {
                        expected: EBL_IMAGE_SIGNATURE,
                        found: signature,
                    }));
                }

                let len = fixed.len.get();
                if (len as usize) < EBL_PLAIN_HEADER_MIN_LEN {
                    return Err(header_err(HeaderFault::LengthTooSmall {
                        min: EBL_PLAIN_HEADER_MIN_LEN,
                        found: len as usize,
                    }));
                }
                let end = EBL_TAG_HEADER_LEN + len as usize;
                let aat = buffer
                    .get(core::mem::size_of::<EblPlainHeaderFixed>()..end)
                    .ok_or_else(|| too_short(end))?;

                Ok(EblHeader::Plain(EblPlainHeader {
                    len,
                    version: fixed.version.get(),
                    signature,
                    flash_addr: fixed.flash_addr.get(),
                    aat_crc: fixed.aat_crc.get(),
                    aat,
                }))
            }
            EBL_TAG_ENC_HEADER => {
                let (fixed, _) = EblEncHeaderFixed::read_from_prefix(buffer)
                    .map_err(|_| too_short(core::mem::size_of::<EblEncHeaderFixed>()))?;

                let len = fixed.len.get();
                if len as usize != EBL_ENC_HEADER_LEN {
                    return Err(header_err(HeaderFault::LengthMismatch {
                        expected: EBL_ENC_HEADER_LEN,
                        found: len as usize,
                    }));
                }

                let signature = fixed.signature.get();
                if signature != EBL_IMAGE_SIGNATURE {
                    return Err(header_err(HeaderFault::BadSignature {
                        expected: EBL_IMAGE_SIGNATURE,
                        found: signature,
                    }));
                }

                Ok(EblHeader::Encrypted(EblEncryptedHeader {
                    len,
                    version: fixed.version.get(),
                    enc_type: fixed.enc_type.get(),
                    signature,
                }))
            }
            _ => Err(header_err(HeaderFault::UnknownTag(tag as u32))),
        }
    }
}

/// Flash write carried by the program family of tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EblProgram<'a> {
    pub len: u16,
    pub flash_addr: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EblRecord<'a> {
    Program(EblProgram<'a>),
    MfgProgram(EblProgram<'a>),
    EraseProgram(EblProgram<'a>),
    Metadata {
        len: u16,
        data: &'a [u8],
    },
    EncryptionInit {
        len: u16,
        msg_len: u32,
        nonce: [u8; 12],
        associated_data: &'a [u8],
    },
    EncryptedData {
        len: u16,
        data: &'a [u8],
    },
    EncryptionMac {
        len: u16,
        mac: [u8; 16],
    },
    End {
        len: u16,
        crc: u32,
    },
}

impl<'a> EblRecord<'a> {
    pub fn tag(&self) -> EblTag {
        match self {
            EblRecord::Program(_) => EblTag::Prog,
            EblRecord::MfgProgram(_) => EblTag::MfgProg,
            EblRecord::EraseProgram(_) => EblTag::EraseProg,
            EblRecord::Metadata { .. } => EblTag::Metadata,
            EblRecord::EncryptionInit { .. } => EblTag::EncInit,
            EblRecord::EncryptedData { .. } => EblTag::EncEblData,
            EblRecord::EncryptionMac { .. } => EblTag::EncMac,
            EblRecord::End { .. } => EblTag::End,
        }
    }

    pub fn declared_len(&self) -> u16 {
        match self {
            EblRecord::Program(prog)
            | EblRecord::MfgProgram(prog)
            | EblRecord::EraseProgram(prog) => prog.len,
            EblRecord::Metadata { len, .. }
            | EblRecord::EncryptionInit { len, .. }
            | EblRecord::EncryptedData { len, .. }
            | EblRecord::EncryptionMac { len, .. }
            | EblRecord::End { len, .. } => *len,
        }
    }

    /// Decodes the record at `offset`, returning it with its on-wire span.
    pub fn decode(buffer: &'a [u8], offset: usize) -> ImageResult<(Self, usize)> {
        let record_err = |fault| ImageError::MalformedRecord {
            format: ImageFormat::Ebl,
            offset,
            fault,
        };

        let (tag_header, _) = buffer
            .get(offset..)
            .and_then(|rest| EblTagHeader::read_from_prefix(rest).ok())
            .ok_or(ImageError::TruncatedContainer {
                format: ImageFormat::Ebl,
                offset,
            })?;
        let raw_tag = tag_header.tag.get();
        let len = tag_header.len.get();

        let tag = match EblTag::from_u16(raw_tag) {
            Some(EblTag::Header) | Some(EblTag::EncHeader) | None => {
                return Err(record_err(RecordFault::UnknownTag(raw_tag as u32)))
            }
            Some(tag) => tag,
        };
        tag.length_rule()
            .check(raw_tag as u32, len as usize)
            .map_err(record_err)?;

        let payload_offset = offset + EBL_TAG_HEADER_LEN;
        let payload = slice_at(buffer, payload_offset, len as usize).ok_or_else(|| {
            record_err(RecordFault::Overrun {
                tag: raw_tag as u32,
                declared: len as usize,
                available: buffer.len().saturating_sub(payload_offset),
            })
        })?;

        let record = Self::decode_payload(tag, len, payload).map_err(record_err)?;
        Ok((record, EBL_TAG_HEADER_LEN + len as usize))
    }

    fn decode_payload(tag: EblTag, len: u16, payload: &'a [u8]) -> Result<Self, RecordFault> {
        let raw_tag = tag as u32;
        let record = match tag {
            EblTag::Prog | EblTag::MfgProg | EblTag::EraseProg => {
                let (fixed, data) = read_fixed::<EblProgFixed>(raw_tag, payload)?;
                let prog = EblProgram {
                    len,
                    flash_addr: fixed.flash_addr.get(),
                    data,
                };
                match tag {
                    EblTag::Prog => EblRecord::Program(prog),
                    EblTag::MfgProg => EblRecord::MfgProgram(prog),
                    _ => EblRecord::EraseProgram(prog),
                }
            }
            EblTag::Metadata => EblRecord::Metadata { len, data: payload },
            EblTag::EncInit => {
                let (fixed, associated_data) = read_fixed::<EblEncInitFixed>(raw_tag, payload)?;
                EblRecord::EncryptionInit {
                    len,
                    msg_len: fixed.msg_len.get(),
                    nonce: fixed.nonce,
                    associated_data,
                }
            }
            EblTag::EncEblData => EblRecord::EncryptedData { len, data: payload },
            EblTag::EncMac => {
                let (fixed, _) = read_fixed::<EblEncMacFixed>(raw_tag, payload)?;
                EblRecord::EncryptionMac { len, mac: fixed.mac }
            }
            EblTag::End => {
                let (fixed, _) = read_fixed::<EblEndFixed>(raw_tag, payload)?;
                EblRecord::End {
                    len,
                    crc: fixed.crc.get(),
                }
            }
            EblTag::Header | EblTag::EncHeader => return Err(RecordFault::UnknownTag(raw_tag)),
        };
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EblImage<'a> {
    pub header: EblHeader<'a>,
    pub records: Vec<EblRecord<'a>>,
}

impl<'a> EblImage<'a> {
    pub fn decode(buffer: &'a [u8], options: &EblOptions) -> ImageResult<Self> {
        let header = EblHeader::decode(buffer)?;
        debug!(
            "EBL header: {:?} version 0x{:04x}, {} byte buffer",
            header.tag(),
            match &header {
                EblHeader::Plain(plain) => plain.version,
                EblHeader::Encrypted(enc) => enc.version,
            },
            buffer.len()
        );

        let mut offset = EBL_TAG_HEADER_LEN + header.declared_len() as usize;
        let mut records = Vec::new();
        loop {
            if offset >= buffer.len() {
                return Err(ImageError::TruncatedContainer {
                    format: ImageFormat::Ebl,
                    offset,
                });
            }

            let (record, span) = EblRecord::decode(buffer, offset)?;
            trace!(
                "EBL record {:?} at offset {} ({} bytes)",
                record.tag(),
                offset,
                record.declared_len()
            );
            offset += span;

            let is_end = matches!(record, EblRecord::End { .. });
            records.push(record);
            if is_end {
                break;
            }
        }

        checksum::verify_residue(&buffer[..offset])?;
        options.trailing.check(ImageFormat::Ebl, buffer, offset)?;

        debug!(
            "EBL image valid: {} records, {} bytes consumed",
            records.len(),
            offset
        );
        Ok(EblImage { header, records })
    }

    /// CRC field of the end record.
    pub fn end_crc(&self) -> Option<u32> {
        self.records.iter().find_map(|record| match record {
            EblRecord::End { crc, .. } => Some(*crc),
            _ => None,
        })
    }

    /// Flash address and data of every unencrypted program record, in order.
    pub fn program_chunks(&self) -> impl Iterator<Item = (u32, &'a [u8])> + '_ {
        self.records.iter().filter_map(|record| match record {
            EblRecord::Program(prog)
            | EblRecord::MfgProgram(prog)
            | EblRecord::EraseProgram(prog) => Some((prog.flash_addr, prog.data)),
            _ => None,
        })
    }
}
