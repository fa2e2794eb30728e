// Licensed under the Apache-2.0 license
#![allow(dead_code)]

use log::LevelFilter;
use silabs_image::checksum::crc32;
use silabs_image::ebl::{EblTag, EBL_IMAGE_SIGNATURE, EBL_TAG_ENC_HEADER, EBL_TAG_HEADER};
use silabs_image::gbl::{GblTag, GBL_TAG_HEADER};
use simple_logger::SimpleLogger;

pub fn init_logger() {
    // Several tests share one process; only the first init wins.
    let _ = SimpleLogger::new().with_level(LevelFilter::Trace).init();
}

pub fn ebl_record(tag: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tag.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// 16-byte plain header followed by `aat`.
pub fn ebl_plain_header(version: u16, flash_addr: u32, aat: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&EBL_TAG_HEADER.to_be_bytes());
    out.extend_from_slice(&((12 + aat.len()) as u16).to_be_bytes());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&EBL_IMAGE_SIGNATURE.to_be_bytes());
    out.extend_from_slice(&flash_addr.to_be_bytes());
    out.extend_from_slice(&crc32(aat).to_be_bytes());
    out.extend_from_slice(aat);
    out
}

pub fn ebl_encrypted_header(version: u16, enc_type: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&EBL_TAG_ENC_HEADER.to_be_bytes());
    out.extend_from_slice(&6u16.to_be_bytes());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&enc_type.to_be_bytes());
    out.extend_from_slice(&EBL_IMAGE_SIGNATURE.to_be_bytes());
    out
}

pub fn ebl_prog(tag: EblTag, flash_addr: u32, data: &[u8]) -> Vec<u8> {
    let mut payload = flash_addr.to_be_bytes().to_vec();
    payload.extend_from_slice(data);
    ebl_record(tag as u16, &payload)
}

/// Appends the end tag and the CRC that makes the image self-validating.
pub fn finish_ebl(mut body: Vec<u8>) -> Vec<u8> {
    body.extend_from_slice(&(EblTag::End as u16).to_be_bytes());
    body.extend_from_slice(&4u16.to_be_bytes());
    let crc = crc32(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

pub fn gbl_record(tag: GblTag, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(tag as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn gbl_header(version: u32, image_type: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&GBL_TAG_HEADER.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&image_type.to_le_bytes());
    out
}

pub fn le_words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn finish_gbl(mut body: Vec<u8>) -> Vec<u8> {
    body.extend_from_slice(&(GblTag::End as u32).to_le_bytes());
    body.extend_from_slice(&4u32.to_le_bytes());
    let crc = crc32(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

/// Plain EBL image with one of each program tag and a metadata record.
pub fn sample_ebl() -> Vec<u8> {
    let mut body = ebl_plain_header(0x0201, 0x0000_4000, &[0xa5; 8]);
    body.extend(ebl_record(EblTag::Metadata as u16, b"ikea-bulb"));
    body.extend(ebl_prog(EblTag::EraseProg, 0x0000_4000, &[0x10; 32]));
    body.extend(ebl_prog(EblTag::Prog, 0x0000_4020, &[0x20; 30]));
    body.extend(ebl_prog(EblTag::MfgProg, 0x0804_0000, &[0x30; 2]));
    finish_ebl(body)
}

/// Signed GBL image with application info, bootloader and program records.
pub fn sample_gbl() -> Vec<u8> {
    let mut body = gbl_header(0x0300_0000, 0x0100);

    let mut app = le_words(&[0x40, 0x0002_0018, 0x0000_0000]);
    app.extend_from_slice(&[0x5c; 16]);
    body.extend(gbl_record(GblTag::Application, &app));

    let mut bootloader = le_words(&[0x0001_0c00, 0x0000_0000]);
    bootloader.extend_from_slice(&[0x77; 24]);
    body.extend(gbl_record(GblTag::Bootloader, &bootloader));

    body.extend(gbl_record(GblTag::Metadata, b"{\"fw\":\"2.0.024\"}"));

    let mut erase = le_words(&[0x0000_6000]);
    erase.extend_from_slice(&[0x01; 40]);
    body.extend(gbl_record(GblTag::EraseProg, &erase));

    let mut prog = le_words(&[0x0000_6028]);
    prog.extend_from_slice(&[0x02; 20]);
    body.extend(gbl_record(GblTag::Prog, &prog));

    let mut signature = vec![0x0a; 32];
    signature.extend_from_slice(&[0x0b; 32]);
    body.extend(gbl_record(GblTag::SignatureEcdsaP256, &signature));

    finish_gbl(body)
}
