// Licensed under the Apache-2.0 license

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{ImageError, ImageResult};

/// CRC-32 of any region that ends with its own little-endian CRC-32.
///
/// Both EBL and GBL images are generated so that the bytes from the start of
/// the image through the end tag reduce to this value.
pub const VALID_IMAGE_CRC32: u32 = 0x2144_df1c;

const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Reflected CRC-32 (poly 0xEDB88320, init and xorout all-ones).
pub fn crc32(data: &[u8]) -> u32 {
    IMAGE_CRC.checksum(data)
}

/// Checks that `region` carries a valid trailing CRC-32.
pub fn verify_residue(region: &[u8]) -> ImageResult<()> {
    let actual = crc32(region);
    if actual != VALID_IMAGE_CRC32 {
        return Err(ImageError::ChecksumMismatch {
            expected: VALID_IMAGE_CRC32,
            actual,
        });
    }
    Ok(())
}
