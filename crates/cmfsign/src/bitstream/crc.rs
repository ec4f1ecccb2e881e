//! CRC-32 as used by descriptor checksums.
//!
//! The bitstream format uses the non-reflected CRC-32/BZIP2 variant
//! (poly 0x04C11DB7, init and xorout 0xFFFFFFFF).

use crc::{Crc, CRC_32_BZIP2};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_BZIP2);

/// Compute the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Catalog check value for "123456789"
        assert_eq!(crc32(b"123456789"), 0xFC89_1918);
    }

    #[test]
    fn test_zero_page() {
        assert_eq!(crc32(&[0u8; 4096]), 2_281_715_939);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc32(&[]), 0);
    }
}
