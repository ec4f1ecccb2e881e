//! Integer, byte array and hex string conversions
//!
//! Every multi-byte field in the bitstream format is little-endian unless a
//! structure says otherwise (ECDSA coordinates and hashes are big-endian).

use crate::{Error, Result};

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Encode `value` into exactly `size` bytes (1 to 8).
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] if `size` is outside 1..=8 or the
/// value does not fit into `size` bytes.
pub fn integer_to_bytes(value: u64, size: usize, endian: Endian) -> Result<Vec<u8>> {
    if size == 0 || size > 8 {
        return Err(Error::InvariantViolation(format!(
            "integer field size must be 1-8 bytes, got {size}"
        )));
    }
    if size < 8 && value >> (size * 8) != 0 {
        return Err(Error::InvariantViolation(format!(
            "value {value:#x} does not fit in {size} bytes"
        )));
    }

    let bytes = value.to_le_bytes();
    let mut out = bytes[..size].to_vec();
    if endian == Endian::Big {
        out.reverse();
    }
    Ok(out)
}

/// Decode up to 8 bytes into an unsigned integer.
pub fn bytes_to_integer(bytes: &[u8], endian: Endian) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(Error::InvariantViolation(format!(
            "cannot decode {} bytes into a 64-bit integer",
            bytes.len()
        )));
    }

    let mut buf = [0u8; 8];
    match endian {
        Endian::Little => buf[..bytes.len()].copy_from_slice(bytes),
        Endian::Big => {
            for (i, b) in bytes.iter().rev().enumerate() {
                buf[i] = *b;
            }
        }
    }
    Ok(u64::from_le_bytes(buf))
}

/// Parse a hex number ("0x1F", "1f", "0X0001") into exactly `size` bytes.
///
/// The number is zero-extended, so `"0x1"` with `size = 8` in little-endian
/// order yields `[1, 0, 0, 0, 0, 0, 0, 0]`.
///
/// # Errors
///
/// Returns [`Error::InvalidHex`] for non-hex input and [`Error::SizeExceeded`]
/// when the number needs more than `size` bytes.
pub fn hex_string_to_bytes(text: &str, size: usize, endian: Endian) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(Error::InvalidHex(text.to_string()));
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    let decoded = hex::decode(&padded).map_err(|e| Error::InvalidHex(format!("{text}: {e}")))?;

    // Big-endian digits; leading zero bytes carry no value
    let significant: Vec<u8> = decoded.into_iter().skip_while(|b| *b == 0).collect();
    if significant.len() > size {
        return Err(Error::SizeExceeded {
            size: significant.len(),
            max_size: size,
        });
    }

    let mut out = vec![0u8; size - significant.len()];
    out.extend_from_slice(&significant);
    if endian == Endian::Little {
        out.reverse();
    }
    Ok(out)
}

/// Render bytes as a `0x`-prefixed lowercase hex number.
///
/// With [`Endian::Little`] the last byte is the most significant digit pair.
pub fn bytes_to_hex_string(bytes: &[u8], endian: Endian) -> String {
    match endian {
        Endian::Big => format!("0x{}", hex::encode(bytes)),
        Endian::Little => {
            let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
            format!("0x{}", hex::encode(reversed))
        }
    }
}

/// A byte length as stored in a 32-bit length field.
///
/// # Errors
///
/// Returns [`Error::SizeExceeded`] for lengths above `u32::MAX`.
pub fn length_to_u32(size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::SizeExceeded {
        size,
        max_size: u32::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_to_bytes() {
        assert_eq!(
            integer_to_bytes(0x3322_1100, 4, Endian::Little).unwrap(),
            vec![0x00, 0x11, 0x22, 0x33]
        );
        assert_eq!(
            integer_to_bytes(0x3322_1100, 4, Endian::Big).unwrap(),
            vec![0x33, 0x22, 0x11, 0x00]
        );
        assert_eq!(integer_to_bytes(u64::MAX, 8, Endian::Little).unwrap(), vec![0xff; 8]);
    }

    #[test]
    fn test_integer_overflow_rejected() {
        assert!(matches!(
            integer_to_bytes(0x1_0000, 2, Endian::Little),
            Err(Error::InvariantViolation(_))
        ));
        assert!(integer_to_bytes(1, 0, Endian::Little).is_err());
        assert!(integer_to_bytes(1, 9, Endian::Little).is_err());
    }

    #[test]
    fn test_bytes_to_integer() {
        let bytes = [0x00, 0x11, 0x22, 0x33];
        assert_eq!(bytes_to_integer(&bytes, Endian::Little).unwrap(), 0x3322_1100);
        assert_eq!(bytes_to_integer(&bytes, Endian::Big).unwrap(), 0x0011_2233);
        assert_eq!(bytes_to_integer(&[], Endian::Little).unwrap(), 0);
        assert!(bytes_to_integer(&[0; 9], Endian::Little).is_err());
    }

    #[test]
    fn test_hex_string_little_endian_expansion() {
        assert_eq!(
            hex_string_to_bytes("0x1", 8, Endian::Little).unwrap(),
            vec![1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            hex_string_to_bytes("0x0102", 4, Endian::Little).unwrap(),
            vec![2, 1, 0, 0]
        );
        assert_eq!(
            hex_string_to_bytes("102", 4, Endian::Big).unwrap(),
            vec![0, 0, 1, 2]
        );
    }

    #[test]
    fn test_hex_string_leading_zeros_ignored() {
        assert_eq!(
            hex_string_to_bytes("0x000000000001", 2, Endian::Little).unwrap(),
            vec![1, 0]
        );
    }

    #[test]
    fn test_hex_string_errors() {
        assert!(matches!(
            hex_string_to_bytes("0xzz", 4, Endian::Little),
            Err(Error::InvalidHex(_))
        ));
        assert!(matches!(
            hex_string_to_bytes("0x", 4, Endian::Little),
            Err(Error::InvalidHex(_))
        ));
        assert!(matches!(
            hex_string_to_bytes("0x010203", 2, Endian::Little),
            Err(Error::SizeExceeded { size: 3, max_size: 2 })
        ));
    }

    #[test]
    fn test_length_to_u32() {
        assert_eq!(length_to_u32(0x1000).unwrap(), 0x1000);
        assert_eq!(length_to_u32(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            length_to_u32(u32::MAX as usize + 1),
            Err(Error::SizeExceeded { max_size, .. }) if max_size == u32::MAX as usize
        ));
    }

    #[test]
    fn test_bytes_to_hex_string() {
        assert_eq!(bytes_to_hex_string(&[0x37, 0x2a], Endian::Big), "0x372a");
        assert_eq!(bytes_to_hex_string(&[0x37, 0x2a], Endian::Little), "0x2a37");
    }
}
