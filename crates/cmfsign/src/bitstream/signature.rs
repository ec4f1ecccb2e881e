//! ECDSA signature blob carried by public key and block0 entries.
//!
//! ```text
//! 0x00  ECDSA_SIGNATURE magic
//! 0x04  r size
//! 0x08  s size
//! 0x0C  hash type magic
//! 0x10  r || s   big-endian
//! ```

use super::constants::{ECDSA_SIGNATURE, ECDSA_SIGNATURE_HEADER_SIZE, HASH_SHA_384, HASH_SHA_512};
use super::convert::{bytes_to_hex_string, Endian};
use super::fragment::{fragment_newtype, BinaryFragment, Validate};
use crate::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    fragment: BinaryFragment,
}

impl EcdsaSignature {
    /// Build a SHA-384 signature from big-endian `r` and `s`.
    pub fn from_rs(r: &[u8], s: &[u8]) -> Result<Self> {
        if r.is_empty() || s.is_empty() || r.len() > 66 || s.len() > 66 {
            return Err(Error::InvalidField(format!(
                "signature components of {} and {} bytes are not supported",
                r.len(),
                s.len()
            )));
        }
        let mut fragment = BinaryFragment::empty(None).with_magic(ECDSA_SIGNATURE, 0x0);
        fragment.initialize(ECDSA_SIGNATURE_HEADER_SIZE + r.len() + s.len())?;
        fragment.set_u32(r.len() as u32, 0x4)?;
        fragment.set_u32(s.len() as u32, 0x8)?;
        fragment.set_u32(HASH_SHA_384, 0xC)?;
        fragment.set_raw(r, ECDSA_SIGNATURE_HEADER_SIZE)?;
        fragment.set_raw(s, ECDSA_SIGNATURE_HEADER_SIZE + r.len())?;
        Ok(Self { fragment })
    }

    /// Wrap and validate serialized signature bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let fragment = BinaryFragment::new(Some(bytes), None)?.with_magic(ECDSA_SIGNATURE, 0x0);
        let signature = Self { fragment };
        signature.validate()?;
        Ok(signature)
    }

    pub fn fragment(&self) -> &BinaryFragment {
        &self.fragment
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.fragment.into_bytes()
    }

    pub fn r_size(&self) -> Result<usize> {
        Ok(self.fragment.get_u32(0x4)? as usize)
    }

    pub fn s_size(&self) -> Result<usize> {
        Ok(self.fragment.get_u32(0x8)? as usize)
    }

    pub fn hash_type(&self) -> Result<u32> {
        self.fragment.get_u32(0xC)
    }

    pub fn r(&self) -> Result<&[u8]> {
        self.fragment.get_raw(ECDSA_SIGNATURE_HEADER_SIZE, self.r_size()?)
    }

    pub fn s(&self) -> Result<&[u8]> {
        self.fragment
            .get_raw(ECDSA_SIGNATURE_HEADER_SIZE + self.r_size()?, self.s_size()?)
    }
}

impl Validate for EcdsaSignature {
    fn validate(&self) -> Result<()> {
        self.fragment.validate()?;
        let hash_type = self.hash_type()?;
        if hash_type != HASH_SHA_384 && hash_type != HASH_SHA_512 {
            return Err(Error::InvalidField(format!(
                "unknown signature hash type {hash_type:#x}"
            )));
        }
        let expected = ECDSA_SIGNATURE_HEADER_SIZE + self.r_size()? + self.s_size()?;
        if expected != self.fragment.size() {
            return Err(Error::LengthMismatch {
                field: "ecdsa signature",
                expected,
                actual: self.fragment.size(),
            });
        }
        Ok(())
    }
}

fragment_newtype!(EcdsaSignature);

impl fmt::Display for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " EcdsaSignature [Size={}]", self.fragment.size())?;
        if let (Ok(r), Ok(s)) = (self.r(), self.s()) {
            writeln!(f, "  R: {}", bytes_to_hex_string(r, Endian::Big))?;
            writeln!(f, "  S: {}", bytes_to_hex_string(s, Endian::Big))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::constants::ECDSA_SIGNATURE_SIZE;
    use crate::bitstream::Fragment;

    #[test]
    fn test_from_rs() {
        let signature = EcdsaSignature::from_rs(&[0x11; 48], &[0x22; 48]).unwrap();
        signature.validate().unwrap();
        assert_eq!(signature.size(), ECDSA_SIGNATURE_SIZE);
        assert_eq!(signature.r().unwrap(), &[0x11; 48]);
        assert_eq!(signature.s().unwrap(), &[0x22; 48]);
        assert_eq!(signature.hash_type().unwrap(), HASH_SHA_384);
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let signature = EcdsaSignature::from_rs(&[0x33; 48], &[0x44; 48]).unwrap();
        let parsed = EcdsaSignature::from_bytes(signature.to_bytes()).unwrap();
        assert_eq!(parsed.r().unwrap(), signature.r().unwrap());
    }

    #[test]
    fn test_rejects_zero_placeholder() {
        assert!(matches!(
            EcdsaSignature::from_bytes(vec![0; ECDSA_SIGNATURE_SIZE]),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated() {
        let mut bytes = EcdsaSignature::from_rs(&[1; 48], &[2; 48]).unwrap().into_bytes();
        bytes.truncate(100);
        assert!(matches!(
            EcdsaSignature::from_bytes(bytes),
            Err(Error::OutOfBounds { .. }) | Err(Error::LengthMismatch { .. })
        ));
    }
}
