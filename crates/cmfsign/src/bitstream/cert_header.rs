//! Engineering certificate header.
//!
//! A section descriptor typed `CRT` whose body identifies the device the
//! certificate unlocks:
//!
//! ```text
//! 0x000  SECTION_DESCRIPTOR magic
//! 0x00C  CERT_SECTION_DESCRIPTOR
//! 0x010  CERTIFICATE_ENGINEERING magic
//! 0x020  device UID        (8 bytes, little-endian)
//! 0x030  HMAC              (48 bytes, little-endian)
//! 0x060  public key hash   (48 bytes, little-endian)
//! 0xFFC  CRC over [0, 0xFFC)
//! ```

use super::constants::{
    CERTIFICATE_ENGINEERING, CERT_SECTION_DESCRIPTOR, DESCRIPTOR_SIZE, SECTION_DESCRIPTOR,
};
use super::convert::{bytes_to_hex_string, hex_string_to_bytes, Endian};
use super::fragment::{fragment_newtype, BinaryFragment, Validate};
use super::section_descriptor::SECTION_CRC_OFFSET;
use crate::{Error, Result};
use std::fmt;

const SECTION_TYPE_OFFSET: usize = 0xC;
const CERT_MAGIC_OFFSET: usize = 0x10;
const UID_OFFSET: usize = 0x20;
const UID_SIZE: usize = 8;
const HMAC_OFFSET: usize = 0x30;
const HMAC_SIZE: usize = 48;
const PUB_KEY_HASH_OFFSET: usize = 0x60;
const PUB_KEY_HASH_SIZE: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineeringCertHeader {
    fragment: BinaryFragment,
}

impl Default for EngineeringCertHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineeringCertHeader {
    pub fn new() -> Self {
        Self {
            fragment: BinaryFragment::empty(Some(DESCRIPTOR_SIZE))
                .with_magic(SECTION_DESCRIPTOR, 0x0)
                .with_magic(CERTIFICATE_ENGINEERING, CERT_MAGIC_OFFSET)
                .with_crc(SECTION_CRC_OFFSET)
                .with_description("engineering certificate header"),
        }
    }

    /// Build a header from hex strings (`0x` prefix optional).
    ///
    /// Each value is zero-extended to its field size and stored little-endian,
    /// so uid `"0x1"` becomes `[1, 0, 0, 0, 0, 0, 0, 0]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHex`] for malformed input and
    /// [`Error::SizeExceeded`] when a value does not fit its field.
    pub fn initialize(&mut self, uid: &str, hmac: &str, pub_key_hash: &str) -> Result<()> {
        let uid = hex_string_to_bytes(uid, UID_SIZE, Endian::Little)?;
        let hmac = hex_string_to_bytes(hmac, HMAC_SIZE, Endian::Little)?;
        let pub_key_hash = hex_string_to_bytes(pub_key_hash, PUB_KEY_HASH_SIZE, Endian::Little)?;

        self.fragment.initialize(DESCRIPTOR_SIZE)?;
        self.fragment
            .set_u32(CERT_SECTION_DESCRIPTOR, SECTION_TYPE_OFFSET)?;
        self.fragment.set_raw(&uid, UID_OFFSET)?;
        self.fragment.set_raw(&hmac, HMAC_OFFSET)?;
        self.fragment.set_raw(&pub_key_hash, PUB_KEY_HASH_OFFSET)?;
        self.fragment.update_crc()
    }

    pub fn fragment(&self) -> &BinaryFragment {
        &self.fragment
    }

    pub fn uid(&self) -> Result<&[u8]> {
        self.fragment.get_raw(UID_OFFSET, UID_SIZE)
    }

    pub fn hmac(&self) -> Result<&[u8]> {
        self.fragment.get_raw(HMAC_OFFSET, HMAC_SIZE)
    }

    pub fn pub_key_hash(&self) -> Result<&[u8]> {
        self.fragment.get_raw(PUB_KEY_HASH_OFFSET, PUB_KEY_HASH_SIZE)
    }
}

impl Validate for EngineeringCertHeader {
    fn validate(&self) -> Result<()> {
        if self.fragment.size() != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "engineering certificate header",
                expected: DESCRIPTOR_SIZE,
                actual: self.fragment.size(),
            });
        }
        self.fragment.validate()?;

        let section_type = self.fragment.get_u32(SECTION_TYPE_OFFSET)?;
        if section_type != CERT_SECTION_DESCRIPTOR {
            return Err(Error::InvalidField(format!(
                "engineering certificate section type is {section_type:#x}"
            )));
        }
        Ok(())
    }
}

fragment_newtype!(EngineeringCertHeader);

impl fmt::Display for EngineeringCertHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " EngineeringCertHeader [Size={}]", self.fragment.size())?;
        if let (Ok(uid), Ok(hmac), Ok(hash)) = (self.uid(), self.hmac(), self.pub_key_hash()) {
            writeln!(f, "  UID: {}", bytes_to_hex_string(uid, Endian::Little))?;
            writeln!(f, "  HMAC: {}", bytes_to_hex_string(hmac, Endian::Little))?;
            writeln!(f, "  Public Key Hash: {}", bytes_to_hex_string(hash, Endian::Little))?;
        }
        Ok(())
    }
}
