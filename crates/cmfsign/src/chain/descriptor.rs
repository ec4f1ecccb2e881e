//! Signature descriptor: the 4 KiB block that follows every signed descriptor.
//!
//! ```text
//! 0x000  SIGNATURE_DESCRIPTOR magic
//! 0x004  chain section format (0 classic, 1 multi-root)
//! 0x008  descriptor length (0x1000)
//! 0x00C  reserved (0)
//! 0x010  block0 hash: SHA-384 of the signed descriptor
//! 0x040  signature chain section (0xFBC bytes)
//! 0xFFC  CRC over [0, 0xFFC)
//! ```

use super::chain::SignatureChain;
use super::section::{ChainSectionFormat, SignatureChainSection};
use crate::bitstream::constants::{SIGNATURE_DESCRIPTOR, SIGNATURE_DESCRIPTOR_SIZE};
use crate::bitstream::crc::crc32;
use crate::bitstream::{
    composite_fragment, BinaryFragment, BitstreamReader, Composite, Fragment, Validate,
};
use crate::{Error, Result};
use std::fmt;

const HEADER_SIZE: usize = 0x40;
const FORMAT_OFFSET: usize = 0x4;
const LENGTH_OFFSET: usize = 0x8;
const RESERVED_OFFSET: usize = 0xC;
const BLOCK0_HASH_OFFSET: usize = 0x10;
const BLOCK0_HASH_SIZE: usize = 48;
const CRC_SIZE: usize = 4;
const CRC_OFFSET: usize = SIGNATURE_DESCRIPTOR_SIZE - CRC_SIZE;
const CHAIN_SECTION_SIZE: usize = CRC_OFFSET - HEADER_SIZE;

/// Signature descriptor holding the block0 hash link and the signature chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDescriptor {
    header: BinaryFragment,
    chain_section: SignatureChainSection,
    crc: BinaryFragment,
}

impl SignatureDescriptor {
    /// Descriptor with empty chains and a zero block0 hash.
    pub fn new(format: ChainSectionFormat) -> Result<Self> {
        let mut descriptor = Self {
            header: Self::empty_header(),
            chain_section: SignatureChainSection::new(format, CHAIN_SECTION_SIZE)?,
            crc: BinaryFragment::empty(Some(CRC_SIZE)),
        };
        descriptor.header.initialize(HEADER_SIZE)?;
        descriptor.header.set_u32(format.value(), FORMAT_OFFSET)?;
        descriptor
            .header
            .set_u32(SIGNATURE_DESCRIPTOR_SIZE as u32, LENGTH_OFFSET)?;
        descriptor.crc.initialize(CRC_SIZE)?;
        descriptor.update()?;
        Ok(descriptor)
    }

    /// Empty descriptor ready to be read; the chain format comes from the stream.
    pub fn for_read() -> Self {
        Self {
            header: Self::empty_header(),
            chain_section: SignatureChainSection::for_read(
                ChainSectionFormat::Classic,
                CHAIN_SECTION_SIZE,
            ),
            crc: BinaryFragment::empty(Some(CRC_SIZE)),
        }
    }

    fn empty_header() -> BinaryFragment {
        BinaryFragment::empty(Some(HEADER_SIZE))
            .with_magic(SIGNATURE_DESCRIPTOR, 0x0)
            .with_description("signature descriptor header")
    }

    pub fn format(&self) -> Result<ChainSectionFormat> {
        let value = self.header.get_u32(FORMAT_OFFSET)?;
        ChainSectionFormat::from_value(value).ok_or_else(|| {
            Error::InvalidField(format!("signature chain section format {value} is unknown"))
        })
    }

    /// SHA-384 of the descriptor this block signs.
    pub fn block0_hash(&self) -> Result<&[u8]> {
        self.header.get_raw(BLOCK0_HASH_OFFSET, BLOCK0_HASH_SIZE)
    }

    /// Store the block0 hash and refresh the CRC.
    pub fn set_block0_hash(&mut self, hash: &[u8; 48]) -> Result<()> {
        self.header.set_raw(hash, BLOCK0_HASH_OFFSET)?;
        self.update_crc()
    }

    pub fn chain_section(&self) -> &SignatureChainSection {
        &self.chain_section
    }

    /// Mutable chain section; call [`Fragment::update`] after editing.
    pub fn chain_section_mut(&mut self) -> &mut SignatureChainSection {
        &mut self.chain_section
    }

    /// Chains holding at least one entry.
    pub fn signature_chains(&self) -> impl Iterator<Item = &SignatureChain> {
        self.chain_section.populated_chains()
    }

    /// Store `chain` in the first empty slot, returning the slot index.
    pub fn add_signature_chain(&mut self, chain: SignatureChain) -> Result<usize> {
        let index = self.chain_section.add_signature_chain(chain)?;
        self.update_crc()?;
        Ok(index)
    }

    pub fn stored_crc(&self) -> Result<u32> {
        self.crc.get_u32(0)
    }

    /// CRC over `[0, 0xFFC)` of the serialized descriptor.
    pub fn computed_crc(&self) -> Result<u32> {
        Ok(crc32(&self.read_bytes(0, CRC_OFFSET)?))
    }

    fn update_crc(&mut self) -> Result<()> {
        let value = self.computed_crc()?;
        self.crc.set_u32(value, 0)
    }
}

impl Composite for SignatureDescriptor {
    fn parts(&self) -> Vec<&dyn Fragment> {
        vec![
            &self.header as &dyn Fragment,
            &self.chain_section as &dyn Fragment,
            &self.crc as &dyn Fragment,
        ]
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        vec![
            &mut self.header as &mut dyn Fragment,
            &mut self.chain_section as &mut dyn Fragment,
            &mut self.crc as &mut dyn Fragment,
        ]
    }
}

impl Validate for SignatureDescriptor {
    fn validate(&self) -> Result<()> {
        if self.size() != SIGNATURE_DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "signature descriptor",
                expected: SIGNATURE_DESCRIPTOR_SIZE,
                actual: self.size(),
            });
        }
        self.header.validate()?;

        let format = self.format()?;
        if format != self.chain_section.format() {
            return Err(Error::InvalidField(format!(
                "header announces {format} chains but the section is {}",
                self.chain_section.format()
            )));
        }
        let length = self.header.get_u32(LENGTH_OFFSET)? as usize;
        if length != SIGNATURE_DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "signature descriptor length",
                expected: SIGNATURE_DESCRIPTOR_SIZE,
                actual: length,
            });
        }
        let reserved = self.header.get_u32(RESERVED_OFFSET)?;
        if reserved != 0 {
            return Err(Error::ReservedFieldNonzero {
                offset: RESERVED_OFFSET,
                value: u64::from(reserved),
            });
        }

        self.chain_section.validate()?;

        let expected = self.computed_crc()?;
        let actual = self.stored_crc()?;
        if expected != actual {
            return Err(Error::CrcMismatch {
                address: CRC_OFFSET,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl Fragment for SignatureDescriptor {
    composite_fragment!();

    fn max_size(&self) -> Option<usize> {
        Some(SIGNATURE_DESCRIPTOR_SIZE)
    }

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let mut read = self.header.read(stream)?;
        if !self.header.is_complete() {
            return Err(Error::LengthMismatch {
                field: "signature descriptor header",
                expected: HEADER_SIZE,
                actual: self.header.size(),
            });
        }
        self.chain_section = SignatureChainSection::for_read(self.format()?, CHAIN_SECTION_SIZE);
        read += self.chain_section.read(stream)?;
        read += self.crc.read(stream)?;
        self.validate()?;
        Ok(read)
    }

    /// Refresh the chains, header slots, padding and CRC.
    fn update(&mut self) -> Result<()> {
        self.chain_section.update()?;
        self.update_crc()
    }
}

impl fmt::Display for SignatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " SignatureDescriptor [Size={}]", self.size())?;
        if let Ok(hash) = self.block0_hash() {
            writeln!(f, "  Block0 Hash: 0x{}", hex::encode(hash))?;
        }
        write!(f, "{}", self.chain_section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{Curve, EcdsaPublicKey, HashSelector, KeyFormat, KeyOptions};
    use crate::chain::SignatureChainEntry;

    fn chain() -> SignatureChain {
        let key = EcdsaPublicKey::from_xy(
            KeyFormat::SingleRoot,
            Curve::Secp384r1,
            &[0x42; 48],
            &[0x24; 48],
            &KeyOptions::default(),
        )
        .unwrap();
        let mut chain = SignatureChain::new();
        chain
            .append(SignatureChainEntry::root(key, HashSelector::User).unwrap())
            .unwrap();
        chain
            .append(SignatureChainEntry::block0(HashSelector::User).unwrap())
            .unwrap();
        chain
    }

    #[test]
    fn test_new_descriptor() {
        let descriptor = SignatureDescriptor::new(ChainSectionFormat::Classic).unwrap();
        descriptor.validate().unwrap();
        assert_eq!(descriptor.size(), 4096);
        assert_eq!(descriptor.read_bytes(0, 4).unwrap(), SIGNATURE_DESCRIPTOR.to_le_bytes().to_vec());
        assert!(descriptor.block0_hash().unwrap().iter().all(|&b| b == 0));
        assert_eq!(descriptor.signature_chains().count(), 0);
    }

    #[test]
    fn test_block0_hash() {
        let mut descriptor = SignatureDescriptor::new(ChainSectionFormat::Classic).unwrap();
        descriptor.set_block0_hash(&[0xAB; 48]).unwrap();
        descriptor.validate().unwrap();
        assert_eq!(descriptor.block0_hash().unwrap(), &[0xAB; 48]);
        assert_eq!(descriptor.read_bytes(0x10, 1).unwrap(), vec![0xAB]);
    }

    #[test]
    fn test_crc_tamper() {
        let mut descriptor = SignatureDescriptor::new(ChainSectionFormat::Classic).unwrap();
        descriptor.add_signature_chain(chain()).unwrap();
        descriptor.write_bytes(&[0x01], 0xF00).unwrap();
        assert!(matches!(
            descriptor.validate(),
            Err(Error::CrcMismatch { address: 0xFFC, .. })
        ));
    }

    #[test]
    fn test_read_round_trip() {
        for format in [ChainSectionFormat::Classic, ChainSectionFormat::MultiRoot] {
            let mut descriptor = SignatureDescriptor::new(format).unwrap();
            descriptor.set_block0_hash(&[7; 48]).unwrap();
            descriptor.add_signature_chain(chain()).unwrap();
            descriptor.add_signature_chain(chain()).unwrap();
            let bytes = descriptor.to_bytes();

            let mut stream = BitstreamReader::from_bytes(&bytes);
            let mut parsed = SignatureDescriptor::for_read();
            assert_eq!(parsed.read(&mut stream).unwrap(), 4096);
            assert_eq!(parsed.to_bytes(), bytes);
            assert_eq!(parsed.format().unwrap(), format);
        }
    }

    #[test]
    fn test_unterminated_chains_round_trip() {
        for format in [ChainSectionFormat::Classic, ChainSectionFormat::MultiRoot] {
            let mut root_only = SignatureChain::new();
            root_only
                .append(chain().root_entry().unwrap().clone())
                .unwrap();
            let mut descriptor = SignatureDescriptor::new(format).unwrap();
            descriptor.add_signature_chain(root_only.clone()).unwrap();
            descriptor.add_signature_chain(root_only).unwrap();
            descriptor.validate().unwrap();
            let bytes = descriptor.to_bytes();

            let mut stream = BitstreamReader::from_bytes(&bytes);
            let mut parsed = SignatureDescriptor::for_read();
            assert_eq!(parsed.read(&mut stream).unwrap(), 4096);
            assert_eq!(parsed.to_bytes(), bytes);
            assert_eq!(parsed.signature_chains().count(), 2);
        }
    }

    #[test]
    fn test_unknown_format() {
        let mut descriptor = SignatureDescriptor::new(ChainSectionFormat::Classic).unwrap();
        descriptor.write_bytes(&5u32.to_le_bytes(), 0x4).unwrap();
        descriptor.update().unwrap();
        assert!(matches!(descriptor.validate(), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_display() {
        let mut descriptor = SignatureDescriptor::new(ChainSectionFormat::Classic).unwrap();
        descriptor.add_signature_chain(chain()).unwrap();
        let text = descriptor.to_string();
        assert!(text.contains("Block0 Hash: 0x0000"));
        assert!(text.contains("Kind=Root"));
    }
}
