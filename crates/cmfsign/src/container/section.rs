//! A non-CMF section: section descriptor, signature descriptor, payload.

use super::check_block0_link;
use crate::bitstream::constants::DESCRIPTOR_SIZE;
use crate::bitstream::convert::length_to_u32;
use crate::bitstream::{
    composite_fragment, BinaryFragment, BitstreamReader, Composite, Fragment, SectionDescriptor,
    Validate,
};
use crate::chain::{ChainSectionFormat, SignatureChain, SignatureDescriptor};
use crate::{Error, Result};
use std::fmt;

/// A section following a CMF in the same file.
///
/// The payload is exactly `section_length` bytes as announced by the
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstreamSection {
    descriptor: SectionDescriptor,
    signature_descriptor: SignatureDescriptor,
    payload: BinaryFragment,
}

impl BitstreamSection {
    /// New section of `section_type` wrapping `payload`.
    pub fn new(section_type: u32, payload: Vec<u8>, format: ChainSectionFormat) -> Result<Self> {
        let mut descriptor = SectionDescriptor::new();
        descriptor.initialize(section_type)?;
        let mut section = Self {
            descriptor,
            signature_descriptor: SignatureDescriptor::new(format)?,
            payload: BinaryFragment::new(Some(payload), None)?,
        };
        section.update()?;
        Ok(section)
    }

    /// Empty section ready to be read.
    pub fn for_read() -> Self {
        Self {
            descriptor: SectionDescriptor::new(),
            signature_descriptor: SignatureDescriptor::for_read(),
            payload: BinaryFragment::empty(None),
        }
    }

    pub fn section_descriptor(&self) -> &SectionDescriptor {
        &self.descriptor
    }

    /// Mutable section descriptor; call [`Fragment::update`] after editing.
    pub fn section_descriptor_mut(&mut self) -> &mut SectionDescriptor {
        &mut self.descriptor
    }

    pub fn signature_descriptor(&self) -> &SignatureDescriptor {
        &self.signature_descriptor
    }

    pub fn signature_descriptor_mut(&mut self) -> &mut SignatureDescriptor {
        &mut self.signature_descriptor
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    /// Sections still following this one.
    pub fn sections_remaining(&self) -> Result<u32> {
        self.descriptor.sections_remaining()
    }

    pub(crate) fn set_sections_remaining(&mut self, count: u32) -> Result<()> {
        self.descriptor.set_sections_remaining(count)
    }

    /// Store `chain` in the first free slot and refresh the hash link.
    pub fn add_signature_chain(&mut self, chain: SignatureChain) -> Result<usize> {
        let index = self.signature_descriptor.add_signature_chain(chain)?;
        self.update()?;
        Ok(index)
    }
}

impl Composite for BitstreamSection {
    fn parts(&self) -> Vec<&dyn Fragment> {
        vec![
            &self.descriptor as &dyn Fragment,
            &self.signature_descriptor as &dyn Fragment,
            &self.payload as &dyn Fragment,
        ]
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        vec![
            &mut self.descriptor as &mut dyn Fragment,
            &mut self.signature_descriptor as &mut dyn Fragment,
            &mut self.payload as &mut dyn Fragment,
        ]
    }
}

impl Validate for BitstreamSection {
    fn validate(&self) -> Result<()> {
        self.validate_parts()?;
        check_block0_link(
            "section descriptor",
            &self.descriptor.sha384(),
            &self.signature_descriptor,
        )?;
        let length = self.descriptor.section_length()? as usize;
        if length != self.payload.size() {
            return Err(Error::LengthMismatch {
                field: "section payload",
                expected: length,
                actual: self.payload.size(),
            });
        }
        Ok(())
    }
}

impl Fragment for BitstreamSection {
    composite_fragment!();

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let mut read = self.descriptor.read(stream)?;
        if read != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "section descriptor",
                expected: DESCRIPTOR_SIZE,
                actual: read,
            });
        }
        read += self.signature_descriptor.read(stream)?;

        let length = self.descriptor.section_length()? as usize;
        self.payload = BinaryFragment::empty(Some(length));
        read += self.payload.read(stream)?;
        self.validate()?;
        Ok(read)
    }

    /// Refresh the section length, descriptor CRC and block0 hash.
    fn update(&mut self) -> Result<()> {
        self.descriptor
            .set_section_length(length_to_u32(self.payload.size())?)?;
        self.descriptor.update()?;
        self.signature_descriptor.update()?;
        let hash = self.descriptor.sha384();
        self.signature_descriptor.set_block0_hash(&hash)
    }
}

impl fmt::Display for BitstreamSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " BitstreamSection [Size={}]", self.size())?;
        write!(f, "{}", self.descriptor)?;
        write!(f, "{}", self.signature_descriptor)?;
        writeln!(f, "  Payload: {} bytes", self.payload.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_section() {
        let section = BitstreamSection::new(0x4F49_5348, vec![0xA5; 64], ChainSectionFormat::Classic)
            .unwrap();
        section.validate().unwrap();
        assert_eq!(section.size(), 4096 + 4096 + 64);
        assert_eq!(section.section_descriptor().section_length().unwrap(), 64);
        assert_eq!(
            section.signature_descriptor().block0_hash().unwrap(),
            section.section_descriptor().sha384().as_slice()
        );
    }

    #[test]
    fn test_hash_link_broken() {
        let mut section =
            BitstreamSection::new(0x4F49_5348, vec![1; 8], ChainSectionFormat::Classic).unwrap();
        section.section_descriptor_mut().set_sections_remaining(3).unwrap();
        section.section_descriptor_mut().fragment_mut().update_crc().unwrap();
        assert!(matches!(section.validate(), Err(Error::HashChainMismatch(_))));
        section.update().unwrap();
        section.validate().unwrap();
    }

    #[test]
    fn test_read_round_trip() {
        let section =
            BitstreamSection::new(0x1234, vec![9; 100], ChainSectionFormat::MultiRoot).unwrap();
        let mut bytes = section.to_bytes();
        bytes.extend_from_slice(b"next");

        let mut stream = BitstreamReader::from_bytes(&bytes);
        let mut parsed = BitstreamSection::for_read();
        assert_eq!(parsed.read(&mut stream).unwrap(), section.size());
        assert_eq!(parsed.to_bytes(), section.to_bytes());
        assert_eq!(parsed.payload(), section.payload());
        assert_eq!(stream.read_to_end().unwrap(), b"next".to_vec());
    }

    #[test]
    fn test_truncated_payload() {
        let section = BitstreamSection::new(0x1234, vec![9; 100], ChainSectionFormat::Classic).unwrap();
        let bytes = section.to_bytes();
        let mut stream = BitstreamReader::from_bytes(&bytes[..bytes.len() - 10]);
        let mut parsed = BitstreamSection::for_read();
        assert!(matches!(
            parsed.read(&mut stream),
            Err(Error::LengthMismatch { field: "section payload", .. })
        ));
    }
}
