//! Generic 4 KiB section descriptor preceding every non-CMF section.

use super::constants::{DESCRIPTOR_SIZE, SECTION_DESCRIPTOR};
use super::fragment::{fragment_newtype, BinaryFragment, Validate};
use crate::{Error, Result};
use std::fmt;

const VERSION_OFFSET: usize = 0x4;
const SECTIONS_REMAINING_OFFSET: usize = 0x8;
const SECTION_TYPE_OFFSET: usize = 0xC;
const SECTION_LENGTH_OFFSET: usize = 0x10;
pub(crate) const SECTION_CRC_OFFSET: usize = 0xFFC;

/// Section descriptor: magic, version, sections remaining, type and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    fragment: BinaryFragment,
}

impl Default for SectionDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionDescriptor {
    pub fn new() -> Self {
        Self {
            fragment: BinaryFragment::empty(Some(DESCRIPTOR_SIZE))
                .with_magic(SECTION_DESCRIPTOR, 0x0)
                .with_crc(SECTION_CRC_OFFSET)
                .with_description("section descriptor"),
        }
    }

    /// Reset to a zeroed descriptor of `section_type`.
    pub fn initialize(&mut self, section_type: u32) -> Result<()> {
        self.fragment.initialize(DESCRIPTOR_SIZE)?;
        self.fragment.set_u32(section_type, SECTION_TYPE_OFFSET)?;
        self.fragment.update_crc()
    }

    pub fn fragment(&self) -> &BinaryFragment {
        &self.fragment
    }

    pub fn fragment_mut(&mut self) -> &mut BinaryFragment {
        &mut self.fragment
    }

    pub fn version(&self) -> Result<u32> {
        self.fragment.get_u32(VERSION_OFFSET)
    }

    pub fn sections_remaining(&self) -> Result<u32> {
        self.fragment.get_u32(SECTIONS_REMAINING_OFFSET)
    }

    pub fn set_sections_remaining(&mut self, count: u32) -> Result<()> {
        self.fragment.set_u32(count, SECTIONS_REMAINING_OFFSET)
    }

    pub fn section_type(&self) -> Result<u32> {
        self.fragment.get_u32(SECTION_TYPE_OFFSET)
    }

    /// Payload length following the descriptor and its signature descriptor.
    pub fn section_length(&self) -> Result<u32> {
        self.fragment.get_u32(SECTION_LENGTH_OFFSET)
    }

    pub fn set_section_length(&mut self, length: u32) -> Result<()> {
        self.fragment.set_u32(length, SECTION_LENGTH_OFFSET)
    }
}

impl Validate for SectionDescriptor {
    fn validate(&self) -> Result<()> {
        if self.fragment.size() != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "section descriptor",
                expected: DESCRIPTOR_SIZE,
                actual: self.fragment.size(),
            });
        }
        self.fragment.validate()
    }
}

fragment_newtype!(SectionDescriptor);

impl fmt::Display for SectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " SectionDescriptor [Size={}]", self.fragment.size())?;
        if let (Ok(kind), Ok(length)) = (self.section_type(), self.section_length()) {
            let tag = kind.to_le_bytes();
            let name: String = tag
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            writeln!(f, "  Section Type: {kind:#x} ({name})")?;
            writeln!(f, "  Section Length: {length}")?;
        }
        Ok(())
    }
}
