//! Configuration memory file: CMF descriptor, signature descriptor, then any
//! trailing sections and payload.

use super::{check_block0_link, BitstreamSection};
use crate::bitstream::constants::DESCRIPTOR_SIZE;
use crate::bitstream::{
    composite_fragment, BinaryFragment, BitstreamReader, CmfDescriptor, Composite,
    DescriptorFormat, Fragment, Validate,
};
use crate::chain::{ChainSectionFormat, SignatureChain, SignatureDescriptor};
use crate::{Error, Result};
use std::fmt;

/// A `.cmf` file.
///
/// `sections_remaining` in the CMF descriptor announces how many
/// [`BitstreamSection`]s follow the signature descriptor; each section in turn
/// announces how many follow it. Anything after the last section is kept as an
/// opaque payload.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{DescriptorFormat, Fragment, Validate};
/// use cmfsign::container::Cmf;
///
/// let cmf = Cmf::new(DescriptorFormat::SdmFull)?;
/// cmf.validate()?;
/// assert_eq!(
///     cmf.signature_descriptor().block0_hash()?,
///     cmf.cmf_descriptor().sha384().as_slice()
/// );
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmf {
    descriptor: CmfDescriptor,
    signature_descriptor: SignatureDescriptor,
    sections: Vec<BitstreamSection>,
    payload: BinaryFragment,
}

impl Default for Cmf {
    fn default() -> Self {
        Self::for_read()
    }
}

impl Cmf {
    /// Fresh CMF of `format` with an empty signature descriptor.
    pub fn new(format: DescriptorFormat) -> Result<Self> {
        let mut descriptor = CmfDescriptor::new();
        descriptor.initialize()?;
        descriptor.set_format(format)?;
        let mut cmf = Self {
            descriptor,
            signature_descriptor: SignatureDescriptor::new(ChainSectionFormat::for_descriptor(
                format,
            ))?,
            sections: Vec::new(),
            payload: BinaryFragment::empty(None),
        };
        cmf.update()?;
        Ok(cmf)
    }

    /// Wrap an existing descriptor, e.g. one produced by a compiler.
    pub fn from_descriptor(descriptor: CmfDescriptor) -> Result<Self> {
        let format = ChainSectionFormat::for_descriptor(descriptor.format()?);
        let mut cmf = Self {
            descriptor,
            signature_descriptor: SignatureDescriptor::new(format)?,
            sections: Vec::new(),
            payload: BinaryFragment::empty(None),
        };
        cmf.update()?;
        Ok(cmf)
    }

    /// Empty CMF ready to be read.
    pub fn for_read() -> Self {
        Self {
            descriptor: CmfDescriptor::new(),
            signature_descriptor: SignatureDescriptor::for_read(),
            sections: Vec::new(),
            payload: BinaryFragment::empty(None),
        }
    }

    pub fn cmf_descriptor(&self) -> &CmfDescriptor {
        &self.descriptor
    }

    /// Mutable CMF descriptor; call [`Fragment::update`] after editing.
    pub fn cmf_descriptor_mut(&mut self) -> &mut CmfDescriptor {
        &mut self.descriptor
    }

    pub fn signature_descriptor(&self) -> &SignatureDescriptor {
        &self.signature_descriptor
    }

    /// Mutable signature descriptor; call [`Fragment::update`] after editing.
    pub fn signature_descriptor_mut(&mut self) -> &mut SignatureDescriptor {
        &mut self.signature_descriptor
    }

    pub fn sections(&self) -> &[BitstreamSection] {
        &self.sections
    }

    /// Append a trailing section and refresh the section counts.
    pub fn push_section(&mut self, section: BitstreamSection) -> Result<()> {
        self.sections.push(section);
        self.update()
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    /// Replace the opaque data following the last section.
    pub fn set_payload(&mut self, payload: Vec<u8>) -> Result<()> {
        self.payload = BinaryFragment::new(Some(payload), None)?;
        Ok(())
    }

    /// Store `chain` in the first free slot of the signature descriptor.
    pub fn add_signature_chain(&mut self, chain: SignatureChain) -> Result<usize> {
        let index = self.signature_descriptor.add_signature_chain(chain)?;
        self.update()?;
        Ok(index)
    }

    fn validate_section_counts(&self) -> Result<()> {
        let mut announced = self.descriptor.sections_remaining()? as usize;
        for (index, section) in self.sections.iter().enumerate() {
            let expected = self.sections.len() - index;
            if announced != expected {
                return Err(Error::InvalidField(format!(
                    "{announced} sections announced before section {index}, found {expected}"
                )));
            }
            announced = section.sections_remaining()? as usize;
        }
        if announced != 0 {
            return Err(Error::InvalidField(format!(
                "{announced} sections announced after the last section"
            )));
        }
        Ok(())
    }
}

impl Composite for Cmf {
    fn parts(&self) -> Vec<&dyn Fragment> {
        let mut parts: Vec<&dyn Fragment> = Vec::with_capacity(self.sections.len() + 3);
        parts.push(&self.descriptor);
        parts.push(&self.signature_descriptor);
        parts.extend(self.sections.iter().map(|s| s as &dyn Fragment));
        parts.push(&self.payload);
        parts
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        let mut parts: Vec<&mut dyn Fragment> = Vec::with_capacity(self.sections.len() + 3);
        parts.push(&mut self.descriptor);
        parts.push(&mut self.signature_descriptor);
        parts.extend(self.sections.iter_mut().map(|s| s as &mut dyn Fragment));
        parts.push(&mut self.payload);
        parts
    }
}

impl Validate for Cmf {
    fn validate(&self) -> Result<()> {
        self.validate_parts()?;
        check_block0_link(
            "cmf descriptor",
            &self.descriptor.sha384(),
            &self.signature_descriptor,
        )?;
        let expected = ChainSectionFormat::for_descriptor(self.descriptor.format()?);
        let actual = self.signature_descriptor.format()?;
        if expected != actual {
            return Err(Error::InvalidField(format!(
                "{} descriptor carries {actual} signature chains",
                self.descriptor.format()?
            )));
        }
        self.validate_section_counts()
    }
}

impl Fragment for Cmf {
    composite_fragment!();

    /// Reads the descriptor pair, then each announced section, then the rest
    /// of the stream as payload.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let mut read = self.descriptor.read(stream)?;
        if read != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "cmf descriptor",
                expected: DESCRIPTOR_SIZE,
                actual: read,
            });
        }
        read += self.signature_descriptor.read(stream)?;

        self.sections.clear();
        let mut remaining = self.descriptor.sections_remaining()?;
        while remaining != 0 {
            if stream.is_exhausted()? {
                return Err(Error::LengthMismatch {
                    field: "cmf sections",
                    expected: self.sections.len() + remaining as usize,
                    actual: self.sections.len(),
                });
            }
            let mut section = BitstreamSection::for_read();
            read += section.read(stream)?;
            log::debug!(
                "read section {} ({} bytes), {} more announced",
                self.sections.len(),
                section.size(),
                section.sections_remaining()?
            );
            let next = section.sections_remaining()?;
            if next >= remaining {
                return Err(Error::InvalidField(format!(
                    "section announces {next} more sections after {remaining} were announced"
                )));
            }
            remaining = next;
            self.sections.push(section);
        }

        self.payload = BinaryFragment::empty(None);
        read += self.payload.read(stream)?;
        self.validate()?;
        Ok(read)
    }

    /// Refresh section counts, every CRC and every block0 hash link.
    fn update(&mut self) -> Result<()> {
        let count = self.sections.len();
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.set_sections_remaining((count - index - 1) as u32)?;
            section.update()?;
        }
        self.descriptor.set_sections_remaining(count as u32)?;
        self.descriptor.update()?;
        self.signature_descriptor.update()?;
        let hash = self.descriptor.sha384();
        self.signature_descriptor.set_block0_hash(&hash)
    }
}

impl fmt::Display for Cmf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " Cmf [Size={}]", self.size())?;
        write!(f, "{}", self.descriptor)?;
        write!(f, "{}", self.signature_descriptor)?;
        for section in &self.sections {
            write!(f, "{section}")?;
        }
        if !self.payload.is_empty() {
            writeln!(f, "  Payload: {} bytes", self.payload.size())?;
        }
        Ok(())
    }
}
