//! Engineering certificate: header plus signature descriptor, 8 KiB.

use super::check_block0_link;
use crate::bitstream::constants::{DESCRIPTOR_SIZE, ENGINEERING_CERT_SIZE};
use crate::bitstream::{
    composite_fragment, BitstreamReader, Composite, EngineeringCertHeader, Fragment, Validate,
};
use crate::chain::{ChainSectionFormat, SignatureChain, SignatureDescriptor};
use crate::{Error, Result};
use std::fmt;

/// An engineering certificate (`.cert`).
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{Fragment, Validate};
/// use cmfsign::container::EngineeringCert;
///
/// let cert = EngineeringCert::new("0x1122334455667788", "0x0", "0x0")?;
/// cert.validate()?;
/// assert_eq!(cert.size(), 8192);
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineeringCert {
    header: EngineeringCertHeader,
    signature_descriptor: SignatureDescriptor,
}

impl Default for EngineeringCert {
    fn default() -> Self {
        Self::for_read()
    }
}

impl EngineeringCert {
    /// Unsigned certificate for the device `uid` (hex strings, `0x` optional).
    pub fn new(uid: &str, hmac: &str, pub_key_hash: &str) -> Result<Self> {
        let mut header = EngineeringCertHeader::new();
        header.initialize(uid, hmac, pub_key_hash)?;
        let mut cert = Self {
            header,
            signature_descriptor: SignatureDescriptor::new(ChainSectionFormat::Classic)?,
        };
        cert.update()?;
        Ok(cert)
    }

    /// Empty certificate ready to be read.
    pub fn for_read() -> Self {
        Self {
            header: EngineeringCertHeader::new(),
            signature_descriptor: SignatureDescriptor::for_read(),
        }
    }

    pub fn engineering_cert_header(&self) -> &EngineeringCertHeader {
        &self.header
    }

    pub fn signature_descriptor(&self) -> &SignatureDescriptor {
        &self.signature_descriptor
    }

    /// Mutable signature descriptor; call [`Fragment::update`] after editing.
    pub fn signature_descriptor_mut(&mut self) -> &mut SignatureDescriptor {
        &mut self.signature_descriptor
    }

    /// Store `chain` in the first free slot and refresh the hash link.
    pub fn add_signature_chain(&mut self, chain: SignatureChain) -> Result<usize> {
        let index = self.signature_descriptor.add_signature_chain(chain)?;
        self.update()?;
        Ok(index)
    }
}

impl Composite for EngineeringCert {
    fn parts(&self) -> Vec<&dyn Fragment> {
        vec![
            &self.header as &dyn Fragment,
            &self.signature_descriptor as &dyn Fragment,
        ]
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        vec![
            &mut self.header as &mut dyn Fragment,
            &mut self.signature_descriptor as &mut dyn Fragment,
        ]
    }
}

impl Validate for EngineeringCert {
    fn validate(&self) -> Result<()> {
        if self.size() != ENGINEERING_CERT_SIZE {
            return Err(Error::LengthMismatch {
                field: "engineering certificate",
                expected: ENGINEERING_CERT_SIZE,
                actual: self.size(),
            });
        }
        self.validate_parts()?;
        check_block0_link(
            "engineering certificate header",
            &self.header.sha384(),
            &self.signature_descriptor,
        )
    }
}

impl Fragment for EngineeringCert {
    composite_fragment!();

    fn max_size(&self) -> Option<usize> {
        Some(ENGINEERING_CERT_SIZE)
    }

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let mut read = self.header.read(stream)?;
        if read != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "engineering certificate header",
                expected: DESCRIPTOR_SIZE,
                actual: read,
            });
        }
        read += self.signature_descriptor.read(stream)?;
        self.validate()?;
        Ok(read)
    }

    fn update(&mut self) -> Result<()> {
        self.header.update()?;
        self.signature_descriptor.update()?;
        let hash = self.header.sha384();
        self.signature_descriptor.set_block0_hash(&hash)
    }
}

impl fmt::Display for EngineeringCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " EngineeringCert [Size={}]", self.size())?;
        write!(f, "{}", self.header)?;
        write!(f, "{}", self.signature_descriptor)
    }
}
