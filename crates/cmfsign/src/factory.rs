//! Magic-number dispatch from a byte stream to a typed object graph.
//!
//! | Leading magic                  | Result                                      |
//! |--------------------------------|---------------------------------------------|
//! | CMF descriptor                 | [`Cmf`], or a signed descriptor module      |
//! | section descriptor, type "CRT" | [`EngineeringCert`], or a signed cert module|
//! | section descriptor, other type | [`BitstreamSection`]                        |
//! | single/multi root entry        | [`SignatureChain`] (a keychain)             |
//! | public key entry               | public key [`CssModule`]                    |
//! | anything else                  | raw [`BinaryFragment`]                      |

use crate::bitstream::constants::{
    CERT_SECTION_DESCRIPTOR, DESCRIPTOR_SIZE, ECDSA_SIGNATURE, SIGNATURE_DESCRIPTOR,
};
use crate::bitstream::{
    BinaryFragment, BitstreamReader, Fragment, KeyFormat, StreamTag, Validate,
};
use crate::chain::{SignatureChain, SignatureChainEntry};
use crate::container::{BitstreamSection, Cmf, EngineeringCert};
use crate::sign::{CssModule, ModuleKind};
use crate::{Error, Result};
use log::{debug, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Offset of the section type in a section descriptor.
const SECTION_TYPE_OFFSET: usize = 0xC;

/// Any object the factory can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bitstream {
    Cmf(Cmf),
    Section(BitstreamSection),
    EngineeringCert(EngineeringCert),
    SignatureChain(SignatureChain),
    Module(CssModule),
    Raw(BinaryFragment),
}

impl Bitstream {
    /// Short name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Bitstream::Cmf(_) => "cmf",
            Bitstream::Section(_) => "section",
            Bitstream::EngineeringCert(_) => "engineering certificate",
            Bitstream::SignatureChain(_) => "signature chain",
            Bitstream::Module(_) => "css module",
            Bitstream::Raw(_) => "raw",
        }
    }

    fn as_fragment(&self) -> &dyn Fragment {
        match self {
            Bitstream::Cmf(cmf) => cmf,
            Bitstream::Section(section) => section,
            Bitstream::EngineeringCert(cert) => cert,
            Bitstream::SignatureChain(chain) => chain,
            Bitstream::Module(module) => module,
            Bitstream::Raw(raw) => raw,
        }
    }

    fn as_fragment_mut(&mut self) -> &mut dyn Fragment {
        match self {
            Bitstream::Cmf(cmf) => cmf,
            Bitstream::Section(section) => section,
            Bitstream::EngineeringCert(cert) => cert,
            Bitstream::SignatureChain(chain) => chain,
            Bitstream::Module(module) => module,
            Bitstream::Raw(raw) => raw,
        }
    }

    /// Whether this object still needs a signature chain: an SDM-full or FM
    /// configuration without any chain.
    pub fn needs_signing(&self) -> Result<bool> {
        match self {
            Bitstream::Cmf(cmf) => Ok(crate::sign::needs_signing(cmf)?
                && cmf.signature_descriptor().signature_chains().next().is_none()),
            _ => Ok(false),
        }
    }

    pub fn as_cmf(&self) -> Option<&Cmf> {
        match self {
            Bitstream::Cmf(cmf) => Some(cmf),
            _ => None,
        }
    }

    pub fn as_engineering_cert(&self) -> Option<&EngineeringCert> {
        match self {
            Bitstream::EngineeringCert(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_signature_chain(&self) -> Option<&SignatureChain> {
        match self {
            Bitstream::SignatureChain(chain) => Some(chain),
            _ => None,
        }
    }
}

impl Validate for Bitstream {
    fn validate(&self) -> Result<()> {
        match self {
            Bitstream::Cmf(cmf) => cmf.validate(),
            Bitstream::Section(section) => section.validate(),
            Bitstream::EngineeringCert(cert) => cert.validate(),
            Bitstream::SignatureChain(chain) => chain.validate(),
            Bitstream::Module(module) => module.validate(),
            Bitstream::Raw(raw) => raw.validate(),
        }
    }
}

impl Fragment for Bitstream {
    fn size(&self) -> usize {
        self.as_fragment().size()
    }

    fn max_size(&self) -> Option<usize> {
        self.as_fragment().max_size()
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        self.as_fragment().serialize_into(out)
    }

    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        self.as_fragment().read_bytes(offset, size)
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.as_fragment_mut().write_bytes(bytes, offset)
    }

    /// Replace `self` with whatever the stream holds.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let start = stream.position();
        *self = BitstreamFactory::generate(stream)?;
        Ok(stream.position() - start)
    }

    fn update(&mut self) -> Result<()> {
        self.as_fragment_mut().update()
    }
}

impl fmt::Display for Bitstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitstream::Cmf(cmf) => write!(f, "{cmf}"),
            Bitstream::Section(section) => write!(f, "{section}"),
            Bitstream::EngineeringCert(cert) => write!(f, "{cert}"),
            Bitstream::SignatureChain(chain) => write!(f, "{chain}"),
            Bitstream::Module(module) => write!(f, "{module}"),
            Bitstream::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

/// Builds [`Bitstream`]s from files, buffers and streams.
pub struct BitstreamFactory;

impl BitstreamFactory {
    /// Parse and validate the object at the head of `stream`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownStreamFormat`] when fewer than 4 bytes are available,
    /// otherwise whatever the selected type's `read` raises.
    pub fn generate(stream: &mut BitstreamReader<'_>) -> Result<Bitstream> {
        let head = stream.peek(4)?;
        if head.len() < 4 {
            return Err(Error::UnknownStreamFormat(format!(
                "need 4 bytes to identify the stream, got {}",
                head.len()
            )));
        }
        let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);

        let bitstream = match StreamTag::from_magic(magic) {
            Some(StreamTag::CmfDescriptor) => {
                if Self::signed_module_follows(stream)? {
                    debug!("factory: cmf descriptor module");
                    Self::read_module(stream, ModuleKind::CmfDescriptor, KeyFormat::SingleRoot)?
                } else {
                    debug!("factory: cmf");
                    let mut cmf = Cmf::for_read();
                    cmf.read(stream)?;
                    Bitstream::Cmf(cmf)
                }
            }
            Some(StreamTag::SectionDescriptor) => {
                let head = stream.peek(0x10)?;
                if head.len() < 0x10 {
                    return Err(Error::UnknownStreamFormat(
                        "section descriptor truncated before its type".to_string(),
                    ));
                }
                let section_type = u32::from_le_bytes([
                    head[SECTION_TYPE_OFFSET],
                    head[SECTION_TYPE_OFFSET + 1],
                    head[SECTION_TYPE_OFFSET + 2],
                    head[SECTION_TYPE_OFFSET + 3],
                ]);
                if section_type != CERT_SECTION_DESCRIPTOR {
                    debug!("factory: section of type {section_type:#x}");
                    let mut section = BitstreamSection::for_read();
                    section.read(stream)?;
                    Bitstream::Section(section)
                } else if Self::signed_module_follows(stream)? {
                    debug!("factory: engineering certificate module");
                    Self::read_module(
                        stream,
                        ModuleKind::EngineeringCertHeader,
                        KeyFormat::SingleRoot,
                    )?
                } else {
                    debug!("factory: engineering certificate");
                    let mut cert = EngineeringCert::for_read();
                    cert.read(stream)?;
                    Bitstream::EngineeringCert(cert)
                }
            }
            Some(StreamTag::SignatureSingleRootEntry | StreamTag::SignatureMultiRootEntry) => {
                debug!("factory: signature chain");
                let mut chain = SignatureChain::for_read(None);
                chain.read(stream)?;
                Bitstream::SignatureChain(chain)
            }
            Some(StreamTag::SignaturePublicKeyEntry) => {
                let Some(entry) = SignatureChainEntry::sniff(stream)? else {
                    return Err(Error::UnknownStreamFormat(
                        "public key entry truncated".to_string(),
                    ));
                };
                let format = entry.key().map(|key| key.format()).unwrap_or_default();
                debug!("factory: public key module ({format:?})");
                Self::read_module(stream, ModuleKind::PublicKey, format)?
            }
            None => {
                debug!("factory: unknown magic {magic:#010x}, reading raw bytes");
                let bytes = stream.read_to_end()?;
                Bitstream::Raw(BinaryFragment::new(Some(bytes), None)?)
            }
        };

        if !stream.is_exhausted()? {
            warn!(
                "{} ends at offset {:#x} with trailing data",
                bitstream.kind(),
                stream.position()
            );
        }
        Ok(bitstream)
    }

    /// Parse `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Bitstream> {
        Self::generate(&mut BitstreamReader::from_bytes(bytes))
    }

    /// Parse any reader.
    pub fn from_reader(reader: impl Read) -> Result<Bitstream> {
        Self::generate(&mut BitstreamReader::new(reader))
    }

    /// Parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Bitstream> {
        let path = path.as_ref();
        debug!("factory: loading {}", path.display());
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// A 4096-byte descriptor followed by a signature (or its zeroed
    /// placeholder) rather than a signature descriptor.
    fn signed_module_follows(stream: &mut BitstreamReader<'_>) -> Result<bool> {
        let head = stream.peek(DESCRIPTOR_SIZE + 4)?;
        if head.len() < DESCRIPTOR_SIZE + 4 {
            return Ok(false);
        }
        let next = &head[DESCRIPTOR_SIZE..];
        let magic = u32::from_le_bytes([next[0], next[1], next[2], next[3]]);
        Ok(magic != SIGNATURE_DESCRIPTOR && (magic == ECDSA_SIGNATURE || magic == 0))
    }

    fn read_module(
        stream: &mut BitstreamReader<'_>,
        kind: ModuleKind,
        format: KeyFormat,
    ) -> Result<Bitstream> {
        let mut module = CssModule::for_read(kind, format);
        module.read(stream)?;
        Ok(Bitstream::Module(module))
    }
}
