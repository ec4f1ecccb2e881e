//! Signable modules exchanged with the code signing service.
//!
//! A module is the object handed to the service and returned signed:
//!
//! | Module                | Layout                          | Signed payload          |
//! |-----------------------|---------------------------------|-------------------------|
//! | CMF descriptor        | descriptor (4096) + signature   | the descriptor          |
//! | Engineering cert      | cert header (4096) + signature  | the cert header         |
//! | Public key            | unsigned public key entry       | entry minus signature   |

use crate::bitstream::constants::{DESCRIPTOR_SIZE, ECDSA_SIGNATURE_SIZE};
use crate::bitstream::{
    composite_fragment, BinaryFragment, BitstreamReader, CmfDescriptor, Composite, EcdsaPublicKey,
    EcdsaSignature, EngineeringCertHeader, Fragment, HashSelector, KeyFormat, Validate,
};
use crate::chain::{EntryKind, SignatureChainEntry};
use crate::{Error, Result};
use sha2::{Digest, Sha384};
use std::fmt;

/// Which kind of object a module wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    CmfDescriptor,
    EngineeringCertHeader,
    PublicKey,
}

/// A signable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssModule {
    CmfDescriptor(CmfDescriptor, BinaryFragment),
    EngineeringCertHeader(EngineeringCertHeader, BinaryFragment),
    PublicKey(SignatureChainEntry),
}

fn signature_placeholder() -> Result<BinaryFragment> {
    let mut signature = BinaryFragment::empty(Some(ECDSA_SIGNATURE_SIZE));
    signature.initialize(ECDSA_SIGNATURE_SIZE)?;
    Ok(signature)
}

impl CssModule {
    /// Module signing `descriptor`.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor does not pass
    /// [`validate_for_signing`](CmfDescriptor::validate_for_signing).
    pub fn for_cmf_descriptor(descriptor: CmfDescriptor) -> Result<Self> {
        descriptor.validate_for_signing()?;
        Ok(CssModule::CmfDescriptor(descriptor, signature_placeholder()?))
    }

    pub fn for_cert_header(header: EngineeringCertHeader) -> Result<Self> {
        header.validate()?;
        Ok(CssModule::EngineeringCertHeader(header, signature_placeholder()?))
    }

    /// Module signing `key` into a public key entry.
    pub fn for_public_key(key: EcdsaPublicKey, selector: HashSelector) -> Result<Self> {
        Ok(CssModule::PublicKey(SignatureChainEntry::public_key(key, selector)?))
    }

    /// Empty module of `kind` ready to be read.
    pub fn for_read(kind: ModuleKind, key_format: KeyFormat) -> Self {
        let signature = BinaryFragment::empty(Some(ECDSA_SIGNATURE_SIZE));
        match kind {
            ModuleKind::CmfDescriptor => CssModule::CmfDescriptor(CmfDescriptor::new(), signature),
            ModuleKind::EngineeringCertHeader => {
                CssModule::EngineeringCertHeader(EngineeringCertHeader::new(), signature)
            }
            ModuleKind::PublicKey => {
                CssModule::PublicKey(SignatureChainEntry::for_read(EntryKind::PublicKey, key_format))
            }
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            CssModule::CmfDescriptor(..) => ModuleKind::CmfDescriptor,
            CssModule::EngineeringCertHeader(..) => ModuleKind::EngineeringCertHeader,
            CssModule::PublicKey(_) => ModuleKind::PublicKey,
        }
    }

    /// Bytes the service signs.
    pub fn payload(&self) -> Result<Vec<u8>> {
        match self {
            CssModule::CmfDescriptor(descriptor, _) => Ok(descriptor.to_bytes()),
            CssModule::EngineeringCertHeader(header, _) => Ok(header.to_bytes()),
            CssModule::PublicKey(entry) => {
                let signed = entry.size() - entry.signature_bytes().len();
                entry.read_bytes(0, signed)
            }
        }
    }

    /// SHA-384 of [`payload`](Self::payload).
    pub fn payload_sha384(&self) -> Result<[u8; 48]> {
        Ok(Sha384::digest(self.payload()?).into())
    }

    fn signature_bytes(&self) -> &[u8] {
        match self {
            CssModule::CmfDescriptor(_, signature) | CssModule::EngineeringCertHeader(_, signature) => {
                signature.as_bytes()
            }
            CssModule::PublicKey(entry) => entry.signature_bytes(),
        }
    }

    /// The service's signature, or `None` while unsigned.
    pub fn signature(&self) -> Result<Option<EcdsaSignature>> {
        let bytes = self.signature_bytes();
        if bytes.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        EcdsaSignature::from_bytes(bytes.to_vec()).map(Some)
    }

    pub fn is_signed(&self) -> bool {
        self.signature_bytes().iter().any(|&b| b != 0)
    }

    /// Store the service's signature.
    pub fn set_signature(&mut self, signature: EcdsaSignature) -> Result<()> {
        match self {
            CssModule::CmfDescriptor(_, slot) | CssModule::EngineeringCertHeader(_, slot) => {
                let bytes = signature.into_bytes();
                if bytes.len() != ECDSA_SIGNATURE_SIZE {
                    return Err(Error::LengthMismatch {
                        field: "module signature",
                        expected: ECDSA_SIGNATURE_SIZE,
                        actual: bytes.len(),
                    });
                }
                slot.set_raw(&bytes, 0)
            }
            CssModule::PublicKey(entry) => entry.set_signature(signature),
        }
    }

    /// Turn the service's `signature` into the chain entry that carries it:
    /// a block0 entry for descriptors, the signed public key entry for keys.
    pub fn into_signed_entry(
        mut self,
        signature: EcdsaSignature,
        selector: HashSelector,
    ) -> Result<SignatureChainEntry> {
        self.set_signature(signature.clone())?;
        match self {
            CssModule::PublicKey(entry) => Ok(entry),
            _ => {
                let mut entry = SignatureChainEntry::block0(selector)?;
                entry.set_signature(signature)?;
                Ok(entry)
            }
        }
    }
}

impl Composite for CssModule {
    fn parts(&self) -> Vec<&dyn Fragment> {
        match self {
            CssModule::CmfDescriptor(descriptor, signature) => {
                vec![descriptor as &dyn Fragment, signature as &dyn Fragment]
            }
            CssModule::EngineeringCertHeader(header, signature) => {
                vec![header as &dyn Fragment, signature as &dyn Fragment]
            }
            CssModule::PublicKey(entry) => vec![entry as &dyn Fragment],
        }
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        match self {
            CssModule::CmfDescriptor(descriptor, signature) => {
                vec![descriptor as &mut dyn Fragment, signature as &mut dyn Fragment]
            }
            CssModule::EngineeringCertHeader(header, signature) => {
                vec![header as &mut dyn Fragment, signature as &mut dyn Fragment]
            }
            CssModule::PublicKey(entry) => vec![entry as &mut dyn Fragment],
        }
    }
}

impl Validate for CssModule {
    fn validate(&self) -> Result<()> {
        self.validate_parts()?;
        if let CssModule::CmfDescriptor(_, signature) | CssModule::EngineeringCertHeader(_, signature) =
            self
        {
            if signature.size() != ECDSA_SIGNATURE_SIZE {
                return Err(Error::LengthMismatch {
                    field: "module signature",
                    expected: ECDSA_SIGNATURE_SIZE,
                    actual: signature.size(),
                });
            }
        }
        self.signature()?;
        Ok(())
    }
}

impl Fragment for CssModule {
    composite_fragment!();

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let read = self.read_parts(stream)?;
        if let CssModule::CmfDescriptor(descriptor, _) = self {
            if descriptor.size() != DESCRIPTOR_SIZE {
                return Err(Error::LengthMismatch {
                    field: "cmf descriptor",
                    expected: DESCRIPTOR_SIZE,
                    actual: descriptor.size(),
                });
            }
        }
        self.validate()?;
        Ok(read)
    }

    fn update(&mut self) -> Result<()> {
        for part in self.parts_mut() {
            part.update()?;
        }
        Ok(())
    }
}

impl fmt::Display for CssModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " CssModule [Kind={:?}, Size={}]", self.kind(), self.size())?;
        if let Ok(hash) = self.payload_sha384() {
            writeln!(f, "  Payload SHA-384: 0x{}", hex::encode(hash))?;
        }
        match self {
            CssModule::CmfDescriptor(descriptor, _) => write!(f, "{descriptor}")?,
            CssModule::EngineeringCertHeader(header, _) => write!(f, "{header}")?,
            CssModule::PublicKey(entry) => write!(f, "{entry}")?,
        }
        match self.signature() {
            Ok(Some(signature)) => write!(f, "{signature}"),
            _ => writeln!(f, "  Signature: <unsigned>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{Curve, KeyOptions};

    fn signature() -> EcdsaSignature {
        EcdsaSignature::from_rs(&[0x5A; 48], &[0xA5; 48]).unwrap()
    }

    fn descriptor() -> CmfDescriptor {
        let mut descriptor = CmfDescriptor::new();
        descriptor.initialize().unwrap();
        descriptor
    }

    #[test]
    fn test_descriptor_module() {
        let mut module = CssModule::for_cmf_descriptor(descriptor()).unwrap();
        module.validate().unwrap();
        assert_eq!(module.size(), 4096 + 112);
        assert_eq!(module.payload().unwrap(), descriptor().to_bytes());
        assert!(!module.is_signed());

        module.set_signature(signature()).unwrap();
        module.validate().unwrap();
        assert!(module.is_signed());
        let entry = module
            .into_signed_entry(signature(), HashSelector::User)
            .unwrap();
        assert_eq!(entry.kind(), EntryKind::Block0);
        assert_eq!(entry.signature().unwrap().unwrap(), signature());
    }

    #[test]
    fn test_descriptor_with_tool_information_rejected() {
        let mut descriptor = descriptor();
        descriptor.fragment_mut().set_u32(1, 0x80).unwrap();
        descriptor.update().unwrap();
        assert!(matches!(
            CssModule::for_cmf_descriptor(descriptor),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn test_public_key_module() {
        let key = EcdsaPublicKey::from_xy(
            KeyFormat::SingleRoot,
            Curve::Secp384r1,
            &[1; 48],
            &[2; 48],
            &KeyOptions::default(),
        )
        .unwrap();
        let mut module = CssModule::for_public_key(key, HashSelector::Intel).unwrap();
        assert_eq!(module.payload().unwrap().len(), 0x18 + 120);

        let unsigned = module.payload_sha384().unwrap();
        module.set_signature(signature()).unwrap();
        assert_eq!(module.payload_sha384().unwrap(), unsigned);

        let entry = module
            .into_signed_entry(signature(), HashSelector::Intel)
            .unwrap();
        assert_eq!(entry.kind(), EntryKind::PublicKey);
        entry.validate().unwrap();
    }

    #[test]
    fn test_short_signature_rejected() {
        let mut module = CssModule::for_cmf_descriptor(descriptor()).unwrap();
        let short = EcdsaSignature::from_rs(&[1; 32], &[2; 32]).unwrap();
        assert!(matches!(
            module.set_signature(short),
            Err(Error::LengthMismatch { field: "module signature", .. })
        ));
        assert!(!module.is_signed());
    }

    #[test]
    fn test_read_signed_module() {
        let mut header = EngineeringCertHeader::new();
        header.initialize("0x1", "0x2", "0x3").unwrap();
        let mut module = CssModule::for_cert_header(header).unwrap();
        module.set_signature(signature()).unwrap();
        let bytes = module.to_bytes();

        let mut stream = BitstreamReader::from_bytes(&bytes);
        let mut parsed = CssModule::for_read(ModuleKind::EngineeringCertHeader, KeyFormat::SingleRoot);
        assert_eq!(parsed.read(&mut stream).unwrap(), bytes.len());
        assert_eq!(parsed.to_bytes(), bytes);
        assert_eq!(parsed.signature().unwrap(), Some(signature()));
    }
}
