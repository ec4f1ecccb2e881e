//! Offline signing assembly.
//!
//! The signature itself comes from an external service behind
//! [`ModuleSigner`]. This module builds the [`CssModule`] handed to it and
//! splices the response into the artifact's signature chains.

mod module;

pub use module::{CssModule, ModuleKind};

use crate::bitstream::{
    DescriptorFormat, EcdsaPublicKey, EcdsaSignature, Fragment, HashSelector, Validate,
};
use crate::chain::SignatureChain;
use crate::container::{Cmf, EngineeringCert};
use crate::{Error, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Produces the signature for a module.
pub trait ModuleSigner {
    fn sign(&self, module: &CssModule) -> Result<EcdsaSignature>;
}

impl<F> ModuleSigner for F
where
    F: Fn(&CssModule) -> Result<EcdsaSignature>,
{
    fn sign(&self, module: &CssModule) -> Result<EcdsaSignature> {
        self(module)
    }
}

/// Whether `cmf` must carry a signature chain before it can be used.
///
/// SDM-lite configurations boot unsigned.
pub fn needs_signing(cmf: &Cmf) -> Result<bool> {
    Ok(matches!(
        cmf.cmf_descriptor().format()?,
        DescriptorFormat::SdmFull | DescriptorFormat::Fm
    ))
}

/// Signing workflow with a builder pattern API.
///
/// A keychain (`.qky`) holds the root entry and any delegated public key
/// entries. Signing an artifact appends the final entry and stores the result
/// in the artifact's signature descriptor.
///
/// # Example
///
/// ```no_run
/// use cmfsign::bitstream::{EcdsaSignature, Fragment, HashSelector};
/// use cmfsign::container::Cmf;
/// use cmfsign::sign::{CmfSigner, CssModule};
///
/// let mut cmf = Cmf::for_read();
/// cmf.load("design.cmf")?;
/// let service = |module: &CssModule| -> cmfsign::Result<EcdsaSignature> {
///     let _digest = module.payload_sha384()?;
///     EcdsaSignature::from_rs(&[1; 48], &[2; 48])
/// };
/// CmfSigner::new()
///     .keychain_file("owner.qky")
///     .hash_selector(HashSelector::User)
///     .sign_cmf(&mut cmf, &service)?;
/// cmf.save("design_signed.cmf")?;
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CmfSigner {
    keychain: Option<SignatureChain>,
    keychain_file: Option<PathBuf>,
    hash_selector: HashSelector,
}

impl CmfSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an in-memory keychain.
    pub fn keychain(mut self, chain: SignatureChain) -> Self {
        self.keychain = Some(chain);
        self
    }

    /// Read the keychain from a `.qky` file when signing.
    pub fn keychain_file(mut self, path: impl AsRef<Path>) -> Self {
        self.keychain_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Hash selector written into the new entry. Defaults to
    /// [`HashSelector::Intel`].
    pub fn hash_selector(mut self, selector: HashSelector) -> Self {
        self.hash_selector = selector;
        self
    }

    /// Check the builder configuration.
    ///
    /// Exactly one keychain source must be configured.
    pub fn validate(&self) -> Result<()> {
        match (&self.keychain, &self.keychain_file) {
            (Some(_), Some(_)) => Err(Error::InvalidField(
                "cannot use both an in-memory keychain and a keychain file".to_string(),
            )),
            (None, None) => Err(Error::InvalidField("no keychain configured".to_string())),
            _ => Ok(()),
        }
    }

    fn load_keychain(&self) -> Result<SignatureChain> {
        self.validate()?;
        let chain = if let Some(chain) = &self.keychain {
            chain.clone()
        } else {
            let Some(path) = self.keychain_file.as_deref() else {
                return Err(Error::InvalidField("no keychain configured".to_string()));
            };
            debug!("loading keychain {}", path.display());
            let mut chain = SignatureChain::for_read(None);
            chain.load(path)?;
            chain
        };
        chain.validate()?;
        if chain.is_terminated() {
            return Err(Error::ChainTerminated);
        }
        if chain.root_entry().is_none() {
            return Err(Error::InvalidChainOrder(
                "keychain has no root entry".to_string(),
            ));
        }
        Ok(chain)
    }

    /// Sign the CMF descriptor and store the completed chain in the first
    /// free slot of its signature descriptor. Returns the slot index.
    pub fn sign_cmf<S: ModuleSigner + ?Sized>(&self, cmf: &mut Cmf, signer: &S) -> Result<usize> {
        if !needs_signing(cmf)? {
            return Err(Error::InvalidField(format!(
                "{} configurations are not signed",
                cmf.cmf_descriptor().format()?
            )));
        }
        let mut chain = self.load_keychain()?;
        let module = CssModule::for_cmf_descriptor(cmf.cmf_descriptor().clone())?;
        let signature = signer.sign(&module)?;
        chain.append(module.into_signed_entry(signature, self.hash_selector)?)?;

        let slot = cmf.add_signature_chain(chain)?;
        cmf.validate()?;
        info!("signed cmf descriptor into chain slot {slot}");
        Ok(slot)
    }

    /// Sign the certificate header and store the completed chain.
    pub fn sign_cert<S: ModuleSigner + ?Sized>(
        &self,
        cert: &mut EngineeringCert,
        signer: &S,
    ) -> Result<usize> {
        let mut chain = self.load_keychain()?;
        let module = CssModule::for_cert_header(cert.engineering_cert_header().clone())?;
        let signature = signer.sign(&module)?;
        chain.append(module.into_signed_entry(signature, self.hash_selector)?)?;

        let slot = cert.add_signature_chain(chain)?;
        cert.validate()?;
        info!("signed engineering certificate into chain slot {slot}");
        Ok(slot)
    }

    /// Delegate to `key`: the keychain's last key signs a public key entry
    /// for it. Returns the extended keychain.
    pub fn sign_key<S: ModuleSigner + ?Sized>(
        &self,
        key: EcdsaPublicKey,
        signer: &S,
    ) -> Result<SignatureChain> {
        let mut chain = self.load_keychain()?;
        let module = CssModule::for_public_key(key, self.hash_selector)?;
        let signature = signer.sign(&module)?;
        chain.append(module.into_signed_entry(signature, self.hash_selector)?)?;
        chain.validate()?;
        info!("extended keychain to {} entries", chain.len());
        Ok(chain)
    }
}
