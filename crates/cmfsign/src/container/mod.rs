//! Signed top-level artifacts.
//!
//! Each container pairs a signed descriptor with the [`SignatureDescriptor`]
//! that carries its signature chains. The two are linked by hash: the
//! signature descriptor's block0 hash is the SHA-384 of the signed
//! descriptor, refreshed by `update()` and enforced by `validate()`.

mod cert;
mod cmf;
mod section;

pub use cert::EngineeringCert;
pub use cmf::Cmf;
pub use section::BitstreamSection;

use crate::chain::SignatureDescriptor;
use crate::{Error, Result};

/// Fail with [`Error::HashChainMismatch`] unless `signature_descriptor`
/// carries `expected` as its block0 hash.
pub(crate) fn check_block0_link(
    what: &str,
    expected: &[u8; 48],
    signature_descriptor: &SignatureDescriptor,
) -> Result<()> {
    let stored = signature_descriptor.block0_hash()?;
    if stored != expected.as_slice() {
        return Err(Error::HashChainMismatch(format!(
            "block0 hash {} does not match the {what} hash {}",
            hex::encode(stored),
            hex::encode(expected)
        )));
    }
    Ok(())
}
