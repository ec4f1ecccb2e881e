//! Signature chains and the signature descriptor that carries them.
//!
//! - [`SignatureChainEntry`]: root, multi-root, public key and block0 entries
//! - [`SignatureChain`]: entries in root -> keys -> block0 order
//! - [`SignatureChainSection`]: 4 or 8 chain slots behind a 32-byte header
//! - [`SignatureDescriptor`]: block0 hash link, chain section and CRC

#[allow(clippy::module_inception)]
mod chain;
mod descriptor;
mod entry;
mod section;

pub use chain::{key_format_after, ChainState, SignatureChain};
pub use descriptor::SignatureDescriptor;
pub use entry::{EntryData, EntryKind, MultiRootData, RootData, SignatureChainEntry};
pub use section::{ChainSectionFormat, SignatureChainSection};
