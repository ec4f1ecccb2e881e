//! Object model and signature-chain engine for secure-boot FPGA bitstreams.
//!
//! - [`bitstream`]: byte-level fragments, collections and typed descriptors
//! - [`chain`]: signature chain entries, chains, chain sections and the
//!   signature descriptor
//! - [`container`]: signed artifacts ([`container::Cmf`],
//!   [`container::EngineeringCert`], [`container::BitstreamSection`])
//! - [`factory`]: magic-number dispatch from bytes to objects
//! - [`sign`]: signable modules and offline signature assembly
//! - [`archive`]: zip archives with a SHA-256 manifest
//! - [`batch`]: parallel validation of many files

pub mod archive;
pub mod batch;
pub mod bitstream;
pub mod chain;
pub mod container;
pub mod error;
pub mod factory;
pub mod sign;

pub use archive::{BitstreamZip, CompressionLevel};
pub use bitstream::{Fragment, Validate};
pub use error::Error;
pub use factory::{Bitstream, BitstreamFactory};
pub use sign::{CmfSigner, CssModule, ModuleSigner};

pub type Result<T> = std::result::Result<T, Error>;
