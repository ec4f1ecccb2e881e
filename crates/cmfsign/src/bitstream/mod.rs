//! Binary object model for secure-boot bitstreams.
//!
//! Every on-disk structure is a [`Fragment`]: a byte-addressable, serializable
//! object that can read itself from a [`BitstreamReader`] and check its own
//! invariants through [`Validate`].
//!
//! - [`BinaryFragment`]: one owned buffer with magic numbers and CRCs
//! - [`FragmentCollection`]: an ordered list of typed children
//! - [`Composite`]: fixed heterogeneous parts (entry header/data/signature)
//! - Typed fragments: [`CmfDescriptor`], [`SectionDescriptor`],
//!   [`EngineeringCertHeader`], [`EcdsaPublicKey`], [`EcdsaSignature`]

mod cert_header;
mod cmf_descriptor;
mod collection;
pub mod constants;
pub mod convert;
pub mod crc;
mod fragment;
mod key;
mod section_descriptor;
pub mod sexp;
mod signature;
mod stream;

pub(crate) use collection::composite_fragment;
pub(crate) use fragment::{fragment_newtype, write_word_dump};

pub use cert_header::EngineeringCertHeader;
pub use cmf_descriptor::{CmfDescriptor, DescriptorFormat, ShaType};
pub use collection::{Allocate, Composite, FragmentCollection};
pub use constants::{HashSelector, StreamTag};
pub use convert::Endian;
pub use fragment::{BinaryFragment, Fragment, Validate};
pub use key::{Curve, EcdsaPublicKey, KeyFormat, KeyOptions};
pub use section_descriptor::SectionDescriptor;
pub use signature::EcdsaSignature;
pub use stream::BitstreamReader;
